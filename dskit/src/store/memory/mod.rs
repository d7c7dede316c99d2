mod config;
mod eval;
mod store;

pub use config::*;
pub use store::*;
