//! Value model shared by the store, the entity layer and the query layer.

mod constants;
mod convertible;
mod optional_time;
mod property;
mod value;

pub use constants::*;
pub use convertible::*;
pub use optional_time::*;
pub use property::*;
pub use value::*;
