//! The entity contract and its lifecycle hooks.
//!
//! - [`Entity`] - what a record type implements to be stored under a kind
//! - [`PropertyLoadSaver`] - conversion between a record and its properties
//! - [`LifecycleHooks`] / [`EntityMeta`] - automatic `_created` / `_updated`
//!   timestamps

mod entity;
mod lifecycle;

pub use entity::*;
pub use lifecycle::*;
