//! The untyped façade.
//!
//! [`DsKit`] reads and writes `dyn Entity` records of any kind. The record
//! type for a kind comes from a [`KindRegistry`], filled explicitly with
//! [`KindRegistry::register`] or implicitly by every successful write.
//!
//! ```rust,ignore
//! let registry = KindRegistry::new();
//! registry.register::<Widget>();
//! let kit = DsKit::new(&client, registry);
//!
//! let record = kit.read(&ctx, None, Some(&key))?;
//! if let Some(widget) = record.downcast_ref::<Widget>() {
//!     println!("{}", widget.name);
//! }
//! ```

mod facade;
mod registry;

pub use facade::*;
pub use registry::*;
