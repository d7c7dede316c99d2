//! Typed repositories.
//!
//! A [`Repo`] binds one record type to its kind and offers create, read,
//! update, delete, listing, projection and aggregation over it. Every
//! operation takes an optional [`Transaction`](crate::query::Transaction);
//! without one it runs directly against the store.
//!
//! ```rust,ignore
//! use dskit::context::Context;
//! use dskit::repository::Repo;
//! use dskit::store::Datastore;
//!
//! let client = Datastore::in_memory();
//! let ctx = Context::background();
//! let repo: Repo<Widget> = Repo::for_entity(&client);
//!
//! let mut widget = Widget::new("bolt");
//! repo.create(&ctx, None, None, &mut widget)?;
//! let (page, cursor) = repo.list(&ctx, None, None, Some(20), None)?;
//! ```

mod repo;

pub use repo::*;
