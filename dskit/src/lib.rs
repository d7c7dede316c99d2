//! # dskit - typed access to Datastore-style document stores
//!
//! dskit sits between application record types and a NoSQL document store
//! that organizes records by kind and hierarchical key. It offers:
//!
//! - **Typed repositories**: [`Repo<E>`](repository::Repo) binds a record
//!   type to its kind for create, read, list, update, delete and aggregation
//! - **A dynamic façade**: [`DsKit`](dynamic::DsKit) works with records of
//!   any registered kind through `dyn Entity`
//! - **Query functions**: the [`query`] module runs reads, writes, scans,
//!   projections and count/sum/average aggregations with argument checks
//!   before any store call
//! - **Lifecycle timestamps**: `_created` / `_updated` stamping through
//!   [`EntityMeta`](entity::EntityMeta)
//! - **Transactions**: [`Txn`](transaction::Txn) and
//!   [`run_in_transaction`](transaction::run_in_transaction)
//! - **Client bootstrap**: [`ClientBuilder`](client::ClientBuilder) resolves
//!   the project from the environment, emulator or metadata service
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dskit::context::Context;
//! use dskit::entity::EntityMeta;
//! use dskit::repository::Repo;
//! use dskit::store::Datastore;
//! use dskit::Entity;
//!
//! #[derive(Entity, Default, Clone, Debug, PartialEq)]
//! #[entity(kind = "Widget", updated(enabled = true))]
//! struct Widget {
//!     #[entity(meta)]
//!     meta: EntityMeta,
//!     name: String,
//!     size: i64,
//! }
//!
//! let ctx = Context::background();
//! let client = Datastore::builder().open(&ctx)?;
//! let repo: Repo<Widget> = Repo::for_entity(&client);
//!
//! let mut widget = Widget { name: "bolt".into(), size: 4, ..Default::default() };
//! repo.create(&ctx, None, None, &mut widget)?;
//! let (page, cursor) = repo.list(&ctx, None, None, Some(20), None)?;
//! ```
//!
//! ## Module Organization
//!
//! - [`client`] / [`client_config`] - opening a client
//! - [`common`] - values, properties and timestamps
//! - [`context`] - cancellation and deadlines
//! - [`dynamic`] - the untyped façade and its kind registry
//! - [`entity`] - the record contract and lifecycle hooks
//! - [`errors`] - error type and result alias
//! - [`query`] - store operations shared by both façades
//! - [`repository`] - the typed façade
//! - [`store`] - keys, queries, the store client and the in-memory store
//! - [`transaction`] - transaction handle and driver

extern crate self as dskit;

pub mod client;
pub mod client_config;
pub mod common;
pub mod context;
pub mod dynamic;
pub mod entity;
pub mod errors;
pub mod query;
pub mod repository;
pub mod store;
pub mod transaction;

#[cfg(feature = "derive")]
pub use dskit_derive::{Convertible, Entity};

#[cfg(test)]
mod test_util;
