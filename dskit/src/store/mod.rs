//! The store client and its storage abstraction.
//!
//! Everything here mirrors the native Datastore SDK surface the rest of the
//! crate is written against: keys, property values, queries, cursors,
//! aggregations and transactions.
//!
//! # Providers
//!
//! A [`Datastore`] talks to a [`DatastoreProvider`]. The crate ships
//! [`memory::InMemoryDatastore`], a complete in-process implementation used
//! for local development and tests. A remote backend plugs in by
//! implementing the same trait.
//!
//! # Queries
//!
//! Queries are built by value with [`Query`] and [`field`]. Results come back
//! through a [`QueryIterator`] that follows the provider's batches, and every
//! position in a result stream can be captured as a [`Cursor`].

mod cursor;
mod datastore;
mod filter;
mod key;
pub mod memory;
mod provider;
mod query;
mod transaction;

pub use cursor::*;
pub use datastore::{Datastore, QueryIterator};
pub(crate) use datastore::no_such_entity;
pub use filter::*;
pub use key::*;
pub use provider::*;
pub use query::*;
pub use transaction::*;
