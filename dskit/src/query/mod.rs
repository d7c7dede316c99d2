//! Store operations shared by the typed and the dynamic façades.
//!
//! Every function validates its arguments before touching the store and
//! fails with [`ErrorKind::InvalidArgument`](crate::errors::ErrorKind) when a
//! required input is missing. The functions take the store client as a
//! [`Client`] and, optionally, a [`Transaction`]: with a transaction, reads
//! and queries run inside it and writes are buffered until it commits.
//!
//! The `_txn` variants make the transaction mandatory.

mod aggregate;
mod crud;
pub(crate) mod guard;
mod scan;

pub use aggregate::*;
pub use crud::*;
pub use scan::*;

use crate::store::{Datastore, DatastoreTransaction};

/// Gives access to a store client.
///
/// Returns `None` when no usable client is available, e.g. once the
/// underlying handle has been closed.
pub trait Client {
    fn client(&self) -> Option<&Datastore>;
}

impl Client for Datastore {
    fn client(&self) -> Option<&Datastore> {
        if self.is_closed() {
            None
        } else {
            Some(self)
        }
    }
}

/// Gives access to a running store transaction.
///
/// Returns `None` once the transaction has been committed or rolled back.
pub trait Transaction {
    fn txn(&self) -> Option<&DatastoreTransaction>;
}

impl Transaction for DatastoreTransaction {
    fn txn(&self) -> Option<&DatastoreTransaction> {
        if self.is_active() {
            Some(self)
        } else {
            None
        }
    }
}
