//! Transaction handle for the façades and the run-in-transaction driver.

use crate::context::Context;
use crate::errors::{DsError, DsResult};
use crate::query::Transaction;
use crate::store::{Commit, Datastore, DatastoreTransaction, TransactionOptions};

/// A running store transaction, accepted wherever an operation takes an
/// optional [`Transaction`].
///
/// Writes made through it return pending keys; resolve them with the
/// [`Commit`] returned by [`commit`](Txn::commit).
#[derive(Clone, Debug)]
pub struct Txn {
    txn: DatastoreTransaction,
}

impl Txn {
    /// Begins a transaction on `client`.
    pub fn begin(ctx: &Context, client: &Datastore, options: TransactionOptions) -> DsResult<Txn> {
        Ok(Txn {
            txn: client.new_transaction(ctx, options)?,
        })
    }

    pub fn commit(&self) -> DsResult<Commit> {
        self.txn.commit()
    }

    pub fn rollback(&self) -> DsResult<()> {
        self.txn.rollback()
    }

    pub fn id(&self) -> &str {
        self.txn.id()
    }

    pub fn is_active(&self) -> bool {
        self.txn.is_active()
    }

    /// The native transaction, for calls the façades do not cover.
    pub fn native(&self) -> &DatastoreTransaction {
        &self.txn
    }
}

impl From<DatastoreTransaction> for Txn {
    fn from(txn: DatastoreTransaction) -> Self {
        Txn { txn }
    }
}

impl Transaction for Txn {
    fn txn(&self) -> Option<&DatastoreTransaction> {
        self.txn.txn()
    }
}

/// Runs `f` inside a read-write transaction.
///
/// # Behavior
/// - when `f` succeeds the transaction is committed and `f`'s value is
///   returned with the [`Commit`]
/// - when `f` fails the transaction is rolled back and `f`'s error returned;
///   if the rollback fails too, the returned error carries both messages
///   (see [`DsError::join`])
/// - nothing is retried, a conflicting commit surfaces as
///   [`ErrorKind::TransactionConflict`](crate::errors::ErrorKind)
///
/// # Examples
/// ```rust,ignore
/// let (key, commit) = run_in_transaction(&ctx, &client, |txn| {
///     repo.create(&ctx, Some(txn), None, &mut widget)
/// })?;
/// let key = key.resolve(&commit);
/// ```
pub fn run_in_transaction<T, F>(ctx: &Context, client: &Datastore, f: F) -> DsResult<(T, Commit)>
where
    F: FnOnce(&Txn) -> DsResult<T>,
{
    run_in_transaction_with(ctx, client, TransactionOptions::default(), f)
}

/// [`run_in_transaction`] with explicit transaction options.
pub fn run_in_transaction_with<T, F>(
    ctx: &Context,
    client: &Datastore,
    options: TransactionOptions,
    f: F,
) -> DsResult<(T, Commit)>
where
    F: FnOnce(&Txn) -> DsResult<T>,
{
    let txn = Txn::begin(ctx, client, options)?;
    match f(&txn) {
        Ok(value) => {
            let commit = txn.commit()?;
            Ok((value, commit))
        }
        Err(err) => {
            // f may have finished the transaction itself
            if !txn.is_active() {
                return Err(err);
            }
            match txn.rollback() {
                Ok(()) => Err(err),
                Err(rollback_err) => {
                    log::warn!("rollback of transaction {} failed: {}", txn.id(), rollback_err);
                    Err(DsError::join(err, rollback_err))
                }
            }
        }
    }
}
