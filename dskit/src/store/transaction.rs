use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::Context;
use crate::entity::PropertyLoadSaver;
use crate::errors::{DsError, DsResult, ErrorKind};
use crate::store::datastore::{check_batch, require_complete, upsert};
use crate::store::{
    AggregationQuery, AggregationResult, Datastore, Key, Mutation, Query, QueryIterator,
    TransactionHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Active,
    Committed,
    RolledBack,
}

/// A key written inside a transaction.
///
/// An incomplete key only receives its id when the transaction commits;
/// resolve it with [`Commit::key`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingKey {
    transaction_id: String,
    index: usize,
    key: Key,
}

impl PendingKey {
    /// The key as it was written, possibly incomplete.
    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }
}

/// Outcome of a successful commit.
#[derive(Clone, Debug, PartialEq)]
pub struct Commit {
    transaction_id: String,
    keys: Vec<Key>,
}

impl Commit {
    /// Resolves a pending key written in this transaction. Returns `None`
    /// for keys that belong to another transaction.
    pub fn key(&self, pending: &PendingKey) -> Option<Key> {
        if pending.transaction_id != self.transaction_id {
            return None;
        }
        self.keys.get(pending.index).cloned()
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Final keys of every mutation, in write order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }
}

/// A native store transaction.
///
/// Reads go to the store immediately and are tracked for conflict
/// detection. Writes are buffered and sent in one atomic commit. The
/// transaction does not see its own buffered writes.
///
/// A transaction is finished by [`commit`](Self::commit) or
/// [`rollback`](Self::rollback); afterwards every call fails with
/// [`ErrorKind::TransactionClosed`].
#[derive(Clone)]
pub struct DatastoreTransaction {
    inner: Arc<TransactionInner>,
}

struct TransactionInner {
    datastore: Datastore,
    ctx: Context,
    handle: TransactionHandle,
    state: Mutex<TxState>,
    mutations: Mutex<Vec<Mutation>>,
}

impl DatastoreTransaction {
    pub(crate) fn new(datastore: Datastore, ctx: Context, handle: TransactionHandle) -> Self {
        DatastoreTransaction {
            inner: Arc::new(TransactionInner {
                datastore,
                ctx,
                handle,
                state: Mutex::new(TxState::Active),
                mutations: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        self.inner.handle.id()
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.handle.is_read_only()
    }

    pub fn is_active(&self) -> bool {
        *self.inner.state.lock() == TxState::Active
    }

    fn check_active(&self) -> DsResult<()> {
        match *self.inner.state.lock() {
            TxState::Active => Ok(()),
            TxState::Committed => Err(closed("transaction has already been committed")),
            TxState::RolledBack => Err(closed("transaction has already been rolled back")),
        }
    }

    fn check_writable(&self) -> DsResult<()> {
        self.check_active()?;
        if self.is_read_only() {
            return Err(DsError::new(
                "cannot write in a read-only transaction",
                ErrorKind::InvalidArgument,
            ));
        }
        Ok(())
    }

    pub fn get<T: PropertyLoadSaver + ?Sized>(
        &self,
        ctx: &Context,
        key: &Key,
        dst: &mut T,
    ) -> DsResult<()> {
        self.check_active()?;
        self.inner
            .datastore
            .lookup_one(ctx, key, dst, Some(&self.inner.handle))
    }

    pub fn get_multi<T: PropertyLoadSaver>(
        &self,
        ctx: &Context,
        keys: &[Key],
        dst: &mut [T],
    ) -> DsResult<()> {
        self.check_active()?;
        self.inner
            .datastore
            .lookup_many(ctx, keys, dst, Some(&self.inner.handle))
    }

    /// Buffers a write and returns its pending key.
    pub fn put<T: PropertyLoadSaver + ?Sized>(&self, key: &Key, src: &T) -> DsResult<PendingKey> {
        self.check_writable()?;
        let mutation = upsert(key, src)?;
        Ok(self.push(vec![mutation]).remove(0))
    }

    pub fn put_multi<T: PropertyLoadSaver>(
        &self,
        keys: &[Key],
        src: &[T],
    ) -> DsResult<Vec<PendingKey>> {
        self.check_writable()?;
        check_batch(keys.len(), src.len())?;
        let mutations = keys
            .iter()
            .zip(src.iter())
            .map(|(key, entity)| upsert(key, entity))
            .collect::<DsResult<Vec<_>>>()?;
        Ok(self.push(mutations))
    }

    /// Buffers a delete.
    pub fn delete(&self, key: &Key) -> DsResult<()> {
        self.delete_multi(std::slice::from_ref(key))
    }

    pub fn delete_multi(&self, keys: &[Key]) -> DsResult<()> {
        self.check_writable()?;
        check_batch(keys.len(), keys.len())?;
        let mutations = keys
            .iter()
            .map(|key| {
                require_complete(key)?;
                Ok(Mutation::Delete { key: key.clone() })
            })
            .collect::<DsResult<Vec<_>>>()?;
        self.push(mutations);
        Ok(())
    }

    fn push(&self, mutations: Vec<Mutation>) -> Vec<PendingKey> {
        let mut buffered = self.inner.mutations.lock();
        let mut pending = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            pending.push(PendingKey {
                transaction_id: self.id().to_string(),
                index: buffered.len(),
                key: mutation.key().clone(),
            });
            buffered.push(mutation);
        }
        pending
    }

    /// Runs a query inside the transaction.
    pub fn run(&self, ctx: &Context, query: &Query) -> DsResult<QueryIterator> {
        self.check_active()?;
        self.inner.datastore.check_open()?;
        Ok(QueryIterator::new(
            self.inner.datastore.clone(),
            ctx.clone(),
            query.clone(),
            Some(self.inner.handle.clone()),
        ))
    }

    pub fn run_aggregation_query(
        &self,
        ctx: &Context,
        query: &AggregationQuery,
    ) -> DsResult<AggregationResult> {
        self.check_active()?;
        self.inner
            .datastore
            .aggregate(ctx, query, Some(&self.inner.handle))
    }

    /// Sends the buffered writes atomically. On failure the transaction is
    /// finished all the same.
    pub fn commit(&self) -> DsResult<Commit> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                TxState::Active => *state = TxState::Committed,
                TxState::Committed => {
                    return Err(closed("transaction has already been committed"))
                }
                TxState::RolledBack => {
                    return Err(closed("transaction has already been rolled back"))
                }
            }
        }

        let mutations = std::mem::take(&mut *self.inner.mutations.lock());
        let result = self.inner.datastore.check_open().and_then(|_| {
            self.inner.datastore.provider().commit(
                &self.inner.ctx,
                mutations,
                Some(&self.inner.handle),
            )
        });
        match result {
            Ok(keys) => {
                log::debug!("committed transaction {} with {} mutation(s)", self.id(), keys.len());
                Ok(Commit {
                    transaction_id: self.id().to_string(),
                    keys,
                })
            }
            Err(err) => {
                log::error!("commit of transaction {} failed: {}", self.id(), err);
                Err(err)
            }
        }
    }

    /// Discards the buffered writes and releases the transaction.
    pub fn rollback(&self) -> DsResult<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                TxState::Active => *state = TxState::RolledBack,
                TxState::Committed => {
                    return Err(closed("transaction has already been committed"))
                }
                TxState::RolledBack => {
                    return Err(closed("transaction has already been rolled back"))
                }
            }
        }
        self.inner.mutations.lock().clear();
        log::debug!("rolling back transaction {}", self.id());
        self.inner
            .datastore
            .provider()
            .rollback(&self.inner.ctx, &self.inner.handle)
    }
}

impl std::fmt::Debug for DatastoreTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatastoreTransaction")
            .field("id", &self.id())
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}

fn closed(message: &str) -> DsError {
    DsError::new(message, ErrorKind::TransactionClosed)
}
