use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;

use crate::common::PropertyMap;
use crate::context::Context;
use crate::errors::{DsError, DsResult, ErrorKind};
use crate::store::memory::eval::{self, Row};
use crate::store::memory::{IdAllocation, MemoryStoreConfig};
use crate::store::{
    AggregationQuery, AggregationResult, DatastoreProvider, Key, Mutation, Query, QueryBatch,
    QueryResult, TransactionHandle, TransactionOptions,
};

const MAX_SCATTERED_ID: i64 = 1 << 53;

struct StoredEntity {
    properties: PropertyMap,
    version: u64,
}

struct TxnState {
    read_only: bool,
    // version observed at first read; 0 when the entity was absent
    reads: HashMap<Key, u64>,
}

/// A [`DatastoreProvider`] that keeps every entity in memory.
///
/// # Purpose
/// Backs the local client used by tests and by the emulator fallback. It
/// implements the full provider contract: ordered queries with filters,
/// projections and cursors, server-side aggregations, and optimistic
/// transactions that fail with [`ErrorKind::TransactionConflict`] when an
/// entity read in the transaction was written by someone else before the
/// commit.
///
/// # Cursors
/// Cursors are positions in the ordered result set of the query. Writes that
/// land between two pages can shift a position by the number of rows added
/// or removed in front of it.
///
/// # Thread Safety
/// All state is behind locks; clones share the same data.
#[derive(Clone)]
pub struct InMemoryDatastore {
    inner: Arc<InMemoryDatastoreInner>,
}

struct InMemoryDatastoreInner {
    config: MemoryStoreConfig,
    entities: RwLock<BTreeMap<Key, StoredEntity>>,
    version: AtomicU64,
    next_id: AtomicI64,
    transactions: DashMap<String, TxnState>,
    closed: AtomicBool,
}

impl Default for InMemoryDatastore {
    fn default() -> Self {
        InMemoryDatastore::new()
    }
}

impl InMemoryDatastore {
    pub fn new() -> InMemoryDatastore {
        InMemoryDatastore::with_config(MemoryStoreConfig::new())
    }

    pub fn with_config(config: MemoryStoreConfig) -> InMemoryDatastore {
        InMemoryDatastore {
            inner: Arc::new(InMemoryDatastoreInner {
                config,
                entities: RwLock::new(BTreeMap::new()),
                version: AtomicU64::new(0),
                next_id: AtomicI64::new(1),
                transactions: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &MemoryStoreConfig {
        &self.inner.config
    }

    /// Number of stored entities across all kinds and namespaces.
    pub fn len(&self) -> usize {
        self.inner.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of transactions begun and not yet committed or rolled back.
    pub fn open_transactions(&self) -> usize {
        self.inner.transactions.len()
    }

    fn check(&self, ctx: &Context) -> DsResult<()> {
        ctx.check()?;
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(DsError::new(
                "in-memory store is closed",
                ErrorKind::StoreAlreadyClosed,
            ));
        }
        Ok(())
    }

    fn unknown_transaction(handle: &TransactionHandle) -> DsError {
        DsError::new(
            &format!("transaction {} is not active", handle.id()),
            ErrorKind::TransactionClosed,
        )
    }

    /// Records the versions seen by a transactional read.
    fn track_reads<'a>(
        &self,
        txn: Option<&TransactionHandle>,
        observed: impl Iterator<Item = (&'a Key, u64)>,
    ) -> DsResult<()> {
        let Some(handle) = txn else {
            return Ok(());
        };
        let mut state = self
            .inner
            .transactions
            .get_mut(handle.id())
            .ok_or_else(|| InMemoryDatastore::unknown_transaction(handle))?;
        if state.read_only {
            return Ok(());
        }
        for (key, version) in observed {
            state.reads.entry(key.clone()).or_insert(version);
        }
        Ok(())
    }

    fn allocate_id(&self, entities: &BTreeMap<Key, StoredEntity>, key: &Key, taken: &HashSet<Key>) -> Key {
        loop {
            let id = match self.inner.config.id_allocation() {
                IdAllocation::Sequential => self.inner.next_id.fetch_add(1, Ordering::SeqCst),
                IdAllocation::Scattered => rand::thread_rng().gen_range(1..MAX_SCATTERED_ID),
            };
            let candidate = key.completed(id);
            if !entities.contains_key(&candidate) && !taken.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Every entity in scope of `query`, filtered, ordered and projected.
    fn scan(&self, query: &Query) -> Vec<(Row, u64)> {
        let entities = self.inner.entities.read();
        let mut versions = HashMap::new();
        let candidates: Vec<Row> = entities
            .iter()
            .filter(|(key, _)| eval::in_scope(query, key))
            .map(|(key, stored)| {
                versions.insert(key.clone(), stored.version);
                (key.clone(), stored.properties.clone())
            })
            .collect();
        eval::evaluate(query, candidates)
            .into_iter()
            .map(|row| {
                let version = versions.get(&row.0).copied().unwrap_or_default();
                (row, version)
            })
            .collect()
    }

    /// The half-open window of `rows` selected by the query's cursors.
    fn window(query: &Query, len: usize) -> DsResult<(usize, usize)> {
        let start = match query.start_cursor() {
            Some(cursor) => eval::cursor_position(cursor)?,
            None => 0,
        };
        let end = match query.end_cursor() {
            Some(cursor) => eval::cursor_position(cursor)?,
            None => len,
        };
        let end = end.min(len);
        Ok((start.min(end), end))
    }
}

impl DatastoreProvider for InMemoryDatastore {
    fn lookup(
        &self,
        ctx: &Context,
        keys: &[Key],
        txn: Option<&TransactionHandle>,
    ) -> DsResult<Vec<Option<PropertyMap>>> {
        self.check(ctx)?;
        let entities = self.inner.entities.read();
        let found: Vec<(Option<PropertyMap>, u64)> = keys
            .iter()
            .map(|key| match entities.get(key) {
                Some(stored) => (Some(stored.properties.clone()), stored.version),
                None => (None, 0),
            })
            .collect();
        drop(entities);

        self.track_reads(
            txn,
            keys.iter().zip(found.iter()).map(|(key, (_, version))| (key, *version)),
        )?;
        Ok(found.into_iter().map(|(properties, _)| properties).collect())
    }

    fn commit(
        &self,
        ctx: &Context,
        mutations: Vec<Mutation>,
        txn: Option<&TransactionHandle>,
    ) -> DsResult<Vec<Key>> {
        self.check(ctx)?;
        let mut entities = self.inner.entities.write();

        if let Some(handle) = txn {
            let (_, state) = self
                .inner
                .transactions
                .remove(handle.id())
                .ok_or_else(|| InMemoryDatastore::unknown_transaction(handle))?;
            if state.read_only && !mutations.is_empty() {
                return Err(DsError::new(
                    "cannot write in a read-only transaction",
                    ErrorKind::InvalidArgument,
                ));
            }
            for (key, seen) in &state.reads {
                let current = entities.get(key).map_or(0, |stored| stored.version);
                if current != *seen {
                    log::debug!("transaction {} conflicts on {}", handle.id(), key);
                    return Err(DsError::new(
                        "too much contention on these datastore entities, please try again",
                        ErrorKind::TransactionConflict,
                    ));
                }
            }
        }

        let mut keys = Vec::with_capacity(mutations.len());
        let mut taken = HashSet::new();
        for mutation in mutations {
            let version = self.inner.version.fetch_add(1, Ordering::SeqCst) + 1;
            match mutation {
                Mutation::Upsert { key, properties } => {
                    let key = if key.is_complete() {
                        key
                    } else {
                        self.allocate_id(&entities, &key, &taken)
                    };
                    taken.insert(key.clone());
                    entities.insert(
                        key.clone(),
                        StoredEntity {
                            properties: properties.normalized(),
                            version,
                        },
                    );
                    keys.push(key);
                }
                Mutation::Delete { key } => {
                    entities.remove(&key);
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    fn run_query(
        &self,
        ctx: &Context,
        query: &Query,
        txn: Option<&TransactionHandle>,
    ) -> DsResult<QueryBatch> {
        self.check(ctx)?;
        let rows = self.scan(query);
        let (start, end) = InMemoryDatastore::window(query, rows.len())?;

        let skipped = query.offset_value().min(end - start);
        let first = start + skipped;
        let take = query
            .limit_value()
            .unwrap_or(usize::MAX)
            .min(self.inner.config.batch_size())
            .min(end - first);
        let last = first + take;

        let selected = &rows[first..last];
        self.track_reads(txn, selected.iter().map(|((key, _), version)| (key, *version)))?;

        let results = selected
            .iter()
            .enumerate()
            .map(|(index, ((key, properties), _))| QueryResult {
                key: key.clone(),
                properties: if query.is_keys_only() {
                    PropertyMap::new()
                } else {
                    properties.clone()
                },
                cursor: eval::position_cursor(first + index + 1),
            })
            .collect();

        Ok(QueryBatch {
            results,
            end_cursor: eval::position_cursor(last),
            skipped,
            more_results: last < end,
        })
    }

    fn run_aggregation(
        &self,
        ctx: &Context,
        query: &AggregationQuery,
        txn: Option<&TransactionHandle>,
    ) -> DsResult<AggregationResult> {
        self.check(ctx)?;
        let base = query.query();
        let rows = self.scan(base);
        let (start, end) = InMemoryDatastore::window(base, rows.len())?;
        let first = (start + base.offset_value()).min(end);
        let last = match base.limit_value() {
            Some(limit) => (first + limit).min(end),
            None => end,
        };

        let selected = &rows[first..last];
        self.track_reads(txn, selected.iter().map(|((key, _), version)| (key, *version)))?;
        let selected: Vec<Row> = selected.iter().map(|(row, _)| row.clone()).collect();
        Ok(eval::aggregate(query.aggregations(), &selected))
    }

    fn begin_transaction(
        &self,
        ctx: &Context,
        options: &TransactionOptions,
    ) -> DsResult<TransactionHandle> {
        self.check(ctx)?;
        let id = uuid::Uuid::new_v4().to_string();
        self.inner.transactions.insert(
            id.clone(),
            TxnState {
                read_only: options.read_only,
                reads: HashMap::new(),
            },
        );
        Ok(TransactionHandle::new(&id, options.read_only))
    }

    fn rollback(&self, ctx: &Context, txn: &TransactionHandle) -> DsResult<()> {
        self.check(ctx)?;
        self.inner
            .transactions
            .remove(txn.id())
            .map(|_| ())
            .ok_or_else(|| InMemoryDatastore::unknown_transaction(txn))
    }

    fn close(&self) -> DsResult<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.transactions.clear();
        Ok(())
    }
}
