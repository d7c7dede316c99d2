use std::fmt::{Debug, Formatter};

use crate::common::PropertyMap;
use crate::context::Context;
use crate::errors::DsResult;
use crate::store::{AggregationQuery, AggregationResult, Cursor, Key, Query};

/// A write sent to the store in a commit.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    /// Insert or replace the entity under `key`. An incomplete key is
    /// completed by the store.
    Upsert { key: Key, properties: PropertyMap },
    /// Remove the entity under `key`; absent keys are not an error.
    Delete { key: Key },
}

impl Mutation {
    pub fn key(&self) -> &Key {
        match self {
            Mutation::Upsert { key, .. } | Mutation::Delete { key } => key,
        }
    }
}

/// Store-side handle of an open transaction.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TransactionHandle {
    id: String,
    read_only: bool,
}

impl TransactionHandle {
    pub fn new(id: &str, read_only: bool) -> Self {
        TransactionHandle {
            id: id.to_string(),
            read_only,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl Debug for TransactionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionHandle({})", self.id)
    }
}

/// Options for beginning a transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    pub read_only: bool,
}

impl TransactionOptions {
    pub fn read_only() -> Self {
        TransactionOptions { read_only: true }
    }
}

/// One row of a query batch.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    pub key: Key,
    /// Empty for keys-only queries; only the projected properties for
    /// projection queries.
    pub properties: PropertyMap,
    /// Position right after this row.
    pub cursor: Cursor,
}

/// A batch of query results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBatch {
    pub results: Vec<QueryResult>,
    /// Position after the last row scanned in this batch, including rows
    /// skipped by the offset.
    pub end_cursor: Cursor,
    /// Number of rows the offset skipped in this batch.
    pub skipped: usize,
    /// True when rows remain past `end_cursor`.
    pub more_results: bool,
}

/// Low-level interface to a Datastore-style document store.
///
/// # Purpose
/// Everything above this trait is store independent. A provider executes
/// lookups, commits, queries and aggregations, and owns transaction and
/// consistency semantics.
///
/// # Contract
/// - every method checks `ctx` and fails with the context's error once it is
///   cancelled or past its deadline
/// - `lookup` returns one slot per key, `None` for absent entities
/// - `commit` applies all mutations atomically and returns, per mutation,
///   the final key (incomplete keys completed)
/// - with a transaction handle, reads are tracked for conflict detection and
///   `commit` fails with `TransactionConflict` if a concurrent write touched
///   them; the handle is finished by `commit` or `rollback`
/// - `run_query` returns one batch; callers resume from `end_cursor` while
///   `more_results` is set
///
/// # Thread Safety
/// Implementers must be `Send + Sync`.
pub trait DatastoreProvider: Send + Sync {
    fn lookup(
        &self,
        ctx: &Context,
        keys: &[Key],
        txn: Option<&TransactionHandle>,
    ) -> DsResult<Vec<Option<PropertyMap>>>;

    fn commit(
        &self,
        ctx: &Context,
        mutations: Vec<Mutation>,
        txn: Option<&TransactionHandle>,
    ) -> DsResult<Vec<Key>>;

    fn run_query(
        &self,
        ctx: &Context,
        query: &Query,
        txn: Option<&TransactionHandle>,
    ) -> DsResult<QueryBatch>;

    fn run_aggregation(
        &self,
        ctx: &Context,
        query: &AggregationQuery,
        txn: Option<&TransactionHandle>,
    ) -> DsResult<AggregationResult>;

    fn begin_transaction(
        &self,
        ctx: &Context,
        options: &TransactionOptions,
    ) -> DsResult<TransactionHandle>;

    fn rollback(&self, ctx: &Context, txn: &TransactionHandle) -> DsResult<()>;

    /// Releases the provider's resources. Further calls may fail.
    fn close(&self) -> DsResult<()> {
        Ok(())
    }
}
