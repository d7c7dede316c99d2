use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use itertools::Itertools;

use crate::client_config::ClientConfig;
use crate::common::{PropertyMap, MAX_AGGREGATIONS, MAX_BATCH_SIZE};
use crate::context::Context;
use crate::entity::PropertyLoadSaver;
use crate::errors::{DsError, DsResult, ErrorKind};
use crate::store::memory::InMemoryDatastore;
use crate::store::{
    AggregationQuery, AggregationResult, Cursor, DatastoreProvider, DatastoreTransaction, Key,
    Mutation, Query, QueryResult, TransactionHandle, TransactionOptions,
};

/// Handle to a document store.
///
/// `Datastore` is the store client every operation goes through. It checks
/// arguments the way the store's SDK does (complete keys for reads and
/// deletes, batch limits, reserved property names) and then calls the
/// [`DatastoreProvider`].
///
/// Uses the PIMPL pattern: clones share one provider and one open/closed
/// state. A closed handle rejects every call with
/// [`ErrorKind::StoreAlreadyClosed`].
///
/// # Examples
///
/// ```rust,ignore
/// use dskit::context::Context;
/// use dskit::store::{Datastore, Key};
///
/// let client = Datastore::in_memory();
/// let ctx = Context::background();
/// let key = client.put(&ctx, &Key::incomplete("Widget", None), &widget)?;
/// client.get(&ctx, &key, &mut loaded)?;
/// ```
#[derive(Clone)]
pub struct Datastore {
    inner: Arc<DatastoreInner>,
}

struct DatastoreInner {
    provider: Arc<dyn DatastoreProvider>,
    config: ClientConfig,
    closed: AtomicBool,
}

impl Datastore {
    /// Wraps a provider.
    pub fn new<T: DatastoreProvider + 'static>(provider: T, config: ClientConfig) -> Self {
        Datastore::from_provider(Arc::new(provider), config)
    }

    pub fn from_provider(provider: Arc<dyn DatastoreProvider>, config: ClientConfig) -> Self {
        Datastore {
            inner: Arc::new(DatastoreInner {
                provider,
                config,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// A client backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Datastore::new(InMemoryDatastore::new(), ClientConfig::local())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn project_id(&self) -> &str {
        self.inner.config.project_id()
    }

    pub fn database_id(&self) -> &str {
        self.inner.config.database_id()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Closes the handle and the provider. Closing twice is a no-op.
    pub fn close(&self) -> DsResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::debug!("closing datastore client for project {}", self.project_id());
        self.inner.provider.close()
    }

    pub(crate) fn provider(&self) -> &Arc<dyn DatastoreProvider> {
        &self.inner.provider
    }

    pub(crate) fn check_open(&self) -> DsResult<()> {
        if self.is_closed() {
            return Err(DsError::new(
                "datastore client is closed",
                ErrorKind::StoreAlreadyClosed,
            ));
        }
        Ok(())
    }

    /// Loads the entity stored under `key` into `dst`.
    ///
    /// # Errors
    /// - [`ErrorKind::InvalidKey`] if `key` is not complete
    /// - [`ErrorKind::NoSuchEntity`] if nothing is stored under `key`
    /// - [`ErrorKind::FieldMismatch`] if some properties did not fit; `dst`
    ///   still holds everything that did
    pub fn get<T: PropertyLoadSaver + ?Sized>(
        &self,
        ctx: &Context,
        key: &Key,
        dst: &mut T,
    ) -> DsResult<()> {
        self.lookup_one(ctx, key, dst, None)
    }

    /// Loads several entities at once; `dst` must have one slot per key.
    ///
    /// Every found entity is loaded. Missing keys are reported together as
    /// one [`ErrorKind::NoSuchEntity`] error.
    pub fn get_multi<T: PropertyLoadSaver>(
        &self,
        ctx: &Context,
        keys: &[Key],
        dst: &mut [T],
    ) -> DsResult<()> {
        self.lookup_many(ctx, keys, dst, None)
    }

    /// Writes `src` under `key` and returns the final key. An incomplete key
    /// is completed by the store.
    pub fn put<T: PropertyLoadSaver + ?Sized>(
        &self,
        ctx: &Context,
        key: &Key,
        src: &T,
    ) -> DsResult<Key> {
        self.check_open()?;
        let mutation = upsert(key, src)?;
        let keys = self.inner.provider.commit(ctx, vec![mutation], None)?;
        keys.into_iter()
            .next()
            .ok_or_else(|| DsError::new("store returned no key for put", ErrorKind::InternalError))
    }

    /// Writes several entities in one commit.
    pub fn put_multi<T: PropertyLoadSaver>(
        &self,
        ctx: &Context,
        keys: &[Key],
        src: &[T],
    ) -> DsResult<Vec<Key>> {
        self.check_open()?;
        check_batch(keys.len(), src.len())?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mutations = keys
            .iter()
            .zip(src.iter())
            .map(|(key, entity)| upsert(key, entity))
            .collect::<DsResult<Vec<_>>>()?;
        self.inner.provider.commit(ctx, mutations, None)
    }

    /// Deletes the entity under `key`. Deleting an absent key succeeds.
    pub fn delete(&self, ctx: &Context, key: &Key) -> DsResult<()> {
        self.delete_multi(ctx, std::slice::from_ref(key))
    }

    pub fn delete_multi(&self, ctx: &Context, keys: &[Key]) -> DsResult<()> {
        self.check_open()?;
        check_batch(keys.len(), keys.len())?;
        if keys.is_empty() {
            return Ok(());
        }
        let mutations = keys
            .iter()
            .map(|key| {
                require_complete(key)?;
                Ok(Mutation::Delete { key: key.clone() })
            })
            .collect::<DsResult<Vec<_>>>()?;
        self.inner.provider.commit(ctx, mutations, None)?;
        Ok(())
    }

    /// Starts a query. Results are fetched lazily, batch by batch, as the
    /// iterator advances.
    pub fn run(&self, ctx: &Context, query: &Query) -> DsResult<QueryIterator> {
        self.check_open()?;
        Ok(QueryIterator::new(self.clone(), ctx.clone(), query.clone(), None))
    }

    /// Runs count/sum/avg aggregations in one round trip.
    pub fn run_aggregation_query(
        &self,
        ctx: &Context,
        query: &AggregationQuery,
    ) -> DsResult<AggregationResult> {
        self.aggregate(ctx, query, None)
    }

    /// Begins a transaction.
    pub fn new_transaction(
        &self,
        ctx: &Context,
        options: TransactionOptions,
    ) -> DsResult<DatastoreTransaction> {
        self.check_open()?;
        let handle = self.inner.provider.begin_transaction(ctx, &options)?;
        log::debug!("began transaction {}", handle.id());
        Ok(DatastoreTransaction::new(self.clone(), ctx.clone(), handle))
    }

    pub(crate) fn lookup_one<T: PropertyLoadSaver + ?Sized>(
        &self,
        ctx: &Context,
        key: &Key,
        dst: &mut T,
        txn: Option<&TransactionHandle>,
    ) -> DsResult<()> {
        self.check_open()?;
        require_complete(key)?;
        let found = self
            .inner
            .provider
            .lookup(ctx, std::slice::from_ref(key), txn)?
            .into_iter()
            .next()
            .flatten();
        match found {
            Some(properties) => {
                dst.load_key(key);
                dst.load(&properties)
            }
            None => Err(no_such_entity(std::slice::from_ref(key))),
        }
    }

    pub(crate) fn lookup_many<T: PropertyLoadSaver>(
        &self,
        ctx: &Context,
        keys: &[Key],
        dst: &mut [T],
        txn: Option<&TransactionHandle>,
    ) -> DsResult<()> {
        self.check_open()?;
        if keys.len() != dst.len() {
            return Err(DsError::new(
                "keys and destinations must have the same length",
                ErrorKind::InvalidArgument,
            ));
        }
        if keys.is_empty() {
            return Ok(());
        }
        for key in keys {
            require_complete(key)?;
        }

        let found = self.inner.provider.lookup(ctx, keys, txn)?;
        let mut missing = Vec::new();
        let mut mismatch: Option<DsError> = None;
        for ((key, slot), target) in keys.iter().zip(found).zip(dst.iter_mut()) {
            match slot {
                Some(properties) => {
                    target.load_key(key);
                    if let Err(err) = target.load(&properties) {
                        if !err.is_field_mismatch() {
                            return Err(err);
                        }
                        mismatch.get_or_insert(err);
                    }
                }
                None => missing.push(key.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(no_such_entity(&missing));
        }
        match mismatch {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) fn aggregate(
        &self,
        ctx: &Context,
        query: &AggregationQuery,
        txn: Option<&TransactionHandle>,
    ) -> DsResult<AggregationResult> {
        self.check_open()?;
        if query.aggregations().is_empty() {
            return Err(DsError::new(
                "aggregation query must contain at least one aggregation",
                ErrorKind::InvalidArgument,
            ));
        }
        if query.aggregations().len() > MAX_AGGREGATIONS {
            return Err(DsError::new(
                &format!(
                    "aggregation query supports at most {} aggregations, got {}",
                    MAX_AGGREGATIONS,
                    query.aggregations().len()
                ),
                ErrorKind::InvalidArgument,
            ));
        }
        if let Some(alias) = query
            .aggregations()
            .iter()
            .map(|a| a.alias())
            .duplicates()
            .next()
        {
            return Err(DsError::new(
                &format!("duplicate aggregation alias {:?}", alias),
                ErrorKind::InvalidArgument,
            ));
        }
        self.inner.provider.run_aggregation(ctx, query, txn)
    }
}

impl std::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore")
            .field("project_id", &self.project_id())
            .field("database_id", &self.database_id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub(crate) fn no_such_entity(keys: &[Key]) -> DsError {
    DsError::new(
        &format!("no such entity: {}", keys.iter().join(", ")),
        ErrorKind::NoSuchEntity,
    )
}

pub(crate) fn require_complete(key: &Key) -> DsResult<()> {
    if key.is_complete() {
        Ok(())
    } else {
        Err(DsError::new(
            &format!("invalid key {}: key is not complete", key),
            ErrorKind::InvalidKey,
        ))
    }
}

pub(crate) fn check_batch(keys: usize, entities: usize) -> DsResult<()> {
    if keys != entities {
        return Err(DsError::new(
            "keys and entities must have the same length",
            ErrorKind::InvalidArgument,
        ));
    }
    if keys > MAX_BATCH_SIZE {
        return Err(DsError::new(
            &format!("batch of {} exceeds the limit of {} entities", keys, MAX_BATCH_SIZE),
            ErrorKind::InvalidArgument,
        ));
    }
    Ok(())
}

/// Builds the upsert for `src`, checking the key and the property names.
pub(crate) fn upsert<T: PropertyLoadSaver + ?Sized>(key: &Key, src: &T) -> DsResult<Mutation> {
    if !key.is_complete() && !key.is_incomplete() {
        return Err(DsError::new(
            &format!("invalid key {}: ancestors must be complete", key),
            ErrorKind::InvalidKey,
        ));
    }
    let properties = src.save()?;
    validate_properties(&properties)?;
    Ok(Mutation::Upsert {
        key: key.clone(),
        properties,
    })
}

fn validate_properties(properties: &PropertyMap) -> DsResult<()> {
    for name in properties.names() {
        if name.is_empty() || (name.starts_with("__") && name.ends_with("__")) {
            return Err(DsError::new(
                &format!("invalid property name {:?}", name),
                ErrorKind::InvalidArgument,
            ));
        }
    }
    Ok(())
}

/// Streams the results of a query.
///
/// Batches are requested from the provider on demand; the iterator follows
/// the provider's batches until the query's limit or the end of the results.
/// [`QueryIterator::cursor`] gives the position after the last row returned.
pub struct QueryIterator {
    datastore: Datastore,
    ctx: Context,
    query: Query,
    txn: Option<TransactionHandle>,
    buffer: VecDeque<QueryResult>,
    position: Cursor,
    batch_end: Cursor,
    fetched: bool,
    more: bool,
    remaining: Option<usize>,
    offset_left: usize,
}

impl QueryIterator {
    pub(crate) fn new(
        datastore: Datastore,
        ctx: Context,
        query: Query,
        txn: Option<TransactionHandle>,
    ) -> Self {
        let position = query.start_cursor().cloned().unwrap_or_default();
        let remaining = query.limit_value();
        let offset_left = query.offset_value();
        QueryIterator {
            datastore,
            ctx,
            query,
            txn,
            buffer: VecDeque::new(),
            position: position.clone(),
            batch_end: position,
            fetched: false,
            more: true,
            remaining,
            offset_left,
        }
    }

    fn fill(&mut self) -> DsResult<bool> {
        while self.buffer.is_empty() {
            if !self.more || self.remaining == Some(0) {
                return Ok(false);
            }

            let mut query = self.query.clone().offset(self.offset_left);
            query = match self.remaining {
                Some(remaining) => query.limit(remaining),
                None => query.unlimited(),
            };
            if self.fetched {
                query = query.start(self.batch_end.clone());
            }

            self.datastore.check_open()?;
            let batch = self
                .datastore
                .provider()
                .run_query(&self.ctx, &query, self.txn.as_ref())?;
            self.fetched = true;
            self.offset_left = self.offset_left.saturating_sub(batch.skipped);
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining = remaining.saturating_sub(batch.results.len());
            }
            if !batch.more_results && batch.results.is_empty() {
                self.position = batch.end_cursor.clone();
            }
            self.more = batch.more_results;
            self.batch_end = batch.end_cursor;
            self.buffer.extend(batch.results);
        }
        Ok(true)
    }

    fn advance(&mut self) -> DsResult<Option<QueryResult>> {
        if !self.fill()? {
            return Ok(None);
        }
        let result = self.buffer.pop_front();
        if let Some(row) = result.as_ref() {
            self.position = row.cursor.clone();
        }
        if self.buffer.is_empty() && !self.more {
            self.position = self.batch_end.clone();
        }
        Ok(result)
    }

    /// Loads the next row into `dst` and returns its key, or `None` when the
    /// results are exhausted.
    ///
    /// A [`ErrorKind::FieldMismatch`] error still consumes the row and leaves
    /// `dst` populated with the properties that fit.
    pub fn next_into<T: PropertyLoadSaver + ?Sized>(&mut self, dst: &mut T) -> DsResult<Option<Key>> {
        match self.advance()? {
            Some(row) => {
                if !self.query.is_keys_only() {
                    dst.load_key(&row.key);
                    dst.load(&row.properties)?;
                }
                Ok(Some(row.key))
            }
            None => Ok(None),
        }
    }

    /// Returns the next key without loading properties.
    pub fn next_key(&mut self) -> DsResult<Option<Key>> {
        Ok(self.advance()?.map(|row| row.key))
    }

    /// The position after the last row returned. Once the results are
    /// exhausted this is the end of the scan.
    pub fn cursor(&self) -> DsResult<Cursor> {
        Ok(self.position.clone())
    }
}

impl Iterator for QueryIterator {
    type Item = DsResult<(Key, PropertyMap)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(row)) => Some(Ok((row.key, row.properties))),
            Ok(None) => None,
            Err(err) => {
                self.more = false;
                self.buffer.clear();
                Some(Err(err))
            }
        }
    }
}
