use std::collections::HashMap;
use std::sync::Arc;

use crate::context::Context;
use crate::dynamic::KindRegistry;
use crate::entity::{touch_for_create, touch_for_update, Entity};
use crate::errors::{DsError, DsResult, ErrorKind};
use crate::query::guard::{require_entities, require_equal_length, require_field, require_key, require_kind};
use crate::query::{self, Aggregations, Client, SavedKey, Transaction};
use crate::store::{Cursor, Datastore, Key, Query, TransactionOptions};
use crate::transaction::Txn;

/// Untyped façade over records of any registered kind.
///
/// # Purpose
/// Works with `dyn Entity` values, so one handle can write and read records
/// of many types. Reads pick the record type from the key's kind through a
/// [`KindRegistry`]; every successful write registers the written type.
///
/// # Characteristics
/// - **Cheap to clone**: clones share the client and the registry
/// - **Uniform not-found**: reads of absent keys fail with
///   [`ErrorKind::NoSuchEntity`], exactly like [`Repo`](crate::repository::Repo)
/// - **Transaction aware**: every operation takes an optional transaction
#[derive(Clone)]
pub struct DsKit {
    inner: Arc<DsKitInner>,
}

struct DsKitInner {
    client: Datastore,
    registry: KindRegistry,
}

impl DsKit {
    pub fn new(client: &Datastore, registry: KindRegistry) -> Self {
        DsKit {
            inner: Arc::new(DsKitInner {
                client: client.clone(),
                registry,
            }),
        }
    }

    pub fn client(&self) -> &Datastore {
        &self.inner.client
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.inner.registry
    }

    /// Begins a read-write transaction on the client.
    pub fn new_txn(&self, ctx: &Context) -> DsResult<Txn> {
        Txn::begin(ctx, &self.inner.client, TransactionOptions::default())
    }

    fn store(&self) -> Option<&dyn Client> {
        Some(&self.inner.client)
    }

    fn kind_query(kind: &str, ancestor: Option<&Key>) -> DsResult<Query> {
        require_kind(kind)?;
        let query = Query::new(kind);
        Ok(match ancestor {
            Some(ancestor) => query.ancestor(ancestor),
            None => query,
        })
    }

    /// Runs `query`, materializing rows as records of `kind`.
    fn scan(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        kind: &str,
        query: &Query,
    ) -> DsResult<(Vec<Box<dyn Entity>>, Cursor)> {
        let factory = self.inner.registry.factory(kind)?;
        query::query_with(ctx, self.store(), txn, Some(query), move || factory())
    }

    /// Writes `entity` under `key`, or under its own new key.
    pub fn create(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        key: Option<&Key>,
        entity: &mut dyn Entity,
    ) -> DsResult<SavedKey> {
        let key = match key {
            Some(key) => key.clone(),
            None => entity.new_key(),
        };
        touch_for_create(entity);
        let saved = query::update(ctx, self.store(), txn, Some(&key), &*entity)?;
        self.inner.registry.remember(&*entity);
        if let SavedKey::Complete(key) = &saved {
            entity.load_key(key);
        }
        Ok(saved)
    }

    /// Creates several records in one write. With no keys, every record is
    /// written under its own new key.
    pub fn create_multi(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        keys: &[Key],
        entities: &mut [Box<dyn Entity>],
    ) -> DsResult<Vec<SavedKey>> {
        require_entities(entities)?;
        let keys = if keys.is_empty() {
            entities.iter().map(|entity| entity.new_key()).collect()
        } else {
            require_equal_length(keys, entities)?;
            keys.to_vec()
        };

        entities.iter_mut().for_each(|entity| touch_for_create(&mut **entity));
        let saved = query::update_multi(ctx, self.store(), txn, &keys, entities)?;
        for (entity, saved) in entities.iter_mut().zip(saved.iter()) {
            self.inner.registry.remember(&**entity);
            if let SavedKey::Complete(key) = saved {
                entity.load_key(key);
            }
        }
        Ok(saved)
    }

    /// Reads the record under `key` as the type registered for its kind.
    ///
    /// # Errors
    /// - [`ErrorKind::NotRegistered`] when no type is known for the kind
    /// - [`ErrorKind::NoSuchEntity`] when nothing is stored under `key`
    pub fn read(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        key: Option<&Key>,
    ) -> DsResult<Box<dyn Entity>> {
        let key = require_key(key)?;
        let mut entity = self.inner.registry.create(key.kind())?;
        query::read(ctx, self.store(), txn, Some(key), &mut *entity)?;
        Ok(entity)
    }

    /// Reads several records, which may be of different kinds.
    pub fn read_multi(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        keys: &[Key],
    ) -> DsResult<Vec<Box<dyn Entity>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut entities = keys
            .iter()
            .map(|key| self.inner.registry.create(key.kind()))
            .collect::<DsResult<Vec<_>>>()?;
        query::read_multi(ctx, self.store(), txn, keys, &mut entities)?;
        Ok(entities)
    }

    /// One page of records of `kind`, resuming at `cursor`.
    #[allow(clippy::too_many_arguments)]
    pub fn list(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        kind: &str,
        ancestor: Option<&Key>,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> DsResult<(Vec<Box<dyn Entity>>, Cursor)> {
        let mut query = Self::kind_query(kind, ancestor)?;
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            query = query.start(Cursor::decode(cursor)?);
        }
        self.scan(ctx, txn, kind, &query)
    }

    /// Every record of `kind`, across as many store batches as needed.
    pub fn list_all(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        kind: &str,
        ancestor: Option<&Key>,
    ) -> DsResult<Vec<Box<dyn Entity>>> {
        let query = Self::kind_query(kind, ancestor)?;
        let (entities, _) = self.scan(ctx, txn, kind, &query)?;
        Ok(entities)
    }

    /// Runs `query` over records of `kind`; `None` lists the whole kind.
    pub fn query(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        kind: &str,
        query: Option<Query>,
    ) -> DsResult<(Vec<Box<dyn Entity>>, Cursor)> {
        let query = match query {
            Some(query) => {
                require_kind(kind)?;
                query
            }
            None => Self::kind_query(kind, None)?,
        };
        self.scan(ctx, txn, kind, &query)
    }

    /// Writes `entity` under `key`, or under its own key.
    ///
    /// # Errors
    /// [`ErrorKind::InvalidKey`] when no key is given and the record has
    /// none.
    pub fn update(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        key: Option<&Key>,
        entity: &mut dyn Entity,
    ) -> DsResult<SavedKey> {
        let key = match key {
            Some(key) => key.clone(),
            None => own_key(entity)?,
        };
        touch_for_update(entity);
        let saved = query::update(ctx, self.store(), txn, Some(&key), &*entity)?;
        self.inner.registry.remember(&*entity);
        Ok(saved)
    }

    /// Updates several records in one write. With no keys, every record is
    /// written under its own key. Empty input writes nothing.
    pub fn update_multi(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        keys: &[Key],
        entities: &mut [Box<dyn Entity>],
    ) -> DsResult<Vec<SavedKey>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let keys = if keys.is_empty() {
            entities
                .iter()
                .map(|entity| own_key(&**entity))
                .collect::<DsResult<Vec<_>>>()?
        } else {
            require_equal_length(keys, entities)?;
            keys.to_vec()
        };

        entities.iter_mut().for_each(|entity| touch_for_update(&mut **entity));
        let saved = query::update_multi(ctx, self.store(), txn, &keys, entities)?;
        entities
            .iter()
            .for_each(|entity| self.inner.registry.remember(&**entity));
        Ok(saved)
    }

    pub fn delete(&self, ctx: &Context, txn: Option<&dyn Transaction>, key: Option<&Key>) -> DsResult<()> {
        query::delete(ctx, self.store(), txn, key)
    }

    pub fn delete_multi(&self, ctx: &Context, txn: Option<&dyn Transaction>, keys: &[Key]) -> DsResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        query::delete_multi(ctx, self.store(), txn, keys)
    }

    pub fn exists(&self, ctx: &Context, txn: Option<&dyn Transaction>, key: Option<&Key>) -> DsResult<bool> {
        query::exists(ctx, self.store(), txn, key)
    }

    pub fn exists_for_query(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<&Query>,
    ) -> DsResult<bool> {
        query::exists_for_query(ctx, self.store(), txn, query)
    }

    /// Number of records of `kind`, optionally under an ancestor.
    pub fn count(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        kind: &str,
        ancestor: Option<&Key>,
    ) -> DsResult<i64> {
        let query = Self::kind_query(kind, ancestor)?;
        query::count_for_query(ctx, self.store(), txn, Some(&query))
    }

    pub fn count_for_query(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<&Query>,
    ) -> DsResult<i64> {
        query::count_for_query(ctx, self.store(), txn, query)
    }

    pub fn sum_field(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<&Query>,
        field: &str,
    ) -> DsResult<f64> {
        query::sum_for_field(ctx, self.store(), txn, query, field)
    }

    /// Sum of `field` and the row count, in one round trip.
    pub fn sum_field_with_count(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<&Query>,
        field: &str,
    ) -> DsResult<(f64, i64)> {
        require_field(field)?;
        let (mut sums, count) = self.sum_fields_with_count(ctx, txn, query, &[field])?;
        Ok((sums.remove(field).unwrap_or_default(), count))
    }

    pub fn sum_fields<S: AsRef<str>>(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<&Query>,
        fields: &[S],
    ) -> DsResult<HashMap<String, f64>> {
        require_named(fields)?;
        query::sum_for_fields(ctx, self.store(), txn, query, fields)
    }

    pub fn sum_fields_with_count<S: AsRef<str>>(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<&Query>,
        fields: &[S],
    ) -> DsResult<(HashMap<String, f64>, i64)> {
        require_named(fields)?;
        let none: &[S] = &[];
        let result =
            query::query_aggregations_with_count(ctx, self.store(), txn, query, fields, none)?;
        Ok((result.sums, result.count.unwrap_or_default()))
    }

    pub fn avg_field(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<&Query>,
        field: &str,
    ) -> DsResult<f64> {
        query::average_for_field(ctx, self.store(), txn, query, field)
    }

    pub fn avg_field_with_count(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<&Query>,
        field: &str,
    ) -> DsResult<(f64, i64)> {
        require_field(field)?;
        let (mut averages, count) = self.avg_fields_with_count(ctx, txn, query, &[field])?;
        Ok((averages.remove(field).unwrap_or_default(), count))
    }

    pub fn avg_fields<S: AsRef<str>>(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<&Query>,
        fields: &[S],
    ) -> DsResult<HashMap<String, f64>> {
        require_named(fields)?;
        query::average_for_fields(ctx, self.store(), txn, query, fields)
    }

    pub fn avg_fields_with_count<S: AsRef<str>>(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<&Query>,
        fields: &[S],
    ) -> DsResult<(HashMap<String, f64>, i64)> {
        require_named(fields)?;
        let none: &[S] = &[];
        let result =
            query::query_aggregations_with_count(ctx, self.store(), txn, query, none, fields)?;
        Ok((result.averages, result.count.unwrap_or_default()))
    }

    pub fn query_aggregations<S: AsRef<str>>(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<&Query>,
        sum_fields: &[S],
        avg_fields: &[S],
    ) -> DsResult<Aggregations> {
        query::query_aggregations(ctx, self.store(), txn, query, sum_fields, avg_fields)
    }

    pub fn query_aggregations_with_count<S: AsRef<str>>(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<&Query>,
        sum_fields: &[S],
        avg_fields: &[S],
    ) -> DsResult<Aggregations> {
        query::query_aggregations_with_count(ctx, self.store(), txn, query, sum_fields, avg_fields)
    }
}

impl std::fmt::Debug for DsKit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DsKit")
            .field("client", &self.inner.client)
            .field("registry", &self.inner.registry)
            .finish()
    }
}

fn own_key(entity: &dyn Entity) -> DsResult<Key> {
    entity.key().ok_or_else(|| {
        DsError::new(
            &format!("{} entity has no key", entity.kind()),
            ErrorKind::InvalidKey,
        )
    })
}

/// Rejects empty names with their position, e.g. `fields[1] cannot be empty`.
fn require_named<S: AsRef<str>>(fields: &[S]) -> DsResult<()> {
    match fields.iter().position(|f| f.as_ref().is_empty()) {
        Some(index) => Err(DsError::new(
            &format!("fields[{}] cannot be empty", index),
            ErrorKind::InvalidArgument,
        )),
        None => Ok(()),
    }
}
