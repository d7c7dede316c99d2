use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::Context;
use crate::entity::{touch_for_create, touch_for_update, Entity, PropertyLoadSaver};
use crate::errors::{DsError, DsResult, ErrorKind};
use crate::query::guard::{require_equal_length, require_kind};
use crate::query::{self, Aggregations, Client, SavedKey, Transaction};
use crate::store::{Cursor, Datastore, Key, Query};

/// Typed repository over the entities of one kind.
///
/// # Purpose
/// Binds a record type `E` to its kind and a store client, so callers work
/// with `E` values instead of property maps and raw queries.
///
/// # Characteristics
/// - **Cheap to clone**: clones share one client and kind
/// - **Lifecycle aware**: runs the create and update hooks of `E` before
///   every write
/// - **Transaction aware**: every operation takes an optional transaction
///
/// Not found is always reported as [`ErrorKind::NoSuchEntity`].
pub struct Repo<E> {
    inner: Arc<RepoInner>,
    _entity: PhantomData<fn() -> E>,
}

struct RepoInner {
    client: Datastore,
    kind: String,
}

impl<E> Clone for Repo<E> {
    fn clone(&self) -> Self {
        Repo {
            inner: self.inner.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity + Default> Repo<E> {
    /// A repository for `kind`.
    pub fn new(client: &Datastore, kind: &str) -> DsResult<Self> {
        require_kind(kind)?;
        Ok(Repo {
            inner: Arc::new(RepoInner {
                client: client.clone(),
                kind: kind.to_string(),
            }),
            _entity: PhantomData,
        })
    }

    /// A repository for the kind `E` declares.
    pub fn for_entity(client: &Datastore) -> Self {
        Repo {
            inner: Arc::new(RepoInner {
                client: client.clone(),
                kind: E::default().kind(),
            }),
            _entity: PhantomData,
        }
    }

    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    pub fn client(&self) -> &Datastore {
        &self.inner.client
    }

    fn store(&self) -> Option<&dyn Client> {
        Some(&self.inner.client)
    }

    /// Query over every entity of the bound kind, optionally under an
    /// ancestor.
    fn base_query(&self, ancestor: Option<&Key>) -> Query {
        let query = Query::new(&self.inner.kind);
        match ancestor {
            Some(ancestor) => query.ancestor(ancestor),
            None => query,
        }
    }

    fn paged(&self, ancestor: Option<&Key>, limit: Option<usize>, cursor: Option<&str>) -> DsResult<Query> {
        let mut query = self.base_query(ancestor);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            query = query.start(Cursor::decode(cursor)?);
        }
        Ok(query)
    }

    fn offset_paged(&self, ancestor: Option<&Key>, limit: Option<usize>, offset: usize) -> Query {
        let mut query = self.base_query(ancestor).offset(offset);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        query
    }

    /// The key a new entity is written under: an incomplete key of the bound
    /// kind under `ancestor`, or under the entity's own parent when no
    /// ancestor is given.
    fn creation_key(&self, ancestor: Option<&Key>, entity: &E) -> Key {
        match ancestor {
            Some(ancestor) => Key::incomplete(&self.inner.kind, Some(ancestor)),
            None => Key::incomplete(&self.inner.kind, entity.new_key().parent()),
        }
    }

    /// Creates `entity` under a fresh key.
    ///
    /// Runs the create hook, then writes. Outside a transaction the assigned
    /// key is loaded back into `entity`; inside one it is pending until
    /// commit.
    pub fn create(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        ancestor: Option<&Key>,
        entity: &mut E,
    ) -> DsResult<SavedKey> {
        let key = self.creation_key(ancestor, entity);
        self.create_with_key(ctx, txn, &key, entity)
    }

    /// Creates `entity` under `key`.
    pub fn create_with_key(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        key: &Key,
        entity: &mut E,
    ) -> DsResult<SavedKey> {
        touch_for_create(entity);
        let saved = query::update(ctx, self.store(), txn, Some(key), &*entity)?;
        if let SavedKey::Complete(key) = &saved {
            entity.load_key(key);
        }
        log::debug!("created {} entity {}", self.inner.kind, saved.key());
        Ok(saved)
    }

    /// Creates several entities in one write. Empty input writes nothing.
    pub fn create_multi(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        ancestor: Option<&Key>,
        entities: &mut [E],
    ) -> DsResult<Vec<SavedKey>> {
        let keys = entities
            .iter()
            .map(|entity| self.creation_key(ancestor, entity))
            .collect::<Vec<_>>();
        self.create_multi_with_keys(ctx, txn, &keys, entities)
    }

    /// Creates several entities under the given keys, one key per entity.
    pub fn create_multi_with_keys(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        keys: &[Key],
        entities: &mut [E],
    ) -> DsResult<Vec<SavedKey>> {
        require_equal_length(keys, entities)?;
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        entities.iter_mut().for_each(|entity| touch_for_create(entity));
        let saved = query::update_multi(ctx, self.store(), txn, keys, entities)?;
        for (entity, saved) in entities.iter_mut().zip(saved.iter()) {
            if let SavedKey::Complete(key) = saved {
                entity.load_key(key);
            }
        }
        Ok(saved)
    }

    pub fn read(&self, ctx: &Context, txn: Option<&dyn Transaction>, key: &Key) -> DsResult<E> {
        let mut entity = E::default();
        query::read(ctx, self.store(), txn, Some(key), &mut entity)?;
        Ok(entity)
    }

    /// Reads several entities, in key order. Every key must exist.
    pub fn read_multi(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        keys: &[Key],
    ) -> DsResult<Vec<E>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut entities: Vec<E> = keys.iter().map(|_| E::default()).collect();
        query::read_multi(ctx, self.store(), txn, keys, &mut entities)?;
        Ok(entities)
    }

    /// One page of entities, resuming at `cursor` (the string form of a
    /// cursor returned by an earlier page). `None` for `limit` means no
    /// limit.
    ///
    /// # Errors
    /// [`ErrorKind::InvalidCursor`] when `cursor` cannot be decoded.
    pub fn list(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        ancestor: Option<&Key>,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> DsResult<(Vec<E>, Cursor)> {
        let query = self.paged(ancestor, limit, cursor)?;
        query::query(ctx, self.store(), txn, Some(&query))
    }

    /// One page of entities addressed by offset.
    pub fn list_page(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        ancestor: Option<&Key>,
        limit: Option<usize>,
        offset: usize,
    ) -> DsResult<(Vec<E>, Cursor)> {
        let query = self.offset_paged(ancestor, limit, offset);
        query::query(ctx, self.store(), txn, Some(&query))
    }

    pub fn list_keys(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        ancestor: Option<&Key>,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> DsResult<(Vec<Key>, Cursor)> {
        let query = self.paged(ancestor, limit, cursor)?;
        query::query_keys(ctx, self.store(), txn, Some(&query))
    }

    /// Every entity of the kind, across as many store batches as needed.
    pub fn list_all(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        ancestor: Option<&Key>,
    ) -> DsResult<Vec<E>> {
        let query = self.base_query(ancestor);
        let (entities, _) = query::query(ctx, self.store(), txn, Some(&query))?;
        Ok(entities)
    }

    pub fn list_all_keys(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        ancestor: Option<&Key>,
    ) -> DsResult<Vec<Key>> {
        let query = self.base_query(ancestor);
        let (keys, _) = query::query_keys(ctx, self.store(), txn, Some(&query))?;
        Ok(keys)
    }

    /// Like [`list`](Self::list), but loads only `fields` into rows made by
    /// `make`.
    #[allow(clippy::too_many_arguments)]
    pub fn list_projection<P, F, S>(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        ancestor: Option<&Key>,
        limit: Option<usize>,
        cursor: Option<&str>,
        make: F,
        fields: &[S],
    ) -> DsResult<(Vec<P>, Cursor)>
    where
        P: PropertyLoadSaver,
        F: Fn() -> P,
        S: AsRef<str>,
    {
        let query = self.paged(ancestor, limit, cursor)?;
        query::project(ctx, self.store(), txn, Some(&query), make, fields)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn list_page_projection<P, F, S>(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        ancestor: Option<&Key>,
        limit: Option<usize>,
        offset: usize,
        make: F,
        fields: &[S],
    ) -> DsResult<(Vec<P>, Cursor)>
    where
        P: PropertyLoadSaver,
        F: Fn() -> P,
        S: AsRef<str>,
    {
        let query = self.offset_paged(ancestor, limit, offset);
        query::project(ctx, self.store(), txn, Some(&query), make, fields)
    }

    pub fn list_all_projection<P, F, S>(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        ancestor: Option<&Key>,
        make: F,
        fields: &[S],
    ) -> DsResult<Vec<P>>
    where
        P: PropertyLoadSaver,
        F: Fn() -> P,
        S: AsRef<str>,
    {
        let query = self.base_query(ancestor);
        let (rows, _) = query::project(ctx, self.store(), txn, Some(&query), make, fields)?;
        Ok(rows)
    }

    /// Writes `entity` back under its own key.
    ///
    /// # Errors
    /// [`ErrorKind::InvalidKey`] when the entity has no key yet.
    pub fn update(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        entity: &mut E,
    ) -> DsResult<SavedKey> {
        let key = own_key(entity)?;
        self.update_with_key(ctx, txn, &key, entity)
    }

    pub fn update_with_key(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        key: &Key,
        entity: &mut E,
    ) -> DsResult<SavedKey> {
        touch_for_update(entity);
        query::update(ctx, self.store(), txn, Some(key), &*entity)
    }

    pub fn update_multi(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        entities: &mut [E],
    ) -> DsResult<Vec<SavedKey>> {
        let keys = entities
            .iter()
            .map(|entity| own_key(entity))
            .collect::<DsResult<Vec<_>>>()?;
        self.update_multi_with_keys(ctx, txn, &keys, entities)
    }

    pub fn update_multi_with_keys(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        keys: &[Key],
        entities: &mut [E],
    ) -> DsResult<Vec<SavedKey>> {
        require_equal_length(keys, entities)?;
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        entities.iter_mut().for_each(|entity| touch_for_update(entity));
        query::update_multi(ctx, self.store(), txn, keys, entities)
    }

    pub fn delete(&self, ctx: &Context, txn: Option<&dyn Transaction>, key: &Key) -> DsResult<()> {
        query::delete(ctx, self.store(), txn, Some(key))
    }

    pub fn delete_multi(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        keys: &[Key],
    ) -> DsResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        query::delete_multi(ctx, self.store(), txn, keys)
    }

    /// Runs `query`, or lists every entity of the kind when it is `None`.
    pub fn query(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<Query>,
    ) -> DsResult<(Vec<E>, Cursor)> {
        let query = query.unwrap_or_else(|| self.base_query(None));
        query::query(ctx, self.store(), txn, Some(&query))
    }

    pub fn query_one(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Query,
    ) -> DsResult<E> {
        query::query_one(ctx, self.store(), txn, Some(&query))
    }

    pub fn exists(&self, ctx: &Context, txn: Option<&dyn Transaction>, key: &Key) -> DsResult<bool> {
        query::exists(ctx, self.store(), txn, Some(key))
    }

    /// Number of entities of the kind, optionally under an ancestor.
    pub fn count(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        ancestor: Option<&Key>,
    ) -> DsResult<i64> {
        let query = self.base_query(ancestor);
        query::count_for_query(ctx, self.store(), txn, Some(&query))
    }

    /// Sums `fields` over `query`, or over every entity of the kind.
    pub fn sum_fields<S: AsRef<str>>(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<Query>,
        fields: &[S],
    ) -> DsResult<HashMap<String, f64>> {
        let query = query.unwrap_or_else(|| self.base_query(None));
        query::sum_for_fields(ctx, self.store(), txn, Some(&query), fields)
    }

    pub fn avg_fields<S: AsRef<str>>(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<Query>,
        fields: &[S],
    ) -> DsResult<HashMap<String, f64>> {
        let query = query.unwrap_or_else(|| self.base_query(None));
        query::average_for_fields(ctx, self.store(), txn, Some(&query), fields)
    }

    /// Count, sums and averages over `query` (or every entity of the kind)
    /// in one round trip.
    pub fn aggregate<S: AsRef<str>>(
        &self,
        ctx: &Context,
        txn: Option<&dyn Transaction>,
        query: Option<Query>,
        sum_fields: &[S],
        avg_fields: &[S],
    ) -> DsResult<Aggregations> {
        let query = query.unwrap_or_else(|| self.base_query(None));
        query::query_aggregations_with_count(
            ctx,
            self.store(),
            txn,
            Some(&query),
            sum_fields,
            avg_fields,
        )
    }
}

fn own_key<E: Entity>(entity: &E) -> DsResult<Key> {
    entity.key().ok_or_else(|| {
        DsError::new(
            &format!("{} entity has no key", entity.kind()),
            ErrorKind::InvalidKey,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{field, TransactionOptions};
    use crate::test_util::{counting_client, widget, Widget};

    fn repo() -> (Repo<Widget>, crate::test_util::CallCounter) {
        let (client, calls) = counting_client();
        (Repo::for_entity(&client), calls)
    }

    #[test]
    fn test_kind_comes_from_entity() {
        let (repo, _) = repo();
        assert_eq!(repo.kind(), "Widget");
        let err = Repo::<Widget>::new(repo.client(), "").err().unwrap();
        assert_eq!(err.message(), "kind cannot be empty");
    }

    #[test]
    fn test_create_assigns_key_and_stamps() {
        let (repo, _) = repo();
        let ctx = Context::background();
        let mut bolt = widget("bolt", 4);
        let saved = repo.create(&ctx, None, None, &mut bolt).unwrap();

        let key = bolt.key().unwrap();
        assert_eq!(Some(&key), saved.complete());
        assert_eq!(key.kind(), "Widget");
        assert!(key.id().is_some());
        assert!(bolt.meta.created().is_valid());

        let loaded = repo.read(&ctx, None, &key).unwrap();
        assert_eq!(loaded, bolt);
    }

    #[test]
    fn test_create_under_ancestor() {
        let (repo, _) = repo();
        let ctx = Context::background();
        let shop = Key::name_key("Shop", "main", None);
        let mut bolt = widget("bolt", 4);
        repo.create(&ctx, None, Some(&shop), &mut bolt).unwrap();
        assert_eq!(bolt.key().unwrap().parent(), Some(&shop));
        assert_eq!(repo.count(&ctx, None, Some(&shop)).unwrap(), 1);
        assert_eq!(repo.count(&ctx, None, None).unwrap(), 1);
    }

    #[test]
    fn test_create_uses_bound_kind() {
        let (client, _) = counting_client();
        let repo = Repo::<Widget>::new(&client, "Gizmo").unwrap();
        let ctx = Context::background();
        let mut bolt = widget("bolt", 4);
        repo.create(&ctx, None, None, &mut bolt).unwrap();
        assert_eq!(bolt.key().unwrap().kind(), "Gizmo");

        let mut more = vec![widget("nut", 1), widget("gear", 2)];
        repo.create_multi(&ctx, None, None, &mut more).unwrap();
        assert!(more.iter().all(|w| w.key().unwrap().kind() == "Gizmo"));

        let (listed, _) = repo.list(&ctx, None, None, None, None).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(repo.count(&ctx, None, None).unwrap(), 3);
        assert_eq!(Repo::<Widget>::for_entity(&client).count(&ctx, None, None).unwrap(), 0);
    }

    #[test]
    fn test_repeated_updates_keep_created() {
        let (repo, _) = repo();
        let ctx = Context::background();
        let key = Key::name_key("Widget", "bolt", None);
        let mut bolt = widget("bolt", 4);

        repo.update_with_key(&ctx, None, &key, &mut bolt).unwrap();
        let first = repo.read(&ctx, None, &key).unwrap().meta.created();
        assert!(first.is_valid());
        assert_eq!(bolt.meta.created(), first);

        std::thread::sleep(std::time::Duration::from_millis(2));
        bolt.size = 5;
        repo.update_with_key(&ctx, None, &key, &mut bolt).unwrap();
        assert_eq!(repo.read(&ctx, None, &key).unwrap().meta.created(), first);
    }

    #[test]
    fn test_update_restamps_updated() {
        let (repo, _) = repo();
        let ctx = Context::background();
        let mut bolt = widget("bolt", 4);
        repo.create(&ctx, None, None, &mut bolt).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));

        bolt.size = 8;
        repo.update(&ctx, None, &mut bolt).unwrap();
        let loaded = repo.read(&ctx, None, &bolt.key().unwrap()).unwrap();
        assert_eq!(loaded.size, 8);
        assert!(loaded.meta.updated() > loaded.meta.created());
    }

    #[test]
    fn test_update_without_key_fails() {
        let (repo, calls) = repo();
        let ctx = Context::background();
        let err = repo.update(&ctx, None, &mut widget("x", 1)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidKey);
        assert_eq!(calls.total(), 0);
    }

    #[test]
    fn test_multi_length_mismatch_writes_nothing() {
        let (repo, calls) = repo();
        let ctx = Context::background();
        let keys = vec![Key::name_key("Widget", "a", None)];
        let mut widgets = vec![widget("a", 1), widget("b", 2)];
        let err = repo
            .create_multi_with_keys(&ctx, None, &keys, &mut widgets)
            .unwrap_err();
        assert_eq!(err.message(), "keys and entities must have the same length");
        assert_eq!(calls.total(), 0);
        assert!(repo.create_multi(&ctx, None, None, &mut []).unwrap().is_empty());
    }

    #[test]
    fn test_list_resumes_from_cursor() {
        let (repo, _) = repo();
        let ctx = Context::background();
        let mut widgets: Vec<Widget> = (1..=5).map(|n| widget(&format!("w{}", n), n)).collect();
        repo.create_multi(&ctx, None, None, &mut widgets).unwrap();

        let (first, cursor) = repo.list(&ctx, None, None, Some(2), None).unwrap();
        let encoded = cursor.encode();
        let (second, _) = repo.list(&ctx, None, None, Some(10), Some(&encoded)).unwrap();
        assert_eq!(first.len() + second.len(), 5);
        assert!(first.iter().all(|w| !second.contains(w)));

        let err = repo.list(&ctx, None, None, Some(2), Some("%%%")).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidCursor);
    }

    #[test]
    fn test_list_page_and_projection() {
        let (repo, _) = repo();
        let ctx = Context::background();
        let mut widgets: Vec<Widget> = (1..=4).map(|n| widget(&format!("w{}", n), n)).collect();
        repo.create_multi(&ctx, None, None, &mut widgets).unwrap();

        let (page, _) = repo.list_page(&ctx, None, None, Some(2), 3).unwrap();
        assert_eq!(page.len(), 1);

        let sizes = repo
            .list_all_projection(&ctx, None, None, crate::common::PropertyMap::new, &["size"])
            .unwrap();
        assert_eq!(sizes.len(), 4);
        assert!(sizes.iter().all(|row| row.len() == 1));
        assert_eq!(repo.list_all_keys(&ctx, None, None).unwrap().len(), 4);
    }

    #[test]
    fn test_delete_then_exists() {
        let (repo, _) = repo();
        let ctx = Context::background();
        let mut bolt = widget("bolt", 4);
        repo.create(&ctx, None, None, &mut bolt).unwrap();
        let key = bolt.key().unwrap();
        assert!(repo.exists(&ctx, None, &key).unwrap());

        repo.delete(&ctx, None, &key).unwrap();
        assert!(!repo.exists(&ctx, None, &key).unwrap());
        assert!(repo.read(&ctx, None, &key).unwrap_err().is_not_found());
    }

    #[test]
    fn test_query_and_aggregate() {
        let (repo, _) = repo();
        let ctx = Context::background();
        let mut widgets: Vec<Widget> = (1..=4).map(|n| widget(&format!("w{}", n), n)).collect();
        repo.create_multi(&ctx, None, None, &mut widgets).unwrap();

        let (all, _) = repo.query(&ctx, None, None).unwrap();
        assert_eq!(all.len(), 4);

        let big = repo
            .query_one(&ctx, None, Query::new("Widget").filter(field("size").gt(3)))
            .unwrap();
        assert_eq!(big.size, 4);

        let result = repo.aggregate(&ctx, None, None, &["size"], &["size"]).unwrap();
        assert_eq!(result.count, Some(4));
        assert_eq!(result.sums["size"], 10.0);
        assert_eq!(result.averages["size"], 2.5);
    }

    #[test]
    fn test_create_in_transaction_is_pending() {
        let (repo, _) = repo();
        let ctx = Context::background();
        let txn = repo
            .client()
            .new_transaction(&ctx, TransactionOptions::default())
            .unwrap();

        let mut bolt = widget("bolt", 4);
        let saved = repo.create(&ctx, Some(&txn), None, &mut bolt).unwrap();
        assert!(bolt.key().is_none());
        let commit = txn.commit().unwrap();

        let key = saved.resolve(&commit).unwrap();
        assert_eq!(repo.read(&ctx, None, &key).unwrap().name, "bolt");
    }
}
