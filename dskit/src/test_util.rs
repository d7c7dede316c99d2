use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::client_config::ClientConfig;
use crate::common::{Convertible, PropertyMap};
use crate::context::Context;
use crate::entity::{Entity, EntityMeta, EntityOptions, LifecycleHooks, PropertyLoadSaver};
use crate::errors::{DsError, DsResult, ErrorKind};
use crate::store::memory::{IdAllocation, InMemoryDatastore, MemoryStoreConfig};
use crate::store::{
    AggregationQuery, AggregationResult, Datastore, DatastoreProvider, Key, Mutation, Query,
    QueryBatch, TransactionHandle, TransactionOptions,
};

// Setup only one time throughout the crate's tests.
#[ctor::ctor]
fn init() {
    colog::init();
}

/// Shared view of the calls a [`CountingProvider`] received.
#[derive(Clone, Default)]
pub(crate) struct CallCounter {
    calls: Arc<AtomicUsize>,
    fail_rollback: Arc<AtomicBool>,
}

impl CallCounter {
    pub(crate) fn total(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes every following rollback fail.
    pub(crate) fn fail_rollbacks(&self) {
        self.fail_rollback.store(true, Ordering::SeqCst);
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory provider that counts every call it receives.
pub(crate) struct CountingProvider {
    inner: InMemoryDatastore,
    counter: CallCounter,
}

impl DatastoreProvider for CountingProvider {
    fn lookup(
        &self,
        ctx: &Context,
        keys: &[Key],
        txn: Option<&TransactionHandle>,
    ) -> DsResult<Vec<Option<PropertyMap>>> {
        self.counter.hit();
        self.inner.lookup(ctx, keys, txn)
    }

    fn commit(
        &self,
        ctx: &Context,
        mutations: Vec<Mutation>,
        txn: Option<&TransactionHandle>,
    ) -> DsResult<Vec<Key>> {
        self.counter.hit();
        self.inner.commit(ctx, mutations, txn)
    }

    fn run_query(
        &self,
        ctx: &Context,
        query: &Query,
        txn: Option<&TransactionHandle>,
    ) -> DsResult<QueryBatch> {
        self.counter.hit();
        self.inner.run_query(ctx, query, txn)
    }

    fn run_aggregation(
        &self,
        ctx: &Context,
        query: &AggregationQuery,
        txn: Option<&TransactionHandle>,
    ) -> DsResult<AggregationResult> {
        self.counter.hit();
        self.inner.run_aggregation(ctx, query, txn)
    }

    fn begin_transaction(
        &self,
        ctx: &Context,
        options: &TransactionOptions,
    ) -> DsResult<TransactionHandle> {
        self.counter.hit();
        self.inner.begin_transaction(ctx, options)
    }

    fn rollback(&self, ctx: &Context, txn: &TransactionHandle) -> DsResult<()> {
        self.counter.hit();
        if self.counter.fail_rollback.load(Ordering::SeqCst) {
            return Err(DsError::new("rollback failed", ErrorKind::BackendError));
        }
        self.inner.rollback(ctx, txn)
    }
}

/// A client over a fresh counting in-memory store with sequential ids.
pub(crate) fn counting_client() -> (Datastore, CallCounter) {
    let counter = CallCounter::default();
    let provider = CountingProvider {
        inner: InMemoryDatastore::with_config(
            MemoryStoreConfig::new().with_id_allocation(IdAllocation::Sequential),
        ),
        counter: counter.clone(),
    };
    (Datastore::new(provider, ClientConfig::local()), counter)
}

/// A hand-written entity with metadata, used by the crate's unit tests.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Widget {
    pub meta: EntityMeta,
    pub name: String,
    pub size: i64,
}

impl PropertyLoadSaver for Widget {
    fn load(&mut self, properties: &PropertyMap) -> DsResult<()> {
        let mut mismatched = Vec::new();
        for property in properties.iter() {
            let loaded = match property.name() {
                "name" => String::from_value(property.value()).map(|v| self.name = v),
                "size" => i64::from_value(property.value()).map(|v| self.size = v),
                name if EntityMeta::accepts(name) => {
                    self.meta.load_property(property);
                    Ok(())
                }
                _ => Err(DsError::new("unknown field", ErrorKind::FieldMismatch)),
            };
            if loaded.is_err() {
                mismatched.push(property.name().to_string());
            }
        }
        if mismatched.is_empty() {
            Ok(())
        } else {
            Err(DsError::field_mismatch("Widget", &mismatched))
        }
    }

    fn save(&self) -> DsResult<PropertyMap> {
        let mut properties = PropertyMap::new();
        self.meta.save_into(&mut properties, &self.options());
        properties.put("name", self.name.as_str(), true);
        properties.put("size", self.size, true);
        Ok(properties)
    }

    fn load_key(&mut self, key: &Key) {
        self.meta.set_key(key.clone());
    }
}

impl Entity for Widget {
    fn kind(&self) -> String {
        "Widget".to_string()
    }

    fn key(&self) -> Option<Key> {
        self.meta.key().cloned()
    }

    fn options(&self) -> EntityOptions {
        EntityOptions::default().with_updated(true, false)
    }

    fn lifecycle(&mut self) -> Option<&mut dyn LifecycleHooks> {
        Some(&mut self.meta)
    }

    fn new_instance(&self) -> Box<dyn Entity> {
        Box::new(Widget::default())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) fn widget(name: &str, size: i64) -> Widget {
    Widget {
        name: name.to_string(),
        size,
        ..Widget::default()
    }
}

/// Stores widgets `1..=count` under id keys, `size` equal to the id.
pub(crate) fn seed_widgets(client: &Datastore, count: i64) -> Vec<Key> {
    let ctx = Context::background();
    let keys: Vec<Key> = (1..=count).map(|n| Key::id_key("Widget", n, None)).collect();
    let widgets: Vec<Widget> = (1..=count).map(|n| widget(&format!("w{}", n), n)).collect();
    client
        .put_multi(&ctx, &keys, &widgets)
        .expect("seeding widgets")
}
