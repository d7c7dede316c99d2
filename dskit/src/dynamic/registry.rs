use std::sync::Arc;

use dashmap::DashMap;

use crate::entity::Entity;
use crate::errors::{DsError, DsResult, ErrorKind};
use crate::query::guard::require_kind;

/// Builds a zero-valued record of one kind.
pub type EntityFactory = Arc<dyn Fn() -> Box<dyn Entity> + Send + Sync>;

/// Maps kind names to the record types used to materialize them.
///
/// # Purpose
/// The dynamic façade reads records without knowing their type statically.
/// The registry supplies, per kind, a constructor for an empty record of the
/// right type that stored properties are then loaded into.
///
/// # Characteristics
/// - **Caller owned**: create one and hand it to every
///   [`DsKit`](crate::dynamic::DsKit) that should share it
/// - **Thread safe**: backed by a `DashMap`, clones share one table
/// - **Append only**: a kind is never removed; registering it again replaces
///   its constructor
#[derive(Clone, Default)]
pub struct KindRegistry {
    inner: Arc<DashMap<String, EntityFactory>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        KindRegistry::default()
    }

    /// Registers `T` under the kind its default value reports.
    pub fn register<T: Entity + Default>(&self) {
        let kind = T::default().kind();
        self.register_factory(&kind, || Box::new(T::default()));
    }

    /// Registers an explicit constructor for `kind`. Empty kinds are
    /// ignored.
    pub fn register_factory<F>(&self, kind: &str, factory: F)
    where
        F: Fn() -> Box<dyn Entity> + Send + Sync + 'static,
    {
        if kind.is_empty() {
            return;
        }
        self.inner.insert(kind.to_string(), Arc::new(factory));
    }

    /// Registers the type of `entity` under its kind.
    pub(crate) fn remember(&self, entity: &dyn Entity) {
        let kind = entity.kind();
        if kind.is_empty() {
            return;
        }
        self.inner.entry(kind.clone()).or_insert_with(|| {
            log::debug!("registering entity type for kind {:?}", kind);
            let prototype = entity.new_instance();
            let factory: EntityFactory = Arc::new(move || prototype.new_instance());
            factory
        });
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.inner.contains_key(kind)
    }

    /// Every registered kind, in no particular order.
    pub fn kinds(&self) -> Vec<String> {
        self.inner.iter().map(|entry| entry.key().clone()).collect()
    }

    /// The constructor registered for `kind`.
    ///
    /// # Errors
    /// [`ErrorKind::NotRegistered`] when nothing is registered for `kind`.
    pub fn factory(&self, kind: &str) -> DsResult<EntityFactory> {
        require_kind(kind)?;
        self.inner
            .get(kind)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                DsError::new(
                    &format!("entity type for kind {:?} not registered", kind),
                    ErrorKind::NotRegistered,
                )
            })
    }

    /// A fresh empty record of `kind`.
    pub fn create(&self, kind: &str) -> DsResult<Box<dyn Entity>> {
        let factory = self.factory(kind)?;
        Ok(factory())
    }
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
