use std::any::Any;

use crate::common::PropertyMap;
use crate::entity::LifecycleHooks;
use crate::errors::DsResult;
use crate::store::Key;

/// Conversion between a record and the property set the store persists.
///
/// # Behavior
/// - `save` produces every property to write, with its index flag
/// - `load` populates the record from stored properties. Properties that do
///   not fit (unknown names, wrong types) are skipped and reported together
///   as one [`ErrorKind::FieldMismatch`](crate::errors::ErrorKind) error,
///   after everything that did fit has been loaded
/// - `load_key` receives the key the record was read under
///
/// Usually implemented by `#[derive(Entity)]`. [`PropertyMap`] implements it
/// as a schemaless row that accepts any properties.
pub trait PropertyLoadSaver {
    fn load(&mut self, properties: &PropertyMap) -> DsResult<()>;

    fn save(&self) -> DsResult<PropertyMap>;

    fn load_key(&mut self, _key: &Key) {}
}

impl PropertyLoadSaver for PropertyMap {
    fn load(&mut self, properties: &PropertyMap) -> DsResult<()> {
        *self = properties.clone();
        Ok(())
    }

    fn save(&self) -> DsResult<PropertyMap> {
        Ok(self.clone())
    }
}

impl<T: PropertyLoadSaver + ?Sized> PropertyLoadSaver for Box<T> {
    fn load(&mut self, properties: &PropertyMap) -> DsResult<()> {
        (**self).load(properties)
    }

    fn save(&self) -> DsResult<PropertyMap> {
        (**self).save()
    }

    fn load_key(&mut self, key: &Key) {
        (**self).load_key(key)
    }
}

impl<T: PropertyLoadSaver + ?Sized> PropertyLoadSaver for &mut T {
    fn load(&mut self, properties: &PropertyMap) -> DsResult<()> {
        (**self).load(properties)
    }

    fn save(&self) -> DsResult<PropertyMap> {
        (**self).save()
    }

    fn load_key(&mut self, key: &Key) {
        (**self).load_key(key)
    }
}

/// Per-type switches for the automatic `_created` / `_updated` timestamps.
///
/// The default enables an unindexed created timestamp and disables the
/// updated timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityOptions {
    pub created_enabled: bool,
    pub created_indexed: bool,
    pub updated_enabled: bool,
    pub updated_indexed: bool,
}

impl Default for EntityOptions {
    fn default() -> Self {
        EntityOptions {
            created_enabled: true,
            created_indexed: false,
            updated_enabled: false,
            updated_indexed: false,
        }
    }
}

impl EntityOptions {
    /// Options with both timestamps disabled.
    pub fn disabled() -> Self {
        EntityOptions {
            created_enabled: false,
            created_indexed: false,
            updated_enabled: false,
            updated_indexed: false,
        }
    }

    pub fn with_created(mut self, enabled: bool, indexed: bool) -> Self {
        self.created_enabled = enabled;
        self.created_indexed = indexed;
        self
    }

    pub fn with_updated(mut self, enabled: bool, indexed: bool) -> Self {
        self.updated_enabled = enabled;
        self.updated_indexed = indexed;
        self
    }
}

/// A record type stored under one kind.
///
/// # Purpose
/// The only protocol a record type has to implement to be used with
/// [`Repo`](crate::repository::Repo) and [`DsKit`](crate::dynamic::DsKit).
///
/// # Methods
/// * `kind()` - the storage category, e.g. `"Widget"`
/// * `key()` - the key this record is stored under, `None` before it is saved
/// * `new_key()` - a fresh incomplete key for creating this record
/// * `options()` - timestamp switches, see [`EntityOptions`]
/// * `lifecycle()` - the optional create/update hooks
/// * `new_instance()` - a zero value of the same type, used by the dynamic
///   façade to materialize records by kind
///
/// # Usage
/// ```ignore
/// #[derive(Entity, Default, Clone, Debug, PartialEq)]
/// #[entity(kind = "Widget", updated(enabled = true))]
/// pub struct Widget {
///     #[entity(meta)]
///     meta: EntityMeta,
///     name: String,
///     #[entity(no_index)]
///     description: String,
/// }
/// ```
pub trait Entity: PropertyLoadSaver + Any + Send + Sync {
    fn kind(&self) -> String;

    fn key(&self) -> Option<Key>;

    fn new_key(&self) -> Key {
        Key::incomplete(&self.kind(), None)
    }

    fn options(&self) -> EntityOptions {
        EntityOptions::default()
    }

    fn lifecycle(&mut self) -> Option<&mut dyn LifecycleHooks> {
        None
    }

    fn new_instance(&self) -> Box<dyn Entity>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Entity {
    /// Downcasts a dynamically typed entity to its concrete type.
    pub fn downcast_ref<T: Entity>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Entity>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

impl std::fmt::Debug for dyn Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.key() {
            Some(key) => write!(f, "Entity[{}]", key),
            None => write!(f, "Entity[{}(?)]", self.kind()),
        }
    }
}
