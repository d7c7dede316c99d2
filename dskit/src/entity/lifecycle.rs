use crate::common::{OptionalTime, Property, PropertyMap, CREATED_PROPERTY, UPDATED_PROPERTY};
use crate::entity::{Entity, EntityOptions};
use crate::store::Key;

/// Notifications a record receives right before it is written.
///
/// # Behavior
/// - `prepare_for_create` runs before a create
/// - `prepare_for_update` runs before an update
///
/// Both receive the record type's [`EntityOptions`].
pub trait LifecycleHooks {
    fn prepare_for_create(&mut self, options: &EntityOptions);

    fn prepare_for_update(&mut self, options: &EntityOptions);
}

/// Key and timestamps shared by most entity types.
///
/// Embed it in a record with `#[entity(meta)]` to get the `_created` and
/// `_updated` properties and the stock lifecycle hooks:
///
/// - on create, an unset created timestamp is stamped when enabled, and the
///   updated timestamp is stamped when enabled
/// - on update, the updated timestamp is restamped when enabled; an existing
///   created timestamp is never touched, a missing one is stamped once
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityMeta {
    key: Option<Key>,
    created: OptionalTime,
    updated: OptionalTime,
}

impl EntityMeta {
    pub fn new() -> Self {
        EntityMeta::default()
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn set_key(&mut self, key: Key) {
        self.key = Some(key);
    }

    pub fn created(&self) -> OptionalTime {
        self.created
    }

    pub fn set_created(&mut self, created: OptionalTime) {
        self.created = created;
    }

    pub fn updated(&self) -> OptionalTime {
        self.updated
    }

    pub fn set_updated(&mut self, updated: OptionalTime) {
        self.updated = updated;
    }

    /// True for the property names this struct owns.
    pub fn accepts(name: &str) -> bool {
        name == CREATED_PROPERTY || name == UPDATED_PROPERTY
    }

    /// Loads `_created` or `_updated`; other properties are ignored.
    pub fn load_property(&mut self, property: &Property) {
        match property.name() {
            CREATED_PROPERTY => self.created = OptionalTime::from_property(property),
            UPDATED_PROPERTY => self.updated = OptionalTime::from_property(property),
            _ => {}
        }
    }

    /// Writes the enabled timestamp properties into `props`, as held.
    pub fn save_into(&self, props: &mut PropertyMap, options: &EntityOptions) {
        if options.created_enabled {
            props.insert(
                self.created
                    .to_property(CREATED_PROPERTY, options.created_indexed),
            );
        }
        if options.updated_enabled {
            props.insert(
                self.updated
                    .to_property(UPDATED_PROPERTY, options.updated_indexed),
            );
        }
    }
}

impl LifecycleHooks for EntityMeta {
    fn prepare_for_create(&mut self, options: &EntityOptions) {
        let now = OptionalTime::now();
        if options.created_enabled && !self.created.is_valid() {
            self.created = now;
        }
        if options.updated_enabled {
            self.updated = now;
        }
    }

    fn prepare_for_update(&mut self, options: &EntityOptions) {
        let now = OptionalTime::now();
        if options.created_enabled && !self.created.is_valid() {
            self.created = now;
        }
        if options.updated_enabled {
            self.updated = now;
        }
    }
}

/// Runs the create hook of `entity`, if it has one.
pub fn touch_for_create<E: Entity + ?Sized>(entity: &mut E) {
    let options = entity.options();
    if let Some(hooks) = entity.lifecycle() {
        hooks.prepare_for_create(&options);
    }
}

/// Runs the update hook of `entity`, if it has one.
pub fn touch_for_update<E: Entity + ?Sized>(entity: &mut E) {
    let options = entity.options();
    if let Some(hooks) = entity.lifecycle() {
        hooks.prepare_for_update(&options);
    }
}
