use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};

use indexmap::IndexMap;

use crate::common::Value;

/// A single named value together with its index flag.
///
/// Properties with `no_index` set are stored but cannot be used in filters,
/// orders or projections.
#[derive(Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Property {
    name: String,
    value: Value,
    no_index: bool,
}

impl Property {
    /// Creates an indexed property.
    pub fn new<T: Into<Value>>(name: &str, value: T) -> Self {
        Property {
            name: name.to_string(),
            value: value.into(),
            no_index: false,
        }
    }

    /// Creates a property that the store will not index.
    pub fn unindexed<T: Into<Value>>(name: &str, value: T) -> Self {
        Property {
            name: name.to_string(),
            value: value.into(),
            no_index: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn no_index(&self) -> bool {
        self.no_index
    }
}

impl Debug for Property {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.no_index {
            write!(f, "{}={:?} (noindex)", self.name, self.value)
        } else {
            write!(f, "{}={:?}", self.name, self.value)
        }
    }
}

/// The properties of one entity, in insertion order.
///
/// A `PropertyMap` is what the store actually persists. It also serves as a
/// schemaless row type for projections: loading into a `PropertyMap` accepts
/// any set of properties.
#[derive(Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PropertyMap {
    properties: IndexMap<String, Property>,
}

impl PropertyMap {
    pub fn new() -> Self {
        PropertyMap::default()
    }

    /// Inserts or replaces a property.
    pub fn put<T: Into<Value>>(&mut self, name: &str, value: T, indexed: bool) {
        let property = if indexed {
            Property::new(name, value)
        } else {
            Property::unindexed(name, value)
        };
        self.properties.insert(name.to_string(), property);
    }

    /// Inserts or replaces a ready-made property.
    pub fn insert(&mut self, property: Property) {
        self.properties.insert(property.name.clone(), property);
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// The value of `name`, if present.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).map(Property::value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Property> {
        self.properties.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Keeps only the named properties, in the order given.
    pub(crate) fn project(&self, fields: &[String]) -> PropertyMap {
        let mut projected = PropertyMap::new();
        for field in fields {
            if let Some(property) = self.properties.get(field) {
                projected.insert(property.clone());
            }
        }
        projected
    }

    pub(crate) fn normalized(self) -> PropertyMap {
        let properties = self
            .properties
            .into_iter()
            .map(|(name, property)| {
                let Property {
                    name: prop_name,
                    value,
                    no_index,
                } = property;
                (
                    name,
                    Property {
                        name: prop_name,
                        value: value.normalized(),
                        no_index,
                    },
                )
            })
            .collect();
        PropertyMap { properties }
    }
}

impl PartialOrd for PropertyMap {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for PropertyMap {}

impl Ord for PropertyMap {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.iter().map(|p| (p.name(), p.value()));
        let right = other.iter().map(|p| (p.name(), p.value()));
        left.cmp(right)
    }
}

impl FromIterator<Property> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
        let mut map = PropertyMap::new();
        for property in iter {
            map.insert(property);
        }
        map
    }
}

impl IntoIterator for PropertyMap {
    type Item = Property;
    type IntoIter = indexmap::map::IntoValues<String, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.into_values()
    }
}

impl Debug for PropertyMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl Display for PropertyMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, property) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", property.name(), property.value())?;
        }
        write!(f, "}}")
    }
}
