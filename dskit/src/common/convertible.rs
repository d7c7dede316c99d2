use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::common::{PropertyMap, Value};
use crate::errors::{DsError, DsResult, ErrorKind};
use crate::store::Key;

/// Conversion between a Rust field type and a store [`Value`].
///
/// Every field of a `#[derive(Entity)]` struct must be `Convertible`.
/// Conversions are strict: an integer property does not load into a
/// floating point field, and an out-of-range integer does not load into a
/// narrower integer type. A failed conversion is reported as a field
/// mismatch for that property.
pub trait Convertible: Sized {
    fn to_value(&self) -> DsResult<Value>;
    fn from_value(value: &Value) -> DsResult<Self>;
}

fn type_mismatch(expected: &str, value: &Value) -> DsError {
    DsError::new(
        &format!("expected {} but found {}", expected, value.type_name()),
        ErrorKind::InvalidDataType,
    )
}

impl Convertible for Value {
    fn to_value(&self) -> DsResult<Value> {
        Ok(self.clone())
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        Ok(value.clone())
    }
}

impl Convertible for bool {
    fn to_value(&self) -> DsResult<Value> {
        Ok(Value::Bool(*self))
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        value.as_bool().ok_or_else(|| type_mismatch("bool", value))
    }
}

macro_rules! convertible_int {
    ($($ty:ty),*) => {
        $(
            impl Convertible for $ty {
                fn to_value(&self) -> DsResult<Value> {
                    Ok(Value::Integer(i64::from(*self)))
                }

                fn from_value(value: &Value) -> DsResult<Self> {
                    match value {
                        Value::Integer(v) => Ok(<$ty>::try_from(*v)?),
                        _ => Err(type_mismatch(stringify!($ty), value)),
                    }
                }
            }
        )*
    };
}

convertible_int!(i8, i16, i32, u8, u16, u32);

impl Convertible for i64 {
    fn to_value(&self) -> DsResult<Value> {
        Ok(Value::Integer(*self))
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        value.as_integer().ok_or_else(|| type_mismatch("i64", value))
    }
}

impl Convertible for u64 {
    fn to_value(&self) -> DsResult<Value> {
        Ok(Value::Integer(i64::try_from(*self)?))
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        match value {
            Value::Integer(v) => Ok(u64::try_from(*v)?),
            _ => Err(type_mismatch("u64", value)),
        }
    }
}

impl Convertible for f32 {
    fn to_value(&self) -> DsResult<Value> {
        Ok(Value::Double(f64::from(*self)))
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        match value {
            Value::Double(v) => Ok(*v as f32),
            _ => Err(type_mismatch("f32", value)),
        }
    }
}

impl Convertible for f64 {
    fn to_value(&self) -> DsResult<Value> {
        Ok(Value::Double(*self))
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        value.as_double().ok_or_else(|| type_mismatch("f64", value))
    }
}

impl Convertible for String {
    fn to_value(&self) -> DsResult<Value> {
        Ok(Value::String(self.clone()))
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        value
            .as_string()
            .map(str::to_string)
            .ok_or_else(|| type_mismatch("string", value))
    }
}

impl Convertible for DateTime<Utc> {
    fn to_value(&self) -> DsResult<Value> {
        Ok(Value::Timestamp(*self))
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        value
            .as_timestamp()
            .copied()
            .ok_or_else(|| type_mismatch("timestamp", value))
    }
}

impl Convertible for Key {
    fn to_value(&self) -> DsResult<Value> {
        Ok(Value::Key(self.clone()))
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        value
            .as_key()
            .cloned()
            .ok_or_else(|| type_mismatch("key", value))
    }
}

impl Convertible for PropertyMap {
    fn to_value(&self) -> DsResult<Value> {
        Ok(Value::Entity(self.clone()))
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        value
            .as_entity()
            .cloned()
            .ok_or_else(|| type_mismatch("entity", value))
    }
}

/// `None` is stored as a null property and a null property loads as `None`.
impl<T: Convertible> Convertible for Option<T> {
    fn to_value(&self) -> DsResult<Value> {
        match self {
            Some(v) => v.to_value(),
            None => Ok(Value::Null),
        }
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => Ok(Some(T::from_value(value)?)),
        }
    }
}

/// Vectors are stored as multi-valued properties. A null property loads as an
/// empty vector, since the store does not persist empty arrays distinctly.
impl<T: Convertible> Convertible for Vec<T> {
    fn to_value(&self) -> DsResult<Value> {
        let values = self
            .iter()
            .map(Convertible::to_value)
            .collect::<DsResult<Vec<_>>>()?;
        Ok(Value::Array(values))
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(values) => values.iter().map(T::from_value).collect(),
            _ => Err(type_mismatch("array", value)),
        }
    }
}

/// String-keyed maps are stored as embedded entities.
impl<T: Convertible> Convertible for BTreeMap<String, T> {
    fn to_value(&self) -> DsResult<Value> {
        let mut props = PropertyMap::new();
        for (name, value) in self {
            props.put(name, value.to_value()?, true);
        }
        Ok(Value::Entity(props))
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        let props = value
            .as_entity()
            .ok_or_else(|| type_mismatch("entity", value))?;
        props
            .iter()
            .map(|p| Ok((p.name().to_string(), T::from_value(p.value())?)))
            .collect()
    }
}

/// Raw bytes, stored as an unindexable blob property.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Blob(pub Vec<u8>);

impl Convertible for Blob {
    fn to_value(&self) -> DsResult<Value> {
        Ok(Value::Bytes(self.0.clone()))
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        value
            .as_bytes()
            .map(|b| Blob(b.to_vec()))
            .ok_or_else(|| type_mismatch("bytes", value))
    }
}
