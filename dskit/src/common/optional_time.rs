use std::fmt::{Debug, Display, Formatter};

use chrono::{DateTime, SubsecRound, Utc};

use crate::common::{Convertible, Property, Value};
use crate::errors::DsResult;

/// A point in time that may be absent.
///
/// When `valid` is false the `time` is meaningless: the value is written as a
/// null property and never as the zero instant. Conversions never fail;
/// anything that is not a timestamp loads as an invalid `OptionalTime`.
///
/// # Examples
///
/// ```rust,ignore
/// use dskit::common::OptionalTime;
///
/// let stamp = OptionalTime::now();
/// let prop = stamp.to_property("_created", false);
/// assert_eq!(OptionalTime::from_property(&prop), stamp);
///
/// let unset = OptionalTime::default();
/// assert!(unset.to_property("_updated", true).value().is_null());
/// ```
#[derive(Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct OptionalTime {
    time: DateTime<Utc>,
    valid: bool,
}

impl OptionalTime {
    /// A valid timestamp for the current instant, at the store's precision.
    pub fn now() -> Self {
        OptionalTime::from(Utc::now())
    }

    /// The invalid (absent) timestamp.
    pub fn none() -> Self {
        OptionalTime::default()
    }

    /// The timestamp, `None` when invalid.
    pub fn ptr(&self) -> Option<&DateTime<Utc>> {
        if self.valid {
            Some(&self.time)
        } else {
            None
        }
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.ptr().copied()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// True when invalid, or when the timestamp is the zero instant.
    pub fn is_zero(&self) -> bool {
        !self.valid || self.time == DateTime::<Utc>::UNIX_EPOCH
    }

    /// Builds the store property for this timestamp.
    ///
    /// The value is null when invalid. The property is left out of the
    /// indexes unless `indexed` is set.
    pub fn to_property(&self, name: &str, indexed: bool) -> Property {
        let value = match self.ptr() {
            Some(time) => Value::Timestamp(*time),
            None => Value::Null,
        };
        if indexed {
            Property::new(name, value)
        } else {
            Property::unindexed(name, value)
        }
    }

    /// Recovers a timestamp from a property; null or non-timestamp values
    /// give an invalid `OptionalTime`.
    pub fn from_property(property: &Property) -> Self {
        OptionalTime::from_stored(property.value())
    }

    fn from_stored(value: &Value) -> Self {
        match value.as_timestamp() {
            Some(time) => OptionalTime {
                time: *time,
                valid: true,
            },
            None => OptionalTime::default(),
        }
    }
}

impl From<DateTime<Utc>> for OptionalTime {
    fn from(time: DateTime<Utc>) -> Self {
        OptionalTime {
            time: time.trunc_subsecs(6),
            valid: true,
        }
    }
}

impl From<Option<DateTime<Utc>>> for OptionalTime {
    fn from(time: Option<DateTime<Utc>>) -> Self {
        time.map(OptionalTime::from).unwrap_or_default()
    }
}

impl PartialEq for OptionalTime {
    fn eq(&self, other: &Self) -> bool {
        match (self.ptr(), other.ptr()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for OptionalTime {}

impl PartialOrd for OptionalTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.ptr().cmp(&other.ptr()))
    }
}

impl Convertible for OptionalTime {
    fn to_value(&self) -> DsResult<Value> {
        Ok(self.time().map(Value::Timestamp).unwrap_or(Value::Null))
    }

    fn from_value(value: &Value) -> DsResult<Self> {
        Ok(OptionalTime::from_stored(value))
    }
}

impl Debug for OptionalTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.ptr() {
            Some(time) => write!(f, "OptionalTime({})", time.to_rfc3339()),
            None => write!(f, "OptionalTime(None)"),
        }
    }
}

impl Display for OptionalTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.ptr() {
            Some(time) => write!(f, "{}", time.to_rfc3339()),
            None => write!(f, "null"),
        }
    }
}
