use std::fmt::{Display, Formatter};

use crate::common::{Value, KEY_PROPERTY};
use crate::store::Key;

/// Comparison operator of a property filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    In,
    NotIn,
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::In => "in",
            Operator::NotIn => "not-in",
        };
        write!(f, "{}", symbol)
    }
}

/// A query filter: a property comparison or a composite of filters.
///
/// Filters only see indexed properties. Comparisons on a multi-valued
/// property match when any element matches. Build them with [`field`]:
///
/// ```rust,ignore
/// use dskit::store::field;
///
/// let filter = field("price").gte(10).and(field("color").eq("red"));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Property {
        field: String,
        op: Operator,
        value: Value,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Combines two filters so both must match. Nested conjunctions are
    /// flattened.
    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, Filter::And(mut right)) => {
                right.insert(0, this);
                Filter::And(right)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    /// Combines two filters so either may match.
    pub fn or(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::Or(mut left), Filter::Or(right)) => {
                left.extend(right);
                Filter::Or(left)
            }
            (Filter::Or(mut left), other) => {
                left.push(other);
                Filter::Or(left)
            }
            (this, Filter::Or(mut right)) => {
                right.insert(0, this);
                Filter::Or(right)
            }
            (this, other) => Filter::Or(vec![this, other]),
        }
    }

    /// Names of every property the filter reads.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Filter::Property { field, .. } => vec![field.as_str()],
            Filter::And(filters) | Filter::Or(filters) => {
                filters.iter().flat_map(Filter::fields).collect()
            }
        }
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::Property { field, op, value } => write!(f, "{} {} {}", field, op, value),
            Filter::And(filters) | Filter::Or(filters) => {
                let joiner = if matches!(self, Filter::And(_)) { " AND " } else { " OR " };
                write!(f, "(")?;
                for (i, filter) in filters.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", joiner)?;
                    }
                    write!(f, "{}", filter)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Creates a fluent filter builder for the named property.
///
/// # Arguments
///
/// * `field_name` - The property to filter on; `__key__` filters on the key
pub fn field(field_name: &str) -> FluentFilter {
    FluentFilter {
        field_name: field_name.to_string(),
    }
}

/// Creates a builder for filters on the entity key.
pub fn key_field() -> FluentFilter {
    field(KEY_PROPERTY)
}

/// A filter on the entity key equal to `key`.
pub fn by_key(key: &Key) -> Filter {
    key_field().eq(key)
}

/// Requires every filter to match.
pub fn and(filters: Vec<Filter>) -> Filter {
    Filter::And(filters)
}

/// Requires at least one filter to match.
pub fn or(filters: Vec<Filter>) -> Filter {
    Filter::Or(filters)
}

/// Fluent builder for property filters on one field.
pub struct FluentFilter {
    field_name: String,
}

impl FluentFilter {
    fn build(self, op: Operator, value: Value) -> Filter {
        Filter::Property {
            field: self.field_name,
            op,
            value,
        }
    }

    #[inline]
    pub fn eq<T: Into<Value>>(self, value: T) -> Filter {
        self.build(Operator::Equal, value.into())
    }

    #[inline]
    pub fn ne<T: Into<Value>>(self, value: T) -> Filter {
        self.build(Operator::NotEqual, value.into())
    }

    #[inline]
    pub fn lt<T: Into<Value>>(self, value: T) -> Filter {
        self.build(Operator::LessThan, value.into())
    }

    #[inline]
    pub fn lte<T: Into<Value>>(self, value: T) -> Filter {
        self.build(Operator::LessThanOrEqual, value.into())
    }

    #[inline]
    pub fn gt<T: Into<Value>>(self, value: T) -> Filter {
        self.build(Operator::GreaterThan, value.into())
    }

    #[inline]
    pub fn gte<T: Into<Value>>(self, value: T) -> Filter {
        self.build(Operator::GreaterThanOrEqual, value.into())
    }

    /// Matches when the property equals any of `values`.
    pub fn in_values<T: Into<Value>>(self, values: Vec<T>) -> Filter {
        self.build(Operator::In, Value::from(values))
    }

    /// Matches when the property exists and equals none of `values`.
    pub fn not_in<T: Into<Value>>(self, values: Vec<T>) -> Filter {
        self.build(Operator::NotIn, Value::from(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fluent_builds_property_filter() {
        let filter = field("size").gte(3);
        assert_eq!(
            filter,
            Filter::Property {
                field: "size".into(),
                op: Operator::GreaterThanOrEqual,
                value: Value::Integer(3),
            }
        );
    }

    #[test]
    fn and_flattens() {
        let filter = field("a").eq(1).and(field("b").eq(2)).and(field("c").eq(3));
        match filter {
            Filter::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected filter {:?}", other),
        }
    }

    #[test]
    fn or_flattens_on_both_sides() {
        let left = field("a").eq(1).or(field("b").eq(2));
        let right = field("c").eq(3).or(field("d").eq(4));
        match left.or(right) {
            Filter::Or(parts) => assert_eq!(parts.len(), 4),
            other => panic!("unexpected filter {:?}", other),
        }
    }

    #[test]
    fn fields_lists_every_property() {
        let filter = and(vec![field("a").eq(1), or(vec![field("b").lt(2), key_field().gt(Key::id_key("K", 1, None))])]);
        assert_eq!(filter.fields(), vec!["a", "b", "__key__"]);
    }

    #[test]
    fn in_values_wraps_array() {
        match field("color").in_values(vec!["red", "blue"]) {
            Filter::Property { op, value, .. } => {
                assert_eq!(op, Operator::In);
                assert_eq!(value.as_array().map(Vec::len), Some(2));
            }
            other => panic!("unexpected filter {:?}", other),
        }
    }

    #[test]
    fn display_is_readable() {
        let filter = field("a").eq(1).and(field("b").ne("x"));
        assert_eq!(filter.to_string(), "(a = 1 AND b != \"x\")");
    }
}
