use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::common::{PropertyMap, Value, KEY_PROPERTY};
use crate::errors::{DsError, DsResult, ErrorKind};
use crate::store::{
    Aggregation, AggregationResult, Cursor, Direction, Filter, Key, Operator, Order, Query,
};

const CURSOR_MAGIC: &[u8; 4] = b"dsk1";

/// A stored entity as seen by query evaluation.
pub(crate) type Row = (Key, PropertyMap);

/// Encodes a scan position as a cursor.
pub(crate) fn position_cursor(position: usize) -> Cursor {
    let mut bytes = Vec::with_capacity(12);
    bytes.extend_from_slice(CURSOR_MAGIC);
    bytes.extend_from_slice(&(position as u64).to_be_bytes());
    Cursor::from_bytes(bytes)
}

/// Decodes a cursor produced by [`position_cursor`]. The empty cursor is the
/// start of the scan.
pub(crate) fn cursor_position(cursor: &Cursor) -> DsResult<usize> {
    if cursor.is_empty() {
        return Ok(0);
    }
    let bytes = cursor.as_bytes();
    if bytes.len() != 12 || &bytes[..4] != CURSOR_MAGIC {
        return Err(DsError::new(
            &format!("invalid cursor {:?}", cursor.encode()),
            ErrorKind::InvalidCursor,
        ));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[4..]);
    usize::try_from(u64::from_be_bytes(raw)).map_err(|_| {
        DsError::new(
            &format!("invalid cursor {:?}", cursor.encode()),
            ErrorKind::InvalidCursor,
        )
    })
}

/// True when the entity belongs to the query's namespace, kind and ancestor.
pub(crate) fn in_scope(query: &Query, key: &Key) -> bool {
    let namespace = query.namespace_name().unwrap_or("");
    if key.namespace().unwrap_or("") != namespace {
        return false;
    }
    if let Some(kind) = query.kind_name() {
        if key.kind() != kind {
            return false;
        }
    }
    match query.ancestor_key() {
        Some(ancestor) => key.has_ancestor(ancestor),
        None => true,
    }
}

/// The value a filter or order sees for `name`: the key itself for
/// `__key__`, otherwise the property when it is indexed.
fn indexed_value(name: &str, key: &Key, properties: &PropertyMap) -> Option<Value> {
    if name == KEY_PROPERTY {
        return Some(Value::Key(key.clone()));
    }
    match properties.get(name) {
        Some(property) if !property.no_index() => match property.value() {
            Value::Bytes(_) => None,
            value => Some(value.clone()),
        },
        _ => None,
    }
}

/// Evaluates a filter against one entity.
pub(crate) fn matches(filter: &Filter, key: &Key, properties: &PropertyMap) -> bool {
    match filter {
        Filter::And(filters) => filters.iter().all(|f| matches(f, key, properties)),
        Filter::Or(filters) => filters.iter().any(|f| matches(f, key, properties)),
        Filter::Property { field, op, value } => match indexed_value(field, key, properties) {
            Some(Value::Array(elements)) => {
                elements.iter().any(|element| compare(element, *op, value))
            }
            Some(actual) => compare(&actual, *op, value),
            None => false,
        },
    }
}

fn compare(actual: &Value, op: Operator, expected: &Value) -> bool {
    match op {
        Operator::Equal => actual == expected,
        Operator::NotEqual => actual != expected,
        Operator::In => candidates(expected).iter().any(|v| actual == *v),
        Operator::NotIn => candidates(expected).iter().all(|v| actual != *v),
        _ => {
            if actual.type_rank() != expected.type_rank() {
                return false;
            }
            let ordering = actual.cmp(expected);
            match op {
                Operator::LessThan => ordering == Ordering::Less,
                Operator::LessThanOrEqual => ordering != Ordering::Greater,
                Operator::GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }
        }
    }
}

fn candidates(expected: &Value) -> Vec<&Value> {
    match expected {
        Value::Array(values) => values.iter().collect(),
        value => vec![value],
    }
}

/// The value an entity sorts by for one order, or `None` when the entity
/// lacks the property. Multi-valued properties sort by their smallest
/// element ascending and their largest descending.
fn sort_value(order: &Order, key: &Key, properties: &PropertyMap) -> Option<Value> {
    match indexed_value(order.field(), key, properties)? {
        Value::Array(elements) => match order.direction() {
            Direction::Ascending => elements.into_iter().min(),
            Direction::Descending => elements.into_iter().max(),
        },
        value => Some(value),
    }
}

/// Filters and sorts the candidate rows, then applies projection and
/// distinct. Keys break ties, so the result order is total.
pub(crate) fn evaluate(query: &Query, rows: Vec<Row>) -> Vec<Row> {
    let mut sortable: Vec<(Vec<Value>, Row)> = rows
        .into_iter()
        .filter(|(key, properties)| {
            query
                .filter_expr()
                .map_or(true, |filter| matches(filter, key, properties))
        })
        .filter_map(|(key, properties)| {
            let values = query
                .orders()
                .iter()
                .map(|order| sort_value(order, &key, &properties))
                .collect::<Option<Vec<_>>>()?;
            Some((values, (key, properties)))
        })
        .collect();

    sortable.sort_by(|(left_values, (left_key, _)), (right_values, (right_key, _))| {
        for ((left, right), order) in left_values
            .iter()
            .zip(right_values.iter())
            .zip(query.orders())
        {
            let ordering = match order.direction() {
                Direction::Ascending => left.cmp(right),
                Direction::Descending => right.cmp(left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        left_key.cmp(right_key)
    });

    let rows = sortable.into_iter().map(|(_, row)| row);
    if query.projection().is_empty() {
        return rows.collect();
    }

    let projected = rows.filter_map(|(key, properties)| {
        let all_indexed = query.projection().iter().all(|name| {
            properties
                .get(name)
                .map_or(false, |property| !property.no_index())
        });
        if all_indexed {
            Some((key, properties.project(query.projection())))
        } else {
            None
        }
    });
    if query.is_distinct() {
        let mut seen = BTreeSet::new();
        projected
            .filter(|(_, properties)| seen.insert(properties.clone()))
            .collect()
    } else {
        projected.collect()
    }
}

/// Computes the aggregations over `rows`.
///
/// Only numeric values take part in sums and averages. A sum is an integer
/// while every summed value is an integer and fits; otherwise it is a double.
/// An average over no values is null.
pub(crate) fn aggregate(aggregations: &[Aggregation], rows: &[Row]) -> AggregationResult {
    let mut result = AggregationResult::new();
    for aggregation in aggregations {
        let value = match aggregation {
            Aggregation::Count { .. } => Value::Integer(rows.len() as i64),
            Aggregation::Sum { field, .. } => sum(numeric_values(field, rows)),
            Aggregation::Avg { field, .. } => {
                let values = numeric_values(field, rows);
                if values.is_empty() {
                    Value::Null
                } else {
                    let total: f64 = values.iter().map(as_f64).sum();
                    Value::Double(total / values.len() as f64)
                }
            }
        };
        result.insert(aggregation.alias().to_string(), value);
    }
    result
}

fn numeric_values(field: &str, rows: &[Row]) -> Vec<Value> {
    rows.iter()
        .filter_map(|(key, properties)| indexed_value(field, key, properties))
        .filter(Value::is_number)
        .collect()
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Integer(i) => *i as f64,
        Value::Double(d) => *d,
        _ => 0.0,
    }
}

fn sum(values: Vec<Value>) -> Value {
    let mut integer: Option<i64> = Some(0);
    let mut double = 0.0;
    for value in &values {
        integer = match (integer, value) {
            (Some(total), Value::Integer(i)) => total.checked_add(*i),
            _ => None,
        };
        double += as_f64(value);
    }
    match integer {
        Some(total) => Value::Integer(total),
        None => Value::Double(double),
    }
}
