use std::collections::HashMap;

use crate::common::Value;
use crate::store::{Cursor, Filter, Key};

/// Sort direction of an [`Order`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One sort criterion of a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    field: String,
    direction: Direction,
}

impl Order {
    pub fn new(field: &str, direction: Direction) -> Self {
        Order {
            field: field.to_string(),
            direction,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// A query over the entities of one kind (or all kinds when kindless).
///
/// Queries are built by value:
///
/// ```rust,ignore
/// use dskit::store::{field, Query};
///
/// let query = Query::new("Widget")
///     .ancestor(&shop)
///     .filter(field("color").eq("red"))
///     .order("-price")
///     .limit(20);
/// ```
///
/// Results are ordered by the given orders, then by key. Entities lacking an
/// ordered or projected property are not returned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    kind: Option<String>,
    ancestor: Option<Key>,
    namespace: Option<String>,
    filter: Option<Filter>,
    orders: Vec<Order>,
    projection: Vec<String>,
    distinct: bool,
    keys_only: bool,
    limit: Option<usize>,
    offset: usize,
    start: Option<Cursor>,
    end: Option<Cursor>,
}

impl Query {
    /// A query for entities of `kind`.
    pub fn new(kind: &str) -> Self {
        Query {
            kind: Some(kind.to_string()),
            ..Query::default()
        }
    }

    /// A query across all kinds; usually combined with an ancestor.
    pub fn kindless() -> Self {
        Query::default()
    }

    /// Restricts results to `ancestor` and its descendants. The ancestor's
    /// namespace becomes the query namespace.
    pub fn ancestor(mut self, ancestor: &Key) -> Self {
        self.namespace = ancestor.namespace().map(str::to_string);
        self.ancestor = Some(ancestor.clone());
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = if namespace.is_empty() {
            None
        } else {
            Some(namespace.to_string())
        };
        self
    }

    /// Adds a filter; successive filters must all match.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Adds a sort order. A leading `-` sorts descending.
    pub fn order(self, field: &str) -> Self {
        match field.strip_prefix('-') {
            Some(name) => self.order_by(name.trim(), Direction::Descending),
            None => self.order_by(field.trim(), Direction::Ascending),
        }
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.orders.push(Order::new(field, direction));
        self
    }

    /// Returns only the named properties of each result.
    pub fn project<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.projection = fields.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }

    /// Drops projected rows whose projected values repeat an earlier row.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Returns keys without properties.
    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Removes a previously set limit.
    pub fn unlimited(mut self) -> Self {
        self.limit = None;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Starts the scan at `cursor`. An empty cursor is ignored.
    pub fn start(mut self, cursor: Cursor) -> Self {
        self.start = if cursor.is_empty() { None } else { Some(cursor) };
        self
    }

    /// Stops the scan at `cursor`. An empty cursor is ignored.
    pub fn end(mut self, cursor: Cursor) -> Self {
        self.end = if cursor.is_empty() { None } else { Some(cursor) };
        self
    }

    pub fn kind_name(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn ancestor_key(&self) -> Option<&Key> {
        self.ancestor.as_ref()
    }

    pub fn namespace_name(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn filter_expr(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn projection(&self) -> &[String] {
        &self.projection
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn is_keys_only(&self) -> bool {
        self.keys_only
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset_value(&self) -> usize {
        self.offset
    }

    pub fn start_cursor(&self) -> Option<&Cursor> {
        self.start.as_ref()
    }

    pub fn end_cursor(&self) -> Option<&Cursor> {
        self.end.as_ref()
    }

    /// Turns this query into an aggregation query over the same rows.
    pub fn new_aggregation_query(self) -> AggregationQuery {
        AggregationQuery {
            query: self,
            aggregations: Vec::new(),
        }
    }
}

/// A server-side aggregation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Aggregation {
    Count { alias: String },
    Sum { field: String, alias: String },
    Avg { field: String, alias: String },
}

impl Aggregation {
    pub fn alias(&self) -> &str {
        match self {
            Aggregation::Count { alias }
            | Aggregation::Sum { alias, .. }
            | Aggregation::Avg { alias, .. } => alias,
        }
    }
}

/// Aggregated values keyed by alias.
///
/// Counts are integers. Sums are integers when every summed value was an
/// integer and doubles otherwise. Averages are doubles, or null over an empty
/// set.
pub type AggregationResult = HashMap<String, Value>;

/// Count, sum and average aggregations over the rows of a query, computed in
/// one round trip.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregationQuery {
    query: Query,
    aggregations: Vec<Aggregation>,
}

impl AggregationQuery {
    pub fn with_count(mut self, alias: &str) -> Self {
        self.aggregations.push(Aggregation::Count {
            alias: alias.to_string(),
        });
        self
    }

    pub fn with_sum(mut self, field: &str, alias: &str) -> Self {
        self.aggregations.push(Aggregation::Sum {
            field: field.to_string(),
            alias: alias.to_string(),
        });
        self
    }

    pub fn with_avg(mut self, field: &str, alias: &str) -> Self {
        self.aggregations.push(Aggregation::Avg {
            field: field.to_string(),
            alias: alias.to_string(),
        });
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn aggregations(&self) -> &[Aggregation] {
        &self.aggregations
    }
}
