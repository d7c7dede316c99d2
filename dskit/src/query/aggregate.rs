use std::collections::HashMap;

use itertools::Itertools;

use crate::common::{Value, COUNT_ALIAS};
use crate::context::Context;
use crate::errors::{DsError, DsResult, ErrorKind};
use crate::query::guard::{
    optional_transaction, require_client, require_field, require_fields, require_one_field,
    require_query, require_transaction,
};
use crate::query::{Client, Transaction};
use crate::store::{AggregationQuery, AggregationResult, Query};

/// Count, sums and averages computed in one round trip.
///
/// `sums` and `averages` are keyed by field name. `count` is only set when
/// the count was requested.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregations {
    pub count: Option<i64>,
    pub sums: HashMap<String, f64>,
    pub averages: HashMap<String, f64>,
}

/// Normalizes an aggregated value to `f64`.
///
/// Integers are widened and doubles returned as they are. Anything else,
/// including the null average of an empty set, is an error.
pub fn numeric_value(value: &Value) -> DsResult<f64> {
    match value {
        Value::Integer(i) => Ok(*i as f64),
        Value::Double(d) => Ok(*d),
        other => Err(DsError::new(
            &format!(
                "unexpected value type {} for numeric aggregation",
                other.type_name()
            ),
            ErrorKind::InvalidDataType,
        )),
    }
}

fn run(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    aggregation: &AggregationQuery,
) -> DsResult<AggregationResult> {
    let datastore = require_client(client)?;
    match optional_transaction(txn)? {
        Some(txn) => txn.run_aggregation_query(ctx, aggregation),
        None => datastore.run_aggregation_query(ctx, aggregation),
    }
}

fn take(result: &mut AggregationResult, alias: &str) -> DsResult<Value> {
    result.remove(alias).ok_or_else(|| {
        DsError::new(
            &format!("aggregation result has no value for alias {:?}", alias),
            ErrorKind::InternalError,
        )
    })
}

fn count_from(result: &mut AggregationResult) -> DsResult<i64> {
    match take(result, COUNT_ALIAS)? {
        Value::Integer(count) => Ok(count),
        other => Err(DsError::new(
            &format!("unexpected value type {} for count", other.type_name()),
            ErrorKind::InvalidDataType,
        )),
    }
}

/// Counts the entities matching `query` on the server.
pub fn count_for_query(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
) -> DsResult<i64> {
    require_client(client)?;
    optional_transaction(txn)?;
    let query = require_query(query)?;

    let aggregation = query.clone().new_aggregation_query().with_count(COUNT_ALIAS);
    let mut result = run(ctx, client, txn, &aggregation)?;
    count_from(&mut result)
}

pub fn count_for_query_txn(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
) -> DsResult<i64> {
    require_transaction(txn)?;
    count_for_query(ctx, client, txn, query)
}

/// Sums one field over the entities matching `query`.
pub fn sum_for_field(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    field: &str,
) -> DsResult<f64> {
    require_field(field)?;
    let mut sums = sum_for_fields(ctx, client, txn, query, &[field])?;
    Ok(sums.remove(field).unwrap_or_default())
}

/// Sums several fields in one round trip. Each field is its own alias.
pub fn sum_for_fields<S: AsRef<str>>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    fields: &[S],
) -> DsResult<HashMap<String, f64>> {
    require_client(client)?;
    optional_transaction(txn)?;
    let query = require_query(query)?;
    require_fields(fields)?;

    let fields: Vec<&str> = fields.iter().map(|f| f.as_ref()).unique().collect();
    let aggregation = fields
        .iter()
        .fold(query.clone().new_aggregation_query(), |aq, field| {
            aq.with_sum(field, field)
        });
    let mut result = run(ctx, client, txn, &aggregation)?;

    let mut sums = HashMap::with_capacity(fields.len());
    for field in fields {
        let value = numeric_value(&take(&mut result, field)?)
            .map_err(|err| err.context(&format!("sum field {:?}", field)))?;
        sums.insert(field.to_string(), value);
    }
    Ok(sums)
}

pub fn sum_for_fields_txn<S: AsRef<str>>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    fields: &[S],
) -> DsResult<HashMap<String, f64>> {
    require_transaction(txn)?;
    sum_for_fields(ctx, client, txn, query, fields)
}

/// Averages one field over the entities matching `query`.
///
/// Fails when no matching entity has a numeric value for the field, since
/// the average of an empty set is null.
pub fn average_for_field(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    field: &str,
) -> DsResult<f64> {
    require_field(field)?;
    let mut averages = average_for_fields(ctx, client, txn, query, &[field])?;
    Ok(averages.remove(field).unwrap_or_default())
}

pub fn average_for_fields<S: AsRef<str>>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    fields: &[S],
) -> DsResult<HashMap<String, f64>> {
    require_client(client)?;
    optional_transaction(txn)?;
    let query = require_query(query)?;
    require_fields(fields)?;

    let fields: Vec<&str> = fields.iter().map(|f| f.as_ref()).unique().collect();
    let aggregation = fields
        .iter()
        .fold(query.clone().new_aggregation_query(), |aq, field| {
            aq.with_avg(field, field)
        });
    let mut result = run(ctx, client, txn, &aggregation)?;

    let mut averages = HashMap::with_capacity(fields.len());
    for field in fields {
        let value = numeric_value(&take(&mut result, field)?)
            .map_err(|err| err.context(&format!("avg field {:?}", field)))?;
        averages.insert(field.to_string(), value);
    }
    Ok(averages)
}

pub fn average_for_fields_txn<S: AsRef<str>>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    fields: &[S],
) -> DsResult<HashMap<String, f64>> {
    require_transaction(txn)?;
    average_for_fields(ctx, client, txn, query, fields)
}

fn sum_alias(field: &str) -> String {
    format!("sum_{}", field)
}

fn avg_alias(field: &str) -> String {
    format!("avg_{}", field)
}

fn combined<S: AsRef<str>>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    sum_fields: &[S],
    avg_fields: &[S],
    with_count: bool,
) -> DsResult<Aggregations> {
    require_client(client)?;
    optional_transaction(txn)?;
    let query = require_query(query)?;
    require_one_field(&[sum_fields, avg_fields])?;

    let sum_fields: Vec<&str> = sum_fields.iter().map(|f| f.as_ref()).unique().collect();
    let avg_fields: Vec<&str> = avg_fields.iter().map(|f| f.as_ref()).unique().collect();

    let mut aggregation = query.clone().new_aggregation_query();
    if with_count {
        aggregation = aggregation.with_count(COUNT_ALIAS);
    }
    for field in &sum_fields {
        aggregation = aggregation.with_sum(field, &sum_alias(field));
    }
    for field in &avg_fields {
        aggregation = aggregation.with_avg(field, &avg_alias(field));
    }
    let mut result = run(ctx, client, txn, &aggregation)?;

    let mut aggregations = Aggregations::default();
    if with_count {
        aggregations.count = Some(count_from(&mut result)?);
    }
    for field in sum_fields {
        let value = numeric_value(&take(&mut result, &sum_alias(field))?)
            .map_err(|err| err.context(&format!("sum field {:?}", field)))?;
        aggregations.sums.insert(field.to_string(), value);
    }
    for field in avg_fields {
        let value = numeric_value(&take(&mut result, &avg_alias(field))?)
            .map_err(|err| err.context(&format!("avg field {:?}", field)))?;
        aggregations.averages.insert(field.to_string(), value);
    }
    Ok(aggregations)
}

/// Sums and averages several fields in one round trip.
pub fn query_aggregations<S: AsRef<str>>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    sum_fields: &[S],
    avg_fields: &[S],
) -> DsResult<Aggregations> {
    combined(ctx, client, txn, query, sum_fields, avg_fields, false)
}

/// [`query_aggregations`] plus the number of matching entities.
pub fn query_aggregations_with_count<S: AsRef<str>>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    sum_fields: &[S],
    avg_fields: &[S],
) -> DsResult<Aggregations> {
    combined(ctx, client, txn, query, sum_fields, avg_fields, true)
}

pub fn query_aggregations_txn<S: AsRef<str>>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    sum_fields: &[S],
    avg_fields: &[S],
) -> DsResult<Aggregations> {
    require_transaction(txn)?;
    combined(ctx, client, txn, query, sum_fields, avg_fields, false)
}

pub fn query_aggregations_with_count_txn<S: AsRef<str>>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    sum_fields: &[S],
    avg_fields: &[S],
) -> DsResult<Aggregations> {
    require_transaction(txn)?;
    combined(ctx, client, txn, query, sum_fields, avg_fields, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PropertyMap;
    use crate::store::{field, Datastore, Key, TransactionOptions};
    use crate::test_util::{counting_client, seed_widgets};

    fn seed_prices(client: &Datastore) {
        let ctx = Context::background();
        for (n, price) in [(1, 1.5), (2, 2.5), (3, 5.0)] {
            let mut row = PropertyMap::new();
            row.put("qty", n, true);
            row.put("price", price, true);
            client
                .put(&ctx, &Key::id_key("Item", n, None), &row)
                .unwrap();
        }
    }

    #[test]
    fn test_numeric_value() {
        assert_eq!(numeric_value(&Value::Integer(3)).unwrap(), 3.0);
        assert_eq!(numeric_value(&Value::Double(2.5)).unwrap(), 2.5);
        let err = numeric_value(&Value::from("x")).unwrap_err();
        assert_eq!(err.message(), "unexpected value type string for numeric aggregation");
    }

    #[test]
    fn test_count_for_query() {
        let (client, _) = counting_client();
        let ctx = Context::background();
        seed_widgets(&client, 4);
        let q = Query::new("Widget").filter(field("size").gt(1));
        assert_eq!(count_for_query(&ctx, Some(&client), None, Some(&q)).unwrap(), 3);
    }

    #[test]
    fn test_sums_are_exact_for_both_types() {
        let (client, _) = counting_client();
        let ctx = Context::background();
        seed_prices(&client);
        let q = Query::new("Item");
        assert_eq!(sum_for_field(&ctx, Some(&client), None, Some(&q), "qty").unwrap(), 6.0);
        assert_eq!(sum_for_field(&ctx, Some(&client), None, Some(&q), "price").unwrap(), 9.0);

        let sums = sum_for_fields(&ctx, Some(&client), None, Some(&q), &["qty", "price", "qty"])
            .unwrap();
        assert_eq!(sums.len(), 2);
    }

    #[test]
    fn test_average_of_empty_set_fails() {
        let (client, _) = counting_client();
        let ctx = Context::background();
        seed_prices(&client);
        let q = Query::new("Item");
        assert_eq!(
            average_for_field(&ctx, Some(&client), None, Some(&q), "qty").unwrap(),
            2.0
        );

        let err = average_for_field(&ctx, Some(&client), None, Some(&Query::new("None")), "qty")
            .unwrap_err();
        assert_eq!(
            err.message(),
            "avg field \"qty\": unexpected value type null for numeric aggregation"
        );
    }

    #[test]
    fn test_query_aggregations_with_count() {
        let (client, _) = counting_client();
        let ctx = Context::background();
        seed_prices(&client);
        let q = Query::new("Item");
        let result = query_aggregations_with_count(
            &ctx,
            Some(&client),
            None,
            Some(&q),
            &["qty", "price"],
            &["qty"],
        )
        .unwrap();
        assert_eq!(result.count, Some(3));
        assert_eq!(result.sums["qty"], 6.0);
        assert_eq!(result.sums["price"], 9.0);
        assert_eq!(result.averages["qty"], 2.0);

        let result =
            query_aggregations(&ctx, Some(&client), None, Some(&q), &[], &["price"]).unwrap();
        assert_eq!(result.count, None);
        assert_eq!(result.averages["price"], 3.0);
    }

    #[test]
    fn test_aggregation_guards() {
        let (client, calls) = counting_client();
        let ctx = Context::background();
        let q = Query::new("Item");
        let empty: &[&str] = &[];

        let err = sum_for_fields(&ctx, Some(&client), None, Some(&q), empty).unwrap_err();
        assert_eq!(err.message(), "fields cannot be nil");
        let err = sum_for_field(&ctx, Some(&client), None, Some(&q), "").unwrap_err();
        assert_eq!(err.message(), "field cannot be empty");
        let err = query_aggregations(&ctx, Some(&client), None, Some(&q), empty, empty)
            .unwrap_err();
        assert_eq!(err.message(), "at least one field must be provided");
        let err = count_for_query(&ctx, Some(&client), None, None).unwrap_err();
        assert_eq!(err.message(), "query cannot be nil");
        let err = count_for_query_txn(&ctx, Some(&client), None, Some(&q)).unwrap_err();
        assert_eq!(err.message(), "transaction cannot be nil");
        assert_eq!(calls.total(), 0);
    }

    #[test]
    fn test_aggregations_in_transaction() {
        let (client, _) = counting_client();
        let ctx = Context::background();
        seed_prices(&client);
        let q = Query::new("Item");
        let txn = client.new_transaction(&ctx, TransactionOptions::read_only()).unwrap();
        assert_eq!(count_for_query_txn(&ctx, Some(&client), Some(&txn), Some(&q)).unwrap(), 3);
        let sums = sum_for_fields_txn(&ctx, Some(&client), Some(&txn), Some(&q), &["qty"]).unwrap();
        assert_eq!(sums["qty"], 6.0);
        txn.rollback().unwrap();
    }
}
