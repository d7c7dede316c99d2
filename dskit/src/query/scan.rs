use crate::context::Context;
use crate::entity::PropertyLoadSaver;
use crate::errors::{DsError, DsResult, ErrorKind};
use crate::query::guard::{
    optional_transaction, require_client, require_one_field, require_query, require_transaction,
};
use crate::query::{Client, Transaction};
use crate::store::{Cursor, Datastore, DatastoreTransaction, Key, Query, QueryIterator};

fn run(
    ctx: &Context,
    datastore: &Datastore,
    txn: Option<&DatastoreTransaction>,
    query: &Query,
) -> DsResult<QueryIterator> {
    match txn {
        Some(txn) => txn.run(ctx, query),
        None => datastore.run(ctx, query),
    }
}

/// Drains `it`, materializing every row with `make`. Rows that only
/// partially fit their destination are kept.
fn collect<P, F>(it: &mut QueryIterator, make: F) -> DsResult<(Vec<P>, Cursor)>
where
    P: PropertyLoadSaver,
    F: Fn() -> P,
{
    let mut rows = Vec::new();
    loop {
        let mut row = make();
        match it.next_into(&mut row) {
            Ok(Some(_)) => rows.push(row),
            Ok(None) => break,
            Err(err) if err.is_field_mismatch() => {
                log::warn!("keeping partially loaded row: {}", err);
                rows.push(row);
            }
            Err(err) => return Err(err),
        }
    }
    Ok((rows, it.cursor()?))
}

fn no_match() -> DsError {
    DsError::new("no such entity", ErrorKind::NoSuchEntity)
}

/// Runs `query` and loads every row into a fresh `E`.
///
/// Returns the rows and the cursor after the last one, which resumes the
/// same query past this page.
pub fn query<E: PropertyLoadSaver + Default>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
) -> DsResult<(Vec<E>, Cursor)> {
    query_with(ctx, client, txn, query, E::default)
}

/// Runs `query` and loads every row into a value made by `make`, for
/// callers that shape rows at runtime.
pub fn query_with<P, F>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    make: F,
) -> DsResult<(Vec<P>, Cursor)>
where
    P: PropertyLoadSaver,
    F: Fn() -> P,
{
    let datastore = require_client(client)?;
    let txn = optional_transaction(txn)?;
    let query = require_query(query)?;

    let mut it = run(ctx, datastore, txn, query)?;
    collect(&mut it, make)
}

/// [`query`] inside a mandatory transaction.
pub fn query_txn<E: PropertyLoadSaver + Default>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
) -> DsResult<(Vec<E>, Cursor)> {
    require_transaction(txn)?;
    self::query(ctx, client, txn, query)
}

/// The first row of `query`.
///
/// # Errors
/// `NoSuchEntity` when the query matches nothing.
pub fn query_one<E: PropertyLoadSaver + Default>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
) -> DsResult<E> {
    let query = require_query(query)?.clone().limit(1);
    let (rows, _) = self::query::<E>(ctx, client, txn, Some(&query))?;
    rows.into_iter().next().ok_or_else(no_match)
}

/// Keys of every row of `query`, without loading properties.
pub fn query_keys(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
) -> DsResult<(Vec<Key>, Cursor)> {
    let datastore = require_client(client)?;
    let txn = optional_transaction(txn)?;
    let query = require_query(query)?.clone().keys_only();

    let mut it = run(ctx, datastore, txn, &query)?;
    let mut keys = Vec::new();
    while let Some(key) = it.next_key()? {
        keys.push(key);
    }
    Ok((keys, it.cursor()?))
}

pub fn query_keys_txn(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
) -> DsResult<(Vec<Key>, Cursor)> {
    require_transaction(txn)?;
    query_keys(ctx, client, txn, query)
}

/// The key of the first row of `query`.
pub fn query_one_key(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
) -> DsResult<Key> {
    let query = require_query(query)?.clone().limit(1);
    let (keys, _) = query_keys(ctx, client, txn, Some(&query))?;
    keys.into_iter().next().ok_or_else(no_match)
}

/// Runs `query` restricted to `fields`, loading each row into a value made
/// by `make`.
///
/// Only entities with every field indexed are returned.
pub fn project<P, F, S>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    make: F,
    fields: &[S],
) -> DsResult<(Vec<P>, Cursor)>
where
    P: PropertyLoadSaver,
    F: Fn() -> P,
    S: AsRef<str>,
{
    let datastore = require_client(client)?;
    let txn = optional_transaction(txn)?;
    let query = require_query(query)?;
    require_one_field(&[fields])?;

    let query = query.clone().project(fields);
    let mut it = run(ctx, datastore, txn, &query)?;
    collect(&mut it, make)
}

pub fn project_txn<P, F, S>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    make: F,
    fields: &[S],
) -> DsResult<(Vec<P>, Cursor)>
where
    P: PropertyLoadSaver,
    F: Fn() -> P,
    S: AsRef<str>,
{
    require_transaction(txn)?;
    project(ctx, client, txn, query, make, fields)
}

/// The first projected row, or `None` when the query matches nothing.
pub fn project_one<P, F, S>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
    make: F,
    fields: &[S],
) -> DsResult<Option<P>>
where
    P: PropertyLoadSaver,
    F: Fn() -> P,
    S: AsRef<str>,
{
    let query = require_query(query)?.clone().limit(1);
    let (rows, _) = project(ctx, client, txn, Some(&query), make, fields)?;
    Ok(rows.into_iter().next())
}

/// True when `query` matches at least one entity.
pub fn exists_for_query(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
) -> DsResult<bool> {
    let datastore = require_client(client)?;
    let txn = optional_transaction(txn)?;
    let query = require_query(query)?.clone().keys_only().limit(1);

    let mut it = run(ctx, datastore, txn, &query)?;
    Ok(it.next_key()?.is_some())
}

pub fn exists_for_query_txn(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    query: Option<&Query>,
) -> DsResult<bool> {
    require_transaction(txn)?;
    exists_for_query(ctx, client, txn, query)
}
