use crate::errors::{DsError, DsResult, ErrorKind};
use crate::query::{Client, Transaction};
use crate::store::{Datastore, DatastoreTransaction, Key, Query};

fn invalid(message: &str) -> DsError {
    DsError::new(message, ErrorKind::InvalidArgument)
}

pub(crate) fn require_client<'a>(client: Option<&'a dyn Client>) -> DsResult<&'a Datastore> {
    client
        .ok_or_else(|| invalid("client cannot be nil"))?
        .client()
        .ok_or_else(|| invalid("client datastore cannot be nil"))
}

pub(crate) fn require_transaction<'a>(
    txn: Option<&'a dyn Transaction>,
) -> DsResult<&'a DatastoreTransaction> {
    txn.ok_or_else(|| invalid("transaction cannot be nil"))?
        .txn()
        .ok_or_else(|| invalid("transaction datastore cannot be nil"))
}

/// Resolves an optional transaction: absent is fine, finished is not.
pub(crate) fn optional_transaction<'a>(
    txn: Option<&'a dyn Transaction>,
) -> DsResult<Option<&'a DatastoreTransaction>> {
    match txn {
        Some(_) => require_transaction(txn).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn require_key(key: Option<&Key>) -> DsResult<&Key> {
    key.ok_or_else(|| invalid("key cannot be nil"))
}

/// An empty key slice stands for a missing one.
pub(crate) fn require_keys(keys: &[Key]) -> DsResult<()> {
    if keys.is_empty() {
        return Err(invalid("keys cannot be nil"));
    }
    Ok(())
}

pub(crate) fn require_entities<T>(entities: &[T]) -> DsResult<()> {
    if entities.is_empty() {
        return Err(invalid("entity is nil"));
    }
    Ok(())
}

pub(crate) fn require_equal_length<T>(keys: &[Key], entities: &[T]) -> DsResult<()> {
    if keys.len() != entities.len() {
        return Err(invalid("keys and entities must have the same length"));
    }
    Ok(())
}

pub(crate) fn require_query(query: Option<&Query>) -> DsResult<&Query> {
    query.ok_or_else(|| invalid("query cannot be nil"))
}

pub(crate) fn require_field(field: &str) -> DsResult<()> {
    if field.is_empty() {
        return Err(invalid("field cannot be empty"));
    }
    Ok(())
}

pub(crate) fn require_fields<S: AsRef<str>>(fields: &[S]) -> DsResult<()> {
    if fields.is_empty() {
        return Err(invalid("fields cannot be nil"));
    }
    fields.iter().try_for_each(|field| require_field(field.as_ref()))
}

/// At least one of the field lists must be non-empty, and no name may be
/// empty.
pub(crate) fn require_one_field<S: AsRef<str>>(lists: &[&[S]]) -> DsResult<()> {
    if lists.iter().all(|fields| fields.is_empty()) {
        return Err(invalid("at least one field must be provided"));
    }
    lists
        .iter()
        .flat_map(|fields| fields.iter())
        .try_for_each(|field| require_field(field.as_ref()))
}

pub(crate) fn require_kind(kind: &str) -> DsResult<()> {
    if kind.is_empty() {
        return Err(invalid("kind cannot be empty"));
    }
    Ok(())
}
