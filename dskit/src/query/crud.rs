use crate::common::PropertyMap;
use crate::context::Context;
use crate::entity::PropertyLoadSaver;
use crate::errors::DsResult;
use crate::query::guard::{
    optional_transaction, require_client, require_entities, require_equal_length, require_key,
    require_keys,
};
use crate::query::{Client, Transaction};
use crate::store::{Commit, Key, PendingKey};

/// The key a write produced.
///
/// Outside a transaction the store returns the final key right away. Inside
/// one, the key of an incomplete write is only known after the commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SavedKey {
    Complete(Key),
    Pending(PendingKey),
}

impl SavedKey {
    /// The key as far as it is known: final for a completed write, the
    /// written (possibly incomplete) key for a pending one.
    pub fn key(&self) -> &Key {
        match self {
            SavedKey::Complete(key) => key,
            SavedKey::Pending(pending) => pending.key(),
        }
    }

    /// The final key, if already known.
    pub fn complete(&self) -> Option<&Key> {
        match self {
            SavedKey::Complete(key) => Some(key),
            SavedKey::Pending(_) => None,
        }
    }

    /// Resolves the final key with the commit of the transaction the write
    /// belongs to.
    pub fn resolve(&self, commit: &Commit) -> Option<Key> {
        match self {
            SavedKey::Complete(key) => Some(key.clone()),
            SavedKey::Pending(pending) => commit.key(pending),
        }
    }
}

/// Loads the entity stored under `key` into `dst`.
///
/// # Errors
/// - `NoSuchEntity` when nothing is stored under `key`
/// - `FieldMismatch` when some stored properties did not fit; `dst` holds
///   everything that did
pub fn read<T: PropertyLoadSaver + ?Sized>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    key: Option<&Key>,
    dst: &mut T,
) -> DsResult<()> {
    let datastore = require_client(client)?;
    let txn = optional_transaction(txn)?;
    let key = require_key(key)?;

    match txn {
        Some(txn) => txn.get(ctx, key, dst),
        None => datastore.get(ctx, key, dst),
    }
}

/// Loads several entities; `dst` must have one slot per key.
pub fn read_multi<T: PropertyLoadSaver>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    keys: &[Key],
    dst: &mut [T],
) -> DsResult<()> {
    let datastore = require_client(client)?;
    let txn = optional_transaction(txn)?;
    require_equal_length(keys, dst)?;
    require_keys(keys)?;

    match txn {
        Some(txn) => txn.get_multi(ctx, keys, dst),
        None => datastore.get_multi(ctx, keys, dst),
    }
}

/// Writes `src` under `key`, inserting or replacing.
pub fn update<T: PropertyLoadSaver + ?Sized>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    key: Option<&Key>,
    src: &T,
) -> DsResult<SavedKey> {
    let datastore = require_client(client)?;
    let txn = optional_transaction(txn)?;
    let key = require_key(key)?;

    match txn {
        Some(txn) => txn.put(key, src).map(SavedKey::Pending),
        None => datastore.put(ctx, key, src).map(SavedKey::Complete),
    }
}

/// Writes several entities in one commit (or one transaction).
pub fn update_multi<T: PropertyLoadSaver>(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    keys: &[Key],
    src: &[T],
) -> DsResult<Vec<SavedKey>> {
    let datastore = require_client(client)?;
    let txn = optional_transaction(txn)?;
    require_equal_length(keys, src)?;
    require_keys(keys)?;
    require_entities(src)?;

    match txn {
        Some(txn) => Ok(txn
            .put_multi(keys, src)?
            .into_iter()
            .map(SavedKey::Pending)
            .collect()),
        None => Ok(datastore
            .put_multi(ctx, keys, src)?
            .into_iter()
            .map(SavedKey::Complete)
            .collect()),
    }
}

/// Removes the entity under `key`. Removing an absent entity succeeds.
pub fn delete(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    key: Option<&Key>,
) -> DsResult<()> {
    let datastore = require_client(client)?;
    let txn = optional_transaction(txn)?;
    let key = require_key(key)?;

    match txn {
        Some(txn) => txn.delete(key),
        None => datastore.delete(ctx, key),
    }
}

pub fn delete_multi(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    keys: &[Key],
) -> DsResult<()> {
    let datastore = require_client(client)?;
    let txn = optional_transaction(txn)?;
    require_keys(keys)?;

    match txn {
        Some(txn) => txn.delete_multi(keys),
        None => datastore.delete_multi(ctx, keys),
    }
}

/// True when an entity is stored under `key`.
pub fn exists(
    ctx: &Context,
    client: Option<&dyn Client>,
    txn: Option<&dyn Transaction>,
    key: Option<&Key>,
) -> DsResult<bool> {
    let mut row = PropertyMap::new();
    match read(ctx, client, txn, key, &mut row) {
        Ok(()) => Ok(true),
        Err(err) if err.is_not_found() => Ok(false),
        Err(err) if err.is_field_mismatch() => Ok(true),
        Err(err) => Err(err),
    }
}
