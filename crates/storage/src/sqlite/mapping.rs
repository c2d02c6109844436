use serde_json::Value;
use sqlx::Row;

use crate::repository::{Collection, StorageError, StoreKey, StoredRecord};

const KIND_INT: i64 = 0;
const KIND_TEXT: i64 = 1;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn table_name(collection: Collection) -> &'static str {
    match collection {
        Collection::Log => "store_log",
        Collection::Attempt => "store_attempt",
        Collection::Session => "store_session",
    }
}

/// Splits a key into its `(key_kind, key)` column pair.
pub(crate) fn key_columns(key: &StoreKey) -> (i64, String) {
    match key {
        StoreKey::Int(v) => (KIND_INT, v.to_string()),
        StoreKey::Text(s) => (KIND_TEXT, s.clone()),
    }
}

fn key_from_columns(kind: i64, raw: String) -> Result<StoreKey, StorageError> {
    match kind {
        KIND_INT => raw
            .parse::<i64>()
            .map(StoreKey::Int)
            .map_err(|_| StorageError::Serialization(format!("invalid integer key: {raw}"))),
        KIND_TEXT => Ok(StoreKey::Text(raw)),
        other => Err(StorageError::Serialization(format!(
            "invalid key kind: {other}"
        ))),
    }
}

pub(crate) fn map_key_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoreKey, StorageError> {
    key_from_columns(
        row.try_get::<i64, _>("key_kind").map_err(ser)?,
        row.try_get::<String, _>("key").map_err(ser)?,
    )
}

pub(crate) fn map_value(raw: &str) -> Result<Value, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn map_record_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredRecord, StorageError> {
    let data: String = row.try_get("data").map_err(ser)?;
    Ok(StoredRecord {
        id: map_key_row(row)?,
        data: map_value(&data)?,
    })
}

/// True for `SQLITE_BUSY` / `SQLITE_LOCKED` and their extended codes.
pub(crate) fn is_lock_contention(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| matches!(code & 0xff, 5 | 6))
}
