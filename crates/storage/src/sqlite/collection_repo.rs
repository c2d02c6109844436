use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use super::SqliteRepository;
use super::mapping::{
    is_lock_contention, key_columns, map_key_row, map_record_row, map_value, table_name,
};
use crate::repository::{Collection, CollectionStore, StorageError, StoreKey, StoredRecord};

fn conn_err(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl CollectionStore for SqliteRepository {
    async fn get(
        &self,
        collection: Collection,
        key: &StoreKey,
    ) -> Result<Option<Value>, StorageError> {
        let (kind, raw) = key_columns(key);
        let row = sqlx::query(&format!(
            "SELECT data FROM {} WHERE key_kind = ?1 AND key = ?2",
            table_name(collection)
        ))
        .bind(kind)
        .bind(raw)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let data: String = row
            .try_get("data")
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        map_value(&data).map(Some)
    }

    async fn put(
        &self,
        collection: Collection,
        key: StoreKey,
        value: Value,
    ) -> Result<(), StorageError> {
        let (kind, raw) = key_columns(&key);
        let data =
            serde_json::to_string(&value).map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(&format!(
            r"
            INSERT INTO {} (key_kind, key, data, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key_kind, key) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            ",
            table_name(collection)
        ))
        .bind(kind)
        .bind(raw)
        .bind(data)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn_err)?;

        Ok(())
    }

    async fn list(&self, collection: Collection) -> Result<Vec<StoreKey>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT key_kind, key FROM {}
            ORDER BY key_kind ASC,
                     CASE WHEN key_kind = 0 THEN CAST(key AS INTEGER) END ASC,
                     key ASC
            ",
            table_name(collection)
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        rows.iter().map(map_key_row).collect()
    }

    async fn get_many(&self, collection: Collection) -> Result<Vec<StoredRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT key_kind, key, data FROM {}
            ORDER BY key_kind ASC,
                     CASE WHEN key_kind = 0 THEN CAST(key AS INTEGER) END ASC,
                     key ASC
            ",
            table_name(collection)
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(conn_err)?;

        rows.iter().map(map_record_row).collect()
    }

    async fn remove(&self, collection: Collection, key: &StoreKey) -> Result<(), StorageError> {
        let (kind, raw) = key_columns(key);
        sqlx::query(&format!(
            "DELETE FROM {} WHERE key_kind = ?1 AND key = ?2",
            table_name(collection)
        ))
        .bind(kind)
        .bind(raw)
        .execute(&self.pool)
        .await
        .map_err(conn_err)?;
        Ok(())
    }

    async fn clear(&self, collection: Collection) -> Result<(), StorageError> {
        sqlx::query(&format!("DELETE FROM {}", table_name(collection)))
            .execute(&self.pool)
            .await
            .map_err(conn_err)?;
        Ok(())
    }

    async fn destroy(&self) -> Result<(), StorageError> {
        self.presence.claim().await?;
        if let Err(err) = drop_collections(&self.pool).await {
            self.presence.unclaim().await;
            return Err(err);
        }

        self.pool.close().await;
        self.presence.leave().await;

        if let Some(path) = &self.db_path {
            remove_db_files(path).await;
        }

        Ok(())
    }
}

async fn drop_collections(pool: &SqlitePool) -> Result<(), StorageError> {
    let blocked = |e: sqlx::Error| {
        if is_lock_contention(&e) {
            StorageError::Blocked(
                "database is in use by another consumer, close it and retry".into(),
            )
        } else {
            conn_err(e)
        }
    };

    // All drops share one transaction: a contended store rolls back untouched.
    let mut tx = pool.begin().await.map_err(conn_err)?;
    for collection in Collection::ALL {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table_name(collection)))
            .execute(&mut *tx)
            .await
            .map_err(blocked)?;
    }
    sqlx::query("DROP TABLE IF EXISTS schema_migrations")
        .execute(&mut *tx)
        .await
        .map_err(blocked)?;
    tx.commit().await.map_err(blocked)
}

/// Unlinks the database and its sidecar files. The collections are already
/// dropped, so failures here are only logged.
async fn remove_db_files(path: &Path) {
    for suffix in ["", "-wal", "-shm", "-lock"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        match tokio::fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    file = %Path::new(&file).display(),
                    error = %e,
                    "could not remove database file"
                );
            }
        }
    }
}
