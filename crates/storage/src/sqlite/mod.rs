use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::handle::{Storage, StoreHandle, StoreOpener};
use crate::repository::{CollectionStore, SlotStore, StorageError};

mod collection_repo;
mod mapping;
mod migrate;
mod presence;

pub use migrate::SCHEMA_VERSION;

use presence::Presence;

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
    /// On-disk database file, `None` for in-memory databases.
    db_path: Option<PathBuf>,
    presence: Presence,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("cannot register as a consumer of {path}: {source}")]
    Presence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "database is outdated: stored schema version {found} is newer than supported version {supported}, update the app"
    )]
    Outdated { found: i64, supported: i64 },
}

impl From<SqliteInitError> for StorageError {
    fn from(err: SqliteInitError) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL, creating the file if missing.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established, if
    /// the connection pragmas fail during setup, or if the store is being
    /// deleted by another consumer.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let filename = options.get_filename().to_path_buf();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await?;

        let db_path = filename.is_file().then_some(filename);
        let presence = match &db_path {
            Some(path) => {
                Presence::join(path).map_err(|source| SqliteInitError::Presence {
                    path: path.display().to_string(),
                    source,
                })?
            }
            None => Presence::default(),
        };
        Ok(Self {
            pool,
            db_path,
            presence,
        })
    }

    /// Closes the pool and stops counting as a consumer of the store.
    pub async fn close(&self) {
        self.pool.close().await;
        self.presence.leave().await;
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create missing collection tables for every schema version up to
    /// [`SCHEMA_VERSION`]. Existing tables and rows are kept.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError::Outdated` if the store was written by a newer
    /// schema, and `SqliteInitError::Sqlx` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }

    /// Highest schema version recorded as applied.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the version table cannot be read.
    pub async fn schema_version(&self) -> Result<i64, StorageError> {
        migrate::applied_version(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

/// Opens and migrates an `SQLite` collection store on first use.
#[derive(Debug, Clone)]
pub struct SqliteOpener {
    database_url: String,
}

impl SqliteOpener {
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl StoreOpener for SqliteOpener {
    async fn open(&self) -> Result<Arc<dyn CollectionStore>, StorageError> {
        let repo = SqliteRepository::connect(&self.database_url).await?;
        if let Err(err) = repo.migrate().await {
            tracing::error!(%err, "cannot open collection store");
            repo.close().await;
            return Err(err.into());
        }
        Ok(Arc::new(repo))
    }
}

impl Storage {
    /// Build a `Storage` whose collections live in `SQLite`, opened lazily.
    #[must_use]
    pub fn sqlite(database_url: &str, slots: Arc<dyn SlotStore>) -> Self {
        Storage::new(
            StoreHandle::lazy(Arc::new(SqliteOpener::new(database_url))),
            slots,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqliteRepository>();
    }
}
