use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;
use super::mapping::table_name;
use crate::repository::Collection;

/// Current schema version. Bump it together with a new entry in `MIGRATIONS`.
pub const SCHEMA_VERSION: i64 = 2;

/// Collections introduced by each schema version.
const MIGRATIONS: &[(i64, &[Collection])] = &[
    (1, &[Collection::Log, Collection::Attempt]),
    (2, &[Collection::Session]),
];

pub(crate) async fn applied_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Applies every pending schema version in order.
///
/// A store already at a version above [`SCHEMA_VERSION`] is left untouched
/// and reported as `SqliteInitError::Outdated`.
///
/// Each version only creates tables that do not exist yet, so opening an
/// existing store never touches its rows.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    let current = applied_version(pool).await?;
    if current > SCHEMA_VERSION {
        return Err(SqliteInitError::Outdated {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }

    for (version, collections) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let mut tx = pool.begin().await?;

        for collection in *collections {
            tracing::info!(%collection, version, "creating collection");
            let table = table_name(*collection);
            sqlx::query(&format!(
                r"
                    CREATE TABLE IF NOT EXISTS {table} (
                        key_kind INTEGER NOT NULL CHECK (key_kind IN (0, 1)),
                        key TEXT NOT NULL,
                        data TEXT NOT NULL,
                        updated_at TEXT NOT NULL,
                        PRIMARY KEY (key_kind, key)
                    );
                "
            ))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(*version)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
