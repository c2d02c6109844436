use serde_json::json;
use storage::repository::{Collection, CollectionStore, StorageError, StoreKey};
use storage::StoreOpener;
use storage::sqlite::{SCHEMA_VERSION, SqliteOpener, SqliteRepository};
use storage::{FileSlots, SlotStore, Storage};
use std::sync::Arc;

async fn memory_repo(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn file_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}", dir.path().join("annales.sqlite3").display())
}

#[tokio::test]
async fn sqlite_collection_roundtrip() {
    let repo = memory_repo("memdb_roundtrip").await;

    repo.put(Collection::Attempt, "q2".into(), json!([{"n": 1}]))
        .await
        .unwrap();
    repo.put(Collection::Attempt, "q1".into(), json!([]))
        .await
        .unwrap();
    repo.put(Collection::Attempt, "q2".into(), json!([{"n": 1}, {"n": 2}]))
        .await
        .unwrap();

    let value = repo.get(Collection::Attempt, &"q2".into()).await.unwrap();
    assert_eq!(value, Some(json!([{"n": 1}, {"n": 2}])));
    assert_eq!(
        repo.list(Collection::Attempt).await.unwrap(),
        vec![StoreKey::from("q1"), StoreKey::from("q2")]
    );
    assert!(repo.list(Collection::Session).await.unwrap().is_empty());

    let records = repo.get_many(Collection::Attempt).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].id, StoreKey::from("q2"));

    repo.remove(Collection::Attempt, &"q1".into()).await.unwrap();
    repo.remove(Collection::Attempt, &"missing".into()).await.unwrap();
    assert_eq!(repo.list(Collection::Attempt).await.unwrap().len(), 1);

    repo.clear(Collection::Attempt).await.unwrap();
    assert!(repo.get_many(Collection::Attempt).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_orders_numeric_keys_numerically() {
    let repo = memory_repo("memdb_numeric").await;
    for key in [10_i64, 2, -1] {
        repo.put(Collection::Log, key.into(), json!(key)).await.unwrap();
    }
    repo.put(Collection::Log, "b".into(), json!("b")).await.unwrap();

    let keys = repo.list(Collection::Log).await.unwrap();
    assert_eq!(
        keys,
        vec![
            StoreKey::Int(-1),
            StoreKey::Int(2),
            StoreKey::Int(10),
            StoreKey::from("b")
        ]
    );
}

#[tokio::test]
async fn migrate_is_idempotent_and_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let url = file_url(&dir);

    let repo = SqliteRepository::connect(&url).await.unwrap();
    repo.migrate().await.unwrap();
    repo.put(Collection::Session, "ses_AAAAAAAA".into(), json!({"name": "s"}))
        .await
        .unwrap();
    repo.pool().close().await;

    let reopened = SqliteRepository::connect(&url).await.unwrap();
    reopened.migrate().await.unwrap();
    reopened.migrate().await.unwrap();

    assert_eq!(reopened.schema_version().await.unwrap(), SCHEMA_VERSION);
    let value = reopened
        .get(Collection::Session, &"ses_AAAAAAAA".into())
        .await
        .unwrap();
    assert_eq!(value, Some(json!({"name": "s"})));
}

#[tokio::test]
async fn upgrade_from_v1_creates_session_collection() {
    let repo = memory_repo_v1("memdb_upgrade").await;
    repo.put(Collection::Attempt, "q1".into(), json!(["kept"]))
        .await
        .unwrap();
    assert!(repo.list(Collection::Session).await.is_err());

    repo.migrate().await.unwrap();

    assert_eq!(repo.schema_version().await.unwrap(), 2);
    assert!(repo.list(Collection::Session).await.unwrap().is_empty());
    assert_eq!(
        repo.get(Collection::Attempt, &"q1".into()).await.unwrap(),
        Some(json!(["kept"]))
    );
}

/// Builds a store that looks like it was created by schema version 1.
async fn memory_repo_v1(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .unwrap();
    for ddl in [
        "CREATE TABLE schema_migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL)",
        "INSERT INTO schema_migrations (version, applied_at) VALUES (1, '2024-01-01T00:00:00Z')",
        "CREATE TABLE store_log (key_kind INTEGER NOT NULL, key TEXT NOT NULL, data TEXT NOT NULL, updated_at TEXT NOT NULL, PRIMARY KEY (key_kind, key))",
        "CREATE TABLE store_attempt (key_kind INTEGER NOT NULL, key TEXT NOT NULL, data TEXT NOT NULL, updated_at TEXT NOT NULL, PRIMARY KEY (key_kind, key))",
    ] {
        sqlx::query(ddl).execute(repo.pool()).await.unwrap();
    }
    repo
}

#[tokio::test]
async fn destroy_erases_file_and_slots() {
    let dir = tempfile::tempdir().unwrap();
    let url = file_url(&dir);
    let slots = Arc::new(FileSlots::open(dir.path().join("slots"), "annales-bia-csv").unwrap());
    let storage = Storage::sqlite(&url, slots.clone());

    let store = storage.collections.open().await.unwrap();
    store
        .put(Collection::Attempt, "q1".into(), json!([]))
        .await
        .unwrap();
    slots.set("sessionDuration", "12").unwrap();

    storage.destroy().await.unwrap();

    assert!(!dir.path().join("annales.sqlite3").exists());
    assert_eq!(slots.get("sessionDuration").unwrap(), None);

    let fresh = SqliteRepository::connect(&url).await.unwrap();
    fresh.migrate().await.unwrap();
    assert!(fresh.list(Collection::Attempt).await.unwrap().is_empty());
}

#[tokio::test]
async fn destroy_is_blocked_by_a_writer_and_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let url = file_url(&dir);

    let repo = SqliteRepository::connect(&url).await.unwrap();
    repo.migrate().await.unwrap();
    repo.put(Collection::Attempt, "q1".into(), json!(["a"]))
        .await
        .unwrap();

    let other = SqliteRepository::connect(&url).await.unwrap();
    let mut writer = other.pool().acquire().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *writer)
        .await
        .unwrap();

    let err = repo.destroy().await.unwrap_err();
    assert!(matches!(err, StorageError::Blocked(_)), "got {err:?}");

    sqlx::query("ROLLBACK").execute(&mut *writer).await.unwrap();
    drop(writer);

    assert_eq!(
        repo.get(Collection::Attempt, &"q1".into()).await.unwrap(),
        Some(json!(["a"]))
    );
}

#[tokio::test]
async fn destroy_waits_until_readers_close_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let url = file_url(&dir);
    let db = dir.path().join("annales.sqlite3");

    let repo = SqliteRepository::connect(&url).await.unwrap();
    repo.migrate().await.unwrap();
    repo.put(Collection::Attempt, "q1".into(), json!(["a"]))
        .await
        .unwrap();

    let reader = SqliteRepository::connect(&url).await.unwrap();
    let mut conn = reader.pool().acquire().await.unwrap();
    sqlx::query("BEGIN").execute(&mut *conn).await.unwrap();
    let rows = sqlx::query("SELECT * FROM store_attempt")
        .fetch_all(&mut *conn)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    let err = repo.destroy().await.unwrap_err();
    assert!(matches!(err, StorageError::Blocked(_)), "got {err:?}");
    assert!(db.exists());
    assert_eq!(
        repo.get(Collection::Attempt, &"q1".into()).await.unwrap(),
        Some(json!(["a"]))
    );

    sqlx::query("COMMIT").execute(&mut *conn).await.unwrap();
    drop(conn);
    let err = repo.destroy().await.unwrap_err();
    assert!(matches!(err, StorageError::Blocked(_)), "idle consumer still holds the store");

    reader.close().await;
    repo.destroy().await.unwrap();
    assert!(!db.exists());
}

#[tokio::test]
async fn newer_schema_is_reported_as_outdated() {
    let dir = tempfile::tempdir().unwrap();
    let url = file_url(&dir);

    let repo = SqliteRepository::connect(&url).await.unwrap();
    repo.migrate().await.unwrap();
    sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)")
        .bind(SCHEMA_VERSION + 1)
        .bind("2030-01-01T00:00:00Z")
        .execute(repo.pool())
        .await
        .unwrap();
    repo.close().await;

    let err = SqliteOpener::new(url.as_str()).open().await.err().unwrap();
    match err {
        StorageError::Unavailable(message) => assert!(message.contains("outdated"), "{message}"),
        other => panic!("expected Unavailable, got {other:?}"),
    }

    let reopened = SqliteRepository::connect(&url).await.unwrap();
    assert_eq!(reopened.schema_version().await.unwrap(), SCHEMA_VERSION + 1);
}
