use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("deletion blocked: {0}")]
    Blocked(String),
}

//
// ─── COLLECTIONS & KEYS ───────────────────────────────────────────────────────
//

/// The named collections of the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Free-form log entries.
    Log,
    /// Key: question id, value: ordered list of attempts.
    Attempt,
    /// Key: session id, value: finished session.
    Session,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Log, Collection::Attempt, Collection::Session];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Log => "log",
            Collection::Attempt => "attempt",
            Collection::Session => "session",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record key: either numeric or textual. Numeric keys sort first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreKey {
    Int(i64),
    Text(String),
}

impl StoreKey {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StoreKey::Text(s) => Some(s),
            StoreKey::Int(_) => None,
        }
    }
}

impl From<&str> for StoreKey {
    fn from(s: &str) -> Self {
        StoreKey::Text(s.to_owned())
    }
}

impl From<String> for StoreKey {
    fn from(s: String) -> Self {
        StoreKey::Text(s)
    }
}

impl From<i64> for StoreKey {
    fn from(v: i64) -> Self {
        StoreKey::Int(v)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKey::Int(v) => write!(f, "{v}"),
            StoreKey::Text(s) => f.write_str(s),
        }
    }
}

/// Shape of a stored entry: `{ "id": key, "data": value }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: StoreKey,
    pub data: Value,
}

//
// ─── CONTRACTS ────────────────────────────────────────────────────────────────
//

/// Asynchronous key-value collections backing attempts, sessions and the log.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Fetch a value by key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get(&self, collection: Collection, key: &StoreKey)
    -> Result<Option<Value>, StorageError>;

    /// Insert or replace a value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn put(
        &self,
        collection: Collection,
        key: StoreKey,
        value: Value,
    ) -> Result<(), StorageError>;

    /// All keys of a collection, in key order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn list(&self, collection: Collection) -> Result<Vec<StoreKey>, StorageError>;

    /// All records of a collection, in key order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get_many(&self, collection: Collection) -> Result<Vec<StoredRecord>, StorageError>;

    /// Delete a record. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn remove(&self, collection: Collection, key: &StoreKey) -> Result<(), StorageError>;

    /// Delete every record of a collection.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn clear(&self, collection: Collection) -> Result<(), StorageError>;

    /// Close and erase the whole backing store.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Blocked` without deleting anything if another
    /// consumer holds the store.
    async fn destroy(&self) -> Result<(), StorageError>;
}

/// Synchronous string slots for small scalar state.
pub trait SlotStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be removed.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Remove every slot owned by this store.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if a slot cannot be removed.
    fn clear(&self) -> Result<(), StorageError>;
}

//
// ─── TYPED HELPERS ────────────────────────────────────────────────────────────
//

fn ser<E: fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Fetch and deserialize a value.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the stored JSON does not match `T`.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn CollectionStore,
    collection: Collection,
    key: &StoreKey,
) -> Result<Option<T>, StorageError> {
    store
        .get(collection, key)
        .await?
        .map(|v| serde_json::from_value(v).map_err(ser))
        .transpose()
}

/// Serialize and store a value.
///
/// # Errors
///
/// Returns `StorageError` if serialization or the write fails.
pub async fn put_json<T: Serialize + ?Sized>(
    store: &dyn CollectionStore,
    collection: Collection,
    key: StoreKey,
    value: &T,
) -> Result<(), StorageError> {
    let value = serde_json::to_value(value).map_err(ser)?;
    store.put(collection, key, value).await
}

/// Fetch and deserialize every record of a collection.
///
/// # Errors
///
/// Returns `StorageError::Serialization` on the first record that does not match `T`.
pub async fn get_many_json<T: DeserializeOwned>(
    store: &dyn CollectionStore,
    collection: Collection,
) -> Result<Vec<(StoreKey, T)>, StorageError> {
    store
        .get_many(collection)
        .await?
        .into_iter()
        .map(|record| Ok((record.id, serde_json::from_value(record.data).map_err(ser)?)))
        .collect()
}

//
// ─── IN-MEMORY BACKENDS ───────────────────────────────────────────────────────
//

type CollectionMap = HashMap<Collection, BTreeMap<StoreKey, Value>>;

/// Simple in-memory collection store for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<Mutex<CollectionMap>>,
    consumers: Arc<AtomicUsize>,
}

/// Marks another active consumer of an [`InMemoryStore`] while alive.
#[derive(Debug)]
pub struct ConsumerGuard {
    consumers: Arc<AtomicUsize>,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        self.consumers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers another consumer; `destroy` is blocked until the guard drops.
    #[must_use]
    pub fn acquire_consumer(&self) -> ConsumerGuard {
        self.consumers.fetch_add(1, Ordering::SeqCst);
        ConsumerGuard {
            consumers: Arc::clone(&self.consumers),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CollectionMap>, StorageError> {
        self.collections
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CollectionStore for InMemoryStore {
    async fn get(
        &self,
        collection: Collection,
        key: &StoreKey,
    ) -> Result<Option<Value>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.get(&collection).and_then(|c| c.get(key)).cloned())
    }

    async fn put(
        &self,
        collection: Collection,
        key: StoreKey,
        value: Value,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.entry(collection).or_default().insert(key, value);
        Ok(())
    }

    async fn list(&self, collection: Collection) -> Result<Vec<StoreKey>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .get(&collection)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_many(&self, collection: Collection) -> Result<Vec<StoredRecord>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .get(&collection)
            .map(|c| {
                c.iter()
                    .map(|(id, data)| StoredRecord {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn remove(&self, collection: Collection, key: &StoreKey) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if let Some(c) = guard.get_mut(&collection) {
            c.remove(key);
        }
        Ok(())
    }

    async fn clear(&self, collection: Collection) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.remove(&collection);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), StorageError> {
        let active = self.consumers.load(Ordering::SeqCst);
        if active > 0 {
            return Err(StorageError::Blocked(format!(
                "{active} other consumer(s) still hold the store"
            )));
        }
        self.lock()?.clear();
        Ok(())
    }
}

/// In-memory slot store for tests.
#[derive(Clone, Default)]
pub struct InMemorySlots {
    slots: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemorySlots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
        self.slots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

impl SlotStore for InMemorySlots {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.lock()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_get_list_remove() {
        let store = InMemoryStore::new();
        store
            .put(Collection::Attempt, "q1".into(), json!([1, 2]))
            .await
            .unwrap();
        store
            .put(Collection::Attempt, "q0".into(), json!([]))
            .await
            .unwrap();

        let value = store.get(Collection::Attempt, &"q1".into()).await.unwrap();
        assert_eq!(value, Some(json!([1, 2])));
        assert_eq!(
            store.list(Collection::Attempt).await.unwrap(),
            vec![StoreKey::from("q0"), StoreKey::from("q1")]
        );
        assert!(store.list(Collection::Session).await.unwrap().is_empty());

        store.remove(Collection::Attempt, &"q0".into()).await.unwrap();
        assert_eq!(store.get_many(Collection::Attempt).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn numeric_keys_sort_before_text() {
        let store = InMemoryStore::new();
        store.put(Collection::Log, "a".into(), json!(1)).await.unwrap();
        store.put(Collection::Log, 10_i64.into(), json!(2)).await.unwrap();
        store.put(Collection::Log, 2_i64.into(), json!(3)).await.unwrap();
        let keys = store.list(Collection::Log).await.unwrap();
        assert_eq!(
            keys,
            vec![StoreKey::Int(2), StoreKey::Int(10), StoreKey::from("a")]
        );
    }

    #[tokio::test]
    async fn typed_helpers_roundtrip() {
        let store = InMemoryStore::new();
        put_json(&store, Collection::Session, "s1".into(), &vec!["a", "b"])
            .await
            .unwrap();
        let back: Option<Vec<String>> = get_json(&store, Collection::Session, &"s1".into())
            .await
            .unwrap();
        assert_eq!(back, Some(vec!["a".to_owned(), "b".to_owned()]));

        let mismatch = get_json::<u32>(&store, Collection::Session, &"s1".into()).await;
        assert!(matches!(mismatch, Err(StorageError::Serialization(_))));
    }

    #[tokio::test]
    async fn destroy_blocked_by_consumer_keeps_data() {
        let store = InMemoryStore::new();
        store.put(Collection::Log, "k".into(), json!("v")).await.unwrap();

        let guard = store.acquire_consumer();
        let err = store.destroy().await.unwrap_err();
        assert!(matches!(err, StorageError::Blocked(_)));
        assert_eq!(store.list(Collection::Log).await.unwrap().len(), 1);

        drop(guard);
        store.destroy().await.unwrap();
        assert!(store.list(Collection::Log).await.unwrap().is_empty());
    }

    #[test]
    fn store_key_json_is_untagged() {
        assert_eq!(serde_json::to_string(&StoreKey::Int(3)).unwrap(), "3");
        assert_eq!(serde_json::to_string(&StoreKey::from("q")).unwrap(), "\"q\"");
        let record: StoredRecord = serde_json::from_str(r#"{"id":"q1","data":[]}"#).unwrap();
        assert_eq!(record.id, StoreKey::from("q1"));
    }

    #[test]
    fn slots_set_get_clear() {
        let slots = InMemorySlots::new();
        slots.set("a", "1").unwrap();
        slots.set("b", "2").unwrap();
        assert_eq!(slots.get("a").unwrap().as_deref(), Some("1"));
        slots.remove("a").unwrap();
        assert_eq!(slots.get("a").unwrap(), None);
        slots.clear().unwrap();
        assert_eq!(slots.get("b").unwrap(), None);
    }
}
