use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot, watch};

use annales_core::model::{Qid, SessionId};
use storage::{Collection, CollectionStore, StoreHandle, StoreKey};

use crate::error::StateError;

/// Keys that map one-to-one onto local store keys.
pub trait MirrorKey: Ord + Clone + fmt::Debug + Send + Sync + 'static {
    fn to_store_key(&self) -> StoreKey;

    /// `None` when the stored key does not denote a valid `Self`.
    fn from_store_key(key: &StoreKey) -> Option<Self>;
}

impl MirrorKey for Qid {
    fn to_store_key(&self) -> StoreKey {
        StoreKey::Text(self.as_str().to_owned())
    }

    fn from_store_key(key: &StoreKey) -> Option<Self> {
        key.as_text().map(Qid::new)
    }
}

impl MirrorKey for SessionId {
    fn to_store_key(&self) -> StoreKey {
        StoreKey::Text(self.as_str().to_owned())
    }

    fn from_store_key(key: &StoreKey) -> Option<Self> {
        key.as_text().and_then(|raw| raw.parse().ok())
    }
}

/// Combines a stored entry with an entry written locally before the load
/// finished. Called as `merge(stored, local)`.
pub type MergeFn<V> = fn(V, V) -> V;

/// Progress of the one-time load from the local store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Loaded,
    Failed(String),
}

enum Command<K> {
    /// Write the current in-memory value of the key, or delete it if absent.
    Sync(K),
    Flush(oneshot::Sender<usize>),
}

struct Shared<K, V> {
    entries: Mutex<BTreeMap<K, V>>,
    changes: watch::Sender<u64>,
    load: watch::Sender<LoadState>,
}

impl<K, V> Shared<K, V> {
    fn entries(&self) -> MutexGuard<'_, BTreeMap<K, V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.changes.send_modify(|n| *n = n.wrapping_add(1));
    }
}

/// In-memory map mirrored into one collection of the local store.
///
/// Starts empty; a background task loads the stored entries exactly once and
/// then persists every mutated key, one write per key in mutation order.
/// Mutations are applied synchronously and never wait on the store.
///
/// Clones share the same map and worker. The worker stops when the last
/// clone is dropped.
pub struct MirroredMap<K, V> {
    shared: Arc<Shared<K, V>>,
    commands: mpsc::UnboundedSender<Command<K>>,
    collection: Collection,
}

impl<K, V> Clone for MirroredMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            commands: self.commands.clone(),
            collection: self.collection,
        }
    }
}

impl<K, V> MirroredMap<K, V>
where
    K: MirrorKey,
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates the map and spawns its load-then-persist worker on the current
    /// tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(collection: Collection, store: StoreHandle, merge: MergeFn<V>) -> Self {
        let (changes, _) = watch::channel(0);
        let (load, _) = watch::channel(LoadState::Pending);
        let shared = Arc::new(Shared {
            entries: Mutex::new(BTreeMap::new()),
            changes,
            load,
        });
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(
            Arc::clone(&shared),
            store,
            collection,
            merge,
            rx,
        ));
        Self {
            shared,
            commands,
            collection,
        }
    }

    #[must_use]
    pub fn collection(&self) -> Collection {
        self.collection
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.shared.entries().get(key).cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<K, V> {
        self.shared.entries().clone()
    }

    /// Runs `f` against the current entries without cloning them.
    pub fn with<R>(&self, f: impl FnOnce(&BTreeMap<K, V>) -> R) -> R {
        f(&self.shared.entries())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.entries().is_empty()
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let previous = self.shared.entries().insert(key.clone(), value);
        self.touch(key);
        previous
    }

    /// Mutates the entry for `key`, creating it with `default` first if absent.
    pub fn update<R>(&self, key: K, default: impl FnOnce() -> V, f: impl FnOnce(&mut V) -> R) -> R {
        let out = {
            let mut entries = self.shared.entries();
            f(entries.entry(key.clone()).or_insert_with(default))
        };
        self.touch(key);
        out
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.shared.entries().remove(key);
        if removed.is_some() {
            self.touch(key.clone());
        }
        removed
    }

    /// Change counter, bumped after every mutation and after the load.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    #[must_use]
    pub fn load_state(&self) -> LoadState {
        self.shared.load.borrow().clone()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(*self.shared.load.borrow(), LoadState::Loaded)
    }

    /// Resolves once the initial load has finished.
    ///
    /// # Errors
    ///
    /// Returns `StateError::LoadFailed` if the store could not be read, or
    /// `StateError::WorkerStopped` if the worker is gone.
    pub async fn wait_loaded(&self) -> Result<(), StateError> {
        let mut rx = self.shared.load.subscribe();
        let state = rx
            .wait_for(|state| *state != LoadState::Pending)
            .await
            .map_err(|_| StateError::WorkerStopped)?
            .clone();
        match state {
            LoadState::Failed(reason) => Err(StateError::LoadFailed(reason)),
            LoadState::Pending | LoadState::Loaded => Ok(()),
        }
    }

    /// Resolves once every write issued before this call has been handled.
    ///
    /// # Errors
    ///
    /// Returns `StateError::WritesFailed` if any write failed since the
    /// previous flush, or `StateError::WorkerStopped` if the worker is gone.
    pub async fn flush(&self) -> Result<(), StateError> {
        let (done, rx) = oneshot::channel();
        self.commands
            .send(Command::Flush(done))
            .map_err(|_| StateError::WorkerStopped)?;
        match rx.await.map_err(|_| StateError::WorkerStopped)? {
            0 => Ok(()),
            failed => Err(StateError::WritesFailed(failed)),
        }
    }

    fn touch(&self, key: K) {
        self.shared.bump();
        if self.commands.send(Command::Sync(key)).is_err() {
            tracing::error!(collection = %self.collection, "persistence worker stopped, change kept in memory only");
        }
    }
}

//
// ─── WORKER ────────────────────────────────────────────────────────────────────
//

async fn run_worker<K, V>(
    shared: Arc<Shared<K, V>>,
    store: StoreHandle,
    collection: Collection,
    merge: MergeFn<V>,
    mut rx: mpsc::UnboundedReceiver<Command<K>>,
) where
    K: MirrorKey,
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let backend = match load(&shared, &store, collection, merge).await {
        Ok(backend) => {
            shared.bump();
            shared.load.send_replace(LoadState::Loaded);
            Some(backend)
        }
        Err(err) => {
            tracing::error!(%collection, error = %err, "initial load failed, changes will not be persisted");
            shared.load.send_replace(LoadState::Failed(err.to_string()));
            None
        }
    };

    let mut failed = 0usize;
    while let Some(command) = rx.recv().await {
        match command {
            Command::Sync(key) => {
                let Some(backend) = &backend else {
                    tracing::debug!(%collection, ?key, "store not loaded, change kept in memory only");
                    failed += 1;
                    continue;
                };
                if let Err(err) = persist(&shared, backend.as_ref(), collection, &key).await {
                    tracing::error!(%collection, ?key, error = %err, "failed to persist entry");
                    failed += 1;
                }
            }
            Command::Flush(done) => {
                let _ = done.send(std::mem::take(&mut failed));
            }
        }
    }
}

async fn load<K, V>(
    shared: &Shared<K, V>,
    store: &StoreHandle,
    collection: Collection,
    merge: MergeFn<V>,
) -> Result<Arc<dyn CollectionStore>, StateError>
where
    K: MirrorKey,
    V: DeserializeOwned,
{
    let backend = store.open().await?;
    let records = backend.get_many(collection).await?;

    let mut stored = Vec::with_capacity(records.len());
    for record in records {
        let Some(key) = K::from_store_key(&record.id) else {
            tracing::warn!(%collection, key = %record.id, "skipping record with malformed key");
            continue;
        };
        match serde_json::from_value::<V>(record.data) {
            Ok(value) => stored.push((key, value)),
            Err(err) => {
                tracing::warn!(%collection, ?key, error = %err, "skipping corrupt record");
            }
        }
    }

    let count = stored.len();
    {
        let mut entries = shared.entries();
        for (key, value) in stored {
            let merged = match entries.remove(&key) {
                Some(local) => merge(value, local),
                None => value,
            };
            entries.insert(key, merged);
        }
    }
    tracing::debug!(%collection, count, "mirrored collection loaded");
    Ok(backend)
}

async fn persist<K, V>(
    shared: &Shared<K, V>,
    backend: &dyn CollectionStore,
    collection: Collection,
    key: &K,
) -> Result<(), StateError>
where
    K: MirrorKey,
    V: Serialize + Clone,
{
    let current = shared.entries().get(key).cloned();
    match current {
        Some(value) => {
            storage::put_json(backend, collection, key.to_store_key(), &value).await?;
        }
        None => backend.remove(collection, &key.to_store_key()).await?,
    }
    Ok(())
}
