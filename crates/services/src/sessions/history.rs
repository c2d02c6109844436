use std::cmp::Reverse;

use annales_core::model::{Session, SessionId};
use storage::{Collection, StoreHandle};
use tokio::sync::watch;

use crate::error::StateError;
use crate::reactive::MirroredMap;

fn keep_local(_stored: Session, local: Session) -> Session {
    local
}

/// Finished sessions mirrored into the `session` collection.
#[derive(Clone)]
pub struct SessionHistory {
    sessions: MirroredMap<SessionId, Session>,
}

impl SessionHistory {
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(store: StoreHandle) -> Self {
        Self {
            sessions: MirroredMap::spawn(Collection::Session, store, keep_local),
        }
    }

    /// Adds a finished session. A session whose id is already recorded is
    /// logged and ignored; returns whether it was added.
    pub fn record(&self, session: Session) -> bool {
        if self.sessions.with(|map| map.contains_key(&session.id)) {
            tracing::error!(session = %session.id, "session already in history, not recorded twice");
            return false;
        }
        tracing::info!(session = %session.id, questions = session.questions.len(), duration_s = session.duration_s, "session saved");
        self.sessions.insert(session.id.clone(), session);
        true
    }

    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id)
    }

    /// Finished sessions, most recent first.
    #[must_use]
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.with(|map| map.values().cloned().collect());
        sessions.sort_by_key(|s| Reverse((s.created_at, s.id.clone())));
        sessions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.sessions.subscribe()
    }

    /// # Errors
    ///
    /// Returns `StateError::LoadFailed` if the stored history could not be read.
    pub async fn wait_loaded(&self) -> Result<(), StateError> {
        self.sessions.wait_loaded().await
    }

    /// # Errors
    ///
    /// Returns `StateError::WritesFailed` if a background write failed.
    pub async fn flush(&self) -> Result<(), StateError> {
        self.sessions.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annales_core::model::SessionKind;
    use std::sync::Arc;
    use storage::InMemoryStore;

    fn session(id: &str, created_at: i64) -> Session {
        Session {
            id: id.parse().unwrap(),
            name: id.into(),
            kind: SessionKind::Practice,
            created_at,
            questions: Vec::new(),
            duration_s: 0,
        }
    }

    #[tokio::test]
    async fn lists_most_recent_first() {
        let history = SessionHistory::spawn(StoreHandle::ready(Arc::new(InMemoryStore::new())));
        history.wait_loaded().await.unwrap();

        history.record(session("ses_old00000", 1));
        history.record(session("ses_new00000", 3));
        history.record(session("ses_mid00000", 2));

        let names: Vec<_> = history.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["ses_new00000", "ses_mid00000", "ses_old00000"]);
    }

    #[tokio::test]
    async fn duplicate_ids_are_ignored() {
        let history = SessionHistory::spawn(StoreHandle::ready(Arc::new(InMemoryStore::new())));
        history.wait_loaded().await.unwrap();

        assert!(history.record(session("ses_aaaaaaaa", 1)));
        assert!(!history.record(session("ses_aaaaaaaa", 2)));

        assert_eq!(history.len(), 1);
        assert_eq!(history.list()[0].created_at, 1);
    }
}
