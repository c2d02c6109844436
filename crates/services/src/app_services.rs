use std::sync::Arc;

use annales_core::Clock;
use annales_core::model::QuestionBank;
use storage::{FileSlots, Storage, StorageError};

use crate::alert::Alert;
use crate::attempts::AttemptLog;
use crate::config::AppConfig;
use crate::error::AppServicesError;
use crate::ids::IdGenerator;
use crate::sessions::{SessionHistory, SessionManager, StudyService};

/// Everything the front end needs, wired over one storage handle.
pub struct AppServices {
    storage: Storage,
    attempts: AttemptLog,
    sessions: Arc<SessionManager>,
    study: StudyService,
    alert: Arc<dyn Alert>,
}

impl AppServices {
    /// Opens the `SQLite` store and slot directory named by `config`, then
    /// starts loading attempts and history in the background.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Storage` if either store cannot be opened;
    /// the failure is also sent to `alert`.
    pub async fn open(
        config: &AppConfig,
        bank: QuestionBank,
        clock: Clock,
        alert: Arc<dyn Alert>,
    ) -> Result<Self, AppServicesError> {
        let slots = FileSlots::open(&config.slots_dir, config.key_prefix.as_str())
            .inspect_err(|err| alert.alert(&format!("local storage unavailable: {err}")))?;
        let storage = Storage::sqlite(&config.db_url, Arc::new(slots));
        if let Err(err) = storage.collections.open().await {
            alert.alert(&format!("local database unavailable: {err}"));
            return Err(err.into());
        }
        Ok(Self::with_storage(
            storage,
            bank,
            clock,
            IdGenerator::from_os_rng(),
            alert,
        ))
    }

    /// Wires services over an existing `storage`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn with_storage(
        storage: Storage,
        bank: QuestionBank,
        clock: Clock,
        ids: IdGenerator,
        alert: Arc<dyn Alert>,
    ) -> Self {
        let ids = Arc::new(ids);
        let attempts = AttemptLog::spawn(storage.collections.clone());
        let history = SessionHistory::spawn(storage.collections.clone());
        let sessions = Arc::new(SessionManager::new(
            Arc::clone(&storage.slots),
            history,
            clock,
            Arc::clone(&ids),
        ));
        let study = StudyService::new(
            Arc::new(bank),
            Arc::clone(&sessions),
            attempts.clone(),
            clock,
            ids,
        );
        Self {
            storage,
            attempts,
            sessions,
            study,
            alert,
        }
    }

    #[must_use]
    pub fn study(&self) -> &StudyService {
        &self.study
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn history(&self) -> &SessionHistory {
        self.sessions.history()
    }

    #[must_use]
    pub fn attempts(&self) -> &AttemptLog {
        &self.attempts
    }

    #[must_use]
    pub fn bank(&self) -> &QuestionBank {
        self.study.bank()
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Waits for the attempt log and history to finish loading.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::State` if either load failed.
    pub async fn wait_loaded(&self) -> Result<(), AppServicesError> {
        self.attempts.wait_loaded().await?;
        self.history().wait_loaded().await?;
        Ok(())
    }

    /// Waits until every pending write has reached the store.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::State` if a background write failed.
    pub async fn flush(&self) -> Result<(), AppServicesError> {
        self.attempts.flush().await?;
        self.history().flush().await?;
        Ok(())
    }

    /// Erases the collection store and every slot.
    ///
    /// Consumes the services: the in-memory state they hold no longer matches
    /// the store afterwards.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Storage`; `StorageError::Blocked` is also
    /// sent to the alert sink and leaves all data in place.
    pub async fn reset(self) -> Result<(), AppServicesError> {
        if let Err(err) = self.flush().await {
            tracing::warn!(error = %err, "pending writes failed before reset");
        }
        match self.storage.destroy().await {
            Ok(()) => Ok(()),
            Err(err) => {
                if matches!(err, StorageError::Blocked(_)) {
                    self.alert.alert(&format!(
                        "reset blocked, close other windows using the data and retry: {err}"
                    ));
                }
                Err(err.into())
            }
        }
    }
}
