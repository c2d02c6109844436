use std::collections::BTreeMap;
use std::sync::Arc;

use annales_core::Clock;
use annales_core::model::{
    OngoingSession, QuestionWip, Qid, Session, SessionId, SessionKind, WipError,
};
use storage::SlotStore;

use crate::error::SessionError;
use crate::ids::IdGenerator;
use crate::reactive::PersistedScalar;

use super::history::SessionHistory;

pub const ONGOING_SESSION_SLOT: &str = "ongoingSession";
pub const SESSION_DURATION_SLOT: &str = "sessionDuration";
pub const SESSION_DURATION_BY_Q_SLOT: &str = "sessionDurationByQ";

/// Owns the ongoing session and its timers, and moves finished sessions
/// into history.
///
/// States are *absent* and *ongoing*. `create_session` enters *ongoing*
/// (replacing any previous session), `save` records history then cancels,
/// `cancel` returns to *absent* without recording.
pub struct SessionManager {
    ongoing: PersistedScalar<Option<OngoingSession>>,
    duration: PersistedScalar<Option<u64>>,
    duration_by_q: PersistedScalar<BTreeMap<Qid, u64>>,
    history: SessionHistory,
    clock: Clock,
    ids: Arc<IdGenerator>,
}

impl SessionManager {
    /// Restores the ongoing session and timers from `slots`.
    #[must_use]
    pub fn new(
        slots: Arc<dyn SlotStore>,
        history: SessionHistory,
        clock: Clock,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            ongoing: PersistedScalar::new(Arc::clone(&slots), ONGOING_SESSION_SLOT, None),
            duration: PersistedScalar::new(Arc::clone(&slots), SESSION_DURATION_SLOT, None),
            duration_by_q: PersistedScalar::new(slots, SESSION_DURATION_BY_Q_SLOT, BTreeMap::new()),
            history,
            clock,
            ids,
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<OngoingSession> {
        self.ongoing.get()
    }

    #[must_use]
    pub fn is_ongoing(&self) -> bool {
        self.ongoing.with(Option::is_some)
    }

    /// Aggregate duration of the ongoing session, in seconds.
    #[must_use]
    pub fn duration(&self) -> u64 {
        self.duration.get().unwrap_or(0)
    }

    #[must_use]
    pub fn question_duration(&self, qid: &Qid) -> u64 {
        self.duration_by_q.with(|map| map.get(qid).copied().unwrap_or(0))
    }

    #[must_use]
    pub fn durations_by_question(&self) -> BTreeMap<Qid, u64> {
        self.duration_by_q.get()
    }

    /// Time left for an exam, floored at zero. `None` without an ongoing exam.
    #[must_use]
    pub fn remaining_time(&self) -> Option<u64> {
        let budget = self.ongoing.with(|s| s.as_ref().and_then(|s| s.kind.time_budget_s()))?;
        Some(budget.saturating_sub(self.duration()))
    }

    #[must_use]
    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    /// Starts a session over `qids`. An ongoing session is replaced.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` if a slot cannot be written.
    pub fn create_session(
        &self,
        name: impl Into<String>,
        qids: impl IntoIterator<Item = Qid>,
        kind: SessionKind,
    ) -> Result<SessionId, SessionError> {
        if let Some(previous) = self.ongoing.with(|s| s.as_ref().map(|s| s.id.clone())) {
            tracing::error!(previous = %previous, "creating a session while one is ongoing, previous session discarded");
        }

        let session = OngoingSession::new(
            self.ids.session_id(),
            name,
            kind,
            qids,
            self.clock.now_ms(),
        );
        let per_question = session.qids().map(|qid| (qid.clone(), 0)).collect();
        let id = session.id.clone();

        self.duration_by_q.set(per_question)?;
        self.duration.set(Some(0))?;
        tracing::info!(session = %id, questions = session.questions.len(), "session started");
        self.ongoing.set(Some(session))?;
        Ok(id)
    }

    /// Records the ongoing session in history and clears it.
    ///
    /// Without an ongoing session this logs and returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` if the slots cannot be cleared.
    pub fn save(&self) -> Result<Option<Session>, SessionError> {
        let Some(ongoing) = self.current() else {
            tracing::error!("save called with no ongoing session");
            return Ok(None);
        };
        let finished = ongoing.finish(self.duration());
        self.history.record(finished.clone());
        self.clear()?;
        Ok(Some(finished))
    }

    /// Discards the ongoing session without recording it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` if the slots cannot be cleared.
    pub fn cancel(&self) -> Result<(), SessionError> {
        match self.ongoing.with(|s| s.as_ref().map(|s| s.id.clone())) {
            Some(id) => tracing::info!(session = %id, "session cancelled"),
            None => tracing::error!("cancel called with no ongoing session"),
        }
        self.clear()
    }

    /// Adds `seconds` to the aggregate duration, and to `active`'s duration
    /// when it belongs to the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoSession` when no session is ongoing.
    pub fn tick(&self, active: Option<&Qid>, seconds: u64) -> Result<(), SessionError> {
        if !self.is_ongoing() {
            return Err(SessionError::NoSession);
        }
        self.duration
            .update(|d| *d = Some(d.unwrap_or(0).saturating_add(seconds)))?;
        if let Some(qid) = active {
            let known = self.ongoing.with(|s| s.as_ref().is_some_and(|s| s.question(qid).is_some()));
            if known {
                self.duration_by_q.update(|map| {
                    let entry = map.entry(qid.clone()).or_insert(0);
                    *entry = entry.saturating_add(seconds);
                })?;
            }
        }
        Ok(())
    }

    /// Selects `choice` for `qid` while the question is still editable.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoSession` without an ongoing session, or
    /// `SessionError::Wip` for an unknown, resolved, or out-of-range edit.
    pub fn select_choice(&self, qid: &Qid, choice: u8) -> Result<(), SessionError> {
        self.edit(qid, |wip| wip.select(choice))
    }

    /// Marks `qid` resolved with the correct `answer` and freezes its
    /// elapsed time.
    ///
    /// # Errors
    ///
    /// Same as [`SessionManager::select_choice`] for unknown questions.
    pub fn resolve(&self, qid: &Qid, answer: u8) -> Result<(), SessionError> {
        let elapsed = self.question_duration(qid);
        self.edit(qid, |wip| {
            wip.duration_s = elapsed;
            wip.resolve(answer);
            Ok(())
        })
    }

    fn edit(
        &self,
        qid: &Qid,
        f: impl FnOnce(&mut QuestionWip) -> Result<(), WipError>,
    ) -> Result<(), SessionError> {
        let Some(mut session) = self.current() else {
            tracing::error!(%qid, "edit with no ongoing session");
            return Err(SessionError::NoSession);
        };
        if let Err(err) = session.question_mut(qid).and_then(f) {
            tracing::warn!(%qid, error = %err, "question edit rejected");
            return Err(err.into());
        }
        self.ongoing.set(Some(session))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        self.ongoing.clear_to(None)?;
        self.duration.set(Some(0))?;
        self.duration_by_q.set(BTreeMap::new())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annales_core::time::fixed_clock;
    use storage::{InMemorySlots, InMemoryStore, StoreHandle};

    fn qids(raw: &[&str]) -> Vec<Qid> {
        raw.iter().copied().map(Qid::new).collect()
    }

    fn manager(slots: Arc<dyn SlotStore>) -> SessionManager {
        let history = SessionHistory::spawn(StoreHandle::ready(Arc::new(InMemoryStore::new())));
        SessionManager::new(slots, history, fixed_clock(), Arc::new(IdGenerator::seeded(3)))
    }

    #[tokio::test]
    async fn create_zeroes_timers() {
        let m = manager(Arc::new(InMemorySlots::new()));
        let id = m.create_session("s", qids(&["a", "b"]), SessionKind::Practice).unwrap();

        let current = m.current().unwrap();
        assert_eq!(current.id, id);
        assert_eq!(m.duration(), 0);
        assert_eq!(m.durations_by_question().len(), 2);
        assert_eq!(m.question_duration(&Qid::new("a")), 0);
    }

    #[tokio::test]
    async fn ongoing_session_survives_restart() {
        let slots: Arc<dyn SlotStore> = Arc::new(InMemorySlots::new());
        let first = manager(Arc::clone(&slots));
        let id = first.create_session("s", qids(&["a"]), SessionKind::Practice).unwrap();
        first.tick(Some(&Qid::new("a")), 4).unwrap();

        let second = manager(slots);
        assert_eq!(second.current().unwrap().id, id);
        assert_eq!(second.duration(), 4);
        assert_eq!(second.question_duration(&Qid::new("a")), 4);
    }

    #[tokio::test]
    async fn tick_ignores_foreign_question() {
        let m = manager(Arc::new(InMemorySlots::new()));
        m.create_session("s", qids(&["a"]), SessionKind::Practice).unwrap();
        m.tick(Some(&Qid::new("zz")), 2).unwrap();

        assert_eq!(m.duration(), 2);
        assert_eq!(m.question_duration(&Qid::new("zz")), 0);
    }

    #[tokio::test]
    async fn tick_without_session_fails() {
        let m = manager(Arc::new(InMemorySlots::new()));
        assert!(matches!(m.tick(None, 1), Err(SessionError::NoSession)));
    }

    #[tokio::test]
    async fn resolved_question_rejects_edits() {
        let m = manager(Arc::new(InMemorySlots::new()));
        m.create_session("s", qids(&["a"]), SessionKind::Practice).unwrap();
        let a = Qid::new("a");
        m.select_choice(&a, 1).unwrap();
        m.resolve(&a, 2).unwrap();

        assert!(matches!(m.select_choice(&a, 3), Err(SessionError::Wip(_))));
        let wip = m.current().unwrap().question(&a).cloned().unwrap();
        assert_eq!(wip.selected, Some(1));
        assert_eq!(wip.resolved, Some(2));
    }

    #[tokio::test]
    async fn remaining_time_counts_down_exam_budget() {
        let m = manager(Arc::new(InMemorySlots::new()));
        assert_eq!(m.remaining_time(), None);

        m.create_session(
            "exam",
            qids(&["a"]),
            SessionKind::Exam { year: 2022, time_budget_s: 10 },
        )
        .unwrap();
        m.tick(None, 4).unwrap();
        assert_eq!(m.remaining_time(), Some(6));
        m.tick(None, 40).unwrap();
        assert_eq!(m.remaining_time(), Some(0));
    }
}
