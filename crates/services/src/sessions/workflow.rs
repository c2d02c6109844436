use std::sync::Arc;

use annales_core::model::{Attempt, Qid, QuestionBank, SessionId, SessionKind, Subject, WipError};
use annales_core::{ChaptersState, Clock, QuestionFilter, Selection, select_questions};

use crate::attempts::{AttemptLog, make_attempt};
use crate::error::SessionError;
use crate::ids::IdGenerator;

use super::lifecycle::SessionManager;

/// Study flow on top of the session manager: picking questions, starting a
/// session and submitting answers.
#[derive(Clone)]
pub struct StudyService {
    bank: Arc<QuestionBank>,
    sessions: Arc<SessionManager>,
    attempts: AttemptLog,
    clock: Clock,
    ids: Arc<IdGenerator>,
}

impl StudyService {
    #[must_use]
    pub fn new(
        bank: Arc<QuestionBank>,
        sessions: Arc<SessionManager>,
        attempts: AttemptLog,
        clock: Clock,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            bank,
            sessions,
            attempts,
            clock,
            ids,
        }
    }

    /// Questions of `subject` matching `state`, filtered against the live
    /// attempt log.
    #[must_use]
    pub fn select(&self, subject: Subject, state: &ChaptersState) -> Selection {
        self.attempts.with_history(|history| {
            let filter = QuestionFilter::for_state(state, history);
            select_questions(subject, state, self.bank.by_subject(), &filter)
        })
    }

    /// Starts a session over the current selection.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` if nothing matches, or
    /// `SessionError::State` if the session cannot be stored.
    pub fn start(
        &self,
        name: impl Into<String>,
        kind: SessionKind,
        subject: Subject,
        state: &ChaptersState,
    ) -> Result<SessionId, SessionError> {
        let qids = self.select(subject, state).to_list();
        if qids.is_empty() {
            return Err(SessionError::Empty);
        }
        self.sessions.create_session(name, qids, kind)
    }

    /// Records the selected choice of `qid` as an attempt and resolves the
    /// question.
    ///
    /// Returns `Ok(None)` when nothing could be recorded: no choice selected,
    /// question already resolved, or question missing from the bank.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoSession` without an ongoing session, or
    /// `SessionError::Wip` if `qid` is not part of it.
    pub fn submit_answer(&self, qid: &Qid) -> Result<Option<Attempt>, SessionError> {
        let session = self.sessions.current().ok_or(SessionError::NoSession)?;
        let Some(wip) = session.question(qid) else {
            return Err(WipError::UnknownQuestion(qid.clone()).into());
        };
        if !wip.is_editable() {
            tracing::warn!(%qid, "question already resolved, answer ignored");
            return Ok(None);
        }
        let Some(question) = self.bank.get(qid) else {
            tracing::error!(%qid, "question missing from the bank");
            return Ok(None);
        };

        let elapsed = self.sessions.question_duration(qid);
        let Some(attempt) = make_attempt(wip, &session, question, elapsed, &self.clock, &self.ids)
        else {
            return Ok(None);
        };
        self.attempts.add_attempt(attempt.clone());
        self.sessions.resolve(qid, question.answer)?;
        Ok(Some(attempt))
    }

    #[must_use]
    pub fn last_attempt(&self, qid: &Qid) -> Option<Attempt> {
        self.attempts.last_attempt(qid)
    }

    #[must_use]
    pub fn attempts_for(&self, qid: &Qid) -> Vec<Attempt> {
        self.attempts.attempts_for(qid)
    }

    #[must_use]
    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }
}
