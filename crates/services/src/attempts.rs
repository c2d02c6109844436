use std::collections::HashSet;

use annales_core::model::{
    Attempt, AttemptHistory, AttemptsByQid, OngoingSession, Qid, Question, QuestionWip,
};
use annales_core::Clock;
use storage::{Collection, StoreHandle};
use tokio::sync::watch;

use crate::error::StateError;
use crate::ids::IdGenerator;
use crate::reactive::MirroredMap;

/// Builds the attempt for an answered question.
///
/// Returns `None`, and logs why, when no choice was selected or when `wip`
/// and `question` disagree on the question id.
#[must_use]
pub fn make_attempt(
    wip: &QuestionWip,
    session: &OngoingSession,
    question: &Question,
    elapsed_s: u64,
    clock: &Clock,
    ids: &IdGenerator,
) -> Option<Attempt> {
    let Some(selected) = wip.selected else {
        tracing::error!(qid = %wip.qid, "cannot record an attempt without a selected choice");
        return None;
    };
    if wip.qid != question.qid {
        tracing::error!(wip = %wip.qid, question = %question.qid, "attempt built against the wrong question");
        return None;
    }
    Some(Attempt {
        id: ids.attempt_id(),
        qid: question.qid.clone(),
        session_id: session.id.clone(),
        selected_choice: selected,
        correct: question.is_correct(selected),
        timestamp: clock.now_ms(),
        duration_s: elapsed_s,
        notes: None,
    })
}

/// Stored attempts come first; local attempts the store does not know yet
/// follow in their submission order.
fn merge_attempts(mut stored: Vec<Attempt>, local: Vec<Attempt>) -> Vec<Attempt> {
    let known: HashSet<_> = stored.iter().map(|a| a.id.clone()).collect();
    stored.extend(local.into_iter().filter(|a| !known.contains(&a.id)));
    stored
}

/// Per-question attempt log mirrored into the `attempt` collection.
#[derive(Clone)]
pub struct AttemptLog {
    attempts: MirroredMap<Qid, Vec<Attempt>>,
}

impl AttemptLog {
    /// Creates the log and starts loading it in the background.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(store: StoreHandle) -> Self {
        Self {
            attempts: MirroredMap::spawn(Collection::Attempt, store, merge_attempts),
        }
    }

    /// Appends `attempt` to its question's list.
    pub fn add_attempt(&self, attempt: Attempt) {
        tracing::debug!(qid = %attempt.qid, attempt = %attempt.id, correct = attempt.correct, "attempt recorded");
        self.attempts
            .update(attempt.qid.clone(), Vec::new, |list| list.push(attempt));
    }

    #[must_use]
    pub fn attempts_for(&self, qid: &Qid) -> Vec<Attempt> {
        self.attempts.get(qid).unwrap_or_default()
    }

    #[must_use]
    pub fn last_attempt(&self, qid: &Qid) -> Option<Attempt> {
        self.attempts.with(|map| map.last_attempt(qid).cloned())
    }

    /// Runs `f` against the whole log, e.g. to filter questions.
    pub fn with_history<R>(&self, f: impl FnOnce(&dyn AttemptHistory) -> R) -> R {
        self.attempts.with(|map| f(map))
    }

    #[must_use]
    pub fn snapshot(&self) -> AttemptsByQid {
        self.attempts.snapshot()
    }

    /// Number of questions with at least one attempt.
    #[must_use]
    pub fn question_count(&self) -> usize {
        self.attempts.len()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.attempts.subscribe()
    }

    /// # Errors
    ///
    /// Returns `StateError::LoadFailed` if the stored log could not be read.
    pub async fn wait_loaded(&self) -> Result<(), StateError> {
        self.attempts.wait_loaded().await
    }

    /// # Errors
    ///
    /// Returns `StateError::WritesFailed` if a background write failed.
    pub async fn flush(&self) -> Result<(), StateError> {
        self.attempts.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annales_core::model::{AttemptId, SessionKind, Subject};
    use annales_core::time::fixed_clock;
    use std::sync::Arc;
    use storage::InMemoryStore;

    fn question() -> Question {
        Question {
            qid: Qid::new("q1"),
            year: 2021,
            subject: Subject::Meteorology,
            no_subject: 1,
            no: 1,
            content: "Quel nuage ?".into(),
            choices: ["a".into(), "b".into(), "c".into(), "d".into()],
            answer: 2,
            chapters: Vec::new(),
            attachment_link: None,
            mixed_choices: None,
        }
    }

    fn session(ids: &IdGenerator) -> OngoingSession {
        OngoingSession::new(
            ids.session_id(),
            "s",
            SessionKind::Practice,
            [Qid::new("q1")],
            0,
        )
    }

    fn attempt(id: &str) -> Attempt {
        let ids = IdGenerator::seeded(1);
        let mut wip = QuestionWip::new(Qid::new("q1"));
        wip.select(0).unwrap();
        let mut attempt =
            make_attempt(&wip, &session(&ids), &question(), 1, &fixed_clock(), &ids).unwrap();
        attempt.id = id.parse::<AttemptId>().unwrap();
        attempt
    }

    #[test]
    fn unanswered_question_yields_none() {
        let ids = IdGenerator::seeded(1);
        let wip = QuestionWip::new(Qid::new("q1"));
        assert!(make_attempt(&wip, &session(&ids), &question(), 3, &fixed_clock(), &ids).is_none());
    }

    #[test]
    fn correctness_follows_answer() {
        let ids = IdGenerator::seeded(1);
        let session = session(&ids);
        for choice in 0..4u8 {
            let mut wip = QuestionWip::new(Qid::new("q1"));
            wip.select(choice).unwrap();
            let attempt =
                make_attempt(&wip, &session, &question(), 9, &fixed_clock(), &ids).unwrap();
            assert_eq!(attempt.correct, choice == 2);
            assert_eq!(attempt.selected_choice, choice);
            assert_eq!(attempt.duration_s, 9);
            assert_eq!(attempt.session_id, session.id);
            assert_eq!(attempt.timestamp, fixed_clock().now_ms());
            assert!(attempt.id.as_str().starts_with("att_"));
        }
    }

    #[test]
    fn mismatched_question_yields_none() {
        let ids = IdGenerator::seeded(1);
        let mut wip = QuestionWip::new(Qid::new("other"));
        wip.select(1).unwrap();
        assert!(make_attempt(&wip, &session(&ids), &question(), 0, &fixed_clock(), &ids).is_none());
    }

    #[test]
    fn merge_keeps_stored_order_and_drops_duplicates() {
        let stored = vec![attempt("att_AAAAAAAA"), attempt("att_BBBBBBBB")];
        let local = vec![attempt("att_BBBBBBBB"), attempt("att_CCCCCCCC")];
        let merged = merge_attempts(stored, local);
        let ids: Vec<_> = merged.iter().map(|a| a.id.as_str().to_owned()).collect();
        assert_eq!(ids, ["att_AAAAAAAA", "att_BBBBBBBB", "att_CCCCCCCC"]);
    }

    #[tokio::test]
    async fn attempts_keep_submission_order() {
        let store = StoreHandle::ready(Arc::new(InMemoryStore::new()));
        let log = AttemptLog::spawn(store);
        log.wait_loaded().await.unwrap();

        log.add_attempt(attempt("att_AAAAAAAA"));
        log.add_attempt(attempt("att_BBBBBBBB"));

        let list = log.attempts_for(&Qid::new("q1"));
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id.as_str(), "att_AAAAAAAA");
        assert_eq!(
            log.last_attempt(&Qid::new("q1")).unwrap().id.as_str(),
            "att_BBBBBBBB"
        );
        assert!(log.with_history(|h| h.is_unseen_or_incorrect(&Qid::new("q1"))));
        log.flush().await.unwrap();
    }
}
