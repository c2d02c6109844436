use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{Qid, SessionId};
use crate::model::question::CHOICE_COUNT;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WipError {
    #[error("question {0} is not part of the session")]
    UnknownQuestion(Qid),

    #[error("question {0} is already resolved")]
    NotEditable(Qid),

    #[error("choice {0} is out of range")]
    ChoiceOutOfRange(u8),
}

/// What kind of session the user is sitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionKind {
    /// Reproduces the paper of `year` under a time budget.
    Exam { year: u16, time_budget_s: u64 },
    Practice,
}

impl SessionKind {
    /// Exams withhold correctness until the end, practice reveals it per question.
    #[must_use]
    pub fn reveals_immediately(self) -> bool {
        matches!(self, SessionKind::Practice)
    }

    #[must_use]
    pub fn time_budget_s(self) -> Option<u64> {
        match self {
            SessionKind::Exam { time_budget_s, .. } => Some(time_budget_s),
            SessionKind::Practice => None,
        }
    }
}

//
// ─── QUESTION WIP ─────────────────────────────────────────────────────────────
//

/// Per-question progress inside the ongoing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionWip {
    pub qid: Qid,
    pub duration_s: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<u8>,
    /// Correct choice, set once the question has been submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<u8>,
}

impl QuestionWip {
    #[must_use]
    pub fn new(qid: Qid) -> Self {
        Self {
            qid,
            duration_s: 0,
            selected: None,
            resolved: None,
        }
    }

    #[must_use]
    pub fn is_editable(&self) -> bool {
        self.resolved.is_none()
    }

    /// Selects (or changes) the answer choice.
    ///
    /// # Errors
    ///
    /// Returns `WipError::NotEditable` once resolved, or
    /// `WipError::ChoiceOutOfRange` for an index past the last choice.
    pub fn select(&mut self, choice: u8) -> Result<(), WipError> {
        if !self.is_editable() {
            return Err(WipError::NotEditable(self.qid.clone()));
        }
        if usize::from(choice) >= CHOICE_COUNT {
            return Err(WipError::ChoiceOutOfRange(choice));
        }
        self.selected = Some(choice);
        Ok(())
    }

    /// Freezes the question with its correct choice.
    pub fn resolve(&mut self, answer: u8) {
        self.resolved = Some(answer);
    }
}

//
// ─── ONGOING SESSION ──────────────────────────────────────────────────────────
//

/// The single in-progress session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OngoingSession {
    pub id: SessionId,
    pub name: String,
    pub kind: SessionKind,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    pub questions: Vec<QuestionWip>,
    pub reveal_immediately: bool,
}

impl OngoingSession {
    /// Builds a session over `qids`, dropping repeated ids while keeping the
    /// first occurrence in place.
    #[must_use]
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        kind: SessionKind,
        qids: impl IntoIterator<Item = Qid>,
        created_at: i64,
    ) -> Self {
        let mut seen = HashSet::new();
        let questions = qids
            .into_iter()
            .filter(|qid| seen.insert(qid.clone()))
            .map(QuestionWip::new)
            .collect();
        Self {
            id,
            name: name.into(),
            kind,
            created_at,
            questions,
            reveal_immediately: kind.reveals_immediately(),
        }
    }

    #[must_use]
    pub fn question(&self, qid: &Qid) -> Option<&QuestionWip> {
        self.questions.iter().find(|q| &q.qid == qid)
    }

    /// # Errors
    ///
    /// Returns `WipError::UnknownQuestion` if `qid` is not in the session.
    pub fn question_mut(&mut self, qid: &Qid) -> Result<&mut QuestionWip, WipError> {
        self.questions
            .iter_mut()
            .find(|q| &q.qid == qid)
            .ok_or_else(|| WipError::UnknownQuestion(qid.clone()))
    }

    pub fn qids(&self) -> impl Iterator<Item = &Qid> {
        self.questions.iter().map(|q| &q.qid)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.questions.iter().filter(|q| q.resolved.is_some()).count()
    }

    /// Collapses the session into its immutable history record.
    #[must_use]
    pub fn finish(self, duration_s: u64) -> Session {
        Session {
            id: self.id,
            name: self.name,
            kind: self.kind,
            created_at: self.created_at,
            questions: self.questions.into_iter().map(|q| q.qid).collect(),
            duration_s,
        }
    }
}

//
// ─── FINISHED SESSION ─────────────────────────────────────────────────────────
//

/// Historical record of a finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub kind: SessionKind,
    pub created_at: i64,
    pub questions: Vec<Qid>,
    pub duration_s: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid() -> SessionId {
        "ses_TESTTEST".parse().unwrap()
    }

    fn qids(ids: &[&str]) -> Vec<Qid> {
        ids.iter().map(|s| Qid::new(*s)).collect()
    }

    #[test]
    fn new_session_dedupes_questions_in_order() {
        let session = OngoingSession::new(
            sid(),
            "Chapitre 1",
            SessionKind::Practice,
            qids(&["q2", "q1", "q2", "q3"]),
            10,
        );
        let order: Vec<_> = session.qids().map(Qid::as_str).collect();
        assert_eq!(order, vec!["q2", "q1", "q3"]);
        assert!(session.reveal_immediately);
    }

    #[test]
    fn exam_withholds_correctness() {
        let kind = SessionKind::Exam {
            year: 2019,
            time_budget_s: 2_700,
        };
        let session = OngoingSession::new(sid(), "BIA 2019", kind, qids(&["q1"]), 0);
        assert!(!session.reveal_immediately);
        assert_eq!(session.kind.time_budget_s(), Some(2_700));
    }

    #[test]
    fn resolved_question_is_frozen() {
        let mut wip = QuestionWip::new(Qid::new("q1"));
        wip.select(1).unwrap();
        wip.select(2).unwrap();
        wip.resolve(3);
        assert_eq!(wip.select(0), Err(WipError::NotEditable(Qid::new("q1"))));
        assert_eq!(wip.selected, Some(2));
    }

    #[test]
    fn select_rejects_out_of_range_choice() {
        let mut wip = QuestionWip::new(Qid::new("q1"));
        assert_eq!(wip.select(4), Err(WipError::ChoiceOutOfRange(4)));
    }

    #[test]
    fn finish_collapses_to_identifiers() {
        let mut session =
            OngoingSession::new(sid(), "s", SessionKind::Practice, qids(&["a", "b"]), 42);
        session.question_mut(&Qid::new("a")).unwrap().select(0).unwrap();
        let finished = session.finish(95);
        assert_eq!(finished.questions, qids(&["a", "b"]));
        assert_eq!(finished.duration_s, 95);
        assert_eq!(finished.created_at, 42);
    }

    #[test]
    fn kind_serializes_with_tag() {
        let json = serde_json::to_string(&SessionKind::Exam {
            year: 2020,
            time_budget_s: 60,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"exam","year":2020,"time_budget_s":60}"#);
        let practice: SessionKind = serde_json::from_str(r#"{"type":"practice"}"#).unwrap();
        assert_eq!(practice, SessionKind::Practice);
    }
}
