use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::ids::{AttemptId, Qid, SessionId};

/// Record of a user answering one question once.
///
/// Created at submission time and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub qid: Qid,
    pub session_id: SessionId,
    pub selected_choice: u8,
    /// `selected_choice == question.answer`, fixed at creation.
    pub correct: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub duration_s: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Attempts grouped per question, each list in submission order.
pub type AttemptsByQid = BTreeMap<Qid, Vec<Attempt>>;

/// Read access to per-question attempt history.
pub trait AttemptHistory {
    /// All attempts recorded for `qid`, oldest first.
    fn attempts_for(&self, qid: &Qid) -> &[Attempt];

    /// Most recent attempt for `qid`, if any.
    fn last_attempt(&self, qid: &Qid) -> Option<&Attempt> {
        self.attempts_for(qid).last()
    }

    /// True when `qid` was never attempted or its latest attempt was wrong.
    fn is_unseen_or_incorrect(&self, qid: &Qid) -> bool {
        self.last_attempt(qid).is_none_or(|attempt| !attempt.correct)
    }
}

impl AttemptHistory for BTreeMap<Qid, Vec<Attempt>> {
    fn attempts_for(&self, qid: &Qid) -> &[Attempt] {
        self.get(qid).map_or(&[], Vec::as_slice)
    }
}

impl<S: std::hash::BuildHasher> AttemptHistory for HashMap<Qid, Vec<Attempt>, S> {
    fn attempts_for(&self, qid: &Qid) -> &[Attempt] {
        self.get(qid).map_or(&[], Vec::as_slice)
    }
}
