use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{AttemptHistory, ChapterId, Qid, QuestionsBySubject, Subject};

//
// ─── CHAPTER CHOICE ────────────────────────────────────────────────────────────
//

/// What the user picked on the chapter selection screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaptersState {
    /// Restrict to questions never attempted or last answered wrong.
    pub only_new: bool,
    pub selected: Vec<ChapterId>,
    /// Also include questions tagged with no chapter.
    pub include_rest: bool,
}

//
// ─── FILTER ────────────────────────────────────────────────────────────────────
//

/// Predicate applied to every candidate question.
#[derive(Clone, Copy)]
pub enum QuestionFilter<'a> {
    All,
    /// Keep questions with no attempt, or whose latest attempt is incorrect.
    UnseenOrIncorrect(&'a dyn AttemptHistory),
}

impl<'a> QuestionFilter<'a> {
    /// Filter implied by `state.only_new`, evaluated against `history`.
    #[must_use]
    pub fn for_state(state: &ChaptersState, history: &'a dyn AttemptHistory) -> Self {
        if state.only_new {
            QuestionFilter::UnseenOrIncorrect(history)
        } else {
            QuestionFilter::All
        }
    }

    #[must_use]
    pub fn accepts(&self, qid: &Qid) -> bool {
        match self {
            QuestionFilter::All => true,
            QuestionFilter::UnseenOrIncorrect(history) => history.is_unseen_or_incorrect(qid),
        }
    }
}

impl std::fmt::Debug for QuestionFilter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuestionFilter::All => f.write_str("All"),
            QuestionFilter::UnseenOrIncorrect(_) => f.write_str("UnseenOrIncorrect"),
        }
    }
}

//
// ─── SELECTION ─────────────────────────────────────────────────────────────────
//

/// Candidate questions grouped the way they were picked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub by_chapter: BTreeMap<ChapterId, Vec<Qid>>,
    pub rest: Vec<Qid>,
}

impl Selection {
    /// Flattens the selection, keeping each question once.
    ///
    /// Chapters come in id order, then the uncategorized questions.
    #[must_use]
    pub fn to_list(&self) -> Vec<Qid> {
        let mut seen = HashSet::new();
        self.by_chapter
            .values()
            .flatten()
            .chain(self.rest.iter())
            .filter(|qid| seen.insert(*qid))
            .cloned()
            .collect()
    }

    /// True when no question survived the selection.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rest.is_empty() && self.by_chapter.values().all(Vec::is_empty)
    }
}

/// Turns a chapter choice into the concrete candidate questions of `subject`.
///
/// Every selected chapter gets a key in `by_chapter`, even when the index has
/// no question for it. `rest` is only filled when `include_rest` is set. An
/// empty choice yields an empty selection.
#[must_use]
pub fn select_questions(
    subject: Subject,
    state: &ChaptersState,
    index: &QuestionsBySubject,
    filter: &QuestionFilter<'_>,
) -> Selection {
    let Some(subject_index) = index.get(&subject) else {
        return Selection {
            by_chapter: state.selected.iter().map(|c| (*c, Vec::new())).collect(),
            rest: Vec::new(),
        };
    };

    let keep = |qids: &[Qid]| -> Vec<Qid> {
        qids.iter().filter(|qid| filter.accepts(qid)).cloned().collect()
    };

    let by_chapter = state
        .selected
        .iter()
        .map(|chapter| (*chapter, keep(subject_index.chapter(*chapter))))
        .collect();

    let rest = if state.include_rest {
        keep(&subject_index.rest)
    } else {
        Vec::new()
    };

    Selection { by_chapter, rest }
}
