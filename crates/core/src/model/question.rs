use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ChapterId, Qid};
use crate::model::subject::Subject;

/// Number of answer choices on every question.
pub const CHOICE_COUNT: usize = 4;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {qid}: answer index {answer} is out of range")]
    InvalidAnswer { qid: Qid, answer: u8 },

    #[error("duplicate question id: {0}")]
    DuplicateQid(Qid),
}

//
// ─── QUESTION ─────────────────────────────────────────────────────────────────
//

/// One multiple-choice question from the bank. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub qid: Qid,
    pub year: u16,
    pub subject: Subject,
    /// Ordinal within the subject paper.
    pub no_subject: u32,
    /// Ordinal within the whole exam.
    pub no: u32,
    pub content: String,
    pub choices: [String; CHOICE_COUNT],
    /// Index of the correct choice, `0..=3`.
    pub answer: u8,
    #[serde(default)]
    pub chapters: Vec<ChapterId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixed_choices: Option<bool>,
}

impl Question {
    #[must_use]
    pub fn is_correct(&self, choice: u8) -> bool {
        self.answer == choice
    }

    /// Whether the choices may be presented in a shuffled order.
    #[must_use]
    pub fn may_shuffle(&self) -> bool {
        self.mixed_choices.unwrap_or(false)
    }
}

//
// ─── INDEX ────────────────────────────────────────────────────────────────────
//

/// Question ids of one subject grouped by chapter, plus the uncategorized rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionsByChapter {
    pub chapters: BTreeMap<ChapterId, Vec<Qid>>,
    pub rest: Vec<Qid>,
}

impl QuestionsByChapter {
    /// Questions tagged with `chapter`, empty when the chapter has none.
    #[must_use]
    pub fn chapter(&self, chapter: ChapterId) -> &[Qid] {
        self.chapters.get(&chapter).map_or(&[], Vec::as_slice)
    }
}

pub type QuestionsBySubject = BTreeMap<Subject, QuestionsByChapter>;

//
// ─── BANK ─────────────────────────────────────────────────────────────────────
//

/// Read-only question bank handed over by the loader.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    questions: BTreeMap<Qid, Question>,
    by_subject: QuestionsBySubject,
}

impl QuestionBank {
    /// Builds the bank and its per-subject chapter index, keeping input order
    /// inside every chapter list.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` on an out-of-range answer or a duplicate qid.
    pub fn new(questions: impl IntoIterator<Item = Question>) -> Result<Self, QuestionError> {
        let mut by_id = BTreeMap::new();
        let mut by_subject = QuestionsBySubject::new();

        for question in questions {
            if usize::from(question.answer) >= CHOICE_COUNT {
                return Err(QuestionError::InvalidAnswer {
                    qid: question.qid,
                    answer: question.answer,
                });
            }
            if by_id.contains_key(&question.qid) {
                return Err(QuestionError::DuplicateQid(question.qid));
            }

            let index = by_subject.entry(question.subject).or_default();
            if question.chapters.is_empty() {
                index.rest.push(question.qid.clone());
            } else {
                for chapter in &question.chapters {
                    let list = index.chapters.entry(*chapter).or_default();
                    if !list.contains(&question.qid) {
                        list.push(question.qid.clone());
                    }
                }
            }
            by_id.insert(question.qid.clone(), question);
        }

        Ok(Self {
            questions: by_id,
            by_subject,
        })
    }

    #[must_use]
    pub fn get(&self, qid: &Qid) -> Option<&Question> {
        self.questions.get(qid)
    }

    #[must_use]
    pub fn contains(&self, qid: &Qid) -> bool {
        self.questions.contains_key(qid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn by_subject(&self) -> &QuestionsBySubject {
        &self.by_subject
    }

    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.questions.values()
    }
}
