use std::fmt;
use std::path::Path;

use serde::Deserialize;

use annales_core::model::{Chapter, ChapterCatalog, Question, QuestionBank, QuestionError};

/// On-disk question bank: reference chapters plus every question.
#[derive(Debug, Deserialize)]
struct BankFile {
    #[serde(default)]
    chapters: Vec<Chapter>,
    questions: Vec<Question>,
}

#[derive(Debug)]
pub enum BankError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Invalid(QuestionError),
}

impl fmt::Display for BankError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BankError::Io(err) => write!(f, "cannot read question bank: {err}"),
            BankError::Json(err) => write!(f, "malformed question bank: {err}"),
            BankError::Invalid(err) => write!(f, "invalid question bank: {err}"),
        }
    }
}

impl std::error::Error for BankError {}

/// Parses a bank from its JSON text.
pub fn parse_bank(raw: &str) -> Result<(ChapterCatalog, QuestionBank), BankError> {
    let file: BankFile = serde_json::from_str(raw).map_err(BankError::Json)?;
    let bank = QuestionBank::new(file.questions).map_err(BankError::Invalid)?;
    Ok((ChapterCatalog::new(file.chapters), bank))
}

pub fn load_bank(path: &Path) -> Result<(ChapterCatalog, QuestionBank), BankError> {
    let raw = std::fs::read_to_string(path).map_err(BankError::Io)?;
    let loaded = parse_bank(&raw)?;
    tracing::info!(path = %path.display(), questions = loaded.1.len(), "question bank loaded");
    Ok(loaded)
}
