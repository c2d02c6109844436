use thiserror::Error;

use crate::model::{ParseIdError, QuestionError, WipError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Wip(#[from] WipError),
}
