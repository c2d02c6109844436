mod attempt;
mod chapter;
mod ids;
mod question;
mod session;
mod subject;

pub use ids::{
    ATTEMPT_ID_PREFIX, AttemptId, ChapterId, ParseIdError, Qid, SESSION_ID_PREFIX, SessionId,
    random_id,
};

pub use attempt::{Attempt, AttemptHistory, AttemptsByQid};
pub use chapter::{Chapter, ChapterCatalog};
pub use question::{
    CHOICE_COUNT, Question, QuestionBank, QuestionError, QuestionsByChapter, QuestionsBySubject,
};
pub use session::{OngoingSession, QuestionWip, Session, SessionKind, WipError};
pub use subject::Subject;
