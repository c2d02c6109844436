#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod selection;
pub mod time;

pub use error::Error;
pub use selection::{ChaptersState, QuestionFilter, Selection, select_questions};
pub use time::Clock;
