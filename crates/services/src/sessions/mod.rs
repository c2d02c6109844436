mod history;
mod lifecycle;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use history::SessionHistory;
pub use lifecycle::{
    ONGOING_SESSION_SLOT, SESSION_DURATION_BY_Q_SLOT, SESSION_DURATION_SLOT, SessionManager,
};
pub use workflow::StudyService;
