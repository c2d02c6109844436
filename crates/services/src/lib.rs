#![forbid(unsafe_code)]

pub mod alert;
pub mod app_services;
pub mod attempts;
pub mod config;
pub mod error;
pub mod ids;
pub mod reactive;
pub mod sessions;

pub use annales_core::Clock;

pub use alert::{Alert, LogAlert};
pub use app_services::AppServices;
pub use attempts::{AttemptLog, make_attempt};
pub use config::AppConfig;
pub use error::{AppServicesError, SessionError, StateError};
pub use ids::IdGenerator;
pub use reactive::{LoadState, MirrorKey, MirroredMap, PersistedScalar};
pub use sessions::{SessionHistory, SessionManager, StudyService};
