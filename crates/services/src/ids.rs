use std::sync::{Mutex, PoisonError};

use rand::SeedableRng;
use rand::rngs::StdRng;

use annales_core::model::{AttemptId, SessionId};

/// Source of session and attempt identifiers.
///
/// Seed it in tests to get reproducible ids.
#[derive(Debug)]
pub struct IdGenerator {
    rng: Mutex<StdRng>,
}

impl IdGenerator {
    #[must_use]
    pub fn from_os_rng() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn session_id(&self) -> SessionId {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        SessionId::generate(&mut *rng)
    }

    pub fn attempt_id(&self) -> AttemptId {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        AttemptId::generate(&mut *rng)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::from_os_rng()
    }
}
