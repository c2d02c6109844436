use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::ids::ParseIdError;

/// Top-level knowledge domain of the exam.
///
/// Persisted and parsed as its numeric code (`0..=4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Subject {
    /// Meteorology and aerology.
    Meteorology,
    /// Aerodynamics, aerostatics and principles of flight.
    Aerodynamics,
    /// Aircraft and spacecraft.
    Aircraft,
    /// Navigation, regulation and flight safety.
    Navigation,
    /// History and culture of aviation and space flight.
    History,
}

impl Subject {
    pub const ALL: [Subject; 5] = [
        Subject::Meteorology,
        Subject::Aerodynamics,
        Subject::Aircraft,
        Subject::Navigation,
        Subject::History,
    ];

    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Subject::Meteorology => 0,
            Subject::Aerodynamics => 1,
            Subject::Aircraft => 2,
            Subject::Navigation => 3,
            Subject::History => 4,
        }
    }

    /// Converts a numeric code to a `Subject`.
    ///
    /// # Errors
    ///
    /// Returns `ParseIdError` if the code is outside `0..=4`.
    pub fn from_code(code: u8) -> Result<Self, ParseIdError> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or_else(|| ParseIdError::new("Subject", &code.to_string()))
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Subject::Meteorology => "Météorologie et aérologie",
            Subject::Aerodynamics => "Aérodynamique, aérostatique et principes du vol",
            Subject::Aircraft => "Étude des aéronefs et des engins spatiaux",
            Subject::Navigation => "Navigation, réglementation et sécurité des vols",
            Subject::History => "Histoire et culture de l'aéronautique et du spatial",
        }
    }
}

impl From<Subject> for u8 {
    fn from(subject: Subject) -> Self {
        subject.code()
    }
}

impl TryFrom<u8> for Subject {
    type Error = ParseIdError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Subject::from_code(code)
    }
}

impl FromStr for Subject {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .map_err(|_| ParseIdError::new("Subject", s))
            .and_then(Subject::from_code)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
