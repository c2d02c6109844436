use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const ID_LENGTH: usize = 8;

/// Prefix used for generated session identifiers.
pub const SESSION_ID_PREFIX: &str = "ses";
/// Prefix used for generated attempt identifiers.
pub const ATTEMPT_ID_PREFIX: &str = "att";

/// Builds a short opaque identifier of the form `<prefix>_<8 alphanumerics>`.
///
/// Not suitable for anything security related.
pub fn random_id<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> String {
    let mut id = String::with_capacity(prefix.len() + 1 + ID_LENGTH);
    id.push_str(prefix);
    id.push('_');
    for _ in 0..ID_LENGTH {
        let idx = rng.random_range(0..ID_ALPHABET.len());
        id.push(char::from(ID_ALPHABET[idx]));
    }
    id
}

fn is_generated_with_prefix(s: &str, prefix: &str) -> bool {
    s.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|body| !body.is_empty() && body.bytes().all(|b| b.is_ascii_alphanumeric()))
}

//
// ─── QUESTION ID ──────────────────────────────────────────────────────────────
//

/// Opaque identifier of a question in the bank.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Qid(String);

impl Qid {
    /// Wraps an already validated identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//
// ─── SESSION ID ───────────────────────────────────────────────────────────────
//

/// Identifier of an ongoing or finished session (`ses_XXXXXXXX`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh identifier with the `ses` prefix.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(random_id(SESSION_ID_PREFIX, rng))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//
// ─── ATTEMPT ID ───────────────────────────────────────────────────────────────
//

/// Identifier of a single recorded attempt (`att_XXXXXXXX`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(String);

impl AttemptId {
    /// Generates a fresh identifier with the `att` prefix.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(random_id(ATTEMPT_ID_PREFIX, rng))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//
// ─── CHAPTER ID ───────────────────────────────────────────────────────────────
//

/// Numeric identifier of a chapter.
///
/// Membership in the chapter catalog is checked by
/// [`ChapterCatalog::parse_chapter_id`](crate::model::ChapterCatalog::parse_chapter_id).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(u32);

impl ChapterId {
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }
}

// ─── Debug / Display ───────────────────────────────────────────────────────────

impl fmt::Debug for Qid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Qid({})", self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Debug for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttemptId({})", self.0)
    }
}

impl fmt::Debug for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChapterId({})", self.0)
    }
}

impl fmt::Display for Qid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── FromStr Implementations ───────────────────────────────────────────────────

/// Error type for parsing an identifier from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
    raw: String,
}

impl ParseIdError {
    pub(crate) fn new(kind: &'static str, raw: &str) -> Self {
        Self {
            kind,
            raw: raw.to_owned(),
        }
    }

    /// Name of the identifier type that failed to parse.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.raw)
    }
}

impl std::error::Error for ParseIdError {}

impl FromStr for Qid {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseIdError::new("Qid", s));
        }
        Ok(Qid::new(trimmed))
    }
}

impl FromStr for SessionId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_generated_with_prefix(s, SESSION_ID_PREFIX) {
            Ok(SessionId(s.to_owned()))
        } else {
            Err(ParseIdError::new("SessionId", s))
        }
    }
}

impl FromStr for AttemptId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_generated_with_prefix(s, ATTEMPT_ID_PREFIX) {
            Ok(AttemptId(s.to_owned()))
        } else {
            Err(ParseIdError::new("AttemptId", s))
        }
    }
}

impl FromStr for ChapterId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(ChapterId::new)
            .map_err(|_| ParseIdError::new("ChapterId", s))
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────
