use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::ids::{ChapterId, ParseIdError};
use crate::model::subject::Subject;

/// Named sub-topic within a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub name: String,
    pub subject: Subject,
}

impl Chapter {
    #[must_use]
    pub fn new(id: ChapterId, name: impl Into<String>, subject: Subject) -> Self {
        Self {
            id,
            name: name.into(),
            subject,
        }
    }
}

/// Static reference list of chapters, never mutated at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterCatalog {
    by_id: BTreeMap<ChapterId, Chapter>,
}

impl ChapterCatalog {
    #[must_use]
    pub fn new(chapters: impl IntoIterator<Item = Chapter>) -> Self {
        Self {
            by_id: chapters.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, id: ChapterId) -> Option<&Chapter> {
        self.by_id.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: ChapterId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Chapters belonging to `subject`, ordered by id.
    pub fn for_subject(&self, subject: Subject) -> impl Iterator<Item = &Chapter> {
        self.by_id.values().filter(move |c| c.subject == subject)
    }

    /// Parses a chapter id and checks that the catalog knows it.
    ///
    /// # Errors
    ///
    /// Returns `ParseIdError` if the text is not numeric or the id is unknown.
    pub fn parse_chapter_id(&self, s: &str) -> Result<ChapterId, ParseIdError> {
        let id: ChapterId = s.parse()?;
        if self.contains(id) {
            Ok(id)
        } else {
            Err(ParseIdError::new("ChapterId", s))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ChapterCatalog {
        ChapterCatalog::new([
            Chapter::new(ChapterId::new(0), "Atmosphère", Subject::Meteorology),
            Chapter::new(ChapterId::new(1), "Nuages", Subject::Meteorology),
            Chapter::new(ChapterId::new(10), "Portance", Subject::Aerodynamics),
        ])
    }

    #[test]
    fn parse_accepts_known_chapter() {
        assert_eq!(catalog().parse_chapter_id("10").unwrap(), ChapterId::new(10));
    }

    #[test]
    fn parse_rejects_unknown_chapter() {
        assert!(catalog().parse_chapter_id("2").is_err());
        assert!(catalog().parse_chapter_id("x").is_err());
    }

    #[test]
    fn lists_chapters_per_subject() {
        let cat = catalog();
        let ids: Vec<_> = cat.for_subject(Subject::Meteorology).map(|c| c.id).collect();
        assert_eq!(ids, vec![ChapterId::new(0), ChapterId::new(1)]);
        assert_eq!(cat.for_subject(Subject::History).count(), 0);
    }
}
