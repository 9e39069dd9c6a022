use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One course entry from the catalog, as plain text.
///
/// Either fragment may be missing when the HTML block is malformed; the
/// batch driver decides what to do with those.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseBlock {
    pub id: String,
    pub position: usize,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl CourseBlock {
    pub fn new(
        position: usize,
        occurrence: usize,
        title: Option<String>,
        description: Option<String>,
    ) -> Self {
        let id = format!(
            "{}-{}",
            Self::fingerprint(title.as_deref(), description.as_deref()),
            occurrence
        );

        Self {
            id,
            position,
            title,
            description,
        }
    }

    /// Content hash shared by every block with the same text.
    pub fn fingerprint(title: Option<&str>, description: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(title.unwrap_or_default().as_bytes());
        hasher.update(b"\n");
        hasher.update(description.unwrap_or_default().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16]) // Use first 16 bytes (32 hex chars)
    }

    /// Both text fragments, or `None` if the block is malformed.
    pub fn fragments(&self) -> Option<(&str, &str)> {
        match (self.title.as_deref(), self.description.as_deref()) {
            (Some(title), Some(description)) => Some((title, description)),
            _ => None,
        }
    }

    /// Short label for log lines.
    pub fn label(&self) -> String {
        let title = self.title.as_deref().unwrap_or("<untitled>");
        title.chars().take(50).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_stable_for_same_content() {
        let a = CourseBlock::new(0, 0, Some("CS 101".into()), Some("Intro".into()));
        let b = CourseBlock::new(7, 0, Some("CS 101".into()), Some("Intro".into()));

        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 32 + 2);
    }

    #[test]
    fn test_occurrence_distinguishes_duplicates() {
        let a = CourseBlock::new(0, 0, Some("CS 101".into()), Some("Intro".into()));
        let b = CourseBlock::new(1, 1, Some("CS 101".into()), Some("Intro".into()));

        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_fragments_require_both_fields() {
        let block = CourseBlock::new(0, 0, Some("CS 101".into()), None);
        assert!(block.fragments().is_none());

        let block = CourseBlock::new(0, 0, Some("CS 101".into()), Some("Intro".into()));
        assert_eq!(block.fragments(), Some(("CS 101", "Intro")));
    }
}
