//! Memory rows: long-term memories with tags and an embedding vector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One long-term memory.
///
/// Tags are case-insensitive and deduplicated on construction. All persisted
/// embeddings share one dimensionality; an empty vector means "not embedded
/// yet" and excludes the row from similarity search.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub embedding: Vec<f32>,
}

impl Memory {
    pub fn new(title: impl Into<String>, content: impl Into<String>, tags: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            tags: normalize_tags(tags),
            created_at: now,
            updated_at: now,
            embedding: Vec::new(),
        }
    }

    /// Age of this memory in fractional days relative to `now`.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        let age = now.signed_duration_since(self.created_at);
        age.num_milliseconds() as f64 / 86_400_000.0
    }
}

/// Lowercases and deduplicates tags, preserving first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let t = tag.trim().to_lowercase();
        if t.is_empty() {
            continue;
        }
        if seen.insert(t.clone()) {
            out.push(t);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Tags are lowercased and deduplicated, order preserved.
    #[test]
    fn tags_normalized() {
        let m = Memory::new(
            "t",
            "c",
            vec!["Rust".into(), "rust".into(), " DB ".into(), "".into()],
        );
        assert_eq!(m.tags, vec!["rust", "db"]);
    }

    /// **Scenario**: age_days is zero for a just-created memory.
    #[test]
    fn age_zero_when_fresh() {
        let m = Memory::new("t", "c", vec![]);
        assert!(m.age_days(m.created_at).abs() < 1e-9);
    }
}
