//! Memory re-ranking: tag boost and time decay as two orthogonal factors.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::model::Memory;
use crate::store::{cosine_similarity, MemoryMatch};

/// Additive bonus for memories matched by at least one generated tag.
pub const TAG_BOOST: f32 = 0.5;
/// Half-life of the exponential age decay, in days.
pub const HALF_LIFE_DAYS: f64 = 42.0;
/// Floor for semantic candidates.
pub const SEMANTIC_MIN_SIMILARITY: f32 = 0.35;

/// `2^(-age_days / 42)`: 1.0 at age 0, 0.5 at one half-life.
pub fn time_decay(age_days: f64) -> f64 {
    (2f64).powf(-age_days / HALF_LIFE_DAYS)
}

/// One ranked recall result.
#[derive(Clone, Debug)]
pub struct RecalledMemory {
    pub memory: Memory,
    pub score: f32,
    pub matched_tag: bool,
}

/// Merges semantic and tag search results into the final ranking.
///
/// Semantic hits matched by tag get the boost added; tag-only hits score
/// cosine-against-query plus the boost. Time decay multiplies every score.
pub fn merge_and_rank(
    semantic: Vec<MemoryMatch>,
    tag_matches: Vec<Memory>,
    query: &[f32],
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<RecalledMemory> {
    let mut ranked: HashMap<String, RecalledMemory> = HashMap::new();

    for hit in semantic {
        ranked.insert(
            hit.memory.id.clone(),
            RecalledMemory {
                memory: hit.memory,
                score: hit.score,
                matched_tag: false,
            },
        );
    }

    for memory in tag_matches {
        match ranked.get_mut(&memory.id) {
            Some(existing) => {
                existing.score += TAG_BOOST;
                existing.matched_tag = true;
            }
            None => {
                let score = cosine_similarity(query, &memory.embedding) + TAG_BOOST;
                ranked.insert(
                    memory.id.clone(),
                    RecalledMemory {
                        memory,
                        score,
                        matched_tag: true,
                    },
                );
            }
        }
    }

    let mut results: Vec<RecalledMemory> = ranked
        .into_values()
        .map(|mut r| {
            let decay = time_decay(r.memory.age_days(now)) as f32;
            r.score *= decay;
            r
        })
        .collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn memory_with(id: &str, embedding: Vec<f32>, age_days: i64) -> Memory {
        let mut m = Memory::new(id, "c", vec![]);
        m.id = id.to_string();
        m.embedding = embedding;
        m.created_at = Utc::now() - Duration::days(age_days);
        m
    }

    /// **Scenario**: Decay factors at 0, 42, and 84 days.
    #[test]
    fn decay_boundaries() {
        assert!((time_decay(0.0) - 1.0).abs() < 1e-12);
        assert!((time_decay(42.0) - 0.5).abs() < 1e-12);
        assert!((time_decay(84.0) - 0.25).abs() < 1e-12);
    }

    /// **Scenario**: A tag match lifts a semantic hit above a slightly
    /// stronger untagged one.
    #[test]
    fn tag_boost_reorders() {
        let now = Utc::now();
        let tagged = memory_with("tagged", vec![1.0, 0.0], 0);
        let untagged = memory_with("untagged", vec![1.0, 0.0], 0);
        let semantic = vec![
            MemoryMatch {
                memory: untagged,
                score: 0.9,
            },
            MemoryMatch {
                memory: tagged.clone(),
                score: 0.8,
            },
        ];
        let ranked = merge_and_rank(semantic, vec![tagged], &[1.0, 0.0], now, 10);
        assert_eq!(ranked[0].memory.id, "tagged");
        assert!(ranked[0].matched_tag);
        assert!((ranked[0].score - 1.3).abs() < 1e-6);
    }

    /// **Scenario**: A tag-only memory enters with cosine + boost.
    #[test]
    fn tag_only_scored_by_cosine_plus_boost() {
        let now = Utc::now();
        let tag_only = memory_with("tag-only", vec![1.0, 0.0], 0);
        let ranked = merge_and_rank(vec![], vec![tag_only], &[1.0, 0.0], now, 10);
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].score - 1.5).abs() < 1e-6);
    }

    /// **Scenario**: An old memory is halved at one half-life.
    #[test]
    fn decay_applies_to_final_score() {
        let now = Utc::now();
        let old = memory_with("old", vec![1.0, 0.0], 42);
        let semantic = vec![MemoryMatch {
            memory: old,
            score: 1.0,
        }];
        let ranked = merge_and_rank(semantic, vec![], &[1.0, 0.0], now, 10);
        assert!((ranked[0].score - 0.5).abs() < 1e-3);
    }

    /// **Scenario**: Limit truncates after sorting.
    #[test]
    fn limit_truncates() {
        let now = Utc::now();
        let semantic = (0..5)
            .map(|i| MemoryMatch {
                memory: memory_with(&format!("m{}", i), vec![1.0], 0),
                score: i as f32 / 10.0,
            })
            .collect();
        let ranked = merge_and_rank(semantic, vec![], &[1.0], now, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].memory.id, "m4");
    }
}
