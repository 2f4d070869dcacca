//! "Find similar" scoring
//!
//! Two images are compared by the Jaccard similarity of their tag sets and of
//! the longer words of their descriptions:
//!
//! ```text
//! score = 0.9 * jaccard(tags) + 0.1 * jaccard(description words)
//! ```
//!
//! Candidates scoring at or below [`MIN_SIMILARITY`] are dropped.

use serde::Serialize;
use std::collections::HashSet;
use std::hash::Hash;

use crate::models::Image;

/// Weight of the tag-set similarity
pub const TAG_WEIGHT: f64 = 0.9;
/// Weight of the description word-set similarity
pub const DESCRIPTION_WEIGHT: f64 = 0.1;
/// Results must score strictly above this value
pub const MIN_SIMILARITY: f64 = 0.1;
/// Description words must be longer than this many characters
pub const MIN_WORD_CHARS: usize = 3;

/// Jaccard index |A ∩ B| / |A ∪ B|; two empty sets score 0
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / union as f64
}

/// Case-insensitive tag set
pub fn tag_set(tags: &[String]) -> HashSet<String> {
    tags.iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Lowercase alphanumeric words longer than [`MIN_WORD_CHARS`]
pub fn description_words(description: &str) -> HashSet<String> {
    description
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > MIN_WORD_CHARS)
        .map(|w| w.to_lowercase())
        .collect()
}

/// Precomputed comparison features of one image
#[derive(Debug, Clone, Default)]
pub struct Features {
    tags: HashSet<String>,
    words: HashSet<String>,
}

impl Features {
    pub fn new(tags: &[String], description: Option<&str>) -> Self {
        Self {
            tags: tag_set(tags),
            words: description.map(description_words).unwrap_or_default(),
        }
    }

    pub fn of(image: &Image) -> Self {
        Self::new(image.tags(), image.description())
    }

    /// Combined score in [0, 1]
    pub fn score(&self, other: &Features) -> f64 {
        TAG_WEIGHT * jaccard(&self.tags, &other.tags)
            + DESCRIPTION_WEIGHT * jaccard(&self.words, &other.words)
    }
}

/// Image paired with its similarity to the query image
#[derive(Debug, Clone, Serialize)]
pub struct ScoredImage {
    #[serde(flatten)]
    pub image: Image,
    pub similarity: f64,
}

/// Rank `candidates` by similarity to `target`.
///
/// The target itself is skipped, results at or below [`MIN_SIMILARITY`] are
/// dropped, and the rest are sorted by descending score. The sort is stable,
/// so equal scores keep the candidates' original order.
pub fn rank_similar(target: &Image, candidates: Vec<Image>) -> Vec<ScoredImage> {
    let target_features = Features::of(target);

    let mut scored: Vec<ScoredImage> = candidates
        .into_iter()
        .filter(|candidate| candidate.id != target.id)
        .filter_map(|candidate| {
            let similarity = target_features.score(&Features::of(&candidate));
            (similarity > MIN_SIMILARITY).then_some(ScoredImage {
                image: candidate,
                similarity,
            })
        })
        .collect();

    scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImageMetadata, ProcessingStatus};
    use chrono::Utc;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn image(id: i64, tags: &[&str], description: &str) -> Image {
        let now = Utc::now();
        Image {
            id,
            user_id: "user-1".to_string(),
            filename: format!("img-{}.jpg", id),
            original_path: format!("https://cdn.example/{}.jpg", id),
            thumbnail_path: None,
            uploaded_at: now,
            metadata: Some(ImageMetadata {
                id,
                image_id: id,
                user_id: "user-1".to_string(),
                description: Some(description.to_string()),
                tags: strings(tags),
                colors: vec![],
                ai_processing_status: ProcessingStatus::Completed,
                provider: Some("fallback".to_string()),
                analysis_started_at: Some(now),
                created_at: now,
                updated_at: now,
            }),
        }
    }

    #[test]
    fn test_jaccard_identical_non_empty_is_one() {
        let a = set(&["beach", "sunset"]);
        assert_eq!(jaccard(&a, &a), 1.0);
    }

    #[test]
    fn test_jaccard_both_empty_is_zero() {
        let empty: HashSet<String> = HashSet::new();
        assert_eq!(jaccard(&empty, &empty), 0.0);
    }

    #[test]
    fn test_jaccard_partial_overlap() {
        let a = set(&["beach", "sunset", "ocean"]);
        let b = set(&["beach", "ocean", "sand", "palm"]);
        // 2 shared out of 5 distinct
        assert!((jaccard(&a, &b) - 0.4).abs() < 1e-12);
        assert_eq!(jaccard(&a, &set(&["cat"])), 0.0);
    }

    #[test]
    fn test_tag_set_is_case_insensitive() {
        let tags = tag_set(&strings(&["Beach", " beach ", "OCEAN", ""]));
        assert_eq!(tags, set(&["beach", "ocean"]));
    }

    #[test]
    fn test_description_words_keep_only_long_words() {
        let words = description_words("A dog runs on the Beach, near blue waves.");
        assert_eq!(words, set(&["runs", "beach", "near", "blue", "waves"]));
    }

    #[test]
    fn test_score_weights_tags_and_description() {
        let a = Features::new(&strings(&["beach"]), Some("sunny beach"));
        let b = Features::new(&strings(&["beach"]), Some("stormy coast"));
        // tags identical, no shared long words
        assert!((a.score(&b) - 0.9).abs() < 1e-12);

        let c = Features::new(&strings(&["forest"]), Some("sunny beach"));
        // no shared tags, identical descriptions
        assert!((a.score(&c) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_score_stays_in_unit_interval() {
        let a = Features::new(&strings(&["a", "b"]), Some("alpha bravo"));
        assert!((a.score(&a) - 1.0).abs() < 1e-12);
        let empty = Features::default();
        assert_eq!(empty.score(&empty), 0.0);
        assert!(a.score(&empty) >= 0.0);
    }

    #[test]
    fn test_rank_similar_excludes_target_and_low_scores() {
        let target = image(1, &["beach", "ocean", "sunset"], "Sunset over the ocean");
        let candidates = vec![
            target.clone(),
            image(2, &["beach", "ocean"], "Waves on the beach"),
            image(3, &["cat"], "A sleepy cat"),
            // description-only match scores exactly 0.1 and is excluded
            image(4, &["forest"], "Sunset over the ocean"),
            image(5, &["beach", "ocean", "sunset"], "Sunset over the ocean"),
        ];

        let ranked = rank_similar(&target, candidates);
        let ids: Vec<i64> = ranked.iter().map(|s| s.image.id).collect();
        assert_eq!(ids, vec![5, 2]);
        assert!((ranked[0].similarity - 1.0).abs() < 1e-12);
        assert!(ranked.iter().all(|s| s.similarity > MIN_SIMILARITY));
    }

    #[test]
    fn test_rank_similar_keeps_order_for_ties() {
        let target = image(1, &["dog"], "");
        let candidates = vec![image(7, &["dog"], ""), image(3, &["dog"], "")];
        let ids: Vec<i64> = rank_similar(&target, candidates)
            .iter()
            .map(|s| s.image.id)
            .collect();
        assert_eq!(ids, vec![7, 3]);
    }

    #[test]
    fn test_scored_image_serializes_flat() {
        let scored = ScoredImage {
            image: image(2, &["beach"], "x"),
            similarity: 0.5,
        };
        let json = serde_json::to_value(&scored).unwrap();
        assert_eq!(json["id"], 2);
        assert_eq!(json["similarity"], 0.5);
        assert_eq!(json["metadata"]["tags"][0], "beach");
    }
}
