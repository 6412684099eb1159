// src/relevance.rs
//! Content relevance: compares a candidate page's topic profile against the
//! anchor profile and maps the cosine score onto three bands.

use tracing::debug;

use crate::config::RelevanceSection;
use crate::profile::{build_profile, PageSnapshot, TopicProfile};
use crate::similarity::{cosine_similarity, shared_terms};

/// How many terms are quoted in human-readable reasons.
const REASON_TERMS: usize = 4;

/// Short, stable, anonymized id for logging URLs without leaking them.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub(crate) fn truncate_vec<T: ToString>(v: &[T], max: usize) -> Vec<String> {
    v.iter().take(max).map(|x| x.to_string()).collect()
}

/// Score band of a similarity judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// score >= high threshold
    Clear,
    /// low <= score < high
    Loose,
    /// score < low
    Unrelated,
}

/// Outcome of comparing a candidate page with the anchor profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentJudgment {
    pub relevant: bool,
    pub score: f64,
    pub band: Band,
    pub reason: String,
    /// Candidate's top terms.
    pub top_terms: Vec<String>,
    /// Candidate top terms also present in the anchor.
    pub shared: Vec<String>,
}

/// Threshold set used to band similarity scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub high: f64,
    pub low: f64,
    pub min_distinct_terms: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&RelevanceSection::default())
    }
}

impl From<&RelevanceSection> for Thresholds {
    fn from(s: &RelevanceSection) -> Self {
        Self {
            high: s.high_threshold,
            low: s.low_threshold,
            min_distinct_terms: s.min_distinct_terms,
        }
    }
}

impl Thresholds {
    pub fn band(&self, score: f64) -> Band {
        if score >= self.high {
            Band::Clear
        } else if score >= self.low {
            Band::Loose
        } else {
            Band::Unrelated
        }
    }
}

/// Judge an already-built candidate profile against the anchor.
pub fn judge_profiles(
    anchor: &TopicProfile,
    candidate: &TopicProfile,
    thresholds: &Thresholds,
) -> ContentJudgment {
    let score = cosine_similarity(anchor, candidate);
    let shared = shared_terms(anchor, candidate);
    let band = thresholds.band(score);

    let (relevant, reason) = match band {
        Band::Clear => {
            let shared_str = if shared.is_empty() {
                String::new()
            } else {
                format!(" (shared topics: {})", truncate_vec(&shared, REASON_TERMS).join(", "))
            };
            (true, format!("Content is related to your focus topic{shared_str}."))
        }
        Band::Loose => (true, "Loosely related content, allowing.".to_string()),
        Band::Unrelated => {
            let anchor_topics = truncate_vec(&anchor.top_terms, REASON_TERMS).join(", ");
            let current_topics = truncate_vec(&candidate.top_terms, REASON_TERMS).join(", ");
            let reason = if candidate.total_distinct_terms < thresholds.min_distinct_terms {
                format!("This page doesn't seem related to your focus topic ({anchor_topics}).")
            } else {
                format!(
                    "This page is about \"{current_topics}\", not related to your focus on \"{anchor_topics}\"."
                )
            };
            (false, reason)
        }
    };

    debug!(
        target: "relevance",
        score,
        ?band,
        distinct = candidate.total_distinct_terms,
        shared = ?truncate_vec(&shared, REASON_TERMS),
        "content judgment"
    );

    ContentJudgment {
        relevant,
        score,
        band,
        reason,
        top_terms: candidate.top_terms.clone(),
        shared,
    }
}

/// Build the candidate profile from `page` and judge it against `anchor`.
pub fn analyze_relevance(
    anchor: &TopicProfile,
    page: &PageSnapshot,
    thresholds: &Thresholds,
) -> ContentJudgment {
    let candidate = build_profile(page);
    judge_profiles(anchor, &candidate, thresholds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ml_anchor() -> TopicProfile {
        build_profile(&PageSnapshot {
            title: "Machine learning research: neural network training".into(),
            description: "Research notes on machine learning models and gradient descent".into(),
            headings: vec!["Neural networks".into(), "Training dynamics".into()],
            body_text: "Machine learning research explores neural network training, gradient \
                        descent optimization, model generalization and learning rate schedules."
                .into(),
            url: "https://lab.example/research/machine-learning".into(),
        })
    }

    #[test]
    fn bands_follow_thresholds() {
        let t = Thresholds::default();
        assert_eq!(t.band(0.25), Band::Clear);
        assert_eq!(t.band(0.2499), Band::Loose);
        assert_eq!(t.band(0.10), Band::Loose);
        assert_eq!(t.band(0.0999), Band::Unrelated);
    }

    #[test]
    fn unrelated_shopping_page_is_rejected() {
        let page = PageSnapshot {
            title: "Buy running shoes online".into(),
            description: "Discount sneakers and trainers with free shipping".into(),
            headings: vec!["Best sellers".into(), "Men's running shoes".into()],
            body_text: "Shop lightweight running shoes, trail sneakers and cushioned trainers."
                .into(),
            url: "https://store.example/shoes/running".into(),
        };
        let j = analyze_relevance(&ml_anchor(), &page, &Thresholds::default());
        assert!(j.score < 0.10, "score {}", j.score);
        assert!(!j.relevant);
        assert_eq!(j.band, Band::Unrelated);
        assert!(j.reason.contains("not related to your focus on"));
    }

    #[test]
    fn restated_topic_is_accepted_with_shared_terms() {
        let page = PageSnapshot {
            title: "Neural network training in machine learning research".into(),
            description: "Gradient descent and learning rate schedules for neural models".into(),
            headings: vec!["Machine learning".into()],
            body_text: "Training neural network models with gradient descent.".into(),
            url: "https://blog.example/machine-learning/training".into(),
        };
        let j = analyze_relevance(&ml_anchor(), &page, &Thresholds::default());
        assert!(j.score > 0.25, "score {}", j.score);
        assert!(j.relevant);
        assert!(!j.shared.is_empty());
        assert!(j.reason.contains("shared topics"));
    }

    #[test]
    fn sparse_page_gets_low_confidence_message() {
        let page = PageSnapshot {
            title: "Pottery".into(),
            ..Default::default()
        };
        let j = analyze_relevance(&ml_anchor(), &page, &Thresholds::default());
        assert!(!j.relevant);
        assert!(j.reason.starts_with("This page doesn't seem related"));
    }

    #[test]
    fn loose_band_allows() {
        let t = Thresholds {
            high: 0.99,
            low: 0.01,
            min_distinct_terms: 5,
        };
        let page = PageSnapshot {
            title: "Gradient descent for beginners".into(),
            body_text: "Cooking pasta recipes tomatoes basil garlic olive".into(),
            ..Default::default()
        };
        let j = analyze_relevance(&ml_anchor(), &page, &t);
        assert_eq!(j.band, Band::Loose);
        assert!(j.relevant);
        assert_eq!(j.reason, "Loosely related content, allowing.");
    }

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash("https://example.com/a");
        assert_eq!(a.len(), 12);
        assert_eq!(a, anon_hash("https://example.com/a"));
        assert_ne!(a, anon_hash("https://example.com/b"));
    }
}
