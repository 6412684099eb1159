// src/similarity.rs
//! Cosine similarity over sparse keyword vectors.

use crate::profile::TopicProfile;

/// Cosine of the two keyword vectors in [0, 1]. Returns 0 when either side has
/// zero magnitude.
pub fn cosine_similarity(a: &TopicProfile, b: &TopicProfile) -> f64 {
    let mag_a: f64 = a.keywords.values().map(|w| w * w).sum();
    let mag_b: f64 = b.keywords.values().map(|w| w * w).sum();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    // Terms missing from either side contribute 0 to the dot product, so only
    // the intersection needs visiting. Iterate the smaller map.
    let (small, large) = if a.keywords.len() <= b.keywords.len() {
        (a, b)
    } else {
        (b, a)
    };
    let dot: f64 = small
        .keywords
        .iter()
        .filter_map(|(term, w)| large.keywords.get(term).map(|v| w * v))
        .sum();

    (dot / (mag_a.sqrt() * mag_b.sqrt())).clamp(0.0, 1.0)
}

/// Candidate's top terms that also appear in the anchor, in candidate order.
pub fn shared_terms(anchor: &TopicProfile, candidate: &TopicProfile) -> Vec<String> {
    candidate
        .top_terms
        .iter()
        .filter(|t| anchor.contains(t))
        .cloned()
        .collect()
}
