// src/profile.rs
//! Topic profiles: weighted, normalized keyword vectors built from a page snapshot.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::tokenizer::tokenize;

pub const TITLE_WEIGHT: f64 = 5.0;
pub const DESCRIPTION_WEIGHT: f64 = 3.0;
pub const HEADINGS_WEIGHT: f64 = 3.0;
pub const BODY_WEIGHT: f64 = 1.0;
pub const URL_PATH_WEIGHT: f64 = 2.0;

/// Max number of keywords retained per profile.
pub const MAX_KEYWORDS: usize = 80;
/// Length of `top_terms`.
pub const TOP_TERMS: usize = 10;
/// Body text cap applied by [`PageSnapshot::normalized`].
pub const MAX_BODY_CHARS: usize = 20_000;

/// Page content captured by the host at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageSnapshot {
    pub title: String,
    pub description: String,
    pub headings: Vec<String>,
    pub body_text: String,
    pub url: String,
}

impl PageSnapshot {
    /// Placeholder snapshot carrying only a URL (used when extraction fails).
    pub fn url_only(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Decode entities, strip tags, collapse whitespace, cap body length.
    pub fn normalized(&self) -> Self {
        Self {
            title: normalize_field(&self.title, None),
            description: normalize_field(&self.description, None),
            headings: self
                .headings
                .iter()
                .map(|h| normalize_field(h, None))
                .filter(|h| !h.is_empty())
                .collect(),
            body_text: normalize_field(&self.body_text, Some(MAX_BODY_CHARS)),
            url: self.url.trim().to_string(),
        }
    }

    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }
}

fn normalize_field(s: &str, cap: Option<usize>) -> String {
    static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

    let decoded = html_escape::decode_html_entities(s);
    let no_tags = RE_TAGS.replace_all(&decoded, " ");
    let collapsed = RE_WS.replace_all(&no_tags, " ");
    let out = collapsed.trim();
    match cap {
        Some(max) if out.chars().count() > max => out.chars().take(max).collect(),
        _ => out.to_string(),
    }
}

/// Weighted keyword signature of a page. Immutable after construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProfile {
    /// term → weight in (0, 1]; the heaviest term is exactly 1.0.
    pub keywords: HashMap<String, f64>,
    /// Up to [`TOP_TERMS`] terms by descending weight.
    pub top_terms: Vec<String>,
    /// Distinct merged tokens before truncation.
    pub total_distinct_terms: usize,
}

impl TopicProfile {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn weight(&self, term: &str) -> f64 {
        self.keywords.get(term).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.keywords.contains_key(term)
    }
}

/// Accumulate `weight` for every token of `text` into `acc`.
fn accumulate(acc: &mut HashMap<String, f64>, text: &str, weight: f64) {
    for token in tokenize(text) {
        *acc.entry(token).or_insert(0.0) += weight;
    }
}

/// URL path with separators replaced by spaces; malformed URLs yield "".
pub fn url_path_text(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) => u
            .path()
            .chars()
            .map(|c| if matches!(c, '/' | '-' | '_' | '.') { ' ' } else { c })
            .collect(),
        Err(_) => String::new(),
    }
}

/// Build a topic profile from the five weighted sources of a snapshot.
pub fn build_profile(page: &PageSnapshot) -> TopicProfile {
    let mut merged: HashMap<String, f64> = HashMap::new();
    accumulate(&mut merged, &page.title, TITLE_WEIGHT);
    accumulate(&mut merged, &page.description, DESCRIPTION_WEIGHT);
    accumulate(&mut merged, &page.headings.join(" "), HEADINGS_WEIGHT);
    accumulate(&mut merged, &page.body_text, BODY_WEIGHT);
    accumulate(&mut merged, &url_path_text(&page.url), URL_PATH_WEIGHT);

    let total_distinct_terms = merged.len();

    let mut sorted: Vec<(String, f64)> = merged.into_iter().collect();
    // Descending weight; ties broken alphabetically so profiles are deterministic.
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(MAX_KEYWORDS);

    let max = sorted.first().map(|(_, w)| *w).unwrap_or(1.0);
    let top_terms = sorted.iter().take(TOP_TERMS).map(|(t, _)| t.clone()).collect();
    let keywords = sorted.into_iter().map(|(t, w)| (t, w / max)).collect();

    TopicProfile {
        keywords,
        top_terms,
        total_distinct_terms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(title: &str, body: &str, url: &str) -> PageSnapshot {
        PageSnapshot {
            title: title.into(),
            body_text: body.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    #[test]
    fn title_outweighs_body() {
        let p = build_profile(&page(
            "Transformer architectures",
            "gardening gardening gardening",
            "",
        ));
        // title: 5 per token; body: 3 x 1
        assert_eq!(p.top_terms[0], "architectures");
        assert!((p.weight("transformer") - 1.0).abs() < 1e-12);
        assert!((p.weight("gardening") - 0.6).abs() < 1e-12);
    }

    #[test]
    fn top_weight_is_normalized_to_one() {
        let p = build_profile(&page("rust ownership", "borrow checker lifetimes", ""));
        let max = p.keywords.values().cloned().fold(0.0, f64::max);
        assert_eq!(max, 1.0);
        assert!(p.keywords.values().all(|w| *w > 0.0 && *w <= 1.0));
    }

    #[test]
    fn identical_fields_pick_most_frequent_token() {
        let text = "kernel kernel kernel scheduler scheduler memory";
        let snap = PageSnapshot {
            title: text.into(),
            description: text.into(),
            headings: vec![text.into()],
            body_text: text.into(),
            url: String::new(),
        };
        let p = build_profile(&snap);
        assert_eq!(p.top_terms[0], "kernel");
        assert_eq!(p.total_distinct_terms, 3);
    }

    #[test]
    fn url_path_segments_contribute() {
        let p = build_profile(&page("", "", "https://example.com/deep-learning/intro_notes.html"));
        for t in ["deep", "learning", "intro", "notes"] {
            assert!(p.contains(t), "missing {t}");
        }
        assert!(!p.contains("html"), "stop word from extension");
    }

    #[test]
    fn malformed_url_is_tolerated() {
        let p = build_profile(&page("compilers", "", "not a url at all"));
        assert_eq!(p.top_terms, vec!["compilers"]);
        assert_eq!(url_path_text("::::"), "");
    }

    #[test]
    fn truncates_to_max_keywords_but_counts_all() {
        let body: Vec<String> = (0..150).map(|i| format!("term{i:03}x")).collect();
        let p = build_profile(&page("", &body.join(" "), ""));
        assert_eq!(p.keywords.len(), MAX_KEYWORDS);
        assert_eq!(p.top_terms.len(), TOP_TERMS);
        assert_eq!(p.total_distinct_terms, 150);
    }

    #[test]
    fn empty_snapshot_gives_empty_profile() {
        let p = build_profile(&PageSnapshot::default());
        assert!(p.is_empty());
        assert!(p.top_terms.is_empty());
        assert_eq!(p.total_distinct_terms, 0);
    }

    #[test]
    fn normalized_decodes_entities_and_tags() {
        let snap = PageSnapshot {
            title: "  Rust &amp; <b>Tokio</b>\n guide ".into(),
            headings: vec!["".into(), " Intro ".into()],
            ..Default::default()
        };
        let n = snap.normalized();
        assert_eq!(n.title, "Rust & Tokio guide");
        assert_eq!(n.headings, vec!["Intro".to_string()]);
    }

    #[test]
    fn snapshot_deserializes_with_missing_fields() {
        let s: PageSnapshot = serde_json::from_str(r#"{"title":"x","bodyText":"y"}"#).unwrap();
        assert_eq!(s.title, "x");
        assert_eq!(s.body_text, "y");
        assert!(s.headings.is_empty());
    }
}
