// src/tokenizer.rs
//! Word tokenizer used by the topic profiler.
//!
//! Lowercases, strips everything except `[a-z0-9]`, whitespace and hyphens,
//! then drops short tokens, pure numbers and stop words (English function
//! words plus common web boilerplate).

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Tokens shorter than this are discarded.
pub const MIN_TOKEN_LEN: usize = 3;

static RE_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s\-]").expect("strip regex"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any",
        "are", "aren", "arent", "as", "at", "be", "because", "been", "before", "being",
        "below", "between", "both", "but", "by", "can", "cant", "could", "couldnt", "d",
        "did", "didn", "didnt", "do", "does", "doesn", "doesnt", "doing", "don", "dont",
        "down", "during", "each", "few", "for", "from", "further", "get", "got", "had",
        "hadn", "has", "hasn", "hasnt", "have", "haven", "having", "he", "her", "here",
        "hers", "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is",
        "isn", "isnt", "it", "its", "itself", "just", "let", "ll", "m", "me", "might",
        "mightn", "more", "most", "mustn", "my", "myself", "need", "no", "nor", "not", "now",
        "o", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves",
        "out", "over", "own", "page", "re", "s", "same", "shan", "she", "should", "shouldn",
        "so", "some", "such", "t", "than", "that", "the", "their", "theirs", "them",
        "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
        "too", "under", "until", "up", "us", "ve", "very", "was", "wasn", "wasnt", "we",
        "were", "weren", "werent", "what", "when", "where", "which", "while", "who", "whom",
        "why", "will", "with", "won", "wont", "would", "wouldn", "wouldnt", "you", "your",
        "yours", "yourself", "yourselves",
        // web boilerplate
        "click", "cookie", "cookies", "accept", "privacy", "policy", "terms", "subscribe",
        "sign", "login", "logout", "menu", "navigation", "search", "share", "comment",
        "comments", "reply", "read", "continue", "loading", "advertisement", "sponsored",
        "follow", "like", "home", "contact", "copyright", "rights", "reserved", "skip",
        "content", "main", "footer", "header", "sidebar", "widget", "close", "open", "toggle",
        "show", "hide", "undefined", "null", "true", "false", "www", "http", "https", "com",
        "org", "net", "html", "css", "js",
    ]
    .into_iter()
    .collect()
});

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word)
}

/// Split `text` into filtered lowercase tokens. Empty input yields an empty vec.
pub fn tokenize(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let lowered = text.to_lowercase();
    let cleaned = RE_STRIP.replace_all(&lowered, " ");

    cleaned
        .split_whitespace()
        .map(|w| w.trim_matches('-'))
        .filter(|w| {
            w.len() >= MIN_TOKEN_LEN
                && !w.bytes().all(|b| b.is_ascii_digit())
                && !is_stop_word(w)
        })
        .map(str::to_string)
        .collect()
}

/// Convenience for optional fields coming from the host.
pub fn tokenize_opt(text: Option<&str>) -> Vec<String> {
    text.map(tokenize).unwrap_or_default()
}
