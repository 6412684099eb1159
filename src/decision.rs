//! decision.rs: verdict shape, focus modes and the pooled distraction messages.
//!
//! A `Verdict` is what the engine hands to the nudge state machine: a boolean,
//! a human-readable reason, the candidate's category and (for content-based
//! judgments) the similarity score.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::categories::Category;

/// Focus mode chosen when the session is activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Reading,
    Browsing,
    Entertainment,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Reading => "reading",
            Mode::Browsing => "browsing",
            Mode::Entertainment => "entertainment",
        }
    }

    /// Single-letter badge label.
    pub fn badge_label(&self) -> &'static str {
        match self {
            Mode::Reading => "R",
            Mode::Browsing => "B",
            Mode::Entertainment => "E",
        }
    }

    pub fn badge_color(&self) -> &'static str {
        match self {
            Mode::Reading => "#6C5CE7",
            Mode::Browsing => "#00B894",
            Mode::Entertainment => "#E17055",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reading" => Ok(Mode::Reading),
            "browsing" => Ok(Mode::Browsing),
            "entertainment" => Ok(Mode::Entertainment),
            other => anyhow::bail!("unknown focus mode: {other}"),
        }
    }
}

/// Which stage of the resolution pipeline produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    SameDomain,
    Internal,
    Category,
    FastPath,
    Oracle,
    Profile,
}

impl VerdictSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictSource::SameDomain => "same_domain",
            VerdictSource::Internal => "internal",
            VerdictSource::Category => "category",
            VerdictSource::FastPath => "fast_path",
            VerdictSource::Oracle => "oracle",
            VerdictSource::Profile => "profile",
        }
    }
}

/// Relevance verdict for one candidate navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub relevant: bool,
    pub reason: String,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub source: VerdictSource,
}

impl Verdict {
    pub fn allow(category: Category, reason: impl Into<String>, source: VerdictSource) -> Self {
        Self {
            relevant: true,
            reason: reason.into(),
            category,
            score: None,
            source,
        }
    }

    pub fn deny(category: Category, reason: impl Into<String>, source: VerdictSource) -> Self {
        Self {
            relevant: false,
            reason: reason.into(),
            category,
            score: None,
            source,
        }
    }

    /// Attach a similarity score (builder style).
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score.clamp(0.0, 1.0));
        self
    }
}

/// Fallback message for categories without a dedicated pool.
pub const GENERIC_DISTRACTION: &str = "This doesn't seem related to your current focus.";

/// Candidate reason strings for a reading-mode distraction in `category`.
pub fn distraction_pool(category: Category) -> &'static [&'static str] {
    match category {
        Category::Social => &[
            "Social media detected. Your reading is waiting for you!",
            "Looks like you've drifted to social media. Head back?",
            "Your article misses you. Social media can wait!",
        ],
        Category::Entertainment => &[
            "Entertainment break? Your reading focus is still active.",
            "This looks like entertainment, not quite what you were focused on.",
            "Tempting, but your focus session is running!",
        ],
        Category::Shopping => &[
            "Shopping can wait. You were in the zone!",
            "Retail therapy later? Your focus session is active.",
            "Your cart isn't going anywhere. Back to reading?",
        ],
        Category::Gaming => &[
            "Gaming break? Your focus session says otherwise!",
            "The games will be there later. Stay focused!",
        ],
        Category::News => &[
            "News can be a rabbit hole. Stay focused on your reading!",
            "Headlines are tempting, but your focus session is active.",
        ],
        Category::Finance => &[
            "Markets can wait. Your reading focus is active!",
            "Portfolio check later? Stay in the zone.",
        ],
        _ => &[GENERIC_DISTRACTION],
    }
}

/// Pick one message from the category pool using the caller's random source.
pub fn distraction_message<R: Rng>(category: Category, rng: &mut R) -> String {
    let pool = distraction_pool(category);
    pool[rng.random_range(0..pool.len())].to_string()
}
