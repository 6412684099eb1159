// src/config/mod.rs
//! Runtime configuration: thresholds and timings from `config/focus.toml`
//! (with env overrides), oracle credentials from `config/oracle.json`.

pub mod oracle;

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_FOCUS_CONFIG_PATH: &str = "config/focus.toml";
pub const ENV_FOCUS_CONFIG_PATH: &str = "FOCUS_CONFIG_PATH";
pub const ENV_HIGH_THRESHOLD: &str = "FOCUS_HIGH_THRESHOLD";
pub const ENV_LOW_THRESHOLD: &str = "FOCUS_LOW_THRESHOLD";

fn default_high() -> f64 {
    0.25
}
fn default_low() -> f64 {
    0.10
}
fn default_min_distinct_terms() -> usize {
    5
}
fn default_escalation_secs() -> u64 {
    5
}
fn default_debounce_secs() -> u64 {
    5
}
fn default_grace_secs() -> u64 {
    30
}
fn default_min_confidence() -> f64 {
    0.5
}

/// Profile-similarity thresholds for reading mode.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelevanceSection {
    /// score >= high → clearly relevant
    #[serde(default = "default_high")]
    pub high_threshold: f64,
    /// low <= score < high → loosely relevant (still allowed)
    #[serde(default = "default_low")]
    pub low_threshold: f64,
    /// Candidate pages with fewer distinct terms get the low-confidence message.
    #[serde(default = "default_min_distinct_terms")]
    pub min_distinct_terms: usize,
}

impl Default for RelevanceSection {
    fn default() -> Self {
        Self {
            high_threshold: default_high(),
            low_threshold: default_low(),
            min_distinct_terms: default_min_distinct_terms(),
        }
    }
}

/// Nudge protocol timings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NudgeSection {
    #[serde(default = "default_escalation_secs")]
    pub escalation_secs: u64,
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    /// Grace duration used until the user saves a setting.
    #[serde(default = "default_grace_secs")]
    pub default_grace_secs: u64,
}

impl Default for NudgeSection {
    fn default() -> Self {
        Self {
            escalation_secs: default_escalation_secs(),
            debounce_secs: default_debounce_secs(),
            default_grace_secs: default_grace_secs(),
        }
    }
}

impl NudgeSection {
    pub fn escalation_delay(&self) -> Duration {
        Duration::from_secs(self.escalation_secs)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OracleSection {
    /// Oracle verdicts below this confidence are treated as abstentions.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FocusConfig {
    #[serde(default)]
    pub relevance: RelevanceSection,
    #[serde(default)]
    pub nudge: NudgeSection,
    #[serde(default)]
    pub oracle: OracleSection,
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_threshold_env(raw: Option<String>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

impl FocusConfig {
    /// Parse from a TOML string and sanitize.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: FocusConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read focus config at {}: {}", path.display(), e)
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from `$FOCUS_CONFIG_PATH` or the default path, then apply env overrides.
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_FOCUS_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_FOCUS_CONFIG_PATH));

        let mut cfg = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            tracing::info!(target: "config", path = %path.display(), "focus config not found, using defaults");
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(t) = parse_threshold_env(std::env::var(ENV_HIGH_THRESHOLD).ok()) {
            self.relevance.high_threshold = t;
        }
        if let Some(t) = parse_threshold_env(std::env::var(ENV_LOW_THRESHOLD).ok()) {
            self.relevance.low_threshold = t;
        }
        self.sanitize();
    }

    fn sanitize(&mut self) {
        let r = &mut self.relevance;
        if !r.high_threshold.is_finite() {
            r.high_threshold = default_high();
        }
        if !r.low_threshold.is_finite() {
            r.low_threshold = default_low();
        }
        r.high_threshold = r.high_threshold.clamp(0.0, 1.0);
        r.low_threshold = r.low_threshold.clamp(0.0, 1.0);
        if r.low_threshold > r.high_threshold {
            // swap to keep a valid interval
            std::mem::swap(&mut r.low_threshold, &mut r.high_threshold);
        }
        if !(0.0..=1.0).contains(&self.oracle.min_confidence) {
            self.oracle.min_confidence = default_min_confidence();
        }
        if self.nudge.default_grace_secs == 0 {
            self.nudge.default_grace_secs = default_grace_secs();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = FocusConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, FocusConfig::default());
        assert_eq!(cfg.relevance.high_threshold, 0.25);
        assert_eq!(cfg.nudge.escalation_delay(), Duration::from_secs(5));
    }

    #[test]
    fn partial_sections_and_swap() {
        let cfg = FocusConfig::from_toml_str(
            r#"
[relevance]
high_threshold = 0.05
low_threshold = 0.4

[nudge]
default_grace_secs = 45
"#,
        )
        .unwrap();
        assert_eq!(cfg.relevance.low_threshold, 0.05);
        assert_eq!(cfg.relevance.high_threshold, 0.4);
        assert_eq!(cfg.nudge.default_grace_secs, 45);
        assert_eq!(cfg.nudge.debounce_secs, 5);
    }

    #[test]
    fn malformed_toml_is_error() {
        assert!(FocusConfig::from_toml_str("[relevance\nhigh = ").is_err());
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_are_clamped() {
        env::set_var(ENV_HIGH_THRESHOLD, "7.5");
        env::set_var(ENV_LOW_THRESHOLD, "abc");
        let mut cfg = FocusConfig::default();
        cfg.apply_env_overrides();
        env::remove_var(ENV_HIGH_THRESHOLD);
        env::remove_var(ENV_LOW_THRESHOLD);
        assert_eq!(cfg.relevance.high_threshold, 1.0);
        assert_eq!(cfg.relevance.low_threshold, 0.10);
    }
}
