// src/session.rs
//! Focus session entity, user settings and the end-of-session summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::categories::extract_domain;
use crate::decision::Mode;
use crate::nudge::NudgeStage;
use crate::oracle::AnchorSummary;
use crate::profile::TopicProfile;

/// Host tab identifier.
pub type TabId = i64;

pub const DEFAULT_GRACE_SECS: u64 = 30;

/// One recorded distraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistractionEntry {
    pub url: String,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Browser-wide focus session. Singleton, owned by the controller.
///
/// `mode` is `Some` iff `active`; `anchor_profile` is only set in reading mode
/// after a successful extraction of the anchor page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FocusSession {
    pub active: bool,
    pub mode: Option<Mode>,
    pub anchor_url: String,
    pub anchor_tab_id: Option<TabId>,
    pub anchor_profile: Option<TopicProfile>,
    #[serde(rename = "anchorSemanticSummary")]
    pub anchor_summary: Option<AnchorSummary>,
    pub start_time: Option<DateTime<Utc>>,
    pub distraction_count: u32,
    pub allowlist: Vec<String>,
    #[serde(alias = "graceDuration")]
    pub grace_duration_secs: u64,
    pub total_focused_time_ms: i64,
    pub distraction_history: Vec<DistractionEntry>,
}

impl Default for FocusSession {
    fn default() -> Self {
        Self {
            active: false,
            mode: None,
            anchor_url: String::new(),
            anchor_tab_id: None,
            anchor_profile: None,
            anchor_summary: None,
            start_time: None,
            distraction_count: 0,
            allowlist: Vec::new(),
            grace_duration_secs: DEFAULT_GRACE_SECS,
            total_focused_time_ms: 0,
            distraction_history: Vec::new(),
        }
    }
}

impl FocusSession {
    /// Inactive session carrying `settings`.
    pub fn with_settings(settings: &Settings) -> Self {
        let mut s = Self::default();
        s.apply_settings(settings);
        s
    }

    /// Start a fresh session; settings carry over, everything else resets.
    pub fn activate(&mut self, mode: Mode, tab_id: TabId, url: &str, now: DateTime<Utc>) {
        let allowlist = std::mem::take(&mut self.allowlist);
        let grace = self.grace_duration_secs;
        *self = Self {
            active: true,
            mode: Some(mode),
            anchor_url: url.to_string(),
            anchor_tab_id: Some(tab_id),
            start_time: Some(now),
            allowlist,
            grace_duration_secs: grace,
            ..Self::default()
        };
    }

    /// End the session. History and counters stay readable until the next activation.
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.total_focused_time_ms = self.elapsed_ms(now);
        self.active = false;
        self.mode = None;
        self.anchor_url.clear();
        self.anchor_tab_id = None;
        self.anchor_profile = None;
        self.anchor_summary = None;
        self.start_time = None;
    }

    /// Live elapsed time while active, final focused time otherwise.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        match (self.active, self.start_time) {
            (true, Some(start)) => (now - start).num_milliseconds().max(0),
            _ => self.total_focused_time_ms,
        }
    }

    pub fn anchor_domain(&self) -> String {
        extract_domain(&self.anchor_url)
    }

    pub fn record_distraction(&mut self, url: &str, domain: &str, reason: &str, now: DateTime<Utc>) {
        self.distraction_count += 1;
        self.distraction_history.push(DistractionEntry {
            url: url.to_string(),
            domain: domain.to_string(),
            timestamp: now,
            reason: reason.to_string(),
        });
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        self.allowlist = settings.allowlist.clone();
        self.grace_duration_secs = settings.grace_duration_secs;
    }

    pub fn settings(&self) -> Settings {
        Settings {
            allowlist: self.allowlist.clone(),
            grace_duration_secs: self.grace_duration_secs,
        }
    }
}

/// User-editable settings, persisted separately from the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub allowlist: Vec<String>,
    #[serde(alias = "graceDuration")]
    pub grace_duration_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            grace_duration_secs: DEFAULT_GRACE_SECS,
        }
    }
}

/// Partial settings update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(default)]
    pub allowlist: Option<Vec<String>>,
    #[serde(default, alias = "graceDuration")]
    pub grace_duration_secs: Option<u64>,
}

impl Settings {
    pub fn merge(&mut self, update: &SettingsUpdate) {
        if let Some(list) = &update.allowlist {
            self.allowlist = list
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }
        if let Some(g) = update.grace_duration_secs {
            if g > 0 {
                self.grace_duration_secs = g;
            }
        }
    }
}

/// Payload of the session-ended notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub message: String,
    pub duration_minutes: i64,
    pub duration_text: String,
    pub distraction_count: u32,
    pub mode: Option<Mode>,
    pub history: Vec<DistractionEntry>,
    pub encouragement: String,
}

impl SessionSummary {
    pub fn from_session(session: &FocusSession, now: DateTime<Utc>) -> Self {
        let minutes = session.elapsed_ms(now) / 60_000;
        Self {
            message: "Focus session ended.".to_string(),
            duration_minutes: minutes,
            duration_text: format_duration(minutes),
            distraction_count: session.distraction_count,
            mode: session.mode,
            history: session.distraction_history.clone(),
            encouragement: encouragement(minutes, session.distraction_count).to_string(),
        }
    }
}

pub fn encouragement(minutes: i64, distractions: u32) -> &'static str {
    if minutes >= 60 && distractions <= 2 {
        "Amazing focus session! You were in the zone."
    } else if minutes >= 30 {
        "Great work! Solid focus time."
    } else if minutes >= 10 {
        "Good start! Try for longer next time."
    } else if distractions > 5 {
        "Staying focused is a skill, keep practicing!"
    } else {
        "Every bit of focus counts. Keep going!"
    }
}

pub fn format_duration(minutes: i64) -> String {
    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else if minutes == 1 {
        "1 minute".to_string()
    } else {
        format!("{minutes} minutes")
    }
}

/// Read-only snapshot returned by the state query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateView {
    #[serde(flatten)]
    pub session: FocusSession,
    pub elapsed_ms: i64,
    pub top_terms: Vec<String>,
    pub anchor_topic: String,
    pub nudge_stage: NudgeStage,
    pub oracle_configured: bool,
}

impl StateView {
    pub fn new(
        session: &FocusSession,
        stage: NudgeStage,
        oracle_configured: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            elapsed_ms: session.elapsed_ms(now),
            top_terms: session
                .anchor_profile
                .as_ref()
                .map(|p| p.top_terms.clone())
                .unwrap_or_default(),
            anchor_topic: session
                .anchor_summary
                .as_ref()
                .map(|s| s.topic.clone())
                .unwrap_or_default(),
            nudge_stage: stage,
            oracle_configured,
            session: session.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn activation_resets_but_keeps_settings() {
        let mut s = FocusSession::with_settings(&Settings {
            allowlist: vec!["docs.rs".into()],
            grace_duration_secs: 45,
        });
        let t0 = Utc::now();
        s.activate(Mode::Reading, 1, "https://a.example/", t0);
        s.record_distraction("https://b.example/", "b.example", "off", t0);

        s.activate(Mode::Browsing, 2, "https://c.example/", t0);
        assert!(s.active);
        assert_eq!(s.mode, Some(Mode::Browsing));
        assert_eq!(s.distraction_count, 0);
        assert!(s.distraction_history.is_empty());
        assert_eq!(s.allowlist, vec!["docs.rs".to_string()]);
        assert_eq!(s.grace_duration_secs, 45);
    }

    #[test]
    fn deactivate_freezes_elapsed_time() {
        let mut s = FocusSession::default();
        let t0 = Utc::now();
        s.activate(Mode::Reading, 1, "https://a.example/", t0);
        let t1 = t0 + Duration::minutes(12);
        assert_eq!(s.elapsed_ms(t1), 12 * 60_000);

        s.deactivate(t1);
        assert!(!s.active);
        assert!(s.mode.is_none());
        assert!(s.anchor_profile.is_none());
        assert_eq!(s.elapsed_ms(t1 + Duration::minutes(5)), 12 * 60_000);
    }

    #[test]
    fn settings_merge_ignores_absent_and_zero() {
        let mut st = Settings::default();
        st.merge(&SettingsUpdate {
            allowlist: Some(vec![" github.com ".into(), "".into()]),
            grace_duration_secs: Some(0),
        });
        assert_eq!(st.allowlist, vec!["github.com".to_string()]);
        assert_eq!(st.grace_duration_secs, DEFAULT_GRACE_SECS);
    }

    #[test]
    fn settings_accept_legacy_field_name() {
        let st: Settings = serde_json::from_str(r#"{"graceDuration": 60}"#).unwrap();
        assert_eq!(st.grace_duration_secs, 60);
    }

    #[test]
    fn encouragement_tiers() {
        assert_eq!(encouragement(75, 1), "Amazing focus session! You were in the zone.");
        assert_eq!(encouragement(75, 4), "Great work! Solid focus time.");
        assert_eq!(encouragement(12, 9), "Good start! Try for longer next time.");
        assert_eq!(encouragement(3, 6), "Staying focused is a skill, keep practicing!");
        assert_eq!(encouragement(3, 1), "Every bit of focus counts. Keep going!");
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(65), "1h 5m");
        assert_eq!(format_duration(1), "1 minute");
        assert_eq!(format_duration(0), "0 minutes");
        assert_eq!(format_duration(12), "12 minutes");
    }

    #[test]
    fn session_round_trips_through_json() {
        let mut s = FocusSession::default();
        s.activate(Mode::Entertainment, 3, "https://a.example/", Utc::now());
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["mode"], "entertainment");
        assert!(v.get("anchorSemanticSummary").is_some());
        let back: FocusSession = serde_json::from_value(v).unwrap();
        assert_eq!(back, s);
    }
}
