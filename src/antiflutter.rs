use chrono::{DateTime, Duration, Utc};

/// Suppresses repeated evaluations of the same URL inside a cooldown window.
///
/// Hosts commonly fire several "load complete" events for one navigation
/// (redirects, SPA history updates, tab re-activation). Only the first one
/// inside the window is allowed through.
#[derive(Debug, Clone)]
pub struct NavDebounce {
    cooldown: Duration,
    pub last_url: Option<String>,
    pub last_at: Option<DateTime<Utc>>,
}

impl NavDebounce {
    pub fn new(cooldown: std::time::Duration) -> Self {
        Self {
            cooldown: Duration::from_std(cooldown).unwrap_or_else(|_| Duration::seconds(5)),
            last_url: None,
            last_at: None,
        }
    }

    /// Returns true if `url` at `now` should be evaluated.
    pub fn should_evaluate(&self, url: &str, now: DateTime<Utc>) -> bool {
        match (&self.last_url, self.last_at) {
            (Some(last_url), Some(last_at)) if last_url == url => now - last_at >= self.cooldown,
            _ => true,
        }
    }

    /// Remember the URL that just started a nudge flow.
    pub fn record(&mut self, url: &str, now: DateTime<Utc>) {
        self.last_url = Some(url.to_string());
        self.last_at = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_url = None;
        self.last_at = None;
    }
}
