// src/notify/mod.rs
//! Display-surface commands and the host-facing sinks that carry them.

pub mod badge;
pub mod queue;

use serde::{Deserialize, Serialize};

use crate::categories::Category;
use crate::decision::Mode;
use crate::session::{SessionSummary, TabId};

pub use badge::{BadgeState, Indicator, SharedBadge};
pub use queue::{NotificationQueue, RecordingSurface};

/// Command for the overlay running inside a tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Notification {
    /// Stage 1: subtle warning bar.
    #[serde(rename = "FOCUS_WARNING")]
    ShowWarning { message: String, mode: Option<Mode> },
    /// Stage 2: full nudge with countdown and a way back.
    #[serde(rename = "FOCUS_NUDGE", rename_all = "camelCase")]
    ShowNudge {
        message: String,
        category: Category,
        mode: Option<Mode>,
        remaining_secs: u64,
        distraction_count: u32,
        anchor_url: String,
    },
    /// Stage 3: session summary.
    #[serde(rename = "FOCUS_ENDED")]
    ShowSessionEnded(SessionSummary),
    #[serde(rename = "FOCUS_DISMISS")]
    Dismiss,
    /// Ask the host to navigate the tab back to the anchor.
    #[serde(rename = "FOCUS_REDIRECT")]
    Redirect { url: String },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::ShowWarning { .. } => "warning",
            Notification::ShowNudge { .. } => "nudge",
            Notification::ShowSessionEnded(_) => "ended",
            Notification::Dismiss => "dismiss",
            Notification::Redirect { .. } => "redirect",
        }
    }
}

/// Where notifications go. Delivery is best effort: an error means the tab
/// is gone or not scriptable, and callers log and move on.
pub trait DisplaySurface: Send + Sync {
    fn deliver(&self, tab: TabId, notification: Notification) -> anyhow::Result<()>;
}
