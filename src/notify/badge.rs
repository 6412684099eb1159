// src/notify/badge.rs
use std::sync::Mutex;

use serde::Serialize;

/// Toolbar badge: short label plus background color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeState {
    pub text: String,
    pub color: String,
}

/// Cosmetic status indicator. `set` and `clear` are idempotent.
pub trait Indicator: Send + Sync {
    fn set(&self, text: &str, color: &str);
    fn clear(&self);
}

/// In-process badge the host polls.
#[derive(Debug, Default)]
pub struct SharedBadge {
    state: Mutex<Option<BadgeState>>,
}

impl SharedBadge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<BadgeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Indicator for SharedBadge {
    fn set(&self, text: &str, color: &str) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(BadgeState {
            text: text.to_string(),
            color: color.to_string(),
        });
    }

    fn clear(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear_are_idempotent() {
        let b = SharedBadge::new();
        b.set("R", "#6C5CE7");
        b.set("R", "#6C5CE7");
        assert_eq!(b.current().unwrap().text, "R");
        b.clear();
        b.clear();
        assert!(b.current().is_none());
    }
}
