// src/scheduler.rs
//! Single-shot, cancelable timers for the nudge protocol.
//!
//! A timer fires a [`TimerFired`] carrying the flow token it was scheduled
//! with. Cancelling a handle guarantees the event is never delivered by the
//! tokio scheduler; the nudge machine still re-checks the token so a timer
//! that raced its cancellation is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerKind {
    /// Warning → full nudge.
    Escalation,
    /// Full nudge → session ended.
    Grace,
}

impl TimerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::Escalation => "escalation",
            TimerKind::Grace => "grace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub token: u64,
}

/// Owned handle to a scheduled timer.
#[derive(Debug)]
pub struct TimerHandle {
    kind: TimerKind,
    token: u64,
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl TimerHandle {
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub trait Scheduler: Send + Sync {
    fn schedule(&self, kind: TimerKind, delay: Duration, token: u64) -> TimerHandle;
}

type Sink = Arc<dyn Fn(TimerFired) + Send + Sync>;

/// Timers backed by `tokio::time::sleep`; expiry is handed to `sink`.
pub struct TokioScheduler {
    sink: Sink,
}

impl TokioScheduler {
    pub fn new(sink: impl Fn(TimerFired) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, kind: TimerKind, delay: Duration, token: u64) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !flag.load(Ordering::SeqCst) {
                sink(TimerFired { kind, token });
            }
        });
        TimerHandle {
            kind,
            token,
            cancelled,
            abort: Some(task.abort_handle()),
        }
    }
}

/// A timer recorded by [`ManualScheduler`].
#[derive(Debug, Clone)]
pub struct ScheduledTimer {
    pub kind: TimerKind,
    pub delay: Duration,
    pub token: u64,
    cancelled: Arc<AtomicBool>,
}

impl ScheduledTimer {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn fired(&self) -> TimerFired {
        TimerFired {
            kind: self.kind,
            token: self.token,
        }
    }
}

/// Records timers instead of running them; tests fire them explicitly.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    timers: Mutex<Vec<ScheduledTimer>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ScheduledTimer>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every timer ever scheduled, cancelled ones included.
    pub fn all(&self) -> Vec<ScheduledTimer> {
        self.lock().clone()
    }

    /// Timers still live.
    pub fn pending(&self) -> Vec<ScheduledTimer> {
        self.lock()
            .iter()
            .filter(|t| !t.is_cancelled())
            .cloned()
            .collect()
    }

    /// Remove the oldest live timer of `kind` and return its expiry event.
    pub fn fire_next(&self, kind: TimerKind) -> Option<TimerFired> {
        let mut timers = self.lock();
        let idx = timers
            .iter()
            .position(|t| t.kind == kind && !t.is_cancelled())?;
        Some(timers.remove(idx).fired())
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, kind: TimerKind, delay: Duration, token: u64) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.lock().push(ScheduledTimer {
            kind,
            delay,
            token,
            cancelled: cancelled.clone(),
        });
        TimerHandle {
            kind,
            token,
            cancelled,
            abort: None,
        }
    }
}
