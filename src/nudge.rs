// src/nudge.rs
//! Three-stage nudge protocol: Idle → Warning → Grace → (Ended | Idle).
//!
//! The machine owns its timer handles and a flow token. Every new flow and
//! every cancellation bumps the token, so a timer event carrying an older
//! token is ignored. Notification delivery is best effort and never affects
//! progression.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::antiflutter::NavDebounce;
use crate::categories::{extract_domain, is_internal_url};
use crate::config::NudgeSection;
use crate::decision::Verdict;
use crate::notify::{DisplaySurface, Notification};
use crate::relevance::anon_hash;
use crate::scheduler::{Scheduler, TimerFired, TimerHandle, TimerKind};
use crate::session::{FocusSession, SessionSummary, TabId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NudgeStage {
    #[default]
    Idle,
    Warning,
    Grace,
}

/// The distraction currently being nudged.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDistraction {
    pub tab_id: TabId,
    pub url: String,
    pub domain: String,
    pub verdict: Verdict,
}

/// What to do with an incoming navigation before any evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// No active session.
    Inactive,
    /// Browser-internal page.
    Internal,
    /// Back on the anchor's domain.
    ReturnToAnchor,
    /// Same domain as the pending distraction.
    SamePending,
    /// Same URL re-triggered inside the debounce window.
    Debounced,
    Evaluate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    None,
    /// Idle → Warning, or a domain swap restarting at Warning.
    Warned { superseded: bool },
    /// Warning → Grace.
    Escalated,
    /// Warning/Grace → Idle.
    Cancelled { from: NudgeStage },
    /// Grace → Ended; the session has been deactivated.
    Ended(Box<SessionSummary>),
}

impl Transition {
    pub fn metric_label(&self) -> Option<&'static str> {
        match self {
            Transition::None => None,
            Transition::Warned { superseded: false } => Some("idle_to_warning"),
            Transition::Warned { superseded: true } => Some("superseded"),
            Transition::Escalated => Some("warning_to_grace"),
            Transition::Cancelled { from: NudgeStage::Grace } => Some("grace_to_idle"),
            Transition::Cancelled { .. } => Some("warning_to_idle"),
            Transition::Ended(_) => Some("grace_to_ended"),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Transition::None)
    }
}

pub struct NudgeMachine {
    stage: NudgeStage,
    pending: Option<PendingDistraction>,
    grace_tab: Option<TabId>,
    escalation: Option<TimerHandle>,
    grace: Option<TimerHandle>,
    token: u64,
    debounce: NavDebounce,
    escalation_delay: Duration,
    scheduler: Arc<dyn Scheduler>,
    display: Arc<dyn DisplaySurface>,
}

impl NudgeMachine {
    pub fn new(
        config: &NudgeSection,
        scheduler: Arc<dyn Scheduler>,
        display: Arc<dyn DisplaySurface>,
    ) -> Self {
        Self {
            stage: NudgeStage::Idle,
            pending: None,
            grace_tab: None,
            escalation: None,
            grace: None,
            token: 0,
            debounce: NavDebounce::new(config.debounce_window()),
            escalation_delay: config.escalation_delay(),
            scheduler,
            display,
        }
    }

    pub fn stage(&self) -> NudgeStage {
        self.stage
    }

    pub fn pending(&self) -> Option<&PendingDistraction> {
        self.pending.as_ref()
    }

    /// Tab showing the Stage 1 warning.
    pub fn warning_tab(&self) -> Option<TabId> {
        match self.stage {
            NudgeStage::Warning => self.pending.as_ref().map(|p| p.tab_id),
            _ => None,
        }
    }

    /// Tab showing the Stage 2 nudge.
    pub fn grace_tab(&self) -> Option<TabId> {
        self.grace_tab
    }

    /// Current flow token (for diagnostics and tests).
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Classify a navigation before evaluation. Read-only.
    pub fn gate(&self, session: &FocusSession, url: &str, now: DateTime<Utc>) -> Gate {
        if !session.active {
            return Gate::Inactive;
        }
        if is_internal_url(url) {
            return Gate::Internal;
        }
        let domain = extract_domain(url);
        if !domain.is_empty() && domain == session.anchor_domain() {
            return Gate::ReturnToAnchor;
        }
        if let Some(p) = &self.pending {
            if p.domain == domain {
                return Gate::SamePending;
            }
        }
        if !self.debounce.should_evaluate(url, now) {
            return Gate::Debounced;
        }
        Gate::Evaluate
    }

    /// Feed a verdict for a navigation of `tab_id` to `url`.
    pub fn on_verdict(
        &mut self,
        session: &mut FocusSession,
        tab_id: TabId,
        url: &str,
        verdict: &Verdict,
        now: DateTime<Utc>,
    ) -> Transition {
        if !session.active || verdict.relevant {
            return Transition::None;
        }
        let domain = extract_domain(url);
        if self.pending.as_ref().is_some_and(|p| p.domain == domain) {
            return Transition::None;
        }
        // A verdict computed in the background may arrive after an identical one.
        if !self.debounce.should_evaluate(url, now) {
            debug!(target: "nudge", url = %anon_hash(url), "debounced verdict");
            return Transition::None;
        }

        let superseded = self.stage != NudgeStage::Idle;
        if superseded {
            info!(target: "nudge", from = ?self.stage, domain = %domain, "new distraction, restarting nudge flow");
        }
        self.clear_flow();

        session.record_distraction(url, &domain, &verdict.reason, now);
        self.debounce.record(url, now);
        self.stage = NudgeStage::Warning;
        self.pending = Some(PendingDistraction {
            tab_id,
            url: url.to_string(),
            domain: domain.clone(),
            verdict: verdict.clone(),
        });

        self.deliver(
            tab_id,
            Notification::ShowWarning {
                message: verdict.reason.clone(),
                mode: session.mode,
            },
        );
        self.escalation = Some(self.scheduler.schedule(
            TimerKind::Escalation,
            self.escalation_delay,
            self.token,
        ));
        info!(
            target: "nudge",
            tab_id,
            domain = %domain,
            count = session.distraction_count,
            "stage 1 warning"
        );
        Transition::Warned { superseded }
    }

    /// Handle a timer expiry. Stale or mismatched timers are no-ops.
    pub fn on_timer(
        &mut self,
        session: &mut FocusSession,
        fired: TimerFired,
        now: DateTime<Utc>,
    ) -> Transition {
        if fired.token != self.token {
            debug!(target: "nudge", kind = fired.kind.as_str(), token = fired.token, "stale timer ignored");
            return Transition::None;
        }
        match (fired.kind, self.stage) {
            (TimerKind::Escalation, NudgeStage::Warning) if session.active => self.escalate(session),
            (TimerKind::Grace, NudgeStage::Grace) if session.active => self.end_session(session, now),
            _ => {
                debug!(target: "nudge", kind = fired.kind.as_str(), stage = ?self.stage, "timer does not match stage");
                Transition::None
            }
        }
    }

    fn escalate(&mut self, session: &FocusSession) -> Transition {
        let Some(p) = self.pending.clone() else {
            return Transition::None;
        };
        self.escalation = None;
        self.stage = NudgeStage::Grace;
        self.grace_tab = Some(p.tab_id);

        self.deliver(
            p.tab_id,
            Notification::ShowNudge {
                message: p.verdict.reason.clone(),
                category: p.verdict.category,
                mode: session.mode,
                remaining_secs: session.grace_duration_secs,
                distraction_count: session.distraction_count,
                anchor_url: session.anchor_url.clone(),
            },
        );
        self.grace = Some(self.scheduler.schedule(
            TimerKind::Grace,
            Duration::from_secs(session.grace_duration_secs),
            self.token,
        ));
        info!(target: "nudge", tab_id = p.tab_id, grace_secs = session.grace_duration_secs, "stage 2 nudge");
        Transition::Escalated
    }

    fn end_session(&mut self, session: &mut FocusSession, now: DateTime<Utc>) -> Transition {
        let summary = SessionSummary::from_session(session, now);
        let grace_tab = self.grace_tab;
        let anchor_tab = session.anchor_tab_id;

        if let Some(tab) = grace_tab {
            self.deliver(tab, Notification::ShowSessionEnded(summary.clone()));
        }
        if let Some(tab) = anchor_tab.filter(|t| Some(*t) != grace_tab) {
            self.deliver(tab, Notification::ShowSessionEnded(summary.clone()));
        }

        self.reset();
        session.deactivate(now);
        info!(
            target: "nudge",
            minutes = summary.duration_minutes,
            distractions = summary.distraction_count,
            "stage 3: grace expired, session ended"
        );
        Transition::Ended(Box::new(summary))
    }

    /// Navigation landed back on the anchor's domain.
    pub fn on_return_to_anchor(&mut self, tab_id: TabId) -> Transition {
        let from = self.stage;
        if from == NudgeStage::Idle {
            return Transition::None;
        }
        let overlay_tab = self.overlay_tab();
        self.clear_flow();
        if let Some(tab) = overlay_tab {
            self.deliver(tab, Notification::Dismiss);
        }
        if overlay_tab != Some(tab_id) {
            self.deliver(tab_id, Notification::Dismiss);
        }
        info!(target: "nudge", tab_id, from = ?from, "returned to anchor, nudge cancelled");
        Transition::Cancelled { from }
    }

    /// The user pressed "go back" on an overlay in `tab_id`.
    pub fn user_returned(&mut self, session: &FocusSession, tab_id: TabId) -> Transition {
        let t = self.on_return_to_anchor(tab_id);
        if !t.is_none() && !session.anchor_url.is_empty() {
            self.deliver(
                tab_id,
                Notification::Redirect {
                    url: session.anchor_url.clone(),
                },
            );
        }
        t
    }

    /// Drop all nudge state and timers (activation, deactivation, session end).
    pub fn reset(&mut self) {
        self.clear_flow();
        self.debounce.reset();
    }

    fn overlay_tab(&self) -> Option<TabId> {
        self.grace_tab
            .or_else(|| self.pending.as_ref().map(|p| p.tab_id))
    }

    fn clear_flow(&mut self) {
        if let Some(h) = self.escalation.take() {
            h.cancel();
        }
        if let Some(h) = self.grace.take() {
            h.cancel();
        }
        self.stage = NudgeStage::Idle;
        self.pending = None;
        self.grace_tab = None;
        self.token = self.token.wrapping_add(1);
    }

    fn deliver(&self, tab: TabId, notification: Notification) {
        let kind = notification.kind();
        if let Err(e) = self.display.deliver(tab, notification) {
            warn!(target: "nudge", tab, kind, "notification delivery failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::Category;
    use crate::decision::{Mode, VerdictSource};
    use crate::notify::RecordingSurface;
    use crate::scheduler::ManualScheduler;

    fn setup() -> (NudgeMachine, Arc<ManualScheduler>, Arc<RecordingSurface>, FocusSession) {
        let sched = Arc::new(ManualScheduler::new());
        let surface = Arc::new(RecordingSurface::new());
        let m = NudgeMachine::new(&NudgeSection::default(), sched.clone(), surface.clone());
        let mut s = FocusSession::default();
        s.activate(Mode::Reading, 1, "https://arxiv.org/abs/1", Utc::now());
        (m, sched, surface, s)
    }

    fn deny(reason: &str) -> Verdict {
        Verdict::deny(Category::Social, reason, VerdictSource::FastPath)
    }

    #[test]
    fn relevant_verdict_is_ignored() {
        let (mut m, sched, _, mut s) = setup();
        let v = Verdict::allow(Category::Reference, "ok", VerdictSource::Category);
        assert!(m.on_verdict(&mut s, 2, "https://en.wikipedia.org/", &v, Utc::now()).is_none());
        assert_eq!(m.stage(), NudgeStage::Idle);
        assert!(sched.pending().is_empty());
    }

    #[test]
    fn warning_escalation_uses_configured_delays() {
        let (mut m, sched, surface, mut s) = setup();
        let now = Utc::now();
        let t = m.on_verdict(&mut s, 2, "https://x.com/home", &deny("drift"), now);
        assert_eq!(t, Transition::Warned { superseded: false });
        assert_eq!(m.warning_tab(), Some(2));
        assert_eq!(s.distraction_count, 1);

        let timers = sched.pending();
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].delay, Duration::from_secs(5));

        let fired = sched.fire_next(TimerKind::Escalation).unwrap();
        assert_eq!(m.on_timer(&mut s, fired, now), Transition::Escalated);
        assert_eq!(m.grace_tab(), Some(2));
        assert_eq!(sched.pending()[0].delay, Duration::from_secs(30));
        assert_eq!(surface.kinds(), vec!["warning", "nudge"]);
    }

    #[test]
    fn grace_timer_in_warning_stage_is_ignored() {
        let (mut m, _, _, mut s) = setup();
        m.on_verdict(&mut s, 2, "https://x.com/", &deny("d"), Utc::now());
        let fired = TimerFired {
            kind: TimerKind::Grace,
            token: m.token(),
        };
        assert!(m.on_timer(&mut s, fired, Utc::now()).is_none());
        assert_eq!(m.stage(), NudgeStage::Warning);
    }

    #[test]
    fn return_during_warning_dismisses() {
        let (mut m, sched, surface, mut s) = setup();
        m.on_verdict(&mut s, 2, "https://x.com/", &deny("d"), Utc::now());
        let stale = sched.all()[0].fired();

        let t = m.on_return_to_anchor(2);
        assert_eq!(t, Transition::Cancelled { from: NudgeStage::Warning });
        assert!(sched.pending().is_empty());
        assert!(m.on_timer(&mut s, stale, Utc::now()).is_none());
        assert_eq!(surface.kinds(), vec!["warning", "dismiss"]);
    }

    #[test]
    fn closed_tab_does_not_stall_progression() {
        let (mut m, sched, surface, mut s) = setup();
        surface.close_tab(2);
        let now = Utc::now();
        m.on_verdict(&mut s, 2, "https://x.com/", &deny("d"), now);
        let f = sched.fire_next(TimerKind::Escalation).unwrap();
        m.on_timer(&mut s, f, now);
        let g = sched.fire_next(TimerKind::Grace).unwrap();
        assert!(matches!(m.on_timer(&mut s, g, now), Transition::Ended(_)));
        assert!(!s.active);
        // only the anchor tab received anything
        assert_eq!(surface.delivered().len(), 1);
        assert_eq!(surface.delivered()[0].0, 1);
    }

    #[test]
    fn user_return_redirects_to_anchor() {
        let (mut m, _, surface, mut s) = setup();
        m.on_verdict(&mut s, 2, "https://x.com/", &deny("d"), Utc::now());
        assert!(!m.user_returned(&s, 2).is_none());
        assert_eq!(
            surface.for_tab(2).last(),
            Some(&Notification::Redirect {
                url: "https://arxiv.org/abs/1".into()
            })
        );
        // nothing pending: no redirect
        assert!(m.user_returned(&s, 2).is_none());
    }

    #[test]
    fn gate_classification() {
        let (mut m, _, _, mut s) = setup();
        let now = Utc::now();
        assert_eq!(m.gate(&s, "about:blank", now), Gate::Internal);
        assert_eq!(m.gate(&s, "https://arxiv.org/list", now), Gate::ReturnToAnchor);
        assert_eq!(m.gate(&s, "https://x.com/a", now), Gate::Evaluate);

        m.on_verdict(&mut s, 2, "https://x.com/a", &deny("d"), now);
        assert_eq!(m.gate(&s, "https://x.com/b", now), Gate::SamePending);

        m.on_return_to_anchor(2);
        assert_eq!(m.gate(&s, "https://x.com/a", now), Gate::Debounced);

        s.deactivate(now);
        assert_eq!(m.gate(&s, "https://x.com/a", now), Gate::Inactive);
    }
}
