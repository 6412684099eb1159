// tests/nudge_flow.rs
//
// Nudge state machine driven by a ManualScheduler: timers only fire when the
// test says so, which makes every transition deterministic.

use std::sync::Arc;

use chrono::{Duration, Utc};
use focus_guard::categories::Category;
use focus_guard::config::NudgeSection;
use focus_guard::decision::{Mode, Verdict, VerdictSource};
use focus_guard::notify::{Notification, RecordingSurface};
use focus_guard::nudge::{Gate, NudgeMachine, NudgeStage, Transition};
use focus_guard::scheduler::{ManualScheduler, TimerKind};
use focus_guard::session::FocusSession;

const ANCHOR_TAB: i64 = 1;
const ANCHOR: &str = "https://arxiv.org/abs/2401.00001";

struct Harness {
    machine: NudgeMachine,
    sched: Arc<ManualScheduler>,
    surface: Arc<RecordingSurface>,
    session: FocusSession,
}

fn harness() -> Harness {
    let sched = Arc::new(ManualScheduler::new());
    let surface = Arc::new(RecordingSurface::new());
    let machine = NudgeMachine::new(&NudgeSection::default(), sched.clone(), surface.clone());
    let mut session = FocusSession::default();
    session.activate(Mode::Reading, ANCHOR_TAB, ANCHOR, Utc::now() - Duration::minutes(14));
    Harness {
        machine,
        sched,
        surface,
        session,
    }
}

fn off_topic(category: Category) -> Verdict {
    Verdict::deny(category, "Looks like you've drifted.", VerdictSource::FastPath)
}

impl Harness {
    /// Navigation as the controller performs it: gate, then verdict.
    fn navigate(&mut self, tab: i64, url: &str, verdict: &Verdict) -> Transition {
        let now = Utc::now();
        match self.machine.gate(&self.session, url, now) {
            Gate::Evaluate => self.machine.on_verdict(&mut self.session, tab, url, verdict, now),
            Gate::ReturnToAnchor => self.machine.on_return_to_anchor(tab),
            _ => Transition::None,
        }
    }

    fn fire(&mut self, kind: TimerKind) -> Transition {
        let fired = self.sched.fire_next(kind).expect("timer pending");
        self.machine.on_timer(&mut self.session, fired, Utc::now())
    }
}

#[test]
fn distraction_runs_to_session_end() {
    let mut h = harness();

    let t = h.navigate(2, "https://x.com/home", &off_topic(Category::Social));
    assert_eq!(t, Transition::Warned { superseded: false });
    assert_eq!(h.machine.stage(), NudgeStage::Warning);

    assert_eq!(h.fire(TimerKind::Escalation), Transition::Escalated);
    assert_eq!(h.machine.stage(), NudgeStage::Grace);

    let Transition::Ended(summary) = h.fire(TimerKind::Grace) else {
        panic!("expected session end");
    };
    assert!(!h.session.active);
    assert!(h.session.mode.is_none());
    assert!(h.session.distraction_history.len() >= 1);
    assert_eq!(summary.distraction_count, 1);
    assert_eq!(summary.duration_minutes, 14);
    assert_eq!(summary.encouragement, "Good start! Try for longer next time.");
    assert_eq!(h.machine.stage(), NudgeStage::Idle);
    assert!(h.sched.pending().is_empty());

    // Both the distracting tab and the anchor tab get the summary.
    assert!(matches!(h.surface.for_tab(2).last(), Some(Notification::ShowSessionEnded(_))));
    assert!(matches!(h.surface.for_tab(ANCHOR_TAB).last(), Some(Notification::ShowSessionEnded(_))));
}

#[test]
fn nudge_carries_grace_and_anchor() {
    let mut h = harness();
    h.session.grace_duration_secs = 45;
    h.navigate(2, "https://www.amazon.com/dp/1", &off_topic(Category::Shopping));
    h.fire(TimerKind::Escalation);

    let nudge = h.surface.for_tab(2).pop().unwrap();
    assert_eq!(
        nudge,
        Notification::ShowNudge {
            message: "Looks like you've drifted.".into(),
            category: Category::Shopping,
            mode: Some(Mode::Reading),
            remaining_secs: 45,
            distraction_count: 1,
            anchor_url: ANCHOR.into(),
        }
    );
    assert_eq!(h.sched.pending()[0].delay, std::time::Duration::from_secs(45));
}

#[test]
fn return_to_anchor_during_grace_cancels_end() {
    let mut h = harness();
    h.navigate(2, "https://x.com/home", &off_topic(Category::Social));
    h.fire(TimerKind::Escalation);
    let grace_timer = h.sched.pending()[0].fired();

    let t = h.navigate(2, "https://arxiv.org/list/cs.LG", &off_topic(Category::Social));
    assert_eq!(t, Transition::Cancelled { from: NudgeStage::Grace });
    assert_eq!(h.machine.stage(), NudgeStage::Idle);
    assert!(h.sched.pending().is_empty());
    assert_eq!(h.surface.for_tab(2).last(), Some(&Notification::Dismiss));

    // A grace expiry that raced the cancellation is a silent no-op.
    assert!(h.machine.on_timer(&mut h.session, grace_timer, Utc::now()).is_none());
    assert!(h.session.active);
}

#[test]
fn domain_swap_in_grace_restarts_at_warning() {
    let mut h = harness();
    h.navigate(2, "https://x.com/home", &off_topic(Category::Social));
    h.fire(TimerKind::Escalation);
    let stale_grace = h.sched.pending()[0].fired();

    let t = h.navigate(3, "https://www.youtube.com/watch?v=1", &off_topic(Category::Entertainment));
    assert_eq!(t, Transition::Warned { superseded: true });
    assert_eq!(h.machine.stage(), NudgeStage::Warning);
    assert_eq!(h.machine.warning_tab(), Some(3));
    assert_eq!(h.machine.pending().unwrap().domain, "youtube.com");
    assert_eq!(h.session.distraction_count, 2);

    // Only B's escalation timer is live; A's grace timer is discarded.
    let pending = h.sched.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, TimerKind::Escalation);
    assert!(h.machine.on_timer(&mut h.session, stale_grace, Utc::now()).is_none());
    assert!(h.session.active);

    assert_eq!(h.fire(TimerKind::Escalation), Transition::Escalated);
    assert_eq!(h.machine.grace_tab(), Some(3));
}

#[test]
fn same_domain_as_pending_is_not_a_new_distraction() {
    let mut h = harness();
    h.navigate(2, "https://x.com/home", &off_topic(Category::Social));
    let t = h.navigate(2, "https://x.com/explore", &off_topic(Category::Social));
    assert!(t.is_none());
    assert_eq!(h.session.distraction_count, 1);
    assert_eq!(h.sched.all().len(), 1);
}

#[test]
fn repeated_identical_navigation_is_debounced() {
    let mut h = harness();
    let url = "https://www.reddit.com/r/all";
    let v = off_topic(Category::Social);
    let transitions: Vec<_> = (0..5)
        .map(|_| h.navigate(2, url, &v))
        .filter(|t| !t.is_none())
        .collect();
    assert_eq!(transitions.len(), 1);

    // Even after the flow is cancelled, the same URL stays quiet inside the window.
    h.navigate(2, ANCHOR, &v);
    assert!(h.navigate(2, url, &v).is_none());
    assert_eq!(h.session.distraction_count, 1);

    // Direct verdict delivery (background evaluation) is debounced too.
    let now = Utc::now();
    assert!(h.machine.on_verdict(&mut h.session, 2, url, &v, now).is_none());
}

#[test]
fn third_distraction_compares_against_current_pending_only() {
    let mut h = harness();
    let a = off_topic(Category::Social);
    let b = off_topic(Category::Entertainment);
    h.navigate(2, "https://x.com/home", &a);
    h.navigate(2, "https://www.youtube.com/watch?v=1", &b);
    // Back to A's domain while B is pending: a new distraction.
    let t = h.navigate(2, "https://x.com/notifications", &a);
    assert_eq!(t, Transition::Warned { superseded: true });
    assert_eq!(h.session.distraction_count, 3);
    assert_eq!(h.machine.pending().unwrap().domain, "x.com");
}

#[test]
fn user_return_from_warning_redirects() {
    let mut h = harness();
    h.navigate(2, "https://x.com/home", &off_topic(Category::Social));
    let t = h.machine.user_returned(&h.session, 2);
    assert_eq!(t, Transition::Cancelled { from: NudgeStage::Warning });
    assert_eq!(
        h.surface.for_tab(2)[1..].to_vec(),
        vec![
            Notification::Dismiss,
            Notification::Redirect { url: ANCHOR.into() }
        ]
    );
    assert!(h.sched.pending().is_empty());
}

#[test]
fn relevant_verdicts_never_transition() {
    let mut h = harness();
    let ok = Verdict::allow(Category::Reference, "fine", VerdictSource::Profile);
    assert!(h.navigate(2, "https://en.wikipedia.org/wiki/SGD", &ok).is_none());
    assert_eq!(h.machine.stage(), NudgeStage::Idle);
    assert!(h.surface.delivered().is_empty());
}
