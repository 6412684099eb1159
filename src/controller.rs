// src/controller.rs
//! Single-writer event loop that owns the focus session and the nudge machine.
//!
//! Every mutation (navigation, timer expiry, settings, activation) is handled
//! serially by [`FocusController::handle`]. Slow work (content extraction,
//! oracle calls) runs in spawned tasks that post their result back as an
//! event tagged with the session epoch; results from an older epoch are
//! dropped. Content verdicts also carry the tab's navigation sequence number
//! and are dropped once the tab has navigated again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::categories::extract_domain;
use crate::config::oracle::OracleConfig;
use crate::config::FocusConfig;
use crate::decision::{Mode, Verdict};
use crate::engine::{AnchorContext, Engine};
use crate::metrics;
use crate::notify::{DisplaySurface, Indicator};
use crate::nudge::{Gate, NudgeMachine, Transition};
use crate::oracle::{build_oracle, AnchorSummary, DynOracle};
use crate::profile::{build_profile, PageSnapshot, TopicProfile};
use crate::relevance::anon_hash;
use crate::scheduler::{Scheduler, TimerFired, TokioScheduler};
use crate::session::{FocusSession, Settings, SettingsUpdate, StateView, TabId};
use crate::store::{self, KeyValueStore, FOCUS_SETTINGS_KEY, FOCUS_STATE_KEY, ORACLE_KEY_KEY};

/// Supplies page content for a tab.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, tab: TabId) -> anyhow::Result<PageSnapshot>;

    /// The controller no longer needs content for `tab`.
    fn release(&self, _tab: TabId) {}

    /// Drop content held for every tab.
    fn clear(&self) {}
}

/// Latest snapshot pushed by the host for each tab.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    inner: Mutex<CachedPages>,
}

/// Tabs beyond this many drop their least recently pushed page.
pub const MAX_CACHED_TABS: usize = 64;

#[derive(Debug, Default)]
struct CachedPages {
    pages: HashMap<TabId, (u64, PageSnapshot)>,
    stamp: u64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored normalized, so body text is already capped.
    pub fn push(&self, tab: TabId, snapshot: &PageSnapshot) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.stamp += 1;
        let stamp = guard.stamp;
        guard.pages.insert(tab, (stamp, snapshot.normalized()));
        if guard.pages.len() > MAX_CACHED_TABS {
            let oldest = guard
                .pages
                .iter()
                .min_by_key(|(_, (stamp, _))| *stamp)
                .map(|(tab, _)| *tab);
            if let Some(tab) = oldest {
                guard.pages.remove(&tab);
            }
        }
    }

    pub fn forget(&self, tab: TabId) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pages
            .remove(&tab);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentExtractor for SnapshotCache {
    async fn extract(&self, tab: TabId) -> anyhow::Result<PageSnapshot> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pages
            .get(&tab)
            .map(|(_, page)| page.clone())
            .ok_or_else(|| anyhow!("no snapshot for tab {tab}"))
    }

    fn release(&self, tab: TabId) {
        self.forget(tab);
    }

    fn clear(&self) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).pages.clear();
    }
}

/// A page finished loading (or a loaded tab was activated).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEvent {
    pub tab_id: TabId,
    pub url: String,
    #[serde(default = "default_complete")]
    pub complete: bool,
    #[serde(default)]
    pub snapshot: Option<PageSnapshot>,
}

fn default_complete() -> bool {
    true
}

pub enum Command {
    Activate {
        mode: Mode,
        tab_id: TabId,
        url: String,
        snapshot: Option<PageSnapshot>,
        reply: oneshot::Sender<StateView>,
    },
    Deactivate {
        reply: oneshot::Sender<StateView>,
    },
    UpdateSettings {
        update: SettingsUpdate,
        reply: oneshot::Sender<Settings>,
    },
    SaveOracleKey {
        key: String,
        reply: oneshot::Sender<bool>,
    },
    UserReturned {
        tab_id: TabId,
        reply: oneshot::Sender<bool>,
    },
    GetState {
        reply: oneshot::Sender<StateView>,
    },
}

pub enum HostEvent {
    Navigation(NavigationEvent),
    Timer(TimerFired),
    VerdictReady {
        epoch: u64,
        tab_id: TabId,
        /// Navigation sequence number the evaluation was started for.
        seq: u64,
        url: String,
        verdict: Verdict,
    },
    AnchorReady {
        epoch: u64,
        tab_id: TabId,
        profile: Option<TopicProfile>,
        summary: Option<AnchorSummary>,
    },
    Command(Command),
}

/// Collaborators the controller is wired with.
pub struct ControllerDeps {
    pub config: FocusConfig,
    pub oracle_config: OracleConfig,
    pub store: Arc<dyn KeyValueStore>,
    pub extractor: Arc<dyn ContentExtractor>,
    pub display: Arc<dyn DisplaySurface>,
    pub indicator: Arc<dyn Indicator>,
}

pub struct FocusController {
    session: FocusSession,
    settings: Settings,
    machine: NudgeMachine,
    engine: Arc<Engine>,
    oracle: DynOracle,
    oracle_config: OracleConfig,
    store: Arc<dyn KeyValueStore>,
    extractor: Arc<dyn ContentExtractor>,
    indicator: Arc<dyn Indicator>,
    events: mpsc::WeakUnboundedSender<HostEvent>,
    rng: StdRng,
    epoch: u64,
    nav_seq: u64,
    /// Tabs whose latest navigation is still being evaluated in the background.
    in_flight: HashMap<TabId, u64>,
}

impl FocusController {
    pub fn new(
        deps: ControllerDeps,
        scheduler: Arc<dyn Scheduler>,
        events: &mpsc::UnboundedSender<HostEvent>,
    ) -> Self {
        let settings = Settings {
            grace_duration_secs: deps.config.nudge.default_grace_secs,
            ..Settings::default()
        };
        Self {
            session: FocusSession::with_settings(&settings),
            settings,
            machine: NudgeMachine::new(&deps.config.nudge, scheduler, deps.display),
            engine: Arc::new(Engine::new(&deps.config)),
            oracle: build_oracle(&deps.oracle_config),
            oracle_config: deps.oracle_config,
            store: deps.store,
            extractor: deps.extractor,
            indicator: deps.indicator,
            events: events.downgrade(),
            rng: StdRng::from_os_rng(),
            epoch: 0,
            nav_seq: 0,
            in_flight: HashMap::new(),
        }
    }

    /// Replace the oracle built from config.
    pub fn with_oracle(mut self, oracle: DynOracle) -> Self {
        self.oracle = oracle;
        self
    }

    /// Deterministic reason selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn session(&self) -> &FocusSession {
        &self.session
    }

    pub fn machine(&self) -> &NudgeMachine {
        &self.machine
    }

    pub fn state_view(&self) -> StateView {
        StateView::new(
            &self.session,
            self.machine.stage(),
            self.oracle.is_available(),
            Utc::now(),
        )
    }

    /// Load settings, session and oracle key from the store.
    /// A restored session resumes with an idle nudge stage.
    pub async fn restore(&mut self) {
        if let Some(s) = store::load::<Settings>(self.store.as_ref(), FOCUS_SETTINGS_KEY).await {
            self.settings = s;
        }
        if let Some(mut s) = store::load::<FocusSession>(self.store.as_ref(), FOCUS_STATE_KEY).await {
            if s.active && s.mode.is_none() {
                warn!(target: "controller", "restored session is active without a mode, deactivating");
                s.deactivate(Utc::now());
            }
            self.session = s;
        }
        self.session.apply_settings(&self.settings);

        if let Some(key) = store::load::<String>(self.store.as_ref(), ORACLE_KEY_KEY).await {
            self.set_oracle_key(&key);
        }

        match self.session.mode.filter(|_| self.session.active) {
            Some(mode) => {
                self.indicator.set(mode.badge_label(), mode.badge_color());
                info!(target: "controller", mode = %mode, "restored active focus session");
            }
            None => self.indicator.clear(),
        }
    }

    /// Drive the loop until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HostEvent>) {
        while let Some(ev) = rx.recv().await {
            self.handle(ev).await;
        }
        debug!(target: "controller", "event channel closed, controller stopping");
    }

    pub async fn handle(&mut self, event: HostEvent) {
        match event {
            HostEvent::Navigation(nav) => self.on_navigation(nav).await,
            HostEvent::Timer(fired) => {
                let t = self.machine.on_timer(&mut self.session, fired, Utc::now());
                self.after_transition(t).await;
            }
            HostEvent::VerdictReady {
                epoch,
                tab_id,
                seq,
                url,
                verdict,
            } => {
                if epoch != self.epoch || !self.session.active {
                    debug!(target: "controller", epoch, current = self.epoch, "stale verdict dropped");
                    return;
                }
                if self.in_flight.get(&tab_id) != Some(&seq) {
                    debug!(target: "controller", tab_id, seq, "tab navigated since evaluation started, verdict dropped");
                    return;
                }
                self.settle_tab(tab_id);
                self.apply_verdict(tab_id, &url, verdict).await;
            }
            HostEvent::AnchorReady {
                epoch,
                tab_id,
                profile,
                summary,
            } => {
                self.extractor.release(tab_id);
                if epoch != self.epoch || !self.session.active {
                    return;
                }
                if profile.is_some() {
                    self.session.anchor_profile = profile;
                }
                if summary.is_some() {
                    self.session.anchor_summary = summary;
                }
                self.persist().await;
            }
            HostEvent::Command(cmd) => self.on_command(cmd).await,
        }
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Activate {
                mode,
                tab_id,
                url,
                snapshot,
                reply,
            } => {
                self.activate(mode, tab_id, &url, snapshot).await;
                let _ = reply.send(self.state_view());
            }
            Command::Deactivate { reply } => {
                self.deactivate().await;
                let _ = reply.send(self.state_view());
            }
            Command::UpdateSettings { update, reply } => {
                self.settings.merge(&update);
                self.session.apply_settings(&self.settings);
                store::save(self.store.as_ref(), FOCUS_SETTINGS_KEY, &self.settings).await;
                self.persist().await;
                let _ = reply.send(self.settings.clone());
            }
            Command::SaveOracleKey { key, reply } => {
                store::save(self.store.as_ref(), ORACLE_KEY_KEY, &key.trim()).await;
                self.set_oracle_key(&key);
                info!(target: "controller", configured = self.oracle.is_available(), "oracle key updated");
                let _ = reply.send(self.oracle.is_available());
            }
            Command::UserReturned { tab_id, reply } => {
                let t = self.machine.user_returned(&self.session, tab_id);
                let returned = !t.is_none();
                self.after_transition(t).await;
                let _ = reply.send(returned);
            }
            Command::GetState { reply } => {
                let _ = reply.send(self.state_view());
            }
        }
    }

    fn set_oracle_key(&mut self, key: &str) {
        let key = key.trim();
        let mut cfg = self.oracle_config.clone();
        if key.is_empty() {
            cfg.api_key.clear();
            cfg.enabled = false;
        } else {
            cfg = cfg.with_api_key(key);
        }
        self.oracle = build_oracle(&cfg);
        self.oracle_config = cfg;
    }

    async fn activate(&mut self, mode: Mode, tab_id: TabId, url: &str, snapshot: Option<PageSnapshot>) {
        let now = Utc::now();
        self.machine.reset();
        self.session.apply_settings(&self.settings);
        self.session.activate(mode, tab_id, url, now);
        self.epoch += 1;
        self.in_flight.clear();
        self.indicator.set(mode.badge_label(), mode.badge_color());
        metrics::record_session("activated");
        info!(target: "controller", mode = %mode, domain = %extract_domain(url), "focus activated");

        if mode == Mode::Reading {
            match snapshot.map(|s| s.normalized()) {
                Some(s) if s.has_title() => {
                    self.extractor.release(tab_id);
                    let profile = build_profile(&s);
                    debug!(target: "controller", top = ?profile.top_terms, "anchor profile built");
                    self.session.anchor_profile = Some(profile);
                    self.spawn_anchor_task(tab_id, Some(s), false);
                }
                Some(_) => debug!(target: "controller", "anchor snapshot has no title, no profile"),
                None => self.spawn_anchor_task(tab_id, None, true),
            }
        }
        self.persist().await;
    }

    /// Background anchor work: extraction (when no snapshot was supplied)
    /// and the oracle summary.
    fn spawn_anchor_task(&self, tab_id: TabId, snapshot: Option<PageSnapshot>, needs_profile: bool) {
        let needs_summary = self.oracle.is_available();
        if !needs_profile && !needs_summary {
            return;
        }
        let Some(events) = self.events.upgrade() else {
            return;
        };
        let extractor = self.extractor.clone();
        let oracle = self.oracle.clone();
        let epoch = self.epoch;

        tokio::spawn(async move {
            let snapshot = match snapshot {
                Some(s) => Some(s),
                None => match extractor.extract(tab_id).await {
                    Ok(s) => Some(s.normalized()),
                    Err(e) => {
                        warn!(target: "controller", tab_id, "anchor extraction failed: {e:#}");
                        None
                    }
                },
            };
            let Some(page) = snapshot.filter(|s| s.has_title()) else {
                return;
            };
            let profile = needs_profile.then(|| build_profile(&page));
            let summary = if needs_summary {
                oracle.summarize(&page).await
            } else {
                None
            };
            if profile.is_none() && summary.is_none() {
                return;
            }
            let _ = events.send(HostEvent::AnchorReady {
                epoch,
                tab_id,
                profile,
                summary,
            });
        });
    }

    async fn deactivate(&mut self) {
        self.machine.reset();
        if self.session.active {
            metrics::record_session("deactivated");
        }
        self.session.deactivate(Utc::now());
        self.epoch += 1;
        self.forget_tabs();
        self.indicator.clear();
        info!(target: "controller", "focus deactivated");
        self.persist().await;
    }

    async fn on_navigation(&mut self, nav: NavigationEvent) {
        // Any navigation supersedes an evaluation still running for the tab.
        self.in_flight.remove(&nav.tab_id);
        if !nav.complete {
            return;
        }
        let now = Utc::now();
        match self.machine.gate(&self.session, &nav.url, now) {
            Gate::Evaluate => {}
            Gate::ReturnToAnchor => {
                let t = self.machine.on_return_to_anchor(nav.tab_id);
                self.after_transition(t).await;
                return;
            }
            other => {
                debug!(target: "controller", gate = ?other, url = %anon_hash(&nav.url), "navigation skipped");
                return;
            }
        }
        let Some(ctx) = AnchorContext::from_session(&self.session) else {
            return;
        };

        if let Some(v) = self.engine.quick_verdict(&ctx, &nav.url, &mut self.rng) {
            self.apply_verdict(nav.tab_id, &nav.url, v).await;
            return;
        }
        self.nav_seq += 1;
        let seq = self.nav_seq;
        self.in_flight.insert(nav.tab_id, seq);
        self.spawn_content_evaluation(ctx, nav, seq);
    }

    /// The tab's latest page has been judged; its cached content is spent.
    fn settle_tab(&mut self, tab_id: TabId) {
        self.in_flight.remove(&tab_id);
        self.extractor.release(tab_id);
    }

    fn forget_tabs(&mut self) {
        self.in_flight.clear();
        self.extractor.clear();
    }

    fn spawn_content_evaluation(&mut self, ctx: AnchorContext, nav: NavigationEvent, seq: u64) {
        let Some(events) = self.events.upgrade() else {
            return;
        };
        let engine = self.engine.clone();
        let oracle = self.oracle.clone();
        let extractor = self.extractor.clone();
        let epoch = self.epoch;
        let mut rng = StdRng::seed_from_u64(self.rng.random());

        tokio::spawn(async move {
            let snapshot = match nav.snapshot {
                Some(s) => Some(s),
                None => match extractor.extract(nav.tab_id).await {
                    Ok(s) => Some(s),
                    Err(e) => {
                        debug!(target: "controller", tab_id = nav.tab_id, "extraction failed, domain-only judgment: {e:#}");
                        None
                    }
                },
            };
            let verdict = engine
                .resolve_content(&ctx, &nav.url, snapshot.as_ref(), oracle.as_ref(), &mut rng)
                .await;
            let _ = events.send(HostEvent::VerdictReady {
                epoch,
                tab_id: nav.tab_id,
                seq,
                url: nav.url,
                verdict,
            });
        });
    }

    async fn apply_verdict(&mut self, tab_id: TabId, url: &str, verdict: Verdict) {
        if let Some(mode) = self.session.mode {
            metrics::record_verdict(mode, &verdict);
        }
        debug!(
            target: "controller",
            url = %anon_hash(url),
            domain = %extract_domain(url),
            relevant = verdict.relevant,
            source = verdict.source.as_str(),
            score = ?verdict.score,
            "verdict"
        );
        let t = self
            .machine
            .on_verdict(&mut self.session, tab_id, url, &verdict, Utc::now());
        self.after_transition(t).await;
    }

    async fn after_transition(&mut self, t: Transition) {
        let Some(label) = t.metric_label() else {
            return;
        };
        metrics::record_transition(label);
        if let Transition::Ended(_) = t {
            self.epoch += 1;
            self.forget_tabs();
            self.indicator.clear();
            metrics::record_session("ended_by_grace");
        }
        self.persist().await;
    }

    async fn persist(&self) {
        store::save(self.store.as_ref(), FOCUS_STATE_KEY, &self.session).await;
    }
}

/// Cloneable front door to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl ControllerHandle {
    pub fn new(tx: mpsc::UnboundedSender<HostEvent>) -> Self {
        Self { tx }
    }

    /// Fire-and-forget.
    pub fn navigate(&self, nav: NavigationEvent) -> anyhow::Result<()> {
        self.tx
            .send(HostEvent::Navigation(nav))
            .map_err(|_| anyhow!("controller stopped"))
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> anyhow::Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(HostEvent::Command(make(reply)))
            .map_err(|_| anyhow!("controller stopped"))?;
        rx.await.map_err(|_| anyhow!("controller dropped the request"))
    }

    pub async fn activate(
        &self,
        mode: Mode,
        tab_id: TabId,
        url: String,
        snapshot: Option<PageSnapshot>,
    ) -> anyhow::Result<StateView> {
        self.request(|reply| Command::Activate {
            mode,
            tab_id,
            url,
            snapshot,
            reply,
        })
        .await
    }

    pub async fn deactivate(&self) -> anyhow::Result<StateView> {
        self.request(|reply| Command::Deactivate { reply }).await
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> anyhow::Result<Settings> {
        self.request(|reply| Command::UpdateSettings { update, reply })
            .await
    }

    pub async fn save_oracle_key(&self, key: String) -> anyhow::Result<bool> {
        self.request(|reply| Command::SaveOracleKey { key, reply }).await
    }

    pub async fn user_returned(&self, tab_id: TabId) -> anyhow::Result<bool> {
        self.request(|reply| Command::UserReturned { tab_id, reply })
            .await
    }

    pub async fn state(&self) -> anyhow::Result<StateView> {
        self.request(|reply| Command::GetState { reply }).await
    }
}

/// Wire a controller with a tokio scheduler, restore persisted state and
/// spawn its loop.
pub async fn start(deps: ControllerDeps) -> ControllerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let timer_tx = tx.downgrade();
    let scheduler = Arc::new(TokioScheduler::new(move |fired| {
        if let Some(tx) = timer_tx.upgrade() {
            let _ = tx.send(HostEvent::Timer(fired));
        }
    }));
    let mut controller = FocusController::new(deps, scheduler, &tx);
    controller.restore().await;
    tokio::spawn(controller.run(rx));
    ControllerHandle::new(tx)
}
