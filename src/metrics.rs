use axum::{routing::get, Router};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::decision::{Mode, Verdict};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Only one recorder per process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "focus_verdicts_total",
            "Relevance verdicts by mode, outcome and deciding stage."
        );
        describe_counter!(
            "focus_nudge_transitions_total",
            "Nudge state machine transitions."
        );
        describe_counter!(
            "focus_oracle_calls_total",
            "Semantic oracle calls by outcome (trusted, low_confidence, failed)."
        );
        describe_counter!(
            "focus_sessions_total",
            "Focus session lifecycle events."
        );
    });
}

pub fn record_verdict(mode: Mode, verdict: &Verdict) {
    ensure_metrics_described();
    counter!(
        "focus_verdicts_total",
        "mode" => mode.as_str(),
        "relevant" => if verdict.relevant { "true" } else { "false" },
        "source" => verdict.source.as_str()
    )
    .increment(1);
}

pub fn record_transition(transition: &'static str) {
    ensure_metrics_described();
    counter!("focus_nudge_transitions_total", "transition" => transition).increment(1);
}

pub fn record_oracle_call(outcome: &'static str) {
    ensure_metrics_described();
    counter!("focus_oracle_calls_total", "outcome" => outcome).increment(1);
}

pub fn record_session(event: &'static str) {
    ensure_metrics_described();
    counter!("focus_sessions_total", "event" => event).increment(1);
}
