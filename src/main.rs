//! Focus Guard binary entrypoint.
//! Boots the controller loop and the Axum HTTP surface the browser host talks to.

use std::sync::Arc;

use focus_guard::config::oracle::OracleConfig;
use focus_guard::config::FocusConfig;
use focus_guard::controller::{self, ControllerDeps, SnapshotCache};
use focus_guard::metrics::Metrics;
use focus_guard::notify::{NotificationQueue, SharedBadge};
use focus_guard::store::JsonFileStore;
use focus_guard::{api, AppState};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_BIND: &str = "127.0.0.1:7878";

/// Compact logs by default; `FOCUS_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("focus_guard=info,warn"));

    let json = std::env::var("FOCUS_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = FocusConfig::load().unwrap_or_else(|e| {
        warn!(target: "config", "focus config unusable, using defaults: {e:#}");
        FocusConfig::default()
    });
    let oracle_config = OracleConfig::load_or_default();

    let store = Arc::new(JsonFileStore::from_env());
    let queue = Arc::new(NotificationQueue::new());
    let snapshots = Arc::new(SnapshotCache::new());
    let badge = Arc::new(SharedBadge::new());
    let metrics = Metrics::init()?;

    info!(
        high = config.relevance.high_threshold,
        low = config.relevance.low_threshold,
        grace_secs = config.nudge.default_grace_secs,
        state_dir = %store.dir().display(),
        oracle = oracle_config.is_usable(),
        "starting focus guard"
    );

    let handle = controller::start(ControllerDeps {
        config,
        oracle_config,
        store,
        extractor: snapshots.clone(),
        display: queue.clone(),
        indicator: badge.clone(),
    })
    .await;

    let app = api::router(AppState {
        controller: handle,
        queue,
        snapshots,
        badge,
    })
    .merge(metrics.router());

    let bind = std::env::var("FOCUS_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
