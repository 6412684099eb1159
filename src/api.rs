use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::controller::{ControllerHandle, NavigationEvent, SnapshotCache};
use crate::decision::Mode;
use crate::notify::{BadgeState, Notification, NotificationQueue, SharedBadge};
use crate::profile::PageSnapshot;
use crate::session::{Settings, SettingsUpdate, StateView, TabId};

#[derive(Clone)]
pub struct AppState {
    pub controller: ControllerHandle,
    pub queue: Arc<NotificationQueue>,
    pub snapshots: Arc<SnapshotCache>,
    pub badge: Arc<SharedBadge>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn unavailable(e: anyhow::Error) -> (StatusCode, String) {
    tracing::warn!(target: "api", "controller unavailable: {e:#}");
    (StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}"))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/state", get(get_state))
        .route("/session/activate", post(activate))
        .route("/session/deactivate", post(deactivate))
        .route("/navigation", post(navigation))
        .route("/return", post(user_returned))
        .route("/settings", put(update_settings))
        .route("/settings/oracle-key", post(save_oracle_key))
        .route("/notifications/{tab_id}", get(drain_notifications))
        .route("/badge", get(badge))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivateReq {
    mode: Mode,
    tab_id: TabId,
    url: String,
    #[serde(default)]
    snapshot: Option<PageSnapshot>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReturnReq {
    tab_id: TabId,
}

#[derive(Serialize)]
struct ReturnResp {
    returned: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OracleKeyReq {
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OracleKeyResp {
    oracle_configured: bool,
}

async fn get_state(State(state): State<AppState>) -> ApiResult<StateView> {
    state.controller.state().await.map(Json).map_err(unavailable)
}

async fn activate(State(state): State<AppState>, Json(body): Json<ActivateReq>) -> ApiResult<StateView> {
    if let Some(s) = &body.snapshot {
        state.snapshots.push(body.tab_id, s);
    }
    state
        .controller
        .activate(body.mode, body.tab_id, body.url, body.snapshot)
        .await
        .map(Json)
        .map_err(unavailable)
}

async fn deactivate(State(state): State<AppState>) -> ApiResult<StateView> {
    state.controller.deactivate().await.map(Json).map_err(unavailable)
}

async fn navigation(
    State(state): State<AppState>,
    Json(nav): Json<NavigationEvent>,
) -> Result<StatusCode, (StatusCode, String)> {
    // The tab's previous page is never served for this one.
    match &nav.snapshot {
        Some(s) => state.snapshots.push(nav.tab_id, s),
        None => state.snapshots.forget(nav.tab_id),
    }
    state.controller.navigate(nav).map_err(unavailable)?;
    Ok(StatusCode::ACCEPTED)
}

async fn user_returned(State(state): State<AppState>, Json(body): Json<ReturnReq>) -> ApiResult<ReturnResp> {
    state
        .controller
        .user_returned(body.tab_id)
        .await
        .map(|returned| Json(ReturnResp { returned }))
        .map_err(unavailable)
}

async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<Settings> {
    state
        .controller
        .update_settings(update)
        .await
        .map(Json)
        .map_err(unavailable)
}

async fn save_oracle_key(
    State(state): State<AppState>,
    Json(body): Json<OracleKeyReq>,
) -> ApiResult<OracleKeyResp> {
    state
        .controller
        .save_oracle_key(body.api_key)
        .await
        .map(|oracle_configured| Json(OracleKeyResp { oracle_configured }))
        .map_err(unavailable)
}

async fn drain_notifications(
    State(state): State<AppState>,
    Path(tab_id): Path<TabId>,
) -> Json<Vec<Notification>> {
    Json(state.queue.drain(tab_id))
}

async fn badge(State(state): State<AppState>) -> Json<Option<BadgeState>> {
    Json(state.badge.current())
}
