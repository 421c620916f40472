//! Liveness endpoint.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::api::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Always "ok" while the process serves requests.
    pub status: String,

    pub service: String,

    pub version: String,

    /// Current timestamp (RFC 3339).
    pub timestamp: String,

    /// Framework id, once registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_id: Option<String>,

    /// Whether an event stream session is open.
    pub connected: bool,

    /// Heartbeat interval of the open session, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_secs: Option<f64>,

    pub task_count: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = state.engine();
    let framework_id = engine.framework_id().await.map(|id| id.value().to_string());
    let connected = engine.stream_id().await.is_some();
    let heartbeat_interval_secs = engine
        .heartbeat_interval()
        .await
        .map(|interval| interval.as_secs_f64());
    let task_count = engine.tasks_snapshot().await.len();

    Json(HealthResponse {
        status: "ok".to_string(),
        service: "corral-scheduler".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        framework_id,
        connected,
        heartbeat_interval_secs,
        task_count,
    })
}
