//! Task endpoints.
//!
//! - `GET /v1/tasks`: the task table
//! - `GET /v1/tasks/{id}`: one task
//! - `POST /v1/tasks`: queue a shell command for launch
//! - `DELETE /v1/tasks/{id}`: kill a task

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use corral_proto::TaskStatus;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::engine::KillError;
use crate::state::TaskTable;

#[derive(Debug, Deserialize, Serialize)]
pub struct ScheduleRequest {
    pub cmd: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ScheduleResponse {
    pub scheduled: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct KillResponse {
    pub killing: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(schedule_task))
        .route("/tasks/{task_id}", get(get_task).delete(kill_task))
}

async fn list_tasks(State(state): State<AppState>) -> Json<TaskTable> {
    Json(state.engine().tasks_snapshot().await)
}

async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatus>, ApiError> {
    state
        .engine()
        .task(&task_id)
        .await
        .map(Json)
        .ok_or_else(|| task_not_found(&task_id))
}

async fn schedule_task(
    State(state): State<AppState>,
    body: Result<Json<ScheduleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ScheduleResponse>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request("invalid_request", e.body_text()))?;

    let cmd = request.cmd.trim().to_string();
    if cmd.is_empty() {
        return Err(ApiError::bad_request("invalid_request", "cmd must not be empty"));
    }

    // Waits for room when the queue is full.
    state.commands().enqueue(cmd.clone()).await.map_err(|_| {
        ApiError::service_unavailable("queue_closed", "the scheduler is shutting down")
    })?;

    info!(command = %cmd, "Command queued");
    Ok((StatusCode::ACCEPTED, Json(ScheduleResponse { scheduled: cmd })))
}

async fn kill_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<(StatusCode, Json<KillResponse>), ApiError> {
    match state.engine().kill_task(state.sender(), &task_id).await {
        Ok(status) => Ok((
            StatusCode::ACCEPTED,
            Json(KillResponse {
                killing: status.task_id.value().to_string(),
            }),
        )),
        Err(KillError::UnknownTask(id)) => Err(task_not_found(&id)),
        Err(KillError::Call(e)) => {
            warn!(error = %e, task_id = %task_id, "Kill call failed");
            Err(ApiError::bad_gateway("kill_failed", e.to_string()))
        }
    }
}

fn task_not_found(task_id: &str) -> ApiError {
    ApiError::not_found("task_not_found", format!("no task with id {task_id}"))
}
