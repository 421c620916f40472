//! Admin HTTP API.

pub mod error;
mod health;
pub mod state;
mod tasks;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use health::HealthResponse;
pub use state::AppState;
pub use tasks::{KillResponse, ScheduleRequest, ScheduleResponse};

/// Create the admin router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .nest("/v1", tasks::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
