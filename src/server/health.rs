//! Liveness endpoint.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,

    /// Handlers in the frozen router.
    pub handlers: usize,
}

/// Returns 200 with a [`HealthReport`] while the process is up.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let started_at = state.started_at();
    let report = HealthReport {
        status: "ok".to_string(),
        started_at,
        uptime_seconds: (Utc::now() - started_at).num_seconds().max(0),
        handlers: state.router().len(),
    };
    (StatusCode::OK, Json(report))
}
