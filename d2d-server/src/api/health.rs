//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    /// Short git hash the binary was built from
    pub build: String,
    pub uptime_seconds: u64,
    /// Number of classifier models submissions fan out to
    pub classifiers: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "d2d-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: env!("D2D_GIT_HASH").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        classifiers: state.ingestor.classifier_count(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
