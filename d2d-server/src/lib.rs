//! d2d-server library
//!
//! Collection-bin photo intake and review service: submissions are uploaded
//! to the media host, labelled by the configured classifiers and stored;
//! the dashboard pages through stored records.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod pagination;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use services::Ingestor;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Submission pipeline (media host + classifiers)
    pub ingestor: Arc<Ingestor>,
    /// Request body limit for submissions
    pub max_upload_bytes: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, ingestor: Arc<Ingestor>, max_upload_bytes: usize) -> Self {
        Self {
            db,
            ingestor,
            max_upload_bytes,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    let api_routes = Router::new()
        .route(
            "/api/submitCleaningData",
            post(api::submit_cleaning_data).layer(upload_limit),
        )
        .route("/api/collection-data", get(api::get_collection_data));

    Router::new()
        .merge(api_routes)
        .merge(api::ui_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
