//! canopy-verify library interface
//!
//! Exposes the decision pipeline and router for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod models;
pub mod services;
pub mod utils;
pub mod validators;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::models::Thresholds;
use crate::services::DecisionOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// The decision pipeline
    pub orchestrator: Arc<DecisionOrchestrator>,
    /// Resolved service configuration
    pub config: Arc<ServiceConfig>,
    /// Thresholds snapshot exposed on GET /config
    pub thresholds: Thresholds,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<DecisionOrchestrator>, config: ServiceConfig) -> Self {
        let thresholds = config.thresholds.clone();
        Self {
            orchestrator,
            config: Arc::new(config),
            thresholds,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    // Multipart bodies carry the image plus form fields; leave headroom
    // over the per-image cap
    let body_limit = state.config.max_image_bytes.saturating_mul(8).max(1024);

    Router::new()
        .merge(api::verify_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
