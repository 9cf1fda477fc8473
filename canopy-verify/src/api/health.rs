//! Health and configuration endpoints

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::models::Thresholds;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service is up and answering
    pub ok: bool,
    /// Running without the neighbor store (content checks only)
    pub degraded: bool,
    /// Module name ("canopy-verify")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    Json(HealthResponse {
        ok: true,
        degraded: !state.orchestrator.repository_configured(),
        module: "canopy-verify".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
    })
}

/// Configuration response. Exposes the decision thresholds and store
/// connectivity — never store paths or credentials.
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    #[serde(flatten)]
    pub thresholds: Thresholds,
    pub db_connected: bool,
}

/// GET /config
pub async fn config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        thresholds: state.thresholds.clone(),
        db_connected: state.orchestrator.repository_configured(),
    })
}

/// Build health and config routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/config", get(config))
}
