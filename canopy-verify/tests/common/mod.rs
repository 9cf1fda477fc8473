//! Shared helpers for integration tests

// Each integration test binary compiles this module separately and uses
// a different subset of it
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;

use canopy_verify::config::ServiceConfig;
use canopy_verify::db::{NeighborRepository, SqliteNeighborRepository};
use canopy_verify::extractors::{
    KeypointMatcher, MatcherUnavailable, SignalError, SignalProvider, UnavailableMatcher,
};
use canopy_verify::models::{ImageSignals, Thresholds};
use canopy_verify::services::DecisionOrchestrator;
use canopy_verify::AppState;

/// Provider that maps the first image byte to a row of prepared signals.
pub struct TableProvider {
    pub rows: Vec<ImageSignals>,
}

impl SignalProvider for TableProvider {
    fn extract(&self, image: &[u8]) -> Result<ImageSignals, SignalError> {
        let index = *image.first().unwrap_or(&0) as usize;
        self.rows
            .get(index)
            .cloned()
            .ok_or_else(|| SignalError::DecodeFailed("no signals for test image".to_string()))
    }
}

/// Matcher returning a fixed ratio for every pair.
pub struct FixedMatcher(pub f32);

impl KeypointMatcher for FixedMatcher {
    fn match_ratio(&self, _a: &[u8], _b: &[u8]) -> Result<f32, MatcherUnavailable> {
        Ok(self.0)
    }
}

/// Signals that sail through every content gate.
pub fn good_signals(phash: u64, embedding: Vec<f32>) -> ImageSignals {
    ImageSignals {
        embedding,
        tree_prob: 0.9,
        tree_margin: 0.3,
        vegetation_ratio: 0.6,
        blur_score: 0.5,
        skin_ratio: 0.0,
        face_area_frac: 0.0,
        phash,
        width: 640,
        height: 480,
    }
}

/// In-memory SQLite neighbor repository with migrated tables.
///
/// Single connection so every query sees the same in-memory database.
pub async fn memory_repo() -> Arc<SqliteNeighborRepository> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    canopy_verify::db::init_tables(&pool).await.unwrap();
    Arc::new(SqliteNeighborRepository::new(pool))
}

/// Orchestrator over a signal table, with defaults everywhere else.
pub fn table_orchestrator(
    rows: Vec<ImageSignals>,
    repository: Option<Arc<dyn NeighborRepository>>,
) -> DecisionOrchestrator {
    DecisionOrchestrator::new(
        Thresholds::default(),
        Arc::new(TableProvider { rows }),
        Arc::new(UnavailableMatcher),
        repository,
        Duration::from_millis(1000),
    )
}

/// App state over a signal table for router tests.
pub fn table_app_state(
    rows: Vec<ImageSignals>,
    repository: Option<Arc<dyn NeighborRepository>>,
) -> AppState {
    let config = ServiceConfig::default();
    let orchestrator = Arc::new(DecisionOrchestrator::new(
        config.thresholds.clone(),
        Arc::new(TableProvider { rows }),
        Arc::new(UnavailableMatcher),
        repository,
        Duration::from_millis(config.cell_lock_wait_ms),
    ));
    AppState::new(orchestrator, config)
}

/// One part of a multipart body.
pub enum Part<'a> {
    /// (field name, filename, content type, bytes)
    File(&'a str, &'a str, &'a str, &'a [u8]),
    /// (field name, value)
    Text(&'a str, &'a str),
}

const BOUNDARY: &str = "canopy-test-boundary";

/// Build a multipart/form-data request for the verify endpoints.
pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();

    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File(name, filename, content_type, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}
