//! Verification endpoints
//!
//! `POST /verify-tree` (single image) and `POST /verify-tree-multi`
//! (two or more views). Both accept multipart form data with image
//! file fields plus `latitude` and `longitude` text fields.
//!
//! Malformed requests are validation errors (400), not Decisions.
//! Content-gate rejections use 422; every other decision — duplicate,
//! flagged, passed — returns 200 with the decision body.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{
    Artifacts, Decision, DecisionReport, DecisionStatus, Metrics, RejectReason, Submission,
};
use crate::AppState;

/// Decision response as documented at the public surface.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub status: DecisionStatus,
    pub reason: String,
    /// All violated conditions, when the content stage enumerated several
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<RejectReason>,
    pub metrics: Metrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<Uuid>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Artifacts>,
}

/// POST /verify-tree
pub async fn verify_tree(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let parsed = parse_submission(multipart, state.config.max_image_bytes).await?;
    if parsed.images.len() != 1 {
        return Err(ApiError::BadRequest(
            "Exactly one image field required; use /verify-tree-multi for multiple views"
                .to_string(),
        ));
    }

    let report = state.orchestrator.decide(parsed).await?;
    Ok(decision_response(report))
}

/// POST /verify-tree-multi
pub async fn verify_tree_multi(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let parsed = parse_submission(multipart, state.config.max_image_bytes).await?;
    if parsed.images.len() < 2 {
        return Err(ApiError::BadRequest(
            "At least 2 images required".to_string(),
        ));
    }

    let report = state.orchestrator.decide(parsed).await?;
    Ok(decision_response(report))
}

/// Parse the multipart form into a Submission.
///
/// Accepted fields: `image` / `images` (repeatable file fields, must
/// carry an image/* content type), `latitude`, `longitude`.
async fn parse_submission(mut multipart: Multipart, max_image_bytes: usize) -> ApiResult<Submission> {
    let mut images: Vec<Vec<u8>> = Vec::new();
    let mut latitude: Option<f64> = None;
    let mut longitude: Option<f64> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" | "images" => {
                let content_type = field.content_type().unwrap_or("");
                if !content_type.starts_with("image/") {
                    return Err(ApiError::BadRequest(
                        "Invalid file type; must be an image".to_string(),
                    ));
                }

                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read image data: {}", e)))?;
                if bytes.len() > max_image_bytes {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "Image exceeds {} byte limit",
                        max_image_bytes
                    )));
                }
                images.push(bytes.to_vec());
            }
            "latitude" => {
                latitude = Some(parse_coordinate(field.text().await, "latitude")?);
            }
            "longitude" => {
                longitude = Some(parse_coordinate(field.text().await, "longitude")?);
            }
            _ => {}
        }
    }

    if images.is_empty() {
        return Err(ApiError::BadRequest("No image provided".to_string()));
    }
    let lat = latitude.ok_or_else(|| ApiError::BadRequest("latitude is required".to_string()))?;
    let lon = longitude.ok_or_else(|| ApiError::BadRequest("longitude is required".to_string()))?;

    if !(-90.0..=90.0).contains(&lat) {
        return Err(ApiError::BadRequest(format!(
            "latitude {} outside [-90, 90]",
            lat
        )));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(ApiError::BadRequest(format!(
            "longitude {} outside [-180, 180]",
            lon
        )));
    }

    Ok(Submission { images, lat, lon })
}

fn parse_coordinate(
    text: Result<String, axum::extract::multipart::MultipartError>,
    name: &str,
) -> ApiResult<f64> {
    let raw = text.map_err(|e| ApiError::BadRequest(format!("Failed to read {}: {}", name, e)))?;
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {}: {:?}", name, raw)))?;
    if !value.is_finite() {
        return Err(ApiError::BadRequest(format!(
            "Invalid {}: must be finite",
            name
        )));
    }
    Ok(value)
}

/// Serialize a decision report to the documented wire shape.
///
/// Content-gate rejections respond 422; all other decisions respond 200.
fn decision_response(report: DecisionReport) -> Response {
    let status_code = if report.decision.is_content_rejection() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };

    let DecisionReport { decision, degraded } = report;
    let body = match decision {
        Decision::Passed {
            metrics, artifacts, ..
        } => VerifyResponse {
            status: DecisionStatus::Passed,
            reason: "all_checks_passed".to_string(),
            reasons: Vec::new(),
            metrics,
            duplicate_of: None,
            degraded,
            artifacts: Some(artifacts),
        },
        Decision::Rejected {
            reasons,
            duplicate_of,
            metrics,
        } => VerifyResponse {
            status: DecisionStatus::Rejected,
            reason: reasons
                .first()
                .map(|r| r.as_str().to_string())
                .unwrap_or_default(),
            reasons,
            metrics,
            duplicate_of,
            degraded,
            artifacts: None,
        },
        Decision::Flagged { reason, metrics } => VerifyResponse {
            status: DecisionStatus::Flagged,
            reason: reason.to_string(),
            reasons: Vec::new(),
            metrics,
            duplicate_of: None,
            degraded,
            artifacts: None,
        },
    };

    (status_code, Json(body)).into_response()
}

/// Build verification routes
pub fn verify_routes() -> Router<AppState> {
    Router::new()
        .route("/verify-tree", post(verify_tree))
        .route("/verify-tree-multi", post(verify_tree_multi))
}
