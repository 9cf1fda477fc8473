//! Core data model for the verification pipeline
//!
//! Immutable per-image signals, the threshold set loaded once per process,
//! neighbor records owned by the repository, and the terminal Decision.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Width of the perceptual hash in bits.
pub const PHASH_BITS: u32 = 64;

/// Render a 64-bit perceptual hash as a 16-character hex string.
pub fn phash_to_hex(phash: u64) -> String {
    format!("{:016x}", phash)
}

/// Parse a 16-character hex perceptual hash.
pub fn phash_from_hex(s: &str) -> Option<u64> {
    if s.len() != 16 {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}

/// Per-image signals produced by the signal provider.
///
/// Immutable once extracted; every gate reads from this snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSignals {
    /// Fixed-dimension embedding vector for similarity search
    pub embedding: Vec<f32>,
    /// Tree-likelihood pseudo-probability in [0, 1]
    pub tree_prob: f32,
    /// Signed margin of the positive reference over the negatives
    pub tree_margin: f32,
    /// Fraction of green-dominant pixels in [0, 1]
    pub vegetation_ratio: f32,
    /// High-frequency energy ratio of the spectrum, >= 0
    pub blur_score: f32,
    /// Fraction of skin-tone pixels in [0, 1]
    pub skin_ratio: f32,
    /// Area fraction of the largest skin region in [0, 1]
    pub face_area_frac: f32,
    /// 64-bit perceptual hash
    pub phash: u64,
    pub width: u32,
    pub height: u32,
}

/// Decision thresholds, loaded once per process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Max Hamming distance at which two phashes count as duplicates
    pub phash_max_hamming: u32,
    /// Min cosine similarity at which two embeddings count as duplicates
    pub vector_min_cosine: f32,
    /// Min tree-likelihood to accept an image
    pub tree_confidence_min: f32,
    /// Min blur score (high-frequency energy ratio)
    pub min_blur: f32,
    /// Min vegetation ratio
    pub min_vegetation_ratio: f32,
    /// Min classifier margin over the negative references
    pub min_clip_margin: f32,
    /// Max tolerated skin-tone pixel ratio
    pub max_skin_ratio: f32,
    /// Max tolerated face area fraction
    pub max_face_area_frac: f32,
    /// Max accepted records inside the query radius before flagging
    pub cluster_max_in_radius: usize,
    /// Geofence radius for neighbor queries, meters
    pub radius_meters: f64,
    /// Min average keypoint match ratio across consecutive views
    pub multi_view_min_match_ratio: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            phash_max_hamming: 5,
            vector_min_cosine: 0.95,
            tree_confidence_min: 0.5,
            min_blur: 0.25,
            min_vegetation_ratio: 0.15,
            min_clip_margin: 0.02,
            max_skin_ratio: 0.4,
            max_face_area_frac: 0.1,
            cluster_max_in_radius: 5,
            radius_meters: 20.0,
            multi_view_min_match_ratio: 0.05,
        }
    }
}

/// A previously admitted record, as returned by the neighbor repository.
/// Read-only to the decision pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborRecord {
    pub id: Uuid,
    pub lat: f64,
    pub lon: f64,
    pub phash: Option<u64>,
    pub embedding: Option<Vec<f32>>,
}

/// A request-scoped submission: ordered, non-empty image set plus location.
#[derive(Debug, Clone)]
pub struct Submission {
    pub images: Vec<Vec<u8>>,
    pub lat: f64,
    pub lon: f64,
}

/// Machine-readable rejection reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TooSmall,
    BlurLow,
    FaceDetected,
    LowTreeProb,
    LowVegetation,
    LowClipMargin,
    SkinDetected,
    DuplicateByHash,
    DuplicateBySimilarity,
    ViewsTooSimilar,
    UnrelatedViews,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::TooSmall => "too_small",
            RejectReason::BlurLow => "blur_low",
            RejectReason::FaceDetected => "face_detected",
            RejectReason::LowTreeProb => "low_tree_prob",
            RejectReason::LowVegetation => "low_vegetation",
            RejectReason::LowClipMargin => "low_clip_margin",
            RejectReason::SkinDetected => "skin_detected",
            RejectReason::DuplicateByHash => "duplicate_by_hash",
            RejectReason::DuplicateBySimilarity => "duplicate_by_similarity",
            RejectReason::ViewsTooSimilar => "views_too_similar",
            RejectReason::UnrelatedViews => "unrelated_views",
        }
    }

    /// Whether this reason comes from the per-image content stage
    /// (quality + classifier gates). Content rejections map to a distinct
    /// HTTP status from validation errors and from dedup rejections.
    pub fn is_content(&self) -> bool {
        matches!(
            self,
            RejectReason::TooSmall
                | RejectReason::BlurLow
                | RejectReason::FaceDetected
                | RejectReason::LowTreeProb
                | RejectReason::LowVegetation
                | RejectReason::LowClipMargin
                | RejectReason::SkinDetected
        )
    }
}

/// Reason attached to a flagged decision.
pub const REASON_DENSE_CLUSTER: &str = "dense_cluster";

/// Metrics reported alongside a decision.
pub type Metrics = serde_json::Map<String, serde_json::Value>;

/// Artifacts of a passed submission, echoed to the caller so downstream
/// systems can persist or audit them.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Artifacts {
    /// Hex phash per submitted view, in submission order
    pub phashes: Vec<String>,
    /// Representative embedding (per-dimension mean across views)
    pub embedding: Vec<f32>,
}

/// Terminal decision for one submission. Produced exactly once by the
/// orchestrator; serialized to the documented response shape only at the
/// API boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Passed {
        score: f32,
        metrics: Metrics,
        artifacts: Artifacts,
    },
    Rejected {
        /// All violated conditions; the first entry is the surfaced reason
        reasons: Vec<RejectReason>,
        duplicate_of: Option<Uuid>,
        metrics: Metrics,
    },
    Flagged {
        reason: &'static str,
        metrics: Metrics,
    },
}

impl Decision {
    pub fn status(&self) -> DecisionStatus {
        match self {
            Decision::Passed { .. } => DecisionStatus::Passed,
            Decision::Rejected { .. } => DecisionStatus::Rejected,
            Decision::Flagged { .. } => DecisionStatus::Flagged,
        }
    }

    /// True for rejections produced by the per-image content stage.
    pub fn is_content_rejection(&self) -> bool {
        match self {
            Decision::Rejected { reasons, .. } => {
                reasons.first().map(|r| r.is_content()).unwrap_or(false)
            }
            _ => false,
        }
    }
}

/// Decision status as exposed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Passed,
    Rejected,
    Flagged,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Passed => "PASSED",
            DecisionStatus::Rejected => "REJECTED",
            DecisionStatus::Flagged => "FLAGGED",
        }
    }
}

/// Decision plus the degraded marker for the whole submission.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionReport {
    pub decision: Decision,
    pub degraded: bool,
}
