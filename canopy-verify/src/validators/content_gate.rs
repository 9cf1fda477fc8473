//! Content classifier gate
//!
//! Fuses the classifier and pixel-statistic signals into a single
//! accept/reject with full reason enumeration. A pure deterministic
//! function of (signals, thresholds): identical inputs yield the
//! identical decision and reason set.

use crate::models::{ImageSignals, RejectReason, Thresholds};

/// Outcome of the content gate for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentAssessment {
    /// Non-gating fused observability score
    pub score: f32,
    /// Every violated condition, in evaluation order; empty means accepted
    pub violations: Vec<RejectReason>,
}

impl ContentAssessment {
    pub fn accepted(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Classifier-signal fusion gate.
pub struct ContentClassifierGate;

impl ContentClassifierGate {
    /// Evaluate one image's signals against the thresholds.
    ///
    /// A dominant face short-circuits before the classifier conditions
    /// are considered; otherwise every violated condition is reported,
    /// not just the first.
    pub fn evaluate(signals: &ImageSignals, thresholds: &Thresholds) -> ContentAssessment {
        let score = fused_score(signals);

        // Dominant face: reject before looking at classifier probability
        if signals.face_area_frac > thresholds.max_face_area_frac {
            return ContentAssessment {
                score,
                violations: vec![RejectReason::FaceDetected],
            };
        }

        let mut violations = Vec::new();

        if signals.tree_prob < thresholds.tree_confidence_min {
            violations.push(RejectReason::LowTreeProb);
        }
        if signals.vegetation_ratio < thresholds.min_vegetation_ratio {
            violations.push(RejectReason::LowVegetation);
        }
        if signals.tree_margin < thresholds.min_clip_margin {
            violations.push(RejectReason::LowClipMargin);
        }
        if signals.skin_ratio >= thresholds.max_skin_ratio {
            violations.push(RejectReason::SkinDetected);
        }
        if signals.face_area_frac >= thresholds.max_face_area_frac {
            violations.push(RejectReason::FaceDetected);
        }

        ContentAssessment { score, violations }
    }
}

/// Fused observability score: 0.7·tree_prob + 0.2·min(1, vegetation·2)
/// + 0.1·max(0, margin). Reported in metrics, never gated on.
fn fused_score(signals: &ImageSignals) -> f32 {
    0.7 * signals.tree_prob
        + 0.2 * (signals.vegetation_ratio * 2.0).min(1.0)
        + 0.1 * signals.tree_margin.max(0.0)
}
