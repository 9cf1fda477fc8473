//! Multi-view cross-consistency validation
//!
//! Active for submissions with two or more images. Enforces that the
//! views are distinct photographs (pairwise perceptual-hash distance)
//! yet depict one related subject (sequential keypoint match ratio),
//! and produces the representative embedding used for vector dedup.

use crate::extractors::KeypointMatcher;
use crate::models::{ImageSignals, Thresholds};
use crate::services::hash_deduplicator::hamming_distance;

/// Successful multi-view validation.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiViewOutcome {
    /// Per-dimension arithmetic mean of the view embeddings
    pub aggregate_embedding: Vec<f32>,
    /// Average keypoint match ratio across consecutive pairs;
    /// `None` when the matcher capability is unavailable (soft metric,
    /// reported but not enforced)
    pub avg_match_ratio: Option<f32>,
}

/// Multi-view rejection with the evidence that triggered it.
#[derive(Debug, Clone, PartialEq)]
pub enum MultiViewRejection {
    /// Two views are near-identical captures
    TooSimilar {
        first: usize,
        second: usize,
        distance: u32,
    },
    /// Views do not appear to depict the same subject
    Unrelated { avg_match_ratio: f32 },
}

/// Cross-view validator.
pub struct MultiViewValidator;

impl MultiViewValidator {
    /// Validate a multi-image submission.
    ///
    /// `images` and `signals` are parallel slices in submission order;
    /// callers only invoke this with two or more views.
    pub fn validate(
        images: &[Vec<u8>],
        signals: &[ImageSignals],
        matcher: &dyn KeypointMatcher,
        thresholds: &Thresholds,
    ) -> Result<MultiViewOutcome, MultiViewRejection> {
        debug_assert!(signals.len() >= 2);
        debug_assert_eq!(images.len(), signals.len());

        // (a) Pairwise distinctness: views must not duplicate each other
        for i in 0..signals.len() {
            for j in (i + 1)..signals.len() {
                let distance = hamming_distance(signals[i].phash, signals[j].phash);
                if distance <= thresholds.phash_max_hamming {
                    tracing::info!(
                        first = i,
                        second = j,
                        distance,
                        "Multi-view rejection: views too similar"
                    );
                    return Err(MultiViewRejection::TooSimilar {
                        first: i,
                        second: j,
                        distance,
                    });
                }
            }
        }

        // (b) Sequential relatedness via the keypoint matcher capability
        let avg_match_ratio = match sequential_match_ratio(images, matcher) {
            Some(avg) => {
                if avg < thresholds.multi_view_min_match_ratio {
                    tracing::info!(
                        avg_match_ratio = avg,
                        "Multi-view rejection: unrelated views"
                    );
                    return Err(MultiViewRejection::Unrelated {
                        avg_match_ratio: avg,
                    });
                }
                Some(avg)
            }
            None => {
                tracing::warn!(
                    "Keypoint matcher unavailable; relatedness degraded to soft metric"
                );
                None
            }
        };

        Ok(MultiViewOutcome {
            aggregate_embedding: aggregate_embedding(signals),
            avg_match_ratio,
        })
    }
}

/// Average match ratio across consecutive pairs, or `None` when the
/// matcher reports itself unavailable.
fn sequential_match_ratio(images: &[Vec<u8>], matcher: &dyn KeypointMatcher) -> Option<f32> {
    let mut ratios = Vec::with_capacity(images.len() - 1);
    for pair in images.windows(2) {
        match matcher.match_ratio(&pair[0], &pair[1]) {
            Ok(ratio) => ratios.push(ratio),
            Err(_) => return None,
        }
    }
    Some(ratios.iter().sum::<f32>() / ratios.len() as f32)
}

/// Per-dimension arithmetic mean across view embeddings. Order-independent.
pub fn aggregate_embedding(signals: &[ImageSignals]) -> Vec<f32> {
    let dim = signals[0].embedding.len();
    let mut mean = vec![0.0f32; dim];
    for s in signals {
        debug_assert_eq!(s.embedding.len(), dim);
        for (acc, value) in mean.iter_mut().zip(&s.embedding) {
            *acc += value;
        }
    }
    let count = signals.len() as f32;
    for value in &mut mean {
        *value /= count;
    }
    mean
}
