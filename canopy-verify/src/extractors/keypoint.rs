//! Keypoint matching capability
//!
//! Cross-view relatedness uses a keypoint match good-ratio between two
//! images. The capability is optional: native feature matchers are not
//! always deployable, and an absent matcher must degrade multi-view
//! relatedness to a reported soft metric, never silently alter pass/fail.

use thiserror::Error;

/// The matcher capability is not present in this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("keypoint matcher unavailable")]
pub struct MatcherUnavailable;

/// Symmetric keypoint match good-ratio between two images.
///
/// The ratio is in [0, 1]: the fraction of matched keypoints whose
/// descriptor distance falls under the matcher's own quality cutoff.
pub trait KeypointMatcher: Send + Sync {
    fn match_ratio(&self, image_a: &[u8], image_b: &[u8]) -> Result<f32, MatcherUnavailable>;
}

/// Always-absent matcher, used when no native matcher is configured.
pub struct UnavailableMatcher;

impl KeypointMatcher for UnavailableMatcher {
    fn match_ratio(&self, _image_a: &[u8], _image_b: &[u8]) -> Result<f32, MatcherUnavailable> {
        Err(MatcherUnavailable)
    }
}
