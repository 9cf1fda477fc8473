//! Signal extraction capabilities
//!
//! The decision pipeline consumes two external capabilities: a
//! `SignalProvider` that turns raw image bytes into per-image signals,
//! and an optional `KeypointMatcher` used by multi-view validation.
//! Both are injected into the orchestrator as trait objects so tests and
//! deployments can swap implementations.

pub mod encoder;
pub mod keypoint;
pub mod signal_provider;

pub use encoder::{HistogramEncoder, ImageEncoder};
pub use keypoint::{KeypointMatcher, MatcherUnavailable, UnavailableMatcher};
pub use signal_provider::DefaultSignalProvider;

use thiserror::Error;

use crate::models::ImageSignals;

/// Errors from signal extraction.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The submitted bytes do not decode as an image
    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    /// The embedding model could not be initialized or invoked
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Any other extraction failure
    #[error("Signal extraction failed: {0}")]
    Internal(String),
}

/// Per-image signal extraction capability.
///
/// Implementations must be pure with respect to their input bytes:
/// identical bytes yield identical signals.
pub trait SignalProvider: Send + Sync {
    fn extract(&self, image: &[u8]) -> Result<ImageSignals, SignalError>;
}
