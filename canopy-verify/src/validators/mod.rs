//! Validation layer
//!
//! Per-image gates (quality, content classification) and the cross-view
//! validator for multi-image submissions.

pub mod content_gate;
pub mod multi_view;
pub mod quality_gate;

pub use content_gate::{ContentAssessment, ContentClassifierGate};
pub use multi_view::{MultiViewOutcome, MultiViewRejection, MultiViewValidator};
pub use quality_gate::QualityGate;
