//! Decision services
//!
//! The duplicate detectors, the cluster density gate, the per-cell
//! admission lock, and the orchestrator that sequences them.

pub mod cell_lock;
pub mod cluster_gate;
pub mod decision_orchestrator;
pub mod hash_deduplicator;
pub mod vector_deduplicator;

pub use cell_lock::{CellContention, CellLockRegistry};
pub use cluster_gate::{ClusterCheck, ClusterDensityGate};
pub use decision_orchestrator::{DecisionOrchestrator, PipelineError};
pub use hash_deduplicator::{HashCheck, HashDeduplicator};
pub use vector_deduplicator::{VectorCheck, VectorDeduplicator};
