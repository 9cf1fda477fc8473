//! Cluster density gate
//!
//! Suspiciously dense clusters of accepted claims around one location go
//! to human review instead of automated dedup. Flagging supersedes the
//! hash and vector deduplicators entirely: the orchestrator must not run
//! them for a flagged submission.

/// Cluster density check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterCheck {
    /// Area below the density limit; dedup proceeds
    Within { count: usize },
    /// Too many accepted records in the radius; route to human review
    Saturated { count: usize },
}

/// Neighbor-count density gate. Independent of the dedup comparisons.
pub struct ClusterDensityGate;

impl ClusterDensityGate {
    /// Saturated iff the neighbor count strictly exceeds the limit.
    pub fn check(&self, neighbor_count: usize, max_in_radius: usize) -> ClusterCheck {
        if neighbor_count > max_in_radius {
            tracing::info!(
                neighbor_count,
                max_in_radius,
                "Dense cluster detected; flagging for review"
            );
            ClusterCheck::Saturated {
                count: neighbor_count,
            }
        } else {
            ClusterCheck::Within {
                count: neighbor_count,
            }
        }
    }
}
