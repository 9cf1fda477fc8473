//! Perceptual-hash deduplication
//!
//! Compares candidate phashes pairwise against the geofenced neighbor
//! set. Any neighbor within the Hamming threshold rejects the submission
//! as a near-identical recapture.

use uuid::Uuid;

use crate::models::NeighborRecord;

/// Hamming distance between two 64-bit perceptual hashes (XOR popcount).
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Hash deduplication result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashCheck {
    /// No neighbor within the Hamming threshold; the closest observed
    /// distance is reported as a near-miss metric when neighbors exist
    Unique { min_distance: Option<u32> },
    /// Near-identical capture already admitted
    Duplicate { id: Uuid, distance: u32 },
}

/// Hash deduplicator.
pub struct HashDeduplicator;

impl HashDeduplicator {
    /// Check every candidate phash against every neighbor phash.
    ///
    /// Match selection is deterministic regardless of neighbor ordering:
    /// smallest distance wins, ties broken by the lexicographically
    /// smallest neighbor id.
    pub fn check(
        &self,
        candidate_phashes: &[u64],
        neighbors: &[NeighborRecord],
        max_hamming: u32,
    ) -> HashCheck {
        let mut best: Option<(u32, Uuid)> = None;

        for candidate in candidate_phashes {
            for neighbor in neighbors {
                let Some(neighbor_phash) = neighbor.phash else {
                    continue;
                };
                let distance = hamming_distance(*candidate, neighbor_phash);

                let closer = match &best {
                    None => true,
                    Some((best_distance, best_id)) => {
                        distance < *best_distance
                            || (distance == *best_distance
                                && neighbor.id.to_string() < best_id.to_string())
                    }
                };
                if closer {
                    best = Some((distance, neighbor.id));
                }
            }
        }

        match best {
            Some((distance, id)) if distance <= max_hamming => {
                tracing::info!(
                    duplicate_of = %id,
                    distance,
                    "Duplicate detected by perceptual hash"
                );
                HashCheck::Duplicate { id, distance }
            }
            Some((distance, _)) => HashCheck::Unique {
                min_distance: Some(distance),
            },
            None => HashCheck::Unique { min_distance: None },
        }
    }
}
