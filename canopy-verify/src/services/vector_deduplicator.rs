//! Embedding-similarity deduplication
//!
//! Second dedup tier: catches recaptures that defeat the perceptual hash
//! (new angle, different crop) through learned visual similarity.

use canopy_common::{Error, Result};
use uuid::Uuid;

use crate::models::NeighborRecord;

/// Cosine similarity between two equal-length vectors.
///
/// Callers validate inputs first; on zero-norm input this returns 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Vector deduplication result.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorCheck {
    /// No neighbor at or above the similarity threshold; the maximum
    /// observed similarity is reported as a near-miss metric
    Unique { max_cosine: Option<f32> },
    /// Learned-similarity duplicate
    Duplicate { id: Uuid, cosine: f32 },
}

/// Vector deduplicator.
pub struct VectorDeduplicator;

impl VectorDeduplicator {
    /// Compare the candidate embedding against every neighbor embedding.
    ///
    /// Zero-dimension or non-finite embeddings — candidate or stored —
    /// are a hard input-validation error, never silently skipped.
    /// Tie-break mirrors the hash deduplicator: highest similarity, then
    /// lexicographically smallest neighbor id.
    pub fn check(
        &self,
        embedding: &[f32],
        neighbors: &[NeighborRecord],
        min_cosine: f32,
    ) -> Result<VectorCheck> {
        validate_embedding(embedding, "candidate")?;

        let mut best: Option<(f32, Uuid)> = None;

        for neighbor in neighbors {
            let Some(stored) = &neighbor.embedding else {
                continue;
            };
            validate_embedding(stored, "stored")?;
            if stored.len() != embedding.len() {
                return Err(Error::InvalidInput(format!(
                    "stored embedding dimension {} does not match candidate dimension {} (record {})",
                    stored.len(),
                    embedding.len(),
                    neighbor.id
                )));
            }

            let cosine = cosine_similarity(embedding, stored);

            let better = match &best {
                None => true,
                Some((best_cosine, best_id)) => {
                    cosine > *best_cosine
                        || (cosine == *best_cosine
                            && neighbor.id.to_string() < best_id.to_string())
                }
            };
            if better {
                best = Some((cosine, neighbor.id));
            }
        }

        Ok(match best {
            Some((cosine, id)) if cosine >= min_cosine => {
                tracing::info!(
                    duplicate_of = %id,
                    cosine,
                    "Duplicate detected by visual similarity"
                );
                VectorCheck::Duplicate { id, cosine }
            }
            Some((cosine, _)) => VectorCheck::Unique {
                max_cosine: Some(cosine),
            },
            None => VectorCheck::Unique { max_cosine: None },
        })
    }
}

/// Hard validation for embeddings entering similarity comparison.
fn validate_embedding(embedding: &[f32], role: &str) -> Result<()> {
    if embedding.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{} embedding has zero dimensions",
            role
        )));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidInput(format!(
            "{} embedding contains non-finite values",
            role
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor(id: Uuid, embedding: Option<Vec<f32>>) -> NeighborRecord {
        NeighborRecord {
            id,
            lat: 0.0,
            lon: 0.0,
            phash: None,
            embedding,
        }
    }

    #[test]
    fn cosine_self_similarity_is_one() {
        let v = vec![0.3, -0.5, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_symmetric() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-2.0, 0.5, 1.0];
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_is_minus_one() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_neighbor_set_unique() {
        let result = VectorDeduplicator
            .check(&[1.0, 0.0], &[], 0.95)
            .unwrap();
        assert_eq!(result, VectorCheck::Unique { max_cosine: None });
    }

    #[test]
    fn similarity_at_threshold_is_duplicate() {
        let id = Uuid::new_v4();
        let neighbors = vec![neighbor(id, Some(vec![1.0, 0.0]))];
        let result = VectorDeduplicator
            .check(&[1.0, 0.0], &neighbors, 0.95)
            .unwrap();
        match result {
            VectorCheck::Duplicate { id: matched, cosine } => {
                assert_eq!(matched, id);
                assert!((cosine - 1.0).abs() < 1e-6);
            }
            other => panic!("Expected Duplicate, got {:?}", other),
        }
    }

    #[test]
    fn near_miss_reported_on_unique() {
        // cos = 0.8 against threshold 0.95
        let neighbors = vec![neighbor(Uuid::new_v4(), Some(vec![0.8, 0.6]))];
        let result = VectorDeduplicator
            .check(&[1.0, 0.0], &neighbors, 0.95)
            .unwrap();
        match result {
            VectorCheck::Unique { max_cosine: Some(c) } => {
                assert!((c - 0.8).abs() < 1e-5)
            }
            other => panic!("Expected Unique with near-miss, got {:?}", other),
        }
    }

    #[test]
    fn missing_embeddings_skipped() {
        let neighbors = vec![neighbor(Uuid::new_v4(), None)];
        let result = VectorDeduplicator
            .check(&[1.0, 0.0], &neighbors, 0.5)
            .unwrap();
        assert_eq!(result, VectorCheck::Unique { max_cosine: None });
    }

    #[test]
    fn zero_dimension_candidate_is_hard_error() {
        let result = VectorDeduplicator.check(&[], &[], 0.95);
        assert!(result.is_err());
    }

    #[test]
    fn non_finite_candidate_is_hard_error() {
        let result = VectorDeduplicator.check(&[1.0, f32::NAN], &[], 0.95);
        assert!(result.is_err());
    }

    #[test]
    fn non_finite_stored_is_hard_error() {
        let neighbors = vec![neighbor(Uuid::new_v4(), Some(vec![f32::INFINITY, 0.0]))];
        let result = VectorDeduplicator.check(&[1.0, 0.0], &neighbors, 0.95);
        assert!(result.is_err());
    }

    #[test]
    fn dimension_mismatch_is_hard_error() {
        let neighbors = vec![neighbor(Uuid::new_v4(), Some(vec![1.0, 0.0, 0.0]))];
        let result = VectorDeduplicator.check(&[1.0, 0.0], &neighbors, 0.95);
        assert!(result.is_err());
    }

    #[test]
    fn highest_similarity_wins() {
        let close = Uuid::new_v4();
        let far = Uuid::new_v4();
        let neighbors = vec![
            neighbor(far, Some(vec![0.0, 1.0])),
            neighbor(close, Some(vec![1.0, 0.1])),
        ];
        let result = VectorDeduplicator
            .check(&[1.0, 0.0], &neighbors, 0.9)
            .unwrap();
        match result {
            VectorCheck::Duplicate { id, .. } => assert_eq!(id, close),
            other => panic!("Expected Duplicate, got {:?}", other),
        }
    }
}
