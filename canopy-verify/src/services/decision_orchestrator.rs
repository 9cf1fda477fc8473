//! Decision orchestrator
//!
//! Sequences the verification gates for one submission, terminal on the
//! first reject/flag:
//!
//! QualityGate → ContentClassifierGate (per image) → MultiViewValidator
//! (if multi) → ClusterDensityGate → HashDeduplicator → VectorDeduplicator
//! → admit
//!
//! The read-neighbors → decide → admit sequence runs under an exclusive
//! per-cell lock so two near-simultaneous duplicates cannot both pass
//! dedup. Repository unavailability degrades the submission to content
//! checks only — explicitly reported, never silent.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;

use canopy_common::geo::{cell_edge_degrees, grid_cell};

use crate::db::records::{NeighborRepository, NewRecord};
use crate::extractors::{KeypointMatcher, SignalError, SignalProvider};
use crate::models::{
    Artifacts, Decision, DecisionReport, ImageSignals, Metrics, RejectReason, Submission,
    Thresholds, phash_to_hex, REASON_DENSE_CLUSTER,
};
use crate::services::cell_lock::{CellContention, CellLockRegistry};
use crate::services::cluster_gate::{ClusterCheck, ClusterDensityGate};
use crate::services::hash_deduplicator::{HashCheck, HashDeduplicator};
use crate::services::vector_deduplicator::{VectorCheck, VectorDeduplicator};
use crate::utils::repo_retry::retry_read;
use crate::validators::content_gate::ContentClassifierGate;
use crate::validators::multi_view::{MultiViewRejection, MultiViewValidator};
use crate::validators::quality_gate::QualityGate;

/// Errors that abort the pipeline without producing a Decision.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Signal extraction failed (decode error or missing model)
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// Another submission holds the admission lock for this area;
    /// retryable by the caller
    #[error(transparent)]
    Contention(#[from] CellContention),

    /// Invalid pipeline input or internal failure
    #[error(transparent)]
    Internal(#[from] canopy_common::Error),
}

/// Orchestrates the full decision pipeline for one submission.
pub struct DecisionOrchestrator {
    thresholds: Thresholds,
    signal_provider: Arc<dyn SignalProvider>,
    keypoint_matcher: Arc<dyn KeypointMatcher>,
    repository: Option<Arc<dyn NeighborRepository>>,
    locks: CellLockRegistry,
    lock_wait: Duration,
}

impl DecisionOrchestrator {
    pub fn new(
        thresholds: Thresholds,
        signal_provider: Arc<dyn SignalProvider>,
        keypoint_matcher: Arc<dyn KeypointMatcher>,
        repository: Option<Arc<dyn NeighborRepository>>,
        lock_wait: Duration,
    ) -> Self {
        if repository.is_none() {
            tracing::warn!("No neighbor repository configured; dedup and cluster gates disabled");
        }
        Self {
            thresholds,
            signal_provider,
            keypoint_matcher,
            repository,
            locks: CellLockRegistry::new(),
            lock_wait,
        }
    }

    /// Whether the service is running without its neighbor store.
    pub fn repository_configured(&self) -> bool {
        self.repository.is_some()
    }

    /// Run the gate sequence and produce the terminal decision.
    pub async fn decide(&self, submission: Submission) -> Result<DecisionReport, PipelineError> {
        if submission.images.is_empty() {
            return Err(canopy_common::Error::InvalidInput(
                "submission contains no images".to_string(),
            )
            .into());
        }

        let Submission { images, lat, lon } = submission;
        let signals = self.extract_signals(&images).await?;

        // Per-image quality + content gates; first failing image aborts
        // with every violated condition from its content stage
        let mut scores = Vec::with_capacity(signals.len());
        for (index, image_signals) in signals.iter().enumerate() {
            if let Some(reason) = QualityGate::check(image_signals, &self.thresholds) {
                let mut metrics = signal_metrics(image_signals);
                metrics.insert("image_index".to_string(), json!(index));
                return Ok(DecisionReport {
                    decision: Decision::Rejected {
                        reasons: vec![reason],
                        duplicate_of: None,
                        metrics,
                    },
                    degraded: false,
                });
            }

            let assessment = ContentClassifierGate::evaluate(image_signals, &self.thresholds);
            if !assessment.accepted() {
                let mut metrics = signal_metrics(image_signals);
                metrics.insert("image_index".to_string(), json!(index));
                metrics.insert("score".to_string(), json!(assessment.score));
                return Ok(DecisionReport {
                    decision: Decision::Rejected {
                        reasons: assessment.violations,
                        duplicate_of: None,
                        metrics,
                    },
                    degraded: false,
                });
            }
            scores.push(assessment.score);
        }

        let mut metrics = Metrics::new();
        let min_score = scores.iter().copied().fold(f32::MAX, f32::min);
        let min_tree_prob = signals
            .iter()
            .map(|s| s.tree_prob)
            .fold(f32::MAX, f32::min);
        metrics.insert("score".to_string(), json!(min_score));
        if signals.len() == 1 {
            metrics.insert("tree_score".to_string(), json!(signals[0].tree_prob));
        } else {
            metrics.insert("min_tree_score".to_string(), json!(min_tree_prob));
            let avg_blur =
                signals.iter().map(|s| s.blur_score).sum::<f32>() / signals.len() as f32;
            metrics.insert("avg_blur".to_string(), json!(avg_blur));
        }

        // Multi-view cross-consistency and the representative embedding
        let aggregate_embedding = if signals.len() >= 2 {
            match MultiViewValidator::validate(
                &images,
                &signals,
                self.keypoint_matcher.as_ref(),
                &self.thresholds,
            ) {
                Ok(outcome) => {
                    match outcome.avg_match_ratio {
                        Some(ratio) => {
                            metrics.insert("avg_match_ratio".to_string(), json!(ratio));
                        }
                        None => {
                            metrics
                                .insert("keypoint_matcher_available".to_string(), json!(false));
                        }
                    }
                    outcome.aggregate_embedding
                }
                Err(MultiViewRejection::TooSimilar {
                    first,
                    second,
                    distance,
                }) => {
                    metrics.insert("pair".to_string(), json!([first, second]));
                    metrics.insert("phash_hamming".to_string(), json!(distance));
                    return Ok(DecisionReport {
                        decision: Decision::Rejected {
                            reasons: vec![RejectReason::ViewsTooSimilar],
                            duplicate_of: None,
                            metrics,
                        },
                        degraded: false,
                    });
                }
                Err(MultiViewRejection::Unrelated { avg_match_ratio }) => {
                    metrics.insert("avg_match_ratio".to_string(), json!(avg_match_ratio));
                    return Ok(DecisionReport {
                        decision: Decision::Rejected {
                            reasons: vec![RejectReason::UnrelatedViews],
                            duplicate_of: None,
                            metrics,
                        },
                        degraded: false,
                    });
                }
            }
        } else {
            signals[0].embedding.clone()
        };

        let artifacts = Artifacts {
            phashes: signals.iter().map(|s| phash_to_hex(s.phash)).collect(),
            embedding: aggregate_embedding.clone(),
        };

        // Without a repository every dedup-dependent stage is skipped:
        // an explicit, reported weakening
        let Some(repository) = self.repository.clone() else {
            return Ok(DecisionReport {
                decision: Decision::Passed {
                    score: min_score,
                    metrics,
                    artifacts,
                },
                degraded: true,
            });
        };

        // Serialize read-neighbors → decide → admit for this area
        let cell = grid_cell(lat, lon, cell_edge_degrees(self.thresholds.radius_meters));
        let _cell_guard = self.locks.acquire(cell, self.lock_wait).await?;

        let neighbors = match retry_read("neighbor query", || {
            repository.find_nearby(lat, lon, self.thresholds.radius_meters)
        })
        .await
        {
            Ok(neighbors) => neighbors,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "Neighbor repository unreachable; degrading to content checks only"
                );
                return Ok(DecisionReport {
                    decision: Decision::Passed {
                        score: min_score,
                        metrics,
                        artifacts,
                    },
                    degraded: true,
                });
            }
        };

        // Cluster density precedes dedup and supersedes it when flagged
        if let ClusterCheck::Saturated { count } = ClusterDensityGate.check(
            neighbors.len(),
            self.thresholds.cluster_max_in_radius,
        ) {
            metrics.insert("cluster_count".to_string(), json!(count));
            return Ok(DecisionReport {
                decision: Decision::Flagged {
                    reason: REASON_DENSE_CLUSTER,
                    metrics,
                },
                degraded: false,
            });
        }

        // Tier 1: perceptual hash, per individual view
        let phashes: Vec<u64> = signals.iter().map(|s| s.phash).collect();
        match HashDeduplicator.check(&phashes, &neighbors, self.thresholds.phash_max_hamming) {
            HashCheck::Duplicate { id, distance } => {
                metrics.insert("phash_hamming".to_string(), json!(distance));
                return Ok(DecisionReport {
                    decision: Decision::Rejected {
                        reasons: vec![RejectReason::DuplicateByHash],
                        duplicate_of: Some(id),
                        metrics,
                    },
                    degraded: false,
                });
            }
            HashCheck::Unique {
                min_distance: Some(distance),
            } => {
                metrics.insert("min_phash_hamming".to_string(), json!(distance));
            }
            HashCheck::Unique { min_distance: None } => {}
        }

        // Tier 2: learned similarity, on the representative embedding
        match VectorDeduplicator.check(
            &aggregate_embedding,
            &neighbors,
            self.thresholds.vector_min_cosine,
        )? {
            VectorCheck::Duplicate { id, cosine } => {
                metrics.insert("cosine".to_string(), json!(cosine));
                return Ok(DecisionReport {
                    decision: Decision::Rejected {
                        reasons: vec![RejectReason::DuplicateBySimilarity],
                        duplicate_of: Some(id),
                        metrics,
                    },
                    degraded: false,
                });
            }
            VectorCheck::Unique {
                max_cosine: Some(cosine),
            } => {
                metrics.insert("max_cosine".to_string(), json!(cosine));
            }
            VectorCheck::Unique { max_cosine: None } => {}
        }

        // Admit inside the same locked sequence. Never blindly retried:
        // a retry after an ambiguous failure could double-insert.
        let degraded = match repository
            .record(&NewRecord {
                lat,
                lon,
                phash: Some(phashes[0]),
                embedding: Some(aggregate_embedding),
            })
            .await
        {
            Ok(id) => {
                tracing::info!(record_id = %id, "Submission passed and admitted");
                false
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "Admit write failed; decision passes without a persisted record"
                );
                true
            }
        };

        Ok(DecisionReport {
            decision: Decision::Passed {
                score: min_score,
                metrics,
                artifacts,
            },
            degraded,
        })
    }

    /// Extract per-image signals concurrently. Extraction is pure over
    /// immutable inputs and shares no mutable state across images.
    async fn extract_signals(
        &self,
        images: &[Vec<u8>],
    ) -> Result<Vec<ImageSignals>, PipelineError> {
        let mut join_set = tokio::task::JoinSet::new();
        for (index, bytes) in images.iter().cloned().enumerate() {
            let provider = Arc::clone(&self.signal_provider);
            join_set.spawn_blocking(move || (index, provider.extract(&bytes)));
        }

        let mut signals: Vec<Option<ImageSignals>> = vec![None; images.len()];
        while let Some(joined) = join_set.join_next().await {
            let (index, result) = joined.map_err(|e| {
                PipelineError::Internal(canopy_common::Error::Internal(format!(
                    "signal extraction task failed: {}",
                    e
                )))
            })?;
            signals[index] = Some(result?);
        }

        Ok(signals.into_iter().flatten().collect())
    }
}

/// Compact snapshot of one image's signals for rejection metrics.
fn signal_metrics(signals: &ImageSignals) -> Metrics {
    let mut metrics = Metrics::new();
    metrics.insert("tree_score".to_string(), json!(signals.tree_prob));
    metrics.insert("tree_margin".to_string(), json!(signals.tree_margin));
    metrics.insert(
        "vegetation_ratio".to_string(),
        json!(signals.vegetation_ratio),
    );
    metrics.insert("blur_score".to_string(), json!(signals.blur_score));
    metrics.insert("skin_ratio".to_string(), json!(signals.skin_ratio));
    metrics.insert("face_area_frac".to_string(), json!(signals.face_area_frac));
    metrics.insert("width".to_string(), json!(signals.width));
    metrics.insert("height".to_string(), json!(signals.height));
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{MatcherUnavailable, UnavailableMatcher};
    use crate::models::DecisionStatus;
    use async_trait::async_trait;
    use canopy_common::geo::haversine_meters;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Provider that derives signals from the first image byte via a
    /// caller-supplied table.
    struct TableProvider {
        rows: Vec<ImageSignals>,
    }

    impl SignalProvider for TableProvider {
        fn extract(&self, image: &[u8]) -> Result<ImageSignals, SignalError> {
            let index = *image.first().unwrap_or(&0) as usize;
            self.rows
                .get(index)
                .cloned()
                .ok_or_else(|| SignalError::DecodeFailed("no such row".to_string()))
        }
    }

    /// In-memory neighbor repository for orchestrator tests.
    struct MemoryRepository {
        records: Mutex<Vec<crate::models::NeighborRecord>>,
        fail_reads: bool,
        read_delay: Option<Duration>,
    }

    impl MemoryRepository {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                fail_reads: false,
                read_delay: None,
            }
        }

        fn with_records(records: Vec<crate::models::NeighborRecord>) -> Self {
            Self {
                records: Mutex::new(records),
                fail_reads: false,
                read_delay: None,
            }
        }

        fn count(&self) -> usize {
            self.records.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NeighborRepository for MemoryRepository {
        async fn find_nearby(
            &self,
            lat: f64,
            lon: f64,
            radius_m: f64,
        ) -> canopy_common::Result<Vec<crate::models::NeighborRecord>> {
            if let Some(delay) = self.read_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_reads {
                return Err(canopy_common::Error::Database(sqlx::Error::PoolClosed));
            }
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| haversine_meters(lat, lon, r.lat, r.lon) <= radius_m)
                .cloned()
                .collect())
        }

        async fn record(&self, entry: &NewRecord) -> canopy_common::Result<Uuid> {
            let id = Uuid::new_v4();
            self.records.lock().unwrap().push(crate::models::NeighborRecord {
                id,
                lat: entry.lat,
                lon: entry.lon,
                phash: entry.phash,
                embedding: entry.embedding.clone(),
            });
            Ok(id)
        }
    }

    fn good_signals(phash: u64, embedding: Vec<f32>) -> ImageSignals {
        ImageSignals {
            embedding,
            tree_prob: 0.9,
            tree_margin: 0.3,
            vegetation_ratio: 0.6,
            blur_score: 0.5,
            skin_ratio: 0.0,
            face_area_frac: 0.0,
            phash,
            width: 640,
            height: 480,
        }
    }

    fn orchestrator(
        rows: Vec<ImageSignals>,
        repository: Option<Arc<dyn NeighborRepository>>,
    ) -> DecisionOrchestrator {
        DecisionOrchestrator::new(
            Thresholds::default(),
            Arc::new(TableProvider { rows }),
            Arc::new(UnavailableMatcher),
            repository,
            Duration::from_millis(500),
        )
    }

    fn single_submission() -> Submission {
        Submission {
            images: vec![vec![0]],
            lat: 45.0,
            lon: 7.0,
        }
    }

    fn neighbor_at(
        lat: f64,
        lon: f64,
        phash: Option<u64>,
        embedding: Option<Vec<f32>>,
    ) -> crate::models::NeighborRecord {
        crate::models::NeighborRecord {
            id: Uuid::new_v4(),
            lat,
            lon,
            phash,
            embedding,
        }
    }

    #[tokio::test]
    async fn empty_submission_is_input_error() {
        let orchestrator = orchestrator(vec![], None);
        let result = orchestrator
            .decide(Submission {
                images: vec![],
                lat: 0.0,
                lon: 0.0,
            })
            .await;
        assert!(matches!(result, Err(PipelineError::Internal(_))));
    }

    #[tokio::test]
    async fn undersized_image_rejected_too_small() {
        let signals = ImageSignals {
            width: 150,
            height: 150,
            ..good_signals(1, vec![1.0, 0.0])
        };
        let orchestrator = orchestrator(vec![signals], None);
        let report = orchestrator.decide(single_submission()).await.unwrap();

        match report.decision {
            Decision::Rejected { reasons, .. } => {
                assert_eq!(reasons, vec![RejectReason::TooSmall])
            }
            other => panic!("Expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn content_violations_all_enumerated() {
        let signals = ImageSignals {
            tree_prob: 0.1,
            vegetation_ratio: 0.0,
            ..good_signals(1, vec![1.0, 0.0])
        };
        let orchestrator = orchestrator(vec![signals], None);
        let report = orchestrator.decide(single_submission()).await.unwrap();

        let is_content_rejection = report.decision.is_content_rejection();
        match report.decision {
            Decision::Rejected { reasons, .. } => {
                assert_eq!(
                    reasons,
                    vec![RejectReason::LowTreeProb, RejectReason::LowVegetation]
                );
            }
            other => panic!("Expected rejection, got {:?}", other),
        }
        assert!(is_content_rejection);
    }

    #[tokio::test]
    async fn no_repository_passes_degraded() {
        let orchestrator = orchestrator(vec![good_signals(1, vec![1.0, 0.0])], None);
        let report = orchestrator.decide(single_submission()).await.unwrap();

        assert_eq!(report.decision.status(), DecisionStatus::Passed);
        assert!(report.degraded);
    }

    #[tokio::test]
    async fn unreachable_repository_passes_degraded() {
        let repo = Arc::new(MemoryRepository {
            records: Mutex::new(Vec::new()),
            fail_reads: true,
            read_delay: None,
        });
        let orchestrator = orchestrator(vec![good_signals(1, vec![1.0, 0.0])], Some(repo as Arc<dyn NeighborRepository>));
        let report = orchestrator.decide(single_submission()).await.unwrap();

        assert_eq!(report.decision.status(), DecisionStatus::Passed);
        assert!(report.degraded);
    }

    #[tokio::test]
    async fn dense_cluster_flags_and_skips_dedup() {
        // Six neighbors against a limit of five; one is an exact phash
        // match that would reject if dedup ran
        let candidate = good_signals(0xabcd, vec![1.0, 0.0]);
        let neighbors: Vec<_> = (0..6)
            .map(|_| neighbor_at(45.0, 7.0, Some(0xabcd), Some(vec![1.0, 0.0])))
            .collect();
        let repo = Arc::new(MemoryRepository::with_records(neighbors));
        let orchestrator = orchestrator(vec![candidate], Some(repo.clone() as Arc<dyn NeighborRepository>));
        let report = orchestrator.decide(single_submission()).await.unwrap();

        match report.decision {
            Decision::Flagged { reason, metrics } => {
                assert_eq!(reason, REASON_DENSE_CLUSTER);
                assert_eq!(metrics.get("cluster_count"), Some(&json!(6)));
            }
            other => panic!("Expected flagged, got {:?}", other),
        }
        // Flagged submissions are never admitted
        assert_eq!(repo.count(), 6);
    }

    #[tokio::test]
    async fn hash_duplicate_rejected() {
        // Neighbor phash at Hamming distance 2 against threshold 5
        let candidate = good_signals(0b1100, vec![1.0, 0.0]);
        let neighbor = neighbor_at(45.0, 7.0, Some(0b1111), None);
        let duplicate_id = neighbor.id;
        let repo = Arc::new(MemoryRepository::with_records(vec![neighbor]));
        let orchestrator = orchestrator(vec![candidate], Some(repo.clone() as Arc<dyn NeighborRepository>));
        let report = orchestrator.decide(single_submission()).await.unwrap();

        match report.decision {
            Decision::Rejected {
                reasons,
                duplicate_of,
                metrics,
            } => {
                assert_eq!(reasons, vec![RejectReason::DuplicateByHash]);
                assert_eq!(duplicate_of, Some(duplicate_id));
                assert_eq!(metrics.get("phash_hamming"), Some(&json!(2)));
            }
            other => panic!("Expected rejection, got {:?}", other),
        }
        assert_eq!(repo.count(), 1);
    }

    #[tokio::test]
    async fn vector_duplicate_rejected_with_cosine_metric() {
        // Cosine 0.97 against threshold 0.95, distinct phash
        let candidate = good_signals(0, vec![1.0, 0.0]);
        let angle = 0.97f32.acos();
        let stored = vec![angle.cos(), angle.sin()];
        let neighbor = neighbor_at(45.0, 7.0, Some(u64::MAX), Some(stored));
        let duplicate_id = neighbor.id;
        let repo = Arc::new(MemoryRepository::with_records(vec![neighbor]));
        let orchestrator = orchestrator(vec![candidate], Some(repo as Arc<dyn NeighborRepository>));
        let report = orchestrator.decide(single_submission()).await.unwrap();

        match report.decision {
            Decision::Rejected {
                reasons,
                duplicate_of,
                metrics,
            } => {
                assert_eq!(reasons, vec![RejectReason::DuplicateBySimilarity]);
                assert_eq!(duplicate_of, Some(duplicate_id));
                let cosine = metrics.get("cosine").unwrap().as_f64().unwrap();
                assert!((cosine - 0.97).abs() < 1e-3, "cosine metric {}", cosine);
            }
            other => panic!("Expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn clean_pass_admits_record() {
        let repo = Arc::new(MemoryRepository::new());
        let orchestrator =
            orchestrator(vec![good_signals(0xabcd, vec![1.0, 0.0])], Some(repo.clone() as Arc<dyn NeighborRepository>));
        let report = orchestrator.decide(single_submission()).await.unwrap();

        match &report.decision {
            Decision::Passed { artifacts, .. } => {
                assert_eq!(artifacts.phashes, vec![phash_to_hex(0xabcd)]);
            }
            other => panic!("Expected pass, got {:?}", other),
        }
        assert!(!report.degraded);
        assert_eq!(repo.count(), 1);
    }

    #[tokio::test]
    async fn near_miss_cosine_reported_on_pass() {
        // Cosine ~0.7: under the threshold, reported as a metric
        let candidate = good_signals(0, vec![1.0, 0.0]);
        let neighbor = neighbor_at(45.0, 7.0, Some(u64::MAX), Some(vec![0.7, 0.714]));
        let repo = Arc::new(MemoryRepository::with_records(vec![neighbor]));
        let orchestrator = orchestrator(vec![candidate], Some(repo as Arc<dyn NeighborRepository>));
        let report = orchestrator.decide(single_submission()).await.unwrap();

        match report.decision {
            Decision::Passed { metrics, .. } => {
                assert!(metrics.contains_key("max_cosine"));
            }
            other => panic!("Expected pass, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn multi_view_identical_views_rejected() {
        let row = good_signals(0xabcd, vec![1.0, 0.0]);
        let orchestrator = orchestrator(vec![row.clone(), row], None);
        let report = orchestrator
            .decide(Submission {
                images: vec![vec![0], vec![1]],
                lat: 45.0,
                lon: 7.0,
            })
            .await
            .unwrap();

        match report.decision {
            Decision::Rejected {
                reasons, metrics, ..
            } => {
                assert_eq!(reasons, vec![RejectReason::ViewsTooSimilar]);
                assert_eq!(metrics.get("pair"), Some(&json!([0, 1])));
            }
            other => panic!("Expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn multi_view_pass_uses_mean_embedding() {
        let rows = vec![
            good_signals(0, vec![1.0, 0.0]),
            good_signals(u64::MAX, vec![0.0, 1.0]),
        ];
        let repo = Arc::new(MemoryRepository::new());
        let orchestrator = orchestrator(rows, Some(repo.clone() as Arc<dyn NeighborRepository>));
        let report = orchestrator
            .decide(Submission {
                images: vec![vec![0], vec![1]],
                lat: 45.0,
                lon: 7.0,
            })
            .await
            .unwrap();

        match &report.decision {
            Decision::Passed {
                artifacts, metrics, ..
            } => {
                assert_eq!(artifacts.embedding, vec![0.5, 0.5]);
                assert_eq!(artifacts.phashes.len(), 2);
                // Matcher unavailable: soft metric, never a rejection
                assert_eq!(
                    metrics.get("keypoint_matcher_available"),
                    Some(&json!(false))
                );
            }
            other => panic!("Expected pass, got {:?}", other),
        }
        assert_eq!(repo.count(), 1);
    }

    #[tokio::test]
    async fn related_views_keep_match_ratio_metric() {
        struct HighMatcher;
        impl KeypointMatcher for HighMatcher {
            fn match_ratio(&self, _: &[u8], _: &[u8]) -> Result<f32, MatcherUnavailable> {
                Ok(0.42)
            }
        }

        let rows = vec![
            good_signals(0, vec![1.0, 0.0]),
            good_signals(u64::MAX, vec![0.0, 1.0]),
        ];
        let orchestrator = DecisionOrchestrator::new(
            Thresholds::default(),
            Arc::new(TableProvider { rows }),
            Arc::new(HighMatcher),
            None,
            Duration::from_millis(500),
        );
        let report = orchestrator
            .decide(Submission {
                images: vec![vec![0], vec![1]],
                lat: 45.0,
                lon: 7.0,
            })
            .await
            .unwrap();

        match report.decision {
            Decision::Passed { metrics, .. } => {
                let ratio = metrics.get("avg_match_ratio").unwrap().as_f64().unwrap();
                assert!((ratio - 0.42).abs() < 1e-6);
            }
            other => panic!("Expected pass, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn contention_surfaces_as_retryable_error() {
        // First submission holds the cell lock while its slow neighbor
        // query runs; the second times out instead of skipping dedup
        let repo = Arc::new(MemoryRepository {
            records: Mutex::new(Vec::new()),
            fail_reads: false,
            read_delay: Some(Duration::from_millis(300)),
        });
        let orchestrator = Arc::new(DecisionOrchestrator::new(
            Thresholds::default(),
            Arc::new(TableProvider {
                rows: vec![good_signals(0xabcd, vec![1.0, 0.0])],
            }),
            Arc::new(UnavailableMatcher),
            Some(repo as Arc<dyn NeighborRepository>),
            Duration::from_millis(50),
        ));

        let first = Arc::clone(&orchestrator);
        let slow = tokio::spawn(async move { first.decide(single_submission()).await });

        // Give the first submission time to take the lock
        tokio::time::sleep(Duration::from_millis(100)).await;
        let contended = orchestrator.decide(single_submission()).await;

        assert!(matches!(contended, Err(PipelineError::Contention(_))));
        assert!(slow.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn decode_failure_surfaces_as_signal_error() {
        let orchestrator = orchestrator(vec![], None);
        let result = orchestrator
            .decide(Submission {
                images: vec![vec![9]], // no row 9 in the table
                lat: 0.0,
                lon: 0.0,
            })
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::Signal(SignalError::DecodeFailed(_)))
        ));
    }
}
