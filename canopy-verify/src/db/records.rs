//! Neighbor record repository
//!
//! Geofenced nearest-neighbor lookup and admission of new records. The
//! repository owns the records; the decision pipeline reads them only
//! through `NeighborRecord` snapshots.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use canopy_common::geo::{bounding_box, haversine_meters};
use canopy_common::{Error, Result};

use crate::models::{phash_from_hex, phash_to_hex, NeighborRecord};

/// Upper bound on records returned by one geofenced query.
pub const NEIGHBOR_LIMIT: usize = 100;

/// A record to admit after a passed decision.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub lat: f64,
    pub lon: f64,
    pub phash: Option<u64>,
    pub embedding: Option<Vec<f32>>,
}

/// Geofenced neighbor store capability.
#[async_trait]
pub trait NeighborRepository: Send + Sync {
    /// Records within `radius_m` meters of the point, nearest first,
    /// bounded at `NEIGHBOR_LIMIT`.
    async fn find_nearby(&self, lat: f64, lon: f64, radius_m: f64) -> Result<Vec<NeighborRecord>>;

    /// Admit a new record; returns its id.
    async fn record(&self, entry: &NewRecord) -> Result<Uuid>;
}

/// SQLite-backed neighbor repository.
pub struct SqliteNeighborRepository {
    db: SqlitePool,
}

impl SqliteNeighborRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NeighborRepository for SqliteNeighborRepository {
    /// **Algorithm:**
    /// 1. Bounding-box prefilter in SQL (index-friendly)
    /// 2. Exact haversine filter against the radius
    /// 3. Sort nearest-first, truncate to `NEIGHBOR_LIMIT`
    async fn find_nearby(&self, lat: f64, lon: f64, radius_m: f64) -> Result<Vec<NeighborRecord>> {
        let bbox = bounding_box(lat, lon, radius_m);

        let rows = sqlx::query(
            r#"
            SELECT guid, lat, lon, phash, embedding
            FROM tree_records
            WHERE lat BETWEEN ? AND ? AND lon BETWEEN ? AND ?
            "#,
        )
        .bind(bbox.min_lat)
        .bind(bbox.max_lat)
        .bind(bbox.min_lon)
        .bind(bbox.max_lon)
        .fetch_all(&self.db)
        .await?;

        let mut nearby: Vec<(f64, NeighborRecord)> = Vec::new();
        for row in rows {
            let guid: String = row.try_get("guid")?;
            let record_lat: f64 = row.try_get("lat")?;
            let record_lon: f64 = row.try_get("lon")?;
            let phash_hex: Option<String> = row.try_get("phash")?;
            let embedding_json: Option<String> = row.try_get("embedding")?;

            let distance = haversine_meters(lat, lon, record_lat, record_lon);
            if distance > radius_m {
                continue;
            }

            let id = Uuid::parse_str(&guid)
                .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))?;
            let phash = match phash_hex {
                Some(hex) => Some(phash_from_hex(&hex).ok_or_else(|| {
                    Error::Internal(format!("Invalid phash in database for record {}", id))
                })?),
                None => None,
            };
            let embedding = match embedding_json {
                Some(json) => Some(serde_json::from_str::<Vec<f32>>(&json).map_err(|e| {
                    Error::Internal(format!("Invalid embedding JSON for record {}: {}", id, e))
                })?),
                None => None,
            };

            nearby.push((
                distance,
                NeighborRecord {
                    id,
                    lat: record_lat,
                    lon: record_lon,
                    phash,
                    embedding,
                },
            ));
        }

        nearby.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        nearby.truncate(NEIGHBOR_LIMIT);

        tracing::debug!(
            count = nearby.len(),
            radius_m,
            "Geofenced neighbor query completed"
        );

        Ok(nearby.into_iter().map(|(_, record)| record).collect())
    }

    async fn record(&self, entry: &NewRecord) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let phash_hex = entry.phash.map(phash_to_hex);
        let embedding_json = match &entry.embedding {
            Some(embedding) => Some(
                serde_json::to_string(embedding)
                    .map_err(|e| Error::Internal(format!("Failed to serialize embedding: {}", e)))?,
            ),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO tree_records (guid, lat, lon, phash, embedding)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(entry.lat)
        .bind(entry.lon)
        .bind(phash_hex)
        .bind(embedding_json)
        .execute(&self.db)
        .await?;

        tracing::info!(record_id = %id, lat = entry.lat, lon = entry.lon, "Record admitted");

        Ok(id)
    }
}
