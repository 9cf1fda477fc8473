//! Configuration resolution for canopy-verify
//!
//! Provides two-tier configuration resolution with ENV → TOML priority,
//! falling back to compiled defaults. Thresholds are resolved once at
//! startup and are immutable for the process lifetime.

use canopy_common::config::{config_file_path, env_parse, read_toml_config};
use canopy_common::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::models::Thresholds;

/// Config file name (resolved under the canopy config directory)
const SERVICE_NAME: &str = "canopy-verify";

/// Service configuration resolved at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP bind address
    pub bind: String,
    /// SQLite database path; `None` runs the service in degraded mode
    /// (content checks only, no dedup)
    pub database_path: Option<PathBuf>,
    /// Max wall-clock wait for the per-cell admission lock
    pub cell_lock_wait_ms: u64,
    /// Half-width of the centered low-frequency window in the 256x256
    /// blur spectrum
    pub blur_low_freq_half_width: u32,
    /// Upper bound on a single uploaded image, bytes
    pub max_image_bytes: usize,
    /// Decision thresholds
    pub thresholds: Thresholds,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5740".to_string(),
            database_path: None,
            cell_lock_wait_ms: 5000,
            blur_low_freq_half_width: 32,
            max_image_bytes: 8 * 1024 * 1024,
            thresholds: Thresholds::default(),
        }
    }
}

/// On-disk TOML shape. Every field optional; unset fields fall back to
/// defaults after ENV resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub bind: Option<String>,
    pub database_path: Option<PathBuf>,
    pub cell_lock_wait_ms: Option<u64>,
    pub blur_low_freq_half_width: Option<u32>,
    pub max_image_bytes: Option<usize>,
    #[serde(default)]
    pub thresholds: Option<Thresholds>,
}

impl ServiceConfig {
    /// Resolve configuration with ENV → TOML → default priority.
    pub fn resolve() -> Result<Self> {
        let toml_config = match config_file_path(SERVICE_NAME) {
            Ok(path) => {
                info!("Loading config file: {}", path.display());
                read_toml_config::<TomlConfig>(&path)?
            }
            Err(_) => {
                info!("No config file found, using environment and defaults");
                TomlConfig::default()
            }
        };

        Self::from_sources(toml_config)
    }

    /// Combine a parsed TOML config with environment overrides.
    pub fn from_sources(toml_config: TomlConfig) -> Result<Self> {
        let defaults = ServiceConfig::default();
        let toml_thresholds = toml_config.thresholds.unwrap_or_default();

        let bind = match env_parse::<String>("CANOPY_BIND")? {
            Some(v) => {
                info!(bind = %v, "Bind address from environment");
                v
            }
            None => toml_config.bind.unwrap_or(defaults.bind),
        };

        let database_path = match env_parse::<PathBuf>("CANOPY_DB")? {
            Some(v) => Some(v),
            None => toml_config.database_path,
        };
        if database_path.is_none() {
            warn!("CANOPY_DB not set; running in degraded mode (no dedup)");
        }

        let thresholds = Thresholds {
            phash_max_hamming: env_parse("CANOPY_PHASH_MAX_HAMMING")?
                .unwrap_or(toml_thresholds.phash_max_hamming),
            vector_min_cosine: env_parse("CANOPY_VECTOR_MIN_COSINE")?
                .unwrap_or(toml_thresholds.vector_min_cosine),
            tree_confidence_min: env_parse("CANOPY_TREE_CONFIDENCE_MIN")?
                .unwrap_or(toml_thresholds.tree_confidence_min),
            min_blur: env_parse("CANOPY_MIN_BLUR")?.unwrap_or(toml_thresholds.min_blur),
            min_vegetation_ratio: env_parse("CANOPY_MIN_VEGETATION_RATIO")?
                .unwrap_or(toml_thresholds.min_vegetation_ratio),
            min_clip_margin: env_parse("CANOPY_MIN_CLIP_MARGIN")?
                .unwrap_or(toml_thresholds.min_clip_margin),
            max_skin_ratio: env_parse("CANOPY_MAX_SKIN_RATIO")?
                .unwrap_or(toml_thresholds.max_skin_ratio),
            max_face_area_frac: env_parse("CANOPY_MAX_FACE_AREA_FRAC")?
                .unwrap_or(toml_thresholds.max_face_area_frac),
            cluster_max_in_radius: env_parse("CANOPY_CLUSTER_MAX_IN_RADIUS")?
                .unwrap_or(toml_thresholds.cluster_max_in_radius),
            radius_meters: env_parse("CANOPY_RADIUS_METERS")?
                .unwrap_or(toml_thresholds.radius_meters),
            multi_view_min_match_ratio: env_parse("CANOPY_MULTI_VIEW_MIN_MATCH_RATIO")?
                .unwrap_or(toml_thresholds.multi_view_min_match_ratio),
        };
        validate_thresholds(&thresholds)?;

        Ok(Self {
            bind,
            database_path,
            cell_lock_wait_ms: env_parse("CANOPY_CELL_LOCK_WAIT_MS")?
                .or(toml_config.cell_lock_wait_ms)
                .unwrap_or(defaults.cell_lock_wait_ms),
            blur_low_freq_half_width: env_parse("CANOPY_BLUR_HALF_WIDTH")?
                .or(toml_config.blur_low_freq_half_width)
                .unwrap_or(defaults.blur_low_freq_half_width),
            max_image_bytes: env_parse("CANOPY_MAX_IMAGE_BYTES")?
                .or(toml_config.max_image_bytes)
                .unwrap_or(defaults.max_image_bytes),
            thresholds,
        })
    }
}

/// Reject threshold sets that cannot express a meaningful decision.
fn validate_thresholds(t: &Thresholds) -> Result<()> {
    use canopy_common::Error;

    if t.phash_max_hamming > crate::models::PHASH_BITS {
        return Err(Error::Config(format!(
            "phash_max_hamming {} exceeds hash width {}",
            t.phash_max_hamming,
            crate::models::PHASH_BITS
        )));
    }
    if !(-1.0..=1.0).contains(&t.vector_min_cosine) {
        return Err(Error::Config(format!(
            "vector_min_cosine {} outside [-1, 1]",
            t.vector_min_cosine
        )));
    }
    if t.radius_meters <= 0.0 || !t.radius_meters.is_finite() {
        return Err(Error::Config(format!(
            "radius_meters {} must be positive and finite",
            t.radius_meters
        )));
    }
    Ok(())
}
