//! canopy-verify - Photographic Evidence Verification Service
//!
//! Gates user-submitted photographic evidence (images plus geolocation)
//! claiming a real-world subject: content checks, two-tier duplicate
//! search against a geofenced neighbor store, and cluster-density
//! flagging for human review.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use canopy_verify::config::ServiceConfig;
use canopy_verify::db::{self, NeighborRepository, SqliteNeighborRepository};
use canopy_verify::extractors::{DefaultSignalProvider, SignalProvider, UnavailableMatcher};
use canopy_verify::services::DecisionOrchestrator;
use canopy_verify::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting canopy-verify (Photographic Evidence Verification)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::resolve()?;

    // Neighbor store is optional: without it the service still enforces
    // content checks and reports degraded decisions
    let repository: Option<Arc<dyn NeighborRepository>> = match &config.database_path {
        Some(path) => match db::init_database_pool(path).await {
            Ok(pool) => {
                info!("Database: {}", path.display());
                Some(Arc::new(SqliteNeighborRepository::new(pool)))
            }
            Err(e) => {
                error!("Database connection failed: {}; running degraded", e);
                None
            }
        },
        None => None,
    };

    let provider = build_signal_provider(&config);
    warn!("Keypoint matcher not configured; multi-view relatedness reported as soft metric");

    let orchestrator = Arc::new(DecisionOrchestrator::new(
        config.thresholds.clone(),
        provider,
        Arc::new(UnavailableMatcher),
        repository,
        Duration::from_millis(config.cell_lock_wait_ms),
    ));

    let bind = config.bind.clone();
    let state = AppState::new(orchestrator, config);
    let app = canopy_verify::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Select the embedding encoder for the signal provider.
///
/// With the `onnx-encoder` feature and `CANOPY_MODEL` set, CNN embeddings
/// come from ONNX Runtime (loaded lazily on first extraction). Otherwise
/// the pure-Rust histogram encoder is used.
fn build_signal_provider(config: &ServiceConfig) -> Arc<dyn SignalProvider> {
    #[cfg(feature = "onnx-encoder")]
    {
        use canopy_verify::extractors::encoder::{ImageEncoder, OnnxImageEncoder};

        if let Ok(model_path) = std::env::var("CANOPY_MODEL") {
            // EfficientNet-B0 feature width unless overridden
            let dimension = std::env::var("CANOPY_MODEL_DIM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1280);
            let path = std::path::PathBuf::from(model_path);
            info!(
                model = %path.display(),
                dimension,
                "Using ONNX image encoder"
            );
            return Arc::new(DefaultSignalProvider::with_encoder_factory(
                Box::new(move || {
                    OnnxImageEncoder::load(&path, dimension)
                        .map(|encoder| Box::new(encoder) as Box<dyn ImageEncoder>)
                }),
                config.blur_low_freq_half_width,
            ));
        }
    }

    info!("Using histogram image encoder");
    Arc::new(DefaultSignalProvider::new(config.blur_low_freq_half_width))
}
