//! Database access for canopy-verify
//!
//! SQLite-backed neighbor store. The service runs without it in degraded
//! mode (content checks only).

pub mod records;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

pub use records::{NeighborRepository, NewRecord, SqliteNeighborRepository};

/// Initialize database connection pool.
///
/// Connects with mode=rwc (read, write, create) and runs the table
/// migrations.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create canopy-verify tables if they don't exist.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tree_records (
            guid TEXT PRIMARY KEY,
            lat REAL NOT NULL,
            lon REAL NOT NULL,
            phash TEXT,
            embedding TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Bounding-box prefilters scan on both coordinates
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tree_records_lat ON tree_records(lat)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tree_records_lon ON tree_records(lon)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (tree_records)");

    Ok(())
}
