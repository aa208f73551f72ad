//! JSON dumps of previously scraped works
//!
//! A dump is a JSON array of work records in the same shape the work page
//! parser produces. It is replayed with `IngestionPipeline::import`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::domain::entities::ScrapedWork;

/// Read every record of a dump file
pub async fn read_work_dump(path: impl AsRef<Path>) -> Result<Vec<ScrapedWork>> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read work dump {}", path.display()))?;
    let works: Vec<ScrapedWork> = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to decode work dump {}", path.display()))?;

    info!("📂 Loaded {} records from {}", works.len(), path.display());
    Ok(works)
}

/// Write records as a dump file readable by [`read_work_dump`]
pub async fn write_work_dump(path: impl AsRef<Path>, works: &[ScrapedWork]) -> Result<()> {
    let path = path.as_ref();
    let bytes = serde_json::to_vec_pretty(works)?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write work dump {}", path.display()))
}
