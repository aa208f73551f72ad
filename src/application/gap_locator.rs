//! Gap detection over stored work ids
//!
//! Reads are advisory snapshots: a concurrent writer may fill a gap right
//! after it was reported, which only makes the next harvest skip it as
//! already stored.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::application::ingestion_pipeline::IdSequence;
use crate::domain::repositories::CatalogStore;

pub struct GapLocator<S: CatalogStore + ?Sized> {
    store: Arc<S>,
}

impl<S: CatalogStore + ?Sized> GapLocator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Ids in `1..=max(stored)` that are not stored, ascending
    pub async fn empty_ids(&self) -> Result<Vec<i64>> {
        let stored = self.store.work_external_ids().await?;
        let gaps = missing_ids(&stored);
        info!("🔍 {} stored works, {} gaps", stored.len(), gaps.len());
        Ok(gaps)
    }

    /// Highest (`descending`) or lowest stored external id
    pub async fn last_external_id(&self, descending: bool) -> Result<Option<i64>> {
        self.store.boundary_work_external_id(descending).await
    }

    /// The gaps as an id sequence for the pipeline
    pub async fn gap_sequence(&self) -> Result<IdSequence> {
        Ok(IdSequence::List(self.empty_ids().await?))
    }
}

/// `1..=max(stored)` minus `stored`
pub fn missing_ids(stored: &[i64]) -> Vec<i64> {
    let Some(&max) = stored.iter().max() else {
        return Vec::new();
    };
    let present: HashSet<i64> = stored.iter().copied().collect();
    (1..=max).filter(|id| !present.contains(id)).collect()
}
