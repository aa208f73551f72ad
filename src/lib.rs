//! Film Harvester - incremental film catalog harvesting
//!
//! Walks the per-id detail pages of an external film catalog, parses works
//! and the people who made them, resolves them against the catalog store
//! and persists them in batches while fetching continues.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub mod test_utils;

pub use application::{
    EntityResolver, GapLocator, HarvestError, HarvestResult, IdSequence, IngestionPipeline, PipelineConfig, RunReport,
    RunScope, RunStatus,
};
pub use domain::CatalogStore;
pub use infrastructure::{
    AppConfig, DatabaseConnection, HtmlCatalogSource, HttpClient, SqliteCatalogStore, read_work_dump, write_work_dump,
};
