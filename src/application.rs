//! Application layer module
//!
//! This module contains the harvest use cases that orchestrate the domain
//! entities, the source ports and the catalog store.

pub mod entity_resolver;
pub mod error;
pub mod gap_locator;
pub mod ingestion_pipeline;
pub mod run_scope;
pub mod sources;

pub use entity_resolver::{EntityResolver, PersonPlan};
pub use error::{FetchError, HarvestError, HarvestResult, ParsingError, ParsingResult};
pub use gap_locator::GapLocator;
pub use ingestion_pipeline::{IdSequence, IngestionPipeline, PipelineConfig, RunReport};
pub use run_scope::{RunScope, RunStatus, RunSummary};
pub use sources::{PersonSource, SourceError, WorkSource};
