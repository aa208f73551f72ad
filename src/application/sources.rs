//! Source ports: where works and persons come from
//!
//! The pipeline and the resolver only see these traits; the HTML catalog
//! source implements them over HTTP, tests implement them with scripts.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::error::{FetchError, ParsingError};
use crate::domain::entities::{ScrapedPerson, ScrapedWork};

/// Failure to obtain one typed record from the source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParsingError),
}

impl SourceError {
    /// Only HTTP status errors and exhausted retries count as consecutive failures
    pub const fn counts_toward_breaker(&self) -> bool {
        match self {
            Self::Fetch(e) => e.counts_toward_breaker(),
            Self::Parse(_) => false,
        }
    }
}

#[async_trait]
pub trait WorkSource: Send + Sync {
    async fn fetch_work(&self, external_id: i64) -> Result<ScrapedWork, SourceError>;
}

#[async_trait]
pub trait PersonSource: Send + Sync {
    async fn fetch_person(&self, external_id: i64) -> Result<ScrapedPerson, SourceError>;
}
