//! Harvest errors
//!
//! Fetch and parsing failures describe one id that could not be turned into
//! a record; the pipeline decides whether they count toward the breaker.
//! A parsing error means the page is structurally not what the parser
//! expects and is never retried.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// Too many consecutive fetch failures; raised after the drain completed
    #[error("Circuit open after {failures} consecutive fetch failures (limit {stop_limit}), last external id {last_external_id}")]
    CircuitOpen {
        failures: u32,
        stop_limit: u32,
        last_external_id: i64,
    },

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("Persistence task failed: {0}")]
    PersistenceTask(#[from] tokio::task::JoinError),
}

impl HarvestError {
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

pub type HarvestResult<T> = Result<T, HarvestError>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid request for {url}: {reason}")]
    InvalidRequest { url: String, reason: String },

    #[error("HTTP error {status}: {url}")]
    Status { url: String, status: u16 },

    #[error("Giving up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

impl FetchError {
    /// Whether this failure counts toward the pipeline's consecutive-failure limit
    pub const fn counts_toward_breaker(&self) -> bool {
        matches!(self, Self::Status { .. } | Self::RetriesExhausted { .. })
    }

    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Required field '{field}' not found in page {external_id}")]
    RequiredFieldMissing { field: String, external_id: i64 },

    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid {field} pattern: {reason}")]
    InvalidPattern { field: String, reason: String },
}

impl ParsingError {
    /// Create a required field missing error for a page
    pub fn required_field_missing(field: &str, external_id: i64) -> Self {
        Self::RequiredFieldMissing {
            field: field.to_string(),
            external_id,
        }
    }

    pub fn invalid_selector(selector: &str, reason: impl ToString) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_pattern(field: &str, reason: impl ToString) -> Self {
        Self::InvalidPattern {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
