//! Configuration infrastructure
//!
//! Contains configuration loading and validation for the harvester.
//!
//! Configuration is layered:
//! 1. Built-in defaults (`defaults` module)
//! 2. Optional configuration file (TOML / JSON / YAML, by extension)
//! 3. Environment variables prefixed with `FILM_HARVESTER__`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::application::ingestion_pipeline::{IdSequence, PipelineConfig};

/// Environment variable prefix (`FILM_HARVESTER__HARVEST__STOP_LIMIT=20`)
pub const ENV_PREFIX: &str = "FILM_HARVESTER";

/// Placeholder substituted with the external id in URL templates
pub const ID_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Failed to resolve configuration directory")]
    NoConfigDirectory,
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    pub fetch: FetchConfig,
    pub harvest: HarvestConfig,
    pub logging: LoggingConfig,
}

/// Catalog store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite://data/films.db`
    pub url: String,
    pub max_connections: u32,
}

/// Source catalog endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Work detail page, `{id}` is replaced with the external id
    pub work_url_template: String,
    /// Person detail page, `{id}` is replaced with the external id
    pub person_url_template: String,
    /// POST endpoint returning trailer markup for a work id
    pub trailer_endpoint: String,
    /// Extra headers sent with every page request
    pub headers: BTreeMap<String, String>,
    /// Extra headers sent with trailer lookups
    pub trailer_headers: BTreeMap<String, String>,
}

/// HTTP fetch behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Total attempts per request on transport failure
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,
    /// Pool of client identifiers, one is drawn at random per request
    pub user_agents: Vec<String>,
}

/// Harvest run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Explicit ids to harvest; takes precedence over the range fields
    pub ids: Vec<i64>,
    pub start_id: i64,
    /// Exclusive upper bound of the range
    pub stop_id: Option<i64>,
    /// Maximum number of ids taken from the range
    pub count: Option<usize>,
    /// Consecutive fetch failures tolerated before the run is aborted
    pub stop_limit: u32,
    pub batch_size: usize,
    /// Pending person references resolved once this many accumulate
    pub person_flush_threshold: usize,
    /// Pause after every successful work fetch in milliseconds
    pub request_delay_ms: u64,
    /// Pause between person detail fetches in milliseconds
    pub person_request_delay_ms: u64,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    /// Log file name prefix (daily rotation appends the date)
    pub file_name: String,

    /// Module-specific log level filters (e.g., "sqlx": "warn", "reqwest": "info")
    pub module_filters: BTreeMap<String, String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        let headers = BTreeMap::from([
            ("Accept".to_string(), "text/html,application/xhtml+xml".to_string()),
            ("Accept-Language".to_string(), "ru-RU,ru;q=0.9,en;q=0.8".to_string()),
        ]);
        let trailer_headers = BTreeMap::from([
            ("X-Requested-With".to_string(), "XMLHttpRequest".to_string()),
        ]);

        Self {
            work_url_template: defaults::WORK_URL_TEMPLATE.to_string(),
            person_url_template: defaults::PERSON_URL_TEMPLATE.to_string(),
            trailer_endpoint: defaults::TRAILER_ENDPOINT.to_string(),
            headers,
            trailer_headers,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::FETCH_MAX_ATTEMPTS,
            retry_delay_ms: defaults::FETCH_RETRY_DELAY_MS,
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            user_agents: defaults::USER_AGENTS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            start_id: 1,
            stop_id: None,
            count: None,
            stop_limit: defaults::STOP_LIMIT,
            batch_size: defaults::BATCH_SIZE,
            person_flush_threshold: defaults::PERSON_FLUSH_THRESHOLD,
            request_delay_ms: defaults::REQUEST_DELAY_MS,
            person_request_delay_ms: defaults::PERSON_REQUEST_DELAY_MS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let module_filters = [
            ("sqlx", "warn"),
            ("reqwest", "info"),
            ("hyper", "warn"),
            ("html5ever", "warn"),
            ("film_harvester", "info"),
        ]
        .into_iter()
        .map(|(module, level)| (module.to_string(), level.to_string()))
        .collect();

        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters,
        }
    }
}

impl AppConfig {
    /// Load defaults, then the given file, then environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading configuration from {}", path.display());

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path).required(true))
            .add_source(Self::environment())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the per-user configuration directory if a file exists there
    pub fn load() -> Result<Self, ConfigError> {
        let base = Self::config_dir()?.join("config");

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::with_name(&base.to_string_lossy()).required(false))
            .add_source(Self::environment())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the application configuration directory
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("film-harvester"))
            .ok_or(ConfigError::NoConfigDirectory)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::invalid("database.url", "must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::invalid("database.max_connections", "must be greater than 0"));
        }

        for (field, template) in [
            ("source.work_url_template", &self.source.work_url_template),
            ("source.person_url_template", &self.source.person_url_template),
        ] {
            if !template.contains(ID_PLACEHOLDER) {
                return Err(ConfigError::invalid(field, format!("must contain {ID_PLACEHOLDER}")));
            }
            url::Url::parse(&template.replace(ID_PLACEHOLDER, "1"))
                .map_err(|e| ConfigError::invalid(field, format!("not a valid URL: {e}")))?;
        }
        url::Url::parse(&self.source.trailer_endpoint)
            .map_err(|e| ConfigError::invalid("source.trailer_endpoint", format!("not a valid URL: {e}")))?;

        if self.fetch.max_attempts == 0 {
            return Err(ConfigError::invalid("fetch.max_attempts", "must be greater than 0"));
        }
        if self.fetch.user_agents.is_empty() {
            return Err(ConfigError::invalid("fetch.user_agents", "at least one client identifier is required"));
        }

        if self.harvest.batch_size == 0 {
            return Err(ConfigError::invalid("harvest.batch_size", "must be greater than 0"));
        }
        if self.harvest.person_flush_threshold == 0 {
            return Err(ConfigError::invalid("harvest.person_flush_threshold", "must be greater than 0"));
        }
        if let Some(stop) = self.harvest.stop_id {
            if stop < self.harvest.start_id {
                return Err(ConfigError::invalid("harvest.stop_id", "must not be lower than start_id"));
            }
        }

        Ok(())
    }
}

impl FetchConfig {
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_delay_ms = u64::try_from(retry_delay.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

impl HarvestConfig {
    /// Ids to walk: the explicit list when present, otherwise the range
    pub fn id_sequence(&self) -> IdSequence {
        if self.ids.is_empty() {
            IdSequence::Range {
                start: self.start_id,
                stop: self.stop_id,
                count: self.count,
            }
        } else {
            IdSequence::List(self.ids.clone())
        }
    }

    pub const fn person_request_delay(&self) -> Duration {
        Duration::from_millis(self.person_request_delay_ms)
    }
}

impl From<&HarvestConfig> for PipelineConfig {
    fn from(harvest: &HarvestConfig) -> Self {
        Self {
            batch_size: harvest.batch_size,
            person_flush_threshold: harvest.person_flush_threshold,
            stop_limit: harvest.stop_limit,
            request_delay: Duration::from_millis(harvest.request_delay_ms),
        }
    }
}

/// Default values for configuration
pub mod defaults {
    use super::PipelineConfig;

    pub const DATABASE_URL: &str = "sqlite://data/films.db";
    pub const DB_MAX_CONNECTIONS: u32 = 5;

    pub const WORK_URL_TEMPLATE: &str = "https://hdrezka.ag/category/genre/{id}-film_name.html";
    pub const PERSON_URL_TEMPLATE: &str = "https://hdrezka.ag/person/{id}-customer_name/";
    pub const TRAILER_ENDPOINT: &str = "https://hdrezka.ag/engine/ajax/gettrailervideo.php";

    /// Attempts per request before a transport failure becomes terminal
    pub const FETCH_MAX_ATTEMPTS: u32 = 10;
    /// Fixed (non-growing) delay between attempts
    pub const FETCH_RETRY_DELAY_MS: u64 = 10_000;
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    pub const STOP_LIMIT: u32 = PipelineConfig::DEFAULT_STOP_LIMIT;
    pub const BATCH_SIZE: usize = PipelineConfig::DEFAULT_BATCH_SIZE;
    pub const PERSON_FLUSH_THRESHOLD: usize = PipelineConfig::DEFAULT_PERSON_FLUSH_THRESHOLD;
    pub const REQUEST_DELAY_MS: u64 = PipelineConfig::DEFAULT_REQUEST_DELAY_MS;
    pub const PERSON_REQUEST_DELAY_MS: u64 = 1000;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_NAME: &str = "film-harvester.log";

    pub const USER_AGENTS: &[&str] = &[
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.51",
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    ];
}
