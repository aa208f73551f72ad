//! Infrastructure layer for database connections, HTTP, parsing and configuration
//!
//! This module provides the SQLite store adapter, the catalog page fetcher
//! and parsers, and the ambient configuration and logging setup.

pub mod catalog_source; // Source ports over HTTP + parsers
pub mod config; // Layered configuration
pub mod database_connection;
pub mod http_client;
pub mod logging;
pub mod parsing;
pub mod repositories;
pub mod work_dump;

// Re-export commonly used items
pub use catalog_source::HtmlCatalogSource;
pub use config::{AppConfig, ConfigError};
pub use database_connection::DatabaseConnection;
pub use http_client::{FetchRequest, FetchedPage, HttpClient};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use parsing::{PageParser, PersonPageParser, WorkPageParser};
pub use repositories::SqliteCatalogStore;
pub use work_dump::{read_work_dump, write_work_dump};
