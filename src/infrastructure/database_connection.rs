// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::infrastructure::config::DatabaseConfig;

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS genres (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )",
    r"
    CREATE TABLE IF NOT EXISTS dubbings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )",
    r"
    CREATE TABLE IF NOT EXISTS professions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )",
    r"
    CREATE TABLE IF NOT EXISTS persons (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id INTEGER NOT NULL UNIQUE,
        name TEXT NOT NULL,
        original_name TEXT,
        birth_date DATE
    )",
    r"
    CREATE TABLE IF NOT EXISTS person_professions (
        person_id INTEGER NOT NULL REFERENCES persons (id) ON DELETE CASCADE,
        profession_id INTEGER NOT NULL REFERENCES professions (id) ON DELETE CASCADE,
        PRIMARY KEY (person_id, profession_id)
    )",
    r"
    CREATE TABLE IF NOT EXISTS works (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id INTEGER NOT NULL UNIQUE,
        title TEXT NOT NULL,
        original_title TEXT,
        poster_url TEXT,
        synopsis TEXT,
        country TEXT,
        trailer_url TEXT,
        release_date DATE,
        rating REAL,
        duration_minutes INTEGER,
        age_rating INTEGER,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    r"
    CREATE TABLE IF NOT EXISTS work_genres (
        work_id INTEGER NOT NULL REFERENCES works (id) ON DELETE CASCADE,
        genre_id INTEGER NOT NULL REFERENCES genres (id) ON DELETE CASCADE,
        PRIMARY KEY (work_id, genre_id)
    )",
    r"
    CREATE TABLE IF NOT EXISTS work_dubbings (
        work_id INTEGER NOT NULL REFERENCES works (id) ON DELETE CASCADE,
        dubbing_id INTEGER NOT NULL REFERENCES dubbings (id) ON DELETE CASCADE,
        PRIMARY KEY (work_id, dubbing_id)
    )",
    r"
    CREATE TABLE IF NOT EXISTS work_actors (
        work_id INTEGER NOT NULL REFERENCES works (id) ON DELETE CASCADE,
        person_id INTEGER NOT NULL REFERENCES persons (id) ON DELETE CASCADE,
        PRIMARY KEY (work_id, person_id)
    )",
    r"
    CREATE TABLE IF NOT EXISTS work_directors (
        work_id INTEGER NOT NULL REFERENCES works (id) ON DELETE CASCADE,
        person_id INTEGER NOT NULL REFERENCES persons (id) ON DELETE CASCADE,
        PRIMARY KEY (work_id, person_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_work_actors_person ON work_actors (person_id)",
    "CREATE INDEX IF NOT EXISTS idx_work_directors_person ON work_directors (person_id)",
];

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 5).await
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::with_max_connections(&config.url, config.max_connections).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        if !in_memory {
            // Create database file directory if it doesn't exist
            let db_path = database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections.max(1));
        if in_memory {
            // Every connection to `:memory:` is its own database; keep exactly one alive
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;

        info!("Connected to catalog database {}", database_url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the catalog schema if it is not there yet
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("test.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url).await?;

        assert!(!db.pool().is_closed());
        assert!(db_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test_migration.db");
        let database_url = format!("sqlite:{}", db_path.display());

        let db = DatabaseConnection::new(&database_url).await?;
        db.migrate().await?;
        // Second run is a no-op
        db.migrate().await?;

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await?;

        assert_eq!(
            tables,
            vec![
                "dubbings",
                "genres",
                "person_professions",
                "persons",
                "professions",
                "work_actors",
                "work_directors",
                "work_dubbings",
                "work_genres",
                "works",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_database() -> Result<()> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate().await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM works").fetch_one(db.pool()).await?;
        assert_eq!(count, 0);
        Ok(())
    }
}
