//! # Database Connection Pool Module
//!
//! SQLite connection pooling for collection storage.
//!
//! ## Features
//!
//! - **WAL Mode**: multiple readers alongside the single backend writer
//! - **Statement Caching**: prepared statements are cached per connection
//! - **Automatic Migrations**: the local collection schema is applied on open
//! - **Per-source tables**: streaming sources get their own songs table with
//!   the same layout as the local one
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_collection::db::{create_pool, ensure_source_tables, CollectionTables, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("collection.db")).await?;
//! let tidal = CollectionTables::for_service("tidal")?;
//! ensure_source_tables(&pool, &tidal).await?;
//! ```
//!
//! ## Testing
//!
//! ```rust,ignore
//! let pool = create_test_pool().await?;
//! ```

use crate::error::{CollectionError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database configuration for the SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:<path>` or `sqlite::memory:`
    pub database_url: String,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    /// Maximum lifetime of a connection
    pub max_lifetime: Option<Duration>,

    /// Maximum idle time for a connection before being closed
    pub idle_timeout: Option<Duration>,

    /// Number of prepared statements cached per connection
    pub statement_cache_capacity: usize,
}

impl DatabaseConfig {
    /// Create a configuration for a database file.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        let database_url = format!("sqlite:{}", path.display());

        Self {
            database_url,
            min_connections: 1,
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Some(Duration::from_secs(1800)),
            idle_timeout: Some(Duration::from_secs(600)),
            statement_cache_capacity: 100,
        }
    }

    /// Create a configuration for a private in-memory database.
    ///
    /// Every SQLite in-memory connection opens its own database, so the pool
    /// is pinned to one connection that never expires.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: None,
            idle_timeout: None,
            statement_cache_capacity: 100,
        }
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Table names for one logical collection (one music source).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTables {
    pub songs: String,
    /// Watched directories; only sources backed by a filesystem have them
    pub dirs: Option<String>,
    pub subdirs: Option<String>,
}

impl CollectionTables {
    /// The local file collection.
    pub fn local() -> Self {
        Self {
            songs: "songs".to_string(),
            dirs: Some("directories".to_string()),
            subdirs: Some("subdirectories".to_string()),
        }
    }

    /// A streaming service mirror: `{prefix}_songs`, no directory tables.
    pub fn for_service(prefix: &str) -> Result<Self> {
        let valid = !prefix.is_empty()
            && prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(CollectionError::invalid_input(
                "prefix",
                format!("'{}' is not a valid table prefix", prefix),
            ));
        }

        Ok(Self {
            songs: format!("{}_songs", prefix),
            dirs: None,
            subdirs: None,
        })
    }

    pub fn is_local(&self) -> bool {
        self.songs == "songs"
    }
}

/// Create a configured SQLite connection pool
///
/// This function:
/// 1. Configures SQLite connection options (WAL mode, synchronous NORMAL)
/// 2. Creates a connection pool with the specified configuration
/// 3. Runs database migrations
/// 4. Performs a health check
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        database_url = %config.database_url,
        min_connections = config.min_connections,
        max_connections = config.max_connections,
        "Creating collection database pool"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(CollectionError::Database)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .create_if_missing(true)
        .pragma("cache_size", "-16000")
        .pragma("temp_store", "MEMORY")
        .statement_cache_capacity(config.statement_cache_capacity);

    debug!("SQLite connection options configured");

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            CollectionError::Database(e)
        })?;

    info!(connections = pool.size(), "Collection database pool created");

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// In-memory pool with the schema applied.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

/// Create the songs (and directory) tables of a non-local source.
///
/// The tables copy the column layout of the local ones; the local tables
/// themselves come from the migrations.
pub async fn ensure_source_tables(pool: &Pool<Sqlite>, tables: &CollectionTables) -> Result<()> {
    if tables.is_local() {
        return Ok(());
    }

    info!(songs_table = %tables.songs, "Ensuring source tables");

    let mut statements = vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {0} AS SELECT * FROM songs WHERE 0",
            tables.songs
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_song_id ON {0} (song_id)",
            tables.songs
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_album ON {0} (album)",
            tables.songs
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_url ON {0} (url)",
            tables.songs
        ),
    ];
    if let Some(dirs) = &tables.dirs {
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} AS SELECT * FROM directories WHERE 0",
            dirs
        ));
    }
    if let Some(subdirs) = &tables.subdirs {
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} AS SELECT * FROM subdirectories WHERE 0",
            subdirs
        ));
    }

    for statement in statements {
        sqlx::query(&statement).execute(pool).await.map_err(|e| {
            warn!(error = %e, sql = %statement, "Failed to create source table");
            CollectionError::Database(e)
        })?;
    }

    Ok(())
}

/// Apply the embedded migrations from `migrations/`.
async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    info!("Running collection migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Migration failed");
            CollectionError::Migration(e.to_string())
        })?;

    info!("Collection migrations completed");
    Ok(())
}

async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    debug!("Performing database health check");

    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Database health check failed");
        CollectionError::Database(e)
    })?;

    debug!("Database health check passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table_exists(pool: &Pool<Sqlite>, kind: &str, name: &str) -> bool {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = ? AND name = ?")
                .bind(kind)
                .bind(name)
                .fetch_one(pool)
                .await
                .unwrap();
        result.0 == 1
    }

    #[tokio::test]
    async fn test_create_test_pool() {
        let pool = create_test_pool().await;
        assert!(pool.is_ok(), "Should create test pool successfully");
    }

    #[tokio::test]
    async fn test_health_check() {
        let pool = create_test_pool().await.unwrap();
        assert!(health_check(&pool).await.is_ok());
    }

    #[tokio::test]
    async fn test_database_config_builder() {
        let config = DatabaseConfig::new("/tmp/collection.db")
            .min_connections(2)
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(60))
            .statement_cache_capacity(200);

        assert_eq!(config.database_url, "sqlite:/tmp/collection.db");
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(60));
        assert_eq!(config.statement_cache_capacity, 200);
        assert!(!config.is_in_memory());
        assert!(DatabaseConfig::default().is_in_memory());
    }

    #[tokio::test]
    async fn test_migrations_create_schema() {
        let pool = create_test_pool().await.unwrap();

        assert!(table_exists(&pool, "table", "songs").await);
        assert!(table_exists(&pool, "table", "directories").await);
        assert!(table_exists(&pool, "table", "subdirectories").await);
        assert!(table_exists(&pool, "view", "duplicated_songs").await);
    }

    #[tokio::test]
    async fn test_ensure_source_tables() {
        let pool = create_test_pool().await.unwrap();
        let tables = CollectionTables::for_service("tidal").unwrap();

        ensure_source_tables(&pool, &tables).await.unwrap();
        // Idempotent
        ensure_source_tables(&pool, &tables).await.unwrap();

        assert!(table_exists(&pool, "table", "tidal_songs").await);

        let columns: Vec<(i64, String, String, i64, Option<String>, i64)> =
            sqlx::query_as("PRAGMA table_info(tidal_songs)")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(columns.iter().any(|c| c.1 == "compilation_effective"));
    }

    #[test]
    fn test_service_prefix_validation() {
        assert!(CollectionTables::for_service("qobuz").is_ok());
        assert!(CollectionTables::for_service("").is_err());
        assert!(CollectionTables::for_service("x; DROP TABLE songs").is_err());
        assert!(CollectionTables::local().is_local());
    }
}
