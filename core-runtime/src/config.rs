//! # Core Configuration Module
//!
//! The configuration system uses a builder to construct a [`CoreConfig`]
//! holding the storage location, cache directory and every host bridge the
//! collection needs. Validation is fail-fast: a missing required bridge is
//! reported with an actionable [`Error::CapabilityMissing`] before anything is
//! opened.
//!
//! ## Required Dependencies
//!
//! - `SettingsStore` - grouping choice, cache sizes, disk cache enablement
//!
//! ## Optional Dependencies
//!
//! - `Clock` - defaults to [`SystemClock`]
//! - `CoverArtLoader` - without one, album icons stay at their placeholder
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::MemorySettingsStore;
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/home/me/.local/share/player/collection.db")
//!     .cache_dir("/home/me/.cache/player")
//!     .settings_store(Arc::new(MemorySettingsStore::new()))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, CoverArtLoader, SettingsStore, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;

/// Upper bound on the per-subscriber event buffer.
pub const MAX_EVENT_BUFFER_SIZE: usize = 10_000;

/// Where the collection database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// SQLite file on disk
    File(PathBuf),
    /// Private in-memory database, gone when the pool closes
    InMemory,
}

/// Core configuration for the collection runtime.
#[derive(Clone)]
pub struct CoreConfig {
    /// SQLite storage target
    pub database: DatabaseLocation,

    /// Directory holding on-disk caches (album icons)
    pub cache_dir: Option<PathBuf>,

    /// Per-subscriber event buffer size
    pub event_buffer_size: usize,

    /// User preferences storage (required)
    pub settings_store: Arc<dyn SettingsStore>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// Album cover loader (optional)
    pub cover_loader: Option<Arc<dyn CoverArtLoader>>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database", &self.database)
            .field("cache_dir", &self.cache_dir)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("settings_store", &"SettingsStore { ... }")
            .field("clock", &"Clock { ... }")
            .field(
                "cover_loader",
                &self.cover_loader.as_ref().map(|_| "CoverArtLoader { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - A database file path, when given, is not empty
    /// - The cache directory, when given, is not empty
    /// - The event buffer size is within `1..=MAX_EVENT_BUFFER_SIZE`
    pub fn validate(&self) -> Result<()> {
        if let DatabaseLocation::File(path) = &self.database {
            if path.as_os_str().is_empty() {
                return Err(Error::Config(
                    "Database path cannot be empty. Use .in_memory_database() for a \
                     throwaway collection."
                        .to_string(),
                ));
            }
        }

        if let Some(cache_dir) = &self.cache_dir {
            if cache_dir.as_os_str().is_empty() {
                return Err(Error::Config("Cache directory cannot be empty".to_string()));
            }
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "Event buffer size exceeds maximum of {}",
                MAX_EVENT_BUFFER_SIZE
            )));
        }

        Ok(())
    }

    /// Directory for the on-disk album icon cache, if a cache dir is set.
    pub fn icon_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join("pixmapcache"))
    }
}

fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for collection preferences \
                  (grouping, cache sizes, disk cache). Inject the host's settings backend, \
                  or bridge_traits::MemorySettingsStore for tests."
            .to_string(),
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database: Option<DatabaseLocation>,
    cache_dir: Option<PathBuf>,
    event_buffer_size: Option<usize>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    clock: Option<Arc<dyn Clock>>,
    cover_loader: Option<Arc<dyn CoverArtLoader>>,
}

impl CoreConfigBuilder {
    /// Sets the database file path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().database_path("/tmp/collection.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database = Some(DatabaseLocation::File(path.into()));
        self
    }

    /// Uses a private in-memory database.
    pub fn in_memory_database(mut self) -> Self {
        self.database = Some(DatabaseLocation::InMemory);
        self
    }

    /// Sets the cache directory.
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Sets the per-subscriber event buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the settings store (required).
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Overrides the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the album cover loader.
    pub fn cover_loader(mut self, loader: Arc<dyn CoverArtLoader>) -> Self {
        self.cover_loader = Some(loader);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when no settings store was injected
    /// - [`Error::Config`] when a value fails validation
    pub fn build(self) -> Result<CoreConfig> {
        let settings_store = self.settings_store.ok_or_else(settings_store_missing_error)?;

        let config = CoreConfig {
            database: self.database.unwrap_or(DatabaseLocation::InMemory),
            cache_dir: self.cache_dir,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            settings_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            cover_loader: self.cover_loader,
        };

        config.validate()?;

        Ok(config)
    }
}
