//! Collection facade
//!
//! [`Collection`] wires one music source together: the database pool, the
//! event bus, the backend with its worker, the shared album icon cache and
//! the grouping model, configured from the persisted [`CollectionSettings`].
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .database_path(data_dir.join("collection.db"))
//!     .cache_dir(cache_dir)
//!     .settings_store(settings)
//!     .build()?;
//!
//! let mut collection = Collection::new(&config, CollectionTables::local()).await?;
//! collection.init().await?;
//!
//! // After the scanner wrote songs:
//! collection.backend().flush().await;
//! collection.run_pending_events();
//! ```

use crate::art_cache::AlbumIconCache;
use crate::backend::{CollectionBackend, SqliteCollectionBackend};
use crate::db::{create_pool, ensure_source_tables, CollectionTables, DatabaseConfig};
use crate::error::Result;
use crate::events::CollectionEvent;
use crate::model::CollectionModel;
use crate::settings::CollectionSettings;
use crate::song::Source;
use bridge_traits::storage::SettingsStore;
use core_runtime::config::{CoreConfig, DatabaseLocation};
use core_runtime::events::{EventBus, Receiver};
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, info, warn};

pub struct Collection {
    backend: Arc<SqliteCollectionBackend>,
    model: CollectionModel,
    events: Receiver<CollectionEvent>,
    icon_cache: Arc<AlbumIconCache>,
    settings_store: Arc<dyn SettingsStore>,
    settings: CollectionSettings,
}

impl Collection {
    /// Open the collection stored in `tables`. The local tables hold the
    /// file collection; any other tables are taken as a streaming mirror.
    pub async fn new(config: &CoreConfig, tables: CollectionTables) -> Result<Self> {
        let source = if tables.is_local() {
            Source::Collection
        } else {
            Source::Unknown
        };
        Self::for_source(config, tables, source).await
    }

    pub async fn for_source(
        config: &CoreConfig,
        tables: CollectionTables,
        source: Source,
    ) -> Result<Self> {
        let db_config = match &config.database {
            DatabaseLocation::File(path) => DatabaseConfig::new(path.clone()),
            DatabaseLocation::InMemory => DatabaseConfig::in_memory(),
        };
        let pool = create_pool(db_config).await?;
        ensure_source_tables(&pool, &tables).await?;

        let bus = EventBus::new(config.event_buffer_size);
        let events = bus.subscribe();
        let backend =
            SqliteCollectionBackend::new(pool, tables, source, bus, Arc::clone(&config.clock));

        let settings_store = Arc::clone(&config.settings_store);
        let settings = CollectionSettings::load(settings_store.as_ref()).await?;

        let mut icon_cache = AlbumIconCache::new(settings.memory_cache_bytes());
        if let Some(dir) = config.icon_cache_dir() {
            icon_cache = icon_cache.with_disk_dir(dir, settings.disk_cache_bytes());
        }
        let icon_cache = Arc::new(icon_cache);

        let backend_handle: Arc<dyn CollectionBackend> = backend.clone();
        let mut model = CollectionModel::new(
            backend_handle,
            Arc::clone(&settings_store),
            Arc::clone(&icon_cache),
        )
        .with_settings(&settings);
        if let Some(loader) = &config.cover_loader {
            model = model.with_cover_loader(Arc::clone(loader));
        }

        info!(
            source = source.text(),
            grouping = %settings.grouping,
            "Collection opened"
        );

        Ok(Self {
            backend,
            model,
            events,
            icon_cache,
            settings_store,
            settings,
        })
    }

    pub fn backend(&self) -> &Arc<SqliteCollectionBackend> {
        &self.backend
    }

    pub fn model(&self) -> &CollectionModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut CollectionModel {
        &mut self.model
    }

    pub fn icon_cache(&self) -> &Arc<AlbumIconCache> {
        &self.icon_cache
    }

    pub fn settings(&self) -> &CollectionSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut CollectionSettings {
        &mut self.settings
    }

    /// Expire long-unavailable songs, announce directories and totals, then
    /// load the model.
    pub async fn init(&mut self) -> Result<()> {
        if self.backend.tables().dirs.is_some() && self.settings.expire_unavailable_songs_days > 0
        {
            for directory in self.backend.get_all_directories().await? {
                self.backend
                    .expire_songs(directory.id, self.settings.expire_unavailable_songs_days)
                    .await?;
            }
        }

        self.backend.load_directories_async();
        self.backend.update_total_song_count_async();
        self.backend.update_total_artist_count_async();
        self.backend.update_total_album_count_async();

        self.model.init();
        self.model.wait_for_load().await?;
        self.backend.flush().await;
        self.run_pending_events();
        Ok(())
    }

    /// Re-read the persisted settings and apply them to the model.
    pub async fn reload_settings(&mut self) -> Result<()> {
        let settings = CollectionSettings::load(self.settings_store.as_ref()).await?;

        self.model.set_show_dividers(settings.show_dividers);
        self.model.set_pretty_covers(settings.pretty_covers);
        self.model.reload_settings(&settings);
        if settings.grouping != self.model.grouping() {
            self.model.set_group_by(settings.grouping);
        }
        if self.model.is_loading() {
            self.model.wait_for_load().await?;
            self.backend.flush().await;
            self.run_pending_events();
        }

        self.settings = settings;
        Ok(())
    }

    /// Persist the current settings, including the model's grouping.
    pub async fn save_settings(&mut self) -> Result<()> {
        self.settings.grouping = self.model.grouping();
        self.settings.show_dividers = self.model.show_dividers();
        self.settings.pretty_covers = self.model.pretty_covers();
        self.settings.save(self.settings_store.as_ref()).await
    }

    /// Feed every event the backend has published so far into the model,
    /// then apply finished loads and cover lookups.
    ///
    /// Returns how many backend events were handled.
    pub fn run_pending_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.model.handle_event(&event);
                    handled += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Collection events dropped, reloading the model");
                    self.model.init();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        self.model.process_pending();
        handled
    }

    /// Drain the backend's queue and close its pool. Events published on the
    /// way out still reach the model.
    pub async fn exit(mut self) -> Result<()> {
        self.backend.exit_async();
        loop {
            match self.events.recv().await {
                Ok(CollectionEvent::ExitFinished) => break,
                Ok(event) => self.model.handle_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Collection events dropped during exit");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("Collection closed");
        Ok(())
    }
}
