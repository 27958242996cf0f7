//! SQLite-backed collection backend: construction, locking, error reporting
//! and the queued entry points.

use super::{Album, AlbumList, CollectionBackend};
use crate::db::CollectionTables;
use crate::directory::{Directory, DirectoryList, SubdirectoryList};
use crate::error::{CollectionError, Result};
use crate::events::CollectionEvent;
use crate::query::{CollectionQuery, QueryOptions};
use crate::song::{Song, SongList, Source};
use crate::worker::TaskQueue;
use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_runtime::events::{EventBus, Receiver};
use core_runtime::logging::compact_sql;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, trace};

/// A pooled connection held together with the backend's database lock.
pub(super) struct DbSession<'a> {
    _lock: MutexGuard<'a, ()>,
    conn: PoolConnection<Sqlite>,
}

impl Deref for DbSession<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for DbSession<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

/// Collection backend over one set of SQLite tables.
///
/// Construct with [`SqliteCollectionBackend::new`] inside a tokio runtime;
/// the backend spawns its own worker loop.
pub struct SqliteCollectionBackend {
    pool: SqlitePool,
    tables: CollectionTables,
    source: Source,
    events: EventBus<CollectionEvent>,
    clock: Arc<dyn Clock>,
    db_lock: Mutex<()>,
    queue: TaskQueue<SqliteCollectionBackend>,
}

impl SqliteCollectionBackend {
    pub fn new(
        pool: SqlitePool,
        tables: CollectionTables,
        source: Source,
        events: EventBus<CollectionEvent>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        info!(
            songs_table = %tables.songs,
            source = source.text(),
            "Creating collection backend"
        );

        Arc::new_cyclic(|weak| Self {
            pool,
            tables,
            source,
            events,
            clock,
            db_lock: Mutex::new(()),
            queue: TaskQueue::spawn(weak.clone()),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn songs_table(&self) -> &str {
        &self.tables.songs
    }

    pub fn events(&self) -> &EventBus<CollectionEvent> {
        &self.events
    }

    /// Take the database lock and a connection.
    ///
    /// Held for the whole of one operation so operations never interleave.
    pub(super) async fn session(&self) -> Result<DbSession<'_>> {
        let lock = self.db_lock.lock().await;
        let conn = self.pool.acquire().await?;
        Ok(DbSession { _lock: lock, conn })
    }

    pub(super) fn dirs_table(&self) -> Result<&str> {
        self.tables.dirs.as_deref().ok_or_else(|| {
            CollectionError::invalid_input(
                "directories",
                format!("{} has no directory table", self.tables.songs),
            )
        })
    }

    pub(super) fn subdirs_table(&self) -> Result<&str> {
        self.tables.subdirs.as_deref().ok_or_else(|| {
            CollectionError::invalid_input(
                "subdirectories",
                format!("{} has no subdirectory table", self.tables.songs),
            )
        })
    }

    /// `SELECT <song columns> FROM <songs table> <tail>`
    pub(super) fn select_songs(&self, tail: &str) -> String {
        let table = &self.tables.songs;
        format!("SELECT {} FROM {} {}", Song::select_spec(table), table, tail)
    }

    pub(super) fn emit(&self, event: CollectionEvent) {
        if self.events.emit(event).is_err() {
            trace!("Collection event dropped, no subscribers");
        }
    }

    /// Emit discovered/deleted notifications for a finished write.
    pub(super) fn emit_changes(&self, deleted: SongList, added: SongList) {
        if !deleted.is_empty() {
            self.emit(CollectionEvent::SongsDeleted { songs: deleted });
        }
        if !added.is_empty() {
            self.emit(CollectionEvent::SongsDiscovered { songs: added });
        }
    }

    /// Log an error with its SQL context and broadcast it.
    pub fn report_error(&self, err: &CollectionError) {
        let message = match err {
            CollectionError::Query {
                source,
                sql,
                bound_values,
            } => {
                error!(
                    error = %source,
                    sql = %compact_sql(sql),
                    bound_values = ?bound_values,
                    songs_table = %self.tables.songs,
                    "Unable to execute collection SQL query"
                );
                format!(
                    "Unable to execute collection SQL query: {}\nFaulty SQL query: {}",
                    source, sql
                )
            }
            other => {
                error!(
                    error = %other,
                    songs_table = %self.tables.songs,
                    "Collection operation failed"
                );
                other.to_string()
            }
        };

        self.emit(CollectionEvent::Error { message });
    }

    /// Report a failed result and hand it back unchanged.
    pub(super) fn finish<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.report_error(e);
        }
        result
    }

    /// Queue `job` on the worker. Failures were already reported by the job.
    fn enqueue<F, Fut, T>(&self, name: &'static str, job: F)
    where
        F: FnOnce(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.queue.enqueue(move |backend| {
            Box::pin(async move {
                if let Err(e) = job(backend).await {
                    debug!(job = name, error = %e, "Queued collection job failed");
                }
            })
        });
    }

    /// Refresh the three totals after a write has committed.
    pub(super) fn schedule_count_updates(&self) {
        self.update_total_song_count_async();
        self.update_total_artist_count_async();
        self.update_total_album_count_async();
    }

    pub fn increment_play_count_async(&self, id: i64) {
        self.enqueue("increment_play_count", move |b| async move {
            b.increment_play_count(id).await
        });
    }

    pub fn increment_skip_count_async(&self, id: i64, progress: f32) {
        self.enqueue("increment_skip_count", move |b| async move {
            b.increment_skip_count(id, progress).await
        });
    }

    pub fn reset_statistics_async(&self, id: i64) {
        self.enqueue("reset_statistics", move |b| async move {
            b.reset_statistics(id).await
        });
    }

    pub fn update_song_rating_async(&self, id: i64, rating: f64) {
        self.enqueue("update_song_rating", move |b| async move {
            b.update_song_rating(id, rating).await
        });
    }

    pub fn update_songs_rating_async(&self, ids: Vec<i64>, rating: f64) {
        self.enqueue("update_songs_rating", move |b| async move {
            b.update_songs_rating(&ids, rating).await
        });
    }
}

#[async_trait]
impl CollectionBackend for SqliteCollectionBackend {
    fn tables(&self) -> &CollectionTables {
        &self.tables
    }

    fn source(&self) -> Source {
        self.source
    }

    fn subscribe(&self) -> Receiver<CollectionEvent> {
        self.events.subscribe()
    }

    fn now(&self) -> i64 {
        self.clock.unix_timestamp()
    }

    async fn flush(&self) {
        self.queue.flush().await;
    }

    fn get_all_songs_async(&self, id: u64) {
        self.enqueue("get_all_songs", move |b| async move {
            b.get_all_songs(id).await
        });
    }

    fn load_directories_async(&self) {
        self.enqueue("load_directories", |b| async move {
            b.load_directories().await
        });
    }

    fn update_total_song_count_async(&self) {
        self.enqueue("update_total_song_count", |b| async move {
            b.update_total_song_count().await
        });
    }

    fn update_total_artist_count_async(&self) {
        self.enqueue("update_total_artist_count", |b| async move {
            b.update_total_artist_count().await
        });
    }

    fn update_total_album_count_async(&self) {
        self.enqueue("update_total_album_count", |b| async move {
            b.update_total_album_count().await
        });
    }

    fn add_or_update_songs_async(&self, songs: SongList) {
        self.enqueue("add_or_update_songs", move |b| async move {
            SqliteCollectionBackend::add_or_update_songs(&b, songs).await
        });
    }

    fn update_songs_by_song_id_async(&self, songs: SongList) {
        self.enqueue("update_songs_by_song_id", move |b| async move {
            SqliteCollectionBackend::update_songs_by_song_id(&b, songs).await
        });
    }

    fn update_manual_album_art_async(
        &self,
        effective_albumartist: String,
        album: String,
        cover_url: String,
        clear_art_automatic: bool,
    ) {
        self.enqueue("update_manual_album_art", move |b| async move {
            b.update_manual_album_art(
                &effective_albumartist,
                &album,
                &cover_url,
                clear_art_automatic,
            )
            .await
        });
    }

    fn update_automatic_album_art_async(
        &self,
        effective_albumartist: String,
        album: String,
        cover_url: String,
    ) {
        self.enqueue("update_automatic_album_art", move |b| async move {
            b.update_automatic_album_art(&effective_albumartist, &album, &cover_url)
                .await
        });
    }

    fn exit_async(&self) {
        self.enqueue("exit", |b| async move {
            {
                let _lock = b.db_lock.lock().await;
                b.pool.close().await;
            }
            info!(songs_table = %b.tables.songs, "Collection backend closed");
            b.emit(CollectionEvent::ExitFinished);
            Ok(())
        });
    }

    async fn find_songs_in_directory(&self, directory_id: i64) -> Result<SongList> {
        SqliteCollectionBackend::find_songs_in_directory(self, directory_id).await
    }

    async fn songs_with_missing_fingerprint(&self, directory_id: i64) -> Result<SongList> {
        SqliteCollectionBackend::songs_with_missing_fingerprint(self, directory_id).await
    }

    async fn subdirs_in_directory(&self, directory_id: i64) -> Result<SubdirectoryList> {
        SqliteCollectionBackend::subdirs_in_directory(self, directory_id).await
    }

    async fn get_all_directories(&self) -> Result<DirectoryList> {
        SqliteCollectionBackend::get_all_directories(self).await
    }

    async fn change_dir_path(&self, id: i64, old_path: &str, new_path: &str) -> Result<()> {
        SqliteCollectionBackend::change_dir_path(self, id, old_path, new_path).await
    }

    async fn get_all_artists(&self, options: &QueryOptions) -> Result<Vec<String>> {
        SqliteCollectionBackend::get_all_artists(self, options).await
    }

    async fn get_all_artists_with_albums(&self, options: &QueryOptions) -> Result<Vec<String>> {
        SqliteCollectionBackend::get_all_artists_with_albums(self, options).await
    }

    async fn get_artist_songs(
        &self,
        effective_albumartist: &str,
        options: &QueryOptions,
    ) -> Result<SongList> {
        SqliteCollectionBackend::get_artist_songs(self, effective_albumartist, options).await
    }

    async fn get_album_songs(
        &self,
        effective_albumartist: &str,
        album: &str,
        options: &QueryOptions,
    ) -> Result<SongList> {
        SqliteCollectionBackend::get_album_songs(self, effective_albumartist, album, options).await
    }

    async fn get_songs_by_album(&self, album: &str, options: &QueryOptions) -> Result<SongList> {
        SqliteCollectionBackend::get_songs_by_album(self, album, options).await
    }

    async fn get_compilation_songs(
        &self,
        album: &str,
        options: &QueryOptions,
    ) -> Result<SongList> {
        SqliteCollectionBackend::get_compilation_songs(self, album, options).await
    }

    async fn get_all_albums(&self, options: &QueryOptions) -> Result<AlbumList> {
        SqliteCollectionBackend::get_all_albums(self, options).await
    }

    async fn get_albums_by_artist(
        &self,
        artist: &str,
        options: &QueryOptions,
    ) -> Result<AlbumList> {
        SqliteCollectionBackend::get_albums_by_artist(self, artist, options).await
    }

    async fn get_compilation_albums(&self, options: &QueryOptions) -> Result<AlbumList> {
        SqliteCollectionBackend::get_compilation_albums(self, options).await
    }

    async fn get_album_art(&self, effective_albumartist: &str, album: &str) -> Result<Album> {
        SqliteCollectionBackend::get_album_art(self, effective_albumartist, album).await
    }

    async fn get_song_by_id(&self, id: i64) -> Result<Option<Song>> {
        SqliteCollectionBackend::get_song_by_id(self, id).await
    }

    async fn get_songs_by_fingerprint(&self, fingerprint: &str) -> Result<SongList> {
        SqliteCollectionBackend::get_songs_by_fingerprint(self, fingerprint).await
    }

    async fn get_songs_by_url(&self, url: &str, unavailable: bool) -> Result<SongList> {
        SqliteCollectionBackend::get_songs_by_url(self, url, unavailable).await
    }

    async fn get_song_by_url(&self, url: &str, beginning: i64) -> Result<Option<Song>> {
        SqliteCollectionBackend::get_song_by_url(self, url, beginning).await
    }

    async fn exec_collection_query(&self, query: CollectionQuery) -> Result<SongList> {
        SqliteCollectionBackend::exec_collection_query(self, query).await
    }

    async fn add_directory(&self, path: &str) -> Result<Directory> {
        SqliteCollectionBackend::add_directory(self, path).await
    }

    async fn remove_directory(&self, directory: &Directory) -> Result<()> {
        SqliteCollectionBackend::remove_directory(self, directory).await
    }

    async fn add_or_update_songs(&self, songs: SongList) -> Result<()> {
        SqliteCollectionBackend::add_or_update_songs(self, songs).await
    }

    async fn update_songs_by_song_id(&self, songs: SongList) -> Result<()> {
        SqliteCollectionBackend::update_songs_by_song_id(self, songs).await
    }

    async fn compilations_need_updating(&self) -> Result<()> {
        SqliteCollectionBackend::compilations_need_updating(self).await
    }

    async fn expire_songs(&self, directory_id: i64, expire_days: i64) -> Result<()> {
        SqliteCollectionBackend::expire_songs(self, directory_id, expire_days).await
    }
}
