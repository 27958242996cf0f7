//! Collection storage backend.
//!
//! One backend owns the tables of one music source (see
//! [`CollectionTables`](crate::db::CollectionTables)) and is the only reader
//! and writer of them. Mutations run inside a transaction and are followed,
//! after commit, by a [`CollectionEvent`](crate::events::CollectionEvent)
//! describing exactly which songs were added, removed or changed.
//!
//! [`CollectionBackend`] is the surface the model and the facade consume;
//! [`SqliteCollectionBackend`] implements it and adds the scanner-facing and
//! statistics operations as inherent methods.

mod compilations;
mod directories;
mod reads;
mod songs;
mod sqlite;
mod statistics;

#[cfg(test)]
mod tests;

pub use sqlite::SqliteCollectionBackend;

use crate::db::CollectionTables;
use crate::directory::{Directory, DirectoryList, SubdirectoryList};
use crate::error::Result;
use crate::events::CollectionEvent;
use crate::query::{CollectionQuery, QueryOptions};
use crate::song::{FileType, Song, SongList, Source};
use async_trait::async_trait;
use core_runtime::events::Receiver;
use serde::{Deserialize, Serialize};

/// An album as listed by the album queries: one entry per
/// (album artist, album, file type).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Album {
    /// Empty for compilations
    pub album_artist: String,
    pub album: String,
    pub art_automatic: String,
    pub art_manual: String,
    pub urls: Vec<String>,
    pub filetype: FileType,
    pub cue_path: String,
}

pub type AlbumList = Vec<Album>;

/// Storage operations shared by every music source.
///
/// Methods returning `Result` have already reported any SQL failure through
/// the event bus before returning it. `*_async` methods queue the work on
/// the backend's worker and return immediately.
#[async_trait]
pub trait CollectionBackend: Send + Sync {
    fn tables(&self) -> &CollectionTables;

    fn source(&self) -> Source;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> Receiver<CollectionEvent>;

    /// Current unix time in seconds, from the backend's clock.
    fn now(&self) -> i64;

    /// Wait for all queued work, including follow-up count updates.
    async fn flush(&self);

    fn get_all_songs_async(&self, id: u64);
    fn load_directories_async(&self);
    fn update_total_song_count_async(&self);
    fn update_total_artist_count_async(&self);
    fn update_total_album_count_async(&self);
    fn add_or_update_songs_async(&self, songs: SongList);
    fn update_songs_by_song_id_async(&self, songs: SongList);
    fn update_manual_album_art_async(
        &self,
        effective_albumartist: String,
        album: String,
        cover_url: String,
        clear_art_automatic: bool,
    );
    fn update_automatic_album_art_async(
        &self,
        effective_albumartist: String,
        album: String,
        cover_url: String,
    );
    /// Close the pool once queued work has drained, then emit `ExitFinished`.
    fn exit_async(&self);

    async fn find_songs_in_directory(&self, directory_id: i64) -> Result<SongList>;
    async fn songs_with_missing_fingerprint(&self, directory_id: i64) -> Result<SongList>;
    async fn subdirs_in_directory(&self, directory_id: i64) -> Result<SubdirectoryList>;
    async fn get_all_directories(&self) -> Result<DirectoryList>;
    async fn change_dir_path(&self, id: i64, old_path: &str, new_path: &str) -> Result<()>;

    async fn get_all_artists(&self, options: &QueryOptions) -> Result<Vec<String>>;
    async fn get_all_artists_with_albums(&self, options: &QueryOptions) -> Result<Vec<String>>;
    async fn get_artist_songs(
        &self,
        effective_albumartist: &str,
        options: &QueryOptions,
    ) -> Result<SongList>;
    async fn get_album_songs(
        &self,
        effective_albumartist: &str,
        album: &str,
        options: &QueryOptions,
    ) -> Result<SongList>;
    async fn get_songs_by_album(&self, album: &str, options: &QueryOptions) -> Result<SongList>;
    async fn get_compilation_songs(&self, album: &str, options: &QueryOptions)
        -> Result<SongList>;

    async fn get_all_albums(&self, options: &QueryOptions) -> Result<AlbumList>;
    async fn get_albums_by_artist(&self, artist: &str, options: &QueryOptions)
        -> Result<AlbumList>;
    async fn get_compilation_albums(&self, options: &QueryOptions) -> Result<AlbumList>;
    async fn get_album_art(&self, effective_albumartist: &str, album: &str) -> Result<Album>;

    async fn get_song_by_id(&self, id: i64) -> Result<Option<Song>>;
    async fn get_songs_by_fingerprint(&self, fingerprint: &str) -> Result<SongList>;
    /// All sections of the file at `url`.
    async fn get_songs_by_url(&self, url: &str, unavailable: bool) -> Result<SongList>;
    /// The section of the file at `url` starting at `beginning`.
    async fn get_song_by_url(&self, url: &str, beginning: i64) -> Result<Option<Song>>;

    /// Run a builder query, selecting full song rows.
    async fn exec_collection_query(&self, query: CollectionQuery) -> Result<SongList>;

    async fn add_directory(&self, path: &str) -> Result<Directory>;
    async fn remove_directory(&self, directory: &Directory) -> Result<()>;

    async fn add_or_update_songs(&self, songs: SongList) -> Result<()>;
    async fn update_songs_by_song_id(&self, songs: SongList) -> Result<()>;
    async fn compilations_need_updating(&self) -> Result<()>;
    async fn expire_songs(&self, directory_id: i64, expire_days: i64) -> Result<()>;
}
