//! # Music Collection Module
//!
//! Stores the songs of a music collection in SQLite and presents them as a
//! grouped, browsable tree.
//!
//! ## Overview
//!
//! This module manages:
//! - The songs, directories and subdirectories tables of each music source
//! - A SQL query builder driven by per-view query options
//! - A storage backend with a serial worker and post-commit change events
//! - The grouping tree model with dividers, "Various artists" nodes and
//!   album covers from a two-tier icon cache
//! - Persisted collection settings and saved groupings

pub mod art_cache;
pub mod backend;
pub mod collection;
pub mod db;
pub mod directory;
pub mod error;
pub mod events;
pub mod model;
pub mod query;
pub mod settings;
pub mod song;
pub mod sql;
pub mod worker;

pub use art_cache::{AlbumIconCache, CachedIcon};
pub use backend::{Album, AlbumList, CollectionBackend, SqliteCollectionBackend};
pub use collection::Collection;
pub use db::{CollectionTables, DatabaseConfig};
pub use directory::{Directory, DirectoryList, Subdirectory, SubdirectoryList};
pub use error::{CollectionError, Result};
pub use events::CollectionEvent;
pub use model::{
    CollectionFilter, CollectionItem, CollectionModel, Decoration, GroupBy, Grouping, ItemData,
    ItemFlags, ItemType, NodeId, NoopObserver, Role, SongMimeData, TreeObserver,
};
pub use query::{CollectionQuery, QueryMode, QueryOptions};
pub use settings::{CacheSizeUnit, CollectionSettings};
pub use song::{FileType, Song, SongList, Source};
pub use sql::QueryValue;
