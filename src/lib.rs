//! Workspace facade crate.
//!
//! Re-exports the public API of the collection workspace so host
//! applications can depend on a single crate: the host bridge traits, the
//! runtime configuration and logging, and the music collection itself.

pub use bridge_traits as bridge;
pub use core_collection as collection;
pub use core_runtime as runtime;

pub use bridge_traits::{CoverArtLoader, MemorySettingsStore, SettingsStore};
pub use core_collection::{
    Collection, CollectionBackend, CollectionError, CollectionEvent, CollectionModel,
    CollectionTables, GroupBy, Grouping, Song,
};
pub use core_runtime::config::CoreConfig;
