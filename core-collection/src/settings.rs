//! Persisted collection settings
//!
//! Typed view over the host [`SettingsStore`]. Everything lives in two
//! groups:
//!
//! - `Collection/*`: grouping levels, dividers, covers, icon cache limits
//!   and the expiry of unavailable songs
//! - `SavedGroupings/*`: named groupings (`"a,b,c"` code triples) plus a
//!   `version` marker
//!
//! ## Example
//!
//! ```ignore
//! use core_collection::settings::CollectionSettings;
//!
//! let mut settings = CollectionSettings::load(store.as_ref()).await?;
//! settings.show_dividers = false;
//! settings.save(store.as_ref()).await?;
//! ```

use crate::error::{CollectionError, Result};
use crate::model::grouping::{GroupBy, Grouping};
use bridge_traits::storage::{group_key, SettingsStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const SETTINGS_GROUP: &str = "Collection";
pub const SAVED_GROUPINGS_GROUP: &str = "SavedGroupings";

/// Format version written next to saved groupings.
pub const SAVED_GROUPINGS_VERSION: &str = "1";

const VERSION_KEY: &str = "version";

const DEFAULT_CACHE_SIZE: i64 = 80;
const DEFAULT_DISK_CACHE_SIZE: i64 = 360;
const DEFAULT_EXPIRE_DAYS: i64 = 60;

/// Unit a cache size setting is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CacheSizeUnit {
    KB,
    #[default]
    MB,
    GB,
    TB,
}

impl CacheSizeUnit {
    pub fn code(self) -> i64 {
        match self {
            CacheSizeUnit::KB => 0,
            CacheSizeUnit::MB => 1,
            CacheSizeUnit::GB => 2,
            CacheSizeUnit::TB => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(CacheSizeUnit::KB),
            1 => Some(CacheSizeUnit::MB),
            2 => Some(CacheSizeUnit::GB),
            3 => Some(CacheSizeUnit::TB),
            _ => None,
        }
    }
}

/// Size in bytes of `size` expressed in `unit`.
pub fn maximum_cache_size(size: i64, unit: CacheSizeUnit) -> u64 {
    let mut bytes = u64::try_from(size.max(0)).unwrap_or(0);
    for _ in 0..=unit.code() {
        bytes = bytes.saturating_mul(1024);
    }
    bytes
}

/// Everything the collection reads from the settings store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSettings {
    pub grouping: Grouping,
    pub show_dividers: bool,
    pub pretty_covers: bool,
    pub disk_cache_enable: bool,
    pub cache_size: i64,
    pub cache_size_unit: CacheSizeUnit,
    pub disk_cache_size: i64,
    pub disk_cache_size_unit: CacheSizeUnit,
    /// Unavailable songs are deleted after this many days; 0 keeps them
    pub expire_unavailable_songs_days: i64,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            grouping: Grouping::default(),
            show_dividers: true,
            pretty_covers: true,
            disk_cache_enable: false,
            cache_size: DEFAULT_CACHE_SIZE,
            cache_size_unit: CacheSizeUnit::MB,
            disk_cache_size: DEFAULT_DISK_CACHE_SIZE,
            disk_cache_size_unit: CacheSizeUnit::MB,
            expire_unavailable_songs_days: DEFAULT_EXPIRE_DAYS,
        }
    }
}

fn key(name: &str) -> String {
    group_key(SETTINGS_GROUP, name)
}

async fn load_unit(
    store: &dyn SettingsStore,
    name: &str,
    default: CacheSizeUnit,
) -> Result<CacheSizeUnit> {
    match store.get_i64(&key(name)).await? {
        None => Ok(default),
        Some(code) => Ok(CacheSizeUnit::from_code(code).unwrap_or_else(|| {
            warn!(setting = name, code, "Unknown cache size unit, using default");
            default
        })),
    }
}

impl CollectionSettings {
    /// Read every setting, falling back to the default for missing keys.
    pub async fn load(store: &dyn SettingsStore) -> Result<Self> {
        let defaults = Self::default();

        let mut levels = *defaults.grouping.levels();
        for (index, level) in levels.iter_mut().enumerate() {
            let name = format!("group_by{}", index + 1);
            if let Some(code) = store.get_i64(&key(&name)).await? {
                match GroupBy::from_code(code) {
                    Some(group_by) => *level = group_by,
                    None => warn!(setting = %name, code, "Unknown grouping code, using default"),
                }
            }
        }

        let settings = Self {
            grouping: Grouping::new(levels[0], levels[1], levels[2]),
            show_dividers: store
                .get_bool(&key("show_dividers"))
                .await?
                .unwrap_or(defaults.show_dividers),
            pretty_covers: store
                .get_bool(&key("pretty_covers"))
                .await?
                .unwrap_or(defaults.pretty_covers),
            disk_cache_enable: store
                .get_bool(&key("disk_cache_enable"))
                .await?
                .unwrap_or(defaults.disk_cache_enable),
            cache_size: store
                .get_i64(&key("cache_size"))
                .await?
                .unwrap_or(defaults.cache_size),
            cache_size_unit: load_unit(store, "cache_size_unit", defaults.cache_size_unit).await?,
            disk_cache_size: store
                .get_i64(&key("disk_cache_size"))
                .await?
                .unwrap_or(defaults.disk_cache_size),
            disk_cache_size_unit: load_unit(
                store,
                "disk_cache_size_unit",
                defaults.disk_cache_size_unit,
            )
            .await?,
            expire_unavailable_songs_days: store
                .get_i64(&key("expire_unavailable_songs"))
                .await?
                .unwrap_or(defaults.expire_unavailable_songs_days),
        };

        debug!(grouping = %settings.grouping, "Collection settings loaded");
        Ok(settings)
    }

    pub async fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        for (index, level) in self.grouping.levels().iter().enumerate() {
            store
                .set_i64(&key(&format!("group_by{}", index + 1)), level.code())
                .await?;
        }
        store
            .set_bool(&key("show_dividers"), self.show_dividers)
            .await?;
        store
            .set_bool(&key("pretty_covers"), self.pretty_covers)
            .await?;
        store
            .set_bool(&key("disk_cache_enable"), self.disk_cache_enable)
            .await?;
        store.set_i64(&key("cache_size"), self.cache_size).await?;
        store
            .set_i64(&key("cache_size_unit"), self.cache_size_unit.code())
            .await?;
        store
            .set_i64(&key("disk_cache_size"), self.disk_cache_size)
            .await?;
        store
            .set_i64(&key("disk_cache_size_unit"), self.disk_cache_size_unit.code())
            .await?;
        store
            .set_i64(
                &key("expire_unavailable_songs"),
                self.expire_unavailable_songs_days,
            )
            .await?;
        debug!(grouping = %self.grouping, "Collection settings saved");
        Ok(())
    }

    /// In-memory icon cache limit in bytes.
    pub fn memory_cache_bytes(&self) -> u64 {
        maximum_cache_size(self.cache_size, self.cache_size_unit)
    }

    /// On-disk icon cache limit in bytes.
    pub fn disk_cache_bytes(&self) -> u64 {
        maximum_cache_size(self.disk_cache_size, self.disk_cache_size_unit)
    }
}

fn validate_grouping_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CollectionError::invalid_input(
            "grouping name",
            "name must not be empty",
        ));
    }
    if name == VERSION_KEY || name.contains(bridge_traits::storage::GROUP_SEPARATOR) {
        return Err(CollectionError::invalid_input(
            "grouping name",
            format!("'{}' is not a usable grouping name", name),
        ));
    }
    Ok(())
}

/// Remember `grouping` under `name`, replacing any grouping of that name.
pub async fn save_grouping(store: &dyn SettingsStore, name: &str, grouping: Grouping) -> Result<()> {
    validate_grouping_name(name)?;
    store
        .set_string(
            &group_key(SAVED_GROUPINGS_GROUP, VERSION_KEY),
            SAVED_GROUPINGS_VERSION,
        )
        .await?;
    store
        .set_string(
            &group_key(SAVED_GROUPINGS_GROUP, name),
            &grouping.to_setting(),
        )
        .await?;
    debug!(name, grouping = %grouping, "Grouping saved");
    Ok(())
}

/// Saved groupings sorted by name. Entries that do not parse are skipped.
pub async fn saved_groupings(store: &dyn SettingsStore) -> Result<Vec<(String, Grouping)>> {
    let mut groupings = Vec::new();
    for name in store.list_group(SAVED_GROUPINGS_GROUP).await? {
        if name == VERSION_KEY {
            continue;
        }
        let Some(value) = store
            .get_string(&group_key(SAVED_GROUPINGS_GROUP, &name))
            .await?
        else {
            continue;
        };
        match Grouping::from_setting(&value) {
            Some(grouping) => groupings.push((name, grouping)),
            None => warn!(name = %name, value = %value, "Ignoring malformed saved grouping"),
        }
    }
    Ok(groupings)
}

pub async fn delete_grouping(store: &dyn SettingsStore, name: &str) -> Result<()> {
    validate_grouping_name(name)?;
    store
        .delete(&group_key(SAVED_GROUPINGS_GROUP, name))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::MemorySettingsStore;
    use mockall::mock;

    mock! {
        pub Store {}

        #[async_trait]
        impl SettingsStore for Store {
            async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()>;
            async fn get_string(&self, key: &str) -> BridgeResult<Option<String>>;
            async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()>;
            async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>>;
            async fn set_i64(&self, key: &str, value: i64) -> BridgeResult<()>;
            async fn get_i64(&self, key: &str) -> BridgeResult<Option<i64>>;
            async fn delete(&self, key: &str) -> BridgeResult<()>;
            async fn has_key(&self, key: &str) -> BridgeResult<bool>;
            async fn list_keys(&self) -> BridgeResult<Vec<String>>;
            async fn clear_all(&self) -> BridgeResult<()>;
        }
    }

    #[test]
    fn test_maximum_cache_size() {
        assert_eq!(maximum_cache_size(80, CacheSizeUnit::KB), 80 * 1024);
        assert_eq!(maximum_cache_size(80, CacheSizeUnit::MB), 80 * 1024 * 1024);
        assert_eq!(maximum_cache_size(2, CacheSizeUnit::GB), 2 * 1024 * 1024 * 1024);
        assert_eq!(maximum_cache_size(-5, CacheSizeUnit::MB), 0);
    }

    #[tokio::test]
    async fn test_load_defaults_from_empty_store() {
        let store = MemorySettingsStore::new();
        let settings = CollectionSettings::load(&store).await.unwrap();
        assert_eq!(settings, CollectionSettings::default());
        assert_eq!(
            settings.grouping,
            Grouping::new(GroupBy::AlbumArtist, GroupBy::AlbumDisc, GroupBy::None)
        );
        assert_eq!(settings.memory_cache_bytes(), 80 * 1024 * 1024);
        assert_eq!(settings.disk_cache_bytes(), 360 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemorySettingsStore::new();
        let settings = CollectionSettings {
            grouping: Grouping::new(GroupBy::Genre, GroupBy::YearAlbum, GroupBy::Disc),
            show_dividers: false,
            disk_cache_enable: true,
            disk_cache_size: 1,
            disk_cache_size_unit: CacheSizeUnit::GB,
            expire_unavailable_songs_days: 0,
            ..CollectionSettings::default()
        };
        settings.save(&store).await.unwrap();

        assert_eq!(
            store.get_i64("Collection/group_by1").await.unwrap(),
            Some(GroupBy::Genre.code())
        );
        assert_eq!(CollectionSettings::load(&store).await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_unknown_codes_fall_back() {
        let store = MemorySettingsStore::new();
        store.set_i64("Collection/group_by2", 99).await.unwrap();
        store.set_i64("Collection/cache_size_unit", 7).await.unwrap();

        let settings = CollectionSettings::load(&store).await.unwrap();
        assert_eq!(settings.grouping[1], GroupBy::AlbumDisc);
        assert_eq!(settings.cache_size_unit, CacheSizeUnit::MB);
    }

    #[tokio::test]
    async fn test_saved_groupings() {
        let store = MemorySettingsStore::new();
        save_grouping(
            &store,
            "By genre",
            Grouping::new(GroupBy::Genre, GroupBy::Album, GroupBy::None),
        )
        .await
        .unwrap();
        save_grouping(&store, "Default", Grouping::default())
            .await
            .unwrap();
        store
            .set_string("SavedGroupings/Broken", "1,2")
            .await
            .unwrap();

        assert_eq!(
            store.get_string("SavedGroupings/version").await.unwrap(),
            Some("1".to_string())
        );
        assert_eq!(
            store.get_string("SavedGroupings/By genre").await.unwrap(),
            Some("12,3,0".to_string())
        );

        let names: Vec<String> = saved_groupings(&store)
            .await
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["By genre", "Default"]);

        delete_grouping(&store, "Default").await.unwrap();
        assert_eq!(saved_groupings(&store).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reserved_grouping_names() {
        let store = MemorySettingsStore::new();
        for name in ["", "version", "a/b"] {
            let result = save_grouping(&store, name, Grouping::default()).await;
            assert!(matches!(result, Err(CollectionError::InvalidInput { .. })));
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let mut store = MockStore::new();
        store
            .expect_get_i64()
            .returning(|_| Err(BridgeError::NotAvailable("settings".to_string())));

        let result = CollectionSettings::load(&store).await;
        assert!(matches!(result, Err(CollectionError::Bridge(_))));
    }
}
