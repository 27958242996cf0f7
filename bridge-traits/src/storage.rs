//! Settings Storage Abstraction
//!
//! Key-value preferences storage. Keys are grouped with a `/` separator
//! (`Collection/disk_cache_enable`, `SavedGroupings/My grouping`), so a
//! whole group can be listed with [`SettingsStore::list_group`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{BridgeError, Result};

/// Separator between a settings group and the key inside it.
pub const GROUP_SEPARATOR: char = '/';

/// Join a group name and a key into a full settings key.
pub fn group_key(group: &str, key: &str) -> String {
    format!("{}{}{}", group, GROUP_SEPARATOR, key)
}

/// Key-value settings storage trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::{group_key, SettingsStore};
///
/// async fn enable_disk_cache(store: &dyn SettingsStore) -> Result<()> {
///     store.set_bool(&group_key("Collection", "disk_cache_enable"), true).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool>;

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all settings
    async fn clear_all(&self) -> Result<()>;

    /// List the keys inside `group`, with the group prefix removed.
    async fn list_group(&self, group: &str) -> Result<Vec<String>> {
        let prefix = group_key(group, "");
        let mut keys: Vec<String> = self
            .list_keys()
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SettingValue {
    String(String),
    Bool(bool),
    Integer(i64),
}

impl SettingValue {
    fn type_name(&self) -> &'static str {
        match self {
            SettingValue::String(_) => "string",
            SettingValue::Bool(_) => "bool",
            SettingValue::Integer(_) => "i64",
        }
    }
}

/// Process-local settings store.
///
/// Values are typed: reading a key with a different type than it was written
/// with fails with [`BridgeError::OperationFailed`].
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: RwLock<HashMap<String, SettingValue>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self, key: &str, value: SettingValue) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| BridgeError::OperationFailed("settings lock poisoned".to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<SettingValue>> {
        let values = self
            .values
            .read()
            .map_err(|_| BridgeError::OperationFailed("settings lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn type_mismatch(key: &str, expected: &str, found: &SettingValue) -> BridgeError {
        BridgeError::OperationFailed(format!(
            "Setting '{}' holds a {} value, not {}",
            key,
            found.type_name(),
            expected
        ))
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.write(key, SettingValue::String(value.to_string()))
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.read(key)? {
            None => Ok(None),
            Some(SettingValue::String(value)) => Ok(Some(value)),
            Some(other) => Err(Self::type_mismatch(key, "string", &other)),
        }
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.write(key, SettingValue::Bool(value))
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.read(key)? {
            None => Ok(None),
            Some(SettingValue::Bool(value)) => Ok(Some(value)),
            Some(other) => Err(Self::type_mismatch(key, "bool", &other)),
        }
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.write(key, SettingValue::Integer(value))
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.read(key)? {
            None => Ok(None),
            Some(SettingValue::Integer(value)) => Ok(Some(value)),
            Some(other) => Err(Self::type_mismatch(key, "i64", &other)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| BridgeError::OperationFailed("settings lock poisoned".to_string()))?;
        values.remove(key);
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.read(key)?.is_some())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| BridgeError::OperationFailed("settings lock poisoned".to_string()))?;
        Ok(values.keys().cloned().collect())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| BridgeError::OperationFailed("settings lock poisoned".to_string()))?;
        values.clear();
        Ok(())
    }
}
