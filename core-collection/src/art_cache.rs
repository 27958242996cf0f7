//! Album icon cache
//!
//! Two tiers shared by every model instance:
//!
//! - memory: an LRU of encoded images bounded by total bytes, which also
//!   remembers albums without a cover so they are not looked up again
//! - disk: one file per key under a cache directory, named by the SHA-256
//!   of the key and bounded by deleting the oldest files first
//!
//! Both tiers lock internally; share the cache as `Arc<AlbumIconCache>`.

use crate::error::{CollectionError, Result};
use bytes::Bytes;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tracing::{debug, info, warn};

const ICON_EXTENSION: &str = "img";

/// A cached album icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedIcon {
    /// Encoded image bytes
    Image(Bytes),
    /// Loading was attempted and found nothing
    NoCover,
}

impl CachedIcon {
    pub fn image(&self) -> Option<&Bytes> {
        match self {
            CachedIcon::Image(bytes) => Some(bytes),
            CachedIcon::NoCover => None,
        }
    }

    fn weight(&self, key: &str) -> u64 {
        let data = self.image().map_or(0, Bytes::len);
        (key.len() + data) as u64
    }
}

struct MemoryTier {
    entries: LruCache<String, CachedIcon>,
    used: u64,
    limit: u64,
}

impl MemoryTier {
    fn evict_to(&mut self, limit: u64) {
        while self.used > limit {
            match self.entries.pop_lru() {
                Some((key, icon)) => self.used = self.used.saturating_sub(icon.weight(&key)),
                None => {
                    self.used = 0;
                    break;
                }
            }
        }
    }

    fn remove(&mut self, key: &str) {
        if let Some(icon) = self.entries.pop(key) {
            self.used = self.used.saturating_sub(icon.weight(key));
        }
    }
}

struct DiskTier {
    dir: Option<PathBuf>,
    enabled: bool,
    limit: u64,
}

impl DiskTier {
    fn active_dir(&self) -> Option<&Path> {
        if self.enabled {
            self.dir.as_deref()
        } else {
            None
        }
    }
}

/// Memory and disk cache of album icons keyed by tree path.
pub struct AlbumIconCache {
    memory: Mutex<MemoryTier>,
    disk: Mutex<DiskTier>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// File name of the disk entry for `key`.
fn file_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}.{}", hasher.finalize(), ICON_EXTENSION)
}

fn cache_error(action: &str, path: &Path, err: std::io::Error) -> CollectionError {
    CollectionError::Cache(format!("{} {}: {}", action, path.display(), err))
}

/// Icon files in `dir` with their size and modification time.
fn disk_entries(dir: &Path) -> Result<Vec<(PathBuf, u64, SystemTime)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| cache_error("listing", dir, e))? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(ICON_EXTENSION) {
            continue;
        }
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((path, metadata.len(), modified));
        }
    }
    Ok(entries)
}

/// Delete the oldest icon files until the directory fits in `limit` bytes.
fn trim_disk(dir: &Path, limit: u64) -> Result<usize> {
    let mut entries = disk_entries(dir)?;
    let mut total: u64 = entries.iter().map(|(_, size, _)| size).sum();
    if total <= limit {
        return Ok(0);
    }

    entries.sort_by_key(|(_, _, modified)| *modified);
    let mut removed = 0;
    for (path, size, _) in entries {
        if total <= limit {
            break;
        }
        fs::remove_file(&path).map_err(|e| cache_error("removing", &path, e))?;
        total = total.saturating_sub(size);
        removed += 1;
    }
    debug!(removed, total, limit, "Trimmed icon disk cache");
    Ok(removed)
}

impl AlbumIconCache {
    /// Cache with a memory tier of `memory_limit` bytes. The disk tier stays
    /// off until a directory is configured and enabled.
    pub fn new(memory_limit: u64) -> Self {
        Self {
            memory: Mutex::new(MemoryTier {
                entries: LruCache::unbounded(),
                used: 0,
                limit: memory_limit,
            }),
            disk: Mutex::new(DiskTier {
                dir: None,
                enabled: false,
                limit: 0,
            }),
        }
    }

    /// Use `dir` for the disk tier, bounded by `limit` bytes.
    pub fn with_disk_dir(self, dir: impl Into<PathBuf>, limit: u64) -> Self {
        {
            let mut disk = lock(&self.disk);
            disk.dir = Some(dir.into());
            disk.limit = limit;
        }
        self
    }

    /// Look up `key` in memory, then on disk. Disk hits are checked to
    /// decode as an image and promoted to memory.
    pub fn get(&self, key: &str) -> Option<CachedIcon> {
        if let Some(icon) = lock(&self.memory).entries.get(key) {
            return Some(icon.clone());
        }

        let path = {
            let disk = lock(&self.disk);
            disk.active_dir()?.join(file_name(key))
        };
        let data = fs::read(&path).ok()?;
        if let Err(e) = image::load_from_memory(&data) {
            warn!(path = %path.display(), error = %e, "Dropping unreadable cached icon");
            let _ = fs::remove_file(&path);
            return None;
        }

        let icon = CachedIcon::Image(Bytes::from(data));
        self.insert_memory(key, icon.clone());
        Some(icon)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn insert_memory(&self, key: &str, icon: CachedIcon) {
        let mut memory = lock(&self.memory);
        memory.remove(key);
        let weight = icon.weight(key);
        if weight > memory.limit {
            debug!(key, weight, "Icon larger than the memory cache, not kept");
            return;
        }
        let limit = memory.limit - weight;
        memory.evict_to(limit);
        memory.entries.put(key.to_string(), icon);
        memory.used += weight;
    }

    /// Remember `icon` under `key`. Images also go to disk when the disk
    /// tier is on and does not have the key yet.
    pub fn insert(&self, key: &str, icon: CachedIcon) {
        if let CachedIcon::Image(bytes) = &icon {
            if let Err(e) = self.store_on_disk(key, bytes) {
                warn!(key, error = %e, "Unable to write icon to disk cache");
            }
        }
        self.insert_memory(key, icon);
    }

    fn store_on_disk(&self, key: &str, bytes: &Bytes) -> Result<()> {
        let disk = lock(&self.disk);
        let Some(dir) = disk.active_dir() else {
            return Ok(());
        };
        let path = dir.join(file_name(key));
        if path.exists() {
            return Ok(());
        }
        fs::create_dir_all(dir).map_err(|e| cache_error("creating", dir, e))?;
        fs::write(&path, bytes).map_err(|e| cache_error("writing", &path, e))?;
        trim_disk(dir, disk.limit)?;
        Ok(())
    }

    /// Forget `key` in both tiers.
    pub fn remove(&self, key: &str) {
        lock(&self.memory).remove(key);

        let disk = lock(&self.disk);
        if let Some(dir) = disk.active_dir() {
            let path = dir.join(file_name(key));
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Unable to remove cached icon");
                }
            }
        }
    }

    pub fn clear_memory(&self) {
        let mut memory = lock(&self.memory);
        memory.entries.clear();
        memory.used = 0;
    }

    /// Delete every icon file, whether or not the disk tier is enabled.
    pub fn clear_disk_cache(&self) -> Result<()> {
        let disk = lock(&self.disk);
        let Some(dir) = disk.dir.as_deref() else {
            return Ok(());
        };
        let entries = disk_entries(dir)?;
        for (path, _, _) in &entries {
            fs::remove_file(path).map_err(|e| cache_error("removing", path, e))?;
        }
        info!(dir = %dir.display(), removed = entries.len(), "Icon disk cache cleared");
        Ok(())
    }

    pub fn set_memory_limit(&self, limit: u64) {
        let mut memory = lock(&self.memory);
        memory.limit = limit;
        memory.evict_to(limit);
    }

    pub fn set_disk_limit(&self, limit: u64) -> Result<()> {
        let mut disk = lock(&self.disk);
        disk.limit = limit;
        match disk.active_dir() {
            Some(dir) => trim_disk(dir, limit).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Turn the disk tier on or off. Enabling without a directory fails.
    pub fn set_disk_enabled(&self, enabled: bool) -> Result<()> {
        let mut disk = lock(&self.disk);
        if enabled && disk.dir.is_none() {
            return Err(CollectionError::invalid_input(
                "disk_cache_enable",
                "no icon cache directory configured",
            ));
        }
        disk.enabled = enabled;
        Ok(())
    }

    pub fn disk_enabled(&self) -> bool {
        lock(&self.disk).active_dir().is_some()
    }

    /// Bytes held by the memory tier.
    pub fn memory_usage(&self) -> u64 {
        lock(&self.memory).used
    }

    pub fn memory_len(&self) -> usize {
        lock(&self.memory).entries.len()
    }

    /// Bytes held by the disk tier.
    pub fn disk_usage(&self) -> Result<u64> {
        let disk = lock(&self.disk);
        match disk.dir.as_deref() {
            Some(dir) => Ok(disk_entries(dir)?.iter().map(|(_, size, _)| size).sum()),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png(shade: u8) -> Bytes {
        let img = RgbImage::from_pixel(4, 4, Rgb([shade, 0, 0]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        Bytes::from(buffer)
    }

    #[test]
    fn test_file_name_is_sha256_of_key() {
        let name = file_name("collection/Queen/A Night at the Opera");
        assert_eq!(name.len(), 64 + 1 + ICON_EXTENSION.len());
        assert_eq!(name, file_name("collection/Queen/A Night at the Opera"));
        assert_ne!(name, file_name("collection/Queen/Jazz"));
    }

    #[test]
    fn test_memory_hit_and_negative_entry() {
        let cache = AlbumIconCache::new(1024 * 1024);
        let image = png(10);
        cache.insert("a", CachedIcon::Image(image.clone()));
        cache.insert("b", CachedIcon::NoCover);

        assert_eq!(cache.get("a"), Some(CachedIcon::Image(image)));
        assert_eq!(cache.get("b"), Some(CachedIcon::NoCover));
        assert_eq!(cache.get("c"), None);

        cache.remove("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.memory_len(), 1);
    }

    #[test]
    fn test_memory_limit_evicts_least_recent() {
        let image = png(1);
        let weight = CachedIcon::Image(image.clone()).weight("k1");
        let cache = AlbumIconCache::new(weight * 2);

        cache.insert("k1", CachedIcon::Image(image.clone()));
        cache.insert("k2", CachedIcon::Image(image.clone()));
        assert!(cache.get("k1").is_some());
        cache.insert("k3", CachedIcon::Image(image.clone()));

        assert!(cache.get("k1").is_some());
        assert!(cache.get("k2").is_none());
        assert!(cache.memory_usage() <= weight * 2);

        cache.set_memory_limit(0);
        assert_eq!(cache.memory_len(), 0);
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn test_disk_tier_round_trip_and_promotion() {
        let dir = TempDir::new().unwrap();
        let cache = AlbumIconCache::new(1024 * 1024).with_disk_dir(dir.path(), 1024 * 1024);
        cache.set_disk_enabled(true).unwrap();

        let image = png(20);
        cache.insert("key", CachedIcon::Image(image.clone()));
        assert!(dir.path().join(file_name("key")).exists());

        cache.clear_memory();
        assert_eq!(cache.memory_len(), 0);
        assert_eq!(cache.get("key"), Some(CachedIcon::Image(image)));
        assert_eq!(cache.memory_len(), 1);
    }

    #[test]
    fn test_negative_entries_stay_in_memory() {
        let dir = TempDir::new().unwrap();
        let cache = AlbumIconCache::new(1024).with_disk_dir(dir.path(), 1024 * 1024);
        cache.set_disk_enabled(true).unwrap();

        cache.insert("missing", CachedIcon::NoCover);
        assert_eq!(cache.disk_usage().unwrap(), 0);
    }

    #[test]
    fn test_corrupt_disk_entry_is_dropped() {
        let dir = TempDir::new().unwrap();
        let cache = AlbumIconCache::new(1024 * 1024).with_disk_dir(dir.path(), 1024 * 1024);
        cache.set_disk_enabled(true).unwrap();

        let path = dir.path().join(file_name("broken"));
        fs::write(&path, b"not an image").unwrap();

        assert_eq!(cache.get("broken"), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_disk_limit_and_clear() {
        let dir = TempDir::new().unwrap();
        let cache = AlbumIconCache::new(1024 * 1024).with_disk_dir(dir.path(), 1024 * 1024);
        cache.set_disk_enabled(true).unwrap();

        for (index, key) in ["one", "two", "three"].iter().enumerate() {
            cache.insert(key, CachedIcon::Image(png(index as u8)));
        }
        let used = cache.disk_usage().unwrap();
        assert!(used > 0);

        cache.set_disk_limit(used / 2).unwrap();
        assert!(cache.disk_usage().unwrap() <= used / 2);

        cache.clear_disk_cache().unwrap();
        assert_eq!(cache.disk_usage().unwrap(), 0);
    }

    #[test]
    fn test_disk_needs_directory() {
        let cache = AlbumIconCache::new(1024);
        assert!(cache.set_disk_enabled(true).is_err());
        assert!(!cache.disk_enabled());

        cache.insert("key", CachedIcon::Image(png(3)));
        assert_eq!(cache.disk_usage().unwrap(), 0);
    }
}
