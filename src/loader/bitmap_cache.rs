//! Bitmap caching with both disk and memory layers.
//!
//! - Disk cache: Stores prepared bitmaps as PNG in XDG_CACHE_HOME/nox/bitmaps/
//! - Memory cache: LRU cache of decoded bitmaps with a byte budget
//!
//! Filenames are based on xxhash of (source + size + circular) so every
//! transformation variant of a source gets its own entry.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};
use xxhash_rust::xxh3::xxh3_64;

use super::decoder;
use super::fetch::{FetchError, Fetcher};
use super::Bitmap;
use crate::models::ImageSource;

/// Default memory cache size in megabytes.
pub const DEFAULT_MAX_MEMORY_MB: usize = 64;

/// Minimum memory cache size in megabytes.
const MIN_MEMORY_MB: usize = 16;

/// Maximum memory cache size in megabytes.
const MAX_MEMORY_MB: usize = 512;

/// Bump when the preparation pipeline changes (crop, filter, mask).
const BITMAP_CACHE_VERSION: u8 = 1;

/// Upper bound on the number of entries, independent of their size.
const DEFAULT_LRU_CAPACITY: usize = 4096;

/// Cache key for one prepared variant of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hash: u64,
}

impl CacheKey {
    /// Hashes the source together with the transformation parameters and
    /// the cache version.
    pub fn new(source: &ImageSource, size: u32, circular: bool) -> Self {
        let source = source.to_string();
        let mut data = Vec::with_capacity(source.len() + 6);
        data.push(BITMAP_CACHE_VERSION);
        data.extend_from_slice(source.as_bytes());
        data.extend_from_slice(&size.to_le_bytes());
        data.push(circular as u8);
        Self {
            hash: xxh3_64(&data),
        }
    }

    /// Filename used in the disk layer.
    pub fn disk_filename(&self) -> String {
        format!("{:016x}.png", self.hash)
    }
}

/// LRU entries plus the running byte total of their pixels.
struct MemoryLayer {
    entries: LruCache<CacheKey, Bitmap>,
    bytes: usize,
}

/// Shared cache of prepared bitmaps. Clones share the same storage.
#[derive(Clone)]
pub struct BitmapCache {
    /// Directory for disk cache storage; memory only when absent.
    cache_dir: Option<PathBuf>,
    max_memory_bytes: usize,
    memory: Arc<Mutex<MemoryLayer>>,
    /// Serializes disk writes for the same directory.
    disk_lock: Arc<RwLock<()>>,
}

impl BitmapCache {
    /// Creates a cache keeping at most `max_memory_mb` of pixels in memory.
    pub fn new(cache_dir: Option<PathBuf>, max_memory_mb: usize) -> Self {
        let max_memory_mb = max_memory_mb.clamp(MIN_MEMORY_MB, MAX_MEMORY_MB);

        if let Some(dir) = &cache_dir {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(?dir, error = ?e, "Failed to create cache directory");
            }
        }

        debug!(?cache_dir, max_memory_mb, "Initialized bitmap cache");

        let capacity = NonZeroUsize::new(DEFAULT_LRU_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache_dir,
            max_memory_bytes: max_memory_mb * 1024 * 1024,
            memory: Arc::new(Mutex::new(MemoryLayer {
                entries: LruCache::new(capacity),
                bytes: 0,
            })),
            disk_lock: Arc::new(RwLock::new(())),
        }
    }

    /// Memory-only cache.
    pub fn in_memory(max_memory_mb: usize) -> Self {
        Self::new(None, max_memory_mb)
    }

    /// Creates a cache using the default XDG cache directory.
    pub fn new_default(max_memory_mb: usize) -> Result<Self> {
        Ok(Self::new(Some(Self::default_cache_dir()?), max_memory_mb))
    }

    /// Returns the default disk cache directory (XDG_CACHE_HOME/nox/bitmaps).
    pub fn default_cache_dir() -> Result<PathBuf> {
        let proj_dirs =
            ProjectDirs::from("", "", "nox").context("Failed to determine project directories")?;
        Ok(proj_dirs.cache_dir().join("bitmaps"))
    }

    /// Returns the prepared bitmap for a source, checking memory, then disk,
    /// then fetching and decoding it.
    pub fn get_or_prepare(
        &self,
        source: &ImageSource,
        size: u32,
        circular: bool,
        fetcher: &dyn Fetcher,
    ) -> Result<Bitmap, FetchError> {
        let key = CacheKey::new(source, size, circular);

        if let Some(bitmap) = self.get_from_memory(&key) {
            trace!(%source, "Memory cache hit");
            return Ok(bitmap);
        }

        if let Some(disk_path) = self.disk_path(&key) {
            if disk_path.exists() {
                match self.load_from_disk(&key, &disk_path) {
                    Ok(bitmap) => {
                        trace!(%source, "Disk cache hit");
                        return Ok(bitmap);
                    }
                    Err(e) => {
                        warn!(?disk_path, error = ?e, "Dropping unreadable cache file");
                        let _ = std::fs::remove_file(&disk_path);
                    }
                }
            }
        }

        debug!(%source, size, circular, "Cache miss, preparing bitmap");
        let bytes = fetcher.fetch(source)?;
        let image = decoder::prepare(&bytes, size, circular)?;
        let bitmap = Bitmap::new(image);

        if let Some(disk_path) = self.disk_path(&key) {
            if let Err(e) = self.save_to_disk(&bitmap, &disk_path) {
                warn!(?disk_path, error = ?e, "Failed to write bitmap cache file");
            }
        }
        self.add_to_memory_cache(key, bitmap.clone());

        Ok(bitmap)
    }

    /// Looks up a bitmap in the memory layer only, marking it recently used.
    pub fn get_from_memory(&self, key: &CacheKey) -> Option<Bitmap> {
        self.memory.lock().entries.get(key).cloned()
    }

    /// Checks whether a prepared variant exists in memory or on disk.
    pub fn contains(&self, source: &ImageSource, size: u32, circular: bool) -> bool {
        let key = CacheKey::new(source, size, circular);
        if self.memory.lock().entries.contains(&key) {
            return true;
        }
        self.disk_path(&key).is_some_and(|p| p.exists())
    }

    /// Path of the disk entry for a key, if the disk layer is enabled.
    fn disk_path(&self, key: &CacheKey) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(key.disk_filename()))
    }

    /// Loads a disk entry and promotes it into the memory layer.
    fn load_from_disk(&self, key: &CacheKey, disk_path: &Path) -> Result<Bitmap> {
        let _guard = self.disk_lock.read();
        let image = image::open(disk_path)
            .with_context(|| format!("Failed to load cached bitmap: {:?}", disk_path))?
            .to_rgba8();
        let bitmap = Bitmap::new(image);
        self.add_to_memory_cache(*key, bitmap.clone());
        Ok(bitmap)
    }

    /// Writes a prepared bitmap to the disk layer as PNG.
    fn save_to_disk(&self, bitmap: &Bitmap, disk_path: &Path) -> Result<()> {
        let _guard = self.disk_lock.write();
        if let Some(parent) = disk_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory: {:?}", parent))?;
        }
        bitmap
            .image()
            .save_with_format(disk_path, image::ImageFormat::Png)
            .with_context(|| format!("Failed to encode bitmap: {:?}", disk_path))?;
        Ok(())
    }

    /// Adds an entry, evicting least recently used ones to stay in budget.
    fn add_to_memory_cache(&self, key: CacheKey, bitmap: Bitmap) {
        let new_size = bitmap.byte_size();
        let mut memory = self.memory.lock();

        if let Some(old) = memory.entries.pop(&key) {
            memory.bytes = memory.bytes.saturating_sub(old.byte_size());
        }

        while memory.bytes + new_size > self.max_memory_bytes {
            match memory.entries.pop_lru() {
                Some((_, evicted)) => {
                    memory.bytes = memory.bytes.saturating_sub(evicted.byte_size());
                    trace!(
                        evicted_bytes = evicted.byte_size(),
                        current_bytes = memory.bytes,
                        "Evicted bitmap from memory cache"
                    );
                }
                None => break,
            }
        }

        if let Some((_, evicted)) = memory.entries.push(key, bitmap) {
            memory.bytes = memory.bytes.saturating_sub(evicted.byte_size());
        }
        memory.bytes += new_size;
    }

    /// Drops every entry of the memory layer. The disk layer is untouched.
    pub fn clear_memory(&self) {
        let mut memory = self.memory.lock();
        memory.entries.clear();
        memory.bytes = 0;
        debug!("Cleared bitmap memory cache");
    }

    /// Bytes of pixels currently held in memory.
    pub fn memory_usage(&self) -> usize {
        self.memory.lock().bytes
    }

    /// Number of bitmaps currently held in memory.
    pub fn memory_entry_count(&self) -> usize {
        self.memory.lock().entries.len()
    }

    /// Memory budget in bytes.
    pub fn max_memory(&self) -> usize {
        self.max_memory_bytes
    }

    /// Directory of the disk layer, if enabled.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::decoder::encode_png;
    use crate::loader::FsFetcher;
    use crate::models::ResourceId;
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingFetcher {
        inner: FsFetcher,
        calls: AtomicUsize,
    }

    impl Fetcher for CountingFetcher {
        fn fetch(&self, source: &ImageSource) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(source)
        }
    }

    fn fixture(dir: &Path) -> CountingFetcher {
        let path = dir.join("red.png");
        let img = RgbaImage::from_pixel(40, 20, Rgba([255, 0, 0, 255]));
        std::fs::write(&path, encode_png(&img)).unwrap();
        CountingFetcher {
            inner: FsFetcher::new().with_resource(ResourceId(1), path),
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_cache_key_hash() {
        let source = ImageSource::Local(ResourceId(1));
        assert_eq!(CacheKey::new(&source, 32, true), CacheKey::new(&source, 32, true));
        assert_ne!(CacheKey::new(&source, 32, true), CacheKey::new(&source, 32, false));
        assert_ne!(CacheKey::new(&source, 32, true), CacheKey::new(&source, 64, true));
    }

    #[test]
    fn test_disk_filename() {
        let key = CacheKey::new(&ImageSource::Remote("a.png".into()), 8, false);
        let filename = key.disk_filename();
        assert!(filename.ends_with(".png"));
        assert_eq!(filename.len(), 20);
    }

    #[test]
    fn test_memory_limit_clamping() {
        assert_eq!(BitmapCache::in_memory(1).max_memory(), MIN_MEMORY_MB * 1024 * 1024);
        assert_eq!(BitmapCache::in_memory(4096).max_memory(), MAX_MEMORY_MB * 1024 * 1024);
        assert_eq!(BitmapCache::in_memory(100).max_memory(), 100 * 1024 * 1024);
    }

    #[test]
    fn test_second_request_hits_memory() {
        let dir = tempdir().unwrap();
        let fetcher = fixture(dir.path());
        let cache = BitmapCache::in_memory(DEFAULT_MAX_MEMORY_MB);
        let source = ImageSource::Local(ResourceId(1));

        let first = cache.get_or_prepare(&source, 10, true, &fetcher).unwrap();
        let second = cache.get_or_prepare(&source, 10, true, &fetcher).unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(first.ptr_eq(&second));
        assert_eq!((first.width(), first.height()), (10, 10));
        assert_eq!(cache.memory_usage(), 10 * 10 * 4);
        assert_eq!(cache.memory_entry_count(), 1);
    }

    #[test]
    fn test_disk_layer_survives_memory_clear() {
        let dir = tempdir().unwrap();
        let cache_dir = tempdir().unwrap();
        let fetcher = fixture(dir.path());
        let cache = BitmapCache::new(Some(cache_dir.path().to_path_buf()), DEFAULT_MAX_MEMORY_MB);
        let source = ImageSource::Local(ResourceId(1));

        cache.get_or_prepare(&source, 10, false, &fetcher).unwrap();
        cache.clear_memory();
        assert_eq!(cache.memory_usage(), 0);
        assert!(cache.contains(&source, 10, false));

        let bitmap = cache.get_or_prepare(&source, 10, false, &fetcher).unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bitmap.width(), 10);
    }

    #[test]
    fn test_missing_source_is_reported_not_found() {
        let cache = BitmapCache::in_memory(DEFAULT_MAX_MEMORY_MB);
        let err = cache
            .get_or_prepare(&ImageSource::Local(ResourceId(2)), 10, false, &FsFetcher::new())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_eviction_respects_budget() {
        let cache = BitmapCache::in_memory(MIN_MEMORY_MB);
        // 1024 * 1024 * 4 bytes each: four fit into the 16 MB budget.
        for i in 0..6u32 {
            let key = CacheKey::new(&ImageSource::Local(ResourceId(i)), 1024, false);
            cache.add_to_memory_cache(key, Bitmap::new(RgbaImage::new(1024, 1024)));
        }
        assert!(cache.memory_usage() <= cache.max_memory());
        assert_eq!(cache.memory_entry_count(), 4);
    }
}
