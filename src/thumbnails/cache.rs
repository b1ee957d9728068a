//! Thumbnail caching with both disk and memory layers.
//!
//! - Disk cache: JPEG files under the configured cache directory
//! - Memory cache: LRU of decoded RGBA images bounded by a byte budget
//!
//! Filenames are an xxhash of the source identity (path, mtime and size for
//! files, the bytes themselves for stored previews) plus the bounding box, so
//! a changed file never hits a stale entry.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use image::RgbaImage;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use xxhash_rust::xxh3::xxh3_64;

use super::generator::{ThumbBox, ThumbnailGenerator, ThumbnailSource};

/// Minimum memory cache size in megabytes.
const MIN_MEMORY_MB: usize = 16;

/// Maximum memory cache size in megabytes.
const MAX_MEMORY_MB: usize = 512;

const BYTES_PER_PIXEL: usize = 4;

/// Bump when thumbnail rendering changes.
const THUMB_CACHE_VERSION: u8 = 1;

const LRU_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn for_file(path: &Path, mtime: i64, size: u64, bbox: ThumbBox) -> Self {
        let path_str = path.to_string_lossy();
        let mut data = Vec::with_capacity(path_str.len() + 26);
        data.push(THUMB_CACHE_VERSION);
        data.push(b'f');
        data.extend_from_slice(path_str.as_bytes());
        data.extend_from_slice(&mtime.to_le_bytes());
        data.extend_from_slice(&size.to_le_bytes());
        Self::finish(data, bbox)
    }

    pub fn for_preview(bytes: &[u8], bbox: ThumbBox) -> Self {
        let mut data = Vec::with_capacity(bytes.len() + 10);
        data.push(THUMB_CACHE_VERSION);
        data.push(b'p');
        data.extend_from_slice(bytes);
        Self::finish(data, bbox)
    }

    /// Key for a source, stat-ing files as needed. `None` for blank sources.
    pub fn for_source(source: &ThumbnailSource, bbox: ThumbBox) -> Result<Option<Self>> {
        match source {
            ThumbnailSource::File(path) => {
                let meta = std::fs::metadata(path)
                    .with_context(|| format!("Failed to stat image: {:?}", path))?;
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
                Ok(Some(Self::for_file(path, mtime, meta.len(), bbox)))
            }
            ThumbnailSource::Preview(bytes) => Ok(Some(Self::for_preview(bytes, bbox))),
            ThumbnailSource::Blank => Ok(None),
        }
    }

    fn finish(mut data: Vec<u8>, bbox: ThumbBox) -> Self {
        data.extend_from_slice(&bbox.width.to_le_bytes());
        data.extend_from_slice(&bbox.height.to_le_bytes());
        Self(xxh3_64(&data))
    }

    pub fn disk_filename(&self) -> String {
        format!("{:016x}.jpg", self.0)
    }
}

struct MemoryLayer {
    entries: LruCache<CacheKey, Arc<RgbaImage>>,
    bytes: usize,
}

/// Shared thumbnail cache; clones refer to the same storage.
#[derive(Clone)]
pub struct ThumbnailCache {
    cache_dir: PathBuf,
    max_memory_bytes: usize,
    memory: Arc<Mutex<MemoryLayer>>,
    disk_enabled: bool,
}

impl ThumbnailCache {
    pub fn new(cache_dir: PathBuf, max_memory_mb: usize) -> Self {
        let max_memory_mb = max_memory_mb.clamp(MIN_MEMORY_MB, MAX_MEMORY_MB);

        let disk_enabled = match std::fs::create_dir_all(&cache_dir) {
            Ok(()) => true,
            Err(e) => {
                warn!(?cache_dir, error = ?e, "Failed to create cache directory, memory only");
                false
            }
        };

        debug!(?cache_dir, max_memory_mb, "Initialized thumbnail cache");

        let capacity = NonZeroUsize::new(LRU_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache_dir,
            max_memory_bytes: max_memory_mb * 1024 * 1024,
            memory: Arc::new(Mutex::new(MemoryLayer {
                entries: LruCache::new(capacity),
                bytes: 0,
            })),
            disk_enabled,
        }
    }

    /// Returns the thumbnail for `source`, checking memory, then disk, then
    /// rendering it. `Ok(None)` means the source has nothing to show.
    pub fn get_or_generate(&self, source: &ThumbnailSource, bbox: ThumbBox) -> Result<Option<Arc<RgbaImage>>> {
        let Some(key) = CacheKey::for_source(source, bbox)? else {
            return Ok(None);
        };

        if let Some(hit) = self.memory.lock().entries.get(&key).cloned() {
            trace!(?key, "Memory cache hit");
            return Ok(Some(hit));
        }

        let disk_path = self.disk_path(&key);
        if self.disk_enabled && disk_path.exists() {
            match image::open(&disk_path) {
                Ok(img) => {
                    trace!(?disk_path, "Disk cache hit");
                    return Ok(Some(self.insert(key, img.to_rgba8())));
                }
                Err(e) => {
                    debug!(?disk_path, error = %e, "Dropping unreadable cached thumbnail");
                    let _ = std::fs::remove_file(&disk_path);
                }
            }
        }

        let Some(rendered) = ThumbnailGenerator::render(source, bbox)? else {
            return Ok(None);
        };

        if self.disk_enabled {
            if let Err(e) = ThumbnailGenerator::save_jpeg(&rendered, &disk_path) {
                warn!(?disk_path, error = ?e, "Failed to write thumbnail to disk cache");
            }
        }

        Ok(Some(self.insert(key, rendered)))
    }

    fn insert(&self, key: CacheKey, image: RgbaImage) -> Arc<RgbaImage> {
        let size = image_bytes(&image);
        let image = Arc::new(image);

        let mut memory = self.memory.lock();
        while memory.bytes + size > self.max_memory_bytes {
            match memory.entries.pop_lru() {
                Some((_, evicted)) => {
                    memory.bytes = memory.bytes.saturating_sub(image_bytes(&evicted));
                    trace!(current_bytes = memory.bytes, "Evicted thumbnail from memory cache");
                }
                None => break,
            }
        }

        if let Some((_, replaced)) = memory.entries.push(key, Arc::clone(&image)) {
            memory.bytes = memory.bytes.saturating_sub(image_bytes(&replaced));
        }
        memory.bytes += size;
        image
    }

    /// Drops every cached thumbnail of `source`, in memory and on disk.
    pub fn remove(&self, source: &ThumbnailSource, boxes: &[ThumbBox]) -> bool {
        let mut removed = false;
        for bbox in boxes {
            let Ok(Some(key)) = CacheKey::for_source(source, *bbox) else {
                continue;
            };
            {
                let mut memory = self.memory.lock();
                if let Some(evicted) = memory.entries.pop(&key) {
                    memory.bytes = memory.bytes.saturating_sub(image_bytes(&evicted));
                    removed = true;
                }
            }
            if std::fs::remove_file(self.disk_path(&key)).is_ok() {
                removed = true;
            }
        }
        removed
    }

    pub fn clear_memory(&self) {
        let mut memory = self.memory.lock();
        memory.entries.clear();
        memory.bytes = 0;
        debug!("Cleared memory cache");
    }

    pub fn memory_usage(&self) -> usize {
        self.memory.lock().bytes
    }

    pub fn memory_entry_count(&self) -> usize {
        self.memory.lock().entries.len()
    }

    pub fn max_memory(&self) -> usize {
        self.max_memory_bytes
    }

    pub fn disk_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.disk_filename())
    }
}

fn image_bytes(image: &RgbaImage) -> usize {
    (image.width() as usize) * (image.height() as usize) * BYTES_PER_PIXEL
}
