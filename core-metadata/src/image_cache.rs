//! Content-addressed image cache
//!
//! Rendered artwork lives in a flat directory, one file per
//! `(filename, variant)` pair. File names are the hex SHA-256 of the song
//! filename and the variant discriminator, so a key never depends on catalog
//! ids and the same song always maps to the same entry.
//!
//! Writes go to a uniquely named temp file in the same directory and are then
//! renamed into place. Readers therefore never observe a partial entry, and
//! concurrent writers of the same key race harmlessly because every writer
//! produces identical bytes.
//!
//! A small LRU of hot entries sits in front of the disk. It is updated by
//! every `put`, `evict` and `clear`, so it never serves an entry the disk no
//! longer has. Disk reads that fill it run without the lock; `evict` and
//! `clear` bump a generation once the files are gone, and a fill that started
//! under an older generation is dropped.

use crate::error::Result;
use bytes::Bytes;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

const HOT_ENTRIES: usize = 64;
const TEMP_MARKER: &str = ".tmp-";

/// Size variant of a song's artwork
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageVariant {
    /// 64x64 lossless WebP
    Thumbnail,
    /// The embedded picture as stored in the file
    Full,
}

impl ImageVariant {
    pub const ALL: [ImageVariant; 2] = [ImageVariant::Thumbnail, ImageVariant::Full];

    /// String mixed into the cache key
    pub fn discriminator(&self) -> &'static str {
        match self {
            ImageVariant::Thumbnail => "thumbnail",
            ImageVariant::Full => "full",
        }
    }
}

impl fmt::Display for ImageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.discriminator())
    }
}

/// Cache key of `(filename, variant)`: lowercase hex SHA-256 of the filename,
/// a NUL byte and the variant discriminator.
///
/// # Example
///
/// ```
/// use core_metadata::image_cache::{cache_key, ImageVariant};
///
/// let thumb = cache_key("song.mp3", ImageVariant::Thumbnail);
/// assert_eq!(thumb.len(), 64);
/// assert_eq!(thumb, cache_key("song.mp3", ImageVariant::Thumbnail));
/// assert_ne!(thumb, cache_key("song.mp3", ImageVariant::Full));
/// ```
pub fn cache_key(filename: &str, variant: ImageVariant) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update([0u8]);
    hasher.update(variant.discriminator().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// On-disk artwork cache with an in-memory front.
struct HotEntries {
    entries: LruCache<String, Bytes>,
    generation: u64,
}

impl HotEntries {
    fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

pub struct ImageCache {
    dir: PathBuf,
    hot: Mutex<HotEntries>,
}

impl ImageCache {
    /// Open (creating if needed) the cache rooted at `dir`.
    ///
    /// Temp files left behind by an interrupted write are removed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut stale = 0usize;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().contains(TEMP_MARKER) {
                remove_if_present(&entry.path()).await?;
                stale += 1;
            }
        }

        info!(dir = %dir.display(), stale_temp_files = stale, "Image cache opened");

        Ok(Self {
            dir,
            hot: Mutex::new(HotEntries {
                entries: LruCache::new(NonZeroUsize::new(HOT_ENTRIES).unwrap_or(NonZeroUsize::MIN)),
                generation: 0,
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Cached bytes of `(filename, variant)`, if present
    pub async fn get(&self, filename: &str, variant: ImageVariant) -> Result<Option<Bytes>> {
        let key = cache_key(filename, variant);

        let seen = {
            let mut hot = self.hot.lock().await;
            if let Some(bytes) = hot.entries.get(&key).cloned() {
                return Ok(Some(bytes));
            }
            hot.generation
        };

        match tokio::fs::read(self.path_for(&key)).await {
            Ok(data) => {
                let bytes = Bytes::from(data);
                self.remember(key, bytes.clone(), seen).await;
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store `bytes` for `(filename, variant)`.
    ///
    /// Re-putting an existing key replaces it with (identical) bytes.
    pub async fn put(&self, filename: &str, variant: ImageVariant, bytes: Bytes) -> Result<()> {
        let key = cache_key(filename, variant);
        let path = self.path_for(&key);
        let tmp = self
            .dir
            .join(format!("{key}{TEMP_MARKER}{}", Uuid::new_v4().simple()));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.flush().await?;
            drop(file);
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            warn!(%filename, %variant, error = %e, "Failed to write cache entry");
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(%filename, %variant, size = bytes.len(), "Cached image");
        self.hot.lock().await.entries.put(key, bytes);
        Ok(())
    }

    /// Keep bytes read from disk hot unless an eviction ran since `seen`.
    async fn remember(&self, key: String, bytes: Bytes, seen: u64) {
        let mut hot = self.hot.lock().await;
        if hot.generation == seen {
            hot.entries.put(key, bytes);
        }
    }

    /// Remove both variants of `filename`; absent entries are ignored.
    pub async fn evict(&self, filename: &str) -> Result<()> {
        for variant in ImageVariant::ALL {
            let key = cache_key(filename, variant);
            remove_if_present(&self.path_for(&key)).await?;

            let mut hot = self.hot.lock().await;
            hot.entries.pop(&key);
            hot.invalidate();
        }

        debug!(%filename, "Evicted cached images");
        Ok(())
    }

    /// Remove every entry.
    pub async fn clear(&self) -> Result<u64> {
        let mut removed = 0u64;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                remove_if_present(&entry.path()).await?;
                removed += 1;
            }
        }

        {
            let mut hot = self.hot.lock().await;
            hot.entries.clear();
            hot.invalidate();
        }

        info!(removed, "Image cache cleared");
        Ok(removed)
    }

    /// Whether `(filename, variant)` exists on disk
    pub async fn contains(&self, filename: &str, variant: ImageVariant) -> bool {
        tokio::fs::try_exists(self.path_for(&cache_key(filename, variant)))
            .await
            .unwrap_or(false)
    }
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
