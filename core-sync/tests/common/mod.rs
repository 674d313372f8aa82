//! Shared fixtures for reconciler and watcher tests.
//!
//! Media files are small text files whose content tells [`FakeReader`] how to
//! behave:
//! - `title:<text>` parses with that title
//! - `image` anywhere marks the song as having a picture
//! - `corrupt` fails with a parse failure
//! - `unreadable` fails with an I/O error
//! - `slow` holds the read for [`SLOW_READ`] before answering

#![allow(dead_code)]

use async_trait::async_trait;
use core_library::repositories::{SqliteMarkerRepository, SqliteSongRepository};
use core_library::create_test_pool;
use core_metadata::extractor::title_or_filename;
use core_metadata::{ExtractedMetadata, ImageCache, MetadataError, PictureMode, TagReader};
use core_sync::{Reconciler, ReconcilerConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const SLOW_READ: Duration = Duration::from_millis(40);

#[derive(Default)]
pub struct FakeReader {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeReader {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most reads ever observed running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn parse(&self, path: &Path) -> core_metadata::Result<ExtractedMetadata> {
        let content = tokio::fs::read_to_string(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if content.contains("slow") {
            tokio::time::sleep(SLOW_READ).await;
        }

        if content.starts_with("corrupt") {
            return Err(MetadataError::ParseFailure {
                path: path.display().to_string(),
                message: "no frames".to_string(),
            });
        }
        if content.starts_with("unreadable") {
            return Err(MetadataError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "permission denied",
            )));
        }

        let title = content
            .lines()
            .find_map(|line| line.strip_prefix("title:"))
            .map(|title| title.trim().to_string());

        Ok(ExtractedMetadata {
            title: title_or_filename(title, &filename),
            artist: None,
            modified: 1_700_000_000_000,
            has_image: content.contains("image"),
            picture: None,
        })
    }
}

#[async_trait]
impl TagReader for FakeReader {
    async fn read(
        &self,
        path: &Path,
        _mode: PictureMode,
    ) -> core_metadata::Result<ExtractedMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        let result = self.parse(path).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub struct Harness {
    pub media: TempDir,
    pub cache_dir: TempDir,
    pub songs: Arc<SqliteSongRepository>,
    pub markers: Arc<SqliteMarkerRepository>,
    pub cache: Arc<ImageCache>,
    pub reader: Arc<FakeReader>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub async fn new() -> Self {
        let media = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();

        let pool = create_test_pool().await.unwrap();
        let songs = Arc::new(SqliteSongRepository::new(pool.clone()));
        let markers = Arc::new(SqliteMarkerRepository::new(pool));
        let cache = Arc::new(ImageCache::open(cache_dir.path()).await.unwrap());
        let reader = Arc::new(FakeReader::default());

        let reconciler = Arc::new(Reconciler::new(
            songs.clone(),
            markers.clone(),
            reader.clone(),
            cache.clone(),
            ReconcilerConfig::new(media.path()).with_batch_width(3),
        ));

        Self {
            media,
            cache_dir,
            songs,
            markers,
            cache,
            reader,
            reconciler,
        }
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.media.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn remove(&self, name: &str) {
        std::fs::remove_file(self.media.path().join(name)).unwrap();
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
