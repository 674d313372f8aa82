//! # Filesystem Reconciler
//!
//! Brings the catalog in line with the files directly under the media root.
//!
//! ## Workflow
//!
//! 1. Enumerate regular files in the media root (non-recursive)
//! 2. Diff against the catalog: `missing = files - catalog`, `orphaned = catalog - files`
//! 3. Ingest `missing` with at most `batch_width` extractions in flight
//! 4. Retire `orphaned`: clear markers, evict cached images, delete the row
//!
//! A [`ReconcileMode::Full`] pass first empties the catalog and the image cache.
//!
//! ## Failure isolation
//!
//! - A file whose tags cannot be parsed is cataloged with a fallback record
//!   (title = filename, no artist, no image)
//! - A file that cannot be read is skipped for this pass and retried on the next
//! - One failing file never aborts its siblings
//!
//! Passes are serialized by an internal lock. The single-file primitives
//! ([`Reconciler::ingest_if_missing`], [`Reconciler::retire_by_filename`]) do
//! not take it; concurrent ingestion of the same file is resolved by the
//! catalog's unique filename.

use crate::error::{Result, SyncError};
use core_library::repositories::{MarkerRepository, SongRepository};
use core_library::{NewSong, Song};
use core_metadata::extractor::to_unix_millis;
use core_metadata::{ImageCache, MetadataError, PictureMode, TagReader};
use core_runtime::config::accepts_extension;
use core_runtime::LibraryConfig;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Reconciler settings
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub media_root: PathBuf,
    /// Maximum concurrent extractions
    pub batch_width: usize,
    /// Lowercase extensions to catalog; empty accepts every file
    pub audio_extensions: Vec<String>,
}

impl ReconcilerConfig {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
            batch_width: core_runtime::config::DEFAULT_INGEST_BATCH_WIDTH,
            audio_extensions: Vec::new(),
        }
    }

    pub fn with_batch_width(mut self, width: usize) -> Self {
        self.batch_width = width.max(1);
        self
    }

    pub fn accepts(&self, filename: &str) -> bool {
        accepts_extension(&self.audio_extensions, filename)
    }
}

impl From<&LibraryConfig> for ReconcilerConfig {
    fn from(config: &LibraryConfig) -> Self {
        Self {
            media_root: config.media_root.clone(),
            batch_width: config.ingest_batch_width.max(1),
            audio_extensions: config.audio_extensions.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileMode {
    /// Diff and apply only the differences
    #[default]
    Incremental,
    /// Drop the catalog and cache, then rebuild from scratch
    Full,
}

/// Set differences between the media root and the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Files on disk without a catalog row, sorted
    pub missing: Vec<String>,
    /// Catalog rows whose file is gone
    pub orphaned: Vec<Song>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.orphaned.is_empty()
    }
}

/// Summary of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Songs newly cataloged, fallback records included
    pub added: usize,
    /// Of `added`, songs cataloged with a fallback record
    pub fallback: usize,
    /// Songs retired
    pub removed: usize,
    /// Files skipped because of an error; retried next pass
    pub failed: usize,
    pub elapsed: Duration,
}

impl ReconcileReport {
    pub fn mutations(&self) -> usize {
        self.added + self.removed
    }
}

/// Result of a single-file ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Cataloged from its tags
    Added(Song),
    /// Cataloged with a fallback record because its tags could not be parsed
    Fallback(Song),
    /// Already cataloged (possibly by a concurrent ingestion)
    AlreadyPresent,
    /// Rejected by the extension filter
    Ignored,
}

impl IngestOutcome {
    pub fn song(&self) -> Option<&Song> {
        match self {
            IngestOutcome::Added(song) | IngestOutcome::Fallback(song) => Some(song),
            _ => None,
        }
    }
}

pub struct Reconciler {
    songs: Arc<dyn SongRepository>,
    markers: Arc<dyn MarkerRepository>,
    reader: Arc<dyn TagReader>,
    cache: Arc<ImageCache>,
    config: ReconcilerConfig,
    pass_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        songs: Arc<dyn SongRepository>,
        markers: Arc<dyn MarkerRepository>,
        reader: Arc<dyn TagReader>,
        cache: Arc<ImageCache>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            songs,
            markers,
            reader,
            cache,
            config,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn media_root(&self) -> &Path {
        &self.config.media_root
    }

    /// Whether a pass is currently running
    pub fn is_reconciling(&self) -> bool {
        self.pass_lock.try_lock().is_err()
    }

    /// Filenames of the regular files directly under the media root.
    pub async fn scan_media_root(&self) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        let mut entries = tokio::fs::read_dir(&self.config.media_root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            // Follow symlinks so a link to a file counts as a file
            let is_file = if file_type.is_symlink() {
                tokio::fs::metadata(entry.path())
                    .await
                    .map(|m| m.is_file())
                    .unwrap_or(false)
            } else {
                file_type.is_file()
            };
            if !is_file {
                continue;
            }

            let Ok(name) = entry.file_name().into_string() else {
                warn!(path = %entry.path().display(), "Skipping file with non-UTF-8 name");
                continue;
            };

            if self.config.accepts(&name) {
                names.insert(name);
            }
        }

        Ok(names)
    }

    /// Compute the set differences without applying them.
    pub async fn plan(&self) -> Result<ReconcilePlan> {
        let on_disk = self.scan_media_root().await?;
        let cataloged: BTreeSet<String> = self.songs.list_filenames().await?.into_iter().collect();

        let missing: Vec<String> = on_disk.difference(&cataloged).cloned().collect();
        let orphaned_names: Vec<String> = cataloged.difference(&on_disk).cloned().collect();
        let orphaned = if orphaned_names.is_empty() {
            Vec::new()
        } else {
            self.songs.find_by_filenames(&orphaned_names).await?
        };

        Ok(ReconcilePlan { missing, orphaned })
    }

    /// Run one reconciliation pass.
    ///
    /// Concurrent calls queue behind each other.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, mode: ReconcileMode) -> Result<ReconcileReport> {
        let _pass = self.pass_lock.lock().await;
        let started = Instant::now();

        if mode == ReconcileMode::Full {
            let dropped = self.songs.delete_all().await?;
            let cleared = self.cache.clear().await?;
            info!(songs = dropped, images = cleared, "Catalog reset for full reload");
        }

        let plan = self.plan().await?;
        info!(
            missing = plan.missing.len(),
            orphaned = plan.orphaned.len(),
            "Reconciliation plan computed"
        );

        let mut report = ReconcileReport::default();

        let mut ingestions = stream::iter(plan.missing)
            .map(|filename| async move {
                let outcome = self.ingest(&filename).await;
                (filename, outcome)
            })
            .buffer_unordered(self.config.batch_width.max(1));

        while let Some((filename, outcome)) = ingestions.next().await {
            match outcome {
                Ok(IngestOutcome::Added(_)) => report.added += 1,
                Ok(IngestOutcome::Fallback(_)) => {
                    report.added += 1;
                    report.fallback += 1;
                }
                Ok(IngestOutcome::AlreadyPresent) | Ok(IngestOutcome::Ignored) => {}
                Err(e) => {
                    warn!(%filename, error = %e, "Failed to ingest file, will retry next pass");
                    report.failed += 1;
                }
            }
        }

        for song in plan.orphaned {
            match self.retire(&song).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    error!(filename = %song.filename, error = %e, "Failed to retire song");
                    report.failed += 1;
                }
            }
        }

        report.elapsed = started.elapsed();
        info!(
            added = report.added,
            fallback = report.fallback,
            removed = report.removed,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Reconciliation complete"
        );

        Ok(report)
    }

    /// Catalog `filename` unless a row for it already exists.
    pub async fn ingest_if_missing(&self, filename: &str) -> Result<IngestOutcome> {
        if !self.config.accepts(filename) {
            return Ok(IngestOutcome::Ignored);
        }

        if self.songs.find_by_filename(filename).await?.is_some() {
            return Ok(IngestOutcome::AlreadyPresent);
        }

        self.ingest(filename).await
    }

    async fn ingest(&self, filename: &str) -> Result<IngestOutcome> {
        let path = self.config.media_root.join(filename);

        let (new_song, fell_back) = match self.reader.read(&path, PictureMode::PresenceOnly).await {
            Ok(metadata) => (
                NewSong {
                    title: metadata.title,
                    artist: metadata.artist,
                    filename: filename.to_string(),
                    has_image: metadata.has_image,
                    modified: metadata.modified,
                },
                false,
            ),
            Err(MetadataError::ParseFailure { message, .. }) => {
                debug!(%filename, %message, "Unparsable tags, using fallback record");
                let modified = tokio::fs::metadata(&path).await?.modified()?;
                (NewSong::fallback(filename, to_unix_millis(modified)), true)
            }
            Err(e) => return Err(SyncError::Metadata(e)),
        };

        Ok(match self.songs.insert(&new_song).await? {
            Some(song) if fell_back => IngestOutcome::Fallback(song),
            Some(song) => {
                debug!(id = %song.id, %filename, "Song cataloged");
                IngestOutcome::Added(song)
            }
            None => IngestOutcome::AlreadyPresent,
        })
    }

    /// Remove a song with its markers and cached images.
    pub async fn retire(&self, song: &Song) -> Result<()> {
        self.markers.clear(song.id).await?;
        self.cache.evict(&song.filename).await?;
        self.songs.delete(song.id).await?;

        debug!(id = %song.id, filename = %song.filename, "Song retired");
        Ok(())
    }

    /// Retire the song stored as `filename`, if any.
    ///
    /// Returns whether a song was retired.
    pub async fn retire_by_filename(&self, filename: &str) -> Result<bool> {
        match self.songs.find_by_filename(filename).await? {
            Some(song) => {
                self.retire(&song).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
