//! The library façade.

use crate::error::{CoreError, Result};
use crate::marker::MarkerCommand;
use bytes::Bytes;
use core_library::repositories::{
    CachedSongRepository, CursorPage, LinkRepository, MarkerRepository, SongRepository,
    SqliteLinkRepository, SqliteMarkerRepository, SqliteSongRepository,
};
use core_library::{create_pool, DatabaseConfig, LibraryQuery, Song, SongId, SongSummary};
use core_metadata::{ArtworkService, ImageCache, ImageVariant, MetadataExtractor, TagReader};
use core_runtime::LibraryConfig;
use core_sync::{ChangeWatcher, ReconcileMode, ReconcileReport, Reconciler, ReconcilerConfig};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Outcome of [`LibraryService::reload`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub added: usize,
    pub fallback: usize,
    pub removed: usize,
    pub failed: usize,
    /// Wall time of the whole reload, catalog reset included
    pub elapsed: Duration,
}

impl ReloadReport {
    fn from_pass(report: ReconcileReport, elapsed: Duration) -> Self {
        Self {
            added: report.added,
            fallback: report.fallback,
            removed: report.removed,
            failed: report.failed,
            elapsed,
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

/// Entry point for hosts: every external operation on the library.
///
/// Cloning is cheap; clones share the catalog, the cache and the watcher.
#[derive(Clone)]
pub struct LibraryService {
    config: Arc<LibraryConfig>,
    pool: SqlitePool,
    query: LibraryQuery,
    links: Arc<dyn LinkRepository>,
    artwork: Arc<ArtworkService>,
    reconciler: Arc<Reconciler>,
    watcher: Arc<ChangeWatcher>,
}

impl LibraryService {
    /// Open the catalog and cache described by `config`.
    ///
    /// Starts the change watcher when `config.watch.on_startup` is set and the
    /// library is writable.
    pub async fn bootstrap(config: LibraryConfig) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let reader: Arc<dyn TagReader> = Arc::new(MetadataExtractor::new());

        let service = Self::from_parts(config, pool, reader).await?;

        if service.config.watch.on_startup && !service.config.read_only {
            service.watcher.start().await?;
        }

        info!(
            media_root = %service.config.media_root.display(),
            read_only = service.config.read_only,
            "Library service ready"
        );
        Ok(service)
    }

    /// Assemble a service over an existing pool and tag reader.
    ///
    /// The watcher is left stopped.
    pub async fn from_parts(
        config: LibraryConfig,
        pool: SqlitePool,
        reader: Arc<dyn TagReader>,
    ) -> Result<Self> {
        let sqlite_songs: Arc<dyn SongRepository> =
            Arc::new(SqliteSongRepository::new(pool.clone()));
        let songs: Arc<dyn SongRepository> = if config.read_cache_capacity > 0 {
            Arc::new(CachedSongRepository::new(
                sqlite_songs,
                config.read_cache_capacity,
            ))
        } else {
            sqlite_songs
        };
        let markers: Arc<dyn MarkerRepository> =
            Arc::new(SqliteMarkerRepository::new(pool.clone()));
        let links: Arc<dyn LinkRepository> = Arc::new(SqliteLinkRepository::new(pool.clone()));

        let cache = Arc::new(ImageCache::open(&config.image_cache_dir).await?);
        let artwork = Arc::new(ArtworkService::new(
            reader.clone(),
            cache.clone(),
            &config.media_root,
        ));

        let reconciler = Arc::new(Reconciler::new(
            songs.clone(),
            markers.clone(),
            reader,
            cache,
            ReconcilerConfig::from(&config),
        ));
        let watcher = Arc::new(ChangeWatcher::new(
            reconciler.clone(),
            config.watch.clone(),
        ));
        let query = LibraryQuery::new(songs, markers, config.songs_per_offset);

        Ok(Self {
            config: Arc::new(config),
            pool,
            query,
            links,
            artwork,
            reconciler,
            watcher,
        })
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    // -------------------------------------------------------------------------
    // Listing & search
    // -------------------------------------------------------------------------

    /// Songs with `id >= offset` in id order.
    #[instrument(skip(self))]
    pub async fn list_by_offset(&self, offset: i64) -> Result<CursorPage<SongSummary>> {
        Ok(self.query.page_by_id(offset).await?)
    }

    /// Page `page` of songs ordered by modification time, newest first.
    #[instrument(skip(self))]
    pub async fn list_by_modified_offset(&self, page: i64) -> Result<CursorPage<SongSummary>> {
        Ok(self.query.page_by_modified(page).await?)
    }

    /// Case-insensitive substring search over title, artist and filename.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        q: &str,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<SongSummary>> {
        let limit = limit.unwrap_or(self.config.search_limit);
        Ok(self.query.search(q, limit, offset.unwrap_or(0)).await?)
    }

    // -------------------------------------------------------------------------
    // Songs
    // -------------------------------------------------------------------------

    pub async fn get_song(&self, id: SongId) -> Result<Song> {
        Ok(self.query.get_song(id).await?)
    }

    /// Songs for `ids`; unknown ids are skipped.
    pub async fn get_songs_multiple(&self, ids: &[SongId]) -> Result<Vec<Song>> {
        Ok(self.query.get_songs(ids).await?)
    }

    pub async fn get_random_song(&self) -> Result<Song> {
        self.query.random_song().await?.ok_or_else(|| CoreError::NotFound {
            entity_type: "Song".to_string(),
            id: "random".to_string(),
        })
    }

    /// Absolute path of the audio file behind a song.
    pub async fn get_file_path(&self, id: SongId) -> Result<PathBuf> {
        let song = self.get_song(id).await?;
        Ok(self.artwork.path_of(&song.filename))
    }

    /// Cover art of a song, rendered and cached on first request.
    #[instrument(skip(self))]
    pub async fn get_image(&self, id: SongId, variant: ImageVariant) -> Result<Bytes> {
        let song = self.get_song(id).await?;
        if !song.has_image {
            return Err(CoreError::NotFound {
                entity_type: "Image".to_string(),
                id: id.to_string(),
            });
        }

        Ok(self.artwork.load(&song.filename, variant).await?)
    }

    pub async fn count(&self) -> Result<i64> {
        Ok(self.query.count().await?)
    }

    // -------------------------------------------------------------------------
    // Markers
    // -------------------------------------------------------------------------

    pub async fn get_markers(&self, id: SongId) -> Result<Vec<f64>> {
        Ok(self.query.markers(id).await?)
    }

    pub async fn add_marker(&self, id: SongId, position: f64) -> Result<()> {
        self.ensure_writable("add_marker")?;
        self.query.add_marker(id, position).await?;
        debug!(song_id = %id, position, "Marker added");
        Ok(())
    }

    /// Remove every marker of a song; returns how many were removed.
    pub async fn clear_markers(&self, id: SongId) -> Result<u64> {
        self.ensure_writable("clear_markers")?;
        let cleared = self.query.clear_markers(id).await?;
        debug!(song_id = %id, cleared, "Markers cleared");
        Ok(cleared)
    }

    pub async fn apply_marker(&self, id: SongId, command: MarkerCommand) -> Result<()> {
        match command {
            MarkerCommand::Add(position) => self.add_marker(id, position).await,
            MarkerCommand::Clear => self.clear_markers(id).await.map(|_| ()),
        }
    }

    // -------------------------------------------------------------------------
    // Synchronization
    // -------------------------------------------------------------------------

    /// Reconcile the catalog with the media root.
    ///
    /// `full` drops the catalog and image cache first. The pass runs on its own
    /// task, so dropping the returned future does not interrupt it.
    #[instrument(skip(self))]
    pub async fn reload(&self, full: bool) -> Result<ReloadReport> {
        self.ensure_writable("reload")?;

        let mode = if full {
            ReconcileMode::Full
        } else {
            ReconcileMode::Incremental
        };
        let started = Instant::now();
        let reconciler = self.reconciler.clone();

        let report = tokio::spawn(async move { reconciler.reconcile(mode).await }).await??;

        let report = ReloadReport::from_pass(report, started.elapsed());
        info!(
            full,
            added = report.added,
            removed = report.removed,
            elapsed_ms = report.elapsed_ms() as u64,
            "Reloaded songs"
        );
        Ok(report)
    }

    /// Start or stop watching the media root.
    pub async fn set_watch(&self, enabled: bool) -> Result<()> {
        self.ensure_writable("set_watch")?;

        if enabled {
            self.watcher.start().await?;
        } else {
            self.watcher.stop().await;
        }
        Ok(())
    }

    pub async fn is_watching(&self) -> bool {
        self.watcher.is_running().await
    }

    // -------------------------------------------------------------------------
    // Share links
    // -------------------------------------------------------------------------

    /// Mint a share token for a song.
    pub async fn create_link(&self, id: SongId) -> Result<String> {
        self.ensure_writable("create_link")?;
        self.get_song(id).await?;

        let link = self.links.create(id).await?;
        debug!(song_id = %id, "Share link created");
        Ok(link.token)
    }

    pub async fn song_from_link(&self, token: &str) -> Result<Song> {
        self.links
            .resolve(token.trim())
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity_type: "Link".to_string(),
                id: token.to_string(),
            })
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Stop the watcher and close the catalog.
    pub async fn shutdown(&self) {
        self.watcher.stop().await;
        self.pool.close().await;
        info!("Library service stopped");
    }

    fn ensure_writable(&self, operation: &str) -> Result<()> {
        if self.config.read_only {
            return Err(CoreError::ReadOnly {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}
