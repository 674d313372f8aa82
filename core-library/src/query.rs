//! High-level query API for the song catalog.
//!
//! Composes the song and marker repositories into the read surface exposed to
//! clients: id-cursor and modified-date pagination, substring search, lookups
//! and marker access. Listings return [`SongSummary`] projections; clients
//! fetch full records with [`LibraryQuery::get_song`] or
//! [`LibraryQuery::get_songs`].

use crate::error::{LibraryError, Result};
use crate::models::{Song, SongId, SongSummary};
use crate::repositories::{
    CursorPage, MarkerRepository, PageRequest, SearchQuery, SongOrder, SongRepository,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Read-side facade over the catalog.
#[derive(Clone)]
pub struct LibraryQuery {
    songs: Arc<dyn SongRepository>,
    markers: Arc<dyn MarkerRepository>,
    page_size: u32,
}

impl LibraryQuery {
    /// Create a query layer serving `page_size` songs per listing page.
    pub fn new(
        songs: Arc<dyn SongRepository>,
        markers: Arc<dyn MarkerRepository>,
        page_size: u32,
    ) -> Self {
        Self {
            songs,
            markers,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Case-insensitive substring search, ascending by id.
    ///
    /// Blank text yields an empty result without touching the store.
    pub async fn search(&self, text: &str, limit: u32, offset: u32) -> Result<Vec<SongSummary>> {
        self.search_ordered(text, limit, offset, SongOrder::Id).await
    }

    /// Search with an explicit result order.
    #[instrument(skip(self))]
    pub async fn search_ordered(
        &self,
        text: &str,
        limit: u32,
        offset: u32,
        order: SongOrder,
    ) -> Result<Vec<SongSummary>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query = SearchQuery::new(text, limit, offset).ordered_by(order);
        let songs = self.songs.search(&query).await?;
        debug!(hits = songs.len(), "Search completed");

        Ok(songs.iter().map(SongSummary::from).collect())
    }

    /// Songs with `id >= cursor`, ascending.
    ///
    /// The next cursor is `last id + 1` and only present for a full page, so
    /// following cursors visits every song exactly once even when ids have
    /// gaps.
    pub async fn page_by_id(&self, cursor: i64) -> Result<CursorPage<SongSummary>> {
        if cursor < 0 {
            return Err(LibraryError::InvalidInput {
                field: "offset".to_string(),
                message: format!("cursor must be non-negative, got {}", cursor),
            });
        }

        let songs = self.songs.list_by_id_offset(cursor, self.page_size).await?;

        Ok(
            CursorPage::after_last(songs, self.page_size, |last| last.id.value() + 1)
                .map(|song| song.summary()),
        )
    }

    /// Page `page` of songs ordered by descending modification time.
    pub async fn page_by_modified(&self, page: i64) -> Result<CursorPage<SongSummary>> {
        let page_number = u32::try_from(page).map_err(|_| LibraryError::InvalidInput {
            field: "offset".to_string(),
            message: format!("page must be between 0 and {}, got {}", u32::MAX, page),
        })?;

        let songs = self
            .songs
            .list_by_modified(PageRequest::new(page_number, self.page_size))
            .await?;

        Ok(
            CursorPage::after_last(songs, self.page_size, |_| page + 1)
                .map(|song| song.summary()),
        )
    }

    pub async fn get_song(&self, id: SongId) -> Result<Song> {
        self.songs
            .find_by_id(id)
            .await?
            .ok_or_else(|| LibraryError::song_not_found(id))
    }

    /// Full records for `ids`; unknown ids are omitted.
    pub async fn get_songs(&self, ids: &[SongId]) -> Result<Vec<Song>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.songs.find_many(ids).await
    }

    pub async fn get_song_by_filename(&self, filename: &str) -> Result<Option<Song>> {
        self.songs.find_by_filename(filename).await
    }

    pub async fn random_song(&self) -> Result<Option<Song>> {
        self.songs.random().await
    }

    pub async fn count(&self) -> Result<i64> {
        self.songs.count().await
    }

    /// Marker positions of a song in insertion order.
    pub async fn markers(&self, id: SongId) -> Result<Vec<f64>> {
        self.ensure_song(id).await?;
        self.markers.positions(id).await
    }

    pub async fn add_marker(&self, id: SongId, position: f64) -> Result<()> {
        if !position.is_finite() {
            return Err(LibraryError::InvalidInput {
                field: "position".to_string(),
                message: format!("marker position must be finite, got {}", position),
            });
        }

        self.ensure_song(id).await?;
        self.markers.add(id, position).await?;
        Ok(())
    }

    /// Remove all markers of a song, returning how many were removed.
    pub async fn clear_markers(&self, id: SongId) -> Result<u64> {
        self.ensure_song(id).await?;
        self.markers.clear(id).await
    }

    async fn ensure_song(&self, id: SongId) -> Result<()> {
        self.get_song(id).await.map(|_| ())
    }
}
