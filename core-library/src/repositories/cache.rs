//! LRU read cache over a song repository
//!
//! Catalog rows never change in place (a modified file is retired and
//! re-added under a new id), so entries only have to be dropped when a song is
//! deleted.
//!
//! A miss reads the store without holding the cache lock, so a delete can land
//! between the read and the fill. Every delete bumps a generation counter after
//! the row is gone; a fill whose lookup started under an older generation is
//! discarded instead of caching a retired song.

use crate::error::Result;
use crate::models::{NewSong, Song, SongId};
use crate::repositories::{PageRequest, SearchQuery, SongRepository};
use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 512;

struct Entries {
    songs: LruCache<SongId, Song>,
    generation: u64,
}

/// Caches `find_by_id` and `find_many` results; everything else passes through.
pub struct CachedSongRepository {
    inner: Arc<dyn SongRepository>,
    entries: Mutex<Entries>,
}

impl CachedSongRepository {
    /// Wrap `inner` with a cache of at most `capacity` songs (0 picks the default).
    pub fn new(inner: Arc<dyn SongRepository>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            inner,
            entries: Mutex::new(Entries {
                songs: LruCache::new(capacity),
                generation: 0,
            }),
        }
    }

    /// Number of songs currently cached
    pub async fn cached_len(&self) -> usize {
        self.entries.lock().await.songs.len()
    }

    /// Cache `songs` loaded by a lookup that began at generation `seen`.
    async fn remember(&self, songs: &[Song], seen: u64) {
        let mut entries = self.entries.lock().await;
        if entries.generation != seen {
            trace!("Catalog changed during lookup, not caching");
            return;
        }
        for song in songs {
            entries.songs.put(song.id, song.clone());
        }
    }

    async fn invalidate(&self, id: Option<SongId>) {
        let mut entries = self.entries.lock().await;
        entries.generation = entries.generation.wrapping_add(1);
        match id {
            Some(id) => {
                entries.songs.pop(&id);
            }
            None => entries.songs.clear(),
        }
    }
}

#[async_trait]
impl SongRepository for CachedSongRepository {
    async fn find_by_id(&self, id: SongId) -> Result<Option<Song>> {
        let seen = {
            let mut entries = self.entries.lock().await;
            if let Some(song) = entries.songs.get(&id).cloned() {
                trace!(%id, "Song cache hit");
                return Ok(Some(song));
            }
            entries.generation
        };

        let song = self.inner.find_by_id(id).await?;
        if let Some(song) = &song {
            self.remember(std::slice::from_ref(song), seen).await;
        }
        Ok(song)
    }

    async fn find_many(&self, ids: &[SongId]) -> Result<Vec<Song>> {
        let mut found: HashMap<SongId, Song> = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();

        let seen = {
            let mut entries = self.entries.lock().await;
            for id in ids {
                match entries.songs.get(id) {
                    Some(song) => {
                        found.insert(*id, song.clone());
                    }
                    None => missing.push(*id),
                }
            }
            entries.generation
        };

        trace!(hits = found.len(), misses = missing.len(), "Song cache lookup");

        if !missing.is_empty() {
            let loaded = self.inner.find_many(&missing).await?;
            self.remember(&loaded, seen).await;
            found.extend(loaded.into_iter().map(|song| (song.id, song)));
        }

        // Request order, unknown ids omitted
        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }

    async fn find_by_filename(&self, filename: &str) -> Result<Option<Song>> {
        self.inner.find_by_filename(filename).await
    }

    async fn find_by_filenames(&self, filenames: &[String]) -> Result<Vec<Song>> {
        self.inner.find_by_filenames(filenames).await
    }

    async fn list_filenames(&self) -> Result<Vec<String>> {
        self.inner.list_filenames().await
    }

    async fn insert(&self, song: &NewSong) -> Result<Option<Song>> {
        self.inner.insert(song).await
    }

    async fn delete(&self, id: SongId) -> Result<bool> {
        let deleted = self.inner.delete(id).await;
        self.invalidate(Some(id)).await;
        deleted
    }

    async fn delete_all(&self) -> Result<u64> {
        let deleted = self.inner.delete_all().await;
        self.invalidate(None).await;
        deleted
    }

    async fn list_by_id_offset(&self, offset: i64, limit: u32) -> Result<Vec<Song>> {
        self.inner.list_by_id_offset(offset, limit).await
    }

    async fn list_by_modified(&self, page_request: PageRequest) -> Result<Vec<Song>> {
        self.inner.list_by_modified(page_request).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Song>> {
        self.inner.search(query).await
    }

    async fn random(&self) -> Result<Option<Song>> {
        self.inner.random().await
    }

    async fn count(&self) -> Result<i64> {
        self.inner.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::repositories::SqliteSongRepository;
    use std::time::Duration;

    /// Store whose id lookups return only after a delay
    struct SlowLookups {
        inner: Arc<SqliteSongRepository>,
        delay: Duration,
    }

    #[async_trait]
    impl SongRepository for SlowLookups {
        async fn find_by_id(&self, id: SongId) -> Result<Option<Song>> {
            let song = self.inner.find_by_id(id).await?;
            tokio::time::sleep(self.delay).await;
            Ok(song)
        }

        async fn find_many(&self, ids: &[SongId]) -> Result<Vec<Song>> {
            let songs = self.inner.find_many(ids).await?;
            tokio::time::sleep(self.delay).await;
            Ok(songs)
        }

        async fn find_by_filename(&self, filename: &str) -> Result<Option<Song>> {
            self.inner.find_by_filename(filename).await
        }

        async fn find_by_filenames(&self, filenames: &[String]) -> Result<Vec<Song>> {
            self.inner.find_by_filenames(filenames).await
        }

        async fn list_filenames(&self) -> Result<Vec<String>> {
            self.inner.list_filenames().await
        }

        async fn insert(&self, song: &NewSong) -> Result<Option<Song>> {
            self.inner.insert(song).await
        }

        async fn delete(&self, id: SongId) -> Result<bool> {
            self.inner.delete(id).await
        }

        async fn delete_all(&self) -> Result<u64> {
            self.inner.delete_all().await
        }

        async fn list_by_id_offset(&self, offset: i64, limit: u32) -> Result<Vec<Song>> {
            self.inner.list_by_id_offset(offset, limit).await
        }

        async fn list_by_modified(&self, page_request: PageRequest) -> Result<Vec<Song>> {
            self.inner.list_by_modified(page_request).await
        }

        async fn search(&self, query: &SearchQuery) -> Result<Vec<Song>> {
            self.inner.search(query).await
        }

        async fn random(&self) -> Result<Option<Song>> {
            self.inner.random().await
        }

        async fn count(&self) -> Result<i64> {
            self.inner.count().await
        }
    }

    async fn slow_setup() -> (Arc<SqliteSongRepository>, Arc<CachedSongRepository>, Song) {
        let pool = create_test_pool().await.unwrap();
        let store = Arc::new(SqliteSongRepository::new(pool));
        let song = store
            .insert(&NewSong::fallback("gone.mp3", 1))
            .await
            .unwrap()
            .unwrap();
        let slow = Arc::new(SlowLookups {
            inner: store.clone(),
            delay: Duration::from_millis(200),
        });

        (store, Arc::new(CachedSongRepository::new(slow, 8)), song)
    }

    async fn setup() -> (Arc<SqliteSongRepository>, CachedSongRepository, Vec<Song>) {
        let pool = create_test_pool().await.unwrap();
        let store = Arc::new(SqliteSongRepository::new(pool));
        let cached = CachedSongRepository::new(store.clone(), 2);

        let mut songs = Vec::new();
        for name in ["one.mp3", "two.mp3", "three.mp3"] {
            songs.push(
                cached
                    .insert(&NewSong::fallback(name, 1))
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }

        (store, cached, songs)
    }

    #[tokio::test]
    async fn test_find_many_preserves_request_order() {
        let (_store, cached, songs) = setup().await;

        // Warm one entry so the lookup is split between cache and store
        cached.find_by_id(songs[1].id).await.unwrap();

        let ids = vec![songs[2].id, SongId(999), songs[1].id, songs[0].id];
        let found = cached.find_many(&ids).await.unwrap();

        let found_ids: Vec<SongId> = found.iter().map(|s| s.id).collect();
        assert_eq!(found_ids, vec![songs[2].id, songs[1].id, songs[0].id]);
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let (_store, cached, songs) = setup().await;

        let ids: Vec<SongId> = songs.iter().map(|s| s.id).collect();
        cached.find_many(&ids).await.unwrap();

        assert_eq!(cached.cached_len().await, 2);
    }

    #[tokio::test]
    async fn test_delete_invalidates_entry() {
        let (_store, cached, songs) = setup().await;

        assert!(cached.find_by_id(songs[0].id).await.unwrap().is_some());
        assert!(cached.delete(songs[0].id).await.unwrap());
        assert!(cached.find_by_id(songs[0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_all_invalidates_everything() {
        let (store, cached, songs) = setup().await;

        cached.find_by_id(songs[0].id).await.unwrap();
        assert_eq!(cached.delete_all().await.unwrap(), 3);

        assert_eq!(cached.cached_len().await, 0);
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(cached.find_many(&[songs[0].id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_racing_delete_does_not_cache_retired_song() {
        let (store, cached, song) = slow_setup().await;

        let lookup = {
            let cached = cached.clone();
            tokio::spawn(async move { cached.find_by_id(song.id).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(cached.delete(song.id).await.unwrap());
        assert!(store.find_by_id(song.id).await.unwrap().is_none());

        // The in-flight lookup read the row before it was deleted
        lookup.await.unwrap().unwrap();

        assert_eq!(cached.cached_len().await, 0);
        assert!(cached.find_by_id(song.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_lookup_racing_delete_all_does_not_cache() {
        let (_store, cached, song) = slow_setup().await;

        let lookup = {
            let cached = cached.clone();
            tokio::spawn(async move { cached.find_many(&[song.id]).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cached.delete_all().await.unwrap(), 1);
        lookup.await.unwrap().unwrap();

        assert_eq!(cached.cached_len().await, 0);
        assert!(cached.find_many(&[song.id]).await.unwrap().is_empty());
    }
}
