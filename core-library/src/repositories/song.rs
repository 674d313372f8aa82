//! Song repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{NewSong, Song, SongId};
use crate::repositories::PageRequest;
use async_trait::async_trait;
use sqlx::{query_as, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument};

/// SQLite caps bound parameters per statement; `IN` lists are chunked below it.
const MAX_IN_LIST: usize = 500;

/// Ordering applied to search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SongOrder {
    /// Ascending id (catalog insertion order)
    #[default]
    Id,
    /// Most recently modified first
    ModifiedDesc,
}

impl SongOrder {
    fn sql(&self) -> &'static str {
        match self {
            SongOrder::Id => "ORDER BY id ASC",
            SongOrder::ModifiedDesc => "ORDER BY modified DESC, id DESC",
        }
    }
}

/// Substring search over title, artist and filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub limit: u32,
    pub offset: u32,
    pub order: SongOrder,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, limit: u32, offset: u32) -> Self {
        Self {
            text: text.into(),
            limit,
            offset,
            order: SongOrder::Id,
        }
    }

    pub fn ordered_by(mut self, order: SongOrder) -> Self {
        self.order = order;
        self
    }
}

/// Song repository interface for data access operations
#[async_trait]
pub trait SongRepository: Send + Sync {
    /// Find a song by its id
    async fn find_by_id(&self, id: SongId) -> Result<Option<Song>>;

    /// Find several songs at once; unknown ids are omitted
    async fn find_many(&self, ids: &[SongId]) -> Result<Vec<Song>>;

    /// Find a song by its filename
    async fn find_by_filename(&self, filename: &str) -> Result<Option<Song>>;

    /// Find every song whose filename is in `filenames`
    async fn find_by_filenames(&self, filenames: &[String]) -> Result<Vec<Song>>;

    /// Every filename currently in the catalog
    async fn list_filenames(&self) -> Result<Vec<String>>;

    /// Insert a new song
    ///
    /// # Returns
    /// - `Ok(Some(song))` with the assigned id
    /// - `Ok(None)` if a song with the same filename already exists
    async fn insert(&self, song: &NewSong) -> Result<Option<Song>>;

    /// Delete a song by id
    ///
    /// # Returns
    /// - `Ok(true)` if the song was deleted
    /// - `Ok(false)` if it was not found
    async fn delete(&self, id: SongId) -> Result<bool>;

    /// Delete every song, returning how many rows went away
    async fn delete_all(&self) -> Result<u64>;

    /// Songs with `id >= offset`, ascending by id
    async fn list_by_id_offset(&self, offset: i64, limit: u32) -> Result<Vec<Song>>;

    /// Songs ordered by descending modification time, offset by whole pages
    async fn list_by_modified(&self, page_request: PageRequest) -> Result<Vec<Song>>;

    /// Case-insensitive substring search over title, artist and filename
    ///
    /// Case folding is ASCII only (SQLite `LIKE`): `eclair` matches `ECLAIR`,
    /// but `éclair` does not match `Éclair`. `%`, `_` and `\` in the text are
    /// matched literally.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Song>>;

    /// A uniformly random song, if the catalog is not empty
    async fn random(&self) -> Result<Option<Song>>;

    /// Count songs
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of SongRepository
pub struct SqliteSongRepository {
    pool: SqlitePool,
}

impl SqliteSongRepository {
    /// Create a new SQLite song repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Escape `LIKE` wildcards so user text matches literally.
pub(crate) fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn to_sql_offset(offset: u64) -> i64 {
    i64::try_from(offset).unwrap_or(i64::MAX)
}

#[async_trait]
impl SongRepository for SqliteSongRepository {
    async fn find_by_id(&self, id: SongId) -> Result<Option<Song>> {
        let song = query_as::<_, Song>("SELECT * FROM songs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(song)
    }

    async fn find_many(&self, ids: &[SongId]) -> Result<Vec<Song>> {
        let mut songs = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_IN_LIST) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT * FROM songs WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(") ORDER BY id");

            songs.extend(
                builder
                    .build_query_as::<Song>()
                    .fetch_all(&self.pool)
                    .await?,
            );
        }

        Ok(songs)
    }

    async fn find_by_filename(&self, filename: &str) -> Result<Option<Song>> {
        let song = query_as::<_, Song>("SELECT * FROM songs WHERE filename = ?")
            .bind(filename)
            .fetch_optional(&self.pool)
            .await?;

        Ok(song)
    }

    async fn find_by_filenames(&self, filenames: &[String]) -> Result<Vec<Song>> {
        let mut songs = Vec::new();

        for chunk in filenames.chunks(MAX_IN_LIST) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT * FROM songs WHERE filename IN (");
            let mut separated = builder.separated(", ");
            for name in chunk {
                separated.push_bind(name.as_str());
            }
            separated.push_unseparated(")");

            songs.extend(
                builder
                    .build_query_as::<Song>()
                    .fetch_all(&self.pool)
                    .await?,
            );
        }

        Ok(songs)
    }

    async fn list_filenames(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = query_as("SELECT filename FROM songs ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    #[instrument(skip(self, song), fields(filename = %song.filename))]
    async fn insert(&self, song: &NewSong) -> Result<Option<Song>> {
        song.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "song".to_string(),
            message: msg,
        })?;

        let inserted = query_as::<_, Song>(
            r#"
            INSERT INTO songs (title, artist, filename, has_image, modified)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (filename) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.filename)
        .bind(song.has_image)
        .bind(song.modified)
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_none() {
            debug!("Song already cataloged, insert skipped");
        }

        Ok(inserted)
    }

    async fn delete(&self, id: SongId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM songs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM songs")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_by_id_offset(&self, offset: i64, limit: u32) -> Result<Vec<Song>> {
        let songs = query_as::<_, Song>("SELECT * FROM songs WHERE id >= ? ORDER BY id ASC LIMIT ?")
            .bind(offset)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(songs)
    }

    async fn list_by_modified(&self, page_request: PageRequest) -> Result<Vec<Song>> {
        let songs = query_as::<_, Song>(
            "SELECT * FROM songs ORDER BY modified DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(page_request.limit())
        .bind(to_sql_offset(page_request.offset()))
        .fetch_all(&self.pool)
        .await?;

        Ok(songs)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Song>> {
        if query.text.trim().is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }

        let pattern = like_pattern(&query.text);
        let sql = format!(
            "SELECT * FROM songs \
             WHERE title LIKE ? ESCAPE '\\' \
                OR artist LIKE ? ESCAPE '\\' \
                OR filename LIKE ? ESCAPE '\\' \
             {} LIMIT ? OFFSET ?",
            query.order.sql()
        );

        let songs = query_as::<_, Song>(&sql)
            .bind(&pattern)
            .bind(&pattern)
            .bind(&pattern)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(songs)
    }

    async fn random(&self) -> Result<Option<Song>> {
        let song = query_as::<_, Song>("SELECT * FROM songs ORDER BY RANDOM() LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(song)
    }

    async fn count(&self) -> Result<i64> {
        let count: (i64,) = query_as("SELECT COUNT(*) FROM songs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}
