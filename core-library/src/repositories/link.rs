//! Share link repository
//!
//! A link is an opaque random token that resolves to one song for as long as
//! the song stays in the catalog.

use crate::error::Result;
use crate::models::{Song, SongId, SongLink};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query_as, SqlitePool};
use uuid::Uuid;

#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Mint a new token for a song
    async fn create(&self, song_id: SongId) -> Result<SongLink>;

    /// Song the token points at, if both still exist
    async fn resolve(&self, token: &str) -> Result<Option<Song>>;
}

pub struct SqliteLinkRepository {
    pool: SqlitePool,
}

impl SqliteLinkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkRepository for SqliteLinkRepository {
    async fn create(&self, song_id: SongId) -> Result<SongLink> {
        let token = Uuid::new_v4().simple().to_string();

        let link = query_as::<_, SongLink>(
            "INSERT INTO song_links (token, song_id, created_at) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(&token)
        .bind(song_id)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(link)
    }

    async fn resolve(&self, token: &str) -> Result<Option<Song>> {
        let song = query_as::<_, Song>(
            r#"
            SELECT s.* FROM songs s
            INNER JOIN song_links l ON l.song_id = s.id
            WHERE l.token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(song)
    }
}
