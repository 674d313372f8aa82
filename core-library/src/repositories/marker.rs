//! Marker repository trait and implementation

use crate::error::Result;
use crate::models::{Marker, SongId};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query, query_as, SqlitePool};

/// Marker repository interface
///
/// Markers are not deduplicated and keep their insertion order.
#[async_trait]
pub trait MarkerRepository: Send + Sync {
    /// Append a marker to a song
    ///
    /// # Errors
    /// Returns a database error if the song does not exist (foreign key).
    async fn add(&self, song_id: SongId, position: f64) -> Result<Marker>;

    /// Remove every marker of a song, returning how many were removed
    async fn clear(&self, song_id: SongId) -> Result<u64>;

    /// Marker positions in insertion order
    async fn positions(&self, song_id: SongId) -> Result<Vec<f64>>;
}

/// SQLite implementation of MarkerRepository
pub struct SqliteMarkerRepository {
    pool: SqlitePool,
}

impl SqliteMarkerRepository {
    /// Create a new SqliteMarkerRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarkerRepository for SqliteMarkerRepository {
    async fn add(&self, song_id: SongId, position: f64) -> Result<Marker> {
        let marker = query_as::<_, Marker>(
            "INSERT INTO markers (song_id, position, created_at) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(song_id)
        .bind(position)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(marker)
    }

    async fn clear(&self, song_id: SongId) -> Result<u64> {
        let result = query("DELETE FROM markers WHERE song_id = ?")
            .bind(song_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn positions(&self, song_id: SongId) -> Result<Vec<f64>> {
        let rows: Vec<(f64,)> =
            query_as("SELECT position FROM markers WHERE song_id = ? ORDER BY id ASC")
                .bind(song_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(position,)| position).collect())
    }
}
