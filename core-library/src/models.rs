//! Domain models for the song catalog
//!
//! Rows are immutable once created apart from their markers: a changed file is
//! represented as a retire followed by a fresh insert.

use crate::error::LibraryError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// ID Types
// =============================================================================

/// Catalog-assigned identifier for a song
///
/// Ids are handed out in ascending order and never reused, which is what makes
/// `id >= cursor` pagination stable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct SongId(pub i64);

impl SongId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SongId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for SongId {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(SongId)
            .map_err(|_| LibraryError::InvalidInput {
                field: "id".to_string(),
                message: format!("'{}' is not a numeric song id", s),
            })
    }
}

// =============================================================================
// Song
// =============================================================================

/// Full song record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Song {
    pub id: SongId,
    /// Tag title, or the filename when the tag is absent or blank
    pub title: String,
    pub artist: Option<String>,
    /// Name of the file inside the media root; unique across the catalog
    pub filename: String,
    /// Whether the file carries an embedded picture
    pub has_image: bool,
    /// File modification time at ingest (Unix milliseconds)
    pub modified: i64,
}

impl Song {
    pub fn summary(&self) -> SongSummary {
        SongSummary { id: self.id }
    }
}

/// Listing projection: the client fetches details separately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct SongSummary {
    pub id: SongId,
}

impl From<&Song> for SongSummary {
    fn from(song: &Song) -> Self {
        song.summary()
    }
}

/// A song about to be inserted; the catalog assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSong {
    pub title: String,
    pub artist: Option<String>,
    pub filename: String,
    pub has_image: bool,
    pub modified: i64,
}

impl NewSong {
    /// Record used when a file's tags cannot be parsed.
    pub fn fallback(filename: impl Into<String>, modified: i64) -> Self {
        let filename = filename.into();
        Self {
            title: filename.clone(),
            artist: None,
            filename,
            has_image: false,
            modified,
        }
    }

    /// Validate the record before insertion
    pub fn validate(&self) -> Result<(), String> {
        if self.filename.trim().is_empty() {
            return Err("Song filename cannot be empty".to_string());
        }

        // Any single path component is accepted, backslashes included
        if self.filename.contains('/') || self.filename.contains('\0') {
            return Err(format!(
                "Song filename '{}' must be a single file name",
                self.filename
            ));
        }

        if matches!(self.filename.as_str(), "." | "..") {
            return Err(format!(
                "Song filename '{}' is not a file name",
                self.filename
            ));
        }

        if self.title.trim().is_empty() {
            return Err("Song title cannot be empty".to_string());
        }

        Ok(())
    }
}

// =============================================================================
// Markers & links
// =============================================================================

/// A user-placed position inside a song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Marker {
    pub id: i64,
    pub song_id: SongId,
    /// Song-relative position; the unit is chosen by the client
    pub position: f64,
    pub created_at: i64,
}

/// Shareable token resolving to a single song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SongLink {
    pub token: String,
    pub song_id: SongId,
    pub created_at: i64,
}
