//! # Repository Pattern Implementation
//!
//! This module provides repository traits and implementations for data access.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//! - Decorators (the read cache) wrap a trait object and implement the same trait
//!
//! ## Available Repositories
//!
//! - `SongRepository` - Catalog rows keyed by id and unique filename
//! - `MarkerRepository` - User-placed positions inside a song
//! - `LinkRepository` - Share tokens resolving to a song
//! - `CachedSongRepository` - LRU read cache over any `SongRepository`

pub mod cache;
pub mod link;
pub mod marker;
pub mod pagination;
pub mod song;

pub use cache::CachedSongRepository;
pub use link::{LinkRepository, SqliteLinkRepository};
pub use marker::{MarkerRepository, SqliteMarkerRepository};
pub use pagination::{CursorPage, PageRequest};
pub use song::{SearchQuery, SongOrder, SongRepository, SqliteSongRepository};
