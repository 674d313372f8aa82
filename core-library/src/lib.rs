//! # Library Catalog Module
//!
//! Owns the persisted catalog of songs and provides repository patterns for
//! data access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pooling and embedded migrations
//! - Repositories for songs, markers and share links
//! - An optional LRU read cache layered over the song repository
//! - The query layer with id-cursor and modified-date pagination

pub mod db;
pub mod error;
pub mod models;
pub mod query;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{LibraryError, Result};
pub use models::{Marker, NewSong, Song, SongId, SongLink, SongSummary};
pub use query::LibraryQuery;
