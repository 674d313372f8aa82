//! # Metadata & Artwork Module
//!
//! Reads tags from media files and serves derived artwork.
//!
//! ## Overview
//!
//! This module handles:
//! - Tag extraction (title, artist, embedded picture) via `lofty`
//! - The on-disk, content-addressed image cache
//! - Rendering of the `thumbnail` and `full` artwork variants

pub mod artwork;
pub mod error;
pub mod extractor;
pub mod image_cache;

pub use artwork::ArtworkService;
pub use error::{MetadataError, Result};
pub use extractor::{ExtractedMetadata, ExtractedPicture, MetadataExtractor, PictureMode, TagReader};
pub use image_cache::{cache_key, ImageCache, ImageVariant};
