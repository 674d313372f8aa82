//! Audio Tag Extraction
//!
//! Reads the title, artist and embedded picture of a media file using the
//! `lofty` crate. Supported containers are whatever `lofty` can detect from the
//! file content (ID3v2, Vorbis Comments, MP4, FLAC, RIFF INFO, ...).
//!
//! ## Overview
//!
//! - `TagReader` is the seam used by the reconciler and the artwork service
//! - Text is normalized (trimmed, whitespace collapsed, control chars removed)
//! - A missing or blank title falls back to the filename
//! - Picture bytes are only copied in [`PictureMode::Include`]
//! - Parsing runs on the blocking pool
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::extractor::{MetadataExtractor, PictureMode, TagReader};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = MetadataExtractor::new();
//! let metadata = extractor.read(Path::new("song.mp3"), PictureMode::PresenceOnly).await?;
//!
//! println!("Title: {}", metadata.title);
//! println!("Artist: {}", metadata.artist.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_runtime::logging::strip_path;
use lofty::config::ParseOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, Tag};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::error::{MetadataError, Result};

/// Whether picture bytes should be copied out of the tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureMode {
    /// Only report whether a picture exists
    PresenceOnly,
    /// Copy the preferred picture
    Include,
}

/// Embedded picture copied out of a tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPicture {
    pub data: Bytes,
    pub mime_type: String,
}

/// Extracted metadata from a media file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMetadata {
    /// Normalized tag title, or the filename when the tag has none
    pub title: String,
    /// Normalized artist, `None` when absent or blank
    pub artist: Option<String>,
    /// File modification time (Unix milliseconds)
    pub modified: i64,
    /// Whether the tag carries at least one picture
    pub has_image: bool,
    /// Preferred picture, only populated in [`PictureMode::Include`]
    pub picture: Option<ExtractedPicture>,
}

/// Reads tags of a single file.
#[async_trait]
pub trait TagReader: Send + Sync {
    /// Read the metadata of `path`.
    ///
    /// # Errors
    ///
    /// - [`MetadataError::Io`] if the file cannot be stat'ed or opened
    /// - [`MetadataError::ParseFailure`] if the content is not a recognizable tagged file
    async fn read(&self, path: &Path, mode: PictureMode) -> Result<ExtractedMetadata>;
}

/// `lofty`-backed [`TagReader`]
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    parse_options: ParseOptions,
}

impl MetadataExtractor {
    /// Create an extractor that skips audio property parsing
    pub fn new() -> Self {
        Self {
            parse_options: ParseOptions::new().read_properties(false),
        }
    }

    /// Create extractor with custom parse options
    pub fn with_options(parse_options: ParseOptions) -> Self {
        Self { parse_options }
    }

    fn read_blocking(
        path: &Path,
        parse_options: ParseOptions,
        mode: PictureMode,
    ) -> Result<TagSnapshot> {
        let file = File::open(path)?;

        // Detection is by content only so a wrong extension cannot force a parser
        let tagged_file = Probe::new(BufReader::new(file))
            .options(parse_options)
            .guess_file_type()?
            .read()
            .map_err(|e| MetadataError::ParseFailure {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            debug!(file = %strip_path(&path.to_string_lossy()), "No tags found");
            return Ok(TagSnapshot::default());
        };

        Ok(TagSnapshot {
            title: tag.title().map(|s| normalize_text(s.as_ref())),
            artist: tag.artist().map(|s| normalize_text(s.as_ref())),
            has_image: !tag.pictures().is_empty(),
            picture: match mode {
                PictureMode::Include => preferred_picture(tag),
                PictureMode::PresenceOnly => None,
            },
        })
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TagReader for MetadataExtractor {
    #[instrument(skip(self))]
    async fn read(&self, path: &Path, mode: PictureMode) -> Result<ExtractedMetadata> {
        let stat = tokio::fs::metadata(path).await?;
        let modified = stat.modified().map(to_unix_millis)?;

        let owned: PathBuf = path.to_path_buf();
        let parse_options = self.parse_options;
        let snapshot =
            tokio::task::spawn_blocking(move || Self::read_blocking(&owned, parse_options, mode))
                .await??;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(ExtractedMetadata {
            title: title_or_filename(snapshot.title, &filename),
            artist: snapshot.artist.filter(|artist| !artist.is_empty()),
            modified,
            has_image: snapshot.has_image,
            picture: snapshot.picture,
        })
    }
}

#[derive(Debug, Default)]
struct TagSnapshot {
    title: Option<String>,
    artist: Option<String>,
    has_image: bool,
    picture: Option<ExtractedPicture>,
}

/// Tag title if present and non-blank, otherwise the filename
pub fn title_or_filename(title: Option<String>, filename: &str) -> String {
    match title {
        Some(title) if !title.is_empty() => title,
        _ => filename.to_string(),
    }
}

/// Modification time of a file in Unix milliseconds
pub fn to_unix_millis(time: std::time::SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp_millis()
}

/// Normalize text metadata
///
/// - Trims leading/trailing whitespace
/// - Normalizes consecutive whitespace to single space
/// - Removes null bytes and control characters
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

/// Front cover if present, otherwise the first picture.
fn preferred_picture(tag: &Tag) -> Option<ExtractedPicture> {
    let pictures = tag.pictures();
    let picture = pictures
        .iter()
        .find(|pic| pic.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())?;

    if picture.data().is_empty() {
        return None;
    }

    Some(ExtractedPicture {
        data: Bytes::copy_from_slice(picture.data()),
        mime_type: mime_type_of(picture),
    })
}

fn mime_type_of(picture: &Picture) -> String {
    match picture.mime_type() {
        Some(MimeType::Png) => "image/png",
        Some(MimeType::Jpeg) => "image/jpeg",
        Some(MimeType::Tiff) => "image/tiff",
        Some(MimeType::Bmp) => "image/bmp",
        Some(MimeType::Gif) => "image/gif",
        _ => "application/octet-stream",
    }
    .to_string()
}
