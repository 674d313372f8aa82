//! Artwork Pipeline - Render and Cache Song Artwork
//!
//! Serves the two artwork variants of a song. A cache miss reads the embedded
//! picture from the media file, renders the requested variant and stores it in
//! the [`ImageCache`].
//!
//! Rendering is deterministic: the `full` variant is the embedded bytes
//! verbatim, the `thumbnail` is a 64x64 Lanczos3 resize encoded as lossless
//! WebP. Regenerating an evicted entry yields byte-identical output.
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::{ArtworkService, ImageCache, ImageVariant, MetadataExtractor};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(ImageCache::open("/var/cache/songshelf").await?);
//! let service = ArtworkService::new(Arc::new(MetadataExtractor::new()), cache, "/srv/music");
//!
//! let thumbnail = service.load("Artist - Song.mp3", ImageVariant::Thumbnail).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{MetadataError, Result};
use crate::extractor::{ExtractedPicture, PictureMode, TagReader};
use crate::image_cache::{ImageCache, ImageVariant};
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Edge length of the thumbnail variant in pixels
pub const THUMBNAIL_SIZE: u32 = 64;

/// Artwork service: cache lookup with render-on-miss
pub struct ArtworkService {
    reader: Arc<dyn TagReader>,
    cache: Arc<ImageCache>,
    media_root: PathBuf,
}

impl ArtworkService {
    /// Create a new ArtworkService
    ///
    /// # Arguments
    ///
    /// * `reader` - Tag reader used on cache misses
    /// * `cache` - Cache the rendered variants are stored in
    /// * `media_root` - Directory song filenames are resolved against
    pub fn new(
        reader: Arc<dyn TagReader>,
        cache: Arc<ImageCache>,
        media_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reader,
            cache,
            media_root: media_root.into(),
        }
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    /// Bytes of `variant` for the song stored as `filename`
    ///
    /// # Errors
    ///
    /// - [`MetadataError::NoPicture`] if the file has no embedded picture
    /// - [`MetadataError::ImageProcessing`] if the picture cannot be decoded
    /// - extractor and cache I/O errors
    #[instrument(skip(self))]
    pub async fn load(&self, filename: &str, variant: ImageVariant) -> Result<Bytes> {
        if let Some(bytes) = self.cache.get(filename, variant).await? {
            return Ok(bytes);
        }

        debug!("Artwork cache miss, rendering");
        let metadata = self
            .reader
            .read(&self.media_root.join(filename), PictureMode::Include)
            .await?;

        let picture = metadata.picture.ok_or_else(|| MetadataError::NoPicture {
            filename: filename.to_string(),
        })?;

        let rendered = render(picture, variant).await?;
        self.cache.put(filename, variant, rendered.clone()).await?;

        Ok(rendered)
    }

    /// Absolute path of a song file
    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.media_root.join(filename)
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }
}

/// Produce the bytes of `variant` from an embedded picture.
pub async fn render(picture: ExtractedPicture, variant: ImageVariant) -> Result<Bytes> {
    match variant {
        ImageVariant::Full => Ok(picture.data),
        ImageVariant::Thumbnail => {
            tokio::task::spawn_blocking(move || render_thumbnail(&picture.data)).await?
        }
    }
}

fn render_thumbnail(data: &[u8]) -> Result<Bytes> {
    let img = image::load_from_memory(data).map_err(|e| MetadataError::ImageProcessing {
        message: format!("Failed to decode picture: {}", e),
    })?;

    let resized = img.resize_exact(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3);
    let rgba = DynamicImage::ImageRgba8(resized.to_rgba8());

    let mut buffer = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut buffer), ImageFormat::WebP)
        .map_err(|e| MetadataError::ImageProcessing {
            message: format!("Failed to encode thumbnail: {}", e),
        })?;

    Ok(Bytes::from(buffer))
}
