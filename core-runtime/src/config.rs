//! # Library Configuration
//!
//! The configuration system uses a builder to construct a [`LibraryConfig`]
//! holding every setting the library engine needs. Validation is fail-fast:
//! `build()` refuses to produce a config that would break at runtime.
//!
//! ## Environment
//!
//! [`LibraryConfig::from_env`] reads the same variables the server has always
//! used:
//!
//! | Variable           | Field                     | Default      |
//! |--------------------|---------------------------|--------------|
//! | `SONGS_PATH`       | `media_root`              | required     |
//! | `IMAGE_CACHE_PATH` | `image_cache_dir`         | required     |
//! | `DATABASE_PATH`    | `database_path`           | `library.db` |
//! | `SONGS_PER_OFFSET` | `songs_per_offset`        | `50`         |
//! | `AUDIO_EXTENSIONS` | `audio_extensions`        | all files    |
//! | `READ_ONLY`        | `read_only`               | `false`      |
//! | `WATCH`            | `watch.on_startup`        | `false`      |
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::LibraryConfig;
//!
//! let config = LibraryConfig::builder()
//!     .media_root("/srv/music")
//!     .image_cache_dir("/var/cache/songshelf")
//!     .songs_per_offset(25)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.songs_per_offset, 25);
//! assert_eq!(config.search_limit, 8);
//! ```

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SONGS_PER_OFFSET: u32 = 50;
pub const DEFAULT_SEARCH_LIMIT: u32 = 8;
pub const DEFAULT_INGEST_BATCH_WIDTH: usize = 10;
pub const DEFAULT_READ_CACHE_CAPACITY: usize = 512;

/// Change watcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// How long a new file must go without writes before it is ingested
    pub quiescence: Duration,
    /// How often pending files are re-examined for size changes
    pub poll_interval: Duration,
    /// Start the watcher as part of service bootstrap
    pub on_startup: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            quiescence: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(500),
            on_startup: false,
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config(
                "Watch poll interval must be greater than 0ms".to_string(),
            ));
        }

        if self.poll_interval > self.quiescence {
            return Err(Error::Config(format!(
                "Watch poll interval ({}ms) cannot exceed the quiescence window ({}ms)",
                self.poll_interval.as_millis(),
                self.quiescence.as_millis()
            )));
        }

        Ok(())
    }
}

/// Settings for the library engine.
///
/// Use [`LibraryConfigBuilder`] (via [`LibraryConfig::builder`]) or
/// [`LibraryConfig::from_env`] to construct instances.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Flat directory holding the media files
    pub media_root: PathBuf,

    /// Directory for rendered image variants
    pub image_cache_dir: PathBuf,

    /// Path to the SQLite catalog
    pub database_path: PathBuf,

    /// Page size for offset and modified-date listings
    pub songs_per_offset: u32,

    /// Default number of search results
    pub search_limit: u32,

    /// Maximum number of files extracted concurrently during reconciliation
    pub ingest_batch_width: usize,

    /// Lowercase extensions (without dot) to catalog; empty accepts every file
    pub audio_extensions: Vec<String>,

    /// Number of songs kept in the in-memory read cache (0 disables it)
    pub read_cache_capacity: usize,

    /// Reject every mutating operation
    pub read_only: bool,

    /// Change watcher settings
    pub watch: WatchConfig,
}

impl LibraryConfig {
    /// Start building a configuration.
    pub fn builder() -> LibraryConfigBuilder {
        LibraryConfigBuilder::default()
    }

    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(path) = lookup("SONGS_PATH") {
            builder = builder.media_root(path);
        }
        if let Some(path) = lookup("IMAGE_CACHE_PATH") {
            builder = builder.image_cache_dir(path);
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            builder = builder.database_path(path);
        }
        if let Some(raw) = lookup("SONGS_PER_OFFSET") {
            let value = raw.trim().parse::<u32>().map_err(|_| {
                Error::Config(format!("SONGS_PER_OFFSET must be a positive integer, got '{}'", raw))
            })?;
            builder = builder.songs_per_offset(value);
        }
        if let Some(raw) = lookup("AUDIO_EXTENSIONS") {
            builder = builder.audio_extensions(
                raw.split(',')
                    .map(str::trim)
                    .filter(|ext| !ext.is_empty())
                    .map(str::to_string),
            );
        }
        if let Some(raw) = lookup("READ_ONLY") {
            builder = builder.read_only(parse_flag("READ_ONLY", &raw)?);
        }
        if let Some(raw) = lookup("WATCH") {
            builder = builder.watch_on_startup(parse_flag("WATCH", &raw)?);
        }

        builder.build()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.media_root.as_os_str().is_empty() {
            return Err(Error::Config(
                "Media root is required (set SONGS_PATH)".to_string(),
            ));
        }

        if self.image_cache_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Image cache directory is required (set IMAGE_CACHE_PATH)".to_string(),
            ));
        }

        if self.image_cache_dir == self.media_root {
            return Err(Error::Config(
                "Image cache directory must differ from the media root".to_string(),
            ));
        }

        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.songs_per_offset == 0 || self.songs_per_offset > 1000 {
            return Err(Error::Config(format!(
                "Songs per offset must be between 1 and 1000, got {}",
                self.songs_per_offset
            )));
        }

        if self.search_limit == 0 {
            return Err(Error::Config(
                "Search limit must be greater than 0".to_string(),
            ));
        }

        if self.ingest_batch_width == 0 || self.ingest_batch_width > 64 {
            return Err(Error::Config(format!(
                "Ingest batch width must be between 1 and 64, got {}",
                self.ingest_batch_width
            )));
        }

        self.watch.validate()
    }

    /// Whether a filename passes the extension filter.
    pub fn accepts_filename(&self, filename: &str) -> bool {
        accepts_extension(&self.audio_extensions, filename)
    }
}

/// Extension filter shared by the reconciler and the watcher.
pub fn accepts_extension(extensions: &[String], filename: &str) -> bool {
    if extensions.is_empty() {
        return true;
    }

    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::Config(format!(
            "{} must be a boolean flag, got '{}'",
            name, raw
        ))),
    }
}

/// Builder for [`LibraryConfig`].
#[derive(Debug, Clone)]
pub struct LibraryConfigBuilder {
    media_root: Option<PathBuf>,
    image_cache_dir: Option<PathBuf>,
    database_path: PathBuf,
    songs_per_offset: u32,
    search_limit: u32,
    ingest_batch_width: usize,
    audio_extensions: Vec<String>,
    read_cache_capacity: usize,
    read_only: bool,
    watch: WatchConfig,
}

impl Default for LibraryConfigBuilder {
    fn default() -> Self {
        Self {
            media_root: None,
            image_cache_dir: None,
            database_path: PathBuf::from("library.db"),
            songs_per_offset: DEFAULT_SONGS_PER_OFFSET,
            search_limit: DEFAULT_SEARCH_LIMIT,
            ingest_batch_width: DEFAULT_INGEST_BATCH_WIDTH,
            audio_extensions: Vec::new(),
            read_cache_capacity: DEFAULT_READ_CACHE_CAPACITY,
            read_only: false,
            watch: WatchConfig::default(),
        }
    }
}

impl LibraryConfigBuilder {
    pub fn media_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.media_root = Some(path.into());
        self
    }

    pub fn image_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_cache_dir = Some(path.into());
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn songs_per_offset(mut self, size: u32) -> Self {
        self.songs_per_offset = size;
        self
    }

    pub fn search_limit(mut self, limit: u32) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn ingest_batch_width(mut self, width: usize) -> Self {
        self.ingest_batch_width = width;
        self
    }

    /// Restrict cataloging to these extensions (case-insensitive, no dot).
    pub fn audio_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audio_extensions = extensions
            .into_iter()
            .map(|ext| ext.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn read_cache_capacity(mut self, capacity: usize) -> Self {
        self.read_cache_capacity = capacity;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn watch(mut self, watch: WatchConfig) -> Self {
        self.watch = watch;
        self
    }

    pub fn watch_on_startup(mut self, enabled: bool) -> Self {
        self.watch.on_startup = enabled;
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a required path is missing or a value is
    /// out of range.
    pub fn build(self) -> Result<LibraryConfig> {
        let media_root = self.media_root.ok_or_else(|| {
            Error::Config("Media root is required (set SONGS_PATH)".to_string())
        })?;
        let image_cache_dir = self.image_cache_dir.ok_or_else(|| {
            Error::Config("Image cache directory is required (set IMAGE_CACHE_PATH)".to_string())
        })?;

        let config = LibraryConfig {
            media_root,
            image_cache_dir,
            database_path: self.database_path,
            songs_per_offset: self.songs_per_offset,
            search_limit: self.search_limit,
            ingest_batch_width: self.ingest_batch_width,
            audio_extensions: self.audio_extensions,
            read_cache_capacity: self.read_cache_capacity,
            read_only: self.read_only,
            watch: self.watch,
        };

        config.validate()?;
        Ok(config)
    }
}
