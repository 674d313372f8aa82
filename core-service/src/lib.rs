//! # Core Service
//!
//! Façade tying the workspace together into one library handle.
//!
//! ## Overview
//!
//! [`LibraryService`] owns:
//! - the SQLite catalog and its optional read cache (`core-library`)
//! - the tag extractor and the content-addressed image cache (`core-metadata`)
//! - the reconciler and the change watcher (`core-sync`)
//!
//! and exposes the operations a transport layer needs: listing, search, song
//! lookup, artwork, markers, reload, watch control and share links. Errors are
//! reported as [`CoreError`], with absence and bad input lifted out of the
//! lower crates so they map directly onto client-facing statuses.
//!
//! ## Usage
//!
//! ```no_run
//! use core_runtime::LibraryConfig;
//! use core_service::LibraryService;
//!
//! # async fn example() -> core_service::Result<()> {
//! let config = LibraryConfig::from_env()?;
//! let library = LibraryService::bootstrap(config).await?;
//!
//! let report = library.reload(false).await?;
//! println!("Reloaded songs in {}ms", report.elapsed_ms());
//!
//! let first_page = library.list_by_offset(0).await?;
//! # let _ = first_page;
//! library.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod marker;
pub mod service;

pub use core_library::repositories::CursorPage;
pub use core_library::{Song, SongId, SongSummary};
pub use core_metadata::ImageVariant;
pub use error::{CoreError, Result};
pub use marker::MarkerCommand;
pub use service::{LibraryService, ReloadReport};
