//! # Sync & Indexing Module
//!
//! Keeps the catalog in step with the media root.
//!
//! ## Overview
//!
//! Two drivers share the same single-file primitives:
//! - The **Reconciler** (`reconciler`) diffs the directory against the catalog,
//!   ingests missing files with bounded concurrency and retires orphaned rows.
//!   It runs on demand (reload) or at startup.
//! - The **Change Watcher** (`watcher`) subscribes to filesystem events, waits
//!   for new files to stop changing (`quiescence`) and ingests or retires them
//!   one at a time.
//!
//! Neither driver takes a catalog-wide lock: a file ingested by both ends up
//! cataloged once because inserts are keyed by the unique filename.

pub mod error;
pub mod quiescence;
pub mod reconciler;
pub mod watcher;

pub use error::{Result, SyncError};
pub use quiescence::QuiescenceWindow;
pub use reconciler::{
    IngestOutcome, ReconcileMode, ReconcilePlan, ReconcileReport, Reconciler, ReconcilerConfig,
};
pub use watcher::ChangeWatcher;
