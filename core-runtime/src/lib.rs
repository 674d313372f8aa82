//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the library engine:
//! - Logging and tracing infrastructure
//! - Configuration management (builder + environment loading)
//!
//! ## Overview
//!
//! Every other crate in the workspace depends on this one for its
//! configuration types and logging conventions. Nothing in here touches the
//! catalog or the filesystem.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{LibraryConfig, LibraryConfigBuilder, WatchConfig};
pub use error::{Error, Result};
