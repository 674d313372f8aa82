//! Workspace umbrella crate.
//!
//! Re-exports the library façade (`core-service`) together with the runtime
//! configuration and logging helpers (`core-runtime`), so a host only needs
//! one dependency to bootstrap a library.

pub use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
pub use core_runtime::{LibraryConfig, WatchConfig};
pub use core_service::*;
