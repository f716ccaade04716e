//! depgate daemon library
//!
//! Components behind the `depgated` binary:
//! - Layered configuration
//! - Polling manifest watcher
//! - Service lifecycle (bootstrap, watch, shutdown)

pub mod config;
pub mod error;
pub mod service;
pub mod watcher;

pub use config::DaemonConfig;
pub use error::{DaemonError, DaemonResult};
pub use service::{Daemon, StatusReport};
pub use watcher::{ManifestEvent, ManifestWatcher};
