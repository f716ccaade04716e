//! # depgate core
//!
//! The dependency lifecycle engine. It watches manifest revisions, submits
//! newly declared dependencies to a remote approval service, polls pending
//! verdicts and surfaces each outcome once.
//!
//! ## Components
//!
//! - [`differ`]: added/removed/changed dependencies between two revisions
//! - [`gateway`]: the [`ApprovalApi`] seam and its retrying HTTP client
//! - [`gate`]: per-dependency notification dedup
//! - [`scheduler`]: cancellable connection-retry and status-poll tasks
//! - [`orchestrator`]: the per-dependency state machine
//! - [`bootstrap`]: one-time full inventory submission per workspace
//! - [`heartbeat`]: periodic org-wide alert pull
//!
//! Rendering and persistence are reached through the [`sink`] and [`store`]
//! traits.

pub mod bootstrap;
pub mod config;
pub mod differ;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod heartbeat;
pub mod orchestrator;
pub mod parser;
pub mod scheduler;
pub mod sink;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use bootstrap::{BootstrapCoordinator, BootstrapOutcome, WorkspaceBootstrapRecord};
pub use config::{ApiConfig, EngineConfig, HeartbeatConfig, PollingConfig};
pub use differ::{diff_manifest, ManifestDiff};
pub use error::{
    ApiError, ApiResult, BestEffort, BootstrapError, BootstrapResult, ParseError, StoreError,
    StoreResult,
};
pub use gate::NotificationGate;
pub use gateway::{ApprovalApi, HttpApprovalApi, RetryPolicy};
pub use heartbeat::HeartbeatMonitor;
pub use orchestrator::{LifecycleOrchestrator, SeedManifest, TrackedDependency, TrackingContext};
pub use parser::ParserCapability;
pub use scheduler::{PollMode, PollingScheduler};
pub use sink::{
    Diagnostic, DiagnosticSink, InMemoryDiagnostics, Notice, NotificationSink, Severity,
    StatusCounts, TracingNotifier,
};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
