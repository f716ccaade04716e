//! # depgate types
//!
//! Shared vocabulary for the depgate workspace:
//!
//! - [`Ecosystem`]: the closed set of package-manager families we track
//! - [`Dependency`]: an immutable declaration parsed out of a manifest
//! - [`DependencyStatus`]: the approval lifecycle of a tracked dependency
//! - [`PollKey`]: identity of a (manifest, dependency) pair
//! - [`wire`]: request/response bodies of the remote approval service

pub mod dependency;
pub mod ecosystem;
pub mod status;
pub mod wire;

pub use dependency::{Dependency, PollKey};
pub use ecosystem::{Ecosystem, UnknownEcosystem};
pub use status::{DependencyStatus, UnknownStatus, WireStatus};
