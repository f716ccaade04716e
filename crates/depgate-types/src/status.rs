//! Approval lifecycle statuses.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a tracked dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    /// Seen in a manifest, not yet submitted
    New,
    /// Submission in flight
    Requested,
    /// Terminal: cleared for use
    Approved,
    /// Terminal: must not be used
    Denied,
    /// Awaiting a human or automated decision
    Pending,
    /// Being scanned by the backend
    Scanning,
    /// Backend does not know the package yet
    NotFound,
    /// Submission failed
    Error,
}

impl DependencyStatus {
    /// `approved` and `denied` end the lifecycle; nothing polls them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DependencyStatus::Approved | DependencyStatus::Denied)
    }

    /// Statuses that keep a status-poll task alive.
    pub fn is_pollable(&self) -> bool {
        matches!(
            self,
            DependencyStatus::Pending | DependencyStatus::Scanning | DependencyStatus::NotFound
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyStatus::New => "new",
            DependencyStatus::Requested => "requested",
            DependencyStatus::Approved => "approved",
            DependencyStatus::Denied => "denied",
            DependencyStatus::Pending => "pending",
            DependencyStatus::Scanning => "scanning",
            DependencyStatus::NotFound => "not_found",
            DependencyStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a status string we do not know.
#[derive(Debug, Clone, Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for DependencyStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(DependencyStatus::New),
            "requested" => Ok(DependencyStatus::Requested),
            "approved" => Ok(DependencyStatus::Approved),
            "denied" => Ok(DependencyStatus::Denied),
            "pending" => Ok(DependencyStatus::Pending),
            "scanning" => Ok(DependencyStatus::Scanning),
            "not_found" => Ok(DependencyStatus::NotFound),
            "error" => Ok(DependencyStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// The subset of statuses the remote service reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireStatus {
    Approved,
    Denied,
    Pending,
    Scanning,
    NotFound,
}

impl From<WireStatus> for DependencyStatus {
    fn from(status: WireStatus) -> Self {
        match status {
            WireStatus::Approved => DependencyStatus::Approved,
            WireStatus::Denied => DependencyStatus::Denied,
            WireStatus::Pending => DependencyStatus::Pending,
            WireStatus::Scanning => DependencyStatus::Scanning,
            WireStatus::NotFound => DependencyStatus::NotFound,
        }
    }
}
