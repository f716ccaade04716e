//! JSON bodies exchanged with the remote approval service.
//!
//! Field names are camelCase on the wire. Optional fields are omitted when
//! empty so the backend can distinguish "not declared" from "blank".

use crate::{Dependency, DependencyStatus, Ecosystem, WireStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Project identity attached to every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRef {
    pub project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl ProjectRef {
    pub fn new(project_name: impl Into<String>, repository: Option<String>) -> Self {
        Self {
            project_name: project_name.into(),
            repository,
        }
    }
}

/// One package inside a bulk queue submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedPackage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub path: String,
}

impl From<&Dependency> for QueuedPackage {
    fn from(dep: &Dependency) -> Self {
        Self {
            name: dep.name.clone(),
            version: dep.version.clone(),
            path: dep.manifest.display().to_string(),
        }
    }
}

/// `POST /queue`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRequest {
    pub project_name: String,
    pub ecosystem: Ecosystem,
    pub packages: Vec<QueuedPackage>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl QueueRequest {
    pub fn new(project: &ProjectRef, ecosystem: Ecosystem, deps: &[Dependency]) -> Self {
        Self {
            project_name: project.project_name.clone(),
            ecosystem,
            packages: deps.iter().map(QueuedPackage::from).collect(),
            timestamp: Utc::now(),
            repository: project.repository.clone(),
        }
    }
}

/// `POST /dependencies/request`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRequest {
    pub project_name: String,
    pub ecosystem: Ecosystem,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl DependencyRequest {
    pub fn new(project: &ProjectRef, dep: &Dependency) -> Self {
        Self {
            project_name: project.project_name.clone(),
            ecosystem: dep.ecosystem,
            name: dep.name.clone(),
            version: dep.version.clone(),
            path: dep.manifest.display().to_string(),
            repository: project.repository.clone(),
        }
    }
}

/// `POST /dependencies/check`; like a request but without the path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub project_name: String,
    pub ecosystem: Ecosystem,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl CheckRequest {
    pub fn new(project: &ProjectRef, dep: &Dependency) -> Self {
        Self {
            project_name: project.project_name.clone(),
            ecosystem: dep.ecosystem,
            name: dep.name.clone(),
            version: dep.version.clone(),
            repository: project.repository.clone(),
        }
    }
}

/// Verdict returned by request and check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: WireStatus,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub package_manager: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_url: Option<String>,
}

impl StatusResponse {
    /// Build a response for a dependency; mostly useful in tests and fakes.
    pub fn new(dep: &Dependency, status: WireStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            approved: status == WireStatus::Approved,
            message: message.into(),
            package_name: dep.name.clone(),
            package_manager: dep.ecosystem.to_string(),
            reason_url: None,
        }
    }

    pub fn with_reason_url(mut self, url: impl Into<String>) -> Self {
        self.reason_url = Some(url.into());
        self
    }
}

/// Kind of change reported through `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    /// Dependency no longer declared
    Removed,
    /// Declared version changed
    Changed,
}

impl std::fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateAction::Removed => f.write_str("removed"),
            UpdateAction::Changed => f.write_str("changed"),
        }
    }
}

/// `POST /dependencies/update`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub project_name: String,
    pub ecosystem: Ecosystem,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    pub action: UpdateAction,
    pub status: DependencyStatus,
    pub timestamp: DateTime<Utc>,
}

impl UpdateRequest {
    pub fn new(
        project: &ProjectRef,
        dep: &Dependency,
        action: UpdateAction,
        status: DependencyStatus,
    ) -> Self {
        Self {
            project_name: project.project_name.clone(),
            ecosystem: dep.ecosystem,
            name: dep.name.clone(),
            version: dep.version.clone(),
            path: dep.manifest.display().to_string(),
            repository: project.repository.clone(),
            action,
            status,
            timestamp: Utc::now(),
        }
    }
}

/// `POST /heartbeat`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HeartbeatRequest {
    pub fn new(project: &ProjectRef) -> Self {
        Self {
            project_name: project.project_name.clone(),
            repository: project.repository.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatHealth {
    Healthy,
    Warning,
}

/// Org-wide alert carried by a heartbeat response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatAlert {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: HeartbeatHealth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<HeartbeatAlert>,
}
