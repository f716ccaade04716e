//! Approval service gateway.
//!
//! [`ApprovalApi`] is the seam the engine talks through; [`HttpApprovalApi`]
//! is the production implementation with the transport retry policy.

mod http;
mod retry;

pub use http::HttpApprovalApi;
pub use retry::RetryPolicy;

use crate::error::ApiResult;
use async_trait::async_trait;
use depgate_types::wire::{
    CheckRequest, DependencyRequest, HeartbeatRequest, HeartbeatResponse, QueueRequest,
    StatusResponse, UpdateRequest,
};

/// Remote operations of the approval service.
#[async_trait]
pub trait ApprovalApi: Send + Sync {
    /// Bulk submission of a full inventory; the body of the reply is ignored.
    async fn queue(&self, request: &QueueRequest) -> ApiResult<()>;

    /// Submit one dependency for approval.
    async fn request(&self, request: &DependencyRequest) -> ApiResult<StatusResponse>;

    /// Ask for the current verdict of one dependency.
    async fn check(&self, request: &CheckRequest) -> ApiResult<StatusResponse>;

    /// Report a removal or version change.
    async fn update(&self, request: &UpdateRequest) -> ApiResult<()>;

    /// Pull org-wide alerts.
    async fn heartbeat(&self, request: &HeartbeatRequest) -> ApiResult<HeartbeatResponse>;
}
