//! reqwest-backed approval service client.

use super::retry::{status_error, RetryPolicy};
use super::ApprovalApi;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use depgate_types::wire::{
    CheckRequest, DependencyRequest, HeartbeatRequest, HeartbeatResponse, QueueRequest,
    StatusResponse, UpdateRequest,
};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tracing::instrument;

/// HTTP client for the approval service
pub struct HttpApprovalApi {
    client: Client,
    base_url: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl HttpApprovalApi {
    /// Create a client from configuration.
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
            retry: RetryPolicy::from_config(config),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_once<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(status_error(status.as_u16(), body))
        }
    }

    async fn post_json<B, T>(&self, operation: &str, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.retry
            .run(operation, || async {
                let response = self.post_once(path, body).await?;
                response.json::<T>().await.map_err(ApiError::from)
            })
            .await
    }

    async fn post_discard<B>(&self, operation: &str, path: &str, body: &B) -> ApiResult<()>
    where
        B: Serialize + ?Sized + Sync,
    {
        self.retry
            .run(operation, || async {
                self.post_once(path, body).await.map(|_| ())
            })
            .await
    }
}

#[async_trait]
impl ApprovalApi for HttpApprovalApi {
    #[instrument(skip_all, fields(ecosystem = %request.ecosystem, packages = request.packages.len()))]
    async fn queue(&self, request: &QueueRequest) -> ApiResult<()> {
        self.post_discard("queue", "/queue", request).await
    }

    #[instrument(skip_all, fields(dependency = %request.name))]
    async fn request(&self, request: &DependencyRequest) -> ApiResult<StatusResponse> {
        self.post_json("request", "/dependencies/request", request)
            .await
    }

    #[instrument(skip_all, fields(dependency = %request.name))]
    async fn check(&self, request: &CheckRequest) -> ApiResult<StatusResponse> {
        self.post_json("check", "/dependencies/check", request).await
    }

    #[instrument(skip_all, fields(dependency = %request.name, action = %request.action))]
    async fn update(&self, request: &UpdateRequest) -> ApiResult<()> {
        self.post_discard("update", "/dependencies/update", request)
            .await
    }

    #[instrument(skip_all)]
    async fn heartbeat(&self, request: &HeartbeatRequest) -> ApiResult<HeartbeatResponse> {
        self.post_json("heartbeat", "/heartbeat", request).await
    }
}
