//! reqwest-backed [`CaseSource`]
//!
//! Thin wrapper over the remote REST API: one method per endpoint, optional
//! bearer token, governor rate limiting, `{data}` envelopes unwrapped.
//! No retries; the caller decides what a failure means.

use super::{CaseSource, ClientError, ClientResult, Envelope};
use async_trait::async_trait;
use caseview_common::resources::{
    AiAnalysisResult, AnalysisProgress, AnalyzeRequest, Evidence, Incident, Report, User,
};
use caseview_common::ObjectId;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type RateLimiterType = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const USER_AGENT: &str = concat!("caseview-agg/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`HttpCaseSource`]
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Base URL, e.g. `https://reports.example.org/api`
    pub base_url: String,
    /// Bearer token sent with every request
    pub api_token: Option<String>,
    pub timeout: Duration,
    /// Requests per second; 0 disables rate limiting
    pub rate_limit_per_second: u32,
}

/// Remote reporting API client
pub struct HttpCaseSource {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    rate_limiter: Option<Arc<RateLimiterType>>,
}

impl HttpCaseSource {
    /// Create a new client
    ///
    /// # Errors
    /// Returns `ClientError::Config` if the base URL is empty or the
    /// underlying HTTP client cannot be built.
    pub fn new(config: HttpSourceConfig) -> ClientResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(ClientError::Config("api base URL is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        let rate_limiter = NonZeroU32::new(config.rate_limit_per_second)
            .map(|per_second| Arc::new(GovernorRateLimiter::direct(Quota::per_second(per_second))));

        Ok(Self {
            client,
            base_url: config.base_url,
            api_token: config.api_token.filter(|t| !t.is_empty()),
            rate_limiter,
        })
    }

    /// Builds a URL from a path relative to the base URL.
    pub fn build_url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    async fn send<T: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> ClientResult<T> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let request = match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        debug!(path = %path, "Upstream request");

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(path.to_string()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(ClientError::Api(status.as_u16(), body));
        }

        serde_json::from_str::<Envelope<T>>(&body)
            .map(Envelope::into_inner)
            .map_err(|e| ClientError::Parse(format!("{}: {}", path, e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let request = self.client.get(self.build_url(path));
        self.send(path, request).await
    }
}

#[async_trait]
impl CaseSource for HttpCaseSource {
    async fn reports_for_user(&self, user_id: &ObjectId) -> ClientResult<Vec<Report>> {
        let request = self
            .client
            .get(self.build_url("reports"))
            .query(&[("assignedTo", user_id.as_str())]);
        self.send("reports", request).await
    }

    async fn incident(&self, incident_id: &ObjectId) -> ClientResult<Incident> {
        self.get_json(&format!("incidents/{}", incident_id)).await
    }

    async fn evidence_for_report(&self, report_id: &ObjectId) -> ClientResult<Vec<Evidence>> {
        self.get_json(&format!("evidence/report/{}", report_id)).await
    }

    async fn evidence_for_incident(&self, incident_id: &ObjectId) -> ClientResult<Vec<Evidence>> {
        self.get_json(&format!("evidence/incident/{}", incident_id)).await
    }

    async fn ai_results_for_report(
        &self,
        report_id: &ObjectId,
    ) -> ClientResult<Vec<AiAnalysisResult>> {
        self.get_json(&format!("ai-analysis/report/{}/results", report_id)).await
    }

    async fn analysis_progress(&self, report_id: &ObjectId) -> ClientResult<AnalysisProgress> {
        self.get_json(&format!("ai-analysis/report/{}/progress", report_id)).await
    }

    async fn analyze_report(
        &self,
        report_id: &ObjectId,
        body: &AnalyzeRequest,
    ) -> ClientResult<Vec<AiAnalysisResult>> {
        let path = format!("ai-analysis/report/{}/analyze", report_id);
        let request = self.client.post(self.build_url(&path)).json(body);
        self.send(&path, request).await
    }

    async fn user(&self, user_id: &ObjectId) -> ClientResult<User> {
        self.get_json(&format!("users/{}", user_id)).await
    }
}
