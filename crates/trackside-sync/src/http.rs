//! HTTP side of the console: REST endpoints and the audit SSE stream.
//!
//! The polling, tailing and metrics components are generic over the
//! source traits below so they can run against fakes in tests;
//! [`ApiClient`] is the reqwest-backed implementation of all three.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use trackside_core::analytics::{HistoricalSeries, KpiSnapshot, Period, TimeRange, parse_series};
use trackside_core::audit::{AuditItem, AuditPage, clamp_limit};
use trackside_core::command::{
    HintResponse, SignalStatusUpdate, hint_response_path, signal_status_path,
};
use trackside_core::hints::{HintsPayload, SuggestionsPayload};
use trackside_core::rpc::{is_status_ok, status_message};

use crate::error::SyncError;

/// Raw body chunks of a streaming response.
pub type ByteStream = BoxStream<'static, Result<Bytes, SyncError>>;

// ─── Source seams ────────────────────────────────────────────────────

pub trait HintsSource: Send + Sync + 'static {
    fn fetch_hints(
        &self,
        recompute: bool,
    ) -> impl Future<Output = Result<HintsPayload, SyncError>> + Send;

    fn fetch_suggestions(
        &self,
    ) -> impl Future<Output = Result<SuggestionsPayload, SyncError>> + Send;
}

pub trait AuditSource: Send + Sync + 'static {
    /// Items with id greater than `since_id`, at most `limit`.
    fn fetch_audit_since(
        &self,
        since_id: u64,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<AuditItem>, SyncError>> + Send;

    /// Open the push stream. Resolves once response headers arrive.
    fn open_audit_stream(&self) -> impl Future<Output = Result<ByteStream, SyncError>> + Send;
}

pub trait MetricsSource: Send + Sync + 'static {
    fn fetch_kpis(
        &self,
        range: TimeRange,
    ) -> impl Future<Output = Result<KpiSnapshot, SyncError>> + Send;

    fn fetch_historical(
        &self,
        metric: &str,
        period: Period,
    ) -> impl Future<Output = Result<HistoricalSeries, SyncError>> + Send;

    fn fetch_overview(&self) -> impl Future<Output = Result<Value, SyncError>> + Send;
}

// ─── ApiClient ───────────────────────────────────────────────────────

pub const DEFAULT_BASE_URL: &str = "http://localhost:22222";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    /// Sent as `X-API-Key` when present.
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub audit_timeout: Duration,
    pub connect_timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            request_timeout: Duration::from_secs(5),
            audit_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, SyncError> {
        // No client-wide timeout: it would also cut off the SSE body.
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header("X-API-Key", key),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T, SyncError> {
        let url = self.url(path);
        let response = self
            .authorized(self.http.get(&url))
            .query(query)
            .timeout(timeout)
            .send()
            .await?;
        let response = ensure_success(url, response)?;
        Ok(response.json::<T>().await?)
    }

    /// `PUT /api/systems/signals/{id}/status`.
    pub async fn set_signal_status(
        &self,
        signal_id: &str,
        update: &SignalStatusUpdate,
    ) -> Result<(), SyncError> {
        let url = self.url(&signal_status_path(signal_id));
        let response = self
            .authorized(self.http.put(&url))
            .json(update)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let response = ensure_success(url, response)?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(());
        }
        let data: Value = serde_json::from_str(&body)?;
        if data.get("status").is_some() && !is_status_ok(&data) {
            return Err(SyncError::Rejected(status_message(&data)));
        }
        tracing::info!(signal = signal_id, status = %update.new_status, "signal override applied");
        Ok(())
    }

    /// `POST /api/ai/hints/{id}/respond`.
    pub async fn respond_to_hint(
        &self,
        hint_id: &str,
        body: &HintResponse,
    ) -> Result<Value, SyncError> {
        let url = self.url(&hint_response_path(hint_id));
        let response = self
            .authorized(self.http.post(&url))
            .json(body)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let response = ensure_success(url, response)?;
        Ok(response.json::<Value>().await?)
    }
}

fn ensure_success(url: String, response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SyncError::Status {
            url,
            status: status.as_u16(),
        })
    }
}

impl HintsSource for ApiClient {
    async fn fetch_hints(&self, recompute: bool) -> Result<HintsPayload, SyncError> {
        let flag = if recompute { "1" } else { "0" };
        self.get_json(
            "/api/ai/hints",
            &[("recompute", flag.to_string())],
            self.config.request_timeout,
        )
        .await
    }

    async fn fetch_suggestions(&self) -> Result<SuggestionsPayload, SyncError> {
        self.get_json("/api/suggestions", &[], self.config.request_timeout)
            .await
    }
}

impl AuditSource for ApiClient {
    async fn fetch_audit_since(&self, since_id: u64, limit: u32) -> Result<Vec<AuditItem>, SyncError> {
        let page: AuditPage = self
            .get_json(
                "/api/audit/logs",
                &[
                    ("sinceId", since_id.to_string()),
                    ("limit", clamp_limit(limit).to_string()),
                ],
                self.config.audit_timeout,
            )
            .await?;
        Ok(page.items)
    }

    async fn open_audit_stream(&self) -> Result<ByteStream, SyncError> {
        let url = self.url("/api/audit/stream");
        let response = self
            .authorized(self.http.get(&url))
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;
        let response = ensure_success(url, response)?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(SyncError::from))
            .boxed())
    }
}

impl MetricsSource for ApiClient {
    async fn fetch_kpis(&self, range: TimeRange) -> Result<KpiSnapshot, SyncError> {
        self.get_json(
            "/api/analytics/kpis",
            &[("timeRange", range.as_str().to_string())],
            self.config.request_timeout,
        )
        .await
    }

    async fn fetch_historical(
        &self,
        metric: &str,
        period: Period,
    ) -> Result<HistoricalSeries, SyncError> {
        let body: Value = self
            .get_json(
                "/api/analytics/historical",
                &[
                    ("metric", metric.to_string()),
                    ("period", period.as_str().to_string()),
                ],
                self.config.request_timeout,
            )
            .await?;
        Ok(HistoricalSeries {
            metric: metric.to_string(),
            period,
            values: parse_series(&body),
        })
    }

    async fn fetch_overview(&self) -> Result<Value, SyncError> {
        self.get_json("/api/systems/overview", &[], self.config.request_timeout)
            .await
    }
}
