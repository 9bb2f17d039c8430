//! HTTP adapter for the remote funding service
//!
//! # Wire contract
//!
//! - `POST {base_url}/debits` with `{"ownerId", "amount", "correlationId"}`
//!   answers `{"status": "DEBITED", "balanceAfter"?}` or
//!   `{"status": "REJECTED", "reason"}`. The service deduplicates on
//!   `correlationId`, which makes retries safe.
//! - `GET {base_url}/debits/{correlationId}` answers
//!   `{"status": "DEBITED" | "NOT_DEBITED" | "UNKNOWN"}`; 404 means not debited.
//!
//! Only connection failures are retried. A 5xx answer or a client timeout
//! is returned to the caller on the first attempt.
//!
//! # Error mapping
//!
//! - 400/402/409/422 on a debit -> `Rejected` outcome
//! - 401/403 -> `PortError::Unauthorized`
//! - 404 -> `PortError::NotFound`
//! - 429 -> `PortError::RateLimited`
//! - 5xx -> `PortError::ServiceUnavailable`
//! - client timeout -> `PortError::Timeout`

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use core_kernel::{
    AdapterHealth, CircuitBreakerConfig, DomainPort, HealthCheckResult, HealthCheckable, PortError, TransferId,
};

use crate::ports::{RemoteDebitOutcome, RemoteDebitRequest, RemoteDebitStatus, RemoteFundingPort};

const SERVICE_NAME: &str = "remote-funding";

/// Connection settings for the remote funding service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteFundingConfig {
    /// Base URL, e.g. `https://funding.internal/api/v1`
    pub base_url: String,
    /// Bearer token sent with every request
    pub api_key: Option<String>,
    /// Per-attempt HTTP timeout
    pub request_timeout_ms: u64,
    /// Additional attempts after a connection failure
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for RemoteFundingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081/api/v1".to_string(),
            api_key: None,
            request_timeout_ms: 2_000,
            retry_attempts: 1,
            retry_backoff_ms: 100,
            circuit_breaker: Some(CircuitBreakerConfig::default()),
        }
    }
}

/// Opens after consecutive failures and half-opens after the reset timeout
#[derive(Debug)]
struct CircuitBreaker {
    config: CircuitBreakerConfig,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    is_open: AtomicBool,
    opened_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            is_open: AtomicBool::new(false),
            opened_at: RwLock::new(None),
        }
    }

    async fn is_available(&self) -> bool {
        if !self.is_open.load(Ordering::Relaxed) {
            return true;
        }
        match *self.opened_at.read().await {
            Some(opened) => opened.elapsed() > Duration::from_secs(self.config.reset_timeout_secs),
            None => true,
        }
    }

    fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        let successes = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= u64::from(self.config.success_threshold) {
            self.is_open.store(false, Ordering::Relaxed);
            self.success_count.store(0, Ordering::Relaxed);
        }
    }

    async fn record_failure(&self) {
        self.success_count.store(0, Ordering::Relaxed);
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= u64::from(self.config.failure_threshold) {
            self.is_open.store(true, Ordering::Relaxed);
            *self.opened_at.write().await = Some(Instant::now());
        }
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebitResponse {
    status: String,
    balance_after: Option<i64>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DebitStatusResponse {
    status: RemoteDebitStatus,
}

/// Remote funding service over HTTP
#[derive(Debug)]
pub struct HttpRemoteFundingAdapter {
    config: RemoteFundingConfig,
    client: Client,
    circuit_breaker: Option<CircuitBreaker>,
}

impl HttpRemoteFundingAdapter {
    pub fn new(config: RemoteFundingConfig) -> Result<Self, PortError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| PortError::internal(format!("failed to build HTTP client: {}", e)))?;
        let circuit_breaker = config.circuit_breaker.clone().map(CircuitBreaker::new);
        Ok(Self {
            config,
            client,
            circuit_breaker,
        })
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path)
    }

    async fn ensure_circuit_closed(&self) -> Result<(), PortError> {
        if let Some(cb) = &self.circuit_breaker {
            if !cb.is_available().await {
                return Err(PortError::ServiceUnavailable {
                    service: format!("{} (circuit open)", SERVICE_NAME),
                });
            }
        }
        Ok(())
    }

    async fn record(&self, result: &Result<Response, PortError>) {
        let Some(cb) = &self.circuit_breaker else {
            return;
        };
        match result {
            Err(e) if e.is_transient() => cb.record_failure().await,
            _ => cb.record_success(),
        }
    }

    /// Sends a request, retrying connection failures with exponential backoff
    async fn send_with_retry<F>(&self, operation: &str, build: F) -> Result<Response, PortError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        self.ensure_circuit_closed().await?;

        let mut backoff = self.config.retry_backoff_ms;
        let mut attempt = 0;
        loop {
            let mut request = build();
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }

            let result = match request.send().await {
                Ok(response) if response.status().is_server_error() => Err(map_status(response.status())),
                Ok(response) => Ok(response),
                Err(e) => Err(map_transport_error(operation, self.config.request_timeout_ms, e)),
            };
            self.record(&result).await;

            match result {
                Err(e) if is_retryable(&e) && attempt < self.config.retry_attempts => {
                    attempt += 1;
                    warn!(operation, attempt, error = %e, "Remote funding request failed; retrying");
                    sleep(Duration::from_millis(backoff)).await;
                    backoff = (backoff * 2).min(2_000);
                }
                other => return other,
            }
        }
    }
}

impl DomainPort for HttpRemoteFundingAdapter {}

#[async_trait]
impl RemoteFundingPort for HttpRemoteFundingAdapter {
    #[instrument(skip(self, request), fields(correlation_id = %request.correlation_id, amount = %request.amount))]
    async fn debit(&self, request: &RemoteDebitRequest) -> Result<RemoteDebitOutcome, PortError> {
        let url = self.url("debits");
        let response = self
            .send_with_retry("remote_debit", || self.client.post(&url).json(request))
            .await?;

        let status = response.status();
        if is_rejection(status) {
            let body: Option<DebitResponse> = response.json().await.ok();
            let reason = body
                .and_then(|b| b.reason)
                .unwrap_or_else(|| format!("remote service rejected the debit ({})", status));
            return Ok(RemoteDebitOutcome::Rejected { reason });
        }
        if !status.is_success() {
            return Err(map_status(status));
        }

        let body: DebitResponse = response
            .json()
            .await
            .map_err(|e| PortError::transformation(format!("invalid debit response: {}", e)))?;
        debug!(status = %body.status, "Remote debit answered");
        match body.status.as_str() {
            "DEBITED" => Ok(RemoteDebitOutcome::Debited {
                balance_after: body.balance_after,
            }),
            "REJECTED" => Ok(RemoteDebitOutcome::Rejected {
                reason: body.reason.unwrap_or_else(|| "rejected".to_string()),
            }),
            other => Err(PortError::transformation(format!("unknown debit status '{}'", other))),
        }
    }

    #[instrument(skip(self), fields(correlation_id = %correlation_id))]
    async fn debit_status(&self, correlation_id: TransferId) -> Result<RemoteDebitStatus, PortError> {
        let url = self.url(&format!("debits/{}", correlation_id.as_uuid()));
        let response = self
            .send_with_retry("remote_debit_status", || self.client.get(&url))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(RemoteDebitStatus::NotDebited),
            status if status.is_success() => {
                let body: DebitStatusResponse = response
                    .json()
                    .await
                    .map_err(|e| PortError::transformation(format!("invalid status response: {}", e)))?;
                Ok(body.status)
            }
            status => Err(map_status(status)),
        }
    }
}

#[async_trait]
impl HealthCheckable for HttpRemoteFundingAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        let open = self.circuit_breaker.as_ref().is_some_and(CircuitBreaker::is_open);
        let mut result = HealthCheckResult::healthy("remote_funding_http", 0);
        if open {
            result.status = AdapterHealth::Degraded;
            result.message = Some("circuit breaker open".to_string());
        }
        result
    }
}

fn is_rejection(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST
            | StatusCode::PAYMENT_REQUIRED
            | StatusCode::CONFLICT
            | StatusCode::UNPROCESSABLE_ENTITY
    )
}

/// Maps a non-success HTTP status to a port error
fn map_status(status: StatusCode) -> PortError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized {
            message: format!("remote funding service answered {}", status),
        },
        StatusCode::NOT_FOUND => PortError::not_found("RemoteDebit", status),
        StatusCode::TOO_MANY_REQUESTS => PortError::RateLimited { retry_after_secs: 1 },
        s if s.is_server_error() => PortError::ServiceUnavailable {
            service: format!("{} ({})", SERVICE_NAME, s),
        },
        s => PortError::internal(format!("unexpected status from remote funding service: {}", s)),
    }
}

/// Connection-level failures, where the request may never have reached the service
fn is_retryable(error: &PortError) -> bool {
    matches!(error, PortError::Connection { .. })
}

fn map_transport_error(operation: &str, timeout_ms: u64, error: reqwest::Error) -> PortError {
    if error.is_timeout() {
        PortError::timeout(operation, timeout_ms)
    } else {
        PortError::Connection {
            message: format!("{} request failed", operation),
            source: Some(Box::new(error)),
        }
    }
}
