//! Backend REST client.
//!
//! `Gateway` is the seam the rest of the crate talks to; `HttpGateway` is the
//! reqwest-backed implementation of the `/api/orders` and `/api/menu`
//! contract. Every call carries the client timeout. Idempotent calls are
//! retried with bounded exponential backoff on transient failures; POSTs are
//! sent exactly once.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::RemoteError;
use crate::models::{NewMenuItem, NewOrder, Order, OrderId, OrderStatusUpdate, Product};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn fetch_orders(&self) -> Result<Vec<Order>, RemoteError>;

    async fn fetch_menu(&self) -> Result<Vec<Product>, RemoteError>;

    /// Returns the created order when the backend echoes one back.
    async fn create_order(&self, order: &NewOrder) -> Result<Option<Value>, RemoteError>;

    async fn patch_order_status(&self, id: OrderId, status: &str)
        -> Result<Option<Value>, RemoteError>;

    async fn create_menu_item(&self, item: &NewMenuItem) -> Result<Option<Value>, RemoteError>;

    /// Round-trip latency of `GET /api/health`.
    async fn check_health(&self) -> Result<Duration, RemoteError>;
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the backend base URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/api` segment
pub fn normalize_api_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn transport_error(url: &str, err: &reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        return RemoteError::Timeout {
            url: url.to_string(),
        };
    }
    let message = if err.is_connect() {
        "connection failed".to_string()
    } else if err.is_builder() {
        "invalid backend URL".to_string()
    } else {
        err.to_string()
    };
    RemoteError::Transport {
        url: url.to_string(),
        message,
    }
}

/// Build the error for a non-success response from its body. The backend
/// sends `{"error": ..., "detail": ...}`; only `detail` is shown to users.
pub(crate) fn status_error(status: StatusCode, body_text: &str) -> RemoteError {
    let trimmed = body_text.trim();
    let (detail, message) = match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => {
            let detail = json
                .get("detail")
                .and_then(Value::as_str)
                .filter(|d| !d.trim().is_empty())
                .map(str::to_string);
            let message = json
                .get("error")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string);
            (detail, message)
        }
        Err(_) if !trimmed.is_empty() => (None, Some(trimmed.to_string())),
        Err(_) => (None, None),
    };
    RemoteError::Status {
        status,
        detail,
        message,
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// `base * 2^(attempt - 1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }

    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && err.is_transient() => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        op = op_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying backend call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct HttpGateway {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, RemoteError> {
        let base_url = normalize_api_url(base_url);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| transport_error(&base_url, &e))?;
        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        Self::new(&config.api_url, config.request_timeout, config.retry)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one request against `{base}{path}` and return the raw JSON
    /// body, or `None` for an empty body.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<Value>, RemoteError> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.client.request(method.clone(), &url);
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req.send().await.map_err(|e| transport_error(&url, &e))?;
        let status = resp.status();
        let body_text = resp.text().await.map_err(|e| transport_error(&url, &e))?;

        if !status.is_success() {
            let err = status_error(status, &body_text);
            warn!(method = %method, url = %url, error = %err, "backend request failed");
            return Err(err);
        }

        if body_text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body_text)
            .map(Some)
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, RemoteError> {
        let body = self.send::<Value>(Method::GET, path, None).await?;
        match body {
            Some(value) => {
                serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn fetch_orders(&self) -> Result<Vec<Order>, RemoteError> {
        self.retry
            .run("fetch_orders", || self.get_list("/api/orders"))
            .await
    }

    async fn fetch_menu(&self) -> Result<Vec<Product>, RemoteError> {
        self.retry
            .run("fetch_menu", || self.get_list("/api/menu"))
            .await
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Option<Value>, RemoteError> {
        self.send(Method::POST, "/api/orders", Some(order)).await
    }

    async fn patch_order_status(
        &self,
        id: OrderId,
        status: &str,
    ) -> Result<Option<Value>, RemoteError> {
        let path = format!("/api/orders/{id}");
        let body = OrderStatusUpdate { status };
        self.retry
            .run("patch_order_status", || {
                self.send(Method::PATCH, &path, Some(&body))
            })
            .await
    }

    async fn create_menu_item(&self, item: &NewMenuItem) -> Result<Option<Value>, RemoteError> {
        self.send(Method::POST, "/api/menu", Some(item)).await
    }

    async fn check_health(&self) -> Result<Duration, RemoteError> {
        self.retry
            .run("check_health", move || async move {
                let start = Instant::now();
                self.send::<Value>(Method::GET, "/api/health", None).await?;
                let latency = start.elapsed();
                info!(
                    latency_ms = latency.as_millis() as u64,
                    "connectivity test passed"
                );
                Ok::<_, RemoteError>(latency)
            })
            .await
    }
}
