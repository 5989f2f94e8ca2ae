use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::ValidationError;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Minimal HTTP method set needed by providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// HTTP request envelope used by provider transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: &BTreeMap<String, String>) -> Self {
        for (name, value) in headers {
            self.headers.insert(name.to_ascii_lowercase(), value.clone());
        }
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `body` as the JSON payload.
    pub fn with_json(self, body: &Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Full URL with percent-encoded query parameters appended.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let encoded = self
            .query
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{encoded}", self.url)
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Decoded JSON body, if any.
    pub fn json_body(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|body| serde_json::from_str(body).ok())
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
    retryable: bool,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Provider transport contract.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Default no-op transport for deterministic offline use.
#[derive(Debug, Default)]
pub struct NoopHttpClient;

impl HttpClient for NoopHttpClient {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move { Ok(HttpResponse::ok_json("{}")) })
    }
}

/// How a proxy list is used across requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Try each proxy in order until one connects.
    #[default]
    Try,
    /// Round-robin across requests.
    Rotate,
    /// Pick one at random per request.
    Random,
    /// Always use the first proxy.
    Single,
}

impl ProxyMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Try => "try",
            Self::Rotate => "rotate",
            Self::Random => "random",
            Self::Single => "single",
        }
    }
}

impl FromStr for ProxyMode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "try" => Ok(Self::Try),
            "rotate" => Ok(Self::Rotate),
            "random" => Ok(Self::Random),
            "single" => Ok(Self::Single),
            other => Err(ValidationError::InvalidProxyMode {
                value: other.to_owned(),
            }),
        }
    }
}

/// Proxy URLs plus the selection mode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub proxies: Vec<String>,
    #[serde(default)]
    pub mode: ProxyMode,
}

impl ProxyConfig {
    pub fn new(proxies: Vec<String>, mode: ProxyMode) -> Self {
        Self { proxies, mode }
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

/// Production HTTP client using reqwest, optionally routed through proxies.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    direct: Arc<reqwest::Client>,
    proxied: Arc<Vec<reqwest::Client>>,
    mode: ProxyMode,
    cursor: Arc<AtomicUsize>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_client(build_client(None).unwrap_or_else(|_| reqwest::Client::new()))
    }

    /// Create a ReqwestHttpClient with a custom reqwest::Client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            direct: Arc::new(client),
            proxied: Arc::new(Vec::new()),
            mode: ProxyMode::default(),
            cursor: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build a client that routes every request through `config.proxies`.
    pub fn with_proxies(config: &ProxyConfig) -> Result<Self, HttpError> {
        let proxied = config
            .proxies
            .iter()
            .map(|url| build_client(Some(url)))
            .collect::<Result<Vec<_>, _>>()?;
        let direct = build_client(None)?;
        Ok(Self {
            direct: Arc::new(direct),
            proxied: Arc::new(proxied),
            mode: config.mode,
            cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Clients to try for one request, in order.
    fn candidates(&self) -> Vec<&reqwest::Client> {
        let count = self.proxied.len();
        if count == 0 {
            return vec![self.direct.as_ref()];
        }
        match self.mode {
            ProxyMode::Single => vec![&self.proxied[0]],
            ProxyMode::Rotate => {
                let index = self.cursor.fetch_add(1, Ordering::Relaxed) % count;
                vec![&self.proxied[index]]
            }
            ProxyMode::Random => vec![&self.proxied[fastrand::usize(..count)]],
            ProxyMode::Try => self.proxied.iter().collect(),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn build_client(proxy: Option<&str>) -> Result<reqwest::Client, HttpError> {
    let mut builder = reqwest::Client::builder().cookie_store(true);
    if let Some(url) = proxy {
        let proxy = reqwest::Proxy::all(url)
            .map_err(|e| HttpError::non_retryable(format!("invalid proxy '{url}': {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| HttpError::non_retryable(format!("failed to build http client: {e}")))
}

async fn send_with(client: &reqwest::Client, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
    let url = request.full_url();
    let mut builder = match request.method {
        HttpMethod::Get => client.get(&url),
        HttpMethod::Post => client.post(&url),
    };

    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }

    builder = builder.timeout(std::time::Duration::from_millis(request.timeout_ms));

    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }

    let response = builder.send().await.map_err(|e| {
        if e.is_timeout() {
            HttpError::new(format!("request timeout: {e}"))
        } else if e.is_connect() {
            HttpError::new(format!("connection failed: {e}"))
        } else {
            HttpError::new(format!("request failed: {e}"))
        }
    })?;

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| HttpError::new(format!("failed to read response body: {e}")))?;

    Ok(HttpResponse { status, body })
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let mut last_error = HttpError::new("no http client available");
            for (index, client) in self.candidates().into_iter().enumerate() {
                match send_with(client, &request).await {
                    Ok(response) => return Ok(response),
                    Err(error) => {
                        debug!(
                            method = request.method.as_str(),
                            url = %request.url,
                            candidate = index,
                            error = %error,
                            "transport attempt failed"
                        );
                        last_error = error;
                    }
                }
            }
            Err(last_error)
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn query_parameters_are_encoded_in_order() {
        let request = HttpRequest::get("https://example.test/chart")
            .with_query("ticker", "VN30F1M")
            .with_query("StartTime", "2024-01-01T17:00:00.000Z");

        assert_eq!(
            request.full_url(),
            "https://example.test/chart?ticker=VN30F1M&StartTime=2024-01-01T17%3A00%3A00.000Z"
        );
        assert_eq!(request.query_value("ticker"), Some("VN30F1M"));
    }

    #[test]
    fn json_body_sets_content_type() {
        let request = HttpRequest::post("https://example.test/gap").with_json(&json!({"symbols": ["ACB"]}));

        assert_eq!(
            request.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(request.json_body(), Some(json!({"symbols": ["ACB"]})));
        assert_eq!(request.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn parses_proxy_modes() {
        assert_eq!(ProxyMode::from_str("ROTATE"), Ok(ProxyMode::Rotate));
        assert!(ProxyMode::from_str("chain").is_err());
    }

    #[test]
    fn rotate_mode_cycles_through_proxies() {
        let config = ProxyConfig::new(
            vec![
                String::from("http://127.0.0.1:8001"),
                String::from("http://127.0.0.1:8002"),
            ],
            ProxyMode::Rotate,
        );
        let client = ReqwestHttpClient::with_proxies(&config).expect("client");

        let first = client.candidates()[0] as *const reqwest::Client;
        let second = client.candidates()[0] as *const reqwest::Client;
        let third = client.candidates()[0] as *const reqwest::Client;
        assert_ne!(first, second);
        assert_eq!(first, third);
    }
}
