//! Bundled providers, one module per upstream source.
//!
//! | Source | Capabilities |
//! |--------|--------------|
//! | [`vci`] | quote, company, financial, listing, trading |
//! | [`tcbs`] | quote, company, financial, trading |
//! | [`msn`] | quote, listing |
//! | [`kbs`] | quote |
//! | [`fmarket`] | fund |

pub mod fmarket;
pub mod kbs;
pub mod msn;
pub mod tcbs;
pub mod vci;

use std::collections::BTreeMap;
use std::sync::Arc;

use scraper::Html;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::http_client::{HttpClient, HttpRequest};
use crate::headers::source_headers;
use crate::registry::{ProviderContext, ProviderRegistry};
use crate::request::ProviderConfig;
use crate::table::TableAttrs;
use crate::{AssetType, Interval, Source, SourceError, Symbol};

/// Register every bundled provider.
pub fn register_builtin(registry: &mut ProviderRegistry) {
    vci::register(registry);
    tcbs::register(registry);
    msn::register(registry);
    kbs::register(registry);
    fmarket::register(registry);
}

/// Per-instance transport state shared by every bundled provider.
pub(crate) struct Session {
    pub source: Source,
    pub symbol: Option<Symbol>,
    http: Arc<dyn HttpClient>,
    headers: BTreeMap<String, String>,
    timeout_ms: u64,
    show_log: bool,
}

impl Session {
    pub fn new(source: Source, config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        Ok(Self {
            source,
            symbol: config.symbol.clone(),
            http: context.transport(config.proxy.as_ref())?,
            headers: source_headers(source, config.random_agent()),
            timeout_ms: context.timeout_ms,
            show_log: config.show_log(),
        })
    }

    /// Bound symbol, required by symbol-scoped operations.
    pub fn symbol(&self) -> Result<&Symbol, SourceError> {
        self.symbol.as_ref().ok_or_else(|| {
            SourceError::invalid_request(format!("source '{}' needs a symbol for this call", self.source))
        })
    }

    pub fn get(&self, url: impl Into<String>) -> HttpRequest {
        HttpRequest::get(url)
            .with_headers(&self.headers)
            .with_timeout_ms(self.timeout_ms)
    }

    pub fn post_json(&self, url: impl Into<String>, body: &Value) -> HttpRequest {
        HttpRequest::post(url)
            .with_headers(&self.headers)
            .with_timeout_ms(self.timeout_ms)
            .with_json(body)
    }

    /// Execute and decode a JSON body. Non-2xx statuses are classified by
    /// [`SourceError::from_status`]; undecodable bodies are internal errors.
    pub async fn fetch(&self, request: HttpRequest, operation: &str) -> Result<Value, SourceError> {
        let context = format!("{}.{operation}", self.source);
        if self.show_log {
            info!(operation = %context, method = request.method.as_str(), url = %request.url, "request");
        } else {
            debug!(operation = %context, method = request.method.as_str(), url = %request.url, "request");
        }

        let response = self.http.execute(request).await?;
        debug!(operation = %context, status = response.status, bytes = response.body.len(), "response");
        if !response.is_success() {
            return Err(SourceError::from_status(response.status, &context));
        }

        serde_json::from_str(&response.body)
            .map_err(|error| SourceError::internal(format!("{context} returned invalid JSON: {error}")))
    }

    pub fn attrs(&self, interval: Option<Interval>, category: Option<AssetType>) -> TableAttrs {
        TableAttrs {
            symbol: self.symbol.as_ref().map(|symbol| symbol.as_str().to_owned()),
            source: Some(self.source.as_str().to_owned()),
            interval,
            category,
        }
    }
}

/// Keep only `keys` from `map`, in `keys` order.
pub(crate) fn pick(map: &Map<String, Value>, keys: impl IntoIterator<Item = &'static str>) -> Map<String, Value> {
    keys.into_iter()
        .filter_map(|key| map.get(key).map(|value| (key.to_owned(), value.clone())))
        .collect()
}

/// Descend into nested objects by key; `None` when a step is missing or null.
pub(crate) fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .try_fold(value, |current, key| current.get(key))
        .filter(|found| !found.is_null())
}

/// Classify the bound symbol, if any.
pub(crate) fn classify(symbol: Option<&Symbol>) -> Result<Option<AssetType>, SourceError> {
    symbol.map(AssetType::classify).transpose().map_err(SourceError::from)
}

/// Reduce an HTML string value to its text, decoding entities and folding
/// whitespace runs into single spaces. Non-string values pass through.
pub(crate) fn strip_markup(value: &Value) -> Value {
    let Value::String(text) = value else {
        return value.clone();
    };
    let fragment = Html::parse_fragment(text);
    let plain: String = fragment.root_element().text().collect();
    Value::String(plain.split_whitespace().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport for provider unit tests.

    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};

    #[derive(Default)]
    pub struct Scripted {
        responses: Mutex<VecDeque<HttpResponse>>,
        pub requests: Mutex<Vec<HttpRequest>>,
    }

    impl Scripted {
        pub fn new(bodies: impl IntoIterator<Item = serde_json::Value>) -> Self {
            Self {
                responses: Mutex::new(
                    bodies
                        .into_iter()
                        .map(|body| HttpResponse::ok_json(body.to_string()))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn recorded(&self) -> Vec<HttpRequest> {
            self.requests.lock().expect("lock").clone()
        }
    }

    impl HttpClient for Scripted {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            Box::pin(async move {
                self.requests.lock().expect("lock").push(request);
                self.responses
                    .lock()
                    .expect("lock")
                    .pop_front()
                    .ok_or_else(|| HttpError::non_retryable("script exhausted"))
            })
        }
    }
}
