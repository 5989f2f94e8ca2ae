//! Composition root shared by adapters and facades.

use std::sync::Arc;

use crate::config::Settings;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::registry::{ProviderContext, ProviderRegistry};
use crate::retry::RetryPolicy;
use crate::ConfigError;

/// Registry, transport, retry policy and defaults used to build adapters.
///
/// Cloning is cheap; the registry and transport are shared.
#[derive(Debug, Clone)]
pub struct Context {
    registry: Arc<ProviderRegistry>,
    providers: ProviderContext,
    retry: RetryPolicy,
    random_agent: bool,
}

impl Context {
    pub fn new(registry: ProviderRegistry, http: Arc<dyn HttpClient>) -> Self {
        Self {
            registry: Arc::new(registry),
            providers: ProviderContext::new(http),
            retry: RetryPolicy::default(),
            random_agent: false,
        }
    }

    /// Builtin providers over a direct reqwest transport and default settings.
    pub fn online() -> Self {
        Self::new(
            ProviderRegistry::with_builtin_providers(),
            Arc::new(ReqwestHttpClient::new()),
        )
    }

    /// Builtin providers with transport, retry and proxies taken from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let http: Arc<dyn HttpClient> = match settings.proxy_config() {
            Some(proxy) => Arc::new(ReqwestHttpClient::with_proxies(&proxy).map_err(|error| {
                ConfigError::InvalidSetting {
                    field: "proxies",
                    reason: error.message().to_owned(),
                }
            })?),
            None => Arc::new(ReqwestHttpClient::new()),
        };

        let mut context = Self::new(ProviderRegistry::with_builtin_providers(), http)
            .with_retry(settings.retry_policy())
            .with_timeout_ms(settings.timeout_ms);
        context.random_agent = settings.random_agent;
        Ok(context)
    }

    /// Same registry and settings over another transport.
    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.providers.http = http;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.providers.timeout_ms = timeout_ms;
        self
    }

    pub fn with_random_agent(mut self, random_agent: bool) -> Self {
        self.random_agent = random_agent;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn provider_context(&self) -> &ProviderContext {
        &self.providers
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Default for providers built without an explicit `random_agent`.
    pub fn random_agent(&self) -> bool {
        self.random_agent
    }
}
