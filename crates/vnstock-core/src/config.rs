//! Runtime settings: transport timeout, retry curve, proxies and log filter.
//!
//! Settings deserialize from any serde source and can be overlaid from
//! `VNSTOCK_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http_client::{ProxyConfig, ProxyMode, DEFAULT_TIMEOUT_MS};
use crate::retry::{Backoff, RetryPolicy};
use crate::ConfigError;

const MAX_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub timeout_ms: u64,
    /// Total attempts per operation, including the first.
    pub retries: u32,
    pub backoff_multiplier_ms: u64,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
    pub random_agent: bool,
    pub proxies: Vec<String>,
    pub proxy_mode: ProxyMode,
    pub log_filter: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: 3,
            backoff_multiplier_ms: 1_000,
            backoff_min_ms: 2_000,
            backoff_max_ms: 10_000,
            random_agent: false,
            proxies: Vec::new(),
            proxy_mode: ProxyMode::default(),
            log_filter: None,
        }
    }
}

impl Settings {
    /// Defaults overlaid with `VNSTOCK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(value) = parse_var(&lookup, "VNSTOCK_TIMEOUT_MS")? {
            settings.timeout_ms = value;
        }
        if let Some(value) = parse_var(&lookup, "VNSTOCK_MAX_RETRIES")? {
            settings.retries = value;
        }
        if let Some(value) = parse_var(&lookup, "VNSTOCK_BACKOFF_MULTIPLIER_MS")? {
            settings.backoff_multiplier_ms = value;
        }
        if let Some(value) = parse_var(&lookup, "VNSTOCK_BACKOFF_MIN_MS")? {
            settings.backoff_min_ms = value;
        }
        if let Some(value) = parse_var(&lookup, "VNSTOCK_BACKOFF_MAX_MS")? {
            settings.backoff_max_ms = value;
        }
        if let Some(raw) = lookup("VNSTOCK_RANDOM_AGENT") {
            settings.random_agent = parse_bool("VNSTOCK_RANDOM_AGENT", &raw)?;
        }
        if let Some(raw) = lookup("VNSTOCK_PROXIES") {
            settings.proxies = raw
                .split(',')
                .map(str::trim)
                .filter(|proxy| !proxy.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(raw) = lookup("VNSTOCK_PROXY_MODE") {
            settings.proxy_mode = ProxyMode::from_str(&raw).map_err(|error| ConfigError::InvalidEnv {
                key: "VNSTOCK_PROXY_MODE",
                value: raw.clone(),
                reason: error.to_string(),
            })?;
        }
        if let Some(raw) = lookup("VNSTOCK_LOG") {
            let filter = raw.trim();
            if !filter.is_empty() {
                settings.log_filter = Some(filter.to_owned());
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 || self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::InvalidSetting {
                field: "timeout_ms",
                reason: format!("must be in 1..={MAX_TIMEOUT_MS}, got {}", self.timeout_ms),
            });
        }
        if self.backoff_min_ms > self.backoff_max_ms {
            return Err(ConfigError::InvalidSetting {
                field: "backoff_min_ms",
                reason: format!(
                    "{} is greater than backoff_max_ms {}",
                    self.backoff_min_ms, self.backoff_max_ms
                ),
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            enabled: self.retries > 1,
            max_attempts: self.retries.max(1),
            backoff: Backoff::Exponential {
                multiplier: Duration::from_millis(self.backoff_multiplier_ms),
                min: Duration::from_millis(self.backoff_min_ms),
                max: Duration::from_millis(self.backoff_max_ms),
                jitter: false,
            },
        }
    }

    /// Proxy configuration, or `None` when no proxies are set.
    pub fn proxy_config(&self) -> Option<ProxyConfig> {
        if self.proxies.is_empty() {
            None
        } else {
            Some(ProxyConfig::new(self.proxies.clone(), self.proxy_mode))
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|error| ConfigError::InvalidEnv {
            key,
            value: raw.clone(),
            reason: error.to_string(),
        })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            key,
            value: raw.to_owned(),
            reason: String::from("expected a boolean"),
        }),
    }
}
