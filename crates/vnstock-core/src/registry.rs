//! Provider registry keyed by `(capability, source)`.
//!
//! The registry is a plain value owned by the composition root (usually a
//! [`Context`](crate::Context)). Registration happens before it is shared
//! behind an `Arc`; lookups never mutate it.
//!
//! ```rust,ignore
//! use vnstock_core::{Capability, ProviderRegistry};
//!
//! let registry = ProviderRegistry::with_builtin_providers();
//! assert_eq!(registry.list_available(Capability::Quote), vec!["kbs", "msn", "tcbs", "vci"]);
//! ```

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::http_client::{HttpClient, ProxyConfig, ReqwestHttpClient, DEFAULT_TIMEOUT_MS};
use crate::provider::{Capability, MethodSet, Provider, SourceError};
use crate::providers;
use crate::request::{ParamSet, ProviderConfig};

/// Builds a provider instance from a filtered constructor configuration.
pub type ProviderFactory =
    Arc<dyn Fn(ProviderConfig, ProviderContext) -> Result<Arc<dyn Provider>, SourceError> + Send + Sync>;

/// Shared resources handed to every provider factory.
#[derive(Clone)]
pub struct ProviderContext {
    pub http: Arc<dyn HttpClient>,
    pub timeout_ms: u64,
}

impl ProviderContext {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Transport for one provider instance: the shared client, or a dedicated
    /// proxied client when a non-empty proxy list is configured.
    pub fn transport(&self, proxy: Option<&ProxyConfig>) -> Result<Arc<dyn HttpClient>, SourceError> {
        match proxy {
            Some(config) if !config.is_empty() => {
                let client = ReqwestHttpClient::with_proxies(config)
                    .map_err(|error| SourceError::invalid_request(error.message().to_owned()))?;
                Ok(Arc::new(client))
            }
            _ => Ok(Arc::clone(&self.http)),
        }
    }
}

impl Debug for ProviderContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

/// Registry entry: what a source declares for one capability, plus its factory.
#[derive(Clone)]
pub struct ProviderDescriptor {
    pub capability: Capability,
    pub source: String,
    pub methods: MethodSet,
    pub init_params: ParamSet,
    factory: ProviderFactory,
}

impl ProviderDescriptor {
    pub fn new<F>(
        capability: Capability,
        source: &str,
        methods: MethodSet,
        init_params: ParamSet,
        factory: F,
    ) -> Self
    where
        F: Fn(ProviderConfig, ProviderContext) -> Result<Arc<dyn Provider>, SourceError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            capability,
            source: source.trim().to_ascii_lowercase(),
            methods,
            init_params,
            factory: Arc::new(factory),
        }
    }

    pub fn build(&self, config: ProviderConfig, context: ProviderContext) -> Result<Arc<dyn Provider>, SourceError> {
        (self.factory)(config, context)
    }
}

impl Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("capability", &self.capability)
            .field("source", &self.source)
            .field("methods", &self.methods.names())
            .finish_non_exhaustive()
    }
}

/// Directory of provider descriptors.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    entries: HashMap<(Capability, String), ProviderDescriptor>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with every bundled provider.
    pub fn with_builtin_providers() -> Self {
        let mut registry = Self::new();
        providers::register_builtin(&mut registry);
        registry
    }

    /// Insert or overwrite. Returns the descriptor that was replaced, if any.
    pub fn register(&mut self, descriptor: ProviderDescriptor) -> Option<ProviderDescriptor> {
        let key = (descriptor.capability, descriptor.source.clone());
        let previous = self.entries.insert(key, descriptor);
        if let Some(previous) = &previous {
            warn!(
                capability = previous.capability.as_str(),
                source = %previous.source,
                "provider registration overwritten"
            );
        } else {
            debug!("provider registered");
        }
        previous
    }

    /// Case-insensitive lookup. Unknown sources fail closed with the registered alternatives.
    pub fn get(&self, capability: Capability, source: &str) -> Result<&ProviderDescriptor, SourceError> {
        let normalized = source.trim().to_ascii_lowercase();
        if let Some(descriptor) = self.entries.get(&(capability, normalized.clone())) {
            return Ok(descriptor);
        }

        let available = self.list_available(capability);
        let elsewhere = self.entries.keys().any(|(_, registered)| *registered == normalized);
        if elsewhere {
            Err(SourceError::missing_capability(capability, &normalized, &available))
        } else {
            Err(SourceError::unknown_source(capability, &normalized, &available))
        }
    }

    pub fn is_registered(&self, capability: Capability, source: &str) -> bool {
        self.entries
            .contains_key(&(capability, source.trim().to_ascii_lowercase()))
    }

    /// Sorted source names registered for `capability`.
    pub fn list_available(&self, capability: Capability) -> Vec<String> {
        let mut sources: Vec<String> = self
            .entries
            .keys()
            .filter(|(registered, _)| *registered == capability)
            .map(|(_, source)| source.clone())
            .collect();
        sources.sort();
        sources
    }

    /// Every `(capability, source)` pair, sorted.
    pub fn list_all(&self) -> Vec<(Capability, String)> {
        let mut keys: Vec<(Capability, String)> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Method, SourceErrorKind};
    use crate::request::Param;
    use crate::Symbol;

    struct Stub {
        source: String,
        symbol: Option<Symbol>,
    }

    impl Provider for Stub {
        fn source(&self) -> &str {
            &self.source
        }

        fn symbol(&self) -> Option<&Symbol> {
            self.symbol.as_ref()
        }

        fn accepted_params(&self, _method: Method) -> ParamSet {
            ParamSet::empty()
        }
    }

    fn stub(capability: Capability, source: &'static str) -> ProviderDescriptor {
        ProviderDescriptor::new(
            capability,
            source,
            MethodSet::of(&[Method::History]),
            ParamSet::of(&[Param::Symbol]),
            move |config, _context| {
                Ok(Arc::new(Stub {
                    source: source.to_ascii_lowercase(),
                    symbol: config.symbol,
                }) as Arc<dyn Provider>)
            },
        )
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut registry = ProviderRegistry::new();
        registry.register(stub(Capability::Quote, "VCI"));

        let descriptor = registry.get(Capability::Quote, " Vci ").expect("registered");
        assert_eq!(descriptor.source, "vci");
        assert!(registry.is_registered(Capability::Quote, "VCI"));
    }

    #[test]
    fn unknown_source_lists_sorted_alternatives() {
        let mut registry = ProviderRegistry::new();
        registry.register(stub(Capability::Quote, "tcbs"));
        registry.register(stub(Capability::Quote, "vci"));

        let err = registry.get(Capability::Quote, "ssi").expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::UnknownSource);
        assert!(err.message().contains("[tcbs, vci]"), "{}", err.message());
    }

    #[test]
    fn source_registered_elsewhere_names_missing_capability() {
        let mut registry = ProviderRegistry::new();
        registry.register(stub(Capability::Quote, "msn"));
        registry.register(stub(Capability::Company, "vci"));

        let err = registry.get(Capability::Company, "msn").expect_err("must fail");
        assert!(err.message().contains("does not provide capability 'company'"));
    }

    #[test]
    fn re_registration_overwrites() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.register(stub(Capability::Quote, "vci")).is_none());
        assert!(registry.register(stub(Capability::Quote, "vci")).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn list_all_is_sorted_and_clear_empties() {
        let mut registry = ProviderRegistry::new();
        registry.register(stub(Capability::Trading, "vci"));
        registry.register(stub(Capability::Quote, "tcbs"));
        registry.register(stub(Capability::Quote, "kbs"));

        assert_eq!(
            registry.list_all(),
            vec![
                (Capability::Quote, String::from("kbs")),
                (Capability::Quote, String::from("tcbs")),
                (Capability::Trading, String::from("vci")),
            ]
        );
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn builtin_registry_covers_every_bundled_pair() {
        let registry = ProviderRegistry::with_builtin_providers();

        assert_eq!(registry.list_available(Capability::Quote), vec!["kbs", "msn", "tcbs", "vci"]);
        assert_eq!(registry.list_available(Capability::Company), vec!["tcbs", "vci"]);
        assert_eq!(registry.list_available(Capability::Financial), vec!["tcbs", "vci"]);
        assert_eq!(registry.list_available(Capability::Listing), vec!["msn", "vci"]);
        assert_eq!(registry.list_available(Capability::Trading), vec!["tcbs", "vci"]);
        assert_eq!(registry.list_available(Capability::Fund), vec!["fmarket"]);
    }
}
