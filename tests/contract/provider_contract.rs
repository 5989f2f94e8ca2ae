use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use vnstock_core::{
    Adapter, Call, Capability, CompanyRequest, Context, FundRequest, HistoryRequest, HttpClient, HttpError,
    HttpRequest, HttpResponse, IntradayRequest, ListingRequest, Method, MethodSet, PriceBoardRequest,
    ProviderConfig, ProviderRegistry, ReportRequest, SearchRequest, SourceErrorKind, Symbol,
};

#[derive(Clone)]
struct ProviderCase {
    capability: Capability,
    source: &'static str,
    methods: &'static [Method],
}

fn provider_cases() -> Vec<ProviderCase> {
    vec![
        ProviderCase {
            capability: Capability::Quote,
            source: "vci",
            methods: &[Method::History, Method::Intraday, Method::PriceDepth],
        },
        ProviderCase {
            capability: Capability::Quote,
            source: "tcbs",
            methods: &[Method::History, Method::Intraday],
        },
        ProviderCase {
            capability: Capability::Quote,
            source: "msn",
            methods: &[Method::History],
        },
        ProviderCase {
            capability: Capability::Quote,
            source: "kbs",
            methods: &[Method::History],
        },
        ProviderCase {
            capability: Capability::Company,
            source: "vci",
            methods: &[
                Method::Overview,
                Method::Shareholders,
                Method::Officers,
                Method::Subsidiaries,
                Method::Events,
                Method::News,
                Method::Affiliate,
            ],
        },
        ProviderCase {
            capability: Capability::Company,
            source: "tcbs",
            methods: &[
                Method::Overview,
                Method::Shareholders,
                Method::Officers,
                Method::Subsidiaries,
                Method::Events,
                Method::News,
            ],
        },
        ProviderCase {
            capability: Capability::Financial,
            source: "vci",
            methods: &[
                Method::BalanceSheet,
                Method::IncomeStatement,
                Method::CashFlow,
                Method::Ratio,
            ],
        },
        ProviderCase {
            capability: Capability::Financial,
            source: "tcbs",
            methods: &[
                Method::BalanceSheet,
                Method::IncomeStatement,
                Method::CashFlow,
                Method::Ratio,
            ],
        },
        ProviderCase {
            capability: Capability::Listing,
            source: "vci",
            methods: &[
                Method::AllSymbols,
                Method::SymbolsByExchange,
                Method::SymbolsByIndustries,
                Method::SymbolsByGroup,
                Method::IndustriesIcb,
            ],
        },
        ProviderCase {
            capability: Capability::Listing,
            source: "msn",
            methods: &[Method::SearchSymbolId],
        },
        ProviderCase {
            capability: Capability::Trading,
            source: "vci",
            methods: &[Method::PriceBoard],
        },
        ProviderCase {
            capability: Capability::Trading,
            source: "tcbs",
            methods: &[Method::PriceBoard],
        },
        ProviderCase {
            capability: Capability::Fund,
            source: "fmarket",
            methods: &[
                Method::FundListing,
                Method::FundFilter,
                Method::TopHolding,
                Method::IndustryHolding,
                Method::NavReport,
                Method::AssetHolding,
            ],
        },
    ]
}

/// Fails every request and counts how many were attempted.
#[derive(Default)]
struct Offline {
    calls: AtomicU32,
}

impl HttpClient for Offline {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(HttpError::non_retryable("offline")) })
    }
}

fn sample_call(method: Method) -> Call {
    match method {
        Method::History => Call::History(HistoryRequest::default()),
        Method::Intraday => Call::Intraday(IntradayRequest::default()),
        Method::PriceDepth => Call::PriceDepth,
        Method::Overview => Call::Overview,
        Method::Shareholders => Call::Shareholders(CompanyRequest::default()),
        Method::Officers => Call::Officers(CompanyRequest::default()),
        Method::Subsidiaries => Call::Subsidiaries(CompanyRequest::default()),
        Method::Events => Call::Events(CompanyRequest::default()),
        Method::News => Call::News(CompanyRequest::default()),
        Method::BalanceSheet => Call::BalanceSheet(ReportRequest::default()),
        Method::IncomeStatement => Call::IncomeStatement(ReportRequest::default()),
        Method::CashFlow => Call::CashFlow(ReportRequest::default()),
        Method::Ratio => Call::Ratio(ReportRequest::default()),
        Method::AllSymbols => Call::AllSymbols,
        Method::SymbolsByExchange => Call::SymbolsByExchange(ListingRequest::default()),
        Method::SymbolsByIndustries => Call::SymbolsByIndustries(ListingRequest::default()),
        Method::SymbolsByGroup => Call::SymbolsByGroup(ListingRequest::default()),
        Method::PriceBoard => Call::PriceBoard(PriceBoardRequest::parse(&["ACB"]).expect("board")),
        Method::Affiliate => Call::Affiliate(CompanyRequest::default()),
        Method::IndustriesIcb => Call::IndustriesIcb,
        Method::SearchSymbolId => Call::SearchSymbolId(SearchRequest::new("ACB").expect("query")),
        Method::FundListing => Call::FundListing(FundRequest::default()),
        Method::FundFilter => Call::FundFilter(FundRequest::default()),
        Method::TopHolding => Call::TopHolding(FundRequest::default()),
        Method::IndustryHolding => Call::IndustryHolding(FundRequest::default()),
        Method::NavReport => Call::NavReport(FundRequest::default()),
        Method::AssetHolding => Call::AssetHolding(FundRequest::default()),
    }
}

fn adapter_for(case: &ProviderCase, http: &Arc<Offline>) -> Adapter {
    let context = Context::new(ProviderRegistry::with_builtin_providers(), Arc::clone(http) as _);
    let config = ProviderConfig::new().with_symbol(Symbol::parse("ACB").expect("symbol"));
    Adapter::new(&context, case.capability, case.source, config).unwrap_or_else(|error| {
        panic!("provider '{}/{}' failed to build: {error}", case.capability, case.source)
    })
}

#[test]
fn registry_contains_exactly_the_builtin_providers() {
    let registry = ProviderRegistry::with_builtin_providers();
    let cases = provider_cases();

    assert_eq!(registry.len(), cases.len());
    for case in &cases {
        assert!(
            registry.is_registered(case.capability, case.source),
            "missing provider '{}/{}'",
            case.capability,
            case.source
        );
    }
    assert_eq!(
        registry.list_available(Capability::Quote),
        vec!["kbs", "msn", "tcbs", "vci"]
    );
}

#[test]
fn descriptors_declare_the_expected_methods() {
    let registry = ProviderRegistry::with_builtin_providers();

    for case in provider_cases() {
        let descriptor = registry
            .get(case.capability, case.source)
            .expect("registered provider");
        assert_eq!(
            descriptor.methods.names(),
            MethodSet::of(case.methods).names(),
            "provider '{}/{}': methods",
            case.capability,
            case.source
        );
        for method in descriptor.methods.iter() {
            assert_eq!(
                method.capability(),
                case.capability,
                "provider '{}/{}' declares foreign method {method}",
                case.capability,
                case.source
            );
        }
    }
}

#[test]
fn providers_build_without_network_traffic() {
    let http = Arc::new(Offline::default());

    for case in provider_cases() {
        let adapter = adapter_for(&case, &http);
        assert_eq!(adapter.source(), case.source);
        assert_eq!(adapter.capability(), case.capability);
    }
    assert_eq!(http.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn undeclared_methods_fail_before_any_request() {
    let http = Arc::new(Offline::default());

    for case in provider_cases() {
        let adapter = adapter_for(&case, &http);
        for method in Method::ALL {
            if case.methods.contains(&method) {
                continue;
            }
            let error = adapter
                .call(sample_call(method))
                .await
                .expect_err("undeclared method must fail");
            assert_eq!(
                error.kind(),
                SourceErrorKind::UnsupportedMethod,
                "provider '{}/{}' method {method}",
                case.capability,
                case.source
            );
        }
    }
    assert_eq!(http.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn transport_failures_surface_as_unavailable() {
    let http = Arc::new(Offline::default());
    let case = ProviderCase {
        capability: Capability::Company,
        source: "vci",
        methods: &[Method::Overview],
    };

    let error = adapter_for(&case, &http)
        .overview()
        .await
        .expect_err("offline transport");
    assert_eq!(error.kind(), SourceErrorKind::Unavailable);
    assert!(!error.retryable());
}
