//! Dynamic adapter: one live provider resolved from the registry by name.
//!
//! Every call goes through the same path:
//!
//! 1. the method must be declared by the provider's descriptor, checked
//!    before any I/O;
//! 2. call options the provider does not accept for that method are cleared
//!    and logged;
//! 3. the provider call runs under the context's [`RetryPolicy`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::context::Context;
use crate::provider::{Capability, Method, Provider, SourceError, SourceFuture};
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{
    CompanyRequest, FilteredRequest, FundRequest, HistoryRequest, IntradayRequest, ListingRequest, Param,
    PriceBoardRequest, ProviderConfig, ReportRequest, SearchRequest,
};
use crate::retry::{retry, RetryPolicy};
use crate::{Symbol, Table};

/// One provider operation with its options.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    History(HistoryRequest),
    Intraday(IntradayRequest),
    PriceDepth,
    Overview,
    Shareholders(CompanyRequest),
    Officers(CompanyRequest),
    Subsidiaries(CompanyRequest),
    Affiliate(CompanyRequest),
    Events(CompanyRequest),
    News(CompanyRequest),
    BalanceSheet(ReportRequest),
    IncomeStatement(ReportRequest),
    CashFlow(ReportRequest),
    Ratio(ReportRequest),
    AllSymbols,
    SymbolsByExchange(ListingRequest),
    SymbolsByIndustries(ListingRequest),
    SymbolsByGroup(ListingRequest),
    IndustriesIcb,
    SearchSymbolId(SearchRequest),
    PriceBoard(PriceBoardRequest),
    FundListing(FundRequest),
    FundFilter(FundRequest),
    TopHolding(FundRequest),
    IndustryHolding(FundRequest),
    NavReport(FundRequest),
    AssetHolding(FundRequest),
}

impl Call {
    pub const fn method(&self) -> Method {
        match self {
            Self::History(_) => Method::History,
            Self::Intraday(_) => Method::Intraday,
            Self::PriceDepth => Method::PriceDepth,
            Self::Overview => Method::Overview,
            Self::Shareholders(_) => Method::Shareholders,
            Self::Officers(_) => Method::Officers,
            Self::Subsidiaries(_) => Method::Subsidiaries,
            Self::Affiliate(_) => Method::Affiliate,
            Self::Events(_) => Method::Events,
            Self::News(_) => Method::News,
            Self::BalanceSheet(_) => Method::BalanceSheet,
            Self::IncomeStatement(_) => Method::IncomeStatement,
            Self::CashFlow(_) => Method::CashFlow,
            Self::Ratio(_) => Method::Ratio,
            Self::AllSymbols => Method::AllSymbols,
            Self::SymbolsByExchange(_) => Method::SymbolsByExchange,
            Self::SymbolsByIndustries(_) => Method::SymbolsByIndustries,
            Self::SymbolsByGroup(_) => Method::SymbolsByGroup,
            Self::IndustriesIcb => Method::IndustriesIcb,
            Self::SearchSymbolId(_) => Method::SearchSymbolId,
            Self::PriceBoard(_) => Method::PriceBoard,
            Self::FundListing(_) => Method::FundListing,
            Self::FundFilter(_) => Method::FundFilter,
            Self::TopHolding(_) => Method::TopHolding,
            Self::IndustryHolding(_) => Method::IndustryHolding,
            Self::NavReport(_) => Method::NavReport,
            Self::AssetHolding(_) => Method::AssetHolding,
        }
    }

    fn options_mut(&mut self) -> Option<&mut dyn FilteredRequest> {
        match self {
            Self::History(req) => Some(req),
            Self::Intraday(req) => Some(req),
            Self::Shareholders(req)
            | Self::Officers(req)
            | Self::Subsidiaries(req)
            | Self::Affiliate(req)
            | Self::Events(req)
            | Self::News(req) => Some(req),
            Self::BalanceSheet(req)
            | Self::IncomeStatement(req)
            | Self::CashFlow(req)
            | Self::Ratio(req) => Some(req),
            Self::SymbolsByExchange(req) | Self::SymbolsByIndustries(req) | Self::SymbolsByGroup(req) => {
                Some(req)
            }
            Self::SearchSymbolId(req) => Some(req),
            Self::PriceBoard(req) => Some(req),
            Self::FundListing(req)
            | Self::FundFilter(req)
            | Self::TopHolding(req)
            | Self::IndustryHolding(req)
            | Self::NavReport(req)
            | Self::AssetHolding(req) => Some(req),
            Self::PriceDepth | Self::Overview | Self::AllSymbols | Self::IndustriesIcb => None,
        }
    }

    fn invoke(self, provider: &dyn Provider) -> SourceFuture<'_, Table> {
        match self {
            Self::History(req) => provider.history(req),
            Self::Intraday(req) => provider.intraday(req),
            Self::PriceDepth => provider.price_depth(),
            Self::Overview => provider.overview(),
            Self::Shareholders(req) => provider.shareholders(req),
            Self::Officers(req) => provider.officers(req),
            Self::Subsidiaries(req) => provider.subsidiaries(req),
            Self::Affiliate(req) => provider.affiliate(req),
            Self::Events(req) => provider.events(req),
            Self::News(req) => provider.news(req),
            Self::BalanceSheet(req) => provider.balance_sheet(req),
            Self::IncomeStatement(req) => provider.income_statement(req),
            Self::CashFlow(req) => provider.cash_flow(req),
            Self::Ratio(req) => provider.ratio(req),
            Self::AllSymbols => provider.all_symbols(),
            Self::SymbolsByExchange(req) => provider.symbols_by_exchange(req),
            Self::SymbolsByIndustries(req) => provider.symbols_by_industries(req),
            Self::SymbolsByGroup(req) => provider.symbols_by_group(req),
            Self::IndustriesIcb => provider.industries_icb(),
            Self::SearchSymbolId(req) => provider.search_symbol_id(req),
            Self::PriceBoard(req) => provider.price_board(req),
            Self::FundListing(req) => provider.fund_listing(req),
            Self::FundFilter(req) => provider.fund_filter(req),
            Self::TopHolding(req) => provider.top_holding(req),
            Self::IndustryHolding(req) => provider.industry_holding(req),
            Self::NavReport(req) => provider.nav_report(req),
            Self::AssetHolding(req) => provider.asset_holding(req),
        }
    }
}

/// Wraps exactly one provider instance for one `(capability, source)` pair.
pub struct Adapter {
    descriptor: ProviderDescriptor,
    config: ProviderConfig,
    provider: Arc<dyn Provider>,
    providers: ProviderContext,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("capability", &self.descriptor.capability)
            .field("source", &self.descriptor.source)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Adapter {
    /// Resolve `source` for `capability` and build the provider from the
    /// fields of `config` it declares.
    pub fn new(
        context: &Context,
        capability: Capability,
        source: &str,
        mut config: ProviderConfig,
    ) -> Result<Self, SourceError> {
        let descriptor = context.registry().get(capability, source)?.clone();

        if config.random_agent.is_none() && context.random_agent() {
            config.random_agent = Some(true);
        }
        let dropped = config.retain_accepted(descriptor.init_params);
        log_dropped(&descriptor.source, "constructor", &dropped);

        let providers = context.provider_context().clone();
        let provider = descriptor.build(config.clone(), providers.clone())?;
        debug!(
            capability = capability.as_str(),
            source = %descriptor.source,
            symbol = config.symbol.as_ref().map(Symbol::as_str),
            "provider constructed"
        );

        Ok(Self {
            descriptor,
            config,
            provider,
            providers,
            retry: context.retry_policy().clone(),
        })
    }

    pub fn source(&self) -> &str {
        &self.descriptor.source
    }

    pub fn capability(&self) -> Capability {
        self.descriptor.capability
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    /// Constructor configuration after filtering.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn symbol(&self) -> Option<&Symbol> {
        self.config.symbol.as_ref()
    }

    pub fn supports(&self, method: Method) -> bool {
        method.capability() == self.descriptor.capability && self.descriptor.methods.contains(method)
    }

    /// Re-point the adapter at `symbol`, rebuilding the provider.
    pub fn set_symbol(&mut self, symbol: Symbol) -> Result<(), SourceError> {
        if !self.descriptor.init_params.contains(Param::Symbol) {
            return Err(SourceError::invalid_request(format!(
                "source '{}' does not take a symbol for {}",
                self.descriptor.source, self.descriptor.capability
            )));
        }
        let mut config = self.config.clone();
        config.symbol = Some(symbol);
        let provider = self.descriptor.build(config.clone(), self.providers.clone())?;
        self.config = config;
        self.provider = provider;
        Ok(())
    }

    /// Run one operation: capability check, option filtering, retry.
    pub async fn call(&self, mut call: Call) -> Result<Table, SourceError> {
        let method = call.method();
        if !self.supports(method) {
            return Err(SourceError::unsupported_method(&self.descriptor.source, method));
        }

        if let Some(options) = call.options_mut() {
            let dropped = options.retain_accepted(self.provider.accepted_params(method));
            log_dropped(&self.descriptor.source, method.as_str(), &dropped);
        }

        let operation = format!("{}.{}", self.descriptor.source, method);
        if self.config.show_log() {
            info!(operation = %operation, symbol = self.symbol().map(Symbol::as_str), "fetching");
        } else {
            debug!(operation = %operation, symbol = self.symbol().map(Symbol::as_str), "fetching");
        }

        let provider = self.provider.as_ref();
        let table = retry(&self.retry, &operation, || call.clone().invoke(provider)).await?;

        if self.config.show_log() {
            info!(operation = %operation, rows = table.len(), "fetched");
        } else {
            debug!(operation = %operation, rows = table.len(), "fetched");
        }
        Ok(table)
    }

    /// Run `call` against `symbol`, then restore the bound symbol.
    ///
    /// The previous provider instance is restored even if the call fails or
    /// the future is dropped.
    pub async fn call_for(&mut self, symbol: Symbol, call: Call) -> Result<Table, SourceError> {
        if self.symbol() == Some(&symbol) {
            return self.call(call).await;
        }
        let guard = SymbolOverride::enter(self, symbol)?;
        let result = guard.adapter.call(call).await;
        drop(guard);
        result
    }

    pub async fn history(&self, request: HistoryRequest) -> Result<Table, SourceError> {
        self.call(Call::History(request)).await
    }

    pub async fn history_for(&mut self, symbol: Symbol, request: HistoryRequest) -> Result<Table, SourceError> {
        self.call_for(symbol, Call::History(request)).await
    }

    pub async fn intraday(&self, request: IntradayRequest) -> Result<Table, SourceError> {
        self.call(Call::Intraday(request)).await
    }

    pub async fn intraday_for(&mut self, symbol: Symbol, request: IntradayRequest) -> Result<Table, SourceError> {
        self.call_for(symbol, Call::Intraday(request)).await
    }

    pub async fn price_depth(&self) -> Result<Table, SourceError> {
        self.call(Call::PriceDepth).await
    }

    pub async fn price_depth_for(&mut self, symbol: Symbol) -> Result<Table, SourceError> {
        self.call_for(symbol, Call::PriceDepth).await
    }

    pub async fn overview(&self) -> Result<Table, SourceError> {
        self.call(Call::Overview).await
    }

    pub async fn shareholders(&self, request: CompanyRequest) -> Result<Table, SourceError> {
        self.call(Call::Shareholders(request)).await
    }

    pub async fn officers(&self, request: CompanyRequest) -> Result<Table, SourceError> {
        self.call(Call::Officers(request)).await
    }

    pub async fn subsidiaries(&self, request: CompanyRequest) -> Result<Table, SourceError> {
        self.call(Call::Subsidiaries(request)).await
    }

    pub async fn affiliate(&self, request: CompanyRequest) -> Result<Table, SourceError> {
        self.call(Call::Affiliate(request)).await
    }

    pub async fn events(&self, request: CompanyRequest) -> Result<Table, SourceError> {
        self.call(Call::Events(request)).await
    }

    pub async fn news(&self, request: CompanyRequest) -> Result<Table, SourceError> {
        self.call(Call::News(request)).await
    }

    pub async fn balance_sheet(&self, request: ReportRequest) -> Result<Table, SourceError> {
        self.call(Call::BalanceSheet(request)).await
    }

    pub async fn income_statement(&self, request: ReportRequest) -> Result<Table, SourceError> {
        self.call(Call::IncomeStatement(request)).await
    }

    pub async fn cash_flow(&self, request: ReportRequest) -> Result<Table, SourceError> {
        self.call(Call::CashFlow(request)).await
    }

    pub async fn ratio(&self, request: ReportRequest) -> Result<Table, SourceError> {
        self.call(Call::Ratio(request)).await
    }

    pub async fn all_symbols(&self) -> Result<Table, SourceError> {
        self.call(Call::AllSymbols).await
    }

    pub async fn symbols_by_exchange(&self, request: ListingRequest) -> Result<Table, SourceError> {
        self.call(Call::SymbolsByExchange(request)).await
    }

    pub async fn symbols_by_industries(&self, request: ListingRequest) -> Result<Table, SourceError> {
        self.call(Call::SymbolsByIndustries(request)).await
    }

    pub async fn symbols_by_group(&self, request: ListingRequest) -> Result<Table, SourceError> {
        self.call(Call::SymbolsByGroup(request)).await
    }

    pub async fn industries_icb(&self) -> Result<Table, SourceError> {
        self.call(Call::IndustriesIcb).await
    }

    pub async fn search_symbol_id(&self, request: SearchRequest) -> Result<Table, SourceError> {
        self.call(Call::SearchSymbolId(request)).await
    }

    pub async fn price_board(&self, request: PriceBoardRequest) -> Result<Table, SourceError> {
        self.call(Call::PriceBoard(request)).await
    }

    pub async fn fund_listing(&self, request: FundRequest) -> Result<Table, SourceError> {
        self.call(Call::FundListing(request)).await
    }

    pub async fn fund_filter(&self, request: FundRequest) -> Result<Table, SourceError> {
        self.call(Call::FundFilter(request)).await
    }

    pub async fn top_holding(&self, request: FundRequest) -> Result<Table, SourceError> {
        self.call(Call::TopHolding(request)).await
    }

    pub async fn industry_holding(&self, request: FundRequest) -> Result<Table, SourceError> {
        self.call(Call::IndustryHolding(request)).await
    }

    pub async fn nav_report(&self, request: FundRequest) -> Result<Table, SourceError> {
        self.call(Call::NavReport(request)).await
    }

    pub async fn asset_holding(&self, request: FundRequest) -> Result<Table, SourceError> {
        self.call(Call::AssetHolding(request)).await
    }
}

/// Temporarily re-points an adapter; `Drop` puts the previous instance back.
struct SymbolOverride<'a> {
    adapter: &'a mut Adapter,
    previous_symbol: Option<Symbol>,
    previous_provider: Arc<dyn Provider>,
}

impl<'a> SymbolOverride<'a> {
    fn enter(adapter: &'a mut Adapter, symbol: Symbol) -> Result<Self, SourceError> {
        let previous_symbol = adapter.config.symbol.clone();
        let previous_provider = Arc::clone(&adapter.provider);
        adapter.set_symbol(symbol)?;
        Ok(Self {
            adapter,
            previous_symbol,
            previous_provider,
        })
    }
}

impl Drop for SymbolOverride<'_> {
    fn drop(&mut self) {
        self.adapter.config.symbol = self.previous_symbol.take();
        self.adapter.provider = Arc::clone(&self.previous_provider);
    }
}

fn log_dropped(source: &str, scope: &str, dropped: &[Param]) {
    for param in dropped {
        debug!(source, scope, param = param.as_str(), "option not accepted by provider, dropped");
    }
}
