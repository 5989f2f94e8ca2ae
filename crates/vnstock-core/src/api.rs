//! Public facades over the adapter, one per capability, plus [`Vnstock`].
//!
//! Each facade accepts only the sources that publish its capability; any
//! other name fails with an invalid-request error listing the valid ones.

use crate::adapter::Adapter;
use crate::context::Context;
use crate::provider::Capability;
use crate::request::{
    CompanyRequest, FundRequest, HistoryRequest, IntradayRequest, ListingRequest, PriceBoardRequest,
    ProviderConfig, ReportRequest, SearchRequest,
};
use crate::{FundType, ReportPeriod, Source, SourceError, Symbol, Table};

pub const QUOTE_SOURCES: &[Source] = &[Source::Vci, Source::Tcbs, Source::Msn, Source::Kbs];
pub const COMPANY_SOURCES: &[Source] = &[Source::Vci, Source::Tcbs];
pub const FINANCE_SOURCES: &[Source] = &[Source::Vci, Source::Tcbs];
pub const LISTING_SOURCES: &[Source] = &[Source::Vci, Source::Msn];
pub const TRADING_SOURCES: &[Source] = &[Source::Vci, Source::Tcbs];
pub const FUND_SOURCES: &[Source] = &[Source::Fmarket];

fn build(
    context: &Context,
    capability: Capability,
    allowed: &[Source],
    source: &str,
    config: ProviderConfig,
) -> Result<Adapter, SourceError> {
    let source = Source::parse_allowed(source, allowed)?;
    Adapter::new(context, capability, source.as_str(), config)
}

fn parse_symbol(symbol: &str) -> Result<Symbol, SourceError> {
    Ok(Symbol::parse(symbol)?)
}

/// Price history, tick data and price depth.
#[derive(Debug)]
pub struct Quote {
    adapter: Adapter,
}

impl Quote {
    pub fn new(context: &Context, source: &str, symbol: &str) -> Result<Self, SourceError> {
        let config = ProviderConfig::new().with_symbol(parse_symbol(symbol)?);
        Self::with_config(context, source, config)
    }

    pub fn with_config(context: &Context, source: &str, config: ProviderConfig) -> Result<Self, SourceError> {
        Ok(Self {
            adapter: build(context, Capability::Quote, QUOTE_SOURCES, source, config)?,
        })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub fn symbol(&self) -> Option<&Symbol> {
        self.adapter.symbol()
    }

    /// Re-point at another symbol for all later calls.
    pub fn set_symbol(&mut self, symbol: &str) -> Result<(), SourceError> {
        self.adapter.set_symbol(parse_symbol(symbol)?)
    }

    pub async fn history(&self, request: HistoryRequest) -> Result<Table, SourceError> {
        self.adapter.history(request).await
    }

    /// History for `symbol` without changing the bound symbol.
    pub async fn history_for(&mut self, symbol: &str, request: HistoryRequest) -> Result<Table, SourceError> {
        let symbol = parse_symbol(symbol)?;
        self.adapter.history_for(symbol, request).await
    }

    pub async fn intraday(&self, request: IntradayRequest) -> Result<Table, SourceError> {
        self.adapter.intraday(request).await
    }

    pub async fn intraday_for(&mut self, symbol: &str, request: IntradayRequest) -> Result<Table, SourceError> {
        let symbol = parse_symbol(symbol)?;
        self.adapter.intraday_for(symbol, request).await
    }

    pub async fn price_depth(&self) -> Result<Table, SourceError> {
        self.adapter.price_depth().await
    }

    pub async fn price_depth_for(&mut self, symbol: &str) -> Result<Table, SourceError> {
        let symbol = parse_symbol(symbol)?;
        self.adapter.price_depth_for(symbol).await
    }
}

/// Company profile sections.
#[derive(Debug)]
pub struct Company {
    adapter: Adapter,
}

impl Company {
    pub fn new(context: &Context, source: &str, symbol: &str) -> Result<Self, SourceError> {
        let config = ProviderConfig::new().with_symbol(parse_symbol(symbol)?);
        Self::with_config(context, source, config)
    }

    pub fn with_config(context: &Context, source: &str, config: ProviderConfig) -> Result<Self, SourceError> {
        Ok(Self {
            adapter: build(context, Capability::Company, COMPANY_SOURCES, source, config)?,
        })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub async fn overview(&self) -> Result<Table, SourceError> {
        self.adapter.overview().await
    }

    pub async fn shareholders(&self, request: CompanyRequest) -> Result<Table, SourceError> {
        self.adapter.shareholders(request).await
    }

    pub async fn officers(&self, request: CompanyRequest) -> Result<Table, SourceError> {
        self.adapter.officers(request).await
    }

    pub async fn subsidiaries(&self, request: CompanyRequest) -> Result<Table, SourceError> {
        self.adapter.subsidiaries(request).await
    }

    pub async fn events(&self, request: CompanyRequest) -> Result<Table, SourceError> {
        self.adapter.events(request).await
    }

    pub async fn news(&self, request: CompanyRequest) -> Result<Table, SourceError> {
        self.adapter.news(request).await
    }

    pub async fn affiliate(&self, request: CompanyRequest) -> Result<Table, SourceError> {
        self.adapter.affiliate(request).await
    }
}

/// Financial statements and ratios.
#[derive(Debug)]
pub struct Finance {
    adapter: Adapter,
}

impl Finance {
    pub fn new(context: &Context, source: &str, symbol: &str, period: ReportPeriod) -> Result<Self, SourceError> {
        let config = ProviderConfig::new()
            .with_symbol(parse_symbol(symbol)?)
            .with_period(period);
        Self::with_config(context, source, config)
    }

    pub fn with_config(context: &Context, source: &str, config: ProviderConfig) -> Result<Self, SourceError> {
        Ok(Self {
            adapter: build(context, Capability::Financial, FINANCE_SOURCES, source, config)?,
        })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub async fn balance_sheet(&self, request: ReportRequest) -> Result<Table, SourceError> {
        self.adapter.balance_sheet(request).await
    }

    pub async fn income_statement(&self, request: ReportRequest) -> Result<Table, SourceError> {
        self.adapter.income_statement(request).await
    }

    pub async fn cash_flow(&self, request: ReportRequest) -> Result<Table, SourceError> {
        self.adapter.cash_flow(request).await
    }

    pub async fn ratio(&self, request: ReportRequest) -> Result<Table, SourceError> {
        self.adapter.ratio(request).await
    }
}

/// Market-wide symbol directories.
#[derive(Debug)]
pub struct Listing {
    adapter: Adapter,
}

impl Listing {
    pub fn new(context: &Context, source: &str) -> Result<Self, SourceError> {
        Self::with_config(context, source, ProviderConfig::new())
    }

    pub fn with_config(context: &Context, source: &str, config: ProviderConfig) -> Result<Self, SourceError> {
        Ok(Self {
            adapter: build(context, Capability::Listing, LISTING_SOURCES, source, config)?,
        })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub async fn all_symbols(&self) -> Result<Table, SourceError> {
        self.adapter.all_symbols().await
    }

    pub async fn symbols_by_exchange(&self, request: ListingRequest) -> Result<Table, SourceError> {
        self.adapter.symbols_by_exchange(request).await
    }

    pub async fn symbols_by_industries(&self, request: ListingRequest) -> Result<Table, SourceError> {
        self.adapter.symbols_by_industries(request).await
    }

    pub async fn symbols_by_group(&self, request: ListingRequest) -> Result<Table, SourceError> {
        self.adapter.symbols_by_group(request).await
    }

    /// ICB industry codes with Vietnamese and English names.
    pub async fn industries_icb(&self) -> Result<Table, SourceError> {
        self.adapter.industries_icb().await
    }

    /// Resolve a ticker to upstream instrument ids.
    pub async fn search_symbol_id(&self, query: &str) -> Result<Table, SourceError> {
        self.adapter.search_symbol_id(SearchRequest::new(query)?).await
    }

    pub async fn search_symbol_id_with(&self, request: SearchRequest) -> Result<Table, SourceError> {
        self.adapter.search_symbol_id(request).await
    }
}

/// Live price boards.
#[derive(Debug)]
pub struct Trading {
    adapter: Adapter,
}

impl Trading {
    pub fn new(context: &Context, source: &str) -> Result<Self, SourceError> {
        Self::with_config(context, source, ProviderConfig::new())
    }

    pub fn with_config(context: &Context, source: &str, config: ProviderConfig) -> Result<Self, SourceError> {
        Ok(Self {
            adapter: build(context, Capability::Trading, TRADING_SOURCES, source, config)?,
        })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub async fn price_board<S: AsRef<str>>(&self, symbols: &[S]) -> Result<Table, SourceError> {
        let request = PriceBoardRequest::parse(symbols)?;
        self.adapter.price_board(request).await
    }
}

/// Open-ended funds: directory, holdings and NAV history.
///
/// Fund-scoped calls take the fund's short name, e.g. `SSISCA`.
#[derive(Debug)]
pub struct Fund {
    adapter: Adapter,
}

impl Fund {
    pub fn new(context: &Context, source: &str) -> Result<Self, SourceError> {
        Self::with_config(context, source, ProviderConfig::new())
    }

    pub fn with_config(context: &Context, source: &str, config: ProviderConfig) -> Result<Self, SourceError> {
        Ok(Self {
            adapter: build(context, Capability::Fund, FUND_SOURCES, source, config)?,
        })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub async fn listing(&self, fund_type: Option<FundType>) -> Result<Table, SourceError> {
        let request = FundRequest {
            fund_type,
            ..FundRequest::default()
        };
        self.adapter.fund_listing(request).await
    }

    /// Funds whose short name matches `search`.
    pub async fn filter(&self, search: &str) -> Result<Table, SourceError> {
        let request = FundRequest {
            fund: Some(search.trim().to_ascii_uppercase()),
            ..FundRequest::default()
        };
        self.adapter.fund_filter(request).await
    }

    pub async fn top_holding(&self, fund: &str) -> Result<Table, SourceError> {
        self.adapter.top_holding(FundRequest::fund(fund)?).await
    }

    pub async fn industry_holding(&self, fund: &str) -> Result<Table, SourceError> {
        self.adapter.industry_holding(FundRequest::fund(fund)?).await
    }

    pub async fn nav_report(&self, fund: &str) -> Result<Table, SourceError> {
        self.adapter.nav_report(FundRequest::fund(fund)?).await
    }

    pub async fn asset_holding(&self, fund: &str) -> Result<Table, SourceError> {
        self.adapter.asset_holding(FundRequest::fund(fund)?).await
    }
}

/// Top-level client: a shared [`Context`] plus per-symbol component access.
#[derive(Debug, Clone)]
pub struct Vnstock {
    context: Context,
}

impl Vnstock {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// Builtin providers over a direct HTTP transport.
    pub fn online() -> Self {
        Self::new(Context::online())
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Components for one symbol on `source`.
    pub fn stock(&self, symbol: &str, source: &str) -> Result<Stock, SourceError> {
        Ok(Stock {
            context: self.context.clone(),
            symbol: parse_symbol(symbol)?,
            source: Source::parse_allowed(source, QUOTE_SOURCES)?,
        })
    }

    pub fn listing(&self, source: &str) -> Result<Listing, SourceError> {
        Listing::new(&self.context, source)
    }

    pub fn trading(&self, source: &str) -> Result<Trading, SourceError> {
        Trading::new(&self.context, source)
    }

    pub fn fund(&self, source: &str) -> Result<Fund, SourceError> {
        Fund::new(&self.context, source)
    }
}

/// One symbol on one preferred source. Components whose capability that
/// source does not publish fall back to VCI.
#[derive(Debug, Clone)]
pub struct Stock {
    context: Context,
    symbol: Symbol,
    source: Source,
}

impl Stock {
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn source(&self) -> Source {
        self.source
    }

    fn source_for(&self, allowed: &[Source]) -> Source {
        if allowed.contains(&self.source) {
            self.source
        } else {
            Source::Vci
        }
    }

    fn config(&self) -> ProviderConfig {
        ProviderConfig::new().with_symbol(self.symbol.clone())
    }

    pub fn quote(&self) -> Result<Quote, SourceError> {
        Quote::with_config(&self.context, self.source.as_str(), self.config())
    }

    pub fn company(&self) -> Result<Company, SourceError> {
        Company::with_config(&self.context, self.source_for(COMPANY_SOURCES).as_str(), self.config())
    }

    pub fn finance(&self, period: ReportPeriod) -> Result<Finance, SourceError> {
        let config = self.config().with_period(period);
        Finance::with_config(&self.context, self.source_for(FINANCE_SOURCES).as_str(), config)
    }

    pub fn listing(&self) -> Result<Listing, SourceError> {
        Listing::new(&self.context, self.source_for(LISTING_SOURCES).as_str())
    }

    pub fn trading(&self) -> Result<Trading, SourceError> {
        Trading::new(&self.context, self.source_for(TRADING_SOURCES).as_str())
    }
}
