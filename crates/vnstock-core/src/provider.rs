//! Provider contract, capability tags and the structured source error.
//!
//! # Capabilities
//!
//! | Capability | Methods |
//! |------------|---------|
//! | Quote | history, intraday, price_depth |
//! | Company | overview, shareholders, officers, subsidiaries, affiliate, events, news |
//! | Financial | balance_sheet, income_statement, cash_flow, ratio |
//! | Listing | all_symbols, symbols_by_exchange, symbols_by_industries, symbols_by_group, industries_icb, search_symbol_id |
//! | Trading | price_board |
//! | Fund | fund_listing, fund_filter, top_holding, industry_holding, nav_report, asset_holding |
//!
//! A provider implements the subset it serves; every other trait method
//! resolves to [`SourceErrorKind::UnsupportedMethod`].

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::http_client::HttpError;
use crate::request::{
    CompanyRequest, FundRequest, HistoryRequest, IntradayRequest, ListingRequest, ParamSet, PriceBoardRequest,
    ReportRequest, SearchRequest,
};
use crate::{Symbol, Table, TransformError, ValidationError};

/// Data domain a provider serves, the first half of a registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Quote,
    Company,
    Financial,
    Listing,
    Trading,
    Fund,
}

impl Capability {
    pub const ALL: [Self; 6] = [
        Self::Quote,
        Self::Company,
        Self::Financial,
        Self::Listing,
        Self::Trading,
        Self::Fund,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Company => "company",
            Self::Financial => "financial",
            Self::Listing => "listing",
            Self::Trading => "trading",
            Self::Fund => "fund",
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quote" => Ok(Self::Quote),
            "company" => Ok(Self::Company),
            "financial" | "finance" => Ok(Self::Financial),
            "listing" => Ok(Self::Listing),
            "trading" => Ok(Self::Trading),
            "fund" => Ok(Self::Fund),
            other => Err(ValidationError::InvalidCapability {
                value: other.to_owned(),
            }),
        }
    }
}

/// One provider operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    History,
    Intraday,
    PriceDepth,
    Overview,
    Shareholders,
    Officers,
    Subsidiaries,
    Events,
    News,
    BalanceSheet,
    IncomeStatement,
    CashFlow,
    Ratio,
    AllSymbols,
    SymbolsByExchange,
    SymbolsByIndustries,
    SymbolsByGroup,
    PriceBoard,
    Affiliate,
    IndustriesIcb,
    SearchSymbolId,
    FundListing,
    FundFilter,
    TopHolding,
    IndustryHolding,
    NavReport,
    AssetHolding,
}

impl Method {
    pub const ALL: [Self; 27] = [
        Self::History,
        Self::Intraday,
        Self::PriceDepth,
        Self::Overview,
        Self::Shareholders,
        Self::Officers,
        Self::Subsidiaries,
        Self::Events,
        Self::News,
        Self::BalanceSheet,
        Self::IncomeStatement,
        Self::CashFlow,
        Self::Ratio,
        Self::AllSymbols,
        Self::SymbolsByExchange,
        Self::SymbolsByIndustries,
        Self::SymbolsByGroup,
        Self::PriceBoard,
        Self::Affiliate,
        Self::IndustriesIcb,
        Self::SearchSymbolId,
        Self::FundListing,
        Self::FundFilter,
        Self::TopHolding,
        Self::IndustryHolding,
        Self::NavReport,
        Self::AssetHolding,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::History => "history",
            Self::Intraday => "intraday",
            Self::PriceDepth => "price_depth",
            Self::Overview => "overview",
            Self::Shareholders => "shareholders",
            Self::Officers => "officers",
            Self::Subsidiaries => "subsidiaries",
            Self::Events => "events",
            Self::News => "news",
            Self::BalanceSheet => "balance_sheet",
            Self::IncomeStatement => "income_statement",
            Self::CashFlow => "cash_flow",
            Self::Ratio => "ratio",
            Self::AllSymbols => "all_symbols",
            Self::SymbolsByExchange => "symbols_by_exchange",
            Self::SymbolsByIndustries => "symbols_by_industries",
            Self::SymbolsByGroup => "symbols_by_group",
            Self::PriceBoard => "price_board",
            Self::Affiliate => "affiliate",
            Self::IndustriesIcb => "industries_icb",
            Self::SearchSymbolId => "search_symbol_id",
            Self::FundListing => "fund_listing",
            Self::FundFilter => "fund_filter",
            Self::TopHolding => "top_holding",
            Self::IndustryHolding => "industry_holding",
            Self::NavReport => "nav_report",
            Self::AssetHolding => "asset_holding",
        }
    }

    pub const fn capability(self) -> Capability {
        match self {
            Self::History | Self::Intraday | Self::PriceDepth => Capability::Quote,
            Self::Overview
            | Self::Shareholders
            | Self::Officers
            | Self::Subsidiaries
            | Self::Affiliate
            | Self::Events
            | Self::News => Capability::Company,
            Self::BalanceSheet | Self::IncomeStatement | Self::CashFlow | Self::Ratio => {
                Capability::Financial
            }
            Self::AllSymbols
            | Self::SymbolsByExchange
            | Self::SymbolsByIndustries
            | Self::SymbolsByGroup
            | Self::IndustriesIcb
            | Self::SearchSymbolId => Capability::Listing,
            Self::PriceBoard => Capability::Trading,
            Self::FundListing
            | Self::FundFilter
            | Self::TopHolding
            | Self::IndustryHolding
            | Self::NavReport
            | Self::AssetHolding => Capability::Fund,
        }
    }

    const fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of declared methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MethodSet(u32);

impl MethodSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn of(methods: &[Method]) -> Self {
        let mut bits = 0;
        let mut index = 0;
        while index < methods.len() {
            bits |= methods[index].bit();
            index += 1;
        }
        Self(bits)
    }

    pub const fn with(self, method: Method) -> Self {
        Self(self.0 | method.bit())
    }

    pub const fn contains(self, method: Method) -> bool {
        self.0 & method.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Method> {
        Method::ALL.into_iter().filter(move |method| self.contains(*method))
    }

    pub fn names(self) -> Vec<&'static str> {
        self.iter().map(Method::as_str).collect()
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    InvalidRequest,
    UnknownSource,
    UnsupportedMethod,
    Unavailable,
    RateLimited,
    NoData,
    Internal,
}

/// Structured source error returned by every provider operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    fn new(kind: SourceErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::InvalidRequest, message, false)
    }

    /// No provider is registered under `(capability, source)`.
    pub fn unknown_source(capability: Capability, source: &str, available: &[String]) -> Self {
        Self::new(
            SourceErrorKind::UnknownSource,
            format!(
                "unknown source '{source}' for capability '{capability}'; available sources: [{}]",
                available.join(", ")
            ),
            false,
        )
    }

    /// `source` is registered, but only for other capabilities.
    pub fn missing_capability(capability: Capability, source: &str, available: &[String]) -> Self {
        Self::new(
            SourceErrorKind::UnknownSource,
            format!(
                "source '{source}' does not provide capability '{capability}'; available sources: [{}]",
                available.join(", ")
            ),
            false,
        )
    }

    pub fn unsupported_method(source: &str, method: Method) -> Self {
        Self::new(
            SourceErrorKind::UnsupportedMethod,
            format!("source '{source}' does not support '{method}'"),
            false,
        )
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Unavailable, message, true)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::RateLimited, message, true)
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::NoData, message, false)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Internal, message, false)
    }

    /// Classify a non-2xx HTTP status.
    pub fn from_status(status: u16, context: &str) -> Self {
        let message = format!("{context} returned HTTP {status}");
        match status {
            429 => Self::rate_limited(message),
            408 | 500..=599 => Self::unavailable(message),
            _ => Self::new(SourceErrorKind::Unavailable, message, false),
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::UnknownSource => "source.unknown_source",
            SourceErrorKind::UnsupportedMethod => "source.unsupported_method",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::NoData => "source.no_data",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<ValidationError> for SourceError {
    fn from(value: ValidationError) -> Self {
        Self::invalid_request(value.to_string())
    }
}

impl From<TransformError> for SourceError {
    fn from(value: TransformError) -> Self {
        match value {
            TransformError::Empty => Self::no_data(value.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<HttpError> for SourceError {
    fn from(value: HttpError) -> Self {
        Self::new(
            SourceErrorKind::Unavailable,
            value.message().to_owned(),
            value.retryable(),
        )
    }
}

/// Boxed future returned by provider operations.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

fn unsupported<'a>(source: &str, method: Method) -> SourceFuture<'a, Table> {
    let error = SourceError::unsupported_method(source, method);
    Box::pin(async move { Err(error) })
}

/// Provider contract.
///
/// One instance serves one `(capability, source)` pair and is bound to at
/// most one symbol. Operations it does not implement keep the default
/// body, which fails with [`SourceErrorKind::UnsupportedMethod`].
///
/// ```rust,ignore
/// struct FakeQuote { symbol: Option<Symbol> }
///
/// impl Provider for FakeQuote {
///     fn source(&self) -> &str { "fake" }
///     fn symbol(&self) -> Option<&Symbol> { self.symbol.as_ref() }
///     fn accepted_params(&self, _method: Method) -> ParamSet { ParamSet::of(&[Param::Start, Param::End]) }
///     fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, Table> { /* ... */ }
/// }
/// ```
///
/// Implementations must be `Send + Sync`; an adapter may be moved across tasks.
pub trait Provider: Send + Sync {
    /// Lowercase source name, used in error messages and table attributes.
    fn source(&self) -> &str;

    /// Symbol the instance was built for, if any.
    fn symbol(&self) -> Option<&Symbol>;

    /// Call options this provider consumes for `method`.
    fn accepted_params(&self, method: Method) -> ParamSet;

    fn history<'a>(&'a self, _req: HistoryRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::History)
    }

    fn intraday<'a>(&'a self, _req: IntradayRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::Intraday)
    }

    fn price_depth<'a>(&'a self) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::PriceDepth)
    }

    fn overview<'a>(&'a self) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::Overview)
    }

    fn shareholders<'a>(&'a self, _req: CompanyRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::Shareholders)
    }

    fn officers<'a>(&'a self, _req: CompanyRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::Officers)
    }

    fn subsidiaries<'a>(&'a self, _req: CompanyRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::Subsidiaries)
    }

    fn affiliate<'a>(&'a self, _req: CompanyRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::Affiliate)
    }

    fn events<'a>(&'a self, _req: CompanyRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::Events)
    }

    fn news<'a>(&'a self, _req: CompanyRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::News)
    }

    fn balance_sheet<'a>(&'a self, _req: ReportRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::BalanceSheet)
    }

    fn income_statement<'a>(&'a self, _req: ReportRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::IncomeStatement)
    }

    fn cash_flow<'a>(&'a self, _req: ReportRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::CashFlow)
    }

    fn ratio<'a>(&'a self, _req: ReportRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::Ratio)
    }

    fn all_symbols<'a>(&'a self) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::AllSymbols)
    }

    fn symbols_by_exchange<'a>(&'a self, _req: ListingRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::SymbolsByExchange)
    }

    fn symbols_by_industries<'a>(&'a self, _req: ListingRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::SymbolsByIndustries)
    }

    fn symbols_by_group<'a>(&'a self, _req: ListingRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::SymbolsByGroup)
    }

    fn industries_icb<'a>(&'a self) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::IndustriesIcb)
    }

    fn search_symbol_id<'a>(&'a self, _req: SearchRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::SearchSymbolId)
    }

    fn price_board<'a>(&'a self, _req: PriceBoardRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::PriceBoard)
    }

    fn fund_listing<'a>(&'a self, _req: FundRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::FundListing)
    }

    fn fund_filter<'a>(&'a self, _req: FundRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::FundFilter)
    }

    fn top_holding<'a>(&'a self, _req: FundRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::TopHolding)
    }

    fn industry_holding<'a>(&'a self, _req: FundRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::IndustryHolding)
    }

    fn nav_report<'a>(&'a self, _req: FundRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::NavReport)
    }

    fn asset_holding<'a>(&'a self, _req: FundRequest) -> SourceFuture<'a, Table> {
        unsupported(self.source(), Method::AssetHolding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_belong_to_one_capability() {
        assert_eq!(Method::History.capability(), Capability::Quote);
        assert_eq!(Method::Officers.capability(), Capability::Company);
        assert_eq!(Method::Ratio.capability(), Capability::Financial);
        assert_eq!(Method::SymbolsByGroup.capability(), Capability::Listing);
        assert_eq!(Method::PriceBoard.capability(), Capability::Trading);
        assert_eq!(Method::SearchSymbolId.capability(), Capability::Listing);
        assert_eq!(Method::NavReport.capability(), Capability::Fund);
    }

    #[test]
    fn every_method_fits_the_bitset() {
        assert!(Method::ALL.len() <= 32);
        let all = MethodSet::of(&Method::ALL);
        assert_eq!(all.iter().count(), Method::ALL.len());
    }

    #[test]
    fn method_set_tracks_membership() {
        let set = MethodSet::of(&[Method::History, Method::Intraday]);

        assert!(set.contains(Method::History));
        assert!(!set.contains(Method::PriceDepth));
        assert_eq!(set.with(Method::PriceDepth).names(), vec!["history", "intraday", "price_depth"]);
        assert!(MethodSet::empty().is_empty());
    }

    #[test]
    fn status_mapping_follows_retry_rules() {
        assert_eq!(SourceError::from_status(429, "x").kind(), SourceErrorKind::RateLimited);
        assert!(SourceError::from_status(503, "x").retryable());
        assert!(SourceError::from_status(408, "x").retryable());
        let not_found = SourceError::from_status(404, "x");
        assert_eq!(not_found.kind(), SourceErrorKind::Unavailable);
        assert!(!not_found.retryable());
    }

    #[test]
    fn transform_errors_map_to_no_data_or_internal() {
        assert_eq!(
            SourceError::from(TransformError::Empty).kind(),
            SourceErrorKind::NoData
        );
        assert_eq!(
            SourceError::from(TransformError::UnsupportedShape(String::from("x"))).code(),
            "source.internal"
        );
    }

    #[test]
    fn capability_parses_finance_alias() {
        assert_eq!(Capability::from_str("Finance"), Ok(Capability::Financial));
        assert_eq!(Capability::from_str("fund"), Ok(Capability::Fund));
        assert!(Capability::from_str("bond").is_err());
    }
}
