//! Typed call options, constructor configuration and option filtering.
//!
//! Every option is optional. A provider declares per method the
//! [`ParamSet`] it consumes; the adapter clears everything else through
//! [`FilteredRequest::retain_accepted`] so an unsupported option never
//! fails a call.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use time::Date;

use crate::domain::dates::{ensure_ordered, parse_date};
use crate::http_client::ProxyConfig;
use crate::{AssetType, FundType, Interval, Lang, OfficerFilter, ReportPeriod, Symbol, ValidationError};

/// Named option, either a constructor field or a call field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    Symbol,
    RandomAgent,
    ShowLog,
    Proxy,
    Period,
    GetAll,
    Start,
    End,
    Interval,
    CountBack,
    Floating,
    AssetType,
    PageSize,
    Page,
    LastTime,
    FilterBy,
    Lang,
    Dropna,
    Group,
    Locale,
    Limit,
    FundType,
    Fund,
}

impl Param {
    pub const ALL: [Self; 23] = [
        Self::Symbol,
        Self::RandomAgent,
        Self::ShowLog,
        Self::Proxy,
        Self::Period,
        Self::GetAll,
        Self::Start,
        Self::End,
        Self::Interval,
        Self::CountBack,
        Self::Floating,
        Self::AssetType,
        Self::PageSize,
        Self::Page,
        Self::LastTime,
        Self::FilterBy,
        Self::Lang,
        Self::Dropna,
        Self::Group,
        Self::Locale,
        Self::Limit,
        Self::FundType,
        Self::Fund,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Symbol => "symbol",
            Self::RandomAgent => "random_agent",
            Self::ShowLog => "show_log",
            Self::Proxy => "proxy",
            Self::Period => "period",
            Self::GetAll => "get_all",
            Self::Start => "start",
            Self::End => "end",
            Self::Interval => "interval",
            Self::CountBack => "count_back",
            Self::Floating => "floating",
            Self::AssetType => "asset_type",
            Self::PageSize => "page_size",
            Self::Page => "page",
            Self::LastTime => "last_time",
            Self::FilterBy => "filter_by",
            Self::Lang => "lang",
            Self::Dropna => "dropna",
            Self::Group => "group",
            Self::Locale => "locale",
            Self::Limit => "limit",
            Self::FundType => "fund_type",
            Self::Fund => "fund",
        }
    }

    const fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl Display for Param {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of declared options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ParamSet(u32);

impl ParamSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn of(params: &[Param]) -> Self {
        let mut bits = 0;
        let mut index = 0;
        while index < params.len() {
            bits |= params[index].bit();
            index += 1;
        }
        Self(bits)
    }

    pub const fn with(self, param: Param) -> Self {
        Self(self.0 | param.bit())
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, param: Param) -> bool {
        self.0 & param.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Param> {
        Param::ALL.into_iter().filter(move |param| self.contains(*param))
    }
}

/// Option struct whose populated fields can be filtered against a [`ParamSet`].
pub trait FilteredRequest {
    /// Options currently set.
    fn populated(&self) -> ParamSet;

    /// Unset one option. Options the struct does not carry are ignored.
    fn clear(&mut self, param: Param);

    /// Clear every populated option outside `accepted`, returning what was dropped.
    fn retain_accepted(&mut self, accepted: ParamSet) -> Vec<Param> {
        let dropped: Vec<Param> = self
            .populated()
            .iter()
            .filter(|param| !accepted.contains(*param))
            .collect();
        for param in &dropped {
            self.clear(*param);
        }
        dropped
    }
}

fn mark(set: ParamSet, param: Param, present: bool) -> ParamSet {
    if present {
        set.with(param)
    } else {
        set
    }
}

/// Constructor configuration for a provider instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderConfig {
    pub symbol: Option<Symbol>,
    pub random_agent: Option<bool>,
    pub show_log: Option<bool>,
    pub proxy: Option<ProxyConfig>,
    pub period: Option<ReportPeriod>,
    pub get_all: Option<bool>,
}

impl ProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(mut self, symbol: Symbol) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn with_random_agent(mut self, random_agent: bool) -> Self {
        self.random_agent = Some(random_agent);
        self
    }

    pub fn with_show_log(mut self, show_log: bool) -> Self {
        self.show_log = Some(show_log);
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_period(mut self, period: ReportPeriod) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_get_all(mut self, get_all: bool) -> Self {
        self.get_all = Some(get_all);
        self
    }

    pub fn random_agent(&self) -> bool {
        self.random_agent.unwrap_or(false)
    }

    pub fn show_log(&self) -> bool {
        self.show_log.unwrap_or(false)
    }
}

impl FilteredRequest for ProviderConfig {
    fn populated(&self) -> ParamSet {
        let set = mark(ParamSet::empty(), Param::Symbol, self.symbol.is_some());
        let set = mark(set, Param::RandomAgent, self.random_agent.is_some());
        let set = mark(set, Param::ShowLog, self.show_log.is_some());
        let set = mark(set, Param::Proxy, self.proxy.is_some());
        let set = mark(set, Param::Period, self.period.is_some());
        mark(set, Param::GetAll, self.get_all.is_some())
    }

    fn clear(&mut self, param: Param) {
        match param {
            Param::Symbol => self.symbol = None,
            Param::RandomAgent => self.random_agent = None,
            Param::ShowLog => self.show_log = None,
            Param::Proxy => self.proxy = None,
            Param::Period => self.period = None,
            Param::GetAll => self.get_all = None,
            _ => {}
        }
    }
}

/// Options for OHLC history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryRequest {
    pub start: Option<Date>,
    pub end: Option<Date>,
    pub interval: Option<Interval>,
    /// Keep only the last `n` rows.
    pub count_back: Option<usize>,
    /// Decimal places for prices.
    pub floating: Option<u8>,
    /// Overrides the asset type inferred from the symbol.
    pub asset_type: Option<AssetType>,
}

impl HistoryRequest {
    pub fn between(start: Date, end: Option<Date>) -> Result<Self, ValidationError> {
        if let Some(end) = end {
            ensure_ordered(start, end)?;
        }
        Ok(Self {
            start: Some(start),
            end,
            ..Self::default()
        })
    }

    /// Parse `YYYY-MM-DD` bounds and an interval string.
    pub fn parse(start: &str, end: Option<&str>, interval: &str) -> Result<Self, ValidationError> {
        let start = parse_date(start)?;
        let end = end.map(parse_date).transpose()?;
        Ok(Self::between(start, end)?.with_interval(Interval::from_str(interval)?))
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_count_back(mut self, count_back: usize) -> Self {
        self.count_back = Some(count_back);
        self
    }

    pub fn with_floating(mut self, floating: u8) -> Self {
        self.floating = Some(floating);
        self
    }

    pub fn with_asset_type(mut self, asset_type: AssetType) -> Self {
        self.asset_type = Some(asset_type);
        self
    }

    pub fn interval_or_default(&self) -> Interval {
        self.interval.unwrap_or_default()
    }

    pub fn floating_or_default(&self) -> u8 {
        self.floating.unwrap_or(2)
    }
}

impl FilteredRequest for HistoryRequest {
    fn populated(&self) -> ParamSet {
        let set = mark(ParamSet::empty(), Param::Start, self.start.is_some());
        let set = mark(set, Param::End, self.end.is_some());
        let set = mark(set, Param::Interval, self.interval.is_some());
        let set = mark(set, Param::CountBack, self.count_back.is_some());
        let set = mark(set, Param::Floating, self.floating.is_some());
        mark(set, Param::AssetType, self.asset_type.is_some())
    }

    fn clear(&mut self, param: Param) {
        match param {
            Param::Start => self.start = None,
            Param::End => self.end = None,
            Param::Interval => self.interval = None,
            Param::CountBack => self.count_back = None,
            Param::Floating => self.floating = None,
            Param::AssetType => self.asset_type = None,
            _ => {}
        }
    }
}

/// Options for tick-level intraday trades.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntradayRequest {
    pub page_size: Option<usize>,
    pub page: Option<usize>,
    /// Upstream cursor: only trades before this time.
    pub last_time: Option<String>,
}

impl IntradayRequest {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_last_time(mut self, last_time: impl Into<String>) -> Self {
        self.last_time = Some(last_time.into());
        self
    }
}

impl FilteredRequest for IntradayRequest {
    fn populated(&self) -> ParamSet {
        let set = mark(ParamSet::empty(), Param::PageSize, self.page_size.is_some());
        let set = mark(set, Param::Page, self.page.is_some());
        mark(set, Param::LastTime, self.last_time.is_some())
    }

    fn clear(&mut self, param: Param) {
        match param {
            Param::PageSize => self.page_size = None,
            Param::Page => self.page = None,
            Param::LastTime => self.last_time = None,
            _ => {}
        }
    }
}

/// Options for company profile sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyRequest {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub filter_by: Option<OfficerFilter>,
}

impl CompanyRequest {
    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_filter(mut self, filter_by: OfficerFilter) -> Self {
        self.filter_by = Some(filter_by);
        self
    }
}

impl FilteredRequest for CompanyRequest {
    fn populated(&self) -> ParamSet {
        let set = mark(ParamSet::empty(), Param::Page, self.page.is_some());
        let set = mark(set, Param::PageSize, self.page_size.is_some());
        mark(set, Param::FilterBy, self.filter_by.is_some())
    }

    fn clear(&mut self, param: Param) {
        match param {
            Param::Page => self.page = None,
            Param::PageSize => self.page_size = None,
            Param::FilterBy => self.filter_by = None,
            _ => {}
        }
    }
}

/// Options for financial statements and ratios.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportRequest {
    pub period: Option<ReportPeriod>,
    pub lang: Option<Lang>,
    /// Drop columns whose values are all null.
    pub dropna: Option<bool>,
    pub get_all: Option<bool>,
}

impl ReportRequest {
    pub fn with_period(mut self, period: ReportPeriod) -> Self {
        self.period = Some(period);
        self
    }

    pub fn with_lang(mut self, lang: Lang) -> Self {
        self.lang = Some(lang);
        self
    }

    pub fn with_dropna(mut self, dropna: bool) -> Self {
        self.dropna = Some(dropna);
        self
    }

    pub fn with_get_all(mut self, get_all: bool) -> Self {
        self.get_all = Some(get_all);
        self
    }
}

impl FilteredRequest for ReportRequest {
    fn populated(&self) -> ParamSet {
        let set = mark(ParamSet::empty(), Param::Period, self.period.is_some());
        let set = mark(set, Param::Lang, self.lang.is_some());
        let set = mark(set, Param::Dropna, self.dropna.is_some());
        mark(set, Param::GetAll, self.get_all.is_some())
    }

    fn clear(&mut self, param: Param) {
        match param {
            Param::Period => self.period = None,
            Param::Lang => self.lang = None,
            Param::Dropna => self.dropna = None,
            Param::GetAll => self.get_all = None,
            _ => {}
        }
    }
}

/// Options for listing queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingRequest {
    pub lang: Option<Lang>,
    /// Index or board group, e.g. `VN30` or `HNX`.
    pub group: Option<String>,
}

impl ListingRequest {
    pub fn with_lang(mut self, lang: Lang) -> Self {
        self.lang = Some(lang);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

impl FilteredRequest for ListingRequest {
    fn populated(&self) -> ParamSet {
        let set = mark(ParamSet::empty(), Param::Lang, self.lang.is_some());
        mark(set, Param::Group, self.group.is_some())
    }

    fn clear(&mut self, param: Param) {
        match param {
            Param::Lang => self.lang = None,
            Param::Group => self.group = None,
            _ => {}
        }
    }
}

/// Free-text instrument search. The query is required, not an option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    /// Market locale such as `vi-vn`; results are filtered to it.
    pub locale: Option<String>,
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Result<Self, ValidationError> {
        let query = query.into().trim().to_owned();
        if query.is_empty() {
            return Err(ValidationError::ZeroValue { field: "query" });
        }
        Ok(Self {
            query,
            locale: None,
            limit: None,
        })
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn limit_or_default(&self) -> usize {
        self.limit.unwrap_or(10)
    }
}

impl FilteredRequest for SearchRequest {
    fn populated(&self) -> ParamSet {
        let set = mark(ParamSet::empty(), Param::Locale, self.locale.is_some());
        mark(set, Param::Limit, self.limit.is_some())
    }

    fn clear(&mut self, param: Param) {
        match param {
            Param::Locale => self.locale = None,
            Param::Limit => self.limit = None,
            _ => {}
        }
    }
}

/// Options for open-ended fund queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FundRequest {
    /// Restrict listings to one asset class.
    pub fund_type: Option<FundType>,
    /// Fund short name, e.g. `SSISCA`.
    pub fund: Option<String>,
}

impl FundRequest {
    /// Request about one fund, by its short name.
    pub fn fund(name: &str) -> Result<Self, ValidationError> {
        let name = name.trim().to_ascii_uppercase();
        if name.is_empty() {
            return Err(ValidationError::ZeroValue { field: "fund" });
        }
        Ok(Self {
            fund: Some(name),
            ..Self::default()
        })
    }

    pub fn with_fund_type(mut self, fund_type: FundType) -> Self {
        self.fund_type = Some(fund_type);
        self
    }
}

impl FilteredRequest for FundRequest {
    fn populated(&self) -> ParamSet {
        let set = mark(ParamSet::empty(), Param::FundType, self.fund_type.is_some());
        mark(set, Param::Fund, self.fund.is_some())
    }

    fn clear(&mut self, param: Param) {
        match param {
            Param::FundType => self.fund_type = None,
            Param::Fund => self.fund = None,
            _ => {}
        }
    }
}

/// Symbols for a live price board. The symbol list is required, not an option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceBoardRequest {
    pub symbols: Vec<Symbol>,
}

impl PriceBoardRequest {
    pub fn new(symbols: Vec<Symbol>) -> Result<Self, ValidationError> {
        if symbols.is_empty() {
            return Err(ValidationError::ZeroValue { field: "symbols" });
        }
        Ok(Self { symbols })
    }

    pub fn parse<S: AsRef<str>>(symbols: &[S]) -> Result<Self, ValidationError> {
        let symbols = symbols
            .iter()
            .map(|symbol| Symbol::parse(symbol.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(symbols)
    }
}

impl FilteredRequest for PriceBoardRequest {
    fn populated(&self) -> ParamSet {
        ParamSet::empty()
    }

    fn clear(&mut self, _param: Param) {}
}

/// Requests without options (overview, price depth, all symbols).
impl FilteredRequest for () {
    fn populated(&self) -> ParamSet {
        ParamSet::empty()
    }

    fn clear(&mut self, _param: Param) {}
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn retain_accepted_clears_and_reports_extra_fields() {
        let mut request = HistoryRequest::between(date!(2024 - 01 - 01), Some(date!(2024 - 01 - 31)))
            .expect("valid range")
            .with_interval(Interval::OneDay)
            .with_count_back(10);

        let dropped = request.retain_accepted(ParamSet::of(&[Param::Start, Param::End]));

        assert_eq!(dropped, vec![Param::Interval, Param::CountBack]);
        assert_eq!(request.start, Some(date!(2024 - 01 - 01)));
        assert_eq!(request.interval, None);
        assert_eq!(request.count_back, None);
    }

    #[test]
    fn config_filtering_keeps_declared_fields() {
        let mut config = ProviderConfig::new()
            .with_symbol(Symbol::parse("ACB").expect("symbol"))
            .with_period(ReportPeriod::Year)
            .with_show_log(true);

        let dropped = config.retain_accepted(ParamSet::of(&[Param::Symbol, Param::ShowLog]));

        assert_eq!(dropped, vec![Param::Period]);
        assert!(config.symbol.is_some());
        assert!(config.period.is_none());
    }

    #[test]
    fn parse_rejects_reversed_range_and_bad_interval() {
        assert!(matches!(
            HistoryRequest::parse("2024-02-01", Some("2024-01-01"), "1D"),
            Err(ValidationError::InvalidDateRange { .. })
        ));
        assert!(matches!(
            HistoryRequest::parse("2024-01-01", None, "2D"),
            Err(ValidationError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn search_requires_a_query_and_filters_its_options() {
        assert!(SearchRequest::new("  ").is_err());

        let mut request = SearchRequest::new("vnm").expect("query").with_locale("vi-vn").with_limit(5);
        let dropped = request.retain_accepted(ParamSet::of(&[Param::Limit]));

        assert_eq!(dropped, vec![Param::Locale]);
        assert_eq!(request.query, "vnm");
        assert_eq!(request.limit_or_default(), 5);
    }

    #[test]
    fn fund_names_are_uppercased() {
        let request = FundRequest::fund(" ssisca ").expect("fund");
        assert_eq!(request.fund.as_deref(), Some("SSISCA"));
        assert!(FundRequest::fund("").is_err());
    }

    #[test]
    fn price_board_requires_symbols() {
        let empty: [&str; 0] = [];
        assert!(PriceBoardRequest::parse(&empty).is_err());
        assert_eq!(PriceBoardRequest::parse(&["acb", "vnm"]).expect("parse").symbols.len(), 2);
    }
}
