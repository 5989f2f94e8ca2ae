use std::sync::Arc;

use serde_json::{json, Value};

use super::TRADING_URL;
use crate::domain::dates::{ensure_ordered, today_vn, trading_date_vn, vn_midnight_epoch};
use crate::provider::{Capability, Method, MethodSet, Provider, SourceFuture};
use crate::providers::{classify, pick, Session};
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{HistoryRequest, IntradayRequest, Param, ParamSet, ProviderConfig};
use crate::table::{Cell, DType, Table};
use crate::transform::{
    cast_cell, cast_columns, json_to_table, map_columns, normalize_intraday, normalize_ohlc, require_columns,
    ColumnMap, DTypeMap, IntradayOptions, OhlcOptions, RawPayload, ResampleMap, ResampleRule,
};
use crate::{AssetType, Interval, Source, SourceError, Symbol};

const OHLC_MAP: ColumnMap = &[
    ("t", "time"),
    ("o", "open"),
    ("h", "high"),
    ("l", "low"),
    ("c", "close"),
    ("v", "volume"),
];

const RESAMPLE_MAP: ResampleMap = &[
    (Interval::FiveMinutes, ResampleRule::Minutes(5)),
    (Interval::FifteenMinutes, ResampleRule::Minutes(15)),
    (Interval::ThirtyMinutes, ResampleRule::Minutes(30)),
    (Interval::OneWeek, ResampleRule::Week),
    (Interval::OneMonth, ResampleRule::Month),
];

const INTRADAY_MAP: ColumnMap = &[
    ("truncTime", "time"),
    ("matchPrice", "price"),
    ("matchVol", "volume"),
    ("matchType", "match_type"),
    ("id", "id"),
];

const PRICE_DEPTH_MAP: ColumnMap = &[
    ("priceStep", "price"),
    ("accumulatedVolume", "acc_volume"),
    ("accumulatedBuyVolume", "acc_buy_volume"),
    ("accumulatedSellVolume", "acc_sell_volume"),
    ("accumulatedUndefinedVolume", "acc_undefined_volume"),
];

const PRICE_DEPTH_DTYPES: DTypeMap = &[
    ("price", DType::Float),
    ("acc_volume", DType::Int),
    ("acc_buy_volume", DType::Int),
    ("acc_sell_volume", DType::Int),
    ("acc_undefined_volume", DType::Int),
];

/// Upstream names for the three exchange indices.
const INDEX_NAMES: &[(&str, &str)] = &[
    ("VNINDEX", "VNINDEX"),
    ("HNXINDEX", "HNXIndex"),
    ("UPCOMINDEX", "HNXUpcomIndex"),
];

const DEFAULT_PAGE_SIZE: usize = 100;
const LARGE_PAGE_SIZE: usize = 30_000;
const PRICE_SCALE: f64 = 1_000.0;

const METHODS: MethodSet = MethodSet::of(&[Method::History, Method::Intraday, Method::PriceDepth]);
const INIT_PARAMS: ParamSet = ParamSet::of(&[Param::Symbol, Param::RandomAgent, Param::ShowLog, Param::Proxy]);

pub(super) fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(Capability::Quote, "vci", METHODS, INIT_PARAMS, |config, context| {
        Ok(Arc::new(VciQuote::new(&config, &context)?) as Arc<dyn Provider>)
    })
}

fn time_frame(interval: Interval) -> Option<&'static str> {
    match interval {
        Interval::OneMinute | Interval::FiveMinutes | Interval::FifteenMinutes | Interval::ThirtyMinutes => {
            Some("ONE_MINUTE")
        }
        Interval::OneHour => Some("ONE_HOUR"),
        Interval::OneDay | Interval::OneWeek | Interval::OneMonth => Some("ONE_DAY"),
        Interval::FourHours => None,
    }
}

/// Price history, tick data and price-step statistics.
pub struct VciQuote {
    session: Session,
    asset_type: Option<AssetType>,
    upstream_symbol: Option<String>,
}

impl VciQuote {
    pub fn new(config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        let session = Session::new(Source::Vci, config, context)?;
        let asset_type = classify(session.symbol.as_ref())?;
        let upstream_symbol = session.symbol.as_ref().map(upstream_symbol).transpose()?;
        Ok(Self {
            session,
            asset_type,
            upstream_symbol,
        })
    }

    fn upstream(&self) -> Result<&str, SourceError> {
        self.session.symbol()?;
        self.upstream_symbol
            .as_deref()
            .ok_or_else(|| SourceError::invalid_request("vci quote needs a symbol"))
    }

    fn price_divisor(&self) -> Option<f64> {
        match self.asset_type {
            Some(asset) if asset.is_point_quoted() => None,
            _ => Some(PRICE_SCALE),
        }
    }

    async fn fetch_history(&self, req: HistoryRequest) -> Result<Table, SourceError> {
        let symbol = self.upstream()?;
        let interval = req.interval_or_default();
        let frame = time_frame(interval).ok_or_else(|| {
            SourceError::invalid_request(format!(
                "vci does not serve interval {interval}; use 1m, 5m, 15m, 30m, 1H, 1D, 1W or 1M"
            ))
        })?;
        let start = req
            .start
            .ok_or_else(|| SourceError::invalid_request("history needs a start date"))?;
        let end = req.end.unwrap_or_else(today_vn);
        ensure_ordered(start, end)?;
        let to = end.next_day().unwrap_or(end);

        let body = json!({
            "timeFrame": frame,
            "symbols": [symbol],
            "from": vn_midnight_epoch(start),
            "to": vn_midnight_epoch(to),
        });
        let request = self.session.post_json(format!("{TRADING_URL}chart/OHLCChart/gap"), &body);
        let payload = self.session.fetch(request, "history").await?;

        let series = payload
            .as_array()
            .and_then(|items| items.first())
            .and_then(Value::as_object)
            .ok_or_else(|| SourceError::no_data(format!("vci returned no price history for {symbol}")))?;
        let columns = pick(series, OHLC_MAP.iter().map(|(from, _)| *from));
        let table = json_to_table(Value::Object(columns), Some(OHLC_MAP), &[])?;

        let options = OhlcOptions {
            price_divisor: self.price_divisor(),
            floating: req.floating_or_default(),
            resample: ResampleRule::lookup(RESAMPLE_MAP, interval),
            attrs: self.session.attrs(Some(interval), self.asset_type),
        };
        let mut table = normalize_ohlc(table, &options)?;
        if let Some(count) = req.count_back {
            table.tail(count);
        }
        Ok(table)
    }

    async fn fetch_intraday(&self, req: IntradayRequest) -> Result<Table, SourceError> {
        let symbol = self.upstream()?;
        let page_size = req.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size > LARGE_PAGE_SIZE {
            tracing::warn!(page_size, "large intraday page requested");
        }

        let body = json!({
            "symbol": symbol,
            "limit": page_size,
            "truncTime": req.last_time,
        });
        let request = self
            .session
            .post_json(format!("{TRADING_URL}market-watch/LEData/getAll"), &body);
        let payload = self.session.fetch(request, "intraday").await?;

        let mut table = RawPayload::detect(payload)?.into_table()?;
        table.map_column("truncTime", DType::Int, |cell| {
            cast_cell(cell, DType::Int).unwrap_or(Cell::Null)
        });
        let options = IntradayOptions {
            price_divisor: Some(PRICE_SCALE),
            session_date: trading_date_vn(),
            auction_marker: Some("unknown"),
            attrs: self.session.attrs(None, self.asset_type),
        };
        Ok(normalize_intraday(table, INTRADAY_MAP, &options)?)
    }

    async fn fetch_price_depth(&self) -> Result<Table, SourceError> {
        let symbol = self.upstream()?;
        let body = json!({ "symbol": symbol });
        let request = self.session.post_json(
            format!("{TRADING_URL}market-watch/AccumulatedPriceStepVol/getSymbolData"),
            &body,
        );
        let payload = self.session.fetch(request, "price_depth").await?;

        let raw = RawPayload::detect(payload)?.into_table()?;
        if raw.is_empty() {
            return Err(SourceError::no_data(format!("vci returned no price depth for {symbol}")));
        }
        let upstream: Vec<&str> = PRICE_DEPTH_MAP.iter().map(|(from, _)| *from).collect();
        require_columns(&raw, &upstream)?;
        let mut table = map_columns(&raw, PRICE_DEPTH_MAP);
        cast_columns(&mut table, PRICE_DEPTH_DTYPES);
        Ok(table.with_attrs(self.session.attrs(None, self.asset_type)))
    }
}

fn upstream_symbol(symbol: &Symbol) -> Result<String, SourceError> {
    let code = symbol.as_str();
    if !code.contains("INDEX") {
        return Ok(code.to_owned());
    }
    INDEX_NAMES
        .iter()
        .find(|(name, _)| *name == code)
        .map(|(_, upstream)| (*upstream).to_owned())
        .ok_or_else(|| {
            let valid: Vec<&str> = INDEX_NAMES.iter().map(|(name, _)| *name).collect();
            SourceError::invalid_request(format!(
                "unknown index '{code}', expected one of {}",
                valid.join(", ")
            ))
        })
}

impl Provider for VciQuote {
    fn source(&self) -> &str {
        "vci"
    }

    fn symbol(&self) -> Option<&Symbol> {
        self.session.symbol.as_ref()
    }

    fn accepted_params(&self, method: Method) -> ParamSet {
        match method {
            Method::History => ParamSet::of(&[
                Param::Start,
                Param::End,
                Param::Interval,
                Param::CountBack,
                Param::Floating,
            ]),
            Method::Intraday => ParamSet::of(&[Param::PageSize, Param::LastTime]),
            _ => ParamSet::empty(),
        }
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_history(req))
    }

    fn intraday<'a>(&'a self, req: IntradayRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_intraday(req))
    }

    fn price_depth<'a>(&'a self) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_price_depth())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};

    use super::*;
    use crate::providers::testing::Scripted;
    use crate::provider::SourceErrorKind;

    fn quote(symbol: &str, http: &Arc<Scripted>) -> VciQuote {
        let config = ProviderConfig::new().with_symbol(Symbol::parse(symbol).expect("symbol"));
        VciQuote::new(&config, &ProviderContext::new(Arc::clone(http) as _)).expect("provider")
    }

    #[tokio::test]
    async fn history_posts_gap_chart_and_scales_stock_prices() {
        let http = Arc::new(Scripted::new([json!([{
            "symbol": "ACB",
            "t": [1704153600, 1704240000],
            "o": [23500, 23600],
            "h": [23900, 23800],
            "l": [23400, 23300],
            "c": [23600, 23500],
            "v": [1000, 2000],
            "accumulatedValue": [1, 2]
        }])]));
        let provider = quote("ACB", &http);

        let request = HistoryRequest::between(date!(2024 - 01 - 02), Some(date!(2024 - 01 - 03))).expect("range");
        let table = provider.history(request).await.expect("history");

        assert_eq!(table.column_names(), vec!["time", "open", "high", "low", "close", "volume"]);
        assert_eq!(table.cell(0, "open"), Some(&Cell::Float(23.5)));
        assert_eq!(table.cell(0, "time"), Some(&Cell::Datetime(datetime!(2024-01-02 7:00))));
        assert_eq!(table.attrs().category, Some(AssetType::Stock));

        let body = http.recorded()[0].json_body().expect("json body");
        assert_eq!(body["timeFrame"], "ONE_DAY");
        assert_eq!(body["symbols"], json!(["ACB"]));
        assert_eq!(body["from"], json!(vn_midnight_epoch(date!(2024 - 01 - 02))));
        assert_eq!(body["to"], json!(vn_midnight_epoch(date!(2024 - 01 - 04))));
    }

    #[tokio::test]
    async fn index_symbols_map_to_upstream_names_and_keep_points() {
        let http = Arc::new(Scripted::new([json!([{
            "t": [1704153600], "o": [1130.5], "h": [1135.0], "l": [1120.25], "c": [1131.0], "v": [500]
        }])]));
        let provider = quote("hnxindex", &http);

        let request = HistoryRequest::between(date!(2024 - 01 - 02), Some(date!(2024 - 01 - 02))).expect("range");
        let table = provider.history(request).await.expect("history");

        assert_eq!(table.cell(0, "open"), Some(&Cell::Float(1130.5)));
        assert_eq!(http.recorded()[0].json_body().expect("body")["symbols"], json!(["HNXIndex"]));
    }

    #[test]
    fn unknown_index_is_rejected_at_construction() {
        let http = Arc::new(Scripted::default());
        let config = ProviderConfig::new().with_symbol(Symbol::parse("VN30INDEX").expect("symbol"));
        let result = VciQuote::new(&config, &ProviderContext::new(http as _));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn empty_series_is_no_data() {
        let http = Arc::new(Scripted::new([json!([])]));
        let provider = quote("ACB", &http);

        let request = HistoryRequest::between(date!(2024 - 01 - 02), None).expect("range");
        let err = provider.history(request).await.expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::NoData);
    }

    #[tokio::test]
    async fn four_hour_interval_is_rejected_before_io() {
        let http = Arc::new(Scripted::default());
        let provider = quote("ACB", &http);

        let request = HistoryRequest::between(date!(2024 - 01 - 02), None)
            .expect("range")
            .with_interval(Interval::FourHours);
        let err = provider.history(request).await.expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::InvalidRequest);
        assert!(http.recorded().is_empty());
    }

    #[tokio::test]
    async fn intraday_scales_prices_and_maps_sides() {
        let http = Arc::new(Scripted::new([json!([
            {"truncTime": "1704163500", "matchPrice": "23500", "matchVol": 100, "matchType": "b", "id": "1"},
            {"truncTime": "1704163560", "matchPrice": "23600", "matchVol": 200, "matchType": "s", "id": "2"}
        ])]));
        let provider = quote("ACB", &http);

        let table = provider.intraday(IntradayRequest::default()).await.expect("intraday");

        assert_eq!(table.column_names(), vec!["time", "price", "volume", "match_type", "id"]);
        assert_eq!(table.cell(0, "price"), Some(&Cell::Float(23.5)));
        assert_eq!(table.cell(1, "match_type"), Some(&Cell::Str(String::from("Sell"))));
        assert_eq!(table.cell(0, "time"), Some(&Cell::Datetime(datetime!(2024-01-02 9:45))));
        assert_eq!(http.recorded()[0].json_body().expect("body")["limit"], json!(100));
    }

    #[tokio::test]
    async fn price_depth_renames_step_columns() {
        let http = Arc::new(Scripted::new([json!([{
            "priceStep": 23500.0,
            "accumulatedVolume": 1000,
            "accumulatedBuyVolume": 600,
            "accumulatedSellVolume": 300,
            "accumulatedUndefinedVolume": 100
        }])]));
        let provider = quote("ACB", &http);

        let table = provider.price_depth().await.expect("depth");
        assert_eq!(table.column_names()[0], "price");
        assert_eq!(table.cell(0, "acc_buy_volume"), Some(&Cell::Int(600)));
    }
}
