use std::sync::Arc;

use serde_json::{Map, Value};
use time::Date;
use tracing::{debug, warn};

use super::{BASE_URL, FUTURES_PATH, STOCKS_PATH};
use crate::domain::dates::{ensure_ordered, today_vn, trading_date_vn, vn_midnight_epoch};
use crate::provider::{Capability, Method, MethodSet, Provider, SourceFuture};
use crate::providers::{classify, Session};
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{HistoryRequest, IntradayRequest, Param, ParamSet, ProviderConfig};
use crate::table::Table;
use crate::transform::{map_columns, normalize_intraday, normalize_ohlc, ColumnMap, IntradayOptions, OhlcOptions};
use crate::{AssetType, Interval, Source, SourceError, Symbol};

const OHLC_MAP: ColumnMap = &[
    ("tradingDate", "time"),
    ("open", "open"),
    ("high", "high"),
    ("low", "low"),
    ("close", "close"),
    ("volume", "volume"),
];

const INTRADAY_MAP: ColumnMap = &[("t", "time"), ("p", "price"), ("v", "volume"), ("a", "match_type")];

const INDEX_NAMES: &[(&str, &str)] = &[("VNINDEX", "VNINDEX"), ("HNXINDEX", "HNXIndex"), ("UPCOMINDEX", "UPCOM")];

const DEFAULT_COUNT_BACK: usize = 365;
const CHUNK_THRESHOLD_DAYS: i64 = 365;
const INTRADAY_PAGE: usize = 100;
const LARGE_PAGE_SIZE: usize = 30_000;
const PRICE_SCALE: f64 = 1_000.0;

const METHODS: MethodSet = MethodSet::of(&[Method::History, Method::Intraday]);
const INIT_PARAMS: ParamSet = ParamSet::of(&[Param::Symbol, Param::RandomAgent, Param::ShowLog, Param::Proxy]);

pub(super) fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(Capability::Quote, "tcbs", METHODS, INIT_PARAMS, |config, context| {
        Ok(Arc::new(TcbsQuote::new(&config, &context)?) as Arc<dyn Provider>)
    })
}

fn resolution(interval: Interval) -> Option<&'static str> {
    match interval {
        Interval::OneMinute => Some("1"),
        Interval::FiveMinutes => Some("5"),
        Interval::FifteenMinutes => Some("15"),
        Interval::ThirtyMinutes => Some("30"),
        Interval::OneHour => Some("60"),
        Interval::OneDay => Some("D"),
        Interval::OneWeek => Some("W"),
        Interval::OneMonth => Some("M"),
        Interval::FourHours => None,
    }
}

/// Yearly windows covering `[start, end]`. After the first, each window
/// starts on the 1st of the start month one year later.
pub(crate) fn yearly_chunks(start: Date, end: Date) -> Vec<(Date, Date)> {
    let mut chunks = Vec::new();
    let mut current = start;
    while current <= end {
        let Ok(next) = Date::from_calendar_date(current.year() + 1, current.month(), 1) else {
            break;
        };
        let chunk_end = next.previous_day().map_or(end, |last| last.min(end));
        chunks.push((current, chunk_end));
        current = next;
    }
    chunks
}

/// Price history and paged tick data.
pub struct TcbsQuote {
    session: Session,
    asset_type: Option<AssetType>,
    upstream_symbol: Option<String>,
}

impl TcbsQuote {
    pub fn new(config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        let session = Session::new(Source::Tcbs, config, context)?;
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
            .ok_or_else(|| SourceError::invalid_request("tcbs quote needs a symbol"))
    }

    /// One `bars` request ending on `end`, returning the raw rows.
    async fn fetch_bars(
        &self,
        interval: Interval,
        asset_type: AssetType,
        end: Date,
        count_back: usize,
    ) -> Result<Vec<Map<String, Value>>, SourceError> {
        let symbol = self.upstream()?;
        let resolution = resolution(interval).ok_or_else(|| {
            SourceError::invalid_request(format!(
                "tcbs does not serve interval {interval}; use 1m, 5m, 15m, 30m, 1H, 1D, 1W or 1M"
            ))
        })?;
        let endpoint = if interval.is_intraday() { "bars" } else { "bars-long-term" };
        let path = if asset_type == AssetType::Derivative {
            FUTURES_PATH
        } else {
            STOCKS_PATH
        };
        let to = end.next_day().unwrap_or(end);

        let request = self
            .session
            .get(format!("{BASE_URL}/{path}/v2/stock/{endpoint}"))
            .with_query("resolution", resolution)
            .with_query("ticker", symbol)
            .with_query("type", asset_type.as_str())
            .with_query("to", vn_midnight_epoch(to))
            .with_query("countBack", count_back);
        let payload = self.session.fetch(request, "history").await?;
        match payload.get("data") {
            Some(Value::Array(items)) => Ok(items.iter().filter_map(Value::as_object).cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn fetch_history(&self, req: HistoryRequest) -> Result<Table, SourceError> {
        let symbol = self.upstream()?.to_owned();
        let interval = req.interval_or_default();
        let asset_type = req
            .asset_type
            .or(self.asset_type)
            .ok_or_else(|| SourceError::invalid_request("tcbs quote needs a symbol"))?;
        let start = req
            .start
            .ok_or_else(|| SourceError::invalid_request("history needs a start date"))?;
        let end = req.end.unwrap_or_else(today_vn);
        ensure_ordered(start, end)?;

        let long_range = (end - start).whole_days() > CHUNK_THRESHOLD_DAYS;
        if long_range && interval.is_intraday() {
            return Err(SourceError::invalid_request(format!(
                "tcbs serves at most {CHUNK_THRESHOLD_DAYS} days of {interval} bars; \
                 narrow the range or use 1D, 1W or 1M"
            )));
        }

        // Daily and coarser bars: one request per yearly window.
        let rows = if long_range {
            let mut rows = Vec::new();
            let mut fetched_any = false;
            for (chunk_start, chunk_end) in yearly_chunks(start, end) {
                debug!(%symbol, %chunk_start, %chunk_end, "tcbs history chunk");
                match self.fetch_bars(interval, asset_type, chunk_end, DEFAULT_COUNT_BACK).await {
                    Ok(chunk) if !chunk.is_empty() => {
                        fetched_any = true;
                        rows.extend(chunk);
                    }
                    Ok(_) => warn!(%symbol, %chunk_start, %chunk_end, "tcbs returned no rows for chunk"),
                    Err(error) => warn!(%symbol, %chunk_start, %chunk_end, %error, "tcbs history chunk failed"),
                }
            }
            if !fetched_any {
                return Err(SourceError::no_data(format!(
                    "tcbs has no history for {symbol} between {start} and {end}"
                )));
            }
            rows
        } else {
            let count_back = req.count_back.unwrap_or(DEFAULT_COUNT_BACK);
            self.fetch_bars(interval, asset_type, end, count_back).await?
        };

        let table = map_columns(&Table::from_json_rows(&rows), OHLC_MAP);
        let options = OhlcOptions {
            price_divisor: (!asset_type.is_point_quoted()).then_some(PRICE_SCALE),
            floating: req.floating_or_default(),
            resample: None,
            attrs: self.session.attrs(Some(interval), Some(asset_type)),
        };
        let mut table = normalize_ohlc(table, &options)?;
        table.retain_where("time", |cell| {
            cell.as_datetime()
                .is_some_and(|at| at.date() >= start && at.date() <= end)
        });
        if table.is_empty() {
            return Err(SourceError::no_data(format!(
                "tcbs has no history for {symbol} between {start} and {end}"
            )));
        }
        if let Some(count) = req.count_back {
            table.tail(count);
        }
        Ok(table)
    }

    async fn fetch_intraday(&self, req: IntradayRequest) -> Result<Table, SourceError> {
        let symbol = self.upstream()?;
        let page_size = req.page_size.unwrap_or(INTRADAY_PAGE);
        let first_page = req.page.unwrap_or(0);
        if page_size > LARGE_PAGE_SIZE {
            warn!(page_size, "large intraday page requested");
        }

        let mut rows = Vec::new();
        let pages = page_size.div_ceil(INTRADAY_PAGE);
        for index in 0..pages {
            let size = INTRADAY_PAGE.min(page_size - INTRADAY_PAGE * index);
            let request = self
                .session
                .get(format!("{BASE_URL}/{STOCKS_PATH}/v1/intraday/{symbol}/his/paging"))
                .with_query("page", first_page + index)
                .with_query("size", size)
                .with_query("headIndex", -1);
            let payload = self.session.fetch(request, "intraday").await?;
            if let Some(Value::Array(items)) = payload.get("data") {
                rows.extend(items.iter().filter_map(Value::as_object).cloned());
            }
        }

        let options = IntradayOptions {
            price_divisor: None,
            session_date: trading_date_vn(),
            auction_marker: None,
            attrs: self.session.attrs(None, self.asset_type),
        };
        Ok(normalize_intraday(Table::from_json_rows(&rows), INTRADAY_MAP, &options)?)
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
        .ok_or_else(|| SourceError::invalid_request(format!("unknown index '{code}'")))
}

impl Provider for TcbsQuote {
    fn source(&self) -> &str {
        "tcbs"
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
                Param::AssetType,
            ]),
            Method::Intraday => ParamSet::of(&[Param::PageSize, Param::Page]),
            _ => ParamSet::empty(),
        }
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_history(req))
    }

    fn intraday<'a>(&'a self, req: IntradayRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_intraday(req))
    }
}
