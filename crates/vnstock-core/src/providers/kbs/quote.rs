use std::sync::Arc;

use serde_json::Value;

use super::STOCKS_URL;
use crate::domain::dates::{ensure_ordered, format_date_dmy, today_vn};
use crate::provider::{Capability, Method, MethodSet, Provider, SourceFuture};
use crate::providers::{classify, Session};
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{HistoryRequest, Param, ParamSet, ProviderConfig};
use crate::table::Table;
use crate::transform::{map_columns, normalize_ohlc, ColumnMap, OhlcOptions, RawPayload};
use crate::{AssetType, Interval, Source, SourceError, Symbol};

const OHLC_MAP: ColumnMap = &[
    ("t", "time"),
    ("o", "open"),
    ("h", "high"),
    ("l", "low"),
    ("c", "close"),
    ("v", "volume"),
];

const METHODS: MethodSet = MethodSet::of(&[Method::History]);
const INIT_PARAMS: ParamSet = ParamSet::of(&[Param::Symbol, Param::RandomAgent, Param::ShowLog, Param::Proxy]);

pub(super) fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(Capability::Quote, "kbs", METHODS, INIT_PARAMS, |config, context| {
        Ok(Arc::new(KbsQuote::new(&config, &context)?) as Arc<dyn Provider>)
    })
}

/// Endpoint suffix for each chart frame. Weeks and months are built upstream.
fn frame(interval: Interval) -> Option<&'static str> {
    match interval {
        Interval::OneMinute => Some("1P"),
        Interval::FiveMinutes => Some("5P"),
        Interval::FifteenMinutes => Some("15P"),
        Interval::ThirtyMinutes => Some("30P"),
        Interval::OneHour => Some("60P"),
        Interval::OneDay => Some("day"),
        Interval::OneWeek => Some("week"),
        Interval::OneMonth => Some("month"),
        Interval::FourHours => None,
    }
}

/// Price history from the KBS chart service.
pub struct KbsQuote {
    session: Session,
    asset_type: Option<AssetType>,
}

impl KbsQuote {
    pub fn new(config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        let session = Session::new(Source::Kbs, config, context)?;
        let asset_type = classify(session.symbol.as_ref())?;
        Ok(Self { session, asset_type })
    }

    async fn fetch_history(&self, req: HistoryRequest) -> Result<Table, SourceError> {
        let symbol = self.session.symbol()?;
        let interval = req.interval_or_default();
        let frame = frame(interval).ok_or_else(|| {
            SourceError::invalid_request(format!(
                "kbs does not serve interval {interval}; use 1m, 5m, 15m, 30m, 1H, 1D, 1W or 1M"
            ))
        })?;
        let start = req
            .start
            .ok_or_else(|| SourceError::invalid_request("history needs a start date"))?;
        let end = req.end.unwrap_or_else(today_vn);
        ensure_ordered(start, end)?;

        let request = self
            .session
            .get(format!("{STOCKS_URL}/{symbol}/data_{frame}"))
            .with_query("sdate", format_date_dmy(start))
            .with_query("edate", format_date_dmy(end));
        let payload = self.session.fetch(request, "history").await?;

        let key = format!("data_{frame}");
        let rows = match payload.get(&key) {
            Some(Value::Array(items)) if !items.is_empty() => Value::Array(items.clone()),
            _ => {
                return Err(SourceError::no_data(format!(
                    "kbs has no {interval} history for {symbol} between {start} and {end}"
                )))
            }
        };
        let table = map_columns(&RawPayload::detect(rows)?.into_table()?, OHLC_MAP);

        let options = OhlcOptions {
            price_divisor: None,
            floating: req.floating_or_default(),
            resample: None,
            attrs: self.session.attrs(Some(interval), self.asset_type),
        };
        let mut table = normalize_ohlc(table, &options)?;
        table.retain_where("time", |cell| cell.as_datetime().is_some_and(|at| at.date() >= start));
        if table.is_empty() {
            return Err(SourceError::no_data(format!(
                "kbs has no {interval} history for {symbol} since {start}"
            )));
        }
        if let Some(count) = req.count_back {
            table.tail(count);
        }
        tracing::debug!(%symbol, %interval, rows = table.len(), "kbs history");
        Ok(table)
    }
}

impl Provider for KbsQuote {
    fn source(&self) -> &str {
        "kbs"
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
            _ => ParamSet::empty(),
        }
    }

    fn history<'a>(&'a self, req: HistoryRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_history(req))
    }
}
