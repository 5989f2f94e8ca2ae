use std::sync::Arc;

use serde_json::Value;
use time::{Duration, PrimitiveDateTime, Time};
use tokio::sync::OnceCell;

use super::{BASE_URL, CONFIG_URL};
use crate::domain::dates::{ensure_ordered, today_vn};
use crate::provider::{Capability, Method, MethodSet, Provider, SourceFuture};
use crate::providers::{path, pick, Session};
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{HistoryRequest, Param, ParamSet, ProviderConfig};
use crate::table::{Cell, DType, Table};
use crate::transform::{
    cast_cell, json_to_table, normalize_ohlc, ColumnMap, OhlcOptions, ResampleMap, ResampleRule,
};
use crate::{Interval, Source, SourceError, Symbol};

const OHLC_MAP: ColumnMap = &[
    ("timeStamps", "time"),
    ("openPrices", "open"),
    ("pricesHigh", "high"),
    ("pricesLow", "low"),
    ("prices", "close"),
    ("volumes", "volume"),
];

const RESAMPLE_MAP: ResampleMap = &[(Interval::OneWeek, ResampleRule::Week), (Interval::OneMonth, ResampleRule::Month)];

/// Placeholder MSN uses for missing prices.
const MISSING_VALUE: f64 = -99_999_901.0;

const API_VERSION: &str = "20240430";
const API_KEY_PATH: [&str; 5] = [
    "configs",
    "shared/msn-ns/HoroscopeAnswerCardWC/default",
    "properties",
    "horoscopeAnswerServiceClientSettings",
    "apikey",
];
const TARGET_SCOPE: &str = r#"{"audienceMode":"adult","browser":{"browserType":"chrome","version":"0","ismobile":"false"},"deviceFormFactor":"desktop","domain":"www.msn.com","locale":{"content":{"language":"vi","market":"vn"},"display":{"language":"vi","market":"vn"}},"ocid":"hpmsn","os":"macos","platform":"web","pageType":"financestockdetails"}"#;

const CURRENCY_IDS: &[(&str, &str)] = &[
    ("USDVND", "avyufr"),
    ("JPYVND", "ave8sm"),
    ("AUDVND", "auxrkr"),
    ("CNYVND", "av55fr"),
    ("KRWVND", "avfg9c"),
    ("EURVND", "av93ec"),
    ("GBPVND", "avyjtc"),
    ("USDJPY", "avyomw"),
    ("USDEUR", "avyn9c"),
    ("USDCNY", "avym77"),
    ("USDKRW", "avyoyc"),
    ("USDSGD", "avyspr"),
    ("EURUSD", "av932w"),
    ("GBPUSD", "avyjhw"),
];

const CRYPTO_IDS: &[(&str, &str)] = &[
    ("BTC", "c2111"),
    ("ETH", "c2112"),
    ("USDT", "c2115"),
    ("USDC", "c211a"),
    ("BNB", "c2113"),
    ("BUSD", "c211i"),
    ("XRP", "c2117"),
    ("ADA", "c2114"),
    ("SOL", "c2116"),
    ("DOGE", "c2119"),
];

const INDEX_IDS: &[(&str, &str)] = &[
    ("INX", "a33k6h"),
    ("DJI", "a6qja2"),
    ("COMP", "a3oxnm"),
    ("RUT", "b9v42w"),
    ("NYA", "a74pqh"),
    ("UKX", "aopnp2"),
    ("DAX", "afx2kr"),
    ("PX1", "aecfh7"),
    ("N225", "a9j7bh"),
    ("000001", "adfh77"),
    ("HSI", "ah7etc"),
    ("SENSEX", "ahkucw"),
    ("VNI", "aqk2nm"),
];

const DEFAULT_COUNT_BACK: usize = 365;

const METHODS: MethodSet = MethodSet::of(&[Method::History]);
const INIT_PARAMS: ParamSet = ParamSet::of(&[Param::Symbol, Param::RandomAgent, Param::ShowLog, Param::Proxy]);

pub(super) fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(Capability::Quote, "msn", METHODS, INIT_PARAMS, |config, context| {
        Ok(Arc::new(MsnQuote::new(&config, &context)?) as Arc<dyn Provider>)
    })
}

/// What an MSN instrument id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsnAsset {
    Currency,
    Crypto,
    Index,
    Other,
}

impl MsnAsset {
    /// Resolve a ticker such as `USDVND` or `BTC`, or a raw MSN id, to the
    /// MSN id and its asset kind.
    pub fn resolve(symbol: &Symbol) -> (String, Self) {
        let code = symbol.as_str();
        let tables = [
            (CURRENCY_IDS, Self::Currency),
            (CRYPTO_IDS, Self::Crypto),
            (INDEX_IDS, Self::Index),
        ];
        for (ids, asset) in tables {
            if let Some((_, id)) = ids.iter().find(|(name, _)| *name == code) {
                return ((*id).to_owned(), asset);
            }
        }

        let id = code.to_ascii_lowercase();
        for (ids, asset) in tables {
            if ids.iter().any(|(_, known)| *known == id) {
                return (id, asset);
            }
        }
        (id, Self::Other)
    }
}

/// Daily, weekly and monthly bars from MSN charts.
///
/// The API key is read from the MSN app config on the first request and
/// reused for the lifetime of the provider.
pub struct MsnQuote {
    session: Session,
    instrument: Option<(String, MsnAsset)>,
    api_key: OnceCell<String>,
}

impl MsnQuote {
    pub fn new(config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        let session = Session::new(Source::Msn, config, context)?;
        let instrument = session.symbol.as_ref().map(MsnAsset::resolve);
        Ok(Self {
            session,
            instrument,
            api_key: OnceCell::new(),
        })
    }

    async fn api_key(&self) -> Result<&str, SourceError> {
        let key = self
            .api_key
            .get_or_try_init(|| async {
                let request = self
                    .session
                    .get(CONFIG_URL)
                    .with_query("expType", "AppConfig")
                    .with_query("expInstance", "default")
                    .with_query("apptype", "finance")
                    .with_query("v", format!("{API_VERSION}.130"))
                    .with_query("targetScope", TARGET_SCOPE);
                let payload = self.session.fetch(request, "api_key").await?;
                path(&payload, &API_KEY_PATH)
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| SourceError::internal("msn app config carries no api key"))
            })
            .await?;
        Ok(key.as_str())
    }

    async fn fetch_history(&self, req: HistoryRequest) -> Result<Table, SourceError> {
        self.session.symbol()?;
        let Some((id, asset)) = self.instrument.as_ref() else {
            return Err(SourceError::invalid_request("msn quote needs a symbol"));
        };
        let interval = req.interval_or_default();
        if !matches!(interval, Interval::OneDay | Interval::OneWeek | Interval::OneMonth) {
            return Err(SourceError::invalid_request(format!(
                "msn does not serve interval {interval}; use 1D, 1W or 1M"
            )));
        }
        let start = req
            .start
            .ok_or_else(|| SourceError::invalid_request("history needs a start date"))?;
        let end = req.end.unwrap_or_else(today_vn);
        ensure_ordered(start, end)?;

        let api_key = self.api_key().await?;
        let endpoint = match asset {
            MsnAsset::Crypto => "Cryptocurrency/chart",
            _ => "Charts/TimeRange",
        };
        let request = self
            .session
            .get(format!("{BASE_URL}/{endpoint}"))
            .with_query("apikey", api_key)
            .with_query("StartTime", format!("{start}T17:00:00.000Z"))
            .with_query("EndTime", format!("{end}T16:59:00.858Z"))
            .with_query("timeframe", 1)
            .with_query("ocid", "finance-utils-peregrine")
            .with_query("cm", "vi-vn")
            .with_query("it", "web")
            .with_query("scn", "ANON")
            .with_query("ids", id)
            .with_query("type", "All")
            .with_query("wrapodata", "false")
            .with_query("disableSymbol", "false");
        let payload = self.session.fetch(request, "history").await?;

        let series = payload
            .as_array()
            .and_then(|items| items.first())
            .and_then(|item| item.get("series"))
            .and_then(Value::as_object)
            .ok_or_else(|| SourceError::no_data(format!("msn returned no series for {id}")))?;
        let columns = pick(series, OHLC_MAP.iter().map(|(from, _)| *from));
        let mut table = json_to_table(Value::Object(columns), Some(OHLC_MAP), &[])?;

        clear_missing_values(&mut table);
        table.map_column("time", DType::Datetime, |cell| vn_session_day(cell).map_or(Cell::Null, Cell::Datetime));
        table.drop_nulls(&["time", "open", "high", "low"]);
        if table.is_empty() {
            return Err(SourceError::no_data(format!("msn has no prices for {id}")));
        }

        let options = OhlcOptions {
            price_divisor: None,
            floating: req.floating_or_default(),
            resample: ResampleRule::lookup(RESAMPLE_MAP, interval),
            attrs: self.session.attrs(Some(interval), None),
        };
        let mut table = normalize_ohlc(table, &options)?;
        table.retain_where("time", |cell| {
            cell.as_datetime()
                .is_some_and(|at| at.date() >= start && at.date() <= end)
        });
        if table.is_empty() {
            return Err(SourceError::no_data(format!(
                "msn has no prices for {id} between {start} and {end}"
            )));
        }
        table.tail(req.count_back.unwrap_or(DEFAULT_COUNT_BACK));
        Ok(table)
    }
}

fn clear_missing_values(table: &mut Table) {
    for name in ["open", "high", "low", "close", "volume"] {
        let dtype = table.dtype(name).unwrap_or(DType::Float);
        table.map_column(name, dtype, |cell| match cell.as_f64() {
            Some(value) if value == MISSING_VALUE => Cell::Null,
            _ => cell.clone(),
        });
    }
}

/// MSN stamps bars in UTC; shift to Vietnam time and keep the day.
fn vn_session_day(cell: &Cell) -> Option<PrimitiveDateTime> {
    let at = cast_cell(cell, DType::Datetime)?.as_datetime()?;
    Some(PrimitiveDateTime::new((at + Duration::hours(7)).date(), Time::MIDNIGHT))
}

impl Provider for MsnQuote {
    fn source(&self) -> &str {
        "msn"
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
