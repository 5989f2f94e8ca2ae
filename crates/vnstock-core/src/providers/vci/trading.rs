use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::TRADING_URL;
use crate::provider::{Capability, Method, MethodSet, Provider, SourceFuture};
use crate::providers::Session;
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{Param, ParamSet, PriceBoardRequest, ProviderConfig};
use crate::table::Table;
use crate::transform::{camel_to_snake, flatten_object};
use crate::{Source, SourceError, Symbol};

/// Upstream block name and the column prefix it is flattened under.
const BLOCKS: [(&str, &str); 3] = [("listingInfo", "listing"), ("bidAsk", "bid_ask"), ("matchPrice", "match")];

const DROPPED_COLUMNS: &[&str] = &[
    "bid_ask_code",
    "bid_ask_symbol",
    "bid_ask_session",
    "bid_ask_received_time",
    "bid_ask_message_type",
    "bid_ask_time",
    "listing_code",
    "listing_exercise_price",
    "listing_exercise_ratio",
    "listing_maturity_date",
    "listing_underlying_symbol",
    "listing_issuer_name",
    "listing_received_time",
    "listing_message_type",
    "listing_en_organ_name",
    "listing_en_organ_short_name",
    "listing_organ_short_name",
    "listing_ticker",
    "match_code",
    "match_symbol",
    "match_received_time",
    "match_message_type",
    "match_time",
    "match_session",
];

const METHODS: MethodSet = MethodSet::of(&[Method::PriceBoard]);
const INIT_PARAMS: ParamSet = ParamSet::of(&[Param::Symbol, Param::RandomAgent, Param::ShowLog, Param::Proxy]);

pub(super) fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(Capability::Trading, "vci", METHODS, INIT_PARAMS, |config, context| {
        Ok(Arc::new(VciTrading::new(&config, &context)?) as Arc<dyn Provider>)
    })
}

/// Live price board for a list of symbols.
pub struct VciTrading {
    session: Session,
}

impl VciTrading {
    pub fn new(config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        Ok(Self {
            session: Session::new(Source::Vci, config, context)?,
        })
    }

    async fn fetch_price_board(&self, req: PriceBoardRequest) -> Result<Table, SourceError> {
        let symbols: Vec<&str> = req.symbols.iter().map(Symbol::as_str).collect();
        let body = json!({ "symbols": symbols });
        let request = self
            .session
            .post_json(format!("{TRADING_URL}price/symbols/getList"), &body);
        let payload = self.session.fetch(request, "price_board").await?;

        let Value::Array(items) = payload else {
            return Err(SourceError::internal("vci price board is not an array"));
        };
        let rows: Vec<Map<String, Value>> = items.iter().filter_map(Value::as_object).map(board_row).collect();
        if rows.is_empty() {
            return Err(SourceError::no_data(format!("vci has no board for {}", symbols.join(", "))));
        }

        let mut table = Table::from_json_rows(&rows);
        table.drop_columns(DROPPED_COLUMNS);
        table.rename(&[("listing_board", "listing_exchange")]);
        Ok(table.with_attrs(self.session.attrs(None, None)))
    }
}

fn board_row(item: &Map<String, Value>) -> Map<String, Value> {
    let mut row = Map::new();
    for (block, prefix) in BLOCKS {
        let Some(Value::Object(fields)) = item.get(block) else {
            continue;
        };
        for (key, value) in flatten_object(fields) {
            if value.is_array() {
                continue;
            }
            row.insert(format!("{prefix}_{}", camel_to_snake(&key)), value);
        }
    }

    // Order book levels: bid_ask_bid_1_price, bid_ask_bid_1_volume, ...
    for (ladder, side) in [("bidPrices", "bid"), ("askPrices", "ask")] {
        let Some(Value::Array(levels)) = item.get("bidAsk").and_then(|block| block.get(ladder)) else {
            continue;
        };
        for (level, entry) in levels.iter().enumerate() {
            for field in ["price", "volume"] {
                let value = entry.get(field).cloned().unwrap_or(Value::Null);
                row.insert(format!("bid_ask_{side}_{}_{field}", level + 1), value);
            }
        }
    }
    row
}

impl Provider for VciTrading {
    fn source(&self) -> &str {
        "vci"
    }

    fn symbol(&self) -> Option<&Symbol> {
        self.session.symbol.as_ref()
    }

    fn accepted_params(&self, _method: Method) -> ParamSet {
        ParamSet::empty()
    }

    fn price_board<'a>(&'a self, req: PriceBoardRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_price_board(req))
    }
}
