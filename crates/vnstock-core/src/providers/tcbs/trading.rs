use std::sync::Arc;

use serde_json::Value;

use super::{BASE_URL, STOCKS_PATH};
use crate::provider::{Capability, Method, MethodSet, Provider, SourceFuture};
use crate::providers::Session;
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{Param, ParamSet, PriceBoardRequest, ProviderConfig};
use crate::table::Table;
use crate::transform::RawPayload;
use crate::{Source, SourceError, Symbol};

/// Board fields kept, with their display labels.
const BOARD_COLUMNS: &[(&str, &str)] = &[
    ("t", "Mã CP"),
    ("cp", "Giá"),
    ("nstv", "KLGD ròng(CM)"),
    ("nstp", "%KLGD ròng (CM)"),
    ("session", "Phiên +/- "),
    ("mw3d", "% thay đổi giá 3D"),
    ("mw1m", "% thay đổi giá 1M"),
    ("mw3m", "% thay đổi giá 3M"),
    ("mw1y", "% thay đổi giá 1Y"),
    ("hp1m", "Đỉnh 1M"),
    ("hp3m", "Đỉnh 3M"),
    ("hp1y", "Đỉnh 1Y"),
    ("lp1m", "Đáy 1M"),
    ("lp3m", "Đáy 3M"),
    ("lp1y", "Đáy 1Y"),
    ("hp1yp", "%Đỉnh 1Y"),
    ("lp1yp", "%Đáy 1Y"),
    ("pe", "P/E"),
    ("pb", "P/B"),
    ("roe", "ROE"),
    ("oscore", "TCRating"),
    ("av", "Khối lượng Dư bán"),
    ("bv", "Khối lượng Dư mua"),
    ("ev", "TCBS định giá"),
    ("hmp", "Khớp nhiều nhất"),
    ("mscore", "Đ.góp VNINDEX"),
    ("delta1m", "%Giá - %VNI (1M)"),
    ("delta1y", "%Giá - %VNI (1Y)"),
];

const METHODS: MethodSet = MethodSet::of(&[Method::PriceBoard]);
const INIT_PARAMS: ParamSet = ParamSet::of(&[Param::Symbol, Param::RandomAgent, Param::ShowLog, Param::Proxy]);

pub(super) fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(Capability::Trading, "tcbs", METHODS, INIT_PARAMS, |config, context| {
        Ok(Arc::new(TcbsTrading::new(&config, &context)?) as Arc<dyn Provider>)
    })
}

/// Price board with short-horizon performance and valuation fields.
pub struct TcbsTrading {
    session: Session,
}

impl TcbsTrading {
    pub fn new(config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        Ok(Self {
            session: Session::new(Source::Tcbs, config, context)?,
        })
    }

    async fn fetch_price_board(&self, req: PriceBoardRequest) -> Result<Table, SourceError> {
        let tickers = req
            .symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let request = self
            .session
            .get(format!("{BASE_URL}/{STOCKS_PATH}/v1/stock/second-tc-price"))
            .with_query("tickers", &tickers);
        let payload = self.session.fetch(request, "price_board").await?;

        let rows = match payload.get("data") {
            Some(rows @ Value::Array(_)) => rows.clone(),
            _ => return Err(SourceError::no_data(format!("tcbs has no board for {tickers}"))),
        };
        let table = RawPayload::detect(rows)?.into_table()?;
        if table.is_empty() {
            return Err(SourceError::no_data(format!("tcbs has no board for {tickers}")));
        }

        let keys: Vec<&str> = BOARD_COLUMNS.iter().map(|(key, _)| *key).collect();
        let mut table = table.select(&keys);
        table.rename(BOARD_COLUMNS);
        Ok(table.with_attrs(self.session.attrs(None, None)))
    }
}

impl Provider for TcbsTrading {
    fn source(&self) -> &str {
        "tcbs"
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

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::providers::testing::Scripted;
    use crate::table::Cell;

    #[tokio::test]
    async fn board_keeps_known_fields_under_labels() {
        let http = Arc::new(Scripted::new([json!({"data": [
            {"t": "ACB", "cp": 23500, "seq": 1, "pe": 6.5, "hp1y": 27000},
            {"t": "FPT", "cp": 120000, "seq": 2, "pe": 20.1, "hp1y": 135000}
        ]})]));
        let provider =
            TcbsTrading::new(&ProviderConfig::new(), &ProviderContext::new(Arc::clone(&http) as _)).expect("provider");

        let request = PriceBoardRequest::parse(&["ACB", "fpt"]).expect("symbols");
        let table = provider.price_board(request).await.expect("board");

        assert_eq!(table.column_names(), vec!["Mã CP", "Giá", "Đỉnh 1Y", "P/E"]);
        assert_eq!(table.cell(1, "Mã CP"), Some(&Cell::Str(String::from("FPT"))));
        assert_eq!(http.recorded()[0].query_value("tickers"), Some("ACB,FPT"));
    }

    #[tokio::test]
    async fn missing_data_is_no_data() {
        let http = Arc::new(Scripted::new([json!({"data": []})]));
        let provider = TcbsTrading::new(&ProviderConfig::new(), &ProviderContext::new(http as _)).expect("provider");

        let request = PriceBoardRequest::parse(&["ACB"]).expect("symbols");
        let err = provider.price_board(request).await.expect_err("empty");
        assert_eq!(err.kind(), crate::provider::SourceErrorKind::NoData);
    }
}
