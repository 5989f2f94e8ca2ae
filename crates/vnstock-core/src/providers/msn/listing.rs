use std::sync::Arc;

use serde_json::{Map, Value};

use super::SEARCH_URL;
use crate::provider::{Capability, Method, MethodSet, Provider, SourceFuture};
use crate::providers::{path, Session};
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{Param, ParamSet, ProviderConfig, SearchRequest};
use crate::table::Table;
use crate::transform::{map_columns, ColumnMap};
use crate::{Source, SourceError, Symbol};

const SEARCH_MAP: ColumnMap = &[
    ("RT00S", "symbol"),
    ("SecId", "symbol_id"),
    ("AC040", "exchange_name"),
    ("LS01Z", "exchange_code_mic"),
    ("AC042", "short_name"),
    ("FriendlyName", "friendly_name"),
    ("RT0SN", "eng_name"),
    ("Description", "description"),
    ("OS0LN", "local_name"),
    ("locale", "locale"),
];

const METHODS: MethodSet = MethodSet::of(&[Method::SearchSymbolId]);
const INIT_PARAMS: ParamSet = ParamSet::of(&[Param::RandomAgent, Param::ShowLog, Param::Proxy]);

pub(super) fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(Capability::Listing, "msn", METHODS, INIT_PARAMS, |config, context| {
        Ok(Arc::new(MsnListing::new(&config, &context)?) as Arc<dyn Provider>)
    })
}

/// Instrument search resolving tickers to MSN ids, usable with the MSN quote
/// provider.
pub struct MsnListing {
    session: Session,
}

impl MsnListing {
    pub fn new(config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        Ok(Self {
            session: Session::new(Source::Msn, config, context)?,
        })
    }

    async fn fetch_search(&self, req: SearchRequest) -> Result<Table, SourceError> {
        let mut request = self
            .session
            .get(SEARCH_URL)
            .with_query("query", &req.query)
            .with_query("count", req.limit_or_default());
        if let Some(locale) = &req.locale {
            request = request.with_query("market", locale);
        }
        let payload = self.session.fetch(request, "search_symbol_id").await?;

        let Some(Value::Array(stocks)) = path(&payload, &["data", "stocks"]) else {
            return Err(SourceError::no_data(format!("msn found nothing for '{}'", req.query)));
        };
        // Each entry is a JSON document encoded as a string.
        let rows = stocks
            .iter()
            .map(|entry| match entry {
                Value::String(text) => serde_json::from_str::<Map<String, Value>>(text)
                    .map_err(|error| SourceError::internal(format!("msn search entry is not JSON: {error}"))),
                Value::Object(map) => Ok(map.clone()),
                other => Err(SourceError::internal(format!("unexpected msn search entry: {other}"))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut table = map_columns(&Table::from_json_rows(&rows), SEARCH_MAP);
        if let Some(locale) = &req.locale {
            table.retain_where("locale", |cell| cell.as_str() == Some(locale.as_str()));
        }
        if table.is_empty() {
            return Err(SourceError::no_data(format!("msn found nothing for '{}'", req.query)));
        }
        tracing::debug!(query = %req.query, rows = table.len(), "msn search");
        Ok(table.with_attrs(self.session.attrs(None, None)))
    }
}

impl Provider for MsnListing {
    fn source(&self) -> &str {
        "msn"
    }

    fn symbol(&self) -> Option<&Symbol> {
        None
    }

    fn accepted_params(&self, method: Method) -> ParamSet {
        match method {
            Method::SearchSymbolId => ParamSet::of(&[Param::Locale, Param::Limit]),
            _ => ParamSet::empty(),
        }
    }

    fn search_symbol_id<'a>(&'a self, req: SearchRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_search(req))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::providers::testing::Scripted;
    use crate::provider::SourceErrorKind;
    use crate::table::Cell;

    fn entry(symbol: &str, id: &str, locale: &str) -> Value {
        let document = json!({
            "RT00S": symbol, "SecId": id, "AC040": "HOSE", "LS01Z": "XSTC", "AC042": symbol,
            "FriendlyName": symbol, "RT0SN": "Vinamilk", "Description": "Dairy", "OS0LN": "Vinamilk",
            "locale": locale, "RT00T": "Stock"
        });
        Value::String(document.to_string())
    }

    fn search(http: &Arc<Scripted>) -> MsnListing {
        MsnListing::new(&ProviderConfig::new(), &ProviderContext::new(Arc::clone(http) as _)).expect("provider")
    }

    #[tokio::test]
    async fn string_encoded_entries_are_decoded_and_renamed() {
        let payload = json!({"data": {"stocks": [entry("VNM", "a1b2c3", "vi-vn"), entry("VNM", "z9y8x7", "en-us")]}});
        let http = Arc::new(Scripted::new([payload]));

        let table = search(&http)
            .search_symbol_id(SearchRequest::new("vnm").expect("query").with_limit(5))
            .await
            .expect("search");

        assert_eq!(table.len(), 2);
        assert_eq!(table.column_names()[..2], ["symbol", "symbol_id"]);
        assert!(!table.has_column("RT00T"));
        let sent = http.recorded().remove(0);
        assert_eq!(sent.query_value("query"), Some("vnm"));
        assert_eq!(sent.query_value("count"), Some("5"));
        assert_eq!(sent.query_value("market"), None);
    }

    #[tokio::test]
    async fn locale_filters_the_results() {
        let payload = json!({"data": {"stocks": [entry("VNM", "a1b2c3", "vi-vn"), entry("VNM", "z9y8x7", "en-us")]}});
        let http = Arc::new(Scripted::new([payload]));

        let table = search(&http)
            .search_symbol_id(SearchRequest::new("vnm").expect("query").with_locale("vi-vn"))
            .await
            .expect("search");

        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, "symbol_id"), Some(&Cell::Str(String::from("a1b2c3"))));
        assert_eq!(http.recorded()[0].query_value("market"), Some("vi-vn"));
    }

    #[tokio::test]
    async fn no_match_is_no_data() {
        let http = Arc::new(Scripted::new([json!({"data": {"stocks": []}})]));

        let err = search(&http)
            .search_symbol_id(SearchRequest::new("zzzz").expect("query"))
            .await
            .expect_err("nothing found");

        assert_eq!(err.kind(), SourceErrorKind::NoData);
    }
}
