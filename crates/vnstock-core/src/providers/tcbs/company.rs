use std::sync::Arc;

use serde_json::Value;

use super::{ANALYSIS_PATH, BASE_URL};
use crate::provider::{Capability, Method, MethodSet, Provider, SourceFuture};
use crate::providers::{classify, strip_markup, Session};
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{CompanyRequest, Param, ParamSet, ProviderConfig};
use crate::table::{Cell, DType, Table};
use crate::transform::{cast_cell, snake_case_columns, RawPayload};
use crate::{AssetType, Source, SourceError, Symbol};

const OVERVIEW_FIELDS: &[&str] = &[
    "ticker",
    "exchange",
    "industry",
    "companyType",
    "noShareholders",
    "foreignPercent",
    "outstandingShare",
    "issueShare",
    "establishedYear",
    "noEmployees",
    "stockRating",
    "deltaInWeek",
    "deltaInMonth",
    "deltaInYear",
    "shortName",
    "website",
    "industryID",
    "industryIDv2",
];

const EVENT_DATE_COLUMNS: [&str; 4] = ["notify_date", "exer_date", "reg_final_date", "exer_right_date"];

const OFFICER_PAGE: usize = 20;
const SUBSIDIARY_PAGE: usize = 100;
const NEWS_PAGE: usize = 15;

const METHODS: MethodSet = MethodSet::of(&[
    Method::Overview,
    Method::Shareholders,
    Method::Officers,
    Method::Subsidiaries,
    Method::Events,
    Method::News,
]);
const INIT_PARAMS: ParamSet = ParamSet::of(&[Param::Symbol, Param::RandomAgent, Param::ShowLog, Param::Proxy]);

pub(super) fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(Capability::Company, "tcbs", METHODS, INIT_PARAMS, |config, context| {
        Ok(Arc::new(TcbsCompany::new(&config, &context)?) as Arc<dyn Provider>)
    })
}

/// Company sections from the TCBS analysis API, one request per section.
pub struct TcbsCompany {
    session: Session,
}

impl TcbsCompany {
    pub fn new(config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        let session = Session::new(Source::Tcbs, config, context)?;
        match classify(session.symbol.as_ref())? {
            Some(AssetType::Stock) => Ok(Self { session }),
            Some(other) => Err(SourceError::invalid_request(format!(
                "company data is only published for stocks, got {other}"
            ))),
            None => Err(SourceError::invalid_request("tcbs company needs a symbol")),
        }
    }

    fn url(&self, scope: &str, section: &str) -> Result<String, SourceError> {
        let symbol = self.session.symbol()?;
        Ok(format!("{BASE_URL}/{ANALYSIS_PATH}/v1/{scope}/{symbol}/{section}"))
    }

    fn finish(&self, table: Table) -> Table {
        table.with_attrs(self.session.attrs(None, Some(AssetType::Stock)))
    }

    /// Fetch one page of a `{ "listX": [...] }` section.
    async fn list_page(
        &self,
        scope: &str,
        section: &str,
        key: &str,
        page: Option<(usize, usize)>,
    ) -> Result<Vec<Value>, SourceError> {
        let mut request = self.session.get(self.url(scope, section)?);
        if let Some((page, size)) = page {
            request = request.with_query("page", page).with_query("size", size);
        }
        let payload = self.session.fetch(request, section).await?;
        match payload.get(key) {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Ok(Vec::new()),
        }
    }

    fn section_table(&self, items: Vec<Value>, section: &str) -> Result<Table, SourceError> {
        let table = RawPayload::detect(Value::Array(items))?.into_table()?;
        if table.is_empty() {
            let symbol = self.session.symbol.as_ref().map_or("", Symbol::as_str);
            return Err(SourceError::no_data(format!("tcbs has no {section} for {symbol}")));
        }
        Ok(table)
    }

    async fn fetch_overview(&self) -> Result<Table, SourceError> {
        let request = self.session.get(self.url("ticker", "overview")?);
        let payload = self.session.fetch(request, "overview").await?;
        let Value::Object(fields) = payload else {
            return Err(SourceError::internal("tcbs overview is not an object"));
        };
        if fields.is_empty() {
            return Err(SourceError::no_data("tcbs returned an empty overview"));
        }

        let table = RawPayload::detect(Value::Object(fields))?.into_table()?;
        let mut table = table.select(OVERVIEW_FIELDS);
        snake_case_columns(&mut table);
        table.rename(&[("industry_i_dv2", "industry_id_v2"), ("ticker", "symbol")]);
        Ok(self.finish(table))
    }

    async fn fetch_shareholders(&self) -> Result<Table, SourceError> {
        let items = self
            .list_page("company", "large-share-holders", "listShareHolder", None)
            .await?;
        let mut table = self.section_table(items, "shareholders")?;
        table.rename(&[("name", "share_holder"), ("ownPercent", "share_own_percent")]);
        table.drop_columns(&["no", "ticker"]);
        Ok(self.finish(table))
    }

    async fn fetch_officers(&self, req: CompanyRequest) -> Result<Table, SourceError> {
        let page = (req.page.unwrap_or(0), req.page_size.unwrap_or(OFFICER_PAGE));
        let items = self
            .list_page("company", "key-officers", "listKeyOfficer", Some(page))
            .await?;
        let mut table = self.section_table(items, "officers")?;
        table.rename(&[
            ("name", "officer_name"),
            ("position", "officer_position"),
            ("ownPercent", "officer_own_percent"),
        ]);
        table.sort_by_column_desc("officer_own_percent");
        table.drop_columns(&["no", "ticker"]);
        Ok(self.finish(table))
    }

    async fn fetch_subsidiaries(&self, req: CompanyRequest) -> Result<Table, SourceError> {
        let start = req.page.unwrap_or(0);
        let wanted = req.page_size.unwrap_or(SUBSIDIARY_PAGE);

        // Large requests are walked in upstream-sized pages.
        let mut items = Vec::new();
        let mut page = start;
        while items.len() < wanted {
            let size = SUBSIDIARY_PAGE.min(wanted - items.len());
            let batch = self
                .list_page("company", "sub-companies", "listSubCompany", Some((page, size)))
                .await?;
            let exhausted = batch.len() < size;
            items.extend(batch);
            if exhausted {
                break;
            }
            page += 1;
        }

        let mut table = self.section_table(items, "subsidiaries")?;
        table.rename(&[("companyName", "sub_company_name"), ("ownPercent", "sub_own_percent")]);
        table.drop_columns(&["no", "ticker"]);
        Ok(self.finish(table))
    }

    async fn fetch_events(&self, req: CompanyRequest) -> Result<Table, SourceError> {
        let page = (req.page.unwrap_or(0), req.page_size.unwrap_or(NEWS_PAGE));
        let items = self
            .list_page("ticker", "events-news", "listEventNews", Some(page))
            .await?;
        let mut table = self.section_table(items, "events")?;
        snake_case_columns(&mut table);
        table.rename(&[
            ("price_change_ratio1_m", "price_change_ratio_1m"),
            ("ex_rigth_date", "exer_right_date"),
        ]);
        table.map_column("event_desc", DType::Str, |cell| Cell::from_json(&strip_markup(&cell.to_json())));
        table.drop_columns(&["ticker"]);
        for column in EVENT_DATE_COLUMNS {
            table.map_column(column, DType::Date, |cell| cast_cell(cell, DType::Date).unwrap_or(Cell::Null));
        }
        Ok(self.finish(table))
    }

    async fn fetch_news(&self, req: CompanyRequest) -> Result<Table, SourceError> {
        let page = (req.page.unwrap_or(0), req.page_size.unwrap_or(NEWS_PAGE));
        let items = self
            .list_page("ticker", "activity-news", "listActivityNews", Some(page))
            .await?;
        let mut table = self.section_table(items, "news")?;
        snake_case_columns(&mut table);
        table.rename(&[("price_change_ratio1_m", "price_change_ratio_1m")]);
        table.drop_columns(&["ticker"]);
        Ok(self.finish(table))
    }
}

impl Provider for TcbsCompany {
    fn source(&self) -> &str {
        "tcbs"
    }

    fn symbol(&self) -> Option<&Symbol> {
        self.session.symbol.as_ref()
    }

    fn accepted_params(&self, method: Method) -> ParamSet {
        match method {
            Method::Officers | Method::Subsidiaries | Method::Events | Method::News => {
                ParamSet::of(&[Param::Page, Param::PageSize])
            }
            _ => ParamSet::empty(),
        }
    }

    fn overview<'a>(&'a self) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_overview())
    }

    fn shareholders<'a>(&'a self, _req: CompanyRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_shareholders())
    }

    fn officers<'a>(&'a self, req: CompanyRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_officers(req))
    }

    fn subsidiaries<'a>(&'a self, req: CompanyRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_subsidiaries(req))
    }

    fn events<'a>(&'a self, req: CompanyRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_events(req))
    }

    fn news<'a>(&'a self, req: CompanyRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_news(req))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::date;

    use super::*;
    use crate::providers::testing::Scripted;

    fn company(http: &Arc<Scripted>) -> TcbsCompany {
        let config = ProviderConfig::new().with_symbol(Symbol::parse("TCB").expect("symbol"));
        TcbsCompany::new(&config, &ProviderContext::new(Arc::clone(http) as _)).expect("provider")
    }

    #[tokio::test]
    async fn overview_keeps_profile_fields() {
        let http = Arc::new(Scripted::new([json!({
            "ticker": "TCB", "exchange": "HOSE", "industry": "Ngân hàng", "industryIDv2": "8355",
            "noEmployees": 11000, "irrelevant": true
        })]));
        let table = company(&http).overview().await.expect("overview");

        assert_eq!(table.column_names(), vec!["symbol", "exchange", "industry", "no_employees", "industry_id_v2"]);
        assert!(http.recorded()[0].url.ends_with("/tcanalysis/v1/ticker/TCB/overview"));
    }

    #[tokio::test]
    async fn officers_are_ranked_by_ownership() {
        let http = Arc::new(Scripted::new([json!({"listKeyOfficer": [
            {"no": 1, "ticker": "TCB", "name": "A", "position": "CEO", "ownPercent": 0.01},
            {"no": 2, "ticker": "TCB", "name": "B", "position": "Chair", "ownPercent": 0.05}
        ]})]));
        let table = company(&http)
            .officers(CompanyRequest::default())
            .await
            .expect("officers");

        assert_eq!(table.cell(0, "officer_name"), Some(&Cell::Str(String::from("B"))));
        assert!(!table.has_column("no"));
        assert_eq!(http.recorded()[0].query_value("size"), Some("20"));
    }

    #[tokio::test]
    async fn large_subsidiary_requests_are_paged() {
        let full: Vec<Value> = (0..100)
            .map(|n| json!({"no": n, "ticker": "TCB", "companyName": format!("Sub {n}"), "ownPercent": 1.0}))
            .collect();
        let http = Arc::new(Scripted::new([
            json!({ "listSubCompany": full }),
            json!({ "listSubCompany": [{"no": 100, "ticker": "TCB", "companyName": "Last", "ownPercent": 0.5}] }),
        ]));
        let table = company(&http)
            .subsidiaries(CompanyRequest::default().with_page_size(150))
            .await
            .expect("subsidiaries");

        assert_eq!(table.len(), 101);
        let requests = http.recorded();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].query_value("page"), Some("1"));
        assert_eq!(requests[1].query_value("size"), Some("50"));
    }

    #[tokio::test]
    async fn events_strip_markup_and_parse_dates() {
        let http = Arc::new(Scripted::new([json!({"listEventNews": [{
            "ticker": "TCB", "eventDesc": "<p>Trả cổ tức</p>", "priceChangeRatio1M": 0.02,
            "exRigthDate": "2024-05-10 00:00:00", "notifyDate": "2024-04-20 00:00:00"
        }]})]));
        let table = company(&http)
            .events(CompanyRequest::default())
            .await
            .expect("events");

        assert_eq!(table.cell(0, "event_desc"), Some(&Cell::Str(String::from("Trả cổ tức"))));
        assert_eq!(table.cell(0, "exer_right_date"), Some(&Cell::Date(date!(2024 - 05 - 10))));
        assert_eq!(table.cell(0, "notify_date"), Some(&Cell::Date(date!(2024 - 04 - 20))));
        assert!(table.has_column("price_change_ratio_1m"));
    }

    #[tokio::test]
    async fn missing_list_is_no_data() {
        let http = Arc::new(Scripted::new([json!({"listShareHolder": []})]));
        let err = company(&http)
            .shareholders(CompanyRequest::default())
            .await
            .expect_err("empty");
        assert_eq!(err.kind(), crate::provider::SourceErrorKind::NoData);
    }
}
