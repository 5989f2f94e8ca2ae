use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::{NAV_HISTORY_URL, PRODUCTS_URL};
use crate::domain::dates::today_vn;
use crate::provider::{Capability, Method, MethodSet, Provider, SourceFuture};
use crate::providers::{path, Session};
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{FundRequest, Param, ParamSet, ProviderConfig};
use crate::table::{Cell, DType, Table};
use crate::transform::{cast_cell, flatten_object, map_columns, ColumnMap};
use crate::{FundType, Source, SourceError, Symbol};

const LISTING_MAP: ColumnMap = &[
    ("shortName", "short_name"),
    ("name", "name"),
    ("dataFundAssetType_name", "fund_type"),
    ("owner_name", "fund_owner_name"),
    ("managementFee", "management_fee"),
    ("firstIssueAt", "inception_date"),
    ("nav", "nav"),
    ("productNavChange_navToPrevious", "nav_change_previous"),
    ("productNavChange_navToLastYear", "nav_change_last_year"),
    ("productNavChange_navToBeginning", "nav_change_inception"),
    ("productNavChange_navTo1Months", "nav_change_1m"),
    ("productNavChange_navTo3Months", "nav_change_3m"),
    ("productNavChange_navTo6Months", "nav_change_6m"),
    ("productNavChange_navTo12Months", "nav_change_12m"),
    ("productNavChange_navTo24Months", "nav_change_24m"),
    ("productNavChange_navTo36Months", "nav_change_36m"),
    ("productNavChange_annualizedReturn36Months", "nav_change_36m_annualized"),
    ("productNavChange_updateAt", "nav_update_at"),
    ("id", "fund_id_fmarket"),
    ("code", "fund_code"),
    ("vsdFeeId", "vsd_fee_id"),
];

const FILTER_MAP: ColumnMap = &[("id", "id"), ("shortName", "short_name")];

const TOP_HOLDING_MAP: ColumnMap = &[
    ("stockCode", "stock_code"),
    ("industry", "industry"),
    ("netAssetPercent", "net_asset_percent"),
    ("type", "type_asset"),
    ("updateAt", "update_at"),
];

const INDUSTRY_MAP: ColumnMap = &[("industry", "industry"), ("assetPercent", "net_asset_percent")];

const NAV_MAP: ColumnMap = &[("navDate", "date"), ("nav", "nav_per_unit")];

const ASSET_MAP: ColumnMap = &[("assetPercent", "asset_percent"), ("assetType_name", "asset_type")];

const PRODUCT_TYPES: [&str; 2] = ["NEW_FUND", "TRADING_FUND"];
const PAGE_SIZE: usize = 100;

const METHODS: MethodSet = MethodSet::of(&[
    Method::FundListing,
    Method::FundFilter,
    Method::TopHolding,
    Method::IndustryHolding,
    Method::NavReport,
    Method::AssetHolding,
]);
const INIT_PARAMS: ParamSet = ParamSet::of(&[Param::RandomAgent, Param::ShowLog, Param::Proxy]);

pub(super) fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(Capability::Fund, "fmarket", METHODS, INIT_PARAMS, |config, context| {
        Ok(Arc::new(FmarketFund::new(&config, &context)?) as Arc<dyn Provider>)
    })
}

/// Open-ended funds listed on Fmarket.
///
/// Detail sections take a fund short name; its Fmarket id is looked up
/// through the filter endpoint before each call.
pub struct FmarketFund {
    session: Session,
}

/// A fund resolved to its Fmarket id.
struct ResolvedFund {
    name: String,
    id: i64,
}

impl FmarketFund {
    pub fn new(config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        Ok(Self {
            session: Session::new(Source::Fmarket, config, context)?,
        })
    }

    fn finish(&self, table: Table, fund: Option<&ResolvedFund>) -> Table {
        let mut attrs = self.session.attrs(None, None);
        attrs.symbol = fund.map(|fund| fund.name.clone());
        table.with_attrs(attrs)
    }

    async fn search(&self, body: &Value, operation: &str) -> Result<Vec<Map<String, Value>>, SourceError> {
        let request = self.session.post_json(format!("{PRODUCTS_URL}/filter"), body);
        let payload = self.session.fetch(request, operation).await?;
        if let Some(total) = path(&payload, &["data", "total"]) {
            tracing::debug!(operation, total = %total, "fmarket funds");
        }
        Ok(object_rows(path(&payload, &["data", "rows"])))
    }

    async fn fetch_listing(&self, req: FundRequest) -> Result<Table, SourceError> {
        let rows = self.search(&listing_body(req.fund_type), "fund_listing").await?;
        if rows.is_empty() {
            return Err(SourceError::no_data("fmarket listed no funds"));
        }
        let mut table = map_columns(&Table::from_json_rows(&rows), LISTING_MAP);
        epoch_ms_to_date(&mut table, "inception_date");
        epoch_ms_to_date(&mut table, "nav_update_at");
        table.sort_by_column_desc("nav_change_36m");
        Ok(self.finish(table, None))
    }

    async fn fetch_filter(&self, req: FundRequest) -> Result<Table, SourceError> {
        let search = req.fund.unwrap_or_default();
        let rows = self.search(&filter_body(&search), "fund_filter").await?;
        if rows.is_empty() {
            return Err(SourceError::no_data(format!("fmarket has no fund matching '{search}'")));
        }
        Ok(self.finish(map_columns(&Table::from_json_rows(&rows), FILTER_MAP), None))
    }

    async fn resolve(&self, req: &FundRequest) -> Result<ResolvedFund, SourceError> {
        let Some(name) = req.fund.as_deref() else {
            return Err(SourceError::invalid_request("fmarket fund details need a fund short name"));
        };
        let rows = self.search(&filter_body(name), "fund_filter").await?;
        let id = rows
            .iter()
            .find(|row| {
                row.get("shortName")
                    .and_then(Value::as_str)
                    .is_some_and(|short| short.eq_ignore_ascii_case(name))
            })
            .and_then(|row| row.get("id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| SourceError::no_data(format!("fmarket has no fund named {name}")))?;
        tracing::debug!(fund = name, id, "fmarket fund resolved");
        Ok(ResolvedFund {
            name: name.to_owned(),
            id,
        })
    }

    async fn product(&self, fund: &ResolvedFund, operation: &str) -> Result<Value, SourceError> {
        let request = self.session.get(format!("{PRODUCTS_URL}/{}", fund.id));
        self.session.fetch(request, operation).await
    }

    async fn fetch_top_holding(&self, req: FundRequest) -> Result<Table, SourceError> {
        let fund = self.resolve(&req).await?;
        let payload = self.product(&fund, "top_holding").await?;

        let mut parts = Vec::new();
        for key in ["productTopHoldingList", "productTopHoldingBondList"] {
            let rows = object_rows(path(&payload, &["data", key]));
            if !rows.is_empty() {
                let mut table = map_columns(&Table::from_json_rows(&rows), TOP_HOLDING_MAP);
                epoch_ms_to_date(&mut table, "update_at");
                parts.push(table);
            }
        }
        if parts.is_empty() {
            return Err(SourceError::no_data(format!("fmarket lists no holdings for {}", fund.name)));
        }
        let mut table = Table::concat(parts);
        let ids = vec![Cell::Int(fund.id); table.len()];
        table.set_column("fund_id", DType::Int, ids);
        Ok(self.labelled(table, &fund))
    }

    async fn fetch_industry_holding(&self, req: FundRequest) -> Result<Table, SourceError> {
        let fund = self.resolve(&req).await?;
        let payload = self.product(&fund, "industry_holding").await?;
        let rows = object_rows(path(&payload, &["data", "productIndustriesHoldingList"]));
        if rows.is_empty() {
            return Err(SourceError::no_data(format!("fmarket lists no industries for {}", fund.name)));
        }
        let table = map_columns(&Table::from_json_rows(&rows), INDUSTRY_MAP);
        Ok(self.labelled(table, &fund))
    }

    async fn fetch_asset_holding(&self, req: FundRequest) -> Result<Table, SourceError> {
        let fund = self.resolve(&req).await?;
        let payload = self.product(&fund, "asset_holding").await?;
        let rows = object_rows(path(&payload, &["data", "productAssetHoldingList"]));
        if rows.is_empty() {
            return Err(SourceError::no_data(format!("fmarket lists no assets for {}", fund.name)));
        }
        let table = map_columns(&Table::from_json_rows(&rows), ASSET_MAP);
        Ok(self.labelled(table, &fund))
    }

    async fn fetch_nav_report(&self, req: FundRequest) -> Result<Table, SourceError> {
        let fund = self.resolve(&req).await?;
        let today = today_vn();
        let body = json!({
            "isAllData": 1,
            "productId": fund.id,
            "fromDate": null,
            "toDate": format!("{:04}{:02}{:02}", today.year(), u8::from(today.month()), today.day()),
        });
        let request = self.session.post_json(NAV_HISTORY_URL, &body);
        let payload = self.session.fetch(request, "nav_report").await?;
        let rows = object_rows(path(&payload, &["data"]));
        if rows.is_empty() {
            return Err(SourceError::no_data(format!("fmarket has no NAV history for {}", fund.name)));
        }
        let mut table = map_columns(&Table::from_json_rows(&rows), NAV_MAP);
        table.map_column("date", DType::Date, |cell| cast_cell(cell, DType::Date).unwrap_or(Cell::Null));
        Ok(self.labelled(table, &fund))
    }

    fn labelled(&self, mut table: Table, fund: &ResolvedFund) -> Table {
        let names = vec![Cell::Str(fund.name.clone()); table.len()];
        table.set_column("short_name", DType::Str, names);
        self.finish(table, Some(fund))
    }
}

fn listing_body(fund_type: Option<FundType>) -> Value {
    let asset_types: Vec<&str> = fund_type.map(FundType::code).into_iter().collect();
    json!({
        "types": PRODUCT_TYPES,
        "issuerIds": [],
        "sortOrder": "DESC",
        "sortField": "navTo6Months",
        "page": 1,
        "pageSize": PAGE_SIZE,
        "isIpo": false,
        "fundAssetTypes": asset_types,
        "bondRemainPeriods": [],
        "searchField": "",
        "isBuyByReward": false,
        "thirdAppIds": [],
    })
}

fn filter_body(search: &str) -> Value {
    json!({
        "searchField": search.to_ascii_uppercase(),
        "types": PRODUCT_TYPES,
        "pageSize": PAGE_SIZE,
    })
}

/// Object entries of a JSON array, nested objects flattened to `parent_child` keys.
fn object_rows(value: Option<&Value>) -> Vec<Map<String, Value>> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).map(flatten_object).collect(),
        _ => Vec::new(),
    }
}

// Negative epochs mark unknown dates.
fn epoch_ms_to_date(table: &mut Table, column: &str) {
    table.map_column(column, DType::Date, |cell| match cell {
        Cell::Int(value) if *value < 0 => Cell::Null,
        Cell::Float(value) if *value < 0.0 => Cell::Null,
        other => cast_cell(other, DType::Date).unwrap_or(Cell::Null),
    });
}

impl Provider for FmarketFund {
    fn source(&self) -> &str {
        "fmarket"
    }

    fn symbol(&self) -> Option<&Symbol> {
        None
    }

    fn accepted_params(&self, method: Method) -> ParamSet {
        match method {
            Method::FundListing => ParamSet::of(&[Param::FundType]),
            Method::FundFilter
            | Method::TopHolding
            | Method::IndustryHolding
            | Method::NavReport
            | Method::AssetHolding => ParamSet::of(&[Param::Fund]),
            _ => ParamSet::empty(),
        }
    }

    fn fund_listing<'a>(&'a self, req: FundRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_listing(req))
    }

    fn fund_filter<'a>(&'a self, req: FundRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_filter(req))
    }

    fn top_holding<'a>(&'a self, req: FundRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_top_holding(req))
    }

    fn industry_holding<'a>(&'a self, req: FundRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_industry_holding(req))
    }

    fn nav_report<'a>(&'a self, req: FundRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_nav_report(req))
    }

    fn asset_holding<'a>(&'a self, req: FundRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_asset_holding(req))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::provider::SourceErrorKind;
    use crate::providers::testing::Scripted;

    fn fund_row(id: i64, short_name: &str, nav_36m: f64) -> Value {
        json!({
            "id": id, "shortName": short_name, "name": format!("Quỹ {short_name}"), "code": short_name,
            "managementFee": 1.5, "firstIssueAt": 1_704_153_600_000_i64, "nav": 30_000.0, "vsdFeeId": "F1",
            "dataFundAssetType": {"name": "Quỹ cổ phiếu"}, "owner": {"name": "SSIAM"},
            "productNavChange": {"navToPrevious": 0.1, "navTo36Months": nav_36m, "updateAt": -1}
        })
    }

    fn matches(rows: Vec<Value>) -> Value {
        json!({"data": {"total": rows.len(), "rows": rows}})
    }

    fn fund(http: &Arc<Scripted>) -> FmarketFund {
        FmarketFund::new(&ProviderConfig::new(), &ProviderContext::new(Arc::clone(http) as _)).expect("provider")
    }

    #[tokio::test]
    async fn listing_sorts_by_three_year_nav_change() {
        let http = Arc::new(Scripted::new([matches(vec![
            fund_row(23, "SSISCA", 12.0),
            fund_row(41, "VESAF", 30.0),
        ])]));

        let table = fund(&http)
            .fund_listing(FundRequest::default().with_fund_type(FundType::Stock))
            .await
            .expect("listing");

        assert_eq!(table.cell(0, "short_name"), Some(&Cell::Str(String::from("VESAF"))));
        assert_eq!(table.cell(0, "fund_type"), Some(&Cell::Str(String::from("Quỹ cổ phiếu"))));
        assert_eq!(table.cell(1, "fund_owner_name"), Some(&Cell::Str(String::from("SSIAM"))));
        assert_eq!(table.cell(0, "inception_date"), Some(&Cell::Date(date!(2024 - 01 - 02))));
        assert_eq!(table.cell(0, "nav_update_at"), Some(&Cell::Null));
        let sent = http.recorded().remove(0);
        assert!(sent.url.ends_with("/products/filter"));
        assert_eq!(sent.json_body().expect("body")["fundAssetTypes"], json!(["STOCK"]));
    }

    #[tokio::test]
    async fn top_holdings_merge_stocks_and_bonds() {
        let product = json!({"data": {
            "productTopHoldingList": [
                {"stockCode": "FPT", "industry": "Công nghệ", "netAssetPercent": 8.1, "type": "STOCK", "updateAt": 1_704_153_600_000_i64},
                {"stockCode": "MWG", "industry": "Bán lẻ", "netAssetPercent": 6.4, "type": "STOCK", "updateAt": 1_704_153_600_000_i64}
            ],
            "productTopHoldingBondList": [
                {"stockCode": "VHM12101", "industry": "Bất động sản", "netAssetPercent": 2.0, "type": "BOND", "updateAt": 1_704_153_600_000_i64}
            ]
        }});
        let http = Arc::new(Scripted::new([matches(vec![fund_row(23, "SSISCA", 12.0)]), product]));

        let table = fund(&http)
            .top_holding(FundRequest::fund("ssisca").expect("fund"))
            .await
            .expect("holdings");

        assert_eq!(table.len(), 3);
        assert_eq!(
            table.column_names(),
            vec!["stock_code", "industry", "net_asset_percent", "type_asset", "update_at", "fund_id", "short_name"]
        );
        assert_eq!(table.cell(2, "fund_id"), Some(&Cell::Int(23)));
        assert_eq!(table.cell(2, "short_name"), Some(&Cell::Str(String::from("SSISCA"))));
        assert_eq!(table.attrs().symbol.as_deref(), Some("SSISCA"));
        let requests = http.recorded();
        assert_eq!(requests[0].json_body().expect("body")["searchField"], "SSISCA");
        assert!(requests[1].url.ends_with("/products/23"));
    }

    #[tokio::test]
    async fn nav_report_posts_the_fund_id_and_parses_dates() {
        let history = json!({"data": [
            {"navDate": "2024-01-02", "nav": 30_100.5, "productId": 23},
            {"navDate": "2024-01-03", "nav": 30_200.0, "productId": 23}
        ]});
        let http = Arc::new(Scripted::new([matches(vec![fund_row(23, "SSISCA", 12.0)]), history]));

        let table = fund(&http)
            .nav_report(FundRequest::fund("SSISCA").expect("fund"))
            .await
            .expect("nav");

        assert_eq!(table.column_names(), vec!["date", "nav_per_unit", "short_name"]);
        assert_eq!(table.cell(1, "date"), Some(&Cell::Date(date!(2024 - 01 - 03))));
        let body = http.recorded()[1].json_body().expect("body");
        assert_eq!(body["productId"], 23);
        assert_eq!(body["toDate"].as_str().map(str::len), Some(8));
    }

    #[tokio::test]
    async fn industry_and_asset_sections_come_from_the_product_document() {
        let product = json!({"data": {
            "productIndustriesHoldingList": [{"industry": "Ngân hàng", "assetPercent": 25.0}],
            "productAssetHoldingList": [{"assetPercent": 95.0, "assetType": {"name": "Cổ phiếu"}}]
        }});
        let search = matches(vec![fund_row(23, "SSISCA", 12.0)]);
        let http = Arc::new(Scripted::new([search.clone(), product.clone(), search, product]));
        let provider = fund(&http);

        let industries = provider
            .industry_holding(FundRequest::fund("SSISCA").expect("fund"))
            .await
            .expect("industries");
        let assets = provider
            .asset_holding(FundRequest::fund("SSISCA").expect("fund"))
            .await
            .expect("assets");

        assert_eq!(industries.cell(0, "net_asset_percent"), Some(&Cell::Float(25.0)));
        assert_eq!(assets.column_names(), vec!["asset_percent", "asset_type", "short_name"]);
        assert_eq!(assets.cell(0, "asset_type"), Some(&Cell::Str(String::from("Cổ phiếu"))));
    }

    #[tokio::test]
    async fn unknown_fund_is_no_data_after_one_search() {
        let http = Arc::new(Scripted::new([matches(vec![fund_row(41, "VESAF", 30.0)])]));

        let err = fund(&http)
            .top_holding(FundRequest::fund("SSISCA").expect("fund"))
            .await
            .expect_err("not listed");

        assert_eq!(err.kind(), SourceErrorKind::NoData);
        assert_eq!(http.recorded().len(), 1);
    }

    #[tokio::test]
    async fn details_without_a_fund_fail_before_any_request() {
        let http = Arc::new(Scripted::default());

        let err = fund(&http)
            .nav_report(FundRequest::default())
            .await
            .expect_err("no fund");

        assert_eq!(err.kind(), SourceErrorKind::InvalidRequest);
        assert!(http.recorded().is_empty());
    }

    #[tokio::test]
    async fn filter_returns_ids_and_short_names() {
        let http = Arc::new(Scripted::new([matches(vec![fund_row(23, "SSISCA", 12.0)])]));

        let table = fund(&http)
            .fund_filter(FundRequest::fund("ssi").expect("fund"))
            .await
            .expect("filter");

        assert_eq!(table.column_names(), vec!["id", "short_name"]);
        assert_eq!(table.cell(0, "id"), Some(&Cell::Int(23)));
    }
}
