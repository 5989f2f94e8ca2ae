//! Behavior-driven tests for result normalization
//!
//! These tests verify that different sources answer the same question with
//! the same table shape, whatever their upstream payloads look like.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use time::macros::{date, datetime};
use vnstock_core::{
    AssetType, Cell, Context, DType, Fund, FundType, HistoryRequest, HttpClient, HttpError, HttpRequest,
    HttpResponse, Interval, ListingRequest, Listing, ProviderRegistry, Quote, Table,
};

// =============================================================================
// Test doubles
// =============================================================================

/// Serves canned JSON bodies in order.
struct CannedHttp {
    bodies: Mutex<VecDeque<Value>>,
}

impl CannedHttp {
    fn new(bodies: impl IntoIterator<Item = Value>) -> Arc<Self> {
        Arc::new(Self {
            bodies: Mutex::new(bodies.into_iter().collect()),
        })
    }
}

impl HttpClient for CannedHttp {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            self.bodies
                .lock()
                .expect("lock")
                .pop_front()
                .map(|body| HttpResponse::ok_json(body.to_string()))
                .ok_or_else(|| HttpError::non_retryable("no canned body"))
        })
    }
}

fn context(http: Arc<CannedHttp>) -> Context {
    Context::new(ProviderRegistry::with_builtin_providers(), http)
}

fn schema(table: &Table) -> Vec<(String, Option<DType>)> {
    table
        .column_names()
        .into_iter()
        .map(|name| (name.to_owned(), table.dtype(name)))
        .collect()
}

fn vci_bars() -> Value {
    // 2024-01-02, 2024-01-03 and 2024-01-08 at 00:00 UTC
    json!([{
        "symbol": "ACB",
        "t": [1704153600, 1704240000, 1704672000],
        "o": [23500, 23600, 24000],
        "h": [23900, 23800, 24500],
        "l": [23400, 23300, 23900],
        "c": [23600, 23500, 24400],
        "v": [1000, 2000, 4000]
    }])
}

fn tcbs_bar(day: &str, close: i64) -> Value {
    json!({"tradingDate": format!("{day}T00:00:00.000Z"), "open": close, "high": close,
           "low": close, "close": close, "volume": 1500})
}

// =============================================================================
// Normalization: Cross-Source Schema
// =============================================================================

#[tokio::test]
async fn when_two_sources_serve_history_system_returns_the_same_schema() {
    // Given: VCI answers with parallel arrays and TCBS with row objects
    let vci = Quote::new(&context(CannedHttp::new([vci_bars()])), "vci", "ACB").expect("vci");
    let tcbs_payload = json!({"data": [tcbs_bar("2024-01-02", 23600), tcbs_bar("2024-01-03", 23500)]});
    let tcbs = Quote::new(&context(CannedHttp::new([tcbs_payload])), "tcbs", "ACB").expect("tcbs");

    // When: Both are asked for the same daily window
    let request = HistoryRequest::between(date!(2024 - 01 - 02), Some(date!(2024 - 01 - 03))).expect("range");
    let from_vci = vci.history(request.clone()).await.expect("vci history");
    let from_tcbs = tcbs.history(request).await.expect("tcbs history");

    // Then: Column names, order and types match
    assert_eq!(schema(&from_vci), schema(&from_tcbs));
    assert_eq!(
        from_vci.column_names(),
        vec!["time", "open", "high", "low", "close", "volume"]
    );
    assert_eq!(from_vci.dtype("time"), Some(DType::Datetime));
    assert_eq!(from_tcbs.dtype("close"), Some(DType::Float));
}

#[tokio::test]
async fn when_stock_prices_arrive_in_dong_system_reports_thousands() {
    // Given: VCI quotes stock prices in VND
    let quote = Quote::new(&context(CannedHttp::new([vci_bars()])), "vci", "acb").expect("quote");

    // When: Daily history is fetched
    let request = HistoryRequest::between(date!(2024 - 01 - 02), Some(date!(2024 - 01 - 08))).expect("range");
    let table = quote.history(request).await.expect("history");

    // Then: Prices are scaled and rows carry their metadata
    assert_eq!(table.len(), 3);
    assert_eq!(table.cell(0, "open"), Some(&Cell::Float(23.5)));
    assert_eq!(table.attrs().symbol.as_deref(), Some("ACB"));
    assert_eq!(table.attrs().source.as_deref(), Some("vci"));
    assert_eq!(table.attrs().category, Some(AssetType::Stock));
    assert_eq!(table.attrs().interval, Some(Interval::OneDay));
}

#[tokio::test]
async fn when_weekly_bars_are_requested_system_aggregates_daily_rows() {
    // Given: Three daily VCI bars spanning two calendar weeks
    let quote = Quote::new(&context(CannedHttp::new([vci_bars()])), "vci", "ACB").expect("quote");

    // When: Weekly history is fetched
    let request = HistoryRequest::between(date!(2024 - 01 - 01), Some(date!(2024 - 01 - 14)))
        .expect("range")
        .with_interval(Interval::OneWeek);
    let table = quote.history(request).await.expect("history");

    // Then: Bars are bucketed into weeks labelled by their Sunday
    assert_eq!(table.len(), 2);
    assert_eq!(table.cell(0, "time"), Some(&Cell::Datetime(datetime!(2024-01-07 0:00))));
    assert_eq!(table.cell(0, "open"), Some(&Cell::Float(23.5)));
    assert_eq!(table.cell(0, "high"), Some(&Cell::Float(23.9)));
    assert_eq!(table.cell(0, "close"), Some(&Cell::Float(23.5)));
    assert_eq!(table.cell(0, "volume"), Some(&Cell::Int(3000)));
    assert_eq!(table.cell(1, "time"), Some(&Cell::Datetime(datetime!(2024-01-14 0:00))));
}

#[tokio::test]
async fn when_count_back_is_set_system_keeps_the_latest_rows() {
    // Given: Three daily bars
    let quote = Quote::new(&context(CannedHttp::new([vci_bars()])), "vci", "ACB").expect("quote");

    // When: Only the last two are wanted
    let request = HistoryRequest::between(date!(2024 - 01 - 02), Some(date!(2024 - 01 - 08)))
        .expect("range")
        .with_count_back(2);
    let table = quote.history(request).await.expect("history");

    // Then: The oldest row is gone
    assert_eq!(table.len(), 2);
    assert_eq!(table.cell(1, "close"), Some(&Cell::Float(24.4)));
}

// =============================================================================
// Normalization: Listings
// =============================================================================

#[tokio::test]
async fn when_listing_by_exchange_system_uses_snake_case_columns() {
    // Given: VCI returns camelCase listing fields
    let payload = json!([
        {"id": 1, "symbol": "ACB", "type": "STOCK", "board": "HSX", "organName": "Ngân hàng Á Châu",
         "enOrganName": "Asia Commercial Bank", "organShortName": "ACB", "enOrganShortName": "ACB"}
    ]);
    let listing = Listing::new(&context(CannedHttp::new([payload])), "vci").expect("listing");

    // When: Symbols are listed by exchange
    let table = listing
        .symbols_by_exchange(ListingRequest::default())
        .await
        .expect("listing");

    // Then: Column names are snake_case with identity columns first
    assert_eq!(table.column_names()[0], "symbol");
    assert!(table.has_column("organ_name"));
    assert!(table.column_names().iter().all(|name| !name.chars().any(char::is_uppercase)));
}

// =============================================================================
// Normalization: Funds
// =============================================================================

#[tokio::test]
async fn when_funds_are_listed_system_flattens_nested_fields_and_ranks_by_three_year_return() {
    // Given: Fmarket nests asset type, owner and NAV changes inside each fund
    let fund = |id: i64, name: &str, nav_36m: f64| {
        json!({"id": id, "shortName": name, "name": name, "code": name, "nav": 25_000.0,
               "firstIssueAt": 1_704_153_600_000_i64, "dataFundAssetType": {"name": "Quỹ cân bằng"},
               "owner": {"name": "VinaCapital"}, "productNavChange": {"navTo36Months": nav_36m}})
    };
    let payload = json!({"data": {"total": 2, "rows": [fund(11, "VIBF", 8.0), fund(12, "VEOF", 21.5)]}});
    let funds = Fund::new(&context(CannedHttp::new([payload])), "fmarket").expect("fund");

    // When: Balanced funds are listed
    let table = funds.listing(Some(FundType::Balanced)).await.expect("funds");

    // Then: Nested fields become flat snake_case columns, best performer first
    assert_eq!(table.column_names()[..3], ["short_name", "name", "fund_type"]);
    assert_eq!(table.cell(0, "short_name"), Some(&Cell::Str(String::from("VEOF"))));
    assert_eq!(table.cell(1, "fund_owner_name"), Some(&Cell::Str(String::from("VinaCapital"))));
    assert_eq!(table.cell(0, "inception_date"), Some(&Cell::Date(date!(2024 - 01 - 02))));
    assert_eq!(table.attrs().source.as_deref(), Some("fmarket"));
}
