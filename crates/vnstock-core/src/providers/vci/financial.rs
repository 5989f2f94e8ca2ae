use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use super::GRAPHQL_URL;
use crate::provider::{Capability, Method, MethodSet, Provider, SourceFuture};
use crate::providers::{classify, path, Session};
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{Param, ParamSet, ProviderConfig, ReportRequest};
use crate::table::{Cell, Table};
use crate::transform::{snake_case_columns, RawPayload};
use crate::{AssetType, Lang, ReportPeriod, Source, SourceError, Symbol};

const RATIO_QUERY: &str = r"query Query($ticker: String!, $period: String!) {
  CompanyFinancialRatio(ticker: $ticker, period: $period) {
    ratio {
      ticker yearReport lengthReport updateDate revenue revenueGrowth netProfit netProfitGrowth
      ebitMargin roe roic roa pe pb eps currentRatio cashRatio quickRatio interestCoverage ae
      netProfitMargin grossMargin ev issueShare ps pcf bvps evPerEbitda at fat acp dso dpo ccc
      de le ebitda ebit dividend charterCapital epsTTM __typename
    }
    period
    __typename
  }
}";

const STATEMENT_QUERY: &str = r"query Query($ticker: String!, $period: String!) {
  CompanyFinancialRatio(ticker: $ticker, period: $period) {
    ratio {
      ticker yearReport lengthReport updateDate
      BSA1 BSA2 BSA5 BSA8 BSA10 BSA159 BSA16 BSA22 BSA23 BSA24 BSA162 BSA27 BSA29 BSA43 BSA46 BSA50
      BSA209 BSA53 BSA54 BSA55 BSA56 BSA58 BSA67 BSA71 BSA173 BSA78 BSA79 BSA80 BSA175 BSA86 BSA90
      BSA96 BSA85 BSA89 BSA18 BSA40 BSA33 BSA95 BSA82 BSA210 BSA30 BSA84 BSA44 BSA15 BSA92 BSA94
      BSA47 BSA45 BSA48 BSA36 BSA49
      BSB97 BSB98 BSB99 BSB100 BSB101 BSB102 BSB103 BSB104 BSB105 BSB106 BSB107 BSB108 BSB109 BSB110
      BSB111 BSB112 BSB113 BSB114 BSB115 BSB116 BSB117 BSB118 BSB121
      ISA1 ISA2 ISA3 ISA4 ISA5 ISA6 ISA7 ISA8 ISA9 ISA10 ISA11 ISA12 ISA13 ISA14 ISA15 ISA16 ISA17
      ISA18 ISA19 ISA20 ISA21 ISA22 ISA23 ISA102
      ISB25 ISB26 ISB27 ISB28 ISB29 ISB30 ISB31 ISB32 ISB33 ISB34 ISB35 ISB36 ISB37 ISB38 ISB39 ISB40
      ISB41 ISS141 ISS146 ISS148 ISS152 ISI64 ISI87 ISI97
      CFA1 CFA2 CFA3 CFA4 CFA5 CFA6 CFA7 CFA8 CFA9 CFA10 CFA11 CFA12 CFA13 CFA14 CFA15 CFA16 CFA17
      CFA18 CFA19 CFA20 CFA21 CFA22 CFA23 CFA24 CFA25 CFA26 CFA27 CFA28 CFA29 CFA30 CFA31 CFA32 CFA33
      CFA34 CFA35 CFA36 CFA37 CFA38 CFS191 CFS200 CFS210 CFB64 CFB65 CFB80
      __typename
    }
    period
    __typename
  }
}";

const LABEL_QUERY: &str = r"query Query {
  ListFinancialRatio {
    id type name unit isDefault fieldName en_Type en_Name tagName comTypeCode order __typename
  }
}";

const LISTING_INFO_QUERY: &str = r"query Query($ticker: String!) {
  CompanyListingInfo(ticker: $ticker) { icbName4 __typename }
}";

/// Upstream index field, its English column and its Vietnamese column.
const INDEX_COLUMNS: &[(&str, &str, &str)] = &[
    ("ticker", "ticker", "CP"),
    ("yearReport", "year_report", "Năm"),
    ("lengthReport", "length_report", "Kỳ"),
];

/// Label set shared by every company type.
const GENERAL_COM_TYPE: &str = "CT";

const METHODS: MethodSet = MethodSet::of(&[
    Method::BalanceSheet,
    Method::IncomeStatement,
    Method::CashFlow,
    Method::Ratio,
]);
const INIT_PARAMS: ParamSet = ParamSet::of(&[
    Param::Symbol,
    Param::Period,
    Param::GetAll,
    Param::RandomAgent,
    Param::ShowLog,
    Param::Proxy,
]);

pub(super) fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(Capability::Financial, "vci", METHODS, INIT_PARAMS, |config, context| {
        Ok(Arc::new(VciFinancial::new(&config, &context)?) as Arc<dyn Provider>)
    })
}

fn period_code(period: ReportPeriod) -> &'static str {
    match period {
        ReportPeriod::Year => "Y",
        ReportPeriod::Quarter => "Q",
    }
}

/// Company type code selecting the statement layout for an ICB level-4 industry.
fn com_type_code(icb_name4: &str) -> &'static str {
    match icb_name4 {
        "Bảo hiểm nhân thọ" | "Bảo hiểm phi nhân thọ" | "Tái bảo hiểm" => "BH",
        "Môi giới chứng khoán" => "CK",
        "Ngân hàng" | "Quản lý tài sản" | "Tài chính cá nhân" => "NH",
        _ => GENERAL_COM_TYPE,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Statement {
    BalanceSheet,
    IncomeStatement,
    CashFlow,
}

impl Statement {
    /// Label group the statement's fields belong to.
    const fn group(self) -> &'static str {
        match self {
            Self::BalanceSheet => "Chỉ tiêu cân đối kế toán",
            Self::IncomeStatement => "Chỉ tiêu kết quả kinh doanh",
            Self::CashFlow => "Chỉ tiêu lưu chuyển tiền tệ",
        }
    }

    const fn method(self) -> Method {
        match self {
            Self::BalanceSheet => Method::BalanceSheet,
            Self::IncomeStatement => Method::IncomeStatement,
            Self::CashFlow => Method::CashFlow,
        }
    }
}

/// One row of the upstream field dictionary.
#[derive(Debug, Clone, Deserialize)]
struct FieldLabel {
    #[serde(rename = "fieldName")]
    field_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "en_Name", default)]
    en_name: Option<String>,
    #[serde(rename = "type", default)]
    group: Option<String>,
    #[serde(default)]
    order: Option<f64>,
    #[serde(rename = "comTypeCode", default)]
    com_type_code: Option<String>,
}

impl FieldLabel {
    fn label(&self, lang: Lang) -> &str {
        let name = match lang {
            Lang::Vi => self.name.as_deref(),
            Lang::En => self.en_name.as_deref(),
        };
        name.unwrap_or(&self.field_name)
    }
}

/// Fields of `statement` for a company type. Type-specific labels win over
/// the general ones; the result follows the upstream display order.
fn statement_fields<'a>(labels: &'a [FieldLabel], com_type: &str, statement: Statement) -> Vec<&'a FieldLabel> {
    let specific = labels
        .iter()
        .filter(|label| com_type != GENERAL_COM_TYPE && label.com_type_code.as_deref() == Some(com_type));
    let general = labels
        .iter()
        .filter(|label| label.com_type_code.as_deref() == Some(GENERAL_COM_TYPE));

    let mut chosen: Vec<&FieldLabel> = Vec::new();
    for label in specific.chain(general) {
        if !chosen.iter().any(|seen| seen.field_name == label.field_name) {
            chosen.push(label);
        }
    }
    chosen.retain(|label| label.group.as_deref() == Some(statement.group()));
    chosen.sort_by(|a, b| a.order.unwrap_or(0.0).total_cmp(&b.order.unwrap_or(0.0)));
    chosen
}

// Repeated labels get one leading underscore per earlier occurrence.
fn unique_label(label: String, used: &mut HashSet<String>) -> String {
    let mut candidate = label.clone();
    let mut prefix = String::new();
    while used.contains(&candidate) {
        prefix.push('_');
        candidate = format!("{prefix}{label}");
    }
    used.insert(candidate.clone());
    candidate
}

/// Financial statements and headline ratios per reporting period.
///
/// Statements share the ratio document; the company type and the field
/// dictionary that label it are fetched once per provider.
pub struct VciFinancial {
    session: Session,
    period: ReportPeriod,
    com_type: OnceCell<&'static str>,
    labels: OnceCell<Vec<FieldLabel>>,
}

impl VciFinancial {
    pub fn new(config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        let session = Session::new(Source::Vci, config, context)?;
        if classify(session.symbol.as_ref())? != Some(AssetType::Stock) {
            return Err(SourceError::invalid_request("vci financial reports need a stock symbol"));
        }
        Ok(Self {
            session,
            period: config.period.unwrap_or_default(),
            com_type: OnceCell::new(),
            labels: OnceCell::new(),
        })
    }

    async fn com_type(&self) -> Result<&'static str, SourceError> {
        let code = self
            .com_type
            .get_or_try_init(|| async {
                let symbol = self.session.symbol()?;
                let body = json!({
                    "query": LISTING_INFO_QUERY,
                    "variables": { "ticker": symbol.as_str() },
                });
                let request = self.session.post_json(GRAPHQL_URL, &body);
                let payload = self.session.fetch(request, "company_type").await?;
                let icb_name4 = path(&payload, &["data", "CompanyListingInfo", "icbName4"]).and_then(Value::as_str);
                if icb_name4.is_none() {
                    tracing::debug!(symbol = symbol.as_str(), "vci listing info has no icbName4, using general labels");
                }
                Ok::<_, SourceError>(icb_name4.map_or(GENERAL_COM_TYPE, com_type_code))
            })
            .await?;
        Ok(*code)
    }

    async fn labels(&self) -> Result<&[FieldLabel], SourceError> {
        let labels = self
            .labels
            .get_or_try_init(|| async {
                let body = json!({ "query": LABEL_QUERY, "variables": {} });
                let request = self.session.post_json(GRAPHQL_URL, &body);
                let payload = self.session.fetch(request, "financial_labels").await?;
                let Some(rows @ Value::Array(_)) = path(&payload, &["data", "ListFinancialRatio"]) else {
                    return Err(SourceError::no_data("vci returned no financial field labels"));
                };
                let labels: Vec<FieldLabel> = serde_json::from_value(rows.clone())
                    .map_err(|error| SourceError::internal(format!("vci field labels: {error}")))?;
                tracing::debug!(labels = labels.len(), "vci field labels");
                Ok(labels)
            })
            .await?;
        Ok(labels.as_slice())
    }

    async fn fetch_statement(&self, statement: Statement, req: ReportRequest) -> Result<Table, SourceError> {
        let com_type = self.com_type().await?;
        let labels = self.labels().await?;
        let symbol = self.session.symbol()?;
        let period = req.period.unwrap_or(self.period);
        let lang = req.lang.unwrap_or_default();

        let body = json!({
            "query": STATEMENT_QUERY,
            "variables": { "ticker": symbol.as_str(), "period": period_code(period) },
        });
        let request = self.session.post_json(GRAPHQL_URL, &body);
        let payload = self.session.fetch(request, statement.method().as_str()).await?;
        let Some(rows @ Value::Array(_)) = path(&payload, &["data", "CompanyFinancialRatio", "ratio"]) else {
            return Err(SourceError::no_data(format!("vci has no {} for {symbol}", statement.method())));
        };
        let raw = RawPayload::detect(rows.clone())?.into_table()?;
        if raw.is_empty() {
            return Err(SourceError::no_data(format!("vci has no {} for {symbol}", statement.method())));
        }

        let fields = statement_fields(labels, com_type, statement);
        let mut names: Vec<&str> = INDEX_COLUMNS.iter().map(|(field, _, _)| *field).collect();
        names.extend(fields.iter().map(|label| label.field_name.as_str()));
        let mut table = raw.select(&names);
        if table.width() <= INDEX_COLUMNS.len() {
            return Err(SourceError::no_data(format!(
                "vci returned no {} fields for {symbol}",
                statement.method()
            )));
        }

        let mut used = HashSet::new();
        table.rename_with(|field| {
            let label = match INDEX_COLUMNS.iter().find(|(code, _, _)| *code == field) {
                Some((_, en, vi)) => match lang {
                    Lang::Vi => (*vi).to_owned(),
                    Lang::En => (*en).to_owned(),
                },
                None => fields
                    .iter()
                    .find(|label| label.field_name == field)
                    .map_or(field, |label| label.label(lang))
                    .replace("(Tỷ đồng)", "(đồng)"),
            };
            unique_label(label, &mut used)
        });

        if period == ReportPeriod::Year {
            table.drop_columns(&["length_report", "Kỳ"]);
        }
        if req.dropna.unwrap_or(true) {
            drop_blank_columns(&mut table);
        }
        Ok(table.with_attrs(self.session.attrs(None, Some(AssetType::Stock))))
    }

    async fn fetch_ratio(&self, req: ReportRequest) -> Result<Table, SourceError> {
        let symbol = self.session.symbol()?;
        let period = req.period.unwrap_or(self.period);
        let body = json!({
            "query": RATIO_QUERY,
            "variables": { "ticker": symbol.as_str(), "period": period_code(period) },
        });
        let request = self.session.post_json(GRAPHQL_URL, &body);
        let payload = self.session.fetch(request, "ratio").await?;

        let Some(rows @ Value::Array(_)) = path(&payload, &["data", "CompanyFinancialRatio", "ratio"]) else {
            return Err(SourceError::no_data(format!("vci has no ratios for {symbol}")));
        };
        let mut table = RawPayload::detect(rows.clone())?.into_table()?;
        if table.is_empty() {
            return Err(SourceError::no_data(format!("vci has no ratios for {symbol}")));
        }

        snake_case_columns(&mut table);
        table.drop_columns(&["__typename"]);
        if period == ReportPeriod::Year {
            table.drop_columns(&["length_report"]);
        }
        if req.dropna.unwrap_or(true) {
            drop_blank_columns(&mut table);
        }
        if req.lang.unwrap_or_default() == Lang::Vi {
            let local: Vec<(&str, &str)> = INDEX_COLUMNS.iter().map(|(_, en, vi)| (*en, *vi)).collect();
            table.rename(&local);
        }
        Ok(table.with_attrs(self.session.attrs(None, Some(AssetType::Stock))))
    }
}

/// Drop columns where every cell is null or zero.
fn drop_blank_columns(table: &mut Table) {
    let blank: Vec<String> = table
        .column_names()
        .into_iter()
        .filter(|name| {
            table.column(name).is_some_and(|cells| {
                cells.iter().all(|cell| match cell {
                    Cell::Null => true,
                    Cell::Int(0) => true,
                    Cell::Float(value) => *value == 0.0,
                    _ => false,
                })
            })
        })
        .map(str::to_owned)
        .collect();
    let names: Vec<&str> = blank.iter().map(String::as_str).collect();
    table.drop_columns(&names);
}

impl Provider for VciFinancial {
    fn source(&self) -> &str {
        "vci"
    }

    fn symbol(&self) -> Option<&Symbol> {
        self.session.symbol.as_ref()
    }

    fn accepted_params(&self, method: Method) -> ParamSet {
        match method {
            Method::BalanceSheet | Method::IncomeStatement | Method::CashFlow | Method::Ratio => {
                ParamSet::of(&[Param::Period, Param::Lang, Param::Dropna])
            }
            _ => ParamSet::empty(),
        }
    }

    fn balance_sheet<'a>(&'a self, req: ReportRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_statement(Statement::BalanceSheet, req))
    }

    fn income_statement<'a>(&'a self, req: ReportRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_statement(Statement::IncomeStatement, req))
    }

    fn cash_flow<'a>(&'a self, req: ReportRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_statement(Statement::CashFlow, req))
    }

    fn ratio<'a>(&'a self, req: ReportRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_ratio(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::Scripted;

    fn payload() -> Value {
        json!({"data": {"CompanyFinancialRatio": {"ratio": [
            {"ticker": "ACB", "yearReport": 2023, "lengthReport": 4, "pe": 6.5, "roe": 0.24, "dividend": 0, "__typename": "R"},
            {"ticker": "ACB", "yearReport": 2023, "lengthReport": 3, "pe": 6.1, "roe": 0.23, "dividend": null, "__typename": "R"}
        ], "period": "Q"}}})
    }

    fn financial(http: &Arc<Scripted>) -> VciFinancial {
        let config = ProviderConfig::new().with_symbol(Symbol::parse("ACB").expect("symbol"));
        VciFinancial::new(&config, &ProviderContext::new(Arc::clone(http) as _)).expect("provider")
    }

    #[tokio::test]
    async fn ratio_snake_cases_and_drops_blank_columns() {
        let http = Arc::new(Scripted::new([payload()]));
        let provider = financial(&http);

        let table = provider
            .ratio(ReportRequest::default().with_lang(Lang::En))
            .await
            .expect("ratio");

        assert_eq!(table.len(), 2);
        assert!(table.has_column("year_report"));
        assert!(!table.has_column("dividend"));
        assert!(!table.has_column("__typename"));
        assert_eq!(http.recorded()[0].json_body().expect("body")["variables"]["period"], "Q");
    }

    #[tokio::test]
    async fn yearly_vietnamese_ratio_uses_local_index_names() {
        let http = Arc::new(Scripted::new([payload()]));
        let provider = financial(&http);

        let table = provider
            .ratio(ReportRequest::default().with_period(ReportPeriod::Year))
            .await
            .expect("ratio");

        assert_eq!(table.column_names()[..2], ["CP", "Năm"]);
        assert!(!table.has_column("Kỳ"));
        assert_eq!(http.recorded()[0].json_body().expect("body")["variables"]["period"], "Y");
    }

    const BALANCE: &str = "Chỉ tiêu cân đối kế toán";

    fn listing_info() -> Value {
        json!({"data": {"CompanyListingInfo": {"icbName4": "Ngân hàng", "__typename": "C"}}})
    }

    fn labels() -> Value {
        json!({"data": {"ListFinancialRatio": [
            {"fieldName": "BSA1", "name": "Tiền (Tỷ đồng)", "en_Name": "Cash", "type": BALANCE, "order": 2, "comTypeCode": "CT"},
            {"fieldName": "BSA1", "name": "Tiền mặt", "en_Name": "Cash on hand", "type": BALANCE, "order": 3, "comTypeCode": "NH"},
            {"fieldName": "BSB97", "name": "Tiền gửi tại NHNN", "en_Name": "Balances with the SBV", "type": BALANCE, "order": 1, "comTypeCode": "NH"},
            {"fieldName": "BSA2", "name": "Tiền gửi tại NHNN", "en_Name": "Deposits", "type": BALANCE, "order": 4, "comTypeCode": "CT"},
            {"fieldName": "BSA5", "name": "Dự phòng", "en_Name": "Provisions", "type": BALANCE, "order": 5, "comTypeCode": "CT"},
            {"fieldName": "BSS1", "name": "Chứng khoán", "en_Name": "Securities", "type": BALANCE, "order": 6, "comTypeCode": "CK"},
            {"fieldName": "ISA1", "name": "Doanh thu (Tỷ đồng)", "en_Name": "Revenue", "type": "Chỉ tiêu kết quả kinh doanh", "order": 1, "comTypeCode": "CT"},
            {"fieldName": "CFA1", "name": "Lưu chuyển tiền", "en_Name": "Net cash flow", "type": "Chỉ tiêu lưu chuyển tiền tệ", "order": 1, "comTypeCode": "CT"}
        ]}})
    }

    fn statements() -> Value {
        json!({"data": {"CompanyFinancialRatio": {"ratio": [
            {"ticker": "ACB", "yearReport": 2023, "lengthReport": 4, "BSA1": 100, "BSB97": 50, "BSA2": 7,
             "BSA5": 0, "BSS1": 3, "ISA1": 900, "CFA1": 10, "pe": 6.5, "__typename": "R"},
            {"ticker": "ACB", "yearReport": 2023, "lengthReport": 3, "BSA1": 90, "BSB97": 40, "BSA2": 6,
             "BSA5": null, "BSS1": 2, "ISA1": 800, "CFA1": 12, "pe": 6.1, "__typename": "R"}
        ], "period": "Q"}}})
    }

    #[test]
    fn icb_industries_map_to_statement_layouts() {
        assert_eq!(com_type_code("Ngân hàng"), "NH");
        assert_eq!(com_type_code("Tái bảo hiểm"), "BH");
        assert_eq!(com_type_code("Môi giới chứng khoán"), "CK");
        assert_eq!(com_type_code("Bất động sản"), "CT");
    }

    #[tokio::test]
    async fn bank_balance_sheet_uses_bank_labels_in_display_order() {
        let http = Arc::new(Scripted::new([listing_info(), labels(), statements()]));
        let provider = financial(&http);

        let table = provider
            .balance_sheet(ReportRequest::default())
            .await
            .expect("balance sheet");

        assert_eq!(
            table.column_names(),
            vec!["CP", "Năm", "Kỳ", "Tiền gửi tại NHNN", "Tiền mặt", "_Tiền gửi tại NHNN"]
        );
        assert_eq!(table.cell(0, "Tiền mặt"), Some(&Cell::Int(100)));
        assert_eq!(table.cell(1, "_Tiền gửi tại NHNN"), Some(&Cell::Int(6)));
        assert_eq!(http.recorded().len(), 3);
        assert_eq!(http.recorded()[0].json_body().expect("body")["variables"]["ticker"], "ACB");
    }

    #[tokio::test]
    async fn later_statements_reuse_the_company_type_and_labels() {
        let http = Arc::new(Scripted::new([listing_info(), labels(), statements(), statements(), statements()]));
        let provider = financial(&http);

        provider.balance_sheet(ReportRequest::default()).await.expect("balance sheet");
        let income = provider
            .income_statement(ReportRequest::default().with_period(ReportPeriod::Year))
            .await
            .expect("income statement");
        let cash_flow = provider
            .cash_flow(ReportRequest::default().with_lang(Lang::En))
            .await
            .expect("cash flow");

        assert_eq!(income.column_names(), vec!["CP", "Năm", "Doanh thu (đồng)"]);
        assert_eq!(cash_flow.column_names(), vec!["ticker", "year_report", "length_report", "Net cash flow"]);
        assert_eq!(cash_flow.cell(1, "Net cash flow"), Some(&Cell::Int(12)));
        assert_eq!(http.recorded().len(), 5);
        assert_eq!(http.recorded()[3].json_body().expect("body")["variables"]["period"], "Y");
    }

    #[tokio::test]
    async fn blank_statement_columns_survive_when_dropna_is_off() {
        let http = Arc::new(Scripted::new([listing_info(), labels(), statements()]));
        let provider = financial(&http);

        let table = provider
            .balance_sheet(ReportRequest::default().with_dropna(false).with_lang(Lang::En))
            .await
            .expect("balance sheet");

        assert!(table.has_column("Provisions"));
        assert!(!table.has_column("Securities"));
    }

    #[tokio::test]
    async fn missing_ratio_block_is_no_data() {
        let http = Arc::new(Scripted::new([json!({"data": {"CompanyFinancialRatio": null}})]));
        let provider = financial(&http);

        let err = provider.ratio(ReportRequest::default()).await.expect_err("no data");
        assert_eq!(err.kind(), crate::provider::SourceErrorKind::NoData);
    }
}
