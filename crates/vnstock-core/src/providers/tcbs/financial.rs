use std::sync::Arc;

use serde_json::Value;

use super::{ANALYSIS_PATH, BASE_URL};
use crate::provider::{Capability, Method, MethodSet, Provider, SourceFuture};
use crate::providers::{classify, Session};
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{Param, ParamSet, ProviderConfig, ReportRequest};
use crate::table::{Cell, DType, Table};
use crate::transform::{snake_case_columns, RawPayload};
use crate::{AssetType, ReportPeriod, Source, SourceError, Symbol};

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
    ProviderDescriptor::new(Capability::Financial, "tcbs", METHODS, INIT_PARAMS, |config, context| {
        Ok(Arc::new(TcbsFinancial::new(&config, &context)?) as Arc<dyn Provider>)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Report {
    BalanceSheet,
    IncomeStatement,
    CashFlow,
    Ratio,
}

impl Report {
    const fn endpoint(self) -> &'static str {
        match self {
            Self::BalanceSheet => "balancesheet",
            Self::IncomeStatement => "incomestatement",
            Self::CashFlow => "cashflow",
            Self::Ratio => "financialratio",
        }
    }

    const fn operation(self) -> &'static str {
        match self {
            Self::BalanceSheet => "balance_sheet",
            Self::IncomeStatement => "income_statement",
            Self::CashFlow => "cash_flow",
            Self::Ratio => "ratio",
        }
    }
}

const fn yearly_flag(period: ReportPeriod) -> u8 {
    match period {
        ReportPeriod::Year => 1,
        ReportPeriod::Quarter => 0,
    }
}

/// Financial statements and ratios, one row per reporting period.
pub struct TcbsFinancial {
    session: Session,
    period: ReportPeriod,
    get_all: bool,
}

impl TcbsFinancial {
    pub fn new(config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        let session = Session::new(Source::Tcbs, config, context)?;
        if classify(session.symbol.as_ref())? != Some(AssetType::Stock) {
            return Err(SourceError::invalid_request("tcbs financial reports need a stock symbol"));
        }
        Ok(Self {
            session,
            period: config.period.unwrap_or_default(),
            get_all: config.get_all.unwrap_or(true),
        })
    }

    async fn fetch_report(&self, report: Report, req: ReportRequest) -> Result<Table, SourceError> {
        let symbol = self.session.symbol()?;
        let period = req.period.unwrap_or(self.period);
        let get_all = req.get_all.unwrap_or(self.get_all);

        let request = self
            .session
            .get(format!(
                "{BASE_URL}/{ANALYSIS_PATH}/v1/finance/{symbol}/{}",
                report.endpoint()
            ))
            .with_query("yearly", yearly_flag(period))
            .with_query("isAll", get_all);
        let payload = self.session.fetch(request, report.operation()).await?;
        let rows = match payload {
            rows @ Value::Array(_) => rows,
            Value::Null => Value::Array(Vec::new()),
            other => return Err(SourceError::internal(format!("tcbs {} is not a list: {other}", report.operation()))),
        };
        let mut table = RawPayload::detect(rows)?.into_table()?;
        if table.is_empty() {
            return Err(SourceError::no_data(format!(
                "tcbs has no {} for {symbol}",
                report.operation()
            )));
        }

        table.drop_columns(&["ticker"]);
        if req.dropna.unwrap_or(true) {
            drop_null_columns(&mut table);
        }
        label_periods(&mut table, period);
        snake_case_columns(&mut table);
        tracing::debug!(%symbol, report = report.operation(), rows = table.len(), "tcbs financial report");
        Ok(table.with_attrs(self.session.attrs(None, Some(AssetType::Stock))))
    }
}

fn drop_null_columns(table: &mut Table) {
    let empty: Vec<String> = table
        .column_names()
        .into_iter()
        .filter(|name| {
            table
                .column(name)
                .is_some_and(|cells| cells.iter().all(|cell| matches!(cell, Cell::Null)))
        })
        .map(str::to_owned)
        .collect();
    let names: Vec<&str> = empty.iter().map(String::as_str).collect();
    table.drop_columns(&names);
}

fn label(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Int(value) => Some(value.to_string()),
        Cell::Float(value) => Some(format!("{value:.0}")),
        Cell::Str(text) => Some(text.clone()),
        _ => None,
    }
}

/// Yearly reports become `period = "2023"`; quarterly ones get a leading
/// `period = "2023-Q4"` column.
fn label_periods(table: &mut Table, period: ReportPeriod) {
    match period {
        ReportPeriod::Year => {
            table.drop_columns(&["quarter"]);
            table.map_column("year", DType::Str, |cell| label(cell).map_or(Cell::Null, Cell::Str));
            table.rename(&[("year", "period")]);
        }
        ReportPeriod::Quarter => {
            let labels: Vec<Cell> = (0..table.len())
                .map(|row| {
                    let year = table.cell(row, "year").and_then(label);
                    let quarter = table.cell(row, "quarter").and_then(label);
                    match (year, quarter) {
                        (Some(year), Some(quarter)) => Cell::Str(format!("{year}-Q{quarter}")),
                        _ => Cell::Null,
                    }
                })
                .collect();
            table.set_column("period", DType::Str, labels);
            table.reorder_first(&["period"]);
        }
    }
}

impl Provider for TcbsFinancial {
    fn source(&self) -> &str {
        "tcbs"
    }

    fn symbol(&self) -> Option<&Symbol> {
        self.session.symbol.as_ref()
    }

    fn accepted_params(&self, method: Method) -> ParamSet {
        match method {
            Method::BalanceSheet | Method::IncomeStatement | Method::CashFlow | Method::Ratio => {
                ParamSet::of(&[Param::Period, Param::Dropna, Param::GetAll])
            }
            _ => ParamSet::empty(),
        }
    }

    fn balance_sheet<'a>(&'a self, req: ReportRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_report(Report::BalanceSheet, req))
    }

    fn income_statement<'a>(&'a self, req: ReportRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_report(Report::IncomeStatement, req))
    }

    fn cash_flow<'a>(&'a self, req: ReportRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_report(Report::CashFlow, req))
    }

    fn ratio<'a>(&'a self, req: ReportRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_report(Report::Ratio, req))
    }
}
