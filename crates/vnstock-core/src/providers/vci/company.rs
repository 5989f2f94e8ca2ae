use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;

use super::GRAPHQL_URL;
use crate::provider::{Capability, Method, MethodSet, Provider, SourceErrorKind, SourceFuture};
use crate::providers::{classify, path, strip_markup, Session};
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{CompanyRequest, Param, ParamSet, ProviderConfig};
use crate::table::{Cell, DType, Table};
use crate::transform::{cast_cell, drop_columns_matching, snake_case_columns, RawPayload};
use crate::{AssetType, OfficerFilter, Source, SourceError, Symbol};

const COMPANY_QUERY: &str = r"query Query($ticker: String!, $lang: String!) {
  News(ticker: $ticker, langCode: $lang) {
    id organCode ticker newsTitle newsSubTitle friendlySubTitle newsImageUrl newsSourceLink
    createdAt publicDate updatedAt langCode newsId newsShortContent newsFullContent
    closePrice referencePrice floorPrice ceilingPrice percentPriceChange __typename
  }
  Subsidiary(ticker: $ticker) {
    id organCode subOrganCode percentage subOrListingInfo { enOrganName organName __typename } __typename
  }
  Affiliate(ticker: $ticker) {
    id organCode subOrganCode percentage subOrListingInfo { enOrganName organName __typename } __typename
  }
  CompanyListingInfo(ticker: $ticker) {
    id issueShare en_History history en_CompanyProfile companyProfile
    icbName3 enIcbName3 icbName2 enIcbName2 icbName4 enIcbName4
    financialRatio { id ticker issueShare charterCapital __typename }
    __typename
  }
  OrganizationManagers(ticker: $ticker) {
    id ticker fullName positionName positionShortName en_PositionName en_PositionShortName
    updateDate percentage quantity __typename
  }
  OrganizationShareHolders(ticker: $ticker) {
    id ticker ownerFullName en_OwnerFullName quantity percentage updateDate __typename
  }
  OrganizationResignedManagers(ticker: $ticker) {
    id ticker fullName positionName positionShortName en_PositionName en_PositionShortName
    updateDate percentage quantity __typename
  }
  OrganizationEvents(ticker: $ticker) {
    id organCode ticker eventTitle en_EventTitle publicDate issueDate sourceUrl eventListCode
    ratio value recordDate exrightDate eventListName en_EventListName __typename
  }
}";

const WORKING_LABEL: &str = "đang làm việc";
const RESIGNED_LABEL: &str = "đã từ nhiệm";
const SUBSIDIARY_LABEL: &str = "công ty con";
const AFFILIATE_LABEL: &str = "công ty liên kết";

const EVENT_DATE_COLUMNS: [&str; 4] = ["public_date", "issue_date", "record_date", "exright_date"];

const METHODS: MethodSet = MethodSet::of(&[
    Method::Overview,
    Method::Shareholders,
    Method::Officers,
    Method::Subsidiaries,
    Method::Affiliate,
    Method::Events,
    Method::News,
]);
const INIT_PARAMS: ParamSet = ParamSet::of(&[Param::Symbol, Param::RandomAgent, Param::ShowLog, Param::Proxy]);

pub(super) fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(Capability::Company, "vci", METHODS, INIT_PARAMS, |config, context| {
        Ok(Arc::new(VciCompany::new(&config, &context)?) as Arc<dyn Provider>)
    })
}

/// Company profile sections, all served from one GraphQL document.
///
/// The document is requested on the first call and reused for every
/// section afterwards.
pub struct VciCompany {
    session: Session,
    document: OnceCell<Value>,
}

impl VciCompany {
    pub fn new(config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        let session = Session::new(Source::Vci, config, context)?;
        match classify(session.symbol.as_ref())? {
            Some(AssetType::Stock) => {}
            Some(other) => {
                return Err(SourceError::invalid_request(format!(
                    "company data is only published for stocks, got {other}"
                )))
            }
            None => return Err(SourceError::invalid_request("vci company needs a symbol")),
        }
        Ok(Self {
            session,
            document: OnceCell::new(),
        })
    }

    async fn document(&self) -> Result<&Value, SourceError> {
        self.document
            .get_or_try_init(|| async {
                let symbol = self.session.symbol()?;
                let body = json!({
                    "query": COMPANY_QUERY,
                    "variables": { "ticker": symbol.as_str(), "lang": "vi" },
                });
                let request = self.session.post_json(GRAPHQL_URL, &body);
                let mut payload = self.session.fetch(request, "company").await?;
                match payload.get_mut("data").map(Value::take) {
                    Some(data @ Value::Object(_)) => Ok(data),
                    _ => Err(SourceError::internal("vci company response has no data object")),
                }
            })
            .await
    }

    async fn segment(&self, key: &str) -> Result<Table, SourceError> {
        let document = self.document().await?;
        let Some(value) = path(document, &[key]) else {
            return Err(self.empty(key));
        };
        let mut table = RawPayload::detect(value.clone())?.into_table()?;
        if table.is_empty() {
            return Err(self.empty(key));
        }
        snake_case_columns(&mut table);
        Ok(table)
    }

    fn empty(&self, section: &str) -> SourceError {
        let symbol = self.session.symbol.as_ref().map_or("", Symbol::as_str);
        SourceError::no_data(format!("vci has no {section} for {symbol}"))
    }

    fn finish(&self, table: Table) -> Table {
        table.with_attrs(self.session.attrs(None, Some(AssetType::Stock)))
    }

    async fn fetch_overview(&self) -> Result<Table, SourceError> {
        let document = self.document().await?;
        let Some(Value::Object(info)) = path(document, &["CompanyListingInfo"]) else {
            return Err(self.empty("CompanyListingInfo"));
        };

        let mut row = Map::new();
        for (key, value) in info {
            match (key.as_str(), value) {
                ("financialRatio", Value::Object(ratio)) => {
                    for (inner, value) in ratio {
                        if inner != "id" {
                            row.entry(inner.clone()).or_insert_with(|| strip_markup(value));
                        }
                    }
                }
                _ => {
                    row.insert(key.clone(), strip_markup(value));
                }
            }
        }

        let mut table = Table::from_json_rows(&[row]);
        snake_case_columns(&mut table);
        drop_columns_matching(&mut table, &["en_", "__"], &[]);
        table.rename(&[("ticker", "symbol")]);
        table.reorder_first(&["symbol"]);
        Ok(self.finish(table))
    }

    async fn fetch_shareholders(&self) -> Result<Table, SourceError> {
        let mut table = self.segment("OrganizationShareHolders").await?;
        drop_columns_matching(&mut table, &["en_", "__"], &["ticker"]);
        epoch_ms_to_date(&mut table, "update_date");
        table.rename(&[("owner_full_name", "share_holder"), ("percentage", "share_own_percent")]);
        Ok(self.finish(table))
    }

    async fn fetch_officers(&self, req: CompanyRequest) -> Result<Table, SourceError> {
        let mut table = match req.filter_by.unwrap_or_default() {
            OfficerFilter::Working => self.segment("OrganizationManagers").await?,
            OfficerFilter::Resigned => self.segment("OrganizationResignedManagers").await?,
            OfficerFilter::All => {
                let labelled = |mut table: Table, label: &str| {
                    let cells = vec![Cell::Str(label.to_owned()); table.len()];
                    table.set_column("type", DType::Str, cells);
                    table
                };
                let mut parts = Vec::new();
                for (key, label) in [
                    ("OrganizationManagers", WORKING_LABEL),
                    ("OrganizationResignedManagers", RESIGNED_LABEL),
                ] {
                    match self.segment(key).await {
                        Ok(table) => parts.push(labelled(table, label)),
                        Err(error) if error.kind() == SourceErrorKind::NoData => {}
                        Err(error) => return Err(error),
                    }
                }
                if parts.is_empty() {
                    return Err(self.empty("officers"));
                }
                Table::concat(parts)
            }
        };

        drop_columns_matching(&mut table, &["en_", "__"], &["ticker"]);
        table.rename(&[
            ("full_name", "officer_name"),
            ("position_name", "officer_position"),
            ("percentage", "officer_own_percent"),
        ]);
        epoch_ms_to_date(&mut table, "update_date");
        Ok(self.finish(table))
    }

    /// Subsidiary or affiliate rows, `None` when the section is empty.
    async fn related(&self, key: &str) -> Result<Option<Table>, SourceError> {
        let document = self.document().await?;
        let Some(Value::Array(items)) = path(document, &[key]) else {
            return Ok(None);
        };
        let rows: Vec<Map<String, Value>> = items
            .iter()
            .filter_map(Value::as_object)
            .map(lift_listing_info)
            .collect();
        if rows.is_empty() {
            return Ok(None);
        }
        let mut table = Table::from_json_rows(&rows);
        snake_case_columns(&mut table);
        drop_columns_matching(&mut table, &["en_", "__"], &["organ_code"]);
        table.rename(&[("percentage", "ownership_percent")]);
        table.reorder_first(&["id", "sub_organ_code", "organ_name"]);
        Ok(Some(table))
    }

    async fn fetch_subsidiaries(&self) -> Result<Table, SourceError> {
        let mut parts = Vec::new();
        for (key, label) in [("Subsidiary", SUBSIDIARY_LABEL), ("Affiliate", AFFILIATE_LABEL)] {
            if let Some(mut table) = self.related(key).await? {
                let cells = vec![Cell::Str(label.to_owned()); table.len()];
                table.set_column("type", DType::Str, cells);
                parts.push(table);
            }
        }
        if parts.is_empty() {
            return Err(self.empty("subsidiaries"));
        }
        Ok(self.finish(Table::concat(parts)))
    }

    async fn fetch_affiliate(&self) -> Result<Table, SourceError> {
        match self.related("Affiliate").await? {
            Some(table) => Ok(self.finish(table)),
            None => Err(self.empty("affiliates")),
        }
    }

    async fn fetch_news(&self) -> Result<Table, SourceError> {
        let mut table = self.segment("News").await?;
        drop_columns_matching(&mut table, &["__"], &["organ_code", "ticker"]);
        Ok(self.finish(table))
    }

    async fn fetch_events(&self) -> Result<Table, SourceError> {
        let mut table = self.segment("OrganizationEvents").await?;
        drop_columns_matching(&mut table, &["__"], &["organ_code", "ticker"]);
        for column in EVENT_DATE_COLUMNS {
            epoch_ms_to_date(&mut table, column);
        }
        Ok(self.finish(table))
    }
}

// Subsidiary rows nest the company name under `subOrListingInfo`.
fn lift_listing_info(item: &Map<String, Value>) -> Map<String, Value> {
    let mut row = Map::new();
    for (key, value) in item {
        match (key.as_str(), value) {
            ("subOrListingInfo", Value::Object(info)) => {
                for (inner, value) in info {
                    row.entry(inner.clone()).or_insert_with(|| value.clone());
                }
            }
            _ => {
                row.insert(key.clone(), value.clone());
            }
        }
    }
    row
}

fn epoch_ms_to_date(table: &mut Table, column: &str) {
    table.map_column(column, DType::Date, |cell| {
        cast_cell(cell, DType::Date).unwrap_or(Cell::Null)
    });
}

impl Provider for VciCompany {
    fn source(&self) -> &str {
        "vci"
    }

    fn symbol(&self) -> Option<&Symbol> {
        self.session.symbol.as_ref()
    }

    fn accepted_params(&self, method: Method) -> ParamSet {
        match method {
            Method::Officers => ParamSet::of(&[Param::FilterBy]),
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

    fn subsidiaries<'a>(&'a self, _req: CompanyRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_subsidiaries())
    }

    fn affiliate<'a>(&'a self, _req: CompanyRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_affiliate())
    }

    fn events<'a>(&'a self, _req: CompanyRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_events())
    }

    fn news<'a>(&'a self, _req: CompanyRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_news())
    }
}
