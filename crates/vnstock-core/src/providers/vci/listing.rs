use std::sync::Arc;

use serde_json::{json, Value};

use super::{GRAPHQL_URL, TRADING_URL};
use crate::provider::{Capability, Method, MethodSet, Provider, SourceFuture};
use crate::providers::{path, Session};
use crate::registry::{ProviderContext, ProviderDescriptor};
use crate::request::{ListingRequest, Param, ParamSet, ProviderConfig};
use crate::table::Table;
use crate::transform::{drop_columns_matching, snake_case_columns, RawPayload};
use crate::{Lang, Source, SourceError, Symbol, ValidationError};

/// Groups accepted by `symbols_by_group`.
pub const GROUP_CODES: &[&str] = &[
    "HOSE",
    "VN30",
    "VNMidCap",
    "VNSmallCap",
    "VNAllShare",
    "VN100",
    "ETF",
    "HNX",
    "HNX30",
    "HNXCon",
    "HNXFin",
    "HNXLCap",
    "HNXMSCap",
    "HNXMan",
    "UPCOM",
    "FU_INDEX",
    "FU_BOND",
    "BOND",
    "CW",
];

const DEFAULT_GROUP: &str = "VN30";

const INDUSTRY_QUERY: &str = r"{
  CompaniesListingInfo {
    ticker organName enOrganName icbName3 enIcbName3 icbName2 enIcbName2 icbName4 enIcbName4
    comTypeCode icbCode1 icbCode2 icbCode3 icbCode4 __typename
  }
}";

const ICB_QUERY: &str = "query Query { ListIcbCode { icbCode level icbName enIcbName __typename } }";

const METHODS: MethodSet = MethodSet::of(&[
    Method::AllSymbols,
    Method::SymbolsByExchange,
    Method::SymbolsByIndustries,
    Method::SymbolsByGroup,
    Method::IndustriesIcb,
]);
const INIT_PARAMS: ParamSet = ParamSet::of(&[Param::RandomAgent, Param::ShowLog, Param::Proxy]);

pub(super) fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(Capability::Listing, "vci", METHODS, INIT_PARAMS, |config, context| {
        Ok(Arc::new(VciListing::new(&config, &context)?) as Arc<dyn Provider>)
    })
}

/// Resolve a group name against [`GROUP_CODES`], ignoring case.
pub fn resolve_group(group: &str) -> Result<&'static str, ValidationError> {
    let wanted = group.trim();
    GROUP_CODES
        .iter()
        .find(|code| code.eq_ignore_ascii_case(wanted))
        .copied()
        .ok_or_else(|| ValidationError::InvalidGroup {
            value: wanted.to_owned(),
            expected: GROUP_CODES.join(", "),
        })
}

/// Market-wide symbol lists. Not bound to a symbol.
pub struct VciListing {
    session: Session,
}

impl VciListing {
    pub fn new(config: &ProviderConfig, context: &ProviderContext) -> Result<Self, SourceError> {
        Ok(Self {
            session: Session::new(Source::Vci, config, context)?,
        })
    }

    fn finish(&self, table: Table) -> Table {
        table.with_attrs(self.session.attrs(None, None))
    }

    async fn exchange_table(&self, lang: Lang) -> Result<Table, SourceError> {
        let request = self.session.get(format!("{TRADING_URL}price/symbols/getAll"));
        let payload = self.session.fetch(request, "symbols_by_exchange").await?;
        let mut table = RawPayload::detect(payload)?.into_table()?;
        if table.is_empty() {
            return Err(SourceError::no_data("vci returned an empty symbol list"));
        }
        tracing::debug!(rows = table.len(), "vci symbol list");

        snake_case_columns(&mut table);
        table.rename(&[("board", "exchange")]);
        table.reorder_first(&["symbol", "exchange", "type"]);
        table.drop_columns(&["id"]);
        localize(&mut table, lang, &["organ_name", "organ_short_name"]);
        Ok(table)
    }

    async fn fetch_symbols_by_exchange(&self, req: ListingRequest) -> Result<Table, SourceError> {
        let table = self.exchange_table(req.lang.unwrap_or_default()).await?;
        Ok(self.finish(table))
    }

    async fn fetch_all_symbols(&self) -> Result<Table, SourceError> {
        let mut table = self.exchange_table(Lang::Vi).await?;
        table.retain_where("type", |cell| cell.as_str() == Some("STOCK"));
        let table = table.select(&["symbol", "organ_name"]);
        if table.is_empty() {
            return Err(SourceError::no_data("vci listed no stocks"));
        }
        Ok(self.finish(table))
    }

    async fn fetch_symbols_by_industries(&self, req: ListingRequest) -> Result<Table, SourceError> {
        let body = json!({ "query": INDUSTRY_QUERY, "variables": {} });
        let request = self.session.post_json(GRAPHQL_URL, &body);
        let payload = self.session.fetch(request, "symbols_by_industries").await?;
        let Some(rows @ Value::Array(_)) = path(&payload, &["data", "CompaniesListingInfo"]) else {
            return Err(SourceError::no_data("vci returned no industry listing"));
        };
        let mut table = RawPayload::detect(rows.clone())?.into_table()?;
        if table.is_empty() {
            return Err(SourceError::no_data("vci returned no industry listing"));
        }

        snake_case_columns(&mut table);
        table.drop_columns(&["__typename"]);
        table.rename(&[("ticker", "symbol")]);
        localize(
            &mut table,
            req.lang.unwrap_or_default(),
            &["organ_name", "icb_name2", "icb_name3", "icb_name4"],
        );
        Ok(self.finish(table))
    }

    async fn fetch_industries_icb(&self) -> Result<Table, SourceError> {
        let body = json!({ "query": ICB_QUERY, "variables": {} });
        let request = self.session.post_json(GRAPHQL_URL, &body);
        let payload = self.session.fetch(request, "industries_icb").await?;
        let Some(rows @ Value::Array(_)) = path(&payload, &["data", "ListIcbCode"]) else {
            return Err(SourceError::no_data("vci returned no ICB codes"));
        };
        let mut table = RawPayload::detect(rows.clone())?.into_table()?;
        if table.is_empty() {
            return Err(SourceError::no_data("vci returned no ICB codes"));
        }

        snake_case_columns(&mut table);
        table.drop_columns(&["__typename"]);
        table.reorder_first(&["icb_name", "en_icb_name", "icb_code", "level"]);
        Ok(self.finish(table))
    }

    async fn fetch_symbols_by_group(&self, req: ListingRequest) -> Result<Table, SourceError> {
        let group = resolve_group(req.group.as_deref().unwrap_or(DEFAULT_GROUP))?;
        let request = self
            .session
            .get(format!("{TRADING_URL}price/symbols/getByGroup"))
            .with_query("group", group);
        let payload = self.session.fetch(request, "symbols_by_group").await?;
        let table = RawPayload::detect(payload)?.into_table()?.select(&["symbol"]);
        if table.is_empty() {
            return Err(SourceError::no_data(format!("vci group {group} has no symbols")));
        }
        Ok(self.finish(table))
    }
}

// Vietnamese keeps local names; English swaps in the `en_` columns.
fn localize(table: &mut Table, lang: Lang, local_columns: &[&str]) {
    match lang {
        Lang::Vi => drop_columns_matching(table, &["en_"], &[]),
        Lang::En => {
            table.drop_columns(local_columns);
            table.rename_with(|name| name.strip_prefix("en_").unwrap_or(name).to_owned());
        }
    }
}

impl Provider for VciListing {
    fn source(&self) -> &str {
        "vci"
    }

    fn symbol(&self) -> Option<&Symbol> {
        None
    }

    fn accepted_params(&self, method: Method) -> ParamSet {
        match method {
            Method::SymbolsByExchange | Method::SymbolsByIndustries => ParamSet::of(&[Param::Lang]),
            Method::SymbolsByGroup => ParamSet::of(&[Param::Group]),
            _ => ParamSet::empty(),
        }
    }

    fn all_symbols<'a>(&'a self) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_all_symbols())
    }

    fn symbols_by_exchange<'a>(&'a self, req: ListingRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_symbols_by_exchange(req))
    }

    fn symbols_by_industries<'a>(&'a self, req: ListingRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_symbols_by_industries(req))
    }

    fn symbols_by_group<'a>(&'a self, req: ListingRequest) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_symbols_by_group(req))
    }

    fn industries_icb<'a>(&'a self) -> SourceFuture<'a, Table> {
        Box::pin(self.fetch_industries_icb())
    }
}
