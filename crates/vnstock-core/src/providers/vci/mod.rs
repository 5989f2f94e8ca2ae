//! Vietcap (VCI) trading and GraphQL endpoints.

mod company;
mod financial;
mod listing;
mod quote;
mod trading;

pub use company::VciCompany;
pub use financial::VciFinancial;
pub use listing::VciListing;
pub use quote::VciQuote;
pub use trading::VciTrading;

use crate::registry::ProviderRegistry;

const TRADING_URL: &str = "https://trading.vietcap.com.vn/api/";
const GRAPHQL_URL: &str = "https://trading.vietcap.com.vn/data-mt/graphql";

pub fn register(registry: &mut ProviderRegistry) {
    registry.register(quote::descriptor());
    registry.register(company::descriptor());
    registry.register(financial::descriptor());
    registry.register(listing::descriptor());
    registry.register(trading::descriptor());
}
