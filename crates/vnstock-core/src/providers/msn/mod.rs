//! MSN Money charts for currencies, crypto and global indices, plus the
//! Bing instrument search that resolves their ids.

mod listing;
mod quote;

pub use listing::MsnListing;
pub use quote::{MsnAsset, MsnQuote};

use crate::registry::ProviderRegistry;

const BASE_URL: &str = "https://assets.msn.com/service/Finance";
const CONFIG_URL: &str = "https://assets.msn.com/resolver/api/resolve/v3/config/";
const SEARCH_URL: &str = "https://services.bingapis.com/contentservices-finance.csautosuggest/api/v1/Query";

pub fn register(registry: &mut ProviderRegistry) {
    registry.register(quote::descriptor());
    registry.register(listing::descriptor());
}
