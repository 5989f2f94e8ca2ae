//! Fmarket open-ended fund data.

mod fund;

pub use fund::FmarketFund;

use crate::registry::ProviderRegistry;

const PRODUCTS_URL: &str = "https://api.fmarket.vn/res/products";
const NAV_HISTORY_URL: &str = "https://api.fmarket.vn/res/product/get-nav-history";

pub fn register(registry: &mut ProviderRegistry) {
    registry.register(fund::descriptor());
}
