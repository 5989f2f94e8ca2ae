//! KB Securities chart data.

mod quote;

pub use quote::KbsQuote;

use crate::registry::ProviderRegistry;

const STOCKS_URL: &str = "https://kbbuddywts.kbsec.com.vn/iis-server/investment/stocks";

pub fn register(registry: &mut ProviderRegistry) {
    registry.register(quote::descriptor());
}
