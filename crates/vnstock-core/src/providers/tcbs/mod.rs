//! TCBS public market-data endpoints.

mod company;
mod financial;
mod quote;
mod trading;

pub use company::TcbsCompany;
pub use financial::TcbsFinancial;
pub use quote::TcbsQuote;
pub use trading::TcbsTrading;

use crate::registry::ProviderRegistry;

const BASE_URL: &str = "https://apipubaws.tcbs.com.vn";
const STOCKS_PATH: &str = "stock-insight";
const FUTURES_PATH: &str = "futures-insight";
const ANALYSIS_PATH: &str = "tcanalysis";

pub fn register(registry: &mut ProviderRegistry) {
    registry.register(quote::descriptor());
    registry.register(company::descriptor());
    registry.register(financial::descriptor());
    registry.register(trading::descriptor());
}
