//! # Domain Types
//!
//! Validated value types shared by providers, adapters and the facade.
//!
//! ## Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Uppercased ticker code |
//! | [`AssetType`] | Index, stock, derivative, bond or covered warrant |
//! | [`Interval`] | OHLC bucket (1m .. 1M) |
//! | [`ReportPeriod`] | Yearly or quarterly statements |
//! | [`Lang`] | Response language |
//! | [`OfficerFilter`] | Working, resigned or all officers |
//! | [`FundType`] | Balanced, bond or stock fund |
//!
//! Dates are plain [`time::Date`] values; the [`dates`] helpers parse
//! `YYYY-MM-DD` input and convert epochs to exchange time (UTC+7).
//!
//! ```rust,ignore
//! use vnstock_core::{AssetType, Interval, Symbol};
//!
//! let symbol = Symbol::parse("vn30f1m")?;
//! assert_eq!(AssetType::classify(&symbol)?, AssetType::Derivative);
//! assert_eq!("M".parse::<Interval>()?, Interval::OneMonth);
//! ```

mod asset;
pub mod dates;
mod interval;
mod options;
mod symbol;

pub use asset::{AssetType, INDEX_CODES};
pub use interval::Interval;
pub use options::{FundType, Lang, OfficerFilter, ReportPeriod};
pub use symbol::Symbol;
