//! # Vnstock Core
//!
//! Provider registry, dynamic adapters and a normalization pipeline for
//! Vietnamese market data.
//!
//! ## Overview
//!
//! - **Provider registry** keyed by `(capability, source)`
//! - **Adapter** that checks method support before any I/O, drops options a
//!   provider does not accept and retries transient failures
//! - **Transform pipeline** turning heterogeneous JSON payloads into a uniform
//!   [`Table`] with stable column names and types
//! - **Facades** ([`Quote`], [`Company`], [`Finance`], [`Listing`],
//!   [`Trading`], [`Fund`]) and the [`Vnstock`] client
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapter`] | Registry lookup, capability checks, option filtering, retry |
//! | [`api`] | Public facades and the top-level client |
//! | [`config`] | Environment driven [`Settings`] |
//! | [`context`] | Shared registry, transport and retry policy |
//! | [`domain`] | Symbols, asset types, intervals and report options |
//! | [`error`] | Validation, transform and config errors |
//! | [`headers`] | Browser-like request headers per source |
//! | [`http_client`] | HTTP client abstraction |
//! | [`provider`] | Capabilities, methods and the [`Provider`] trait |
//! | [`providers`] | Built-in VCI, TCBS, MSN, KBS and Fmarket providers |
//! | [`registry`] | Provider descriptors and factories |
//! | [`request`] | Per-call options and constructor configuration |
//! | [`retry`] | Retry policy and backoff |
//! | [`source`] | Built-in source identifiers |
//! | [`table`] | Column-oriented result table |
//! | [`transform`] | Payload detection, renaming, casting and OHLC resampling |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vnstock_core::{HistoryRequest, Vnstock};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Vnstock::online();
//!     let quote = client.stock("ACB", "vci")?.quote()?;
//!
//!     let request = HistoryRequest::parse("2024-01-01", Some("2024-03-31"), "1D")?;
//!     let table = quote.history(request).await?;
//!     println!("{} rows, columns {:?}", table.len(), table.column_names());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Provider operations return [`SourceError`]:
//!
//! ```rust
//! use vnstock_core::{SourceError, SourceErrorKind};
//!
//! fn handle_error(error: SourceError) {
//!     match error.kind() {
//!         SourceErrorKind::UnsupportedMethod => {
//!             // The source does not publish this method
//!         }
//!         SourceErrorKind::NoData => {
//!             // Valid request, empty result
//!         }
//!         SourceErrorKind::InvalidRequest => {
//!             // Report to user
//!         }
//!         _ => {}
//!     }
//! }
//! ```

pub mod adapter;
pub mod api;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod headers;
pub mod http_client;
pub mod logging;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod request;
pub mod retry;
pub mod source;
pub mod table;
pub mod transform;

// Adapter and facades
pub use adapter::{Adapter, Call};
pub use api::{Company, Finance, Fund, Listing, Quote, Stock, Trading, Vnstock};

// Configuration and context
pub use config::Settings;
pub use context::Context;
pub use logging::init_tracing;

// Domain types
pub use domain::{AssetType, FundType, Interval, Lang, OfficerFilter, ReportPeriod, Symbol};

// Error types
pub use error::{ConfigError, TransformError, ValidationError};

// HTTP client types
pub use http_client::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, NoopHttpClient, ProxyConfig, ProxyMode,
    ReqwestHttpClient,
};

// Provider contracts
pub use provider::{Capability, Method, MethodSet, Provider, SourceError, SourceErrorKind, SourceFuture};
pub use registry::{ProviderContext, ProviderDescriptor, ProviderRegistry};
pub use request::{
    CompanyRequest, FundRequest, HistoryRequest, IntradayRequest, ListingRequest, Param, ParamSet,
    PriceBoardRequest, ProviderConfig, ReportRequest, SearchRequest,
};

// Retry logic
pub use retry::{Backoff, RetryPolicy};

// Source identifiers
pub use source::Source;

// Tables
pub use table::{Cell, Column, DType, Table, TableAttrs};
