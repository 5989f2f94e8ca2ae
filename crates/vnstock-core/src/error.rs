use thiserror::Error;

/// Validation errors raised while parsing user input, before any network call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },
    #[error("symbol '{value}' is not a recognized stock, index, derivative, bond or covered warrant code")]
    UnrecognizedSymbol { value: String },

    #[error("invalid interval '{value}', expected one of 1m, 5m, 15m, 30m, 1H, 4H, 1D, 1W, 1M")]
    InvalidInterval { value: String },
    #[error("invalid source '{value}', expected one of {expected}")]
    InvalidSource { value: String, expected: String },
    #[error("invalid capability '{value}', expected one of quote, company, financial, listing, trading, fund")]
    InvalidCapability { value: String },

    #[error("invalid date '{value}', expected YYYY-MM-DD")]
    InvalidDate { value: String },
    #[error("start date {start} is after end date {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("invalid report period '{value}', expected 'year' or 'quarter'")]
    InvalidPeriod { value: String },
    #[error("invalid language '{value}', expected 'vi' or 'en'")]
    InvalidLang { value: String },
    #[error("invalid officer filter '{value}', expected 'working', 'resigned' or 'all'")]
    InvalidOfficerFilter { value: String },
    #[error("invalid fund type '{value}', expected 'balanced', 'bond' or 'stock'")]
    InvalidFundType { value: String },
    #[error("invalid group '{value}', expected one of {expected}")]
    InvalidGroup { value: String, expected: String },
    #[error("invalid proxy mode '{value}', expected try, rotate, random or single")]
    InvalidProxyMode { value: String },

    #[error("field '{field}' must be greater than zero")]
    ZeroValue { field: &'static str },
}

/// Failures of the normalization pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    #[error("no rows remain after normalization")]
    Empty,
    #[error("payload has unsupported shape: {0}")]
    UnsupportedShape(String),
    #[error("columnar payload has mismatched lengths: '{column}' has {found} values, expected {expected}")]
    RaggedColumns {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("missing required columns {missing:?}; available columns {available:?}")]
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },
    #[error("column '{column}' is not usable for {operation}")]
    InvalidColumn {
        column: String,
        operation: &'static str,
    },
}

/// Invalid values found while loading settings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {key} has invalid value '{value}': {reason}")]
    InvalidEnv {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
