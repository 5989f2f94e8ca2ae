use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Reporting frequency of financial statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    Year,
    #[default]
    Quarter,
}

impl ReportPeriod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Quarter => "quarter",
        }
    }
}

impl Display for ReportPeriod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportPeriod {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "year" | "y" | "annual" => Ok(Self::Year),
            "quarter" | "q" => Ok(Self::Quarter),
            other => Err(ValidationError::InvalidPeriod {
                value: other.to_owned(),
            }),
        }
    }
}

/// Response language for providers that localize labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    Vi,
    En,
}

impl Lang {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vi => "vi",
            Self::En => "en",
        }
    }
}

impl Display for Lang {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lang {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vi" => Ok(Self::Vi),
            "en" => Ok(Self::En),
            other => Err(ValidationError::InvalidLang {
                value: other.to_owned(),
            }),
        }
    }
}

/// Which officers to return from a company profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfficerFilter {
    #[default]
    Working,
    Resigned,
    All,
}

impl OfficerFilter {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Resigned => "resigned",
            Self::All => "all",
        }
    }
}

impl Display for OfficerFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfficerFilter {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "working" => Ok(Self::Working),
            "resigned" => Ok(Self::Resigned),
            "all" => Ok(Self::All),
            other => Err(ValidationError::InvalidOfficerFilter {
                value: other.to_owned(),
            }),
        }
    }
}

/// Asset class of an open-ended fund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundType {
    Balanced,
    Bond,
    Stock,
}

impl FundType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Bond => "bond",
            Self::Stock => "stock",
        }
    }

    /// Upstream asset-type code.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Balanced => "BALANCED",
            Self::Bond => "BOND",
            Self::Stock => "STOCK",
        }
    }
}

impl Display for FundType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FundType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "balanced" => Ok(Self::Balanced),
            "bond" => Ok(Self::Bond),
            "stock" => Ok(Self::Stock),
            other => Err(ValidationError::InvalidFundType {
                value: other.to_owned(),
            }),
        }
    }
}
