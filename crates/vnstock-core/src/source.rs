use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upstream data sources bundled with this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Vci,
    Tcbs,
    Msn,
    Kbs,
    Fmarket,
}

impl Source {
    pub const ALL: [Self; 5] = [Self::Vci, Self::Tcbs, Self::Msn, Self::Kbs, Self::Fmarket];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vci => "vci",
            Self::Tcbs => "tcbs",
            Self::Msn => "msn",
            Self::Kbs => "kbs",
            Self::Fmarket => "fmarket",
        }
    }

    /// Parse a source, accepting only the members of `allowed`.
    pub fn parse_allowed(value: &str, allowed: &[Self]) -> Result<Self, ValidationError> {
        let expected = || {
            allowed
                .iter()
                .map(|source| source.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match Self::from_str(value) {
            Ok(source) if allowed.contains(&source) => Ok(source),
            _ => Err(ValidationError::InvalidSource {
                value: value.trim().to_owned(),
                expected: expected(),
            }),
        }
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vci" => Ok(Self::Vci),
            "tcbs" => Ok(Self::Tcbs),
            "msn" => Ok(Self::Msn),
            "kbs" => Ok(Self::Kbs),
            "fmarket" => Ok(Self::Fmarket),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
                expected: String::from("vci, tcbs, msn, kbs, fmarket"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(Source::from_str(" VCI "), Ok(Source::Vci));
        assert_eq!(Source::from_str("Tcbs"), Ok(Source::Tcbs));
        assert_eq!(Source::from_str("FMARKET"), Ok(Source::Fmarket));
    }

    #[test]
    fn parse_allowed_lists_valid_values() {
        let err = Source::parse_allowed("msn", &[Source::Vci, Source::Tcbs]).expect_err("must fail");
        assert_eq!(
            err,
            ValidationError::InvalidSource {
                value: String::from("msn"),
                expected: String::from("vci, tcbs"),
            }
        );
    }
}
