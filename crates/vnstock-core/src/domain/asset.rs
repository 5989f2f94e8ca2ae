use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{Symbol, ValidationError};

/// Exchange indices recognised by code.
pub const INDEX_CODES: &[&str] = &[
    "VNINDEX",
    "HNXINDEX",
    "UPCOMINDEX",
    "HNX30",
    "VN30",
    "VNMID",
    "VNSML",
    "VN100",
    "VNALL",
    "VNSI",
    "VNIT",
    "VNIND",
    "VNCONS",
    "VNCOND",
    "VNHEAL",
    "VNENE",
    "VNUTI",
    "VNREAL",
    "VNFIN",
    "VNMAT",
    "VNDIAMOND",
    "VNFINLEAD",
    "VNFINSELECT",
    "VNX50",
    "VNXALL",
];

/// Instrument category inferred from the shape of a ticker code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Index,
    Stock,
    Derivative,
    Bond,
    CoveredWarrant,
}

impl AssetType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Stock => "stock",
            Self::Derivative => "derivative",
            Self::Bond => "bond",
            Self::CoveredWarrant => "covered_warrant",
        }
    }

    /// Classify a symbol. Checks run in a fixed order: known indices, 3-letter
    /// stocks, KRX and VN100 derivatives, then 7/9-character bonds and VN30
    /// futures, then 8-character covered warrants.
    pub fn classify(symbol: &Symbol) -> Result<Self, ValidationError> {
        let code = symbol.as_str();
        let bytes = code.as_bytes();

        if INDEX_CODES.contains(&code) {
            return Ok(Self::Index);
        }
        if bytes.len() == 3 {
            return Ok(Self::Stock);
        }
        if is_krx_derivative(bytes) || is_month_or_quarter_future(bytes, b"VN100F") {
            return Ok(Self::Derivative);
        }
        if bytes.len() == 7 || bytes.len() == 9 {
            if is_government_bond(bytes) || is_corporate_bond(bytes) {
                return Ok(Self::Bond);
            }
            if is_month_or_quarter_future(bytes, b"VN30F") || is_dated_vn30_future(bytes) {
                return Ok(Self::Derivative);
            }
            return Err(ValidationError::UnrecognizedSymbol {
                value: code.to_owned(),
            });
        }
        if bytes.len() == 8 {
            return Ok(Self::CoveredWarrant);
        }

        Err(ValidationError::UnrecognizedSymbol {
            value: code.to_owned(),
        })
    }

    /// Indices and derivatives are quoted in points, everything else in VND x 1000.
    pub const fn is_point_quoted(self) -> bool {
        matches!(self, Self::Index | Self::Derivative)
    }
}

impl Display for AssetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn all_digits(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(u8::is_ascii_digit)
}

// 4[12][A-Z0-9]{2}[0-9A-HJ-NP-TV-W][1-9A-C]\d{3}, e.g. 41I1F4000
fn is_krx_derivative(bytes: &[u8]) -> bool {
    if bytes.len() != 9 || bytes[0] != b'4' || !matches!(bytes[1], b'1' | b'2') {
        return false;
    }
    let product_ok = bytes[2..4]
        .iter()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    let year = bytes[4];
    let year_ok = year.is_ascii_digit()
        || (year.is_ascii_uppercase() && !matches!(year, b'I' | b'O' | b'U' | b'X'..=b'Z'));
    let month_ok = matches!(bytes[5], b'1'..=b'9' | b'A'..=b'C');

    product_ok && year_ok && month_ok && all_digits(&bytes[6..])
}

// <prefix>\d{1,2}[MQ], e.g. VN30F1M, VN100F2Q
fn is_month_or_quarter_future(bytes: &[u8], prefix: &[u8]) -> bool {
    let Some(rest) = bytes.strip_prefix(prefix) else {
        return false;
    };
    let Some((last, digits)) = rest.split_last() else {
        return false;
    };
    matches!(last, b'M' | b'Q') && (1..=2).contains(&digits.len()) && all_digits(digits)
}

// VN30F\d{4}, e.g. VN30F2412
fn is_dated_vn30_future(bytes: &[u8]) -> bool {
    bytes
        .strip_prefix(b"VN30F".as_slice())
        .is_some_and(|rest| rest.len() == 4 && all_digits(rest))
}

// GB\d{2}F\d{4}, e.g. GB05F2506
fn is_government_bond(bytes: &[u8]) -> bool {
    bytes.len() == 9
        && bytes.starts_with(b"GB")
        && all_digits(&bytes[2..4])
        && bytes[4] == b'F'
        && all_digits(&bytes[5..])
}

// [A-Z]{3}\d{6}, e.g. BAB122032
fn is_corporate_bond(bytes: &[u8]) -> bool {
    bytes.len() == 9
        && !bytes.starts_with(b"VN30F")
        && bytes[..3].iter().all(u8::is_ascii_uppercase)
        && all_digits(&bytes[3..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(code: &str) -> Result<AssetType, ValidationError> {
        AssetType::classify(&Symbol::parse(code).expect("symbol should parse"))
    }

    #[test]
    fn classifies_indices_before_length_rules() {
        assert_eq!(classify("VNINDEX"), Ok(AssetType::Index));
        assert_eq!(classify("VN30"), Ok(AssetType::Index));
        assert_eq!(classify("hnx30"), Ok(AssetType::Index));
    }

    #[test]
    fn classifies_three_letter_codes_as_stock() {
        assert_eq!(classify("ACB"), Ok(AssetType::Stock));
        assert_eq!(classify("vnm"), Ok(AssetType::Stock));
    }

    #[test]
    fn classifies_derivative_formats() {
        assert_eq!(classify("VN30F1M"), Ok(AssetType::Derivative));
        assert_eq!(classify("VN30F2412"), Ok(AssetType::Derivative));
        assert_eq!(classify("VN100F1Q"), Ok(AssetType::Derivative));
        assert_eq!(classify("41I1F4000"), Ok(AssetType::Derivative));
    }

    #[test]
    fn classifies_bonds() {
        assert_eq!(classify("GB05F2506"), Ok(AssetType::Bond));
        assert_eq!(classify("BAB122032"), Ok(AssetType::Bond));
    }

    #[test]
    fn classifies_eight_character_codes_as_covered_warrant() {
        assert_eq!(classify("CACB2401"), Ok(AssetType::CoveredWarrant));
    }

    #[test]
    fn rejects_unrecognized_shapes() {
        assert!(matches!(
            classify("ABCDEFG"),
            Err(ValidationError::UnrecognizedSymbol { .. })
        ));
        assert!(matches!(
            classify("AB"),
            Err(ValidationError::UnrecognizedSymbol { .. })
        ));
    }

    #[test]
    fn krx_year_letter_excludes_ambiguous_characters() {
        assert_eq!(classify("41I1F4000"), Ok(AssetType::Derivative));
        // Year code 'I' is excluded, and 9 characters without a bond shape fail.
        assert!(classify("41I1I4000").is_err());
    }
}
