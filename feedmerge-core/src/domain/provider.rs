//! Provider names and provider-specific symbol addressing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A third-party market data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Eodhd,
    Databento,
    Polygon,
    #[serde(alias = "theta")]
    ThetaData,
}

impl ProviderName {
    pub const ALL: [ProviderName; 4] = [
        ProviderName::Eodhd,
        ProviderName::Databento,
        ProviderName::Polygon,
        ProviderName::ThetaData,
    ];

    /// Stable lowercase identifier used in config files, CLI flags and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Eodhd => "eodhd",
            ProviderName::Databento => "databento",
            ProviderName::Polygon => "polygon",
            ProviderName::ThetaData => "thetadata",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderName::Eodhd => "EODHD",
            ProviderName::Databento => "Databento",
            ProviderName::Polygon => "Polygon",
            ProviderName::ThetaData => "Theta Data",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown provider '{0}' (expected one of: eodhd, databento, polygon, thetadata)")]
pub struct ParseProviderError(pub String);

impl FromStr for ProviderName {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eodhd" | "eod" => Ok(ProviderName::Eodhd),
            "databento" | "dbn" => Ok(ProviderName::Databento),
            "polygon" | "polygon.io" => Ok(ProviderName::Polygon),
            "thetadata" | "theta" | "theta_data" => Ok(ProviderName::ThetaData),
            _ => Err(ParseProviderError(s.to_string())),
        }
    }
}

/// Databento addressing: a symbol only makes sense together with its dataset
/// and schema family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabentoSymbol {
    /// Raw or continuous symbol, e.g. `SPY` or `ES.c.0`.
    pub symbol: String,
    /// Dataset code, e.g. `GLBX.MDP3`.
    pub dataset: String,
    /// Schema family, e.g. `ohlcv`. The bar interval suffix is chosen per request.
    pub schema: String,
}

/// Provider-specific symbol for one canonical ticker.
///
/// One variant per provider so each adapter matches exhaustively on the shape
/// it understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderSymbol {
    Eodhd { symbol: String },
    Databento(DatabentoSymbol),
    Polygon { symbol: String },
    #[serde(rename = "thetadata")]
    ThetaData { root: String },
}

impl ProviderSymbol {
    pub fn eodhd(symbol: impl Into<String>) -> Self {
        ProviderSymbol::Eodhd {
            symbol: symbol.into(),
        }
    }

    pub fn databento(
        symbol: impl Into<String>,
        dataset: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        ProviderSymbol::Databento(DatabentoSymbol {
            symbol: symbol.into(),
            dataset: dataset.into(),
            schema: schema.into(),
        })
    }

    pub fn polygon(symbol: impl Into<String>) -> Self {
        ProviderSymbol::Polygon {
            symbol: symbol.into(),
        }
    }

    pub fn thetadata(root: impl Into<String>) -> Self {
        ProviderSymbol::ThetaData { root: root.into() }
    }

    /// The provider this symbol addresses.
    pub fn provider(&self) -> ProviderName {
        match self {
            ProviderSymbol::Eodhd { .. } => ProviderName::Eodhd,
            ProviderSymbol::Databento(_) => ProviderName::Databento,
            ProviderSymbol::Polygon { .. } => ProviderName::Polygon,
            ProviderSymbol::ThetaData { .. } => ProviderName::ThetaData,
        }
    }

    /// Short human-readable form for listings and logs.
    pub fn describe(&self) -> String {
        match self {
            ProviderSymbol::Eodhd { symbol } | ProviderSymbol::Polygon { symbol } => {
                symbol.clone()
            }
            ProviderSymbol::ThetaData { root } => root.clone(),
            ProviderSymbol::Databento(db) => {
                format!("{} ({} / {})", db.symbol, db.dataset, db.schema)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!("EODHD".parse::<ProviderName>().unwrap(), ProviderName::Eodhd);
        assert_eq!("Theta".parse::<ProviderName>().unwrap(), ProviderName::ThetaData);
        assert_eq!(" polygon ".parse::<ProviderName>().unwrap(), ProviderName::Polygon);
        assert!("yahoo".parse::<ProviderName>().is_err());
    }

    #[test]
    fn display_roundtrips_through_from_str() {
        for p in ProviderName::ALL {
            assert_eq!(p.to_string().parse::<ProviderName>().unwrap(), p);
        }
    }

    #[test]
    fn symbol_reports_its_provider() {
        assert_eq!(ProviderSymbol::eodhd("SPY.US").provider(), ProviderName::Eodhd);
        assert_eq!(
            ProviderSymbol::databento("ES.c.0", "GLBX.MDP3", "ohlcv").provider(),
            ProviderName::Databento
        );
        assert_eq!(ProviderSymbol::thetadata("SPY").provider(), ProviderName::ThetaData);
    }

    #[test]
    fn databento_describe_includes_dataset() {
        let s = ProviderSymbol::databento("ES.c.0", "GLBX.MDP3", "ohlcv");
        assert_eq!(s.describe(), "ES.c.0 (GLBX.MDP3 / ohlcv)");
    }
}
