//! Output tiers: fixed, ordered column lists shared by every provider.
//!
//! - **lite** (18 columns): OHLCV plus per-bar derived prices.
//! - **standard** (55 columns): lite plus quotes, corporate actions, bar shape
//!   and venue metadata.
//! - **full** (136 columns): standard plus ten levels of book depth and
//!   option analytics.
//!
//! Each tier is a strict prefix of the next, so a lite export is always a
//! column-subset of the same data exported as standard or full.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Declared type of a column. Numeric columns always coerce through `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Number,
    Text,
}

/// One of the five core OHLCV fields every provider carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

/// Columns computed from other fields of the same row when the provider
/// does not send them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derived {
    Change,
    ChangePct,
    Range,
    RangePct,
    TypicalPrice,
    Hl2,
    Ohlc4,
    DollarVolume,
    Mid,
    Spread,
    SpreadBps,
    Body,
    UpperWick,
    LowerWick,
    BodyPct,
    IntradayReturnPct,
    Gap,
    GapPct,
    TrueRange,
    AverageTradeSize,
}

/// Where a column's value comes from in a raw row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Core(CoreField),
    /// Provider extras map, keyed by the column name.
    Extra,
    /// Provider extras if present, otherwise computed.
    Derived(Derived),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub source: Source,
}

impl Column {
    fn new(name: impl Into<String>, kind: ColumnKind, source: Source) -> Self {
        Self {
            name: name.into(),
            kind,
            source,
        }
    }
}

use ColumnKind::{Number as N, Text as T};

const LITE_COLUMNS: &[(&str, ColumnKind, Source)] = &[
    ("open", N, Source::Core(CoreField::Open)),
    ("high", N, Source::Core(CoreField::High)),
    ("low", N, Source::Core(CoreField::Low)),
    ("close", N, Source::Core(CoreField::Close)),
    ("volume", N, Source::Core(CoreField::Volume)),
    ("adj_close", N, Source::Extra),
    ("vwap", N, Source::Extra),
    ("trade_count", N, Source::Extra),
    ("prev_close", N, Source::Extra),
    ("change", N, Source::Derived(Derived::Change)),
    ("change_pct", N, Source::Derived(Derived::ChangePct)),
    ("range", N, Source::Derived(Derived::Range)),
    ("range_pct", N, Source::Derived(Derived::RangePct)),
    ("typical_price", N, Source::Derived(Derived::TypicalPrice)),
    ("hl2", N, Source::Derived(Derived::Hl2)),
    ("ohlc4", N, Source::Derived(Derived::Ohlc4)),
    ("dollar_volume", N, Source::Derived(Derived::DollarVolume)),
    ("exchange", T, Source::Extra),
];

const STANDARD_COLUMNS: &[(&str, ColumnKind, Source)] = &[
    ("bid", N, Source::Extra),
    ("ask", N, Source::Extra),
    ("bid_size", N, Source::Extra),
    ("ask_size", N, Source::Extra),
    ("mid", N, Source::Derived(Derived::Mid)),
    ("spread", N, Source::Derived(Derived::Spread)),
    ("spread_bps", N, Source::Derived(Derived::SpreadBps)),
    ("body", N, Source::Derived(Derived::Body)),
    ("upper_wick", N, Source::Derived(Derived::UpperWick)),
    ("lower_wick", N, Source::Derived(Derived::LowerWick)),
    ("body_pct", N, Source::Derived(Derived::BodyPct)),
    ("intraday_return_pct", N, Source::Derived(Derived::IntradayReturnPct)),
    ("gap", N, Source::Derived(Derived::Gap)),
    ("gap_pct", N, Source::Derived(Derived::GapPct)),
    ("true_range", N, Source::Derived(Derived::TrueRange)),
    ("open_interest", N, Source::Extra),
    ("settlement_price", N, Source::Extra),
    ("dividend", N, Source::Extra),
    ("split_ratio", T, Source::Extra),
    ("unadjusted_close", N, Source::Extra),
    ("unadjusted_volume", N, Source::Extra),
    ("market_cap", N, Source::Extra),
    ("shares_outstanding", N, Source::Extra),
    ("average_trade_size", N, Source::Derived(Derived::AverageTradeSize)),
    ("buy_volume", N, Source::Extra),
    ("sell_volume", N, Source::Extra),
    ("block_trade_count", N, Source::Extra),
    ("odd_lot_count", N, Source::Extra),
    ("condition_codes", T, Source::Extra),
    ("currency", T, Source::Extra),
    ("mic", T, Source::Extra),
    ("instrument_id", N, Source::Extra),
    ("publisher_id", N, Source::Extra),
    ("otc", T, Source::Extra),
    ("session", T, Source::Extra),
    ("timezone", T, Source::Extra),
    ("source_symbol", T, Source::Extra),
];

/// Per-level book fields, Databento MBP-10 naming (`bid_px_00` .. `ask_ct_09`).
const BOOK_FIELDS: &[&str] = &["bid_px", "ask_px", "bid_sz", "ask_sz", "bid_ct", "ask_ct"];
pub const BOOK_DEPTH: usize = 10;

const OPTION_COLUMNS: &[(&str, ColumnKind, Source)] = &[
    ("underlying_price", N, Source::Extra),
    ("strike", N, Source::Extra),
    ("expiration", T, Source::Extra),
    ("right", T, Source::Extra),
    ("implied_volatility", N, Source::Extra),
    ("delta", N, Source::Extra),
    ("gamma", N, Source::Extra),
    ("theta", N, Source::Extra),
    ("vega", N, Source::Extra),
    ("rho", N, Source::Extra),
    ("epsilon", N, Source::Extra),
    ("lambda", N, Source::Extra),
    ("vanna", N, Source::Extra),
    ("charm", N, Source::Extra),
    ("vomma", N, Source::Extra),
    ("veta", N, Source::Extra),
    ("speed", N, Source::Extra),
    ("zomma", N, Source::Extra),
    ("color", N, Source::Extra),
    ("ultima", N, Source::Extra),
    ("dual_delta", N, Source::Extra),
];

/// Output schema tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Lite,
    Standard,
    Full,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Lite, Tier::Standard, Tier::Full];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Lite => "lite",
            Tier::Standard => "standard",
            Tier::Full => "full",
        }
    }

    /// Fixed column count of the tier.
    pub const fn column_count(&self) -> usize {
        match self {
            Tier::Lite => 18,
            Tier::Standard => 55,
            Tier::Full => 136,
        }
    }

    /// The tier's ordered column list. Built once per process.
    pub fn columns(&self) -> &'static [Column] {
        static LITE: OnceLock<Vec<Column>> = OnceLock::new();
        static STANDARD: OnceLock<Vec<Column>> = OnceLock::new();
        static FULL: OnceLock<Vec<Column>> = OnceLock::new();

        let cell = match self {
            Tier::Lite => &LITE,
            Tier::Standard => &STANDARD,
            Tier::Full => &FULL,
        };
        cell.get_or_init(|| build_columns(*self))
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns().iter().map(|c| c.name.as_str()).collect()
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns().iter().position(|c| c.name == column)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lite" | "18" => Ok(Tier::Lite),
            "standard" | "55" => Ok(Tier::Standard),
            "full" | "136" => Ok(Tier::Full),
            other => Err(format!("unknown tier '{other}' (expected lite, standard or full)")),
        }
    }
}

fn from_table<'a>(table: &'a [(&'a str, ColumnKind, Source)]) -> impl Iterator<Item = Column> + 'a {
    table
        .iter()
        .map(|(name, kind, source)| Column::new(*name, *kind, *source))
}

fn build_columns(tier: Tier) -> Vec<Column> {
    let mut columns: Vec<Column> = from_table(LITE_COLUMNS).collect();
    if tier >= Tier::Standard {
        columns.extend(from_table(STANDARD_COLUMNS));
    }
    if tier == Tier::Full {
        for level in 0..BOOK_DEPTH {
            for field in BOOK_FIELDS {
                columns.push(Column::new(
                    format!("{field}_{level:02}"),
                    ColumnKind::Number,
                    Source::Extra,
                ));
            }
        }
        columns.extend(from_table(OPTION_COLUMNS));
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tiers_have_fixed_column_counts() {
        for tier in Tier::ALL {
            assert_eq!(tier.columns().len(), tier.column_count(), "tier {tier}");
        }
        assert_eq!(Tier::Lite.columns().len(), 18);
        assert_eq!(Tier::Standard.columns().len(), 55);
        assert_eq!(Tier::Full.columns().len(), 136);
    }

    #[test]
    fn column_names_are_unique_within_a_tier() {
        for tier in Tier::ALL {
            let names = tier.column_names();
            let unique: HashSet<_> = names.iter().collect();
            assert_eq!(unique.len(), names.len(), "duplicate column in {tier}");
        }
    }

    #[test]
    fn each_tier_is_a_prefix_of_the_next() {
        let lite = Tier::Lite.column_names();
        let standard = Tier::Standard.column_names();
        let full = Tier::Full.column_names();
        assert_eq!(&standard[..lite.len()], lite.as_slice());
        assert_eq!(&full[..standard.len()], standard.as_slice());
    }

    #[test]
    fn ohlcv_leads_every_tier() {
        for tier in Tier::ALL {
            assert_eq!(
                &tier.column_names()[..5],
                &["open", "high", "low", "close", "volume"]
            );
        }
    }

    #[test]
    fn full_tier_has_ten_book_levels() {
        assert_eq!(Tier::Full.index_of("bid_px_00"), Some(55));
        assert!(Tier::Full.index_of("ask_ct_09").is_some());
        assert!(Tier::Full.index_of("bid_px_10").is_none());
        assert_eq!(Tier::Full.column_names().last().copied(), Some("dual_delta"));
    }

    #[test]
    fn tier_parses_from_name_or_count() {
        assert_eq!("Standard".parse::<Tier>().unwrap(), Tier::Standard);
        assert_eq!("136".parse::<Tier>().unwrap(), Tier::Full);
        assert!("mega".parse::<Tier>().is_err());
    }
}
