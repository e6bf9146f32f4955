//! Raw provider rows, cell values, and normalized rows.

use super::provider::ProviderName;
use super::TickerId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Bar timestamp. Daily bars are keyed by trading date, intraday bars by UTC instant,
/// so rows from different providers line up on the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BarTime {
    Date(NaiveDate),
    Instant(DateTime<Utc>),
}

impl BarTime {
    /// ISO-8601 rendering: `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SSZ`.
    pub fn to_iso(&self) -> String {
        match self {
            BarTime::Date(d) => d.format("%Y-%m-%d").to_string(),
            BarTime::Instant(ts) => ts.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

impl fmt::Display for BarTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso())
    }
}

/// A provider-native value for a non-core field, before coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Float(f64),
    Int(i64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

/// A bar as returned by one provider, owned by its adapter until projection.
///
/// Core OHLCV fields are optional: a provider that omits one yields `None`,
/// never a zero. Provider-specific fields travel in `extras`, keyed by the
/// tier column name they map to.
#[derive(Debug, Clone, PartialEq)]
pub struct RawProviderRow {
    pub timestamp: BarTime,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub extras: BTreeMap<String, RawValue>,
}

impl RawProviderRow {
    pub fn new(timestamp: BarTime) -> Self {
        Self {
            timestamp,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
            extras: BTreeMap::new(),
        }
    }

    pub fn ohlcv(
        mut self,
        open: Option<f64>,
        high: Option<f64>,
        low: Option<f64>,
        close: Option<f64>,
        volume: Option<f64>,
    ) -> Self {
        self.open = open;
        self.high = high;
        self.low = low;
        self.close = close;
        self.volume = volume;
        self
    }

    /// Attach an extra field; `None` leaves the field absent.
    pub fn extra(mut self, column: &str, value: Option<impl Into<RawValue>>) -> Self {
        if let Some(v) = value {
            self.extras.insert(column.to_string(), v.into());
        }
        self
    }

    /// True when every core field is missing (holiday filler rows).
    pub fn is_empty_bar(&self) -> bool {
        self.open.is_none()
            && self.high.is_none()
            && self.low.is_none()
            && self.close.is_none()
            && self.volume.is_none()
    }
}

/// A projected value: a number, a string, or the explicit absent marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Absent,
    Number(f64),
    Text(String),
}

impl Cell {
    /// CSV rendering of an absent cell.
    pub const ABSENT_MARKER: &'static str = "N/A";

    /// Numbers that are not finite are treated as missing.
    pub fn number(v: f64) -> Self {
        if v.is_finite() {
            Cell::Number(v)
        } else {
            Cell::Absent
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Cell::Absent)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Flat text form used by the CSV export.
    pub fn render(&self) -> String {
        match self {
            Cell::Absent => Self::ABSENT_MARKER.to_string(),
            Cell::Number(v) => v.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Absent => serializer.serialize_none(),
            Cell::Number(v) => serializer.serialize_f64(*v),
            Cell::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// A row projected onto a tier. `tier_fields` holds exactly the tier's columns,
/// in tier order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub ticker: TickerId,
    pub provider: ProviderName,
    pub timestamp: String,
    pub tier_fields: Vec<(&'static str, Cell)>,
}

impl NormalizedRow {
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.tier_fields
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, cell)| cell)
    }

    pub fn column_count(&self) -> usize {
        self.tier_fields.len()
    }
}
