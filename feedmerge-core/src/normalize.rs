//! Tier projection: raw provider rows → normalized rows.
//!
//! `project` is pure. For each tier column it copies the matching field
//! (coerced to the column kind), derives it from the same row, or writes
//! `Cell::Absent`. Raw fields that no tier column names are dropped.

use crate::domain::{Cell, NormalizedRow, ProviderName, RawProviderRow, RawValue};
use crate::tier::{Column, ColumnKind, CoreField, Derived, Source, Tier};

/// Project one raw row onto `tier`.
pub fn project(
    row: &RawProviderRow,
    ticker: &str,
    provider: ProviderName,
    tier: Tier,
) -> NormalizedRow {
    let tier_fields = tier
        .columns()
        .iter()
        .map(|col| (col.name.as_str(), project_column(row, col)))
        .collect();

    NormalizedRow {
        ticker: ticker.to_string(),
        provider,
        timestamp: row.timestamp.to_iso(),
        tier_fields,
    }
}

/// Project a batch, sorted by timestamp. The sort is stable so duplicate
/// timestamps keep provider order.
pub fn project_all(
    mut rows: Vec<RawProviderRow>,
    ticker: &str,
    provider: ProviderName,
    tier: Tier,
) -> Vec<NormalizedRow> {
    rows.sort_by_key(|r| r.timestamp);
    rows.iter()
        .map(|r| project(r, ticker, provider, tier))
        .collect()
}

fn project_column(row: &RawProviderRow, col: &Column) -> Cell {
    let value = match col.source {
        Source::Core(field) => core(row, field).map(Cell::number),
        Source::Extra => row.extras.get(&col.name).and_then(|v| coerce(v, col.kind)),
        Source::Derived(d) => row
            .extras
            .get(&col.name)
            .and_then(|v| coerce(v, col.kind))
            .or_else(|| derive(row, d).map(Cell::number)),
    };
    match value {
        Some(Cell::Number(v)) if !v.is_finite() => Cell::Absent,
        Some(cell) => cell,
        None => Cell::Absent,
    }
}

fn core(row: &RawProviderRow, field: CoreField) -> Option<f64> {
    let v = match field {
        CoreField::Open => row.open,
        CoreField::High => row.high,
        CoreField::Low => row.low,
        CoreField::Close => row.close,
        CoreField::Volume => row.volume,
    };
    v.filter(|x| x.is_finite())
}

/// Coerce a raw value to the column kind. Values that cannot be coerced are absent.
fn coerce(value: &RawValue, kind: ColumnKind) -> Option<Cell> {
    match kind {
        ColumnKind::Number => number(value).map(Cell::Number),
        ColumnKind::Text => match value {
            RawValue::Float(v) => Some(Cell::Text(v.to_string())),
            RawValue::Int(v) => Some(Cell::Text(v.to_string())),
            RawValue::Text(s) if s.trim().is_empty() => None,
            RawValue::Text(s) => Some(Cell::Text(s.clone())),
        },
    }
}

fn number(value: &RawValue) -> Option<f64> {
    let v = match value {
        RawValue::Float(v) => *v,
        RawValue::Int(v) => *v as f64,
        RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
    };
    v.is_finite().then_some(v)
}

fn extra_number(row: &RawProviderRow, column: &str) -> Option<f64> {
    row.extras.get(column).and_then(number)
}

fn ratio(num: f64, den: f64) -> Option<f64> {
    (den != 0.0).then(|| num / den)
}

fn derive(row: &RawProviderRow, d: Derived) -> Option<f64> {
    let open = || core(row, CoreField::Open);
    let high = || core(row, CoreField::High);
    let low = || core(row, CoreField::Low);
    let close = || core(row, CoreField::Close);
    let volume = || core(row, CoreField::Volume);
    let prev_close = || extra_number(row, "prev_close");
    let bid = || extra_number(row, "bid");
    let ask = || extra_number(row, "ask");

    match d {
        Derived::Change => Some(close()? - prev_close()?),
        Derived::ChangePct => {
            let pc = prev_close()?;
            ratio(close()? - pc, pc).map(|r| r * 100.0)
        }
        Derived::Range => Some(high()? - low()?),
        Derived::RangePct => {
            let l = low()?;
            ratio(high()? - l, l).map(|r| r * 100.0)
        }
        Derived::TypicalPrice => Some((high()? + low()? + close()?) / 3.0),
        Derived::Hl2 => Some((high()? + low()?) / 2.0),
        Derived::Ohlc4 => Some((open()? + high()? + low()? + close()?) / 4.0),
        Derived::DollarVolume => Some(close()? * volume()?),
        Derived::Mid => Some((bid()? + ask()?) / 2.0),
        Derived::Spread => Some(ask()? - bid()?),
        Derived::SpreadBps => {
            let (b, a) = (bid()?, ask()?);
            ratio(a - b, (a + b) / 2.0).map(|r| r * 10_000.0)
        }
        Derived::Body => Some(close()? - open()?),
        Derived::UpperWick => Some(high()? - open()?.max(close()?)),
        Derived::LowerWick => Some(open()?.min(close()?) - low()?),
        Derived::BodyPct => ratio((close()? - open()?).abs(), high()? - low()?).map(|r| r * 100.0),
        Derived::IntradayReturnPct => {
            let o = open()?;
            ratio(close()? - o, o).map(|r| r * 100.0)
        }
        Derived::Gap => Some(open()? - prev_close()?),
        Derived::GapPct => {
            let pc = prev_close()?;
            ratio(open()? - pc, pc).map(|r| r * 100.0)
        }
        Derived::TrueRange => {
            let (h, l) = (high()?, low()?);
            match prev_close() {
                Some(pc) => Some((h - l).max((h - pc).abs()).max((l - pc).abs())),
                None => Some(h - l),
            }
        }
        Derived::AverageTradeSize => ratio(volume()?, extra_number(row, "trade_count")?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BarTime;
    use chrono::NaiveDate;

    fn bar() -> RawProviderRow {
        RawProviderRow::new(BarTime::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())).ohlcv(
            Some(100.0),
            Some(110.0),
            Some(95.0),
            Some(105.0),
            Some(1_000.0),
        )
    }

    #[test]
    fn lite_projection_has_18_ordered_columns() {
        let row = project(&bar(), "SPY", ProviderName::Eodhd, Tier::Lite);
        assert_eq!(row.column_count(), 18);
        let names: Vec<&str> = row.tier_fields.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, Tier::Lite.column_names());
        assert_eq!(row.timestamp, "2024-01-02");
    }

    #[test]
    fn core_fields_copy_and_missing_extras_are_absent() {
        let row = project(&bar(), "SPY", ProviderName::Eodhd, Tier::Lite);
        assert_eq!(row.get("close"), Some(&Cell::Number(105.0)));
        assert_eq!(row.get("vwap"), Some(&Cell::Absent));
        assert_eq!(row.get("exchange"), Some(&Cell::Absent));
    }

    #[test]
    fn zero_volume_is_a_value_not_absent() {
        let mut raw = bar();
        raw.volume = Some(0.0);
        let row = project(&raw, "SPY", ProviderName::Polygon, Tier::Lite);
        assert_eq!(row.get("volume"), Some(&Cell::Number(0.0)));
        assert_eq!(row.get("dollar_volume"), Some(&Cell::Number(0.0)));
    }

    #[test]
    fn missing_core_field_is_absent_and_blocks_derivations() {
        let mut raw = bar();
        raw.high = None;
        let row = project(&raw, "SPY", ProviderName::Polygon, Tier::Lite);
        assert_eq!(row.get("high"), Some(&Cell::Absent));
        assert_eq!(row.get("range"), Some(&Cell::Absent));
        assert_eq!(row.get("hl2"), Some(&Cell::Absent));
    }

    #[test]
    fn derived_prices_are_computed_from_the_row() {
        let raw = bar().extra("prev_close", Some(100.0));
        let row = project(&raw, "SPY", ProviderName::Eodhd, Tier::Standard);
        assert_eq!(row.get("range"), Some(&Cell::Number(15.0)));
        assert_eq!(row.get("hl2"), Some(&Cell::Number(102.5)));
        assert_eq!(row.get("change"), Some(&Cell::Number(5.0)));
        assert_eq!(row.get("change_pct"), Some(&Cell::Number(5.0)));
        assert_eq!(row.get("gap"), Some(&Cell::Number(0.0)));
        assert_eq!(row.get("upper_wick"), Some(&Cell::Number(5.0)));
        assert_eq!(row.get("lower_wick"), Some(&Cell::Number(5.0)));
        assert_eq!(row.get("true_range"), Some(&Cell::Number(15.0)));
    }

    #[test]
    fn provider_supplied_value_beats_derivation() {
        let raw = bar().extra("change", Some(42.0));
        let row = project(&raw, "SPY", ProviderName::Polygon, Tier::Lite);
        assert_eq!(row.get("change"), Some(&Cell::Number(42.0)));
    }

    #[test]
    fn numeric_columns_coerce_through_f64() {
        let raw = bar()
            .extra("trade_count", Some(250_i64))
            .extra("vwap", Some("101.25"))
            .extra("prev_close", Some("n/a"));
        let row = project(&raw, "SPY", ProviderName::Databento, Tier::Lite);
        assert_eq!(row.get("trade_count"), Some(&Cell::Number(250.0)));
        assert_eq!(row.get("vwap"), Some(&Cell::Number(101.25)));
        assert_eq!(row.get("prev_close"), Some(&Cell::Absent));
    }

    #[test]
    fn text_columns_stringify_numbers() {
        let raw = bar().extra("exchange", Some(4_i64));
        let row = project(&raw, "SPY", ProviderName::ThetaData, Tier::Lite);
        assert_eq!(row.get("exchange"), Some(&Cell::Text("4".into())));
    }

    #[test]
    fn unknown_extras_are_dropped() {
        let raw = bar().extra("not_a_column", Some(1.0));
        let row = project(&raw, "SPY", ProviderName::Polygon, Tier::Full);
        assert_eq!(row.column_count(), 136);
        assert!(row.get("not_a_column").is_none());
    }

    #[test]
    fn division_by_zero_is_absent() {
        let raw = bar()
            .extra("prev_close", Some(0.0))
            .extra("trade_count", Some(0_i64));
        let row = project(&raw, "SPY", ProviderName::Polygon, Tier::Standard);
        assert_eq!(row.get("change_pct"), Some(&Cell::Absent));
        assert_eq!(row.get("average_trade_size"), Some(&Cell::Absent));
    }

    #[test]
    fn project_all_sorts_by_timestamp() {
        let later = RawProviderRow::new(BarTime::Date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()));
        let rows = project_all(vec![later, bar()], "SPY", ProviderName::Eodhd, Tier::Lite);
        assert_eq!(rows[0].timestamp, "2024-01-02");
        assert_eq!(rows[1].timestamp, "2024-01-03");
    }
}
