//! Databento historical adapter.
//!
//! Calls `timeseries.get_range` with JSON encoding, which returns one record per
//! line. Addressing needs the full `{symbol, dataset, schema}` record: the schema
//! family (e.g. `ohlcv`) is combined with the frequency suffix to pick the
//! concrete schema (`ohlcv-1m`, `ohlcv-1h`, `ohlcv-1d`).

use super::http::{self, value_f64, HttpClient};
use super::{require_credential, wrong_shape, FetchError, ProviderAdapter};
use crate::config::{ConfigError, ProviderSettings};
use crate::domain::{
    BarTime, Credential, DatabentoSymbol, DateRange, Frequency, ProviderName, ProviderSymbol,
    RawProviderRow,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

pub struct DatabentoAdapter {
    http: HttpClient,
}

impl DatabentoAdapter {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpClient::new(settings)?,
        })
    }

    /// Concrete schema for a schema family and frequency. Only bar families
    /// have a frequency.
    pub(crate) fn schema(family: &str, frequency: Frequency) -> Option<String> {
        if family != "ohlcv" {
            return None;
        }
        let suffix = match frequency {
            Frequency::Minute => "1m",
            Frequency::Hour => "1h",
            Frequency::Day => "1d",
        };
        Some(format!("{family}-{suffix}"))
    }

    /// Input symbology type implied by the symbol's form.
    pub(crate) fn stype_in(symbol: &str) -> &'static str {
        let parts: Vec<&str> = symbol.split('.').collect();
        match parts.as_slice() {
            [_, "c" | "n" | "v", rank] if rank.parse::<u32>().is_ok() => "continuous",
            [_, "FUT" | "OPT"] => "parent",
            _ => "raw_symbol",
        }
    }

    /// Parse a JSON-lines body into rows. Blank lines are skipped.
    pub(crate) fn parse_records(
        body: &str,
        frequency: Frequency,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        let mut rows = Vec::new();
        for (n, line) in body.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: Value = serde_json::from_str(line).map_err(|e| {
                FetchError::transport(Some(200), format!("malformed record on line {}: {e}", n + 1))
            })?;
            let header = record.get("hd");
            let ts_event = header
                .and_then(|hd| hd.get("ts_event"))
                .and_then(parse_ts)
                .ok_or_else(|| {
                    FetchError::transport(Some(200), format!("record on line {} has no ts_event", n + 1))
                })?;
            let timestamp = match frequency {
                Frequency::Day => BarTime::Date(ts_event.date_naive()),
                Frequency::Minute | Frequency::Hour => BarTime::Instant(ts_event),
            };

            let row = RawProviderRow::new(timestamp)
                .ohlcv(
                    value_f64(record.get("open")),
                    value_f64(record.get("high")),
                    value_f64(record.get("low")),
                    value_f64(record.get("close")),
                    value_f64(record.get("volume")),
                )
                .extra(
                    "publisher_id",
                    value_f64(header.and_then(|hd| hd.get("publisher_id"))),
                )
                .extra(
                    "instrument_id",
                    value_f64(header.and_then(|hd| hd.get("instrument_id"))),
                )
                .extra(
                    "source_symbol",
                    record.get("symbol").and_then(Value::as_str),
                );
            if !row.is_empty_bar() {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn fetch_range(
        &self,
        db: &DatabentoSymbol,
        schema: &str,
        range: DateRange,
        frequency: Frequency,
        key: &Credential,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        let url = self.http.url("/v0/timeseries.get_range");
        debug!(
            provider = "databento",
            %url,
            dataset = %db.dataset,
            symbol = %db.symbol,
            schema,
            "requesting range"
        );
        // `end` is exclusive upstream; the request range is inclusive.
        let start = range.start.format("%Y-%m-%d").to_string();
        let end = (range.end + chrono::Duration::days(1)).format("%Y-%m-%d").to_string();
        let request = self
            .http
            .get(&url)
            .basic_auth(key.expose(), Some(""))
            .query(&[
                ("dataset", db.dataset.as_str()),
                ("symbols", db.symbol.as_str()),
                ("schema", schema),
                ("stype_in", Self::stype_in(&db.symbol)),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("encoding", "json"),
                ("pretty_px", "true"),
                ("pretty_ts", "true"),
                ("map_symbols", "true"),
            ]);
        let response = http::check_status(self.http.send(request)?)?;
        let body = http::read_text(response)?;
        Self::parse_records(&body, frequency)
    }
}

/// `ts_event` is an RFC 3339 string with `pretty_ts`, or nanoseconds since the
/// epoch (as a string or number) without it.
fn parse_ts(value: &Value) -> Option<DateTime<Utc>> {
    let nanos = match value {
        Value::String(s) => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            s.parse::<i64>().ok()?
        }
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    Some(DateTime::from_timestamp_nanos(nanos))
}

impl ProviderAdapter for DatabentoAdapter {
    fn provider(&self) -> ProviderName {
        ProviderName::Databento
    }

    fn fetch(
        &self,
        symbol: &ProviderSymbol,
        range: DateRange,
        frequency: Frequency,
        credential: Option<&Credential>,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        let key = require_credential(ProviderName::Databento, credential)?;
        let ProviderSymbol::Databento(db) = symbol else {
            return Err(wrong_shape(ProviderName::Databento, symbol));
        };
        let schema = Self::schema(&db.schema, frequency).ok_or(FetchError::UnsupportedFrequency {
            provider: ProviderName::Databento,
            frequency,
        })?;
        self.fetch_range(db, &schema, range, frequency, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawValue;

    #[test]
    fn schema_combines_family_and_interval() {
        assert_eq!(
            DatabentoAdapter::schema("ohlcv", Frequency::Hour).as_deref(),
            Some("ohlcv-1h")
        );
        assert_eq!(DatabentoAdapter::schema("trades", Frequency::Day), None);
    }

    #[test]
    fn stype_follows_symbol_form() {
        assert_eq!(DatabentoAdapter::stype_in("ES.c.0"), "continuous");
        assert_eq!(DatabentoAdapter::stype_in("ES.FUT"), "parent");
        assert_eq!(DatabentoAdapter::stype_in("SPY"), "raw_symbol");
        assert_eq!(DatabentoAdapter::stype_in("BRK.B"), "raw_symbol");
    }

    #[test]
    fn parses_pretty_json_lines() {
        let body = concat!(
            r#"{"hd":{"ts_event":"2024-01-02T00:00:00.000000000Z","rtype":35,"publisher_id":1,"instrument_id":5602},"open":"4783.250000000","high":"4794.000000000","low":"4747.750000000","close":"4766.250000000","volume":"1587623","symbol":"ES.c.0"}"#,
            "\n\n",
            r#"{"hd":{"ts_event":"2024-01-03T00:00:00.000000000Z","rtype":35,"publisher_id":1,"instrument_id":5602},"open":"4766.000000000","high":"4771.500000000","low":"4725.000000000","close":"4734.750000000","volume":"1798040","symbol":"ES.c.0"}"#,
            "\n"
        );
        let rows = DatabentoAdapter::parse_records(body, Frequency::Day).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp.to_iso(), "2024-01-02");
        assert_eq!(rows[0].open, Some(4783.25));
        assert_eq!(rows[0].volume, Some(1_587_623.0));
        assert_eq!(rows[0].extras.get("instrument_id"), Some(&RawValue::Float(5602.0)));
        assert_eq!(
            rows[0].extras.get("source_symbol"),
            Some(&RawValue::Text("ES.c.0".into()))
        );
    }

    #[test]
    fn parses_raw_nanosecond_timestamps() {
        let body = r#"{"hd":{"ts_event":"1704205800000000000","publisher_id":2,"instrument_id":15144},"open":472100000000,"high":472500000000,"low":471900000000,"close":472300000000,"volume":1500}"#;
        let rows = DatabentoAdapter::parse_records(body, Frequency::Minute).unwrap();
        assert_eq!(rows[0].timestamp.to_iso(), "2024-01-02T14:30:00Z");
    }

    #[test]
    fn record_without_timestamp_is_rejected() {
        let err = DatabentoAdapter::parse_records(r#"{"open":"1.0"}"#, Frequency::Day).unwrap_err();
        assert_eq!(err.kind(), "transport_error");
    }
}
