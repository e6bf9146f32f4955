//! EODHD adapter.
//!
//! Daily bars come from `/api/eod/{symbol}`, minute and hour bars from
//! `/api/intraday/{symbol}`. The API token is a query parameter, so request
//! URLs are never logged with their query string.

use super::http::{self, HttpClient};
use super::{require_credential, wrong_shape, FetchError, ProviderAdapter};
use crate::config::{ConfigError, ProviderSettings};
use crate::domain::{
    BarTime, Credential, DateRange, Frequency, ProviderName, ProviderSymbol, RawProviderRow,
};
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use tracing::debug;

/// One row of the end-of-day endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct EodBar {
    date: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    adjusted_close: Option<f64>,
    volume: Option<f64>,
}

/// One row of the intraday endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct IntradayBar {
    timestamp: i64,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

/// Period vocabulary for the two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Period {
    Eod(&'static str),
    Intraday(&'static str),
}

pub struct EodhdAdapter {
    http: HttpClient,
}

impl EodhdAdapter {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpClient::new(settings)?,
        })
    }

    pub(crate) fn period(frequency: Frequency) -> Option<Period> {
        match frequency {
            Frequency::Minute => Some(Period::Intraday("1m")),
            Frequency::Hour => Some(Period::Intraday("1h")),
            Frequency::Day => Some(Period::Eod("d")),
        }
    }

    pub(crate) fn parse_eod(symbol: &str, bars: Vec<EodBar>) -> Result<Vec<RawProviderRow>, FetchError> {
        let mut rows = Vec::with_capacity(bars.len());
        for bar in bars {
            let date = NaiveDate::parse_from_str(&bar.date, "%Y-%m-%d").map_err(|_| {
                FetchError::transport(Some(200), format!("invalid date '{}' in EOD response", bar.date))
            })?;
            let row = RawProviderRow::new(BarTime::Date(date))
                .ohlcv(bar.open, bar.high, bar.low, bar.close, bar.volume)
                .extra("adj_close", bar.adjusted_close)
                .extra("source_symbol", Some(symbol));
            if !row.is_empty_bar() {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    pub(crate) fn parse_intraday(
        symbol: &str,
        bars: Vec<IntradayBar>,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        let mut rows = Vec::with_capacity(bars.len());
        for bar in bars {
            let ts = DateTime::from_timestamp(bar.timestamp, 0).ok_or_else(|| {
                FetchError::transport(Some(200), format!("invalid timestamp {}", bar.timestamp))
            })?;
            let row = RawProviderRow::new(BarTime::Instant(ts))
                .ohlcv(bar.open, bar.high, bar.low, bar.close, bar.volume)
                .extra("timezone", Some("UTC"))
                .extra("source_symbol", Some(symbol));
            if !row.is_empty_bar() {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn fetch_eod(
        &self,
        symbol: &str,
        range: DateRange,
        period: &str,
        token: &Credential,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        let url = self.http.url(&format!("/api/eod/{symbol}"));
        debug!(provider = "eodhd", %url, "requesting EOD bars");
        let from = range.start.format("%Y-%m-%d").to_string();
        let to = range.end.format("%Y-%m-%d").to_string();
        let request = self.http.get(&url).query(&[
            ("api_token", token.expose()),
            ("fmt", "json"),
            ("period", period),
            ("from", from.as_str()),
            ("to", to.as_str()),
        ]);
        let response = http::check_status(self.http.send(request)?)?;
        let bars: Vec<EodBar> = http::read_json(response)?;
        Self::parse_eod(symbol, bars)
    }

    fn fetch_intraday(
        &self,
        symbol: &str,
        range: DateRange,
        interval: &str,
        token: &Credential,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        let (from, to) = unix_bounds(range);
        let (from, to) = (from.to_string(), to.to_string());
        let url = self.http.url(&format!("/api/intraday/{symbol}"));
        debug!(provider = "eodhd", %url, interval, "requesting intraday bars");
        let request = self.http.get(&url).query(&[
            ("api_token", token.expose()),
            ("fmt", "json"),
            ("interval", interval),
            ("from", from.as_str()),
            ("to", to.as_str()),
        ]);
        let response = http::check_status(self.http.send(request)?)?;
        let bars: Vec<IntradayBar> = http::read_json(response)?;
        Self::parse_intraday(symbol, bars)
    }
}

/// Unix seconds from the start of the first day to the end of the last day (UTC).
fn unix_bounds(range: DateRange) -> (i64, i64) {
    let start = range.start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
    let end = range.end.and_time(chrono::NaiveTime::MIN).and_utc().timestamp() + 86_399;
    (start, end)
}

impl ProviderAdapter for EodhdAdapter {
    fn provider(&self) -> ProviderName {
        ProviderName::Eodhd
    }

    fn fetch(
        &self,
        symbol: &ProviderSymbol,
        range: DateRange,
        frequency: Frequency,
        credential: Option<&Credential>,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        let token = require_credential(ProviderName::Eodhd, credential)?;
        let ProviderSymbol::Eodhd { symbol } = symbol else {
            return Err(wrong_shape(ProviderName::Eodhd, symbol));
        };
        match Self::period(frequency) {
            Some(Period::Eod(p)) => self.fetch_eod(symbol, range, p, token),
            Some(Period::Intraday(i)) => self.fetch_intraday(symbol, range, i, token),
            None => Err(FetchError::UnsupportedFrequency {
                provider: ProviderName::Eodhd,
                frequency,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_maps_to_period_codes() {
        assert_eq!(EodhdAdapter::period(Frequency::Day), Some(Period::Eod("d")));
        assert_eq!(EodhdAdapter::period(Frequency::Hour), Some(Period::Intraday("1h")));
        assert_eq!(EodhdAdapter::period(Frequency::Minute), Some(Period::Intraday("1m")));
    }

    #[test]
    fn parses_eod_rows_with_nulls() {
        let bars: Vec<EodBar> = serde_json::from_str(
            r#"[
                {"date":"2024-01-02","open":472.16,"high":473.67,"low":470.49,"close":472.65,"adjusted_close":467.9,"volume":123008800},
                {"date":"2024-01-03","open":470.43,"high":null,"low":468.17,"close":468.79,"adjusted_close":null,"volume":103585900}
            ]"#,
        )
        .unwrap();
        let rows = EodhdAdapter::parse_eod("SPY.US", bars).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].close, Some(472.65));
        assert!(rows[0].extras.contains_key("adj_close"));
        assert_eq!(rows[1].high, None);
        assert!(!rows[1].extras.contains_key("adj_close"));
    }

    #[test]
    fn drops_all_null_holiday_rows() {
        let bars: Vec<EodBar> = serde_json::from_str(
            r#"[{"date":"2024-01-01","open":null,"high":null,"low":null,"close":null,"adjusted_close":null,"volume":null}]"#,
        )
        .unwrap();
        assert!(EodhdAdapter::parse_eod("SPY.US", bars).unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_dates() {
        let bars: Vec<EodBar> = serde_json::from_str(
            r#"[{"date":"01/02/2024","open":1.0,"high":1.0,"low":1.0,"close":1.0,"adjusted_close":1.0,"volume":1}]"#,
        )
        .unwrap();
        let err = EodhdAdapter::parse_eod("SPY.US", bars).unwrap_err();
        assert_eq!(err.kind(), "transport_error");
    }

    #[test]
    fn parses_intraday_unix_timestamps() {
        let bars: Vec<IntradayBar> = serde_json::from_str(
            r#"[{"timestamp":1704205800,"gmtoffset":0,"datetime":"2024-01-02 14:30:00","open":472.1,"high":472.5,"low":471.9,"close":472.3,"volume":1500}]"#,
        )
        .unwrap();
        let rows = EodhdAdapter::parse_intraday("SPY.US", bars).unwrap();
        assert_eq!(rows[0].timestamp.to_iso(), "2024-01-02T14:30:00Z");
    }

    #[test]
    fn unix_bounds_cover_whole_days() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        )
        .unwrap();
        let (from, to) = unix_bounds(range);
        assert_eq!(from, 1_704_153_600);
        assert_eq!(to - from, 86_399);
    }

    #[test]
    fn missing_credential_fails_before_io() {
        let adapter = EodhdAdapter::new(&ProviderSettings {
            base_url: "http://127.0.0.1:1".into(),
            timeout_secs: 1,
            api_key_env: "UNUSED".into(),
        })
        .unwrap();
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        )
        .unwrap();
        let err = adapter
            .fetch(&ProviderSymbol::eodhd("SPY.US"), range, Frequency::Day, None)
            .unwrap_err();
        assert_eq!(err, FetchError::CredentialMissing(ProviderName::Eodhd));
    }
}
