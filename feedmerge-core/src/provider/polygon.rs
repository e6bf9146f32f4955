//! Polygon.io aggregates adapter.
//!
//! Uses `/v2/aggs/ticker/{symbol}/range/1/{timespan}/{from}/{to}` and follows
//! `next_url` pagination on the configured host only. Daily aggregates are stamped at midnight New York
//! time, so they are keyed by their New York calendar date.

use super::http::{self, HttpClient};
use super::{require_credential, wrong_shape, FetchError, ProviderAdapter};
use crate::config::{ConfigError, ProviderSettings};
use crate::domain::{
    BarTime, Credential, DateRange, Frequency, ProviderName, ProviderSymbol, RawProviderRow,
};
use chrono::DateTime;
use chrono_tz::America::New_York;
use serde::Deserialize;
use tracing::{debug, warn};

/// Upper bound on followed `next_url` pages for one request.
const MAX_PAGES: usize = 50;
const PAGE_LIMIT: &str = "50000";

#[derive(Debug, Deserialize)]
pub(crate) struct AggsResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    results: Option<Vec<Agg>>,
    #[serde(default)]
    next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Agg {
    /// Window start, Unix milliseconds.
    t: i64,
    o: Option<f64>,
    h: Option<f64>,
    l: Option<f64>,
    c: Option<f64>,
    v: Option<f64>,
    vw: Option<f64>,
    n: Option<f64>,
    #[serde(default)]
    otc: Option<bool>,
}

pub struct PolygonAdapter {
    http: HttpClient,
}

impl PolygonAdapter {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpClient::new(settings)?,
        })
    }

    /// `(multiplier, timespan)` for a frequency.
    pub(crate) fn timespan(frequency: Frequency) -> Option<(u32, &'static str)> {
        match frequency {
            Frequency::Minute => Some((1, "minute")),
            Frequency::Hour => Some((1, "hour")),
            Frequency::Day => Some((1, "day")),
        }
    }

    pub(crate) fn parse_page(
        symbol: &str,
        frequency: Frequency,
        page: AggsResponse,
    ) -> Result<(Vec<RawProviderRow>, Option<String>), FetchError> {
        if page.status.as_deref() == Some("ERROR") {
            let message = page
                .error
                .or(page.message)
                .unwrap_or_else(|| "upstream reported an error".into());
            return Err(FetchError::transport(Some(200), message));
        }

        let mut rows = Vec::new();
        for agg in page.results.unwrap_or_default() {
            let instant = DateTime::from_timestamp_millis(agg.t).ok_or_else(|| {
                FetchError::transport(Some(200), format!("invalid timestamp {}", agg.t))
            })?;
            let timestamp = match frequency {
                Frequency::Day => BarTime::Date(instant.with_timezone(&New_York).date_naive()),
                Frequency::Minute | Frequency::Hour => BarTime::Instant(instant),
            };
            let row = RawProviderRow::new(timestamp)
                .ohlcv(agg.o, agg.h, agg.l, agg.c, agg.v)
                .extra("vwap", agg.vw)
                .extra("trade_count", agg.n)
                .extra("otc", agg.otc.map(|b| b.to_string()))
                .extra("source_symbol", Some(symbol));
            if !row.is_empty_bar() {
                rows.push(row);
            }
        }
        Ok((rows, page.next_url))
    }

    fn fetch_aggs(
        &self,
        symbol: &str,
        range: DateRange,
        frequency: Frequency,
        (multiplier, timespan): (u32, &str),
        key: &Credential,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        let url = self.http.url(&format!(
            "/v2/aggs/ticker/{symbol}/range/{multiplier}/{timespan}/{}/{}",
            range.start.format("%Y-%m-%d"),
            range.end.format("%Y-%m-%d"),
        ));
        debug!(provider = "polygon", %url, "requesting aggregates");

        let first = self.http.get(&url).query(&[
            ("adjusted", "true"),
            ("sort", "asc"),
            ("limit", PAGE_LIMIT),
            ("apiKey", key.expose()),
        ]);
        let response = http::check_status(self.http.send(first)?)?;
        let (mut rows, mut next) = Self::parse_page(symbol, frequency, http::read_json(response)?)?;

        let mut pages = 1;
        while let Some(next_url) = next.take() {
            if pages >= MAX_PAGES {
                warn!(provider = "polygon", symbol, pages, "pagination limit reached, truncating");
                break;
            }
            self.http.check_next_url(&next_url)?;
            let request = self.http.get(&next_url).query(&[("apiKey", key.expose())]);
            let response = http::check_status(self.http.send(request)?)?;
            let (more, following) = Self::parse_page(symbol, frequency, http::read_json(response)?)?;
            rows.extend(more);
            next = following;
            pages += 1;
        }
        Ok(rows)
    }
}

impl ProviderAdapter for PolygonAdapter {
    fn provider(&self) -> ProviderName {
        ProviderName::Polygon
    }

    fn fetch(
        &self,
        symbol: &ProviderSymbol,
        range: DateRange,
        frequency: Frequency,
        credential: Option<&Credential>,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        let key = require_credential(ProviderName::Polygon, credential)?;
        let ProviderSymbol::Polygon { symbol } = symbol else {
            return Err(wrong_shape(ProviderName::Polygon, symbol));
        };
        let span = Self::timespan(frequency).ok_or(FetchError::UnsupportedFrequency {
            provider: ProviderName::Polygon,
            frequency,
        })?;
        self.fetch_aggs(symbol, range, frequency, span, key)
    }
}
