//! Theta Data adapter (v2 REST terminal).
//!
//! Responses are a `header` with a column `format` list plus a `response`
//! array of positional rows. Intraday rows carry `ms_of_day` in New York local
//! time; they are converted to UTC instants. HTTP 472 means "no data" and is
//! an empty result, not a failure.

use super::http::{self, value_f64, HttpClient};
use super::{require_credential, wrong_shape, FetchError, ProviderAdapter};
use crate::config::{ConfigError, ProviderSettings};
use crate::domain::{
    BarTime, Credential, DateRange, Frequency, ProviderName, ProviderSymbol, RawProviderRow,
};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

const NO_DATA_STATUS: u16 = 472;
const MAX_PAGES: usize = 50;
const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Deserialize)]
pub(crate) struct ThetaResponse {
    header: ThetaHeader,
    #[serde(default)]
    response: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ThetaHeader {
    #[serde(default)]
    format: Vec<String>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error_msg: Option<String>,
    #[serde(default)]
    next_page: Option<String>,
}

/// Endpoint and interval for a frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    Eod,
    Ohlc { ivl_ms: u32 },
}

pub struct ThetaDataAdapter {
    http: HttpClient,
}

/// Milliseconds since local midnight as a wall-clock time. `None` outside `[0, 24h)`.
fn time_of_day(ms: f64) -> Option<NaiveTime> {
    if !(0.0..MS_PER_DAY).contains(&ms) {
        return None;
    }
    let ms = ms as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(ms / 1_000, (ms % 1_000) * 1_000_000)
}

/// Treat the literal string "null" the same as a missing header value.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty() && v != "null")
}

impl ThetaDataAdapter {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpClient::new(settings)?,
        })
    }

    pub(crate) fn endpoint(frequency: Frequency) -> Option<Endpoint> {
        match frequency {
            Frequency::Minute => Some(Endpoint::Ohlc { ivl_ms: 60_000 }),
            Frequency::Hour => Some(Endpoint::Ohlc { ivl_ms: 3_600_000 }),
            Frequency::Day => Some(Endpoint::Eod),
        }
    }

    /// Parse one response page. Returns the rows and the next page URL, if any.
    pub(crate) fn parse_page(
        root: &str,
        frequency: Frequency,
        page: ThetaResponse,
    ) -> Result<(Vec<RawProviderRow>, Option<String>), FetchError> {
        let header = page.header;
        if let Some(kind) = present(header.error_type) {
            if kind == "NO_DATA" {
                return Ok((Vec::new(), None));
            }
            let msg = present(header.error_msg).unwrap_or_default();
            return Err(FetchError::transport(Some(200), format!("{kind}: {msg}")));
        }

        let columns: HashMap<&str, usize> = header
            .format
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        let field = |row: &[Value], name: &str| -> Option<f64> {
            columns.get(name).and_then(|&i| value_f64(row.get(i)))
        };

        let mut rows = Vec::with_capacity(page.response.len());
        for raw in &page.response {
            let date = field(raw, "date")
                .and_then(|d| NaiveDate::parse_from_str(&format!("{}", d as i64), "%Y%m%d").ok())
                .ok_or_else(|| FetchError::transport(Some(200), "row without a valid date"))?;

            let timestamp = match frequency {
                Frequency::Day => BarTime::Date(date),
                Frequency::Minute | Frequency::Hour => {
                    let time = field(raw, "ms_of_day").and_then(time_of_day).ok_or_else(|| {
                        FetchError::transport(Some(200), "intraday row without a valid ms_of_day")
                    })?;
                    let local = date.and_time(time);
                    let instant = New_York
                        .from_local_datetime(&local)
                        .earliest()
                        .ok_or_else(|| {
                            FetchError::transport(Some(200), format!("nonexistent local time {local}"))
                        })?
                        .with_timezone(&Utc);
                    BarTime::Instant(instant)
                }
            };

            let row = RawProviderRow::new(timestamp)
                .ohlcv(
                    field(raw, "open"),
                    field(raw, "high"),
                    field(raw, "low"),
                    field(raw, "close"),
                    field(raw, "volume"),
                )
                .extra("trade_count", field(raw, "count"))
                .extra("bid", field(raw, "bid"))
                .extra("ask", field(raw, "ask"))
                .extra("bid_size", field(raw, "bid_size"))
                .extra("ask_size", field(raw, "ask_size"))
                .extra("timezone", Some("America/New_York"))
                .extra("source_symbol", Some(root));

            // Intraday rows outside trading hours come back as all-zero bars.
            let zero_bar = row.volume == Some(0.0)
                && row.open == Some(0.0)
                && row.close == Some(0.0);
            if !row.is_empty_bar() && !zero_bar {
                rows.push(row);
            }
        }
        Ok((rows, present(header.next_page)))
    }

    fn fetch_pages(
        &self,
        root: &str,
        range: DateRange,
        frequency: Frequency,
        endpoint: Endpoint,
        key: &Credential,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        let start = range.start.format("%Y%m%d").to_string();
        let end = range.end.format("%Y%m%d").to_string();
        let (url, ivl) = match endpoint {
            Endpoint::Eod => (self.http.url("/v2/hist/stock/eod"), None),
            Endpoint::Ohlc { ivl_ms } => (self.http.url("/v2/hist/stock/ohlc"), Some(ivl_ms.to_string())),
        };
        debug!(provider = "thetadata", %url, root, "requesting history");

        let mut query = vec![
            ("root", root.to_string()),
            ("start_date", start),
            ("end_date", end),
        ];
        if let Some(ivl) = ivl {
            query.push(("ivl", ivl));
            query.push(("rth", "true".to_string()));
        }

        let mut rows = Vec::new();
        let mut request = Some(self.http.get(&url).query(&query));
        let mut pages = 0;
        while let Some(req) = request.take() {
            let response = self.http.send(req.bearer_auth(key.expose()))?;
            if response.status().as_u16() == NO_DATA_STATUS {
                break;
            }
            let response = http::check_status(response)?;
            let (more, next) = Self::parse_page(root, frequency, http::read_json(response)?)?;
            rows.extend(more);
            pages += 1;
            if let Some(next_url) = next {
                if pages >= MAX_PAGES {
                    warn!(provider = "thetadata", root, pages, "pagination limit reached, truncating");
                    break;
                }
                self.http.check_next_url(&next_url)?;
                request = Some(self.http.get(&next_url));
            }
        }
        Ok(rows)
    }
}

impl ProviderAdapter for ThetaDataAdapter {
    fn provider(&self) -> ProviderName {
        ProviderName::ThetaData
    }

    fn fetch(
        &self,
        symbol: &ProviderSymbol,
        range: DateRange,
        frequency: Frequency,
        credential: Option<&Credential>,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        let key = require_credential(ProviderName::ThetaData, credential)?;
        let ProviderSymbol::ThetaData { root } = symbol else {
            return Err(wrong_shape(ProviderName::ThetaData, symbol));
        };
        let endpoint = Self::endpoint(frequency).ok_or(FetchError::UnsupportedFrequency {
            provider: ProviderName::ThetaData,
            frequency,
        })?;
        self.fetch_pages(root, range, frequency, endpoint, key)
    }
}
