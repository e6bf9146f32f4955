//! Fetch requests and the request-level validation errors.

use super::provider::ProviderName;
use super::TickerId;
use crate::tier::Tier;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that reject a whole request before any fetching begins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("request has no tickers")]
    EmptyTickers,

    #[error("request has no providers")]
    EmptyProviders,

    #[error("request was cancelled")]
    Cancelled,

    #[error("failed to start fetch workers: {0}")]
    WorkerPool(String),
}

/// Bar frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Minute,
    Hour,
    Day,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Minute => "minute",
            Frequency::Hour => "hour",
            Frequency::Day => "day",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minute" | "min" | "1m" => Ok(Frequency::Minute),
            "hour" | "hourly" | "1h" => Ok(Frequency::Hour),
            "day" | "daily" | "1d" => Ok(Frequency::Day),
            other => Err(format!("unknown frequency '{other}' (expected minute, hour or day)")),
        }
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RequestError> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.start > self.end {
            return Err(RequestError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// How rows from different providers for the same ticker are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// One row per (ticker, provider, timestamp).
    #[default]
    Separate,
    /// One row per (ticker, timestamp), first-non-absent-wins across providers.
    Merged,
}

impl FromStr for MergeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "separate" => Ok(MergeMode::Separate),
            "merged" | "merge" => Ok(MergeMode::Merged),
            other => Err(format!("unknown merge mode '{other}' (expected separate or merged)")),
        }
    }
}

/// An opaque provider secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Per-request credential lookup: provider name → secret, or absent.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    secrets: BTreeMap<ProviderName, Credential>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build credentials from any lookup function (environment, settings store, tests).
    ///
    /// Blank secrets count as absent.
    pub fn from_lookup<F>(mut lookup: F) -> Self
    where
        F: FnMut(ProviderName) -> Option<String>,
    {
        let mut creds = Self::new();
        for provider in ProviderName::ALL {
            if let Some(secret) = lookup(provider) {
                creds = creds.with(provider, secret);
            }
        }
        creds
    }

    pub fn with(mut self, provider: ProviderName, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.trim().is_empty() {
            self.secrets.insert(provider, Credential::new(secret.trim()));
        }
        self
    }

    pub fn get(&self, provider: ProviderName) -> Option<&Credential> {
        self.secrets.get(&provider)
    }

    pub fn has(&self, provider: ProviderName) -> bool {
        self.secrets.contains_key(&provider)
    }
}

/// A single aggregation request. Created per call, never persisted.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Canonical ticker ids, upper-cased and de-duplicated, in request order.
    pub tickers: Vec<TickerId>,
    pub date_range: DateRange,
    pub frequency: Frequency,
    pub tier: Tier,
    /// Providers in request order, de-duplicated.
    pub providers: Vec<ProviderName>,
    pub credentials: Credentials,
    pub merge_mode: MergeMode,
    /// Explicit merge precedence. When `None`, `providers` order is used.
    pub precedence: Option<Vec<ProviderName>>,
}

impl FetchRequest {
    pub fn new<I, S>(
        tickers: I,
        date_range: DateRange,
        frequency: Frequency,
        tier: Tier,
        providers: &[ProviderName],
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids: Vec<TickerId> = Vec::new();
        for t in tickers {
            let id = t.as_ref().trim().to_ascii_uppercase();
            if !id.is_empty() && !ids.contains(&id) {
                ids.push(id);
            }
        }
        Self {
            tickers: ids,
            date_range,
            frequency,
            tier,
            providers: dedup(providers),
            credentials: Credentials::new(),
            merge_mode: MergeMode::default(),
            precedence: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_merge_mode(mut self, mode: MergeMode) -> Self {
        self.merge_mode = mode;
        self
    }

    pub fn with_precedence(mut self, precedence: &[ProviderName]) -> Self {
        self.precedence = Some(dedup(precedence));
        self
    }

    /// Request-level checks. Any failure rejects the whole call.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.tickers.is_empty() {
            return Err(RequestError::EmptyTickers);
        }
        if self.providers.is_empty() {
            return Err(RequestError::EmptyProviders);
        }
        self.date_range.validate()
    }

    /// Provider order used by the merge stage: the explicit precedence list,
    /// then any requested provider it does not mention, in request order.
    pub fn merge_precedence(&self) -> Vec<ProviderName> {
        let mut order = self.precedence.clone().unwrap_or_default();
        for p in &self.providers {
            if !order.contains(p) {
                order.push(*p);
            }
        }
        order
    }
}

fn dedup(providers: &[ProviderName]) -> Vec<ProviderName> {
    let mut out = Vec::with_capacity(providers.len());
    for p in providers {
        if !out.contains(p) {
            out.push(*p);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn range() -> DateRange {
        DateRange::new(d(2024, 1, 2), d(2024, 1, 31)).unwrap()
    }

    #[test]
    fn date_range_rejects_inverted_bounds() {
        let err = DateRange::new(d(2024, 2, 1), d(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, RequestError::InvalidRange { .. }));
    }

    #[test]
    fn single_day_range_is_valid() {
        let r = DateRange::new(d(2024, 1, 2), d(2024, 1, 2)).unwrap();
        assert_eq!(r.days(), 1);
    }

    #[test]
    fn tickers_are_uppercased_and_deduplicated() {
        let req = FetchRequest::new(
            ["spx", "QQQ", "SPX", " "],
            range(),
            Frequency::Day,
            Tier::Lite,
            &[ProviderName::Eodhd, ProviderName::Eodhd],
        );
        assert_eq!(req.tickers, vec!["SPX", "QQQ"]);
        assert_eq!(req.providers, vec![ProviderName::Eodhd]);
    }

    #[test]
    fn validate_rejects_empty_sets() {
        let req = FetchRequest::new(
            Vec::<String>::new(),
            range(),
            Frequency::Day,
            Tier::Lite,
            &[ProviderName::Eodhd],
        );
        assert_eq!(req.validate(), Err(RequestError::EmptyTickers));

        let req = FetchRequest::new(["SPY"], range(), Frequency::Day, Tier::Lite, &[]);
        assert_eq!(req.validate(), Err(RequestError::EmptyProviders));
    }

    #[test]
    fn validate_rechecks_a_hand_built_range() {
        let mut req =
            FetchRequest::new(["SPY"], range(), Frequency::Day, Tier::Lite, &[ProviderName::Polygon]);
        req.date_range = DateRange {
            start: d(2024, 3, 1),
            end: d(2024, 2, 1),
        };
        assert!(matches!(req.validate(), Err(RequestError::InvalidRange { .. })));
    }

    #[test]
    fn merge_precedence_defaults_to_provider_order() {
        let req = FetchRequest::new(
            ["SPY"],
            range(),
            Frequency::Day,
            Tier::Lite,
            &[ProviderName::Polygon, ProviderName::Eodhd],
        );
        assert_eq!(
            req.merge_precedence(),
            vec![ProviderName::Polygon, ProviderName::Eodhd]
        );
    }

    #[test]
    fn explicit_precedence_wins_and_is_completed() {
        let req = FetchRequest::new(
            ["SPY"],
            range(),
            Frequency::Day,
            Tier::Lite,
            &[ProviderName::Polygon, ProviderName::Eodhd, ProviderName::ThetaData],
        )
        .with_precedence(&[ProviderName::Eodhd]);
        assert_eq!(
            req.merge_precedence(),
            vec![ProviderName::Eodhd, ProviderName::Polygon, ProviderName::ThetaData]
        );
    }

    #[test]
    fn blank_credentials_are_absent() {
        let creds = Credentials::new()
            .with(ProviderName::Eodhd, "   ")
            .with(ProviderName::Polygon, "key");
        assert!(!creds.has(ProviderName::Eodhd));
        assert_eq!(creds.get(ProviderName::Polygon).unwrap().expose(), "key");
    }

    #[test]
    fn credential_debug_is_redacted() {
        let c = Credential::new("super-secret");
        assert!(!format!("{c:?}").contains("super-secret"));
    }

    #[test]
    fn frequency_parses_aliases() {
        assert_eq!("daily".parse::<Frequency>().unwrap(), Frequency::Day);
        assert_eq!("1h".parse::<Frequency>().unwrap(), Frequency::Hour);
        assert!("weekly".parse::<Frequency>().is_err());
    }
}
