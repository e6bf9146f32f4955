//! Fetch orchestrator: fans a request out to (ticker, provider) pairs.
//!
//! Pairs run on a private rayon pool sized to `max_in_flight`. Every pair yields
//! exactly one `FetchOutcome`, successful or not, and outcomes come back in
//! canonical order (tickers in request order, then providers in request order)
//! regardless of completion order.

use crate::config::{ConfigError, EngineConfig};
use crate::domain::{FetchRequest, NormalizedRow, ProviderName, RequestError, TickerId};
use crate::normalize;
use crate::provider::{Adapters, FetchError};
use crate::registry::TickerRegistry;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cooperative cancellation flag shared between the caller and the engine.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one (ticker, provider) pair.
///
/// An outcome with no error and no rows means the provider had no data for the
/// range, which is distinct from a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub ticker: TickerId,
    pub provider: ProviderName,
    pub rows: Vec<NormalizedRow>,
    pub error: Option<FetchError>,
}

impl FetchOutcome {
    fn failed(ticker: &str, provider: ProviderName, error: FetchError) -> Self {
        Self {
            ticker: ticker.to_string(),
            provider,
            rows: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// One-line status for summaries, e.g. `SPX/eodhd: ok, 21 rows`.
    pub fn status_line(&self) -> String {
        match &self.error {
            None => format!("{}/{}: ok, {} rows", self.ticker, self.provider, self.rows.len()),
            Some(e) => format!("{}/{}: {} ({e})", self.ticker, self.provider, e.kind()),
        }
    }
}

/// Aggregate counts over a set of outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rows: usize,
}

impl FetchSummary {
    pub fn from_outcomes(outcomes: &[FetchOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for o in outcomes {
            if o.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            summary.rows += o.rows.len();
        }
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Progress callbacks. Called from worker threads, in completion order.
pub trait FetchProgress: Send + Sync {
    /// Called when a pair finishes, successfully or not.
    fn on_complete(&self, outcome: &FetchOutcome);

    /// Called once all pairs are collected.
    fn on_batch_complete(&self, summary: &FetchSummary);
}

/// Discards progress.
pub struct NoProgress;

impl FetchProgress for NoProgress {
    fn on_complete(&self, _outcome: &FetchOutcome) {}
    fn on_batch_complete(&self, _summary: &FetchSummary) {}
}

/// Prints one line per pair to stderr.
pub struct StderrProgress;

impl FetchProgress for StderrProgress {
    fn on_complete(&self, outcome: &FetchOutcome) {
        let tag = if outcome.is_success() { "OK" } else { "FAIL" };
        eprintln!("  {tag}: {}", outcome.status_line());
    }

    fn on_batch_complete(&self, summary: &FetchSummary) {
        eprintln!(
            "\nFetch complete: {}/{} pairs succeeded, {} failed, {} rows",
            summary.succeeded, summary.total, summary.failed, summary.rows
        );
    }
}

/// The aggregation engine: a registry, an adapter set and a concurrency bound.
pub struct Engine<'r> {
    registry: &'r TickerRegistry,
    adapters: Adapters,
    max_in_flight: usize,
}

impl Engine<'static> {
    /// Engine over the built-in registry with HTTP adapters from `config`.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Engine::new(
            TickerRegistry::builtin(),
            Adapters::from_config(config)?,
            config.max_in_flight,
        ))
    }
}

impl<'r> Engine<'r> {
    /// `max_in_flight` is clamped to at least 1.
    pub fn new(registry: &'r TickerRegistry, adapters: Adapters, max_in_flight: usize) -> Self {
        Self {
            registry,
            adapters,
            max_in_flight: max_in_flight.max(1),
        }
    }

    pub fn registry(&self) -> &TickerRegistry {
        self.registry
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Run a request to completion with no cancellation and no progress output.
    pub fn execute(&self, request: &FetchRequest) -> Result<Vec<FetchOutcome>, RequestError> {
        self.execute_with(request, &CancelToken::new(), &NoProgress)
    }

    /// Run a request. Returns `|tickers| × |providers|` outcomes in canonical
    /// order, or `Cancelled` (and no outcomes) if `cancel` fires before return.
    pub fn execute_with(
        &self,
        request: &FetchRequest,
        cancel: &CancelToken,
        progress: &dyn FetchProgress,
    ) -> Result<Vec<FetchOutcome>, RequestError> {
        request.validate()?;
        if cancel.is_cancelled() {
            return Err(RequestError::Cancelled);
        }

        let pairs: Vec<(&str, ProviderName)> = request
            .tickers
            .iter()
            .flat_map(|t| request.providers.iter().map(move |p| (t.as_str(), *p)))
            .collect();
        info!(
            tickers = request.tickers.len(),
            providers = request.providers.len(),
            pairs = pairs.len(),
            frequency = %request.frequency,
            tier = %request.tier,
            start = %request.date_range.start,
            end = %request.date_range.end,
            "starting fetch"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_in_flight)
            .thread_name(|i| format!("feedmerge-fetch-{i}"))
            .build()
            .map_err(|e| RequestError::WorkerPool(e.to_string()))?;

        let outcomes: Vec<FetchOutcome> = pool.install(|| {
            pairs
                .par_iter()
                .map(|&(ticker, provider)| {
                    let outcome = self.run_pair(request, ticker, provider, cancel);
                    progress.on_complete(&outcome);
                    outcome
                })
                .collect()
        });

        if cancel.is_cancelled() || outcomes.iter().any(|o| o.error == Some(FetchError::Cancelled)) {
            warn!("fetch cancelled, discarding partial outcomes");
            return Err(RequestError::Cancelled);
        }

        let summary = FetchSummary::from_outcomes(&outcomes);
        progress.on_batch_complete(&summary);
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            rows = summary.rows,
            "fetch complete"
        );
        Ok(outcomes)
    }

    /// Resolve, fetch once, normalize. Never panics on adapter failure.
    fn run_pair(
        &self,
        request: &FetchRequest,
        ticker: &str,
        provider: ProviderName,
        cancel: &CancelToken,
    ) -> FetchOutcome {
        let symbol = match self.registry.resolve(ticker, provider) {
            Ok(symbol) => symbol,
            Err(e) => {
                debug!(ticker, %provider, error = %e, "not resolved");
                return FetchOutcome::failed(ticker, provider, e.into());
            }
        };
        let Some(adapter) = self.adapters.get(provider) else {
            return FetchOutcome::failed(ticker, provider, FetchError::UnavailableInBuild(provider));
        };
        if cancel.is_cancelled() {
            return FetchOutcome::failed(ticker, provider, FetchError::Cancelled);
        }

        debug!(ticker, %provider, symbol = %symbol.describe(), "fetching");
        let result = adapter.fetch(
            symbol,
            request.date_range,
            request.frequency,
            request.credentials.get(provider),
        );
        match result {
            Ok(rows) => {
                let raw = rows.len();
                let rows = normalize::project_all(rows, ticker, provider, request.tier);
                debug!(ticker, %provider, rows = raw, "fetched");
                FetchOutcome {
                    ticker: ticker.to_string(),
                    provider,
                    rows,
                    error: None,
                }
            }
            Err(e) => {
                warn!(ticker, %provider, kind = e.kind(), error = %e, "pair failed");
                FetchOutcome::failed(ticker, provider, e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BarTime, Credential, Credentials, DateRange, Frequency, ProviderSymbol, RawProviderRow,
    };
    use crate::provider::ProviderAdapter;
    use crate::tier::Tier;
    use chrono::NaiveDate;

    struct Fixed(ProviderName);

    impl ProviderAdapter for Fixed {
        fn provider(&self) -> ProviderName {
            self.0
        }

        fn fetch(
            &self,
            _symbol: &ProviderSymbol,
            range: DateRange,
            _frequency: Frequency,
            credential: Option<&Credential>,
        ) -> Result<Vec<RawProviderRow>, FetchError> {
            credential.ok_or(FetchError::CredentialMissing(self.0))?;
            Ok(vec![RawProviderRow::new(BarTime::Date(range.start)).ohlcv(
                Some(1.0),
                Some(2.0),
                Some(0.5),
                Some(1.5),
                Some(100.0),
            )])
        }
    }

    fn request(tickers: &[&str], providers: &[ProviderName]) -> FetchRequest {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        FetchRequest::new(
            tickers.iter().copied(),
            DateRange::new(d, d).unwrap(),
            Frequency::Day,
            Tier::Lite,
            providers,
        )
    }

    fn engine() -> Engine<'static> {
        let adapters = Adapters::new()
            .with(Fixed(ProviderName::Eodhd))
            .with(Fixed(ProviderName::Polygon));
        Engine::new(TickerRegistry::builtin(), adapters, 2)
    }

    #[test]
    fn missing_adapter_is_unavailable_in_build() {
        let req = request(&["SPY"], &[ProviderName::Databento])
            .with_credentials(Credentials::new().with(ProviderName::Databento, "k"));
        let outcomes = engine().execute(&req).unwrap();
        assert_eq!(
            outcomes[0].error,
            Some(FetchError::UnavailableInBuild(ProviderName::Databento))
        );
    }

    #[test]
    fn pre_cancelled_token_rejects_request() {
        let token = CancelToken::new();
        token.cancel();
        let req = request(&["SPY"], &[ProviderName::Eodhd]);
        let err = engine().execute_with(&req, &token, &NoProgress).unwrap_err();
        assert_eq!(err, RequestError::Cancelled);
    }

    #[test]
    fn invalid_request_is_rejected_before_fetching() {
        let req = request(&[], &[ProviderName::Eodhd]);
        assert_eq!(engine().execute(&req).unwrap_err(), RequestError::EmptyTickers);
    }

    #[test]
    fn max_in_flight_is_at_least_one() {
        let e = Engine::new(TickerRegistry::builtin(), Adapters::new(), 0);
        assert_eq!(e.max_in_flight(), 1);
    }

    #[test]
    fn summary_counts_rows_and_failures() {
        let req = request(&["SPY", "ZZZZ"], &[ProviderName::Eodhd])
            .with_credentials(Credentials::new().with(ProviderName::Eodhd, "k"));
        let outcomes = engine().execute(&req).unwrap();
        let summary = FetchSummary::from_outcomes(&outcomes);
        assert_eq!(
            summary,
            FetchSummary {
                total: 2,
                succeeded: 1,
                failed: 1,
                rows: 1
            }
        );
        assert_eq!(outcomes[0].status_line(), "SPY/eodhd: ok, 1 rows");
        assert!(outcomes[1].status_line().starts_with("ZZZZ/eodhd: unknown_ticker"));
    }
}
