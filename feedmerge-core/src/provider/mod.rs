//! Provider adapter trait, per-pair error kinds, and the adapter set.
//!
//! The `ProviderAdapter` trait abstracts over the four upstream APIs so the
//! orchestrator can fan out without knowing any wire format, and so tests can
//! swap in mock adapters.

mod http;

pub mod eodhd;
pub mod polygon;

#[cfg(feature = "databento")]
pub mod databento;
#[cfg(feature = "thetadata")]
pub mod thetadata;

use crate::config::{ConfigError, EngineConfig};
use crate::domain::{
    Credential, DateRange, Frequency, ProviderName, ProviderSymbol, RawProviderRow, TickerId,
};
use crate::registry::ResolveError;
use std::collections::BTreeMap;
use thiserror::Error;

pub use eodhd::EodhdAdapter;
pub use polygon::PolygonAdapter;

#[cfg(feature = "databento")]
pub use databento::DatabentoAdapter;
#[cfg(feature = "thetadata")]
pub use thetadata::ThetaDataAdapter;

/// Failure of a single (ticker, provider) pair.
///
/// These never abort a request; they are carried in that pair's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("unknown ticker '{0}'")]
    UnknownTicker(TickerId),

    #[error("{ticker} is not supported by {provider}")]
    NotSupported {
        ticker: TickerId,
        provider: ProviderName,
    },

    #[error("no credential configured for {0}")]
    CredentialMissing(ProviderName),

    #[error("{provider} has no {frequency} bars for this symbol")]
    UnsupportedFrequency {
        provider: ProviderName,
        frequency: Frequency,
    },

    #[error("transport error{}: {message}", status_suffix(.status))]
    TransportError { status: Option<u16>, message: String },

    #[error("{0} support is not available in this build")]
    UnavailableInBuild(ProviderName),

    #[error("fetch cancelled")]
    Cancelled,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl FetchError {
    /// Stable machine-readable kind, used in exports.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::UnknownTicker(_) => "unknown_ticker",
            FetchError::NotSupported { .. } => "not_supported",
            FetchError::CredentialMissing(_) => "credential_missing",
            FetchError::UnsupportedFrequency { .. } => "unsupported_frequency",
            FetchError::TransportError { .. } => "transport_error",
            FetchError::UnavailableInBuild(_) => "unavailable_in_build",
            FetchError::Cancelled => "cancelled",
        }
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        FetchError::TransportError {
            status,
            message: message.into(),
        }
    }
}

impl From<ResolveError> for FetchError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::UnknownTicker(t) => FetchError::UnknownTicker(t),
            ResolveError::NotSupported { ticker, provider } => {
                FetchError::NotSupported { ticker, provider }
            }
        }
    }
}

/// One upstream data provider.
///
/// Implementations build the provider request, translate the frequency into the
/// provider's vocabulary, and convert the response into `RawProviderRow`s.
/// They must return `CredentialMissing` without any I/O when `credential` is
/// `None`, and must not retry.
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> ProviderName;

    fn fetch(
        &self,
        symbol: &ProviderSymbol,
        range: DateRange,
        frequency: Frequency,
        credential: Option<&Credential>,
    ) -> Result<Vec<RawProviderRow>, FetchError>;
}

/// Shared first step of every adapter.
pub(crate) fn require_credential(
    provider: ProviderName,
    credential: Option<&Credential>,
) -> Result<&Credential, FetchError> {
    credential.ok_or(FetchError::CredentialMissing(provider))
}

/// A symbol of the wrong shape for this adapter means the registry has no
/// usable mapping for it.
pub(crate) fn wrong_shape(provider: ProviderName, symbol: &ProviderSymbol) -> FetchError {
    FetchError::NotSupported {
        ticker: symbol.describe(),
        provider,
    }
}

/// Stand-in for a provider whose client support was compiled out.
#[derive(Debug, Clone, Copy)]
pub struct Unavailable(pub ProviderName);

impl ProviderAdapter for Unavailable {
    fn provider(&self) -> ProviderName {
        self.0
    }

    fn fetch(
        &self,
        _symbol: &ProviderSymbol,
        _range: DateRange,
        _frequency: Frequency,
        _credential: Option<&Credential>,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        Err(FetchError::UnavailableInBuild(self.0))
    }
}

/// The adapters available to an engine, keyed by provider.
#[derive(Default)]
pub struct Adapters {
    adapters: BTreeMap<ProviderName, Box<dyn ProviderAdapter>>,
}

impl Adapters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same provider.
    pub fn with(mut self, adapter: impl ProviderAdapter + 'static) -> Self {
        self.adapters.insert(adapter.provider(), Box::new(adapter));
        self
    }

    pub fn get(&self, provider: ProviderName) -> Option<&dyn ProviderAdapter> {
        self.adapters.get(&provider).map(|a| a.as_ref())
    }

    pub fn providers(&self) -> impl Iterator<Item = ProviderName> + '_ {
        self.adapters.keys().copied()
    }

    /// Build the HTTP adapters for every provider compiled into this build.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let p = &config.providers;
        let adapters = Self::new()
            .with(EodhdAdapter::new(&p.eodhd)?)
            .with(PolygonAdapter::new(&p.polygon)?);

        #[cfg(feature = "databento")]
        let adapters = adapters.with(DatabentoAdapter::new(&p.databento)?);
        #[cfg(not(feature = "databento"))]
        let adapters = adapters.with(Unavailable(ProviderName::Databento));

        #[cfg(feature = "thetadata")]
        let adapters = adapters.with(ThetaDataAdapter::new(&p.thetadata)?);
        #[cfg(not(feature = "thetadata"))]
        let adapters = adapters.with(Unavailable(ProviderName::ThetaData));

        Ok(adapters)
    }
}
