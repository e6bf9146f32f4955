//! Ticker registry: canonical ids mapped to provider-specific symbols.
//!
//! The built-in table is constructed once and is read-only for the life of
//! the process. Absent provider entries are valid and mean the provider does
//! not carry that instrument.

use crate::domain::{ProviderName, ProviderSymbol, TickerId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use thiserror::Error;

/// Lookup failures. The two kinds are handled differently by the orchestrator:
/// an unknown ticker is a request problem, a missing mapping only skips one provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unknown ticker '{0}'")]
    UnknownTicker(TickerId),

    #[error("{ticker} is not supported by {provider}")]
    NotSupported {
        ticker: TickerId,
        provider: ProviderName,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate ticker id '{0}'")]
    DuplicateId(TickerId),

    #[error("ticker id must not be empty")]
    EmptyId,
}

/// A provider-independent instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalTicker {
    pub id: TickerId,
    pub label: String,
    provider_symbols: BTreeMap<ProviderName, ProviderSymbol>,
}

impl CanonicalTicker {
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.trim().to_ascii_uppercase(),
            label: label.to_string(),
            provider_symbols: BTreeMap::new(),
        }
    }

    /// Add a provider mapping. The map key always comes from the symbol variant,
    /// so a Databento record can never be filed under Polygon.
    pub fn with(mut self, symbol: ProviderSymbol) -> Self {
        self.provider_symbols.insert(symbol.provider(), symbol);
        self
    }

    pub fn symbol_for(&self, provider: ProviderName) -> Option<&ProviderSymbol> {
        self.provider_symbols.get(&provider)
    }

    pub fn supports(&self, provider: ProviderName) -> bool {
        self.provider_symbols.contains_key(&provider)
    }

    pub fn providers(&self) -> impl Iterator<Item = ProviderName> + '_ {
        self.provider_symbols.keys().copied()
    }
}

/// Immutable canonical-id → provider symbol table.
#[derive(Debug, Clone)]
pub struct TickerRegistry {
    entries: Vec<CanonicalTicker>,
    index: HashMap<TickerId, usize>,
}

impl TickerRegistry {
    /// Build a registry, rejecting empty or duplicate ids.
    pub fn from_entries(entries: Vec<CanonicalTicker>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if entry.id.is_empty() {
                return Err(RegistryError::EmptyId);
            }
            if index.insert(entry.id.clone(), i).is_some() {
                return Err(RegistryError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(Self { entries, index })
    }

    /// The process-wide built-in registry.
    pub fn builtin() -> &'static TickerRegistry {
        static REGISTRY: OnceLock<TickerRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            let entries = builtin_entries();
            let index = entries
                .iter()
                .enumerate()
                .map(|(i, e)| (e.id.clone(), i))
                .collect();
            TickerRegistry { entries, index }
        })
    }

    /// Resolve a canonical id for one provider. Ids match case-insensitively.
    pub fn resolve(
        &self,
        canonical_id: &str,
        provider: ProviderName,
    ) -> Result<&ProviderSymbol, ResolveError> {
        let ticker = self
            .get(canonical_id)
            .ok_or_else(|| ResolveError::UnknownTicker(canonical_id.trim().to_ascii_uppercase()))?;
        ticker
            .symbol_for(provider)
            .ok_or_else(|| ResolveError::NotSupported {
                ticker: ticker.id.clone(),
                provider,
            })
    }

    pub fn get(&self, canonical_id: &str) -> Option<&CanonicalTicker> {
        let key = canonical_id.trim().to_ascii_uppercase();
        self.index.get(&key).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, canonical_id: &str) -> bool {
        self.get(canonical_id).is_some()
    }

    /// Autocomplete search: ids starting with `prefix` first, then labels
    /// containing it. Table order within each group.
    pub fn search(&self, prefix: &str) -> Vec<&CanonicalTicker> {
        let needle = prefix.trim().to_ascii_uppercase();
        if needle.is_empty() {
            return self.entries.iter().collect();
        }
        let mut hits: Vec<&CanonicalTicker> = self
            .entries
            .iter()
            .filter(|e| e.id.starts_with(&needle))
            .collect();
        for e in &self.entries {
            if !hits.iter().any(|h| h.id == e.id) && e.label.to_ascii_uppercase().contains(&needle)
            {
                hits.push(e);
            }
        }
        hits
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalTicker> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn us_equity(id: &str, label: &str, databento_dataset: &str) -> CanonicalTicker {
    CanonicalTicker::new(id, label)
        .with(ProviderSymbol::eodhd(format!("{id}.US")))
        .with(ProviderSymbol::databento(id, databento_dataset, "ohlcv"))
        .with(ProviderSymbol::polygon(id))
        .with(ProviderSymbol::thetadata(id))
}

fn builtin_entries() -> Vec<CanonicalTicker> {
    vec![
        CanonicalTicker::new("SPX", "S&P 500 Index")
            .with(ProviderSymbol::eodhd("SPX.INDX"))
            .with(ProviderSymbol::polygon("I:SPX")),
        CanonicalTicker::new("NDX", "Nasdaq-100 Index")
            .with(ProviderSymbol::eodhd("NDX.INDX"))
            .with(ProviderSymbol::polygon("I:NDX")),
        CanonicalTicker::new("DJI", "Dow Jones Industrial Average")
            .with(ProviderSymbol::eodhd("DJI.INDX"))
            .with(ProviderSymbol::polygon("I:DJI")),
        CanonicalTicker::new("RUT", "Russell 2000 Index")
            .with(ProviderSymbol::eodhd("RUT.INDX"))
            .with(ProviderSymbol::polygon("I:RUT")),
        CanonicalTicker::new("VIX", "CBOE Volatility Index")
            .with(ProviderSymbol::eodhd("VIX.INDX"))
            .with(ProviderSymbol::polygon("I:VIX")),
        us_equity("SPY", "SPDR S&P 500 ETF Trust", "DBEQ.BASIC"),
        us_equity("QQQ", "Invesco QQQ Trust", "XNAS.ITCH"),
        us_equity("IWM", "iShares Russell 2000 ETF", "DBEQ.BASIC"),
        us_equity("DIA", "SPDR Dow Jones Industrial Average ETF", "DBEQ.BASIC"),
        us_equity("AAPL", "Apple Inc.", "XNAS.ITCH"),
        us_equity("MSFT", "Microsoft Corp.", "XNAS.ITCH"),
        us_equity("NVDA", "NVIDIA Corp.", "XNAS.ITCH"),
        us_equity("AMZN", "Amazon.com Inc.", "XNAS.ITCH"),
        us_equity("TSLA", "Tesla Inc.", "XNAS.ITCH"),
        CanonicalTicker::new("ES", "E-mini S&P 500 Futures (front month)")
            .with(ProviderSymbol::databento("ES.c.0", "GLBX.MDP3", "ohlcv")),
        CanonicalTicker::new("NQ", "E-mini Nasdaq-100 Futures (front month)")
            .with(ProviderSymbol::databento("NQ.c.0", "GLBX.MDP3", "ohlcv")),
        CanonicalTicker::new("GC", "Gold Futures (front month)")
            .with(ProviderSymbol::eodhd("GC.COMM"))
            .with(ProviderSymbol::databento("GC.c.0", "GLBX.MDP3", "ohlcv")),
        CanonicalTicker::new("CL", "Crude Oil WTI Futures (front month)")
            .with(ProviderSymbol::eodhd("CL.COMM"))
            .with(ProviderSymbol::databento("CL.c.0", "GLBX.MDP3", "ohlcv")),
        CanonicalTicker::new("BTCUSD", "Bitcoin / US Dollar")
            .with(ProviderSymbol::eodhd("BTC-USD.CC"))
            .with(ProviderSymbol::polygon("X:BTCUSD")),
        CanonicalTicker::new("EURUSD", "Euro / US Dollar")
            .with(ProviderSymbol::eodhd("EURUSD.FOREX"))
            .with(ProviderSymbol::polygon("C:EURUSD")),
    ]
}
