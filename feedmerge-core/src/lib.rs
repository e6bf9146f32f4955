//! FeedMerge Core: multi-provider market-data aggregation.
//!
//! This crate contains the whole engine:
//! - Ticker registry mapping canonical ids to provider symbols
//! - Provider adapters for EODHD, Databento, Polygon and Theta Data
//! - Fetch orchestration with bounded concurrency and per-pair failure isolation
//! - Tier projection onto the lite (18), standard (55) and full (136) schemas
//! - Merge and CSV/JSON export

pub mod config;
pub mod domain;
pub mod export;
pub mod merge;
pub mod normalize;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod tier;

pub use config::{ConfigError, EngineConfig, ProviderSettings};
pub use domain::{
    Cell, Credentials, DateRange, FetchRequest, Frequency, MergeMode, NormalizedRow,
    ProviderName, ProviderSymbol, RawProviderRow, RequestError,
};
pub use export::{ExportError, ExportFormat};
pub use merge::{merge, ExportTable, PairError};
pub use orchestrator::{CancelToken, Engine, FetchOutcome, FetchProgress, FetchSummary};
pub use provider::{Adapters, FetchError, ProviderAdapter};
pub use registry::{CanonicalTicker, ResolveError, TickerRegistry};
pub use tier::Tier;
