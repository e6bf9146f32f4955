//! Domain types for FeedMerge

pub mod provider;
pub mod request;
pub mod row;

pub use provider::{DatabentoSymbol, ParseProviderError, ProviderName, ProviderSymbol};
pub use request::{
    Credential, Credentials, DateRange, FetchRequest, Frequency, MergeMode, RequestError,
};
pub use row::{BarTime, Cell, NormalizedRow, RawProviderRow, RawValue};

/// Canonical ticker identifier (upper-case, provider independent).
pub type TickerId = String;
