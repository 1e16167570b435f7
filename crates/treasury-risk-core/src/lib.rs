pub mod bond;
pub mod config;
pub mod error;
pub mod ingest;
pub mod scenario;
pub mod schedule;
pub mod schema;
pub mod session;
pub mod time_value;
pub mod types;
pub mod valuation;

#[cfg(feature = "risk")]
pub mod risk;

pub use error::TreasuryRiskError;
pub use types::*;

/// Standard result type for all treasury-risk operations
pub type TreasuryRiskResult<T> = Result<T, TreasuryRiskError>;
