use thiserror::Error;

use crate::schema::SchemaError;

#[derive(Debug, Error)]
pub enum TreasuryRiskError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for TreasuryRiskError {
    fn from(e: serde_json::Error) -> Self {
        TreasuryRiskError::SerializationError(e.to_string())
    }
}

impl From<csv::Error> for TreasuryRiskError {
    fn from(e: csv::Error) -> Self {
        TreasuryRiskError::MalformedUpload(e.to_string())
    }
}
