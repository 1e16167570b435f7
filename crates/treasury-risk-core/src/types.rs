use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Currency amounts (face, book, market, gain/loss). Never f64.
pub type Money = Decimal;

/// Yields and coupon rates as fractions (0.045 = 4.5%).
pub type Rate = Decimal;

/// Year fractions under the configured day count
pub type Years = Decimal;

/// Envelope every report is returned in
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    /// Inputs the result depends on beyond the uploaded rows
    pub assumptions: serde_json::Value,
    /// Row-level problems; the rest of the result is still usable
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Wrap a result with its methodology, assumptions and run metadata.
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
