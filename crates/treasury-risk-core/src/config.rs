//! Ingest and valuation settings.
//!
//! Every field has a default, so an empty config document is valid. The CLI
//! loads this from YAML; library callers build it directly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::TreasuryRiskError;
use crate::schedule::{validate_frequency, DayCount};
use crate::schema::{CanonicalField, ColumnAliases};
use crate::TreasuryRiskResult;

/// How bare rate cells (no `%` suffix) are read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateConvention {
    /// `0.045` means 4.5%
    #[default]
    Fraction,
    /// `4.5` means 4.5%
    Percent,
}

/// Book value amortization policy when book value is not supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmortizationPolicy {
    /// Premium/discount accreted linearly in calendar days
    #[default]
    StraightLine,
    /// Carrying value = PV of remaining flows at the purchase yield
    EffectiveInterest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub rate_convention: RateConvention,
    /// chrono format strings, tried in order
    pub date_formats: Vec<String>,
    /// Header variants added to the built-in alias table
    pub extra_aliases: BTreeMap<CanonicalField, Vec<String>>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            rate_convention: RateConvention::Fraction,
            date_formats: ["%Y-%m-%d", "%Y/%m/%d", "%d-%b-%Y", "%d %b %Y", "%m/%d/%Y"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extra_aliases: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    /// Coupons and compounding periods per year: 1, 2, 4 or 12
    pub coupon_frequency: u8,
    pub day_count: DayCount,
    pub amortization: AmortizationPolicy,
    /// Decimal places for reported money values
    pub money_scale: u32,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            coupon_frequency: 1,
            day_count: DayCount::Actual365,
            amortization: AmortizationPolicy::StraightLine,
            money_scale: 2,
        }
    }
}

impl ValuationConfig {
    pub fn validate(&self) -> TreasuryRiskResult<()> {
        validate_frequency(self.coupon_frequency)?;
        if self.money_scale > 10 {
            return Err(TreasuryRiskError::InvalidInput {
                field: "money_scale".into(),
                reason: "Money scale must be between 0 and 10".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub valuation: ValuationConfig,
}

impl Config {
    pub fn validate(&self) -> TreasuryRiskResult<()> {
        if self.ingest.date_formats.is_empty() {
            return Err(TreasuryRiskError::Config(
                "at least one date format is required".into(),
            ));
        }
        self.valuation.validate()?;
        self.aliases().map(|_| ())
    }

    /// Built-in alias table extended with `ingest.extra_aliases`.
    pub fn aliases(&self) -> TreasuryRiskResult<ColumnAliases> {
        ColumnAliases::with_extra(&self.ingest.extra_aliases)
    }
}
