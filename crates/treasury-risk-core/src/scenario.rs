use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bond::BondRecord;
use crate::error::TreasuryRiskError;
use crate::types::Rate;
use crate::TreasuryRiskResult;

/// Basis points to a fractional rate (25 bps = 0.0025).
pub fn bps(value: Decimal) -> Rate {
    value / dec!(10000)
}

/// Yield scenario for marking a portfolio.
///
/// Effective yield per bond = `(ytm or purchase YTM) + parallel_shift +
/// isin_shifts[isin]`. The default scenario marks every bond at its own
/// purchase YTM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Scenario {
    /// Flat YTM replacing each bond's purchase YTM
    pub ytm: Option<Rate>,
    /// Shock added to every bond
    pub parallel_shift: Rate,
    /// Shock added per ISIN (keys upper-cased)
    pub isin_shifts: BTreeMap<String, Rate>,
}

impl Scenario {
    pub fn flat(ytm: Rate) -> Self {
        Scenario {
            ytm: Some(ytm),
            ..Scenario::default()
        }
    }

    pub fn with_parallel_shift(mut self, shift: Rate) -> Self {
        self.parallel_shift = shift;
        self
    }

    pub fn with_isin_shift(mut self, isin: &str, shift: Rate) -> Self {
        self.isin_shifts.insert(isin.trim().to_uppercase(), shift);
        self
    }

    /// True when every bond is marked at its purchase YTM.
    pub fn is_base(&self) -> bool {
        self.ytm.is_none()
            && self.parallel_shift.is_zero()
            && self.isin_shifts.values().all(|s| s.is_zero())
    }

    pub fn validate(&self) -> TreasuryRiskResult<()> {
        if let Some(ytm) = self.ytm {
            if ytm <= dec!(-1) {
                return Err(TreasuryRiskError::InvalidInput {
                    field: "scenario_ytm".into(),
                    reason: "Scenario YTM must be greater than -100%".into(),
                });
            }
        }
        Ok(())
    }

    pub fn shift_for(&self, isin: Option<&str>) -> Rate {
        let specific = isin
            .and_then(|i| self.isin_shifts.get(&i.trim().to_uppercase()))
            .copied()
            .unwrap_or(Decimal::ZERO);
        self.parallel_shift + specific
    }

    /// Yield the bond is marked at under this scenario.
    pub fn effective_ytm(&self, record: &BondRecord) -> Rate {
        self.ytm.unwrap_or(record.purchase_ytm) + self.shift_for(record.isin.as_deref())
    }
}
