use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::TreasuryRiskError;
use crate::schedule::Cashflow;
use crate::types::{Money, Rate, Years};
use crate::TreasuryRiskResult;

/// Error for a product or sum that does not fit in a `Decimal`.
pub(crate) fn overflow(field: &str, context: &str) -> TreasuryRiskError {
    TreasuryRiskError::InvalidInput {
        field: field.into(),
        reason: format!("Arithmetic overflow in {context}"),
    }
}

/// Periodic yield `y / f`, rejecting yields at or below -100%.
fn periodic_base(rate: Rate, frequency: u8) -> TreasuryRiskResult<Decimal> {
    if rate <= dec!(-1) {
        return Err(TreasuryRiskError::InvalidInput {
            field: "ytm".into(),
            reason: "Yield must be greater than -100%".into(),
        });
    }
    let base = Decimal::ONE + rate / Decimal::from(frequency.max(1));
    if base <= Decimal::ZERO {
        return Err(TreasuryRiskError::DivisionByZero {
            context: "compounding base (1 + y/f)".into(),
        });
    }
    Ok(base)
}

/// `(1 + y/f)^(f * years)`.
///
/// The whole number of periods is compounded with `powi`; only the
/// fractional remainder goes through `powd`.
pub fn compound_factor(rate: Rate, frequency: u8, years: Years) -> TreasuryRiskResult<Decimal> {
    let base = periodic_base(rate, frequency)?;
    let periods = years * Decimal::from(frequency.max(1));
    if periods.is_zero() || base == Decimal::ONE {
        return Ok(Decimal::ONE);
    }

    let whole = periods.trunc();
    let frac = periods - whole;
    let whole_i = whole.to_i64().ok_or_else(|| TreasuryRiskError::InvalidInput {
        field: "years".into(),
        reason: format!("Period count {whole} out of range"),
    })?;

    let compounding_overflow = || TreasuryRiskError::InvalidInput {
        field: "ytm".into(),
        reason: format!("Compounding overflow for base {base} over {periods} periods"),
    };
    let whole_factor = base.checked_powi(whole_i).ok_or_else(compounding_overflow)?;
    let frac_factor = if frac.is_zero() {
        Decimal::ONE
    } else {
        base.checked_powd(frac).ok_or_else(compounding_overflow)?
    };

    whole_factor.checked_mul(frac_factor).ok_or_else(compounding_overflow)
}

/// Discount factor `1 / compound_factor`.
pub fn discount_factor(rate: Rate, frequency: u8, years: Years) -> TreasuryRiskResult<Decimal> {
    let factor = compound_factor(rate, frequency, years)?;
    if factor.is_zero() {
        return Err(TreasuryRiskError::DivisionByZero {
            context: format!("discount factor at {years} years"),
        });
    }
    Decimal::ONE
        .checked_div(factor)
        .ok_or_else(|| overflow("ytm", &format!("discount factor at {years} years")))
}

/// Present value of dated cash flows at a single yield.
///
/// Fails with `InvalidInput` instead of overflowing when a deeply negative
/// yield or a huge notional pushes the sum past `Decimal::MAX`.
pub fn present_value(flows: &[Cashflow], rate: Rate, frequency: u8) -> TreasuryRiskResult<Money> {
    let mut pv = Decimal::ZERO;
    for cf in flows {
        let df = discount_factor(rate, frequency, cf.years)?;
        pv = cf
            .amount
            .checked_mul(df)
            .and_then(|v| pv.checked_add(v))
            .ok_or_else(|| overflow("ytm", &format!("present value of flow on {}", cf.date)))?;
    }
    Ok(pv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn flow(years: Decimal, amount: Decimal) -> Cashflow {
        Cashflow {
            date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            amount,
            years,
        }
    }

    #[test]
    fn test_compound_whole_periods() {
        let f = compound_factor(dec!(0.10), 1, dec!(2)).unwrap();
        assert_eq!(f, dec!(1.21));
    }

    #[test]
    fn test_compound_fractional_period() {
        // 1.04^0.5 ~= 1.0198039
        let f = compound_factor(dec!(0.04), 1, dec!(0.5)).unwrap();
        assert!((f - dec!(1.0198039)).abs() < dec!(0.000001), "got {f}");
    }

    #[test]
    fn test_semi_annual_compounding() {
        // (1 + 0.06/2)^(2*1) = 1.0609
        let f = compound_factor(dec!(0.06), 2, dec!(1)).unwrap();
        assert_eq!(f, dec!(1.0609));
    }

    #[test]
    fn test_zero_rate_is_undiscounted() {
        let flows = vec![flow(dec!(1), dec!(50)), flow(dec!(2), dec!(1050))];
        assert_eq!(present_value(&flows, Decimal::ZERO, 1).unwrap(), dec!(1100));
    }

    #[test]
    fn test_rate_at_minus_one_rejected() {
        assert!(compound_factor(dec!(-1), 1, dec!(1)).is_err());
    }

    #[test]
    fn test_present_value_two_year_bond() {
        // 50/1.04 + 1050/1.04^2 = 1018.86
        let flows = vec![flow(dec!(1), dec!(50)), flow(dec!(2), dec!(1050))];
        let pv = present_value(&flows, dec!(0.04), 1).unwrap();
        assert!((pv - dec!(1018.86)).abs() < dec!(0.01), "got {pv}");
    }

    #[test]
    fn test_deeply_negative_yield_overflow_is_an_error() {
        // 0.1^-27 is ~1e27; times 1050 no longer fits
        let flows = vec![flow(dec!(1), dec!(50)), flow(dec!(27), dec!(1050))];
        let err = present_value(&flows, dec!(-0.9), 1).unwrap_err();
        assert!(matches!(err, TreasuryRiskError::InvalidInput { .. }), "got {err:?}");
    }

    #[test]
    fn test_huge_notional_overflow_is_an_error() {
        let flows = vec![flow(dec!(1), dec!(70000000000000000000000000000))];
        assert!(present_value(&flows, dec!(-0.5), 1).is_err());
    }
}
