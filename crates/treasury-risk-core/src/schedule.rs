//! Coupon schedules and day count year fractions.

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::TreasuryRiskError;
use crate::time_value::overflow;
use crate::types::{Money, Rate, Years};
use crate::TreasuryRiskResult;

/// Day count basis for turning a date interval into a year fraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayCount {
    /// ACT/365 fixed
    #[default]
    #[serde(rename = "actual_365")]
    Actual365,
    /// ACT/360 money market
    #[serde(rename = "actual_360")]
    Actual360,
    /// 30/360 US corporate
    #[serde(rename = "thirty_360")]
    Thirty360,
}

impl DayCount {
    pub fn year_fraction(self, start: NaiveDate, end: NaiveDate) -> Years {
        match self {
            DayCount::Actual365 => Decimal::from((end - start).num_days()) / dec!(365),
            DayCount::Actual360 => Decimal::from((end - start).num_days()) / dec!(360),
            DayCount::Thirty360 => Decimal::from(thirty_360_days(start, end)) / dec!(360),
        }
    }
}

/// 30/360 day count (raw days, not fraction).
fn thirty_360_days(start: NaiveDate, end: NaiveDate) -> i32 {
    let mut d1 = start.day() as i32;
    let mut d2 = end.day() as i32;

    if d1 == 31 {
        d1 = 30;
    }
    if d2 == 31 && d1 >= 30 {
        d2 = 30;
    }

    (end.year() - start.year()) * 360 + (end.month() as i32 - start.month() as i32) * 30 + (d2 - d1)
}

/// Coupons per year accepted by the engine.
pub fn validate_frequency(frequency: u8) -> TreasuryRiskResult<()> {
    if !matches!(frequency, 1 | 2 | 4 | 12) {
        return Err(TreasuryRiskError::InvalidInput {
            field: "coupon_frequency".into(),
            reason: "Coupon frequency must be 1, 2, 4, or 12".into(),
        });
    }
    Ok(())
}

/// Coupon dates strictly after `start`, up to and including `maturity`,
/// ascending.
///
/// Each date is stepped back from maturity directly (maturity minus k
/// periods), so month-end clamping never accumulates.
pub fn coupon_dates(start: NaiveDate, maturity: NaiveDate, frequency: u8) -> Vec<NaiveDate> {
    let months_per_period = 12 / u32::from(frequency.max(1));
    let mut dates = Vec::new();

    let mut k: u32 = 0;
    while let Some(date) = maturity.checked_sub_months(Months::new(k * months_per_period)) {
        if date <= start {
            break;
        }
        dates.push(date);
        k += 1;
    }

    dates.reverse();
    dates
}

/// A dated bond cash flow with its year fraction from the valuation start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cashflow {
    pub date: NaiveDate,
    pub amount: Money,
    pub years: Years,
}

/// Remaining coupons plus redemption at maturity, seen from `start`.
///
/// Empty when `maturity <= start`.
pub fn remaining_cashflows(
    start: NaiveDate,
    maturity: NaiveDate,
    face_value: Money,
    coupon_rate: Rate,
    frequency: u8,
    day_count: DayCount,
) -> TreasuryRiskResult<Vec<Cashflow>> {
    let coupon = face_value
        .checked_mul(coupon_rate)
        .map(|c| c / Decimal::from(frequency.max(1)))
        .ok_or_else(|| overflow("faceValue", "coupon amount"))?;
    coupon_dates(start, maturity, frequency)
        .into_iter()
        .map(|date| -> TreasuryRiskResult<Cashflow> {
            let amount = if date == maturity {
                coupon
                    .checked_add(face_value)
                    .ok_or_else(|| overflow("faceValue", "redemption amount"))?
            } else {
                coupon
            };
            Ok(Cashflow {
                date,
                amount,
                years: day_count.year_fraction(start, date),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_annual_dates_exclude_start() {
        let dates = coupon_dates(d(2023, 1, 1), d(2025, 1, 1), 1);
        assert_eq!(dates, vec![d(2024, 1, 1), d(2025, 1, 1)]);
    }

    #[test]
    fn test_semi_annual_month_end_does_not_drift() {
        let dates = coupon_dates(d(2024, 1, 1), d(2025, 8, 31), 2);
        assert_eq!(dates, vec![d(2024, 2, 29), d(2024, 8, 31), d(2025, 2, 28), d(2025, 8, 31)]);
    }

    #[test]
    fn test_no_dates_after_maturity() {
        assert!(coupon_dates(d(2025, 1, 1), d(2025, 1, 1), 1).is_empty());
        assert!(coupon_dates(d(2026, 1, 1), d(2025, 1, 1), 1).is_empty());
    }

    #[test]
    fn test_final_flow_includes_face() {
        let flows = remaining_cashflows(d(2023, 1, 1), d(2025, 1, 1), dec!(1000), dec!(0.05), 1, DayCount::Actual365).unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].amount, dec!(50));
        assert_eq!(flows[1].amount, dec!(1050));
        assert_eq!(flows[0].years, dec!(1));
    }

    #[test]
    fn test_redemption_past_decimal_max_is_an_error() {
        let face = Decimal::MAX - dec!(1);
        assert!(remaining_cashflows(d(2023, 1, 1), d(2025, 1, 1), face, dec!(0.05), 1, DayCount::Actual365).is_err());
    }

    #[test]
    fn test_thirty_360_full_year() {
        assert_eq!(DayCount::Thirty360.year_fraction(d(2023, 1, 31), d(2024, 1, 31)), dec!(1));
    }

    #[test]
    fn test_frequency_validation() {
        assert!(validate_frequency(2).is_ok());
        assert!(validate_frequency(3).is_err());
    }
}
