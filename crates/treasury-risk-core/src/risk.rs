//! Interest-rate sensitivity of a booked portfolio under a scenario.
//!
//! Metrics are computed on the same remaining cash-flow schedule that
//! market value uses. The base case for shock impact is each bond marked at
//! its own purchase YTM.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bond::row_label;
use crate::error::TreasuryRiskError;
use crate::scenario::Scenario;
use crate::schedule::Cashflow;
use crate::time_value::{discount_factor, overflow};
use crate::types::{Money, Rate, Years};
use crate::valuation::{BookedPortfolio, BookedRow, ValuationEngine};
use crate::TreasuryRiskResult;

const RATIO_SCALE: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub price: Money,
    pub macaulay_duration: Years,
    pub modified_duration: Years,
    pub convexity: Decimal,
    /// Price change for a one basis point yield move
    pub dv01: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRisk {
    pub row: usize,
    pub isin: Option<String>,
    #[serde(rename = "effectiveYTM")]
    pub effective_ytm: Rate,
    pub metrics: RiskMetrics,
    pub base_market_value: Money,
    /// Market value under the scenario minus the base market value
    pub price_change: Money,
    pub duration_approx_pnl: Money,
    pub contribution_pct: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSummary {
    pub rows_analyzed: usize,
    pub total_market_value: Money,
    pub total_base_market_value: Money,
    pub total_pnl_impact: Money,
    pub total_duration_approx_pnl: Money,
    pub weighted_macaulay_duration: Years,
    pub weighted_modified_duration: Years,
    pub portfolio_dv01: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    pub rows: Vec<RowRisk>,
    pub summary: RiskSummary,
    pub top_sensitive: Vec<RowRisk>,
}

impl RiskReport {
    /// The `n` rows with the largest absolute P/L impact.
    pub fn top_sensitive(&self, n: usize) -> Vec<RowRisk> {
        top_by_impact(&self.rows, n)
    }
}

fn top_by_impact(rows: &[RowRisk], n: usize) -> Vec<RowRisk> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| b.price_change.abs().cmp(&a.price_change.abs()));
    sorted.truncate(n);
    sorted
}

fn round_ratio(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(RATIO_SCALE, RoundingStrategy::MidpointNearestEven)
}

fn fits(value: Option<Decimal>, context: &str) -> TreasuryRiskResult<Decimal> {
    value.ok_or_else(|| overflow("ytm", context))
}

/// Duration, convexity and DV01 of `flows` at `ytm`.
pub fn metrics(flows: &[Cashflow], ytm: Rate, frequency: u8) -> TreasuryRiskResult<RiskMetrics> {
    let f = Decimal::from(frequency.max(1));
    let mut price = Decimal::ZERO;
    let mut weighted_time = Decimal::ZERO;
    let mut convexity_sum = Decimal::ZERO;

    for cf in flows {
        let df = discount_factor(ytm, frequency, cf.years)?;
        let pv = fits(cf.amount.checked_mul(df), "cash flow PV")?;
        let time_weight = cf.years * (cf.years + Decimal::ONE / f);
        price = fits(price.checked_add(pv), "price")?;
        weighted_time = fits(
            cf.years.checked_mul(pv).and_then(|v| weighted_time.checked_add(v)),
            "duration sum",
        )?;
        convexity_sum = fits(
            time_weight.checked_mul(pv).and_then(|v| convexity_sum.checked_add(v)),
            "convexity sum",
        )?;
    }

    if price.is_zero() {
        return Err(TreasuryRiskError::DivisionByZero {
            context: "duration with zero price".into(),
        });
    }

    let base = Decimal::ONE + ytm / f;
    let macaulay = fits(weighted_time.checked_div(price), "Macaulay duration")?;
    let modified = fits(macaulay.checked_div(base), "modified duration")?;
    let convexity = fits(
        price
            .checked_mul(base * base)
            .and_then(|scaled| convexity_sum.checked_div(scaled)),
        "convexity",
    )?;
    let dv01 = fits(modified.checked_mul(price * dec!(0.0001)), "DV01")?;

    Ok(RiskMetrics {
        price,
        macaulay_duration: macaulay,
        modified_duration: modified,
        convexity,
        dv01,
    })
}

struct Measured {
    row: usize,
    isin: Option<String>,
    effective_ytm: Rate,
    current: RiskMetrics,
    base: RiskMetrics,
    price_change: Decimal,
    duration_approx_pnl: Decimal,
}

fn measure(
    engine: &ValuationEngine,
    booked: &BookedRow,
    scenario: &Scenario,
    as_of: chrono::NaiveDate,
) -> TreasuryRiskResult<Option<Measured>> {
    let record = &booked.record;
    if record.is_matured(as_of) {
        return Ok(None);
    }
    let effective_ytm = scenario.effective_ytm(record);
    if effective_ytm <= dec!(-1) {
        return Ok(None);
    }
    let frequency = engine.config().coupon_frequency;
    let flows = engine.cashflows(record, as_of)?;
    let current = metrics(&flows, effective_ytm, frequency)?;
    let base = metrics(&flows, record.purchase_ytm, frequency)?;

    let shock = effective_ytm - record.purchase_ytm;
    let price_change = fits(current.price.checked_sub(base.price), "price change")?;
    let duration_approx_pnl = fits(
        base.modified_duration
            .checked_mul(base.price)
            .and_then(|v| v.checked_mul(-shock)),
        "duration approximation",
    )?;
    Ok(Some(Measured {
        row: record.row,
        isin: record.isin.clone(),
        effective_ytm,
        current,
        base,
        price_change,
        duration_approx_pnl,
    }))
}

/// Risk report for every live row of `booked` under `scenario`.
///
/// Matured rows and rows the scenario cannot price are left out.
pub fn analyze(
    engine: &ValuationEngine,
    booked: &BookedPortfolio,
    scenario: &Scenario,
    top_n: usize,
) -> TreasuryRiskResult<RiskReport> {
    scenario.validate()?;

    let mut measured = Vec::new();
    for row in booked.booked() {
        match measure(engine, row, scenario, booked.as_of) {
            Ok(Some(m)) => measured.push(m),
            Ok(None) => {}
            Err(e) => debug!(
                row = row.record.row,
                error = %e,
                "{} skipped in risk analysis",
                row_label(row.record.row, row.record.isin.as_deref())
            ),
        }
    }

    let mut summary = RiskSummary {
        rows_analyzed: measured.len(),
        ..RiskSummary::default()
    };
    let mut mac_weighted = Decimal::ZERO;
    let mut mod_weighted = Decimal::ZERO;

    let accumulate = |total: &mut Decimal, value: Option<Decimal>| -> TreasuryRiskResult<()> {
        *total = fits(value.and_then(|v| total.checked_add(v)), "portfolio risk total")?;
        Ok(())
    };
    for m in &measured {
        accumulate(&mut summary.total_market_value, Some(m.current.price))?;
        accumulate(&mut summary.total_base_market_value, Some(m.base.price))?;
        accumulate(&mut summary.total_pnl_impact, Some(m.price_change))?;
        accumulate(&mut summary.total_duration_approx_pnl, Some(m.duration_approx_pnl))?;
        accumulate(&mut summary.portfolio_dv01, Some(m.current.dv01))?;
        accumulate(
            &mut mac_weighted,
            m.current.macaulay_duration.checked_mul(m.current.price),
        )?;
        accumulate(
            &mut mod_weighted,
            m.current.modified_duration.checked_mul(m.current.price),
        )?;
    }

    if !summary.total_market_value.is_zero() {
        let mv = summary.total_market_value;
        summary.weighted_macaulay_duration =
            round_ratio(fits(mac_weighted.checked_div(mv), "weighted duration")?);
        summary.weighted_modified_duration =
            round_ratio(fits(mod_weighted.checked_div(mv), "weighted duration")?);
    }
    let total_pnl = summary.total_pnl_impact;

    let rows = measured
        .into_iter()
        .map(|m| -> TreasuryRiskResult<RowRisk> {
            let contribution_pct = if total_pnl.is_zero() {
                Decimal::ZERO
            } else {
                let share = m
                    .price_change
                    .checked_div(total_pnl)
                    .and_then(|s| s.checked_mul(dec!(100)));
                round_ratio(fits(share, "P/L contribution")?)
            };
            Ok(RowRisk {
                row: m.row,
                isin: m.isin,
                effective_ytm: m.effective_ytm,
                metrics: RiskMetrics {
                    price: engine.round_money(m.current.price),
                    macaulay_duration: round_ratio(m.current.macaulay_duration),
                    modified_duration: round_ratio(m.current.modified_duration),
                    convexity: round_ratio(m.current.convexity),
                    dv01: engine.round_money(m.current.dv01),
                },
                base_market_value: engine.round_money(m.base.price),
                price_change: engine.round_money(m.price_change),
                duration_approx_pnl: engine.round_money(m.duration_approx_pnl),
                contribution_pct,
            })
        })
        .collect::<TreasuryRiskResult<Vec<_>>>()?;

    summary.total_market_value = engine.round_money(summary.total_market_value);
    summary.total_base_market_value = engine.round_money(summary.total_base_market_value);
    summary.total_pnl_impact = engine.round_money(summary.total_pnl_impact);
    summary.total_duration_approx_pnl = engine.round_money(summary.total_duration_approx_pnl);
    summary.portfolio_dv01 = engine.round_money(summary.portfolio_dv01);

    info!(
        rows = summary.rows_analyzed,
        pnl = %summary.total_pnl_impact,
        dv01 = %summary.portfolio_dv01,
        "risk analysis complete"
    );

    let top_sensitive = top_by_impact(&rows, top_n);
    Ok(RiskReport {
        rows,
        summary,
        top_sensitive,
    })
}
