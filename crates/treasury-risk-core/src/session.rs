//! One loaded upload and the scenario currently applied to it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

use crate::config::{AmortizationPolicy, Config};
use crate::ingest::{parse_rows, read_csv, ParsedRow};
use crate::scenario::Scenario;
use crate::schema::normalize;
use crate::types::{with_metadata, ComputationOutput};
use crate::valuation::{AugmentedTable, BookedPortfolio, PortfolioTotals, ValuationEngine, ValuedRow};
use crate::TreasuryRiskResult;

#[cfg(feature = "risk")]
use crate::risk::{analyze, RiskReport};

/// Everything a caller gets back from one valuation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioReport {
    pub as_of: NaiveDate,
    pub scenario: Scenario,
    pub rows: Vec<ValuedRow>,
    pub totals: PortfolioTotals,
    #[cfg(feature = "risk")]
    pub risk: RiskReport,
}

#[derive(Serialize)]
struct ReportAssumptions<'a> {
    as_of: NaiveDate,
    config: &'a Config,
    scenario: &'a Scenario,
    isin_filter: &'a [String],
}

/// Booked holdings plus the current scenario.
///
/// Loading books the portfolio once; changing the scenario only remarks it.
/// A session owns all of its state, so independent sessions never interact.
#[derive(Debug, Clone)]
pub struct Session {
    config: Config,
    engine: ValuationEngine,
    parsed: Vec<ParsedRow>,
    booked: BookedPortfolio,
    scenario: Scenario,
    isin_filter: Vec<String>,
}

impl Session {
    /// Read, normalize, parse and book an uploaded CSV.
    pub fn load(bytes: &[u8], config: Config, as_of: NaiveDate) -> TreasuryRiskResult<Self> {
        config.validate()?;
        let aliases = config.aliases()?;
        let raw = read_csv(bytes)?;
        let table = normalize(&aliases, &raw.headers, raw.rows)?.with_row_numbers(raw.row_numbers);
        let parsed = parse_rows(&table, &config.ingest);
        let engine = ValuationEngine::new(config.valuation.clone())?;
        let booked = engine.book(&parsed, as_of);

        info!(rows = parsed.len(), %as_of, "loaded portfolio");

        Ok(Session {
            config,
            engine,
            parsed,
            booked,
            scenario: Scenario::default(),
            isin_filter: Vec::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn as_of(&self) -> NaiveDate {
        self.booked.as_of
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn booked(&self) -> &BookedPortfolio {
        &self.booked
    }

    pub fn parsed_rows(&self) -> &[ParsedRow] {
        &self.parsed
    }

    /// Replace the scenario and remark. Booked values are untouched.
    pub fn revalue(&mut self, scenario: Scenario) -> TreasuryRiskResult<AugmentedTable> {
        scenario.validate()?;
        self.scenario = scenario;
        self.valuation()
    }

    /// Rebook every parsed row as of a new date. The ISIN filter is kept.
    pub fn rebook(&mut self, as_of: NaiveDate) {
        self.booked = self.engine.book(&self.parsed, as_of);
        self.booked.retain_isins(&self.isin_filter);
    }

    /// Limit the session to the given ISINs. An empty list keeps every row.
    pub fn restrict_to(&mut self, isins: &[String]) {
        self.isin_filter = isins.to_vec();
        self.booked.retain_isins(&self.isin_filter);
    }

    /// Augmented table under the current scenario.
    pub fn valuation(&self) -> TreasuryRiskResult<AugmentedTable> {
        self.engine.mark(&self.booked, &self.scenario)
    }

    #[cfg(feature = "risk")]
    pub fn risk(&self, top_n: usize) -> TreasuryRiskResult<RiskReport> {
        analyze(&self.engine, &self.booked, &self.scenario, top_n)
    }

    /// Full report in the standard output envelope. Row issues become
    /// warnings.
    pub fn report(&self, top_n: usize) -> TreasuryRiskResult<ComputationOutput<PortfolioReport>> {
        let start = Instant::now();
        let table = self.valuation()?;
        let warnings = table.issue_messages();

        #[cfg(feature = "risk")]
        let risk = self.risk(top_n)?;
        #[cfg(not(feature = "risk"))]
        let _ = top_n;

        let AugmentedTable { as_of, rows, totals } = table;
        let report = PortfolioReport {
            as_of,
            scenario: self.scenario.clone(),
            rows,
            totals,
            #[cfg(feature = "risk")]
            risk,
        };

        let methodology = match self.config.valuation.amortization {
            AmortizationPolicy::StraightLine => {
                "Bond portfolio valuation: PV of remaining cash flows, straight-line book value"
            }
            AmortizationPolicy::EffectiveInterest => {
                "Bond portfolio valuation: PV of remaining cash flows, effective-interest book value"
            }
        };
        let assumptions = ReportAssumptions {
            as_of,
            config: &self.config,
            scenario: &self.scenario,
            isin_filter: &self.isin_filter,
        };

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(methodology, &assumptions, warnings, elapsed, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TreasuryRiskError;
    use crate::valuation::RowStatus;
    use rust_decimal_macros::dec;

    const CSV: &str = "ISIN,Purchase Date,Maturity Date,Purchase YTM,Coupon,Face Value\n\
                       AAA,2020-01-01,2025-01-01,0.04,0.05,1000\n\
                       BBB,2021-06-30,2031-06-30,0.03,0.025,5000\n\
                       CCC,2019-01-01,2022-01-01,0.02,0.02,2000\n";

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
    }

    fn session() -> Session {
        Session::load(CSV.as_bytes(), Config::default(), as_of()).unwrap()
    }

    #[test]
    fn test_load_books_every_row() {
        let s = session();
        assert_eq!(s.booked().len(), 3);
        assert_eq!(s.booked().booked().count(), 3);
        let table = s.valuation().unwrap();
        assert_eq!(table.rows[2].status, RowStatus::Matured);
        assert_eq!(table.totals.valued_rows, 2);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let csv = "ISIN,Purchase Date,Maturity Date,YTM,Face Value\n";
        let err = Session::load(csv.as_bytes(), Config::default(), as_of()).unwrap_err();
        match err {
            TreasuryRiskError::Schema(e) => assert!(e.to_string().contains("coupon")),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_revalue_keeps_book_values() {
        let mut s = session();
        let base = s.valuation().unwrap();
        let shocked = s.revalue(Scenario::flat(dec!(0.07))).unwrap();
        for (a, b) in base.rows.iter().zip(&shocked.rows) {
            assert_eq!(a.book_value, b.book_value);
            assert_eq!(a.initial_investment_value, b.initial_investment_value);
        }
        assert!(shocked.totals.total_market_value < base.totals.total_market_value);
        assert_eq!(s.scenario().ytm, Some(dec!(0.07)));
    }

    #[test]
    fn test_rejected_scenario_leaves_session_unchanged() {
        let mut s = session();
        assert!(s.revalue(Scenario::flat(dec!(-1.5))).is_err());
        assert!(s.scenario().is_base());
    }

    #[test]
    fn test_rebook_and_filter() {
        let mut s = session();
        s.restrict_to(&["bbb".to_string()]);
        assert_eq!(s.booked().len(), 1);
        s.rebook(NaiveDate::from_ymd_opt(2032, 1, 1).unwrap());
        assert_eq!(s.booked().len(), 1);
        let table = s.valuation().unwrap();
        assert_eq!(table.rows[0].status, RowStatus::Matured);
    }

    #[test]
    fn test_report_envelope() {
        let s = session();
        let out = s.report(2).unwrap();
        assert_eq!(out.result.rows.len(), 3);
        assert!(out.warnings.is_empty());
        assert_eq!(out.metadata.precision, "rust_decimal_128bit");
        assert!(out.methodology.contains("straight-line"));
        #[cfg(feature = "risk")]
        assert_eq!(out.result.risk.top_sensitive.len(), 2);
    }
}
