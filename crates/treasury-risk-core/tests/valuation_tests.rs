use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use treasury_risk_core::config::{AmortizationPolicy, IngestConfig, ValuationConfig};
use treasury_risk_core::ingest::read_csv;
use treasury_risk_core::scenario::Scenario;
use treasury_risk_core::schema::{normalize, ColumnAliases};
use treasury_risk_core::valuation::{RowStatus, ValuationEngine};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn evaluate(csv: &str, scenario: &Scenario, as_of: NaiveDate, config: ValuationConfig) -> treasury_risk_core::valuation::AugmentedTable {
    let raw = read_csv(csv.as_bytes()).unwrap();
    let aliases = ColumnAliases::builtin().unwrap();
    let table = normalize(&aliases, &raw.headers, raw.rows)
        .unwrap()
        .with_row_numbers(raw.row_numbers);
    let engine = ValuationEngine::new(config).unwrap();
    engine
        .evaluate(&table, &IngestConfig::default(), scenario, as_of)
        .unwrap()
}

const FIVE_YEAR: &str = "ISIN,Purchase Date,Maturity Date,YTM,Coupon,Face Value\n\
                         XS0001,2020-01-01,2025-01-01,0.04,0.05,1000\n";

// ===========================================================================
// End-to-end
// ===========================================================================

#[test]
fn test_five_year_premium_bond_as_of_2023() {
    // Two coupons remain: 50/1.04 + 1050/1.04^2 ~= 1018.86
    let table = evaluate(FIVE_YEAR, &Scenario::flat(dec!(0.04)), d(2023, 1, 1), ValuationConfig::default());
    let row = &table.rows[0];
    assert_eq!(row.status, RowStatus::Valued);

    let mv = row.market_value.unwrap();
    assert!((mv - dec!(1018.86)).abs() < dec!(0.5), "market value {mv}");

    // Initial ~1044.5, straight-line 1096 of 1827 days towards 1000
    let bv = row.book_value.unwrap();
    assert!((bv - dec!(1017.8)).abs() < dec!(1), "book value {bv}");

    let gl = row.gain_loss.unwrap();
    assert_eq!(gl, mv - bv);
    assert!(gl.abs() < dec!(5), "gain/loss {gl}");
}

#[test]
fn test_effective_interest_book_equals_market_at_purchase_yield() {
    let config = ValuationConfig {
        amortization: AmortizationPolicy::EffectiveInterest,
        ..ValuationConfig::default()
    };
    let table = evaluate(FIVE_YEAR, &Scenario::default(), d(2023, 1, 1), config);
    let row = &table.rows[0];
    assert_eq!(row.gain_loss, Some(Decimal::ZERO));
    assert_eq!(row.book_value, row.market_value);
}

#[test]
fn test_maturity_on_as_of_date() {
    let table = evaluate(FIVE_YEAR, &Scenario::flat(dec!(0.08)), d(2025, 1, 1), ValuationConfig::default());
    let row = &table.rows[0];
    assert_eq!(row.status, RowStatus::Matured);
    assert_eq!(row.market_value, Some(dec!(1000)));
    assert_eq!(row.book_value, Some(dec!(1000)));
    assert_eq!(row.gain_loss, Some(Decimal::ZERO));
}

#[test]
fn test_header_only_upload_is_empty() {
    let csv = "ISIN,Purchase Date,Maturity Date,YTM,Coupon,Face Value\n";
    let table = evaluate(csv, &Scenario::default(), d(2023, 1, 1), ValuationConfig::default());
    assert!(table.is_empty());
    assert_eq!(table.totals.total_market_value, Decimal::ZERO);
    assert!(table.issue_messages().is_empty());
}

// ===========================================================================
// Row-level problems
// ===========================================================================

#[test]
fn test_bad_rows_flagged_and_good_rows_valued() {
    let csv = "ISIN,Purchase Date,Maturity Date,YTM,Coupon,Face Value\n\
               GOOD,2020-01-01,2025-01-01,0.04,0.05,1000\n\
               NEGFACE,2020-01-01,2025-01-01,0.04,0.05,-1000\n\
               BACKWARDS,2025-01-01,2020-01-01,0.04,0.05,1000\n\
               TEXT,2020-01-01,2025-01-01,abc,0.05,1000\n";
    let table = evaluate(csv, &Scenario::default(), d(2023, 1, 1), ValuationConfig::default());

    assert_eq!(table.rows.len(), 4);
    assert_eq!(table.rows[0].status, RowStatus::Valued);
    for row in &table.rows[1..] {
        assert_eq!(row.status, RowStatus::Excluded, "{}", row.label());
        assert!(row.market_value.is_none());
        assert!(!row.issues.is_empty());
    }
    assert_eq!(table.totals.valued_rows, 1);
    assert_eq!(table.totals.excluded_rows, 3);
    assert_eq!(table.totals.total_face_value, dec!(1000));

    // parsed but invalid rows keep their canonical columns
    let negface = &table.rows[1];
    assert_eq!(negface.isin.as_deref(), Some("NEGFACE"));
    assert_eq!(negface.face_value, Some(dec!(-1000)));
    assert_eq!(negface.coupon, Some(dec!(0.05)));
    assert_eq!(table.rows[2].maturity_date, Some(d(2020, 1, 1)));
    // a cell that failed to parse leaves nothing to report
    assert!(table.rows[3].face_value.is_none());

    let messages = table.issue_messages();
    assert!(messages.iter().any(|m| m.contains("NEGFACE") && m.contains("faceValue")));
    assert!(messages.iter().any(|m| m.contains("TEXT") && m.contains("'abc'")));
}

#[test]
fn test_supplied_book_value_is_kept() {
    let csv = "ISIN,Purchase Date,Maturity Date,YTM,Coupon,Face Value,Initial Investment Value,Book Value\n\
               A,2020-01-01,2025-01-01,0.04,0.05,1000,\"1,050.00\",1020.25\n";
    let table = evaluate(csv, &Scenario::default(), d(2023, 1, 1), ValuationConfig::default());
    let row = &table.rows[0];
    assert_eq!(row.initial_investment_value, Some(dec!(1050.00)));
    assert_eq!(row.book_value, Some(dec!(1020.25)));
}

#[test]
fn test_percent_cells_are_read_as_percent() {
    let csv = "ISIN,Purchase Date,Maturity Date,YTM,Coupon,Face Value\n\
               A,2020-01-01,2025-01-01,4%,5%,1000\n";
    let pct = evaluate(csv, &Scenario::default(), d(2023, 1, 1), ValuationConfig::default());
    let frac = evaluate(FIVE_YEAR, &Scenario::default(), d(2023, 1, 1), ValuationConfig::default());
    assert_eq!(pct.rows[0].market_value, frac.rows[0].market_value);
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn test_isin_shift_only_moves_that_bond() {
    let csv = "ISIN,Purchase Date,Maturity Date,YTM,Coupon,Face Value\n\
               A,2020-01-01,2030-01-01,0.04,0.05,1000\n\
               B,2020-01-01,2030-01-01,0.04,0.05,1000\n";
    let base = evaluate(csv, &Scenario::default(), d(2023, 1, 1), ValuationConfig::default());
    let shocked = evaluate(
        csv,
        &Scenario::default().with_isin_shift("b", dec!(0.01)),
        d(2023, 1, 1),
        ValuationConfig::default(),
    );
    assert_eq!(base.rows[0].market_value, shocked.rows[0].market_value);
    assert!(shocked.rows[1].market_value < base.rows[1].market_value);
    assert_eq!(shocked.rows[1].effective_ytm, Some(dec!(0.05)));
}

#[test]
fn test_scenario_ytm_at_minus_one_is_rejected() {
    let raw = read_csv(FIVE_YEAR.as_bytes()).unwrap();
    let table = normalize(&ColumnAliases::builtin().unwrap(), &raw.headers, raw.rows).unwrap();
    let engine = ValuationEngine::new(ValuationConfig::default()).unwrap();
    let result = engine.evaluate(&table, &IngestConfig::default(), &Scenario::flat(dec!(-1)), d(2023, 1, 1));
    assert!(result.is_err());
}

#[test]
fn test_semi_annual_frequency_prices_differently() {
    let semi = ValuationConfig {
        coupon_frequency: 2,
        ..ValuationConfig::default()
    };
    let annual = evaluate(FIVE_YEAR, &Scenario::flat(dec!(0.06)), d(2023, 1, 1), ValuationConfig::default());
    let semi = evaluate(FIVE_YEAR, &Scenario::flat(dec!(0.06)), d(2023, 1, 1), semi);
    let (a, s) = (annual.rows[0].market_value.unwrap(), semi.rows[0].market_value.unwrap());
    assert!(a < dec!(1000) && s < dec!(1000));
    assert_ne!(a, s);
}
