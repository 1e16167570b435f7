use chrono::{Local, NaiveDate};
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::info;

use treasury_risk_core::config::Config;
use treasury_risk_core::ingest::parse_rate;
use treasury_risk_core::scenario::{bps, Scenario};
use treasury_risk_core::session::Session;

use crate::input;

/// Arguments for portfolio valuation
#[derive(Args)]
pub struct ValueArgs {
    /// Path to holdings CSV (reads stdin when omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// Valuation date, YYYY-MM-DD (defaults to today)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,

    /// Flat scenario YTM for every bond: 0.045 or 4.5%
    #[arg(long, allow_hyphen_values = true)]
    pub ytm: Option<String>,

    /// Parallel yield shock in basis points
    #[arg(long, allow_negative_numbers = true)]
    pub shift_bps: Option<Decimal>,

    /// Per-ISIN yield shock, ISIN=<bps> (repeatable)
    #[arg(long = "isin-shift", value_name = "ISIN=BPS")]
    pub isin_shifts: Vec<String>,

    /// Only value these ISINs (repeatable)
    #[arg(long = "isin", value_name = "ISIN")]
    pub isins: Vec<String>,

    /// Number of most rate-sensitive holdings to list
    #[arg(long, default_value_t = 5)]
    pub top: usize,
}

/// Split `ISIN=<bps>` into its parts.
fn parse_isin_shift(raw: &str) -> Result<(String, Decimal), Box<dyn std::error::Error>> {
    let (isin, shift) = raw
        .split_once('=')
        .ok_or_else(|| format!("--isin-shift expects ISIN=<bps>, got '{raw}'"))?;
    let isin = isin.trim();
    if isin.is_empty() {
        return Err(format!("--isin-shift is missing an ISIN in '{raw}'").into());
    }
    let shift = Decimal::from_str(shift.trim())
        .map_err(|e| format!("--isin-shift '{raw}': invalid basis points: {e}"))?;
    Ok((isin.to_string(), shift))
}

fn build_scenario(args: &ValueArgs, config: &Config) -> Result<Scenario, Box<dyn std::error::Error>> {
    let mut scenario = Scenario::default();
    if let Some(ref raw) = args.ytm {
        let ytm = parse_rate(raw, config.ingest.rate_convention)
            .map_err(|e| format!("--ytm '{raw}': {e}"))?;
        scenario.ytm = Some(ytm);
    }
    if let Some(shift) = args.shift_bps {
        scenario = scenario.with_parallel_shift(bps(shift));
    }
    for raw in &args.isin_shifts {
        let (isin, shift) = parse_isin_shift(raw)?;
        scenario = scenario.with_isin_shift(&isin, bps(shift));
    }
    scenario.validate()?;
    Ok(scenario)
}

pub fn run_value(args: ValueArgs, config: Config) -> Result<Value, Box<dyn std::error::Error>> {
    let scenario = build_scenario(&args, &config)?;
    let as_of = args.as_of.unwrap_or_else(|| Local::now().date_naive());
    let bytes = input::read_upload(args.input.as_deref())?;

    let mut session = Session::load(&bytes, config, as_of)?;
    session.restrict_to(&args.isins);
    session.revalue(scenario)?;
    info!(rows = session.booked().len(), %as_of, "valuing portfolio");

    let report = session.report(args.top)?;
    Ok(serde_json::to_value(report)?)
}
