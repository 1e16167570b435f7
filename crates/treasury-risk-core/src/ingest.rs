//! CSV upload reading and cell parsing.
//!
//! Whole-upload problems (not UTF-8, not CSV, no header row) are errors.
//! Cell problems are attached to their row as [`RowIssue`]s.

use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::bond::{BondRecord, RowIssue};
use crate::config::{IngestConfig, RateConvention};
use crate::error::TreasuryRiskError;
use crate::schema::{CanonicalField, NormalizedTable};
use crate::types::{Money, Rate};
use crate::TreasuryRiskResult;

/// Header row and data rows exactly as uploaded (fields trimmed).
///
/// Rows whose cells are all empty are dropped. `row_numbers` keeps each
/// remaining row's position below the header in the file, so blank lines
/// do not renumber the rows after them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub row_numbers: Vec<usize>,
}

/// Read an uploaded CSV byte stream.
pub fn read_csv(bytes: &[u8]) -> TreasuryRiskResult<RawTable> {
    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    let text = std::str::from_utf8(body).map_err(|e| {
        TreasuryRiskError::MalformedUpload(format!(
            "upload is not valid UTF-8 (byte {})",
            e.valid_up_to()
        ))
    })?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(TreasuryRiskError::MalformedUpload(
            "upload has no header row".into(),
        ));
    }

    // the reader skips empty lines, including any before the header
    let header_line = text
        .lines()
        .position(|line| !line.is_empty())
        .map_or(1, |i| i as u64 + 1);

    let mut rows = Vec::new();
    let mut row_numbers = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        let line = record
            .position()
            .map_or(header_line + rows.len() as u64 + 1, |p| p.line());
        row_numbers.push(line.saturating_sub(header_line) as usize);
        rows.push(record.iter().map(str::to_string).collect());
    }

    debug!(columns = headers.len(), rows = rows.len(), "read csv upload");
    Ok(RawTable {
        headers,
        rows,
        row_numbers,
    })
}

// ---------------------------------------------------------------------------
// Cell parsers
// ---------------------------------------------------------------------------

/// Currency amount: thousands separators and a leading `$` are ignored.
pub fn parse_money(raw: &str) -> Result<Money, String> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Err("empty value".into());
    }
    Decimal::from_str(&cleaned).map_err(|e| e.to_string())
}

/// Rate as a fraction. A trailing `%` always means percent; bare numbers
/// follow `convention`.
pub fn parse_rate(raw: &str, convention: RateConvention) -> Result<Rate, String> {
    let trimmed = raw.trim();
    let (number, percent) = match trimmed.strip_suffix('%') {
        Some(rest) => (rest.trim(), true),
        None => (trimmed, convention == RateConvention::Percent),
    };
    if number.is_empty() {
        return Err("empty value".into());
    }
    let value = Decimal::from_str(number).map_err(|e| e.to_string())?;
    Ok(if percent { value / dec!(100) } else { value })
}

pub fn parse_date(raw: &str, formats: &[String]) -> Result<NaiveDate, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty value".into());
    }
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| format!("expected one of the date formats {}", formats.join(", ")))
}

// ---------------------------------------------------------------------------
// Row parsing
// ---------------------------------------------------------------------------

/// A parsed upload row: a record, or the issues that prevented one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParsedRow {
    Valid(BondRecord),
    Invalid {
        row: usize,
        isin: Option<String>,
        issues: Vec<RowIssue>,
    },
}

impl ParsedRow {
    pub fn row(&self) -> usize {
        match self {
            ParsedRow::Valid(r) => r.row,
            ParsedRow::Invalid { row, .. } => *row,
        }
    }

    pub fn isin(&self) -> Option<&str> {
        match self {
            ParsedRow::Valid(r) => r.isin.as_deref(),
            ParsedRow::Invalid { isin, .. } => isin.as_deref(),
        }
    }
}

struct RowReader<'a> {
    table: &'a NormalizedTable,
    index: usize,
    issues: Vec<RowIssue>,
}

impl<'a> RowReader<'a> {
    fn text(&self, field: CanonicalField) -> &'a str {
        self.table.cell(self.index, field).unwrap_or("").trim()
    }

    fn optional_text(&self, field: CanonicalField) -> Option<String> {
        let s = self.text(field);
        (!s.is_empty()).then(|| s.to_string())
    }

    fn required<T>(
        &mut self,
        field: CanonicalField,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Option<T> {
        let raw = self.text(field);
        match parse(raw) {
            Ok(v) => Some(v),
            Err(reason) => {
                self.issues.push(RowIssue::parse(field, raw, reason));
                None
            }
        }
    }

    fn optional_money(&mut self, field: CanonicalField) -> Option<Money> {
        if self.text(field).is_empty() {
            return None;
        }
        self.required(field, parse_money)
    }
}

/// Parse every row of a normalized table. Rows are numbered by their
/// position in the uploaded file (see [`NormalizedTable::row_number`]).
pub fn parse_rows(table: &NormalizedTable, config: &IngestConfig) -> Vec<ParsedRow> {
    (0..table.len())
        .map(|index| parse_row(table, config, index))
        .collect()
}

fn parse_row(table: &NormalizedTable, config: &IngestConfig, index: usize) -> ParsedRow {
    let mut reader = RowReader {
        table,
        index,
        issues: Vec::new(),
    };
    let row = table.row_number(index);
    let isin = reader.optional_text(CanonicalField::Isin);
    let formats = &config.date_formats;
    let convention = config.rate_convention;

    let purchase_date = reader.required(CanonicalField::PurchaseDate, |s| parse_date(s, formats));
    let maturity_date = reader.required(CanonicalField::MaturityDate, |s| parse_date(s, formats));
    let purchase_ytm = reader.required(CanonicalField::PurchaseYtm, |s| parse_rate(s, convention));
    let coupon = reader.required(CanonicalField::Coupon, |s| parse_rate(s, convention));
    let face_value = reader.required(CanonicalField::FaceValue, parse_money);
    let initial_investment_value = reader.optional_money(CanonicalField::InitialInvestmentValue);
    let book_value = reader.optional_money(CanonicalField::BookValue);

    match (purchase_date, maturity_date, purchase_ytm, coupon, face_value) {
        (Some(purchase_date), Some(maturity_date), Some(purchase_ytm), Some(coupon), Some(face_value))
            if reader.issues.is_empty() =>
        {
            ParsedRow::Valid(BondRecord {
                row,
                isin,
                purchase_date,
                maturity_date,
                purchase_ytm,
                coupon,
                face_value,
                initial_investment_value,
                book_value,
            })
        }
        _ => {
            debug!(row, issues = reader.issues.len(), "row failed to parse");
            ParsedRow::Invalid {
                row,
                isin,
                issues: reader.issues,
            }
        }
    }
}
