use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::CanonicalField;
use crate::types::{Money, Rate};

/// One holding from an uploaded portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BondRecord {
    /// 1-based data row in the upload
    pub row: usize,
    #[serde(default)]
    pub isin: Option<String>,
    pub purchase_date: NaiveDate,
    pub maturity_date: NaiveDate,
    /// Yield at acquisition, as a fraction
    #[serde(rename = "purchaseYTM")]
    pub purchase_ytm: Rate,
    /// Annual coupon rate, as a fraction of face value
    pub coupon: Rate,
    pub face_value: Money,
    /// Authoritative when present; derived otherwise
    #[serde(default)]
    pub initial_investment_value: Option<Money>,
    /// Authoritative when present; derived otherwise
    #[serde(default)]
    pub book_value: Option<Money>,
}

impl BondRecord {
    /// ISIN when present, otherwise the row number.
    pub fn label(&self) -> String {
        row_label(self.row, self.isin.as_deref())
    }

    pub fn is_matured(&self, as_of: NaiveDate) -> bool {
        self.maturity_date <= as_of
    }

    /// Checks that make a row unusable for valuation.
    pub fn validate(&self) -> Vec<RowIssue> {
        let mut issues = Vec::new();
        if self.face_value <= Decimal::ZERO {
            issues.push(RowIssue::invalid(
                CanonicalField::FaceValue,
                "Face value must be positive",
            ));
        }
        if self.purchase_date >= self.maturity_date {
            issues.push(RowIssue::invalid(
                CanonicalField::PurchaseDate,
                "Purchase date must be before maturity date",
            ));
        }
        if self.coupon < Decimal::ZERO {
            issues.push(RowIssue::invalid(
                CanonicalField::Coupon,
                "Coupon rate cannot be negative",
            ));
        }
        if self.purchase_ytm <= dec!(-1) {
            issues.push(RowIssue::invalid(
                CanonicalField::PurchaseYtm,
                "Purchase YTM must be greater than -100%",
            ));
        }
        if matches!(self.initial_investment_value, Some(v) if v < Decimal::ZERO) {
            issues.push(RowIssue::invalid(
                CanonicalField::InitialInvestmentValue,
                "Initial investment value cannot be negative",
            ));
        }
        if matches!(self.book_value, Some(v) if v < Decimal::ZERO) {
            issues.push(RowIssue::invalid(
                CanonicalField::BookValue,
                "Book value cannot be negative",
            ));
        }
        issues
    }
}

pub fn row_label(row: usize, isin: Option<&str>) -> String {
    match isin {
        Some(isin) => format!("row {row} ({isin})"),
        None => format!("row {row}"),
    }
}

/// A per-row problem. Rows with issues are excluded from totals; they never
/// abort the rest of the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowIssue {
    /// Cell text could not be read as the field's type
    Parse {
        field: CanonicalField,
        value: String,
        reason: String,
    },
    /// Cell parsed but the bond is not valid
    Invalid {
        field: CanonicalField,
        reason: String,
    },
    /// The row cannot be valued under the current scenario
    Scenario { reason: String },
}

impl RowIssue {
    pub fn parse(field: CanonicalField, value: &str, reason: impl Into<String>) -> Self {
        RowIssue::Parse {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid(field: CanonicalField, reason: impl Into<String>) -> Self {
        RowIssue::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowIssue::Parse {
                field,
                value,
                reason,
            } => write!(f, "{field}: cannot parse '{value}': {reason}"),
            RowIssue::Invalid { field, reason } => write!(f, "{field}: {reason}"),
            RowIssue::Scenario { reason } => write!(f, "scenario: {reason}"),
        }
    }
}
