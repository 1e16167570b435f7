//! Column-name normalization for uploaded holdings files.
//!
//! Raw headers are cleaned (trimmed, internal whitespace collapsed,
//! lower-cased) and looked up in an explicit alias table. The table is
//! checked for ambiguity when it is built, so a lookup never has more than
//! one candidate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::TreasuryRiskError;
use crate::TreasuryRiskResult;

// ---------------------------------------------------------------------------
// Canonical fields
// ---------------------------------------------------------------------------

/// The canonical column set a holdings file is normalized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalField {
    #[serde(rename = "isin")]
    Isin,
    #[serde(rename = "purchaseDate")]
    PurchaseDate,
    #[serde(rename = "maturityDate")]
    MaturityDate,
    #[serde(rename = "purchaseYTM")]
    PurchaseYtm,
    #[serde(rename = "coupon")]
    Coupon,
    #[serde(rename = "faceValue")]
    FaceValue,
    #[serde(rename = "initialInvestmentValue")]
    InitialInvestmentValue,
    #[serde(rename = "bookValue")]
    BookValue,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 8] = [
        CanonicalField::Isin,
        CanonicalField::PurchaseDate,
        CanonicalField::MaturityDate,
        CanonicalField::PurchaseYtm,
        CanonicalField::Coupon,
        CanonicalField::FaceValue,
        CanonicalField::InitialInvestmentValue,
        CanonicalField::BookValue,
    ];

    pub const REQUIRED: [CanonicalField; 5] = [
        CanonicalField::PurchaseDate,
        CanonicalField::MaturityDate,
        CanonicalField::PurchaseYtm,
        CanonicalField::Coupon,
        CanonicalField::FaceValue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalField::Isin => "isin",
            CanonicalField::PurchaseDate => "purchaseDate",
            CanonicalField::MaturityDate => "maturityDate",
            CanonicalField::PurchaseYtm => "purchaseYTM",
            CanonicalField::Coupon => "coupon",
            CanonicalField::FaceValue => "faceValue",
            CanonicalField::InitialInvestmentValue => "initialInvestmentValue",
            CanonicalField::BookValue => "bookValue",
        }
    }

    pub fn is_required(self) -> bool {
        Self::REQUIRED.contains(&self)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in header variants, already in normalized form.
const DEFAULT_ALIASES: &[(CanonicalField, &[&str])] = &[
    (
        CanonicalField::Isin,
        &["isin", "security id", "security", "cusip", "identifier"],
    ),
    (
        CanonicalField::PurchaseDate,
        &[
            "purchase date",
            "purchasedate",
            "purchase_date",
            "initial inv date",
            "initial investment date",
            "settlement date",
            "trade date",
            "acquisition date",
        ],
    ),
    (
        CanonicalField::MaturityDate,
        &[
            "maturity date",
            "maturitydate",
            "maturity_date",
            "maturity",
            "redemption date",
        ],
    ),
    (
        CanonicalField::PurchaseYtm,
        &[
            "purchase ytm",
            "purchaseytm",
            "purchase_ytm",
            "ytm",
            "yield",
            "yield to maturity",
            "purchase yield",
        ],
    ),
    (
        CanonicalField::Coupon,
        &["coupon", "coupon rate", "couponrate", "coupon_rate", "cpn"],
    ),
    (
        CanonicalField::FaceValue,
        &[
            "face value",
            "facevalue",
            "face_value",
            "face",
            "par",
            "par value",
            "maturity value",
            "nominal",
            "principal",
        ],
    ),
    (
        CanonicalField::InitialInvestmentValue,
        &[
            "initial investment value",
            "initialinvestmentvalue",
            "initial_investment_value",
            "initial investment",
            "initial inv value",
            "cost",
            "purchase price",
            "investment value",
        ],
    ),
    (
        CanonicalField::BookValue,
        &[
            "book value",
            "bookvalue",
            "book_value",
            "carrying value",
            "amortized cost",
        ],
    ),
];

/// Trim, collapse internal whitespace, lower-case.
pub fn normalize_header(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Alias table
// ---------------------------------------------------------------------------

/// Many-to-one table from normalized header variants to canonical fields.
#[derive(Debug, Clone)]
pub struct ColumnAliases {
    lookup: BTreeMap<String, CanonicalField>,
    variants: BTreeMap<CanonicalField, Vec<String>>,
}

impl ColumnAliases {
    /// The built-in alias table.
    pub fn builtin() -> TreasuryRiskResult<Self> {
        let mut aliases = ColumnAliases {
            lookup: BTreeMap::new(),
            variants: BTreeMap::new(),
        };
        for (field, variants) in DEFAULT_ALIASES {
            for variant in variants.iter() {
                aliases.insert(*field, variant)?;
            }
        }
        aliases.check_coverage()?;
        Ok(aliases)
    }

    /// The built-in table extended with extra variants, e.g. from config.
    pub fn with_extra(extra: &BTreeMap<CanonicalField, Vec<String>>) -> TreasuryRiskResult<Self> {
        let mut aliases = Self::builtin()?;
        for (field, variants) in extra {
            for variant in variants {
                aliases.insert(*field, variant)?;
            }
        }
        Ok(aliases)
    }

    fn insert(&mut self, field: CanonicalField, variant: &str) -> TreasuryRiskResult<()> {
        let key = normalize_header(variant);
        if key.is_empty() {
            return Err(TreasuryRiskError::Config(format!(
                "empty header variant for {field}"
            )));
        }
        match self.lookup.get(&key) {
            Some(existing) if *existing != field => {
                return Err(TreasuryRiskError::Config(format!(
                    "header variant '{key}' is claimed by both {existing} and {field}"
                )));
            }
            Some(_) => return Ok(()),
            None => {}
        }
        self.lookup.insert(key.clone(), field);
        self.variants.entry(field).or_default().push(key);
        Ok(())
    }

    fn check_coverage(&self) -> TreasuryRiskResult<()> {
        for field in CanonicalField::ALL {
            if self.variants(field).is_empty() {
                return Err(TreasuryRiskError::Config(format!(
                    "no header variants configured for {field}"
                )));
            }
        }
        Ok(())
    }

    /// Resolve a raw header to its canonical field.
    pub fn resolve(&self, raw: &str) -> Option<CanonicalField> {
        self.lookup.get(&normalize_header(raw)).copied()
    }

    pub fn variants(&self, field: CanonicalField) -> &[String] {
        self.variants.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, &[String])> {
        self.variants.iter().map(|(f, v)| (*f, v.as_slice()))
    }
}

// ---------------------------------------------------------------------------
// Normalized table
// ---------------------------------------------------------------------------

/// A column after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Canonical(CanonicalField),
    /// Header with no alias; carried through and ignored downstream.
    Unmapped(String),
}

/// Uploaded rows with columns renamed to canonical fields, input order kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<String>>,
    index: BTreeMap<CanonicalField, usize>,
    row_numbers: Vec<usize>,
}

impl NormalizedTable {
    /// Use the data-row positions recorded when the file was read. Ignored
    /// unless there is exactly one number per row.
    pub fn with_row_numbers(mut self, row_numbers: Vec<usize>) -> Self {
        if row_numbers.len() == self.rows.len() {
            self.row_numbers = row_numbers;
        }
        self
    }

    /// 1-based data-row number reported for the row at `index`.
    pub fn row_number(&self, index: usize) -> usize {
        self.row_numbers.get(index).copied().unwrap_or(index + 1)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_field(&self, field: CanonicalField) -> bool {
        self.index.contains_key(&field)
    }

    pub fn column_index(&self, field: CanonicalField) -> Option<usize> {
        self.index.get(&field).copied()
    }

    /// Cell text for a canonical field. Ragged rows read as missing cells.
    pub fn cell(&self, row: usize, field: CanonicalField) -> Option<&str> {
        let col = self.column_index(field)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    pub fn header_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| match c {
                Column::Canonical(f) => f.as_str().to_string(),
                Column::Unmapped(raw) => raw.clone(),
            })
            .collect()
    }
}

/// Two raw headers that resolved to the same canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousColumn {
    pub field: CanonicalField,
    pub first: String,
    pub second: String,
}

/// Schema problems that block all calculation for an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaError {
    pub missing: Vec<CanonicalField>,
    pub ambiguous: Vec<AmbiguousColumn>,
}

impl SchemaError {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.ambiguous.is_empty()
    }

    /// Human-readable messages, one per problem.
    pub fn messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.missing.is_empty() {
            let names: Vec<&str> = self.missing.iter().map(|f| f.as_str()).collect();
            out.push(format!(
                "Uploaded file is missing required columns: {}",
                names.join(", ")
            ));
        }
        for a in &self.ambiguous {
            out.push(format!(
                "Columns '{}' and '{}' both map to {}",
                a.first, a.second, a.field
            ));
        }
        out
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

impl std::error::Error for SchemaError {}

/// How a single raw header was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMapping {
    pub raw: String,
    pub normalized: String,
    pub canonical: Option<CanonicalField>,
}

/// Report the resolution of each raw header without validating completeness.
pub fn explain(aliases: &ColumnAliases, raw_headers: &[String]) -> Vec<HeaderMapping> {
    raw_headers
        .iter()
        .map(|raw| HeaderMapping {
            raw: raw.clone(),
            normalized: normalize_header(raw),
            canonical: aliases.resolve(raw),
        })
        .collect()
}

/// Rename columns to canonical fields and check that every required field
/// is present exactly once.
pub fn normalize(
    aliases: &ColumnAliases,
    raw_headers: &[String],
    rows: Vec<Vec<String>>,
) -> Result<NormalizedTable, SchemaError> {
    let mut columns = Vec::with_capacity(raw_headers.len());
    let mut index: BTreeMap<CanonicalField, usize> = BTreeMap::new();
    let mut error = SchemaError::default();

    for (i, raw) in raw_headers.iter().enumerate() {
        match aliases.resolve(raw) {
            Some(field) => {
                if let Some(&first) = index.get(&field) {
                    error.ambiguous.push(AmbiguousColumn {
                        field,
                        first: raw_headers[first].clone(),
                        second: raw.clone(),
                    });
                } else {
                    index.insert(field, i);
                }
                columns.push(Column::Canonical(field));
            }
            None => columns.push(Column::Unmapped(raw.clone())),
        }
    }

    error.missing = CanonicalField::REQUIRED
        .iter()
        .copied()
        .filter(|f| !index.contains_key(f))
        .collect();

    if !error.is_empty() {
        return Err(error);
    }

    let row_numbers = (1..=rows.len()).collect();
    Ok(NormalizedTable {
        columns,
        rows,
        index,
        row_numbers,
    })
}
