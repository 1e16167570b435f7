use clap::Args;
use serde_json::{json, Value};

use treasury_risk_core::config::Config;
use treasury_risk_core::ingest::read_csv;
use treasury_risk_core::schema::{explain, normalize, CanonicalField};

use crate::input;

/// Arguments for header mapping inspection
#[derive(Args)]
pub struct SchemaArgs {
    /// Path to holdings CSV (reads stdin when omitted)
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for the alias table listing
#[derive(Args)]
pub struct AliasesArgs {
    /// Only list variants for this canonical field, e.g. faceValue
    #[arg(long)]
    pub field: Option<String>,
}

/// Header-by-header mapping plus the completeness check. Schema problems
/// are reported, not raised.
pub fn run_schema(args: SchemaArgs, config: &Config) -> Result<Value, Box<dyn std::error::Error>> {
    let bytes = input::read_upload(args.input.as_deref())?;
    let aliases = config.aliases()?;
    let raw = read_csv(&bytes)?;

    let columns = explain(&aliases, &raw.headers);
    let row_count = raw.rows.len();
    let (missing, ambiguous, warnings) = match normalize(&aliases, &raw.headers, raw.rows) {
        Ok(_) => (Vec::new(), Vec::new(), Vec::new()),
        Err(e) => {
            let messages = e.messages();
            (e.missing, e.ambiguous, messages)
        }
    };

    Ok(json!({
        "result": {
            "valid": missing.is_empty() && ambiguous.is_empty(),
            "rows": row_count,
            "columns": columns,
            "missing": missing,
            "ambiguous": ambiguous,
        },
        "warnings": warnings,
    }))
}

pub fn run_aliases(args: AliasesArgs, config: &Config) -> Result<Value, Box<dyn std::error::Error>> {
    let aliases = config.aliases()?;
    let wanted = match args.field {
        Some(ref name) => Some(
            CanonicalField::ALL
                .into_iter()
                .find(|f| f.as_str().eq_ignore_ascii_case(name.trim()))
                .ok_or_else(|| format!("Unknown canonical field '{name}'"))?,
        ),
        None => None,
    };

    let results: Vec<Value> = aliases
        .iter()
        .filter(|(field, _)| wanted.map_or(true, |w| w == *field))
        .map(|(field, variants)| {
            json!({
                "field": field,
                "required": field.is_required(),
                "variants": variants,
            })
        })
        .collect();

    Ok(json!({ "results": results }))
}
