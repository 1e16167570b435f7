use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Holdings columns: (JSON path, header)
const HOLDING_COLUMNS: &[(&str, &str)] = &[
    ("row", "Row"),
    ("isin", "ISIN"),
    ("maturityDate", "Maturity"),
    ("faceValue", "Face"),
    ("initialInvestmentValue", "Initial"),
    ("bookValue", "Book"),
    ("marketValue", "Market"),
    ("gainLoss", "Gain/Loss"),
    ("status", "Status"),
];

const SENSITIVE_COLUMNS: &[(&str, &str)] = &[
    ("isin", "ISIN"),
    ("metrics.price", "Market"),
    ("metrics.modifiedDuration", "Mod Dur"),
    ("metrics.dv01", "DV01"),
    ("priceChange", "P/L Impact"),
    ("durationApproxPnl", "Dur Approx P/L"),
    ("contributionPct", "% of P/L"),
];

/// Format output as a table using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_table(result, map);
            } else if let Some(Value::Array(results)) = map.get("results") {
                print_array_table(results);
            } else {
                print_flat_object(value);
            }
        }
        Value::Array(arr) => {
            print_array_table(arr);
        }
        _ => {
            println!("{}", value);
        }
    }
}

fn print_result_table(result: &Value, envelope: &Map<String, Value>) {
    match result {
        Value::Object(res) if res.get("rows").map_or(false, Value::is_array) => {
            print_report(res);
        }
        Value::Object(res) => {
            print_flat_object(result);
            for (key, val) in res {
                if let Value::Array(items) = val {
                    if items.first().map_or(false, Value::is_object) {
                        println!("\n{}:", key);
                        print_array_table(items);
                    }
                }
            }
        }
        _ => print_flat_object(&Value::Object(envelope.clone())),
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

/// Valuation report: holdings, totals, then risk when present.
fn print_report(res: &Map<String, Value>) {
    if let Some(Value::String(as_of)) = res.get("asOf") {
        println!("As of {}", as_of);
    }
    if let Some(Value::Array(rows)) = res.get("rows") {
        print_columns(rows, HOLDING_COLUMNS);
    }
    if let Some(totals) = res.get("totals") {
        println!("\nTotals:");
        print_flat_object(totals);
    }
    if let Some(risk) = res.get("risk") {
        if let Some(summary) = risk.get("summary") {
            println!("\nRisk summary:");
            print_flat_object(summary);
        }
        if let Some(Value::Array(top)) = risk.get("topSensitive") {
            if !top.is_empty() {
                println!("\nMost sensitive holdings:");
                print_columns(top, SENSITIVE_COLUMNS);
            }
        }
    }
}

fn lookup<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(item, |v, key| v.get(key))
}

fn print_columns(items: &[Value], columns: &[(&str, &str)]) {
    if items.is_empty() {
        println!("(empty)");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|(_, header)| *header));
    for item in items {
        builder.push_record(
            columns
                .iter()
                .map(|(path, _)| lookup(item, path).map(format_value).unwrap_or_default()),
        );
    }
    println!("{}", Table::from(builder));
}

fn print_flat_object(value: &Value) {
    if let Value::Object(map) = value {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in map {
            if val.is_object() || val.as_array().map_or(false, |a| a.iter().any(Value::is_object)) {
                continue;
            }
            builder.push_record([key.as_str(), &format_value(val)]);
        }
        let table = Table::from(builder);
        println!("{}", table);
    }
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        let table = Table::from(builder);
        println!("{}", table);
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
