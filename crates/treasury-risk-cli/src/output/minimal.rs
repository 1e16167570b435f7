use serde_json::Value;

/// Print just the key answer value from the output.
///
/// Looks for well-known result fields in order of priority, including the
/// report totals, then falls back to the first field in the result object.
pub fn print_minimal(value: &Value) {
    if let Some(Value::Array(results)) = value.get("results") {
        println!("{}", results.len());
        return;
    }

    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    // Paths into the result object, most important first
    let priority_paths = [
        "totals.totalGainLoss",
        "totals.totalMarketValue",
        "risk.summary.totalPnlImpact",
        "valid",
    ];

    for path in &priority_paths {
        let found = path
            .split('.')
            .try_fold(result_obj, |v, key| v.get(key));
        if let Some(val) = found {
            if !val.is_null() {
                println!("{}", format_minimal(val));
                return;
            }
        }
    }

    if let Value::Object(map) = result_obj {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
