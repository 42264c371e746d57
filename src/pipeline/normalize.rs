//! Numeric normalization for values read from model replies and sheet cells.
//!
//! Never fails: anything that is not a finite number becomes `None`.
//! Censored results (`<5`, `>1000`, `≤0.5`) are coerced to their boundary.

use std::sync::LazyLock;

use regex::Regex;

/// Comparator prefix on a censored result, after whitespace removal.
static CENSORED_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:<=|>=|<|>|≤|≥)").unwrap());

/// Coerce a textual number into `f64`.
///
/// Whitespace is dropped, a comma decimal separator becomes a period and a
/// leading comparator is stripped. Failure yields `None`.
pub fn normalize_numeric(raw: &str) -> Option<f64> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    let boundary = CENSORED_PREFIX.replace(&compact, "");
    if boundary.len() != compact.len() {
        tracing::debug!(raw = %raw, "Censored value coerced to its boundary");
    }

    match boundary.replace(',', ".").parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => None,
    }
}

/// Coerce a JSON reply value. Numbers pass through, strings are normalized,
/// everything else is missing.
pub fn normalize_json(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        serde_json::Value::String(s) => normalize_numeric(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn comma_decimal_becomes_period() {
        assert_eq!(normalize_numeric("5,1"), Some(5.1));
        assert_eq!(normalize_numeric("0,08"), Some(0.08));
        assert_eq!(normalize_numeric("12,0"), Some(12.0));
    }

    #[test]
    fn comma_and_period_forms_agree() {
        for (comma, period) in [("3,75", "3.75"), ("101,5", "101.5"), ("0,5", "0.5")] {
            assert_eq!(normalize_numeric(comma), normalize_numeric(period));
        }
    }

    #[test]
    fn stray_whitespace_is_ignored() {
        assert_eq!(normalize_numeric("  11.4 "), Some(11.4));
        assert_eq!(normalize_numeric("\t7,2\n"), Some(7.2));
        assert_eq!(normalize_numeric("250 000"), Some(250000.0));
    }

    #[test]
    fn censored_values_take_their_boundary() {
        assert_eq!(normalize_numeric("<5"), Some(5.0));
        assert_eq!(normalize_numeric("> 1000"), Some(1000.0));
        assert_eq!(normalize_numeric("<=0,5"), Some(0.5));
        assert_eq!(normalize_numeric("≥ 200"), Some(200.0));
        assert_eq!(normalize_numeric("≤0.02"), Some(0.02));
    }

    #[test]
    fn malformed_input_is_missing() {
        for raw in [
            "", "   ", "-", "null", "abc", "1.2.3", "12 mg/L", "<", "NaN", "inf", "-infinity",
            "1,234.5", "--5",
        ] {
            assert_eq!(normalize_numeric(raw), None, "{raw:?}");
        }
    }

    #[test]
    fn signs_are_kept() {
        assert_eq!(normalize_numeric("-1,5"), Some(-1.5));
        assert_eq!(normalize_numeric("+2"), Some(2.0));
    }

    #[test]
    fn json_values() {
        assert_eq!(normalize_json(&json!(9.9)), Some(9.9));
        assert_eq!(normalize_json(&json!(250000)), Some(250000.0));
        assert_eq!(normalize_json(&json!("4,3")), Some(4.3));
        assert_eq!(normalize_json(&json!(null)), None);
        assert_eq!(normalize_json(&json!(true)), None);
        assert_eq!(normalize_json(&json!([1.0])), None);
        assert_eq!(normalize_json(&json!({"value": 1.0})), None);
    }
}
