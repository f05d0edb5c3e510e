// src/utils/helpers.rs

use serde_json::Value;

/// Safely parses a JSON value to a floating-point number.
/// Malformed or absent numeric strings fall back to the default, never NaN.
pub fn safe_parse_float(value: &Value, default_value: f64) -> f64 {
    let parsed = match value {
        Value::Null => default_value,
        Value::Number(n) => n.as_f64().unwrap_or(default_value),
        Value::String(s) => {
            if s.trim().is_empty() {
                default_value
            } else {
                s.trim().parse::<f64>().unwrap_or(default_value)
            }
        }
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => default_value,
    };
    if parsed.is_nan() {
        default_value
    } else {
        parsed
    }
}

/// Safely parses a JSON value to a non-negative integer count (capacity,
/// preparation time). Fractional values are truncated.
pub fn safe_parse_u32(value: &Value, default_value: u32) -> u32 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(|v| v.min(u32::MAX as u64) as u32)
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u32))
            .unwrap_or(default_value),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                default_value
            } else {
                trimmed
                    .parse::<u32>()
                    .or_else(|_| trimmed.parse::<f64>().map(|f| f.max(0.0) as u32))
                    .unwrap_or(default_value)
            }
        }
        _ => default_value,
    }
}

/// Interprets the source system's `Inactive` flag and returns the negated
/// `is_active` value. The source emits both booleans and truthy numerics
/// (`1`/`"1"` for inactive); absent or unrecognized values count as active.
pub fn inactive_to_is_active(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(inactive)) => !inactive,
        Some(Value::Number(n)) => n.as_f64().map(|f| f == 0.0).unwrap_or(true),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "1" => false,
            _ => true,
        },
        _ => true,
    }
}

/// Extracts a non-empty trimmed string, if present.
pub fn non_empty_str(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_safe_parse_float() {
        assert_eq!(safe_parse_float(&json!(42.5), 0.0), 42.5);
        assert_eq!(safe_parse_float(&json!("95000"), 0.0), 95000.0);
        assert_eq!(safe_parse_float(&json!(null), 0.0), 0.0);
        assert_eq!(safe_parse_float(&json!(""), 0.0), 0.0);
        assert_eq!(safe_parse_float(&json!("invalid"), 0.0), 0.0);
        assert_eq!(safe_parse_float(&json!(true), 0.0), 1.0);
        assert_eq!(safe_parse_float(&json!([1, 2]), 7.0), 7.0);
    }

    #[test]
    fn test_safe_parse_u32() {
        assert_eq!(safe_parse_u32(&json!(4), 0), 4);
        assert_eq!(safe_parse_u32(&json!("6"), 0), 6);
        assert_eq!(safe_parse_u32(&json!("6.0"), 0), 6);
        assert_eq!(safe_parse_u32(&json!(""), 2), 2);
        assert_eq!(safe_parse_u32(&json!("bad"), 2), 2);
        assert_eq!(safe_parse_u32(&json!(null), 1), 1);
    }

    #[test]
    fn test_inactive_to_is_active_boolean() {
        assert!(!inactive_to_is_active(Some(&json!(true))));
        assert!(inactive_to_is_active(Some(&json!(false))));
        assert!(inactive_to_is_active(None));
        assert!(inactive_to_is_active(Some(&json!(null))));
    }

    #[test]
    fn test_inactive_to_is_active_truthy_numeric() {
        assert!(!inactive_to_is_active(Some(&json!(1))));
        assert!(inactive_to_is_active(Some(&json!(0))));
        assert!(!inactive_to_is_active(Some(&json!("1"))));
        assert!(inactive_to_is_active(Some(&json!("0"))));
        assert!(!inactive_to_is_active(Some(&json!("true"))));
        assert!(inactive_to_is_active(Some(&json!("no"))));
    }

    #[test]
    fn test_non_empty_str() {
        assert_eq!(non_empty_str(Some(&json!("  Pho  "))), Some("Pho".to_string()));
        assert_eq!(non_empty_str(Some(&json!(""))), None);
        assert_eq!(non_empty_str(Some(&json!(12))), Some("12".to_string()));
        assert_eq!(non_empty_str(None), None);
    }
}
