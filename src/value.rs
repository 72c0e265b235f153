//! Helpers for comparing and coercing dynamic setting values.

use serde_json::Value;

/// Boolean coercion used for menu checkboxes: `null`, `false`, `0`, `""`
/// and NaN-like values are false, everything else is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// String form of a value, with strings left unquoted.
///
/// Two values with the same string form are treated as equal when
/// reconciling application state against stored settings (a stored `"90"`
/// matches a live `90`). Whole floats print without a fraction, so `7.0`
/// reads as `7`.
pub fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f == 0.0 => "0".to_string(),
            Some(f) => f.to_string(),
            None => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Strict equality with a single number type: `7` and `7.0` are the same
/// value, `7` and `"7"` are not.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| same_value(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| same_value(v, w)))
        }
        _ => a == b,
    }
}

/// Loose equality by string form.
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    a == b || string_form(a) == string_form(b)
}

/// Numeric coercion: numbers, numeric strings and booleans.
///
/// Returns `None` for anything that does not produce a finite float.
pub fn to_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthy() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!(1.5)));
        assert!(truthy(&json!("no")));
        assert!(truthy(&json!({})));
    }

    #[test]
    fn test_loosely_equal() {
        assert!(loosely_equal(&json!(90), &json!("90")));
        assert!(loosely_equal(&json!(true), &json!("true")));
        assert!(!loosely_equal(&json!(1), &json!(true)));
        assert!(!loosely_equal(&json!(null), &json!("")));
        assert!(loosely_equal(&json!(7), &json!(7.0)));
        assert!(loosely_equal(&json!(7.0), &json!("7")));
    }

    #[test]
    fn test_string_form_drops_whole_fraction() {
        assert_eq!(string_form(&json!(7.0)), "7");
        assert_eq!(string_form(&json!(-0.0)), "0");
        assert_eq!(string_form(&json!(2.5)), "2.5");
        assert_eq!(string_form(&json!(7)), "7");
        assert_eq!(string_form(&json!("x")), "x");
    }

    #[test]
    fn test_same_value_has_one_number_type() {
        assert!(same_value(&json!(7), &json!(7.0)));
        assert!(same_value(&json!([1, {"a": 2}]), &json!([1.0, {"a": 2.0}])));
        assert!(!same_value(&json!(7), &json!("7")));
        assert!(!same_value(&json!(7), &json!(7.5)));
        assert!(!same_value(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_to_f64() {
        assert_eq!(to_f64(&json!(1.25)), Some(1.25));
        assert_eq!(to_f64(&json!(" 45 ")), Some(45.0));
        assert_eq!(to_f64(&json!(true)), Some(1.0));
        assert_eq!(to_f64(&json!("abc")), None);
        assert_eq!(to_f64(&json!("inf")), None);
        assert_eq!(to_f64(&Value::Null), None);
    }
}
