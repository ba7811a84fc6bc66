//! Coercion of loosely typed JSON payload fields into finite `f64`s.
//!
//! Exchanges report numbers as JSON strings (`"10.51"`), integers or floats,
//! sometimes all three for the same field across endpoints. Every adapter
//! routes numeric fields through [`num`] so the typed records never carry an
//! error value or a NaN.

use serde_json::Value;
use tracing::warn;

use pm_core::trading::finite_or_zero;

/// Coerce a JSON value to a finite `f64`.
///
/// Strings are parsed, integers and floats are converted. `null` and an
/// absent field give `0.0` silently; any other type gives `0.0` and a warning.
pub fn to_f64(v: &Value, field: &str) -> f64 {
    let out = match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(x) => x,
            Err(_) => {
                warn!("[normalize] field {field}: unparsable number {s:?}, using 0");
                0.0
            }
        },
        Value::Null => 0.0,
        other => {
            warn!("[normalize] field {field}: unexpected type {other}, using 0");
            0.0
        }
    };
    finite_or_zero(out)
}

/// Look up `key` in an object and coerce it with [`to_f64`].
pub fn num(obj: &Value, key: &str) -> f64 {
    obj.get(key).map(|v| to_f64(v, key)).unwrap_or(0.0)
}

/// Look up `key` and render it as a string (numbers are stringified).
pub fn text(obj: &Value, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Look up an integer timestamp, accepting floats (Gate reports seconds as
/// `1700000000.123`) and strings.
pub fn millis(obj: &Value, key: &str, seconds: bool) -> u64 {
    let raw = num(obj, key);
    let ms = if seconds { raw * 1000.0 } else { raw };
    if ms > 0.0 { ms as u64 } else { 0 }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn coerces_strings_ints_and_floats() {
        let v = json!({ "a": "10.51", "b": 7, "c": 2.5, "d": " 3 " });
        assert_eq!(num(&v, "a"), 10.51);
        assert_eq!(num(&v, "b"), 7.0);
        assert_eq!(num(&v, "c"), 2.5);
        assert_eq!(num(&v, "d"), 3.0);
    }

    #[test]
    fn uncoercible_is_zero() {
        let v = json!({ "a": "abc", "b": [1], "c": null, "d": "NaN", "e": "inf" });
        for key in ["a", "b", "c", "d", "e", "missing"] {
            assert_eq!(num(&v, key), 0.0, "{key}");
        }
    }

    #[test]
    fn text_and_millis() {
        let v = json!({ "id": 123456789012_u64, "s": "x", "t": 1700000000.5 });
        assert_eq!(text(&v, "id"), "123456789012");
        assert_eq!(text(&v, "s"), "x");
        assert_eq!(millis(&v, "t", true), 1_700_000_000_500);
    }
}
