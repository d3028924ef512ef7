//! Row and value representation shared by every query helper.

use rusqlite::types::{Value as SqlValue, ValueRef};

/// A single column value. JSON values let decoded JSON columns and plain
/// scalar columns live in the same row.
pub type Value = serde_json::Value;

/// A result row, keyed by column name in result-set order.
pub type Row = serde_json::Map<String, Value>;

/// Builds a [`Row`] from key/value pairs.
///
/// ```rust,ignore
/// let user = tabula_db::row([("name", "bob".into()), ("age", 30.into())]);
/// ```
pub fn row<K, I>(pairs: I) -> Row
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Converts a driver value into a row value.
///
/// Blobs have no JSON counterpart and are rendered as lowercase hex.
pub fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

/// Converts a row value into a driver value for statement binding.
pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Null
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Returns true for integers and for strings that are the exact decimal
/// rendering of an integer (`"12"`, `"-3"`, but not `"012"` or `"1.0"`).
pub fn is_int_like(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        Value::String(s) => s
            .parse::<i64>()
            .map(|parsed| parsed.to_string() == *s)
            .unwrap_or(false),
        _ => false,
    }
}

/// Loose truthiness: null, false, zero, `""`, `"0"` and empty
/// arrays/objects are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text of a value as it is spliced into SQL when it must not be escaped.
pub(crate) fn raw_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_like_strings() {
        assert!(is_int_like(&json!(12)));
        assert!(is_int_like(&json!("12")));
        assert!(is_int_like(&json!("-3")));
        assert!(!is_int_like(&json!("012")));
        assert!(!is_int_like(&json!("1.0")));
        assert!(!is_int_like(&json!(1.5)));
        assert!(!is_int_like(&json!("bob")));
    }

    #[test]
    fn truthiness_follows_loose_rules() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!("0"), json!([])] {
            assert!(!truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy_value in [json!(1), json!("a"), json!("00"), json!([0]), json!({"a": 1})] {
            assert!(truthy(&truthy_value), "{truthy_value} should be truthy");
        }
    }

    #[test]
    fn blobs_render_as_hex() {
        assert_eq!(from_sql(ValueRef::Blob(&[0xde, 0xad])), json!("dead"));
        assert_eq!(from_sql(ValueRef::Real(f64::NAN)), Value::Null);
    }

    #[test]
    fn structured_values_bind_as_json_text() {
        assert_eq!(
            to_sql(&json!({"a": [1, 2]})),
            SqlValue::Text("{\"a\":[1,2]}".to_string())
        );
        assert_eq!(to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql(&json!(2.5)), SqlValue::Real(2.5));
    }
}
