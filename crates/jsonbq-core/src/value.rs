//! Value encoding.
//!
//! Turns filter values into typed parameters. Values are never rendered
//! into SQL text, and case folding happens in the database (`LOWER(...)`),
//! never at encode time, so bound parameters keep their original form.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use jsonbq_sql::SqlParam;
use serde_json::Value;

/// Bind a JSON value as a parameter of the matching SQL type.
/// Objects and arrays bind as jsonb.
pub fn param_for_value(value: &Value) -> SqlParam {
    match value {
        Value::Null => SqlParam::Null,
        Value::Bool(b) => SqlParam::Bool(*b),
        Value::Number(n) => number_param(n),
        Value::String(s) => SqlParam::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlParam::Json(value.clone()),
    }
}

/// Bind a JSON number, preserving integer-ness.
pub fn number_param(n: &serde_json::Number) -> SqlParam {
    match n.as_i64() {
        Some(i) => SqlParam::Int(i),
        None => SqlParam::Float(n.as_f64().unwrap_or(f64::NAN)),
    }
}

/// Render a JSON value the way text comparison against `#>>` output needs
/// it: strings stay unquoted, everything else is canonical JSON text.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a date filter value: an ISO-8601 string (RFC 3339, naive datetime,
/// or date-at-midnight) or a millisecond epoch number.
pub fn parse_date(op: &str, value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s)
            .ok_or_else(|| Error::invalid_value(op, format!("unparseable date: {s}"))),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| Error::invalid_value(op, format!("unparseable epoch: {n}"))),
        other => Err(Error::invalid_value(
            op,
            format!("expected a date string, got {other}"),
        )),
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Some(t.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
    }
    None
}
