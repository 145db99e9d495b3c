//! Keyset pagination cursors.
//!
//! A cursor captures the sort-key values of the last row of a page plus a
//! unique tiebreaker and a fingerprint of the ORDER BY it was produced
//! under. Decoding is strict; a cursor whose fingerprint does not match the
//! current order must be rejected by the caller.

use crate::error::{Error, Result};
use crate::order::OrderByPart;
use crate::path::{segments_to_string, PathSegment};
use crate::value;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonbq_sql::{OrderDirection, SqlFragment};
use serde_json::{json, Value};

/// Decoded cursor contents.
#[derive(Clone, Debug, PartialEq)]
pub struct CursorPayload {
    /// One sort-key value per ORDER BY part.
    pub values: Vec<Value>,
    /// Tiebreaker column value of the boundary row.
    pub tiebreaker: String,
    /// 16-hex-char fingerprint of the ORDER BY the cursor belongs to.
    pub hash: String,
}

impl CursorPayload {
    /// Whether this cursor was produced under the given sort fingerprint.
    pub fn matches(&self, hash: &str) -> bool {
        self.hash == hash
    }
}

/// The tiebreaker column appended to every keyset comparison.
#[derive(Clone, Debug)]
pub struct Tiebreaker {
    pub expression: SqlFragment,
    pub direction: OrderDirection,
    pub value: String,
}

/// Fingerprint of a normalized ORDER BY: 16 hex chars of the MD5 over the
/// canonical part descriptions. Reordering or reconfiguring any part
/// changes the hash.
pub fn compute_sort_hash(parts: &[OrderByPart]) -> String {
    let canonical: Vec<String> = parts
        .iter()
        .map(|part| {
            let direction = match part.direction {
                OrderDirection::Asc => "asc",
                OrderDirection::Desc => "desc",
            };
            match &part.json {
                None => format!("{}:{}", part.field, direction),
                Some(config) => format!(
                    "{}:json:{}:{}:{}:{}",
                    part.field,
                    segments_to_string(&config.segments),
                    config.cast.as_sql(),
                    config.aggregation.map(|a| a.as_str()).unwrap_or(""),
                    direction,
                ),
            }
        })
        .collect();

    let digest = format!("{:x}", md5::compute(canonical.join("|")));
    digest[..16].to_string()
}

/// Encode a cursor as base64url JSON `{v, t, h}`.
pub fn encode_cursor(values: &[Value], tiebreaker: &str, hash: &str) -> String {
    let payload = json!({
        "v": values,
        "t": tiebreaker,
        "h": hash,
    });
    URL_SAFE_NO_PAD.encode(payload.to_string())
}

/// Decode a cursor. Returns `None` on malformed base64, non-JSON payloads,
/// or any structural mismatch.
pub fn decode_cursor(cursor: &str) -> Option<CursorPayload> {
    let bytes = URL_SAFE_NO_PAD.decode(cursor).ok()?;
    let payload: Value = serde_json::from_slice(&bytes).ok()?;
    let map = payload.as_object()?;

    let values = map.get("v")?.as_array()?;
    if values.iter().any(|v| v.is_object() || v.is_array()) {
        return None;
    }
    let tiebreaker = map.get("t")?.as_str()?;
    let hash = map.get("h")?.as_str()?;

    Some(CursorPayload {
        values: values.clone(),
        tiebreaker: tiebreaker.to_string(),
        hash: hash.to_string(),
    })
}

/// Read the sort-key values for a result row (decoded as JSON).
///
/// Regular parts read the column directly; JSON parts navigate the decoded
/// value by path, where wildcards yield null and non-primitives coerce to
/// null.
pub fn extract_cursor_values(row: &Value, parts: &[OrderByPart]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            let column = row.get(&part.field).unwrap_or(&Value::Null);
            let extracted = match &part.json {
                None => column.clone(),
                Some(config) => navigate(column, &config.segments),
            };
            match extracted {
                Value::Object(_) | Value::Array(_) => Value::Null,
                primitive => primitive,
            }
        })
        .collect()
}

fn navigate(value: &Value, segments: &[PathSegment]) -> Value {
    let mut current = value;
    for segment in segments {
        let next = match segment {
            PathSegment::Key(k) => current.get(k.as_str()),
            PathSegment::Index(i) => current.get(*i as usize),
            PathSegment::Last => current.as_array().and_then(|a| a.last()),
            PathSegment::Wildcard => None,
        };
        match next {
            Some(v) => current = v,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Build the "strictly after the cursor row" predicate.
///
/// Lexicographic expansion over the parts, with the tiebreaker as the final
/// term. NULL ordering follows the PostgreSQL defaults (ASC = NULLS LAST,
/// DESC = NULLS FIRST): an ASC part whose cursor value is null contributes
/// FALSE (nothing sorts after it), a DESC part with a null cursor value
/// keeps only non-null rows, and equality against null is `IS NULL`.
pub fn build_keyset_condition(
    parts: &[OrderByPart],
    values: &[Value],
    tiebreaker: &Tiebreaker,
) -> Result<SqlFragment> {
    if parts.len() != values.len() {
        return Err(Error::invalid_value(
            "cursor",
            format!(
                "cursor has {} values for {} order parts",
                values.len(),
                parts.len()
            ),
        ));
    }

    let mut branches = Vec::new();

    for i in 0..=parts.len() {
        let mut terms = Vec::new();

        for j in 0..i {
            terms.push(equality_term(&parts[j].expression, &values[j]));
        }

        let strict = if i < parts.len() {
            strict_term(&parts[i].expression, parts[i].direction, &values[i])
        } else {
            strict_term(
                &tiebreaker.expression,
                tiebreaker.direction,
                &Value::String(tiebreaker.value.clone()),
            )
        };

        // A FALSE strict term makes the whole branch unsatisfiable.
        let Some(strict) = strict else {
            continue;
        };
        terms.push(strict);

        branches.push(SqlFragment::join(" AND ", terms).parens());
    }

    Ok(SqlFragment::join(" OR ", branches))
}

fn equality_term(expression: &SqlFragment, cursor_value: &Value) -> SqlFragment {
    let mut frag = expression.clone();
    if cursor_value.is_null() {
        frag.push(" IS NULL");
    } else {
        frag.push(" = ");
        frag.push_param(value::param_for_value(cursor_value));
    }
    frag
}

/// The strict comparator for one part, or `None` when no row can follow.
fn strict_term(
    expression: &SqlFragment,
    direction: OrderDirection,
    cursor_value: &Value,
) -> Option<SqlFragment> {
    match (direction, cursor_value.is_null()) {
        // Nulls sort last under ASC: nothing comes after a null cursor key.
        (OrderDirection::Asc, true) => None,
        // Nulls sort first under DESC: everything after is non-null.
        (OrderDirection::Desc, true) => {
            let mut frag = expression.clone();
            frag.push(" IS NOT NULL");
            Some(frag)
        }
        (OrderDirection::Asc, false) => {
            let mut frag = SqlFragment::raw("(");
            frag.append(expression.clone());
            frag.push(" > ");
            frag.push_param(value::param_for_value(cursor_value));
            frag.push(" OR ");
            frag.append(expression.clone());
            frag.push(" IS NULL)");
            Some(frag)
        }
        (OrderDirection::Desc, false) => {
            let mut frag = expression.clone();
            frag.push(" < ");
            frag.push_param(value::param_for_value(cursor_value));
            Some(frag)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldConfig, FieldType};
    use crate::order::compile_order_by_parts;
    use jsonbq_sql::SqlParam;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config() -> FieldConfig {
        FieldConfig::new()
            .declare("createdAt", FieldType::Date)
            .declare("data", FieldType::Json)
    }

    fn parts(order_by: Value) -> Vec<OrderByPart> {
        compile_order_by_parts(&order_by, &config(), "u").unwrap()
    }

    fn tiebreaker() -> Tiebreaker {
        Tiebreaker {
            expression: SqlFragment::raw("u.\"id\""),
            direction: OrderDirection::Asc,
            value: "row-17".to_string(),
        }
    }

    #[test]
    fn cursor_round_trip() {
        let values = vec![json!("2025-01-01T00:00:00Z"), json!(42), json!(null)];
        let encoded = encode_cursor(&values, "row-17", "0123456789abcdef");
        let decoded = decode_cursor(&encoded).unwrap();

        assert_eq!(decoded.values, values);
        assert_eq!(decoded.tiebreaker, "row-17");
        assert_eq!(decoded.hash, "0123456789abcdef");
        assert!(decoded.matches("0123456789abcdef"));
        assert!(!decoded.matches("ffffffffffffffff"));
    }

    #[test]
    fn decode_rejects_malformed_cursors() {
        assert_eq!(decode_cursor("not-base64!!"), None);
        assert_eq!(decode_cursor(&URL_SAFE_NO_PAD.encode("not json")), None);
        // v must be primitives
        let bad = URL_SAFE_NO_PAD.encode(r#"{"v":[{"a":1}],"t":"x","h":"0000000000000000"}"#);
        assert_eq!(decode_cursor(&bad), None);
        // t must be a string
        let bad = URL_SAFE_NO_PAD.encode(r#"{"v":[],"t":7,"h":"0000000000000000"}"#);
        assert_eq!(decode_cursor(&bad), None);
        // h must be present
        let bad = URL_SAFE_NO_PAD.encode(r#"{"v":[],"t":"x"}"#);
        assert_eq!(decode_cursor(&bad), None);
    }

    #[test]
    fn sort_hash_is_16_hex_and_order_sensitive() {
        let a = compute_sort_hash(&parts(json!([{"createdAt": "asc"}, {"name": "desc"}])));
        let b = compute_sort_hash(&parts(json!([{"name": "desc"}, {"createdAt": "asc"}])));

        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);

        // pure function
        let again = compute_sort_hash(&parts(json!([{"createdAt": "asc"}, {"name": "desc"}])));
        assert_eq!(a, again);
    }

    #[test]
    fn sort_hash_covers_json_config() {
        let plain = compute_sort_hash(&parts(json!({
            "data": {"path": "scores[*]", "direction": "asc", "type": "int"}
        })));
        let aggregated = compute_sort_hash(&parts(json!({
            "data": {"path": "scores[*]", "direction": "asc", "type": "int",
                      "aggregation": "avg"}
        })));
        assert_ne!(plain, aggregated);
    }

    #[test]
    fn keyset_condition_expands_lexicographically() {
        let parts = parts(json!([{"createdAt": "asc"}, {"name": "desc"}]));
        let condition = build_keyset_condition(
            &parts,
            &[json!("2025-01-01"), json!("zed")],
            &tiebreaker(),
        )
        .unwrap();

        assert_eq!(
            condition.sql(),
            "((u.\"createdAt\" > $1 OR u.\"createdAt\" IS NULL)) OR \
             (u.\"createdAt\" = $2 AND u.\"name\" < $3) OR \
             (u.\"createdAt\" = $4 AND u.\"name\" = $5 AND (u.\"id\" > $6 OR u.\"id\" IS NULL))"
        );
        assert_eq!(condition.params()[5], SqlParam::Text("row-17".into()));
    }

    #[test]
    fn null_cursor_value_on_asc_part_drops_the_branch() {
        let parts = parts(json!([{"name": "asc"}]));
        let condition =
            build_keyset_condition(&parts, &[json!(null)], &tiebreaker()).unwrap();

        // first branch is unsatisfiable; only the tiebreaker branch remains,
        // with IS NULL equality
        assert_eq!(
            condition.sql(),
            "(u.\"name\" IS NULL AND (u.\"id\" > $1 OR u.\"id\" IS NULL))"
        );
    }

    #[test]
    fn null_cursor_value_on_desc_part_keeps_non_null_rows() {
        let parts = parts(json!([{"name": "desc"}]));
        let condition =
            build_keyset_condition(&parts, &[json!(null)], &tiebreaker()).unwrap();

        assert_eq!(
            condition.sql(),
            "(u.\"name\" IS NOT NULL) OR \
             (u.\"name\" IS NULL AND (u.\"id\" > $1 OR u.\"id\" IS NULL))"
        );
    }

    #[test]
    fn value_count_mismatch_is_rejected() {
        let parts = parts(json!([{"name": "asc"}]));
        let err = build_keyset_condition(&parts, &[], &tiebreaker()).unwrap_err();
        assert!(matches!(err, Error::InvalidValueForOperator { .. }));
    }

    #[test]
    fn extraction_reads_columns_and_paths() {
        let parts = parts(json!([
            {"createdAt": "asc"},
            {"data": {"path": "user.scores[0]", "direction": "asc", "type": "int"}},
            {"data": {"path": "user.scores[-1]", "direction": "asc", "type": "int"}},
            {"data": {"path": "scores[*]", "direction": "asc", "type": "int",
                       "aggregation": "avg"}}
        ]));
        let row = json!({
            "createdAt": "2025-01-01T00:00:00Z",
            "data": {"user": {"scores": [7, 8, 9]}}
        });

        assert_eq!(
            extract_cursor_values(&row, &parts),
            vec![
                json!("2025-01-01T00:00:00Z"),
                json!(7),
                json!(9),
                json!(null),
            ]
        );
    }

    #[test]
    fn extraction_coerces_non_primitives_to_null() {
        let parts = parts(json!([
            {"data": {"path": "user", "direction": "asc"}},
            {"missing": "asc"}
        ]));
        let row = json!({"data": {"user": {"a": 1}}});
        assert_eq!(
            extract_cursor_values(&row, &parts),
            vec![json!(null), json!(null)]
        );
    }
}
