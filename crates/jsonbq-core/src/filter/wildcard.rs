//! Wildcard paths.
//!
//! A path containing `*` is rewritten into a guarded EXISTS over
//! `jsonb_array_elements`: the predicate holds when any element of the
//! enclosing array satisfies it. Nested wildcards recurse, one lateral
//! expansion per star.

use crate::error::Result;
use crate::filter::json::{compile_operator_at, JsonOperator, JsonTarget};
use crate::filter::scalar::CaseMode;
use crate::filter::search::SearchOptions;
use crate::path::{self, PathSegment};
use jsonbq_sql::SqlFragment;
use serde_json::Value;

/// Compile `op` against a path containing at least one wildcard. `base` is
/// the trusted expression holding the JSONB value; `depth` names the lateral
/// element aliases (`elem`, `elem1`, ...).
pub(crate) fn compile_wildcard(
    base: &str,
    segments: &[PathSegment],
    op: JsonOperator,
    operand: &Value,
    mode: CaseMode,
    depth: usize,
) -> Result<SqlFragment> {
    let (before, after) = match path::split_at_wildcard(segments) {
        Some(split) => split,
        None => {
            // No star left: apply the operator at the remaining path.
            let target = if depth == 0 {
                JsonTarget::column(base, segments)
            } else {
                JsonTarget::element(base, segments)
            };
            return compile_operator_at(&target, op, operand, mode, &SearchOptions::default());
        }
    };

    let alias = element_alias(depth);
    let array = if depth == 0 {
        JsonTarget::column(base, before)
    } else {
        JsonTarget::element(base, before)
    };
    let element = format!("{alias}.value");

    let condition = if path::has_wildcard(after) {
        compile_wildcard(&element, after, op, operand, mode, depth + 1)?
    } else {
        let target = JsonTarget::element(element, after);
        compile_operator_at(&target, op, operand, mode, &SearchOptions::default())?
    };

    let mut frag = SqlFragment::raw("EXISTS (SELECT 1 FROM jsonb_array_elements(");
    frag.append(array.jsonb_expr());
    frag.push(&format!(") AS {alias}(value) WHERE "));
    frag.append(condition);
    frag.push(" AND jsonb_typeof(");
    frag.append(array.jsonb_expr());
    frag.push(") = 'array')");
    Ok(frag)
}

fn element_alias(depth: usize) -> String {
    if depth == 0 {
        "elem".to_string()
    } else {
        format!("elem{depth}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compile(path: &str, op: JsonOperator, operand: Value) -> SqlFragment {
        let segments = path::parse_json_path(path).unwrap();
        compile_wildcard(
            "t.\"data\"",
            &segments,
            op,
            &operand,
            CaseMode::Sensitive,
            0,
        )
        .unwrap()
    }

    #[test]
    fn single_wildcard_wraps_operator_in_exists() {
        let frag = compile("products[*].price", JsonOperator::Gt, json!(100));
        assert_eq!(
            frag.sql(),
            "EXISTS (SELECT 1 FROM jsonb_array_elements((t.\"data\" #> $1::text[])::jsonb) \
             AS elem(value) WHERE ((elem.value #> $2::text[])::jsonb > $3::jsonb AND \
             jsonb_typeof((elem.value #> $4::text[])::jsonb) = 'number') AND \
             jsonb_typeof((t.\"data\" #> $5::text[])::jsonb) = 'array')"
        );
        assert_eq!(frag.param_count(), 5);
    }

    #[test]
    fn leading_wildcard_expands_the_column_itself() {
        let segments = path::parse_json_path("[*]").unwrap();
        let frag = compile_wildcard(
            "t.\"data\"",
            &segments,
            JsonOperator::Equals,
            &json!("x"),
            CaseMode::Sensitive,
            0,
        )
        .unwrap();
        assert_eq!(
            frag.sql(),
            "EXISTS (SELECT 1 FROM jsonb_array_elements(t.\"data\"::jsonb) AS elem(value) \
             WHERE elem.value #>> '{}' = $1 AND jsonb_typeof(t.\"data\"::jsonb) = 'array')"
        );
    }

    #[test]
    fn nested_wildcards_expand_once_per_star() {
        let frag = compile("matrix[*][*]", JsonOperator::Equals, json!(0));
        let expansions = frag.sql().matches("jsonb_array_elements(").count();
        assert_eq!(expansions, 2);
        assert!(frag.sql().contains("AS elem(value)"));
        assert!(frag.sql().contains("AS elem1(value)"));
    }

    #[test]
    fn three_stars_three_expansions() {
        let frag = compile("a[*].b[*].c[*].d", JsonOperator::Equals, json!(1));
        assert_eq!(frag.sql().matches("jsonb_array_elements(").count(), 3);
        assert_eq!(frag.sql().matches("= 'array'").count(), 3);
    }

    #[test]
    fn insensitive_mode_carries_into_the_leaf() {
        let segments = path::parse_json_path("names[*]").unwrap();
        let frag = compile_wildcard(
            "t.\"data\"",
            &segments,
            JsonOperator::Equals,
            &json!("ada"),
            CaseMode::Insensitive,
            0,
        )
        .unwrap();
        assert!(frag.sql().contains("LOWER(elem.value #>> '{}') = LOWER($2)"));
    }
}
