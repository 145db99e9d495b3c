//! Filters over JSONB fields.
//!
//! A JSON filter is an object of operator keys applied at a path inside the
//! column. The operator set is closed; dispatch is an exhaustive match. Each
//! operator knows how to emit against any *target* (the column itself, or a
//! lateral array element inside a wildcard subquery), which is what lets the
//! wildcard compiler reuse the whole table.

use crate::error::{Error, Result};
use crate::filter::scalar::CaseMode;
use crate::filter::search::{compile_search, SearchOptions};
use crate::filter::wildcard::compile_wildcard;
use crate::path::{self, PathSegment};
use crate::value;
use jsonbq_sql::{escape_ident, Expr, SqlFragment, SqlParam};
use serde_json::Value;

/// Filter-object keys that are not operators.
const METADATA_KEYS: &[&str] = &["path", "mode", "searchLanguage", "searchType", "searchIn"];

/// The recognized JSON operator set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum JsonOperator {
    Equals,
    Not,
    Gt,
    Gte,
    Lt,
    Lte,
    StringContains,
    StringStartsWith,
    StringEndsWith,
    ArrayContains,
    ArrayStartsWith,
    ArrayEndsWith,
    In,
    NotIn,
    Search,
}

impl JsonOperator {
    pub(crate) fn parse(key: &str) -> Option<Self> {
        match key {
            "equals" => Some(Self::Equals),
            "not" => Some(Self::Not),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "string_contains" => Some(Self::StringContains),
            "string_starts_with" => Some(Self::StringStartsWith),
            "string_ends_with" => Some(Self::StringEndsWith),
            "array_contains" => Some(Self::ArrayContains),
            "array_starts_with" => Some(Self::ArrayStartsWith),
            "array_ends_with" => Some(Self::ArrayEndsWith),
            "in" => Some(Self::In),
            "notIn" => Some(Self::NotIn),
            "search" => Some(Self::Search),
            _ => None,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Not => "not",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::StringContains => "string_contains",
            Self::StringStartsWith => "string_starts_with",
            Self::StringEndsWith => "string_ends_with",
            Self::ArrayContains => "array_contains",
            Self::ArrayStartsWith => "array_starts_with",
            Self::ArrayEndsWith => "array_ends_with",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::Search => "search",
        }
    }

    /// Whether the operator may be applied at the empty path (the whole
    /// column value): whole-value comparison, the array operators, and
    /// search. Text-extraction operators need a location to extract from.
    pub(crate) fn supports_special_path(self) -> bool {
        matches!(
            self,
            Self::Equals
                | Self::ArrayContains
                | Self::ArrayStartsWith
                | Self::ArrayEndsWith
                | Self::Search
        )
    }

    /// Whether the operator is part of the wildcard-context vocabulary.
    pub(crate) fn supported_with_wildcard(self) -> bool {
        !matches!(self, Self::In | Self::NotIn | Self::Search)
    }
}

/// A JSONB expression to filter on: a trusted base expression plus a
/// wildcard-free path below it.
///
/// The base is either the column itself or a lateral array element inside a
/// wildcard subquery; the special-path restriction only applies to the
/// column root (an element with an empty remaining path is an ordinary
/// target, not the "whole column").
pub(crate) struct JsonTarget<'a> {
    pub base: String,
    pub path: &'a [PathSegment],
    root: bool,
}

impl<'a> JsonTarget<'a> {
    /// Target the column itself.
    pub(crate) fn column(base: impl Into<String>, path: &'a [PathSegment]) -> Self {
        Self {
            base: base.into(),
            path,
            root: true,
        }
    }

    /// Target a lateral array element.
    pub(crate) fn element(base: impl Into<String>, path: &'a [PathSegment]) -> Self {
        Self {
            base: base.into(),
            path,
            root: false,
        }
    }

    /// The jsonb form: `(base #> $p::text[])::jsonb`, or the base itself at
    /// the empty path.
    pub(crate) fn jsonb_expr(&self) -> SqlFragment {
        if self.path.is_empty() {
            return SqlFragment::raw(format!("{}::jsonb", self.base));
        }
        let mut frag = SqlFragment::raw(format!("({} #> ", self.base));
        frag.push_typed_param(
            SqlParam::TextArray(path::segments_to_text_array(self.path)),
            "text[]",
        );
        frag.push(")::jsonb");
        frag
    }

    /// The text form: `base #>> $p::text[]` (`#>> '{}'` at the empty path).
    pub(crate) fn text_expr(&self) -> SqlFragment {
        if self.path.is_empty() {
            return SqlFragment::raw(format!("{} #>> '{{}}'", self.base));
        }
        let mut frag = SqlFragment::raw(format!("{} #>> ", self.base));
        frag.push_typed_param(
            SqlParam::TextArray(path::segments_to_text_array(self.path)),
            "text[]",
        );
        frag
    }
}

/// Compile a predicate on a JSON field. A non-object predicate is shorthand
/// for `equals` against the whole column.
pub(crate) fn compile_json_filter(alias: &str, field: &str, predicate: &Value) -> Result<SqlFragment> {
    let column = format!("{}.{}", alias, escape_ident(field));

    let filter = match predicate {
        Value::Object(filter) => filter,
        direct => {
            let target = JsonTarget::column(column, &[]);
            return compile_operator_at(
                &target,
                JsonOperator::Equals,
                direct,
                CaseMode::Sensitive,
                &SearchOptions::default(),
            );
        }
    };

    let mode = CaseMode::from_filter(filter)?;
    let search = SearchOptions::from_filter(filter)?;
    let segments = path::path_from_value(filter.get("path").unwrap_or(&Value::Null))?;

    let mut conditions = Vec::new();
    for (key, operand) in filter {
        if METADATA_KEYS.contains(&key.as_str()) {
            continue;
        }
        let op = JsonOperator::parse(key).ok_or_else(|| Error::UnknownOperator(key.clone()))?;

        let condition = if path::has_wildcard(&segments) {
            if !op.supported_with_wildcard() {
                return Err(Error::UnknownOperator(format!(
                    "`{}` is not supported with wildcard paths",
                    op.as_str()
                )));
            }
            compile_wildcard(&column, &segments, op, operand, mode, 0)?
        } else {
            let target = JsonTarget::column(column.clone(), &segments);
            compile_operator_at(&target, op, operand, mode, &search)?
        };
        conditions.push(Expr::from_fragment(condition));
    }

    if conditions.is_empty() {
        return Err(Error::EmptyFilter(field.to_string()));
    }
    Ok(combine_and(conditions))
}

/// Emit one operator against a target. This is the single operator table;
/// both the plain-path and wildcard contexts go through it.
pub(crate) fn compile_operator_at(
    target: &JsonTarget<'_>,
    op: JsonOperator,
    operand: &Value,
    mode: CaseMode,
    search: &SearchOptions,
) -> Result<SqlFragment> {
    if target.root && target.path.is_empty() && !op.supports_special_path() {
        return Err(Error::OperatorRequiresNonEmptyPath(op.as_str().to_string()));
    }

    match op {
        JsonOperator::Equals => equals(target, operand, mode),
        JsonOperator::Not => not_equals(target, operand, mode),
        JsonOperator::Gt => numeric_compare(target, ">", op, operand),
        JsonOperator::Gte => numeric_compare(target, ">=", op, operand),
        JsonOperator::Lt => numeric_compare(target, "<", op, operand),
        JsonOperator::Lte => numeric_compare(target, "<=", op, operand),
        JsonOperator::StringContains => string_like(target, op, operand, mode, "%", "%"),
        JsonOperator::StringStartsWith => string_like(target, op, operand, mode, "", "%"),
        JsonOperator::StringEndsWith => string_like(target, op, operand, mode, "%", ""),
        JsonOperator::ArrayContains => array_contains(target, operand, mode),
        JsonOperator::ArrayStartsWith => array_edge(target, op, operand, mode, "0"),
        JsonOperator::ArrayEndsWith => array_edge(target, op, operand, mode, "-1"),
        JsonOperator::In => in_list(target, op, operand, mode, false),
        JsonOperator::NotIn => in_list(target, op, operand, mode, true),
        JsonOperator::Search => compile_search(target, operand, search),
    }
}

fn equals(target: &JsonTarget<'_>, operand: &Value, mode: CaseMode) -> Result<SqlFragment> {
    // Whole-column, object/array and null comparisons happen in jsonb
    // space; primitives compare as text (array elements included, so case
    // folding stays available under wildcards).
    if (target.root && target.path.is_empty())
        || operand.is_object()
        || operand.is_array()
        || operand.is_null()
    {
        let mut frag = target.jsonb_expr();
        frag.push(" = ");
        frag.push_typed_param(SqlParam::Json(operand.clone()), "jsonb");
        return Ok(frag);
    }

    let mut frag = SqlFragment::new();
    push_folded(&mut frag, target.text_expr(), mode);
    frag.push(" = ");
    push_folded_param(&mut frag, SqlParam::Text(value::stringify(operand)), mode);
    Ok(frag)
}

fn not_equals(target: &JsonTarget<'_>, operand: &Value, mode: CaseMode) -> Result<SqlFragment> {
    let mut frag = SqlFragment::new();
    push_folded(&mut frag, target.text_expr(), mode);
    frag.push(" <> ");
    push_folded_param(&mut frag, SqlParam::Text(value::stringify(operand)), mode);
    Ok(frag)
}

fn numeric_compare(
    target: &JsonTarget<'_>,
    sql_op: &str,
    op: JsonOperator,
    operand: &Value,
) -> Result<SqlFragment> {
    if !operand.is_number() {
        return Err(Error::invalid_value(
            op.as_str(),
            format!("expected a number, got {operand}"),
        ));
    }

    let mut frag = SqlFragment::raw("(");
    frag.append(target.jsonb_expr());
    frag.push(" ");
    frag.push(sql_op);
    frag.push(" ");
    frag.push_typed_param(SqlParam::Json(operand.clone()), "jsonb");
    frag.push(" AND jsonb_typeof(");
    frag.append(target.jsonb_expr());
    frag.push(") = 'number')");
    Ok(frag)
}

fn string_like(
    target: &JsonTarget<'_>,
    op: JsonOperator,
    operand: &Value,
    mode: CaseMode,
    prefix: &str,
    suffix: &str,
) -> Result<SqlFragment> {
    let needle = operand.as_str().ok_or_else(|| {
        Error::invalid_value(op.as_str(), format!("expected a string, got {operand}"))
    })?;

    let mut frag = SqlFragment::new();
    push_folded(&mut frag, target.text_expr(), mode);
    frag.push(" LIKE ");
    push_folded_param(
        &mut frag,
        SqlParam::Text(format!("{prefix}{needle}{suffix}")),
        mode,
    );
    Ok(frag)
}

fn array_contains(target: &JsonTarget<'_>, operand: &Value, mode: CaseMode) -> Result<SqlFragment> {
    let items = operand
        .as_array()
        .ok_or_else(|| Error::invalid_value("array_contains", "expected an array"))?;
    if items.is_empty() {
        return Err(Error::invalid_value("array_contains", "expected a non-empty array"));
    }

    if mode.is_insensitive() {
        // Case folding can only compare one string element at a time.
        if items.len() != 1 {
            return Err(Error::invalid_value(
                "array_contains",
                "insensitive mode requires exactly one element",
            ));
        }
        let needle = items[0].as_str().ok_or_else(|| {
            Error::invalid_value("array_contains", "insensitive mode requires a string element")
        })?;

        let mut frag = SqlFragment::raw("EXISTS (SELECT 1 FROM jsonb_array_elements_text(");
        frag.append(target.jsonb_expr());
        frag.push(") AS e(value) WHERE LOWER(e.value) = LOWER(");
        frag.push_param(needle);
        frag.push("))");
        return Ok(frag);
    }

    let mut frag = SqlFragment::raw("(");
    frag.append(target.jsonb_expr());
    frag.push(" @> ");
    frag.push_typed_param(SqlParam::Json(operand.clone()), "jsonb");
    frag.push(" AND jsonb_typeof(");
    frag.append(target.jsonb_expr());
    frag.push(") = 'array')");
    Ok(frag)
}

fn array_edge(
    target: &JsonTarget<'_>,
    op: JsonOperator,
    operand: &Value,
    mode: CaseMode,
    index: &str,
) -> Result<SqlFragment> {
    if mode.is_insensitive() {
        let needle = operand.as_str().ok_or_else(|| {
            Error::invalid_value(op.as_str(), "insensitive mode requires a string value")
        })?;

        let mut frag = SqlFragment::raw("(LOWER(");
        frag.append(target.jsonb_expr());
        frag.push(&format!(" ->> {index}"));
        frag.push(") = LOWER(");
        frag.push_param(needle);
        frag.push(") AND jsonb_typeof(");
        frag.append(target.jsonb_expr());
        frag.push(") = 'array')");
        return Ok(frag);
    }

    let mut frag = SqlFragment::raw("(");
    frag.append(target.jsonb_expr());
    frag.push(&format!(" -> {index} = "));
    frag.push_typed_param(SqlParam::Json(operand.clone()), "jsonb");
    frag.push(" AND jsonb_typeof(");
    frag.append(target.jsonb_expr());
    frag.push(") = 'array')");
    Ok(frag)
}

fn in_list(
    target: &JsonTarget<'_>,
    op: JsonOperator,
    operand: &Value,
    mode: CaseMode,
    negated: bool,
) -> Result<SqlFragment> {
    let items = operand.as_array().ok_or_else(|| {
        Error::invalid_value(op.as_str(), format!("expected an array, got {operand}"))
    })?;

    if items.is_empty() {
        return Ok(SqlFragment::raw(if negated { "TRUE" } else { "FALSE" }));
    }

    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        let mut frag = SqlFragment::new();
        push_folded(&mut frag, target.text_expr(), mode);
        frag.push(if negated { " <> " } else { " = " });
        push_folded_param(&mut frag, SqlParam::Text(value::stringify(item)), mode);
        parts.push(frag);
    }

    if parts.len() == 1 {
        return Ok(parts.swap_remove(0));
    }
    let sep = if negated { " AND " } else { " OR " };
    Ok(SqlFragment::join(sep, parts).parens())
}

fn push_folded(frag: &mut SqlFragment, expr: SqlFragment, mode: CaseMode) {
    if mode.is_insensitive() {
        frag.push("LOWER(");
        frag.append(expr);
        frag.push(")");
    } else {
        frag.append(expr);
    }
}

fn push_folded_param(frag: &mut SqlFragment, param: SqlParam, mode: CaseMode) {
    if mode.is_insensitive() {
        frag.push("LOWER(");
        frag.push_param(param);
        frag.push(")");
    } else {
        frag.push_param(param);
    }
}

fn combine_and(mut conditions: Vec<Expr>) -> SqlFragment {
    if conditions.len() == 1 {
        conditions.swap_remove(0).into_fragment()
    } else {
        Expr::and_all(conditions).into_fragment()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compile(predicate: Value) -> Result<SqlFragment> {
        compile_json_filter("t", "data", &predicate)
    }

    #[test]
    fn direct_value_compares_whole_column() {
        // an object predicate is a filter, not a literal; `version` is not
        // an operator
        let err = compile(json!({"version": 2})).unwrap_err();
        assert_eq!(err, Error::UnknownOperator("version".into()));

        let frag = compile(json!(42)).unwrap();
        assert_eq!(frag.sql(), "t.\"data\"::jsonb = $1::jsonb");
        assert_eq!(frag.params(), &[SqlParam::Json(json!(42))]);
    }

    #[test]
    fn equals_primitive_at_path_is_text_equality() {
        let frag = compile(json!({"path": "user.name", "equals": "Ada"})).unwrap();
        assert_eq!(frag.sql(), "t.\"data\" #>> $1::text[] = $2");
        assert_eq!(
            frag.params()[0],
            SqlParam::TextArray(vec!["user".into(), "name".into()])
        );
        assert_eq!(frag.params()[1], SqlParam::Text("Ada".into()));
    }

    #[test]
    fn equals_object_at_path_is_jsonb_equality() {
        let frag = compile(json!({"path": "meta", "equals": {"a": 1}})).unwrap();
        assert_eq!(frag.sql(), "(t.\"data\" #> $1::text[])::jsonb = $2::jsonb");
    }

    #[test]
    fn equals_insensitive_lowers_text() {
        let frag = compile(json!({
            "path": "user.name",
            "equals": "ada",
            "mode": "insensitive"
        }))
        .unwrap();
        assert_eq!(frag.sql(), "LOWER(t.\"data\" #>> $1::text[]) = LOWER($2)");
    }

    #[test]
    fn numeric_compare_guards_typeof() {
        let frag = compile(json!({"path": "stats.count", "gt": 10})).unwrap();
        assert_eq!(
            frag.sql(),
            "((t.\"data\" #> $1::text[])::jsonb > $2::jsonb AND \
             jsonb_typeof((t.\"data\" #> $3::text[])::jsonb) = 'number')"
        );
        assert_eq!(frag.param_count(), 3);
    }

    #[test]
    fn numeric_compare_rejects_non_numbers() {
        let err = compile(json!({"path": "a", "gt": "ten"})).unwrap_err();
        assert!(matches!(err, Error::InvalidValueForOperator { .. }));
    }

    #[test]
    fn string_contains_builds_like() {
        let frag = compile(json!({"path": "bio", "string_contains": "rust"})).unwrap();
        assert_eq!(frag.sql(), "t.\"data\" #>> $1::text[] LIKE $2");
        assert_eq!(frag.params()[1], SqlParam::Text("%rust%".into()));
    }

    #[test]
    fn array_contains_emits_containment_with_guard() {
        let frag = compile(json!({"path": "tags", "array_contains": ["admin", "user"]})).unwrap();
        assert_eq!(
            frag.sql(),
            "((t.\"data\" #> $1::text[])::jsonb @> $2::jsonb AND \
             jsonb_typeof((t.\"data\" #> $3::text[])::jsonb) = 'array')"
        );
        assert_eq!(frag.params()[1], SqlParam::Json(json!(["admin", "user"])));
    }

    #[test]
    fn array_contains_requires_non_empty_array() {
        assert!(matches!(
            compile(json!({"path": "tags", "array_contains": "admin"})).unwrap_err(),
            Error::InvalidValueForOperator { .. }
        ));
        assert!(matches!(
            compile(json!({"path": "tags", "array_contains": []})).unwrap_err(),
            Error::InvalidValueForOperator { .. }
        ));
    }

    #[test]
    fn array_contains_insensitive_scans_elements() {
        let frag = compile(json!({
            "path": "tags",
            "array_contains": ["Admin"],
            "mode": "insensitive"
        }))
        .unwrap();
        assert_eq!(
            frag.sql(),
            "EXISTS (SELECT 1 FROM jsonb_array_elements_text((t.\"data\" #> $1::text[])::jsonb) \
             AS e(value) WHERE LOWER(e.value) = LOWER($2))"
        );
    }

    #[test]
    fn array_contains_insensitive_rejects_multiple_elements() {
        let err = compile(json!({
            "path": "tags",
            "array_contains": ["a", "b"],
            "mode": "insensitive"
        }))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidValueForOperator { .. }));
    }

    #[test]
    fn array_edges_subscript_first_and_last() {
        let frag = compile(json!({"path": "tags", "array_starts_with": "a"})).unwrap();
        assert!(frag.sql().contains(" -> 0 = $2::jsonb"));

        let frag = compile(json!({"path": "tags", "array_ends_with": "z"})).unwrap();
        assert!(frag.sql().contains(" -> -1 = $2::jsonb"));
    }

    #[test]
    fn in_list_or_joins_text_equalities() {
        let frag = compile(json!({"path": "state", "in": ["new", "open"]})).unwrap();
        assert_eq!(
            frag.sql(),
            "(t.\"data\" #>> $1::text[] = $2 OR t.\"data\" #>> $3::text[] = $4)"
        );
    }

    #[test]
    fn not_in_and_joins_inequalities() {
        let frag = compile(json!({"path": "state", "notIn": ["done"]})).unwrap();
        assert_eq!(frag.sql(), "t.\"data\" #>> $1::text[] <> $2");
    }

    #[test]
    fn empty_in_is_false() {
        let frag = compile(json!({"path": "state", "in": []})).unwrap();
        assert_eq!(frag.sql(), "FALSE");
        let frag = compile(json!({"path": "state", "notIn": []})).unwrap();
        assert_eq!(frag.sql(), "TRUE");
    }

    #[test]
    fn special_path_rejects_most_operators() {
        let err = compile(json!({"string_contains": "x"})).unwrap_err();
        assert_eq!(
            err,
            Error::OperatorRequiresNonEmptyPath("string_contains".into())
        );

        // equals supports the special path
        let frag = compile(json!({"equals": {"a": 1}})).unwrap();
        assert_eq!(frag.sql(), "t.\"data\"::jsonb = $1::jsonb");
    }

    #[test]
    fn unknown_operator_keys_are_rejected() {
        let err = compile(json!({"path": "a", "string_matches": "x"})).unwrap_err();
        assert_eq!(err, Error::UnknownOperator("string_matches".into()));
    }

    #[test]
    fn filter_with_only_metadata_is_empty() {
        let err = compile(json!({"path": "a.b"})).unwrap_err();
        assert_eq!(err, Error::EmptyFilter("data".into()));
    }

    #[test]
    fn multiple_operators_and_join() {
        let frag = compile(json!({"path": "n", "gt": 1, "lt": 5})).unwrap();
        assert!(frag.sql().contains(" AND "));
        assert_eq!(frag.param_count(), 6);
    }

    #[test]
    fn wildcard_path_rejects_in_and_search() {
        let err = compile(json!({"path": "tags[*]", "in": ["a"]})).unwrap_err();
        assert!(matches!(err, Error::UnknownOperator(_)));

        let err = compile(json!({"path": "tags[*]", "search": "a"})).unwrap_err();
        assert!(matches!(err, Error::UnknownOperator(_)));
    }
}
