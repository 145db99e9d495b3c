//! Filters over regular (non-JSONB) columns.

use crate::error::{Error, Result};
use crate::field::FieldType;
use crate::value;
use jsonbq_sql::{escape_ident, Expr, SqlFragment, SqlParam};
use serde_json::Value;

/// Case folding requested by `mode: 'insensitive'`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CaseMode {
    Sensitive,
    Insensitive,
}

impl CaseMode {
    pub(crate) fn from_filter(filter: &serde_json::Map<String, Value>) -> Result<Self> {
        match filter.get("mode") {
            None => Ok(Self::Sensitive),
            Some(Value::String(s)) if s == "insensitive" => Ok(Self::Insensitive),
            Some(Value::String(s)) if s == "default" => Ok(Self::Sensitive),
            Some(other) => Err(Error::invalid_value(
                "mode",
                format!("expected 'default' or 'insensitive', got {other}"),
            )),
        }
    }

    pub(crate) fn is_insensitive(self) -> bool {
        matches!(self, Self::Insensitive)
    }
}

/// Compile a predicate on a non-JSON field: either a direct value or a
/// filter object whose keys AND-join.
pub(crate) fn compile_scalar_filter(
    alias: &str,
    field: &str,
    field_type: FieldType,
    predicate: &Value,
) -> Result<SqlFragment> {
    let column = format!("{}.{}", alias, escape_ident(field));

    match predicate {
        Value::Object(filter) => compile_filter_object(&column, field, field_type, filter),
        direct => Ok(equals(&column, field_type, direct, CaseMode::Sensitive)?.into_fragment()),
    }
}

fn compile_filter_object(
    column: &str,
    field: &str,
    field_type: FieldType,
    filter: &serde_json::Map<String, Value>,
) -> Result<SqlFragment> {
    let mode = CaseMode::from_filter(filter)?;
    if mode.is_insensitive() && field_type != FieldType::String {
        return Err(Error::invalid_value(
            "mode",
            format!("insensitive mode is not valid for {} fields", field_type.as_str()),
        ));
    }

    let mut conditions = Vec::new();
    for (key, operand) in filter {
        if key == "mode" {
            continue;
        }
        conditions.push(compile_operator(column, field, field_type, key, operand, mode)?);
    }

    if conditions.is_empty() {
        return Err(Error::EmptyFilter(field.to_string()));
    }
    Ok(combine_and(conditions).into_fragment())
}

fn compile_operator(
    column: &str,
    field: &str,
    field_type: FieldType,
    op: &str,
    operand: &Value,
    mode: CaseMode,
) -> Result<Expr> {
    match (field_type, op) {
        (_, "equals") => equals(column, field_type, operand, mode),
        (_, "not") => not(column, field, field_type, operand, mode),

        (FieldType::Boolean, _) => Err(Error::UnknownOperator(op.to_string())),

        (_, "gt") => compare(column, field_type, ">", op, operand),
        (_, "gte") => compare(column, field_type, ">=", op, operand),
        (_, "lt") => compare(column, field_type, "<", op, operand),
        (_, "lte") => compare(column, field_type, "<=", op, operand),
        (_, "in") => in_list(column, field_type, op, operand, mode, false),
        (_, "notIn") => in_list(column, field_type, op, operand, mode, true),

        (FieldType::String, "contains") => like(column, op, operand, mode, "%", "%"),
        (FieldType::String, "startsWith") => like(column, op, operand, mode, "", "%"),
        (FieldType::String, "endsWith") => like(column, op, operand, mode, "%", ""),
        (FieldType::String, "search") => search(column, op, operand),

        _ => Err(Error::UnknownOperator(op.to_string())),
    }
}

fn equals(column: &str, field_type: FieldType, operand: &Value, mode: CaseMode) -> Result<Expr> {
    if operand.is_null() {
        return Ok(Expr::from_fragment(SqlFragment::raw(format!(
            "{column} IS NULL"
        ))));
    }

    let mut frag = SqlFragment::new();
    push_folded(&mut frag, column, mode);
    frag.push(" = ");
    push_folded_param(&mut frag, scalar_param(field_type, "equals", operand)?, mode);
    Ok(Expr::from_fragment(frag))
}

fn not(
    column: &str,
    field: &str,
    field_type: FieldType,
    operand: &Value,
    mode: CaseMode,
) -> Result<Expr> {
    match operand {
        Value::Null => Ok(Expr::from_fragment(SqlFragment::raw(format!(
            "{column} IS NOT NULL"
        )))),
        Value::Object(nested) => {
            let inner = compile_filter_object(column, field, field_type, nested)?;
            Ok(Expr::from_fragment(inner).not())
        }
        primitive => {
            let mut frag = SqlFragment::new();
            push_folded(&mut frag, column, mode);
            frag.push(" <> ");
            push_folded_param(&mut frag, scalar_param(field_type, "not", primitive)?, mode);
            Ok(Expr::from_fragment(frag))
        }
    }
}

fn compare(
    column: &str,
    field_type: FieldType,
    sql_op: &str,
    op: &str,
    operand: &Value,
) -> Result<Expr> {
    let mut frag = SqlFragment::raw(format!("{column} {sql_op} "));
    frag.push_param(scalar_param(field_type, op, operand)?);
    Ok(Expr::from_fragment(frag))
}

fn in_list(
    column: &str,
    field_type: FieldType,
    op: &str,
    operand: &Value,
    mode: CaseMode,
    negated: bool,
) -> Result<Expr> {
    let items = operand
        .as_array()
        .ok_or_else(|| Error::invalid_value(op, "expected an array"))?;

    if items.is_empty() {
        return Ok(if negated { Expr::always() } else { Expr::never() });
    }

    let mut frag = SqlFragment::new();
    push_folded(&mut frag, column, mode);
    frag.push(if negated { " NOT IN (" } else { " IN (" });
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            frag.push(", ");
        }
        push_folded_param(&mut frag, scalar_param(field_type, op, item)?, mode);
    }
    frag.push(")");
    Ok(Expr::from_fragment(frag))
}

fn like(
    column: &str,
    op: &str,
    operand: &Value,
    mode: CaseMode,
    prefix: &str,
    suffix: &str,
) -> Result<Expr> {
    let needle = operand
        .as_str()
        .ok_or_else(|| Error::invalid_value(op, "expected a string"))?;

    let mut frag = SqlFragment::new();
    push_folded(&mut frag, column, mode);
    frag.push(" LIKE ");
    push_folded_param(
        &mut frag,
        SqlParam::Text(format!("{prefix}{needle}{suffix}")),
        mode,
    );
    Ok(Expr::from_fragment(frag))
}

fn search(column: &str, op: &str, operand: &Value) -> Result<Expr> {
    let query = operand
        .as_str()
        .ok_or_else(|| Error::InvalidSearchValue(format!("{op} expects a string")))?;
    if query.is_empty() {
        return Err(Error::InvalidSearchValue("empty search query".into()));
    }

    let mut frag = SqlFragment::raw(format!(
        "to_tsvector('simple', {column}) @@ plainto_tsquery('simple', "
    ));
    frag.push_param(query);
    frag.push(")");
    Ok(Expr::from_fragment(frag))
}

/// Bind a filter operand with the type the field catalog declares.
fn scalar_param(field_type: FieldType, op: &str, operand: &Value) -> Result<SqlParam> {
    match field_type {
        FieldType::Date => Ok(SqlParam::Timestamp(value::parse_date(op, operand)?)),
        FieldType::Number => match operand {
            Value::Number(n) => Ok(value::number_param(n)),
            other => Err(Error::invalid_value(op, format!("expected a number, got {other}"))),
        },
        FieldType::Boolean => match operand {
            Value::Bool(b) => Ok(SqlParam::Bool(*b)),
            other => Err(Error::invalid_value(op, format!("expected a boolean, got {other}"))),
        },
        // String fields accept any primitive; non-strings compare by their
        // text rendering (unknown fields land here).
        FieldType::String => match operand {
            Value::Array(_) | Value::Object(_) => {
                Err(Error::invalid_value(op, "expected a primitive"))
            }
            other => Ok(SqlParam::Text(value::stringify(other))),
        },
        FieldType::Json => Err(Error::invalid_value(op, "json fields use the json filter")),
    }
}

fn push_folded(frag: &mut SqlFragment, column: &str, mode: CaseMode) {
    if mode.is_insensitive() {
        frag.push("LOWER(");
        frag.push(column);
        frag.push(")");
    } else {
        frag.push(column);
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

fn combine_and(mut conditions: Vec<Expr>) -> Expr {
    if conditions.len() == 1 {
        conditions.swap_remove(0)
    } else {
        Expr::and_all(conditions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn compile(field_type: FieldType, predicate: Value) -> SqlFragment {
        compile_scalar_filter("t", "f", field_type, &predicate).unwrap()
    }

    #[test]
    fn direct_value_is_equality() {
        let frag = compile(FieldType::Boolean, json!(true));
        assert_eq!(frag.sql(), "t.\"f\" = $1");
        assert_eq!(frag.params(), &[SqlParam::Bool(true)]);
    }

    #[test]
    fn null_equality_uses_is_null() {
        assert_eq!(compile(FieldType::String, json!(null)).sql(), "t.\"f\" IS NULL");
        assert_eq!(
            compile(FieldType::String, json!({"not": null})).sql(),
            "t.\"f\" IS NOT NULL"
        );
    }

    #[test]
    fn multiple_operators_and_join() {
        let frag = compile(FieldType::Number, json!({"gt": 1, "lt": 10}));
        assert_eq!(frag.sql(), "(t.\"f\" > $1) AND (t.\"f\" < $2)");
        assert_eq!(frag.params(), &[SqlParam::Int(1), SqlParam::Int(10)]);
    }

    #[test]
    fn contains_wraps_pattern() {
        let frag = compile(FieldType::String, json!({"contains": "User 1"}));
        assert_eq!(frag.sql(), "t.\"f\" LIKE $1");
        assert_eq!(frag.params(), &[SqlParam::Text("%User 1%".into())]);
    }

    #[test]
    fn insensitive_mode_lowers_both_sides() {
        let frag = compile(
            FieldType::String,
            json!({"startsWith": "Ada", "mode": "insensitive"}),
        );
        assert_eq!(frag.sql(), "LOWER(t.\"f\") LIKE LOWER($1)");
        assert_eq!(frag.params(), &[SqlParam::Text("Ada%".into())]);
    }

    #[test]
    fn empty_in_is_false_and_empty_not_in_is_true() {
        assert_eq!(compile(FieldType::String, json!({"in": []})).sql(), "FALSE");
        assert_eq!(compile(FieldType::String, json!({"notIn": []})).sql(), "TRUE");
    }

    #[test]
    fn in_list_binds_each_item() {
        let frag = compile(FieldType::Number, json!({"in": [1, 2, 3]}));
        assert_eq!(frag.sql(), "t.\"f\" IN ($1, $2, $3)");
        assert_eq!(frag.param_count(), 3);
    }

    #[test]
    fn nested_not_negates_the_whole_filter() {
        let frag = compile(FieldType::String, json!({"not": {"contains": "spam"}}));
        assert_eq!(frag.sql(), "NOT (t.\"f\" LIKE $1)");
    }

    #[test]
    fn date_operands_parse_to_timestamps() {
        let frag = compile(
            FieldType::Date,
            json!({"gt": "2025-01-02", "lt": "2025-01-04"}),
        );
        assert_eq!(frag.sql(), "(t.\"f\" > $1) AND (t.\"f\" < $2)");
        assert!(matches!(frag.params()[0], SqlParam::Timestamp(_)));
    }

    #[test]
    fn search_uses_simple_dictionary() {
        let frag = compile(FieldType::String, json!({"search": "rust compiler"}));
        assert_eq!(
            frag.sql(),
            "to_tsvector('simple', t.\"f\") @@ plainto_tsquery('simple', $1)"
        );
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err = compile_scalar_filter("t", "f", FieldType::String, &json!({"fuzzy": "x"}))
            .unwrap_err();
        assert_eq!(err, Error::UnknownOperator("fuzzy".into()));
    }

    #[test]
    fn boolean_fields_reject_range_operators() {
        let err = compile_scalar_filter("t", "f", FieldType::Boolean, &json!({"gt": true}))
            .unwrap_err();
        assert_eq!(err, Error::UnknownOperator("gt".into()));
    }

    #[test]
    fn empty_filter_object_is_rejected() {
        let err = compile_scalar_filter("t", "f", FieldType::String, &json!({})).unwrap_err();
        assert_eq!(err, Error::EmptyFilter("f".into()));

        let err = compile_scalar_filter(
            "t",
            "f",
            FieldType::String,
            &json!({"mode": "insensitive"}),
        )
        .unwrap_err();
        assert_eq!(err, Error::EmptyFilter("f".into()));
    }

    #[test]
    fn type_mismatches_are_rejected() {
        let err = compile_scalar_filter("t", "f", FieldType::Number, &json!({"equals": "nine"}))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValueForOperator { .. }));
    }
}
