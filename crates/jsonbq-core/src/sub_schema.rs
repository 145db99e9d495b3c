//! Sub-schema extraction queries.
//!
//! Builds a UNION ALL CTE of synthetic rows `(tableId, rowId, rowVersionId,
//! fieldPath, data)` extracted from configured `(table, path)` pairs, where
//! a path may expand arrays via `[*]`, then applies a restricted
//! where/orderBy language over the CTE.

use crate::error::{Error, Result};
use crate::field::FieldType;
use crate::filter::{json, scalar};
use crate::path::{self, PathSegment};
use jsonbq_sql::{
    escape_ident, is_valid_identifier, Expr, OrderDirection, OrderExpr, SelectBuilder,
    SqlFragment, SqlParam,
};
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_CTE_NAME: &str = "sub_schema_items";
const DEFAULT_CTE_ALIAS: &str = "s";
const DEFAULT_ROW_ALIAS: &str = "r";

/// One source table and the JSON paths to extract from its rows.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubSchemaTable {
    pub table_id: String,
    pub table_version_id: String,
    pub paths: Vec<String>,
}

/// Parameters for [`build_sub_schema_query`] and
/// [`build_sub_schema_count_query`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubSchemaQueryParams {
    pub tables: Vec<SubSchemaTable>,
    pub cte_name: Option<String>,
    pub cte_alias: Option<String>,
    pub row_alias: Option<String>,
    #[serde(rename = "where")]
    pub where_filter: Option<Value>,
    pub order_by: Option<Value>,
    pub take: Option<i64>,
    pub skip: Option<i64>,
}

/// One `[*]`-free stretch of a sub-schema path: the literal text (kept for
/// fieldPath concatenation, leading dot included) and its parsed segments.
#[derive(Clone, Debug, PartialEq)]
struct PathPiece {
    raw: String,
    segments: Vec<PathSegment>,
}

/// A sub-schema path split on `[*]`. `pieces.len() - 1` is the number of
/// array expansions; a single piece means a plain object path.
#[derive(Clone, Debug, PartialEq)]
struct SubSchemaPath {
    raw: String,
    pieces: Vec<PathPiece>,
}

impl SubSchemaPath {
    fn is_array_path(&self) -> bool {
        self.pieces.len() > 1
    }

    fn expansions(&self) -> usize {
        self.pieces.len() - 1
    }
}

fn parse_sub_schema_path(raw: &str) -> Result<SubSchemaPath> {
    if raw.trim().is_empty() {
        return Err(Error::EmptyPath);
    }

    let mut pieces = Vec::new();
    for piece in raw.split("[*]") {
        let segments = if piece.is_empty() {
            Vec::new()
        } else {
            path::parse_json_path(piece)?
        };
        pieces.push(PathPiece {
            raw: piece.to_string(),
            segments,
        });
    }

    Ok(SubSchemaPath {
        raw: raw.to_string(),
        pieces,
    })
}

// ============================================================================
// CTE body
// ============================================================================

/// Build the UNION ALL body of the sub-schema CTE.
pub fn build_sub_schema_cte(tables: &[SubSchemaTable]) -> Result<SqlFragment> {
    let mut arms = Vec::new();
    for table in tables {
        for raw_path in &table.paths {
            let parsed = parse_sub_schema_path(raw_path)?;
            arms.push(if parsed.is_array_path() {
                build_array_arm(table, &parsed)
            } else {
                build_object_arm(table, &parsed)
            });
        }
    }

    if arms.is_empty() {
        return Ok(empty_items_select());
    }
    Ok(SqlFragment::join(" UNION ALL ", arms))
}

fn empty_items_select() -> SqlFragment {
    SqlFragment::raw(
        "SELECT NULL::text AS \"tableId\", NULL::text AS \"rowId\", \
         NULL::text AS \"rowVersionId\", NULL::text AS \"fieldPath\", \
         NULL::jsonb AS \"data\" WHERE false",
    )
}

/// `r."data"` navigated by `segments` as jsonb, for lateral expansion and
/// typeof guards.
fn json_at(base: &str, segments: &[PathSegment]) -> SqlFragment {
    if segments.is_empty() {
        return SqlFragment::raw(base);
    }
    let mut frag = SqlFragment::raw(format!("({base} #> "));
    frag.push_typed_param(
        SqlParam::TextArray(path::segments_to_text_array(segments)),
        "text[]",
    );
    frag.push(")::jsonb");
    frag
}

fn push_row_prelude(frag: &mut SqlFragment, table: &SubSchemaTable) {
    frag.push("SELECT ");
    frag.push_typed_param(table.table_id.clone(), "text");
    frag.push(" AS \"tableId\", r.\"id\" AS \"rowId\", r.\"versionId\" AS \"rowVersionId\", ");
}

fn push_row_source(frag: &mut SqlFragment) {
    frag.push(" FROM \"Row\" r JOIN \"_RowToTable\" rt ON r.\"versionId\" = rt.\"A\"");
}

fn build_object_arm(table: &SubSchemaTable, parsed: &SubSchemaPath) -> SqlFragment {
    let piece = &parsed.pieces[0];

    let mut frag = SqlFragment::new();
    push_row_prelude(&mut frag, table);
    frag.push_typed_param(parsed.raw.clone(), "text");
    frag.push(" AS \"fieldPath\", ");
    frag.append(json_at("r.\"data\"", &piece.segments));
    frag.push(" AS \"data\"");
    push_row_source(&mut frag);
    frag.push(" WHERE rt.\"B\" = ");
    frag.push_param(table.table_version_id.clone());
    frag.push(" AND jsonb_typeof(");
    frag.append(json_at("r.\"data\"", &piece.segments));
    frag.push(") = 'object'");
    frag
}

fn build_array_arm(table: &SubSchemaTable, parsed: &SubSchemaPath) -> SqlFragment {
    let expansions = parsed.expansions();
    let trailing = &parsed.pieces[expansions];

    let mut frag = SqlFragment::new();
    push_row_prelude(&mut frag, table);

    // fieldPath: piece || '[' || (idx - 1) || ']' per expansion, then the
    // trailing piece with its leading dot.
    let mut field_path = SqlFragment::new();
    for (i, piece) in parsed.pieces[..expansions].iter().enumerate() {
        if !piece.raw.is_empty() {
            if !field_path.is_empty() {
                field_path.push(" || ");
            }
            field_path.push_typed_param(piece.raw.clone(), "text");
        }
        if !field_path.is_empty() {
            field_path.push(" || ");
        }
        field_path.push(&format!("'[' || (arr{i}.idx - 1) || ']'"));
    }
    if !trailing.raw.is_empty() {
        field_path.push(" || ");
        field_path.push_typed_param(trailing.raw.clone(), "text");
    }
    frag.append(field_path);
    frag.push(" AS \"fieldPath\", ");

    let last_elem = format!("arr{}.elem", expansions - 1);
    if trailing.segments.is_empty() {
        frag.push(&last_elem);
    } else {
        frag.push(&format!("{last_elem} #> "));
        frag.push_typed_param(
            SqlParam::TextArray(path::segments_to_text_array(&trailing.segments)),
            "text[]",
        );
    }
    frag.push(" AS \"data\"");

    push_row_source(&mut frag);
    for i in 0..expansions {
        frag.push(" CROSS JOIN LATERAL jsonb_array_elements(");
        frag.append(json_at(&expansion_base(i), &parsed.pieces[i].segments));
        frag.push(&format!(") WITH ORDINALITY AS arr{i}(elem, idx)"));
    }

    frag.push(" WHERE rt.\"B\" = ");
    frag.push_param(table.table_version_id.clone());
    for i in 0..expansions {
        frag.push(" AND jsonb_typeof(");
        frag.append(json_at(&expansion_base(i), &parsed.pieces[i].segments));
        frag.push(") = 'array'");
    }
    frag
}

fn expansion_base(i: usize) -> String {
    if i == 0 {
        "r.\"data\"".to_string()
    } else {
        format!("arr{}.elem", i - 1)
    }
}

// ============================================================================
// Restricted where language
// ============================================================================

/// Compile the restricted where tree over the CTE columns: string filters
/// on `tableId`/`rowId`/`fieldPath`, the full JSON filter on `data`, and
/// the `AND`/`OR`/`NOT` combinators. Other keys are rejected.
pub fn build_sub_schema_where(tree: &Value, cte_alias: &str) -> Result<SqlFragment> {
    validate_identifier(cte_alias)?;
    if tree.is_null() {
        return Ok(SqlFragment::raw("TRUE"));
    }
    Ok(compile_node(tree, cte_alias)?.into_fragment())
}

fn compile_node(node: &Value, alias: &str) -> Result<Expr> {
    let map = node.as_object().ok_or_else(|| {
        Error::invalid_value("where", format!("expected an object, got {node}"))
    })?;

    let mut conditions = Vec::new();
    for (key, operand) in map {
        match key.as_str() {
            "AND" => {
                let children = compile_children(operand, alias)?;
                if !children.is_empty() {
                    conditions.push(combine_and(children));
                }
            }
            "OR" => {
                let children = compile_children(operand, alias)?;
                if !children.is_empty() {
                    conditions.push(Expr::or_all(children));
                }
            }
            "NOT" => {
                let children = compile_children(operand, alias)?;
                if !children.is_empty() {
                    conditions.push(combine_and(children).not());
                }
            }
            "tableId" | "rowId" | "fieldPath" => {
                conditions.push(Expr::from_fragment(scalar::compile_scalar_filter(
                    alias,
                    key,
                    FieldType::String,
                    operand,
                )?));
            }
            "data" => {
                conditions.push(Expr::from_fragment(json::compile_json_filter(
                    alias, "data", operand,
                )?));
            }
            other => {
                return Err(Error::UnknownOperator(format!(
                    "unsupported sub-schema filter field: {other}"
                )));
            }
        }
    }

    if conditions.is_empty() {
        return Ok(Expr::always());
    }
    Ok(combine_and(conditions))
}

fn compile_children(operand: &Value, alias: &str) -> Result<Vec<Expr>> {
    match operand {
        Value::Array(nodes) => nodes.iter().map(|n| compile_node(n, alias)).collect(),
        Value::Object(_) => Ok(vec![compile_node(operand, alias)?]),
        other => Err(Error::invalid_value(
            "where",
            format!("combinator expects an object or a list, got {other}"),
        )),
    }
}

fn combine_and(mut conditions: Vec<Expr>) -> Expr {
    if conditions.len() == 1 {
        conditions.swap_remove(0)
    } else {
        Expr::and_all(conditions)
    }
}

// ============================================================================
// Order by
// ============================================================================

/// Compiled sub-schema ORDER BY: the fragment plus whether ordering needs
/// the join back to `"Row"` (for `rowCreatedAt`).
pub struct SubSchemaOrderBy {
    pub fragment: Option<SqlFragment>,
    pub joins_row: bool,
}

/// Compile orderBy over the CTE columns: `tableId`/`rowId`/`fieldPath`
/// (asc|desc), `rowCreatedAt` via the row join, or
/// `data: {path, order, nulls}`.
pub fn build_sub_schema_order_by(
    order_by: &Value,
    cte_alias: &str,
    row_alias: &str,
) -> Result<SubSchemaOrderBy> {
    validate_identifier(cte_alias)?;
    validate_identifier(row_alias)?;

    let items: Vec<&Value> = match order_by {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    let mut parts = Vec::new();
    let mut joins_row = false;

    for item in items {
        let Some(map) = item.as_object() else {
            continue;
        };
        for (key, spec) in map {
            match key.as_str() {
                "tableId" | "rowId" | "fieldPath" => {
                    let Some(direction) = spec.as_str().and_then(OrderDirection::parse) else {
                        continue;
                    };
                    parts.push(OrderExpr::column(cte_alias, key, direction).into_fragment());
                }
                "rowCreatedAt" => {
                    let Some(direction) = spec.as_str().and_then(OrderDirection::parse) else {
                        continue;
                    };
                    joins_row = true;
                    parts.push(
                        OrderExpr::column(row_alias, "createdAt", direction).into_fragment(),
                    );
                }
                "data" => {
                    if let Some(part) = data_order_part(spec, cte_alias)? {
                        parts.push(part);
                    }
                }
                _ => continue,
            }
        }
    }

    let fragment = if parts.is_empty() {
        None
    } else {
        Some(SqlFragment::join(", ", parts))
    };
    Ok(SubSchemaOrderBy {
        fragment,
        joins_row,
    })
}

fn data_order_part(spec: &Value, cte_alias: &str) -> Result<Option<SqlFragment>> {
    let Some(map) = spec.as_object() else {
        return Ok(None);
    };
    let Some(direction) = map
        .get("order")
        .and_then(Value::as_str)
        .and_then(OrderDirection::parse)
    else {
        return Ok(None);
    };

    let segments = path::path_from_value(map.get("path").unwrap_or(&Value::Null))?;

    let mut expression = SqlFragment::raw(format!("{}.{}", cte_alias, escape_ident("data")));
    if segments.is_empty() {
        expression.push(" #>> '{}'");
    } else {
        expression.push(" #>> ");
        expression.push_typed_param(
            SqlParam::TextArray(path::segments_to_text_array(&segments)),
            "text[]",
        );
    }

    let mut order = OrderExpr::from_fragment(expression, direction);
    match map.get("nulls").and_then(Value::as_str) {
        Some(n) if n.eq_ignore_ascii_case("first") => order = order.nulls_first(),
        Some(n) if n.eq_ignore_ascii_case("last") => order = order.nulls_last(),
        _ => {}
    }
    Ok(Some(order.into_fragment()))
}

// ============================================================================
// Full queries
// ============================================================================

/// Build the sub-schema list query: the CTE plus the filtered, ordered,
/// paginated selection of its rows.
pub fn build_sub_schema_query(params: &SubSchemaQueryParams) -> Result<(String, Vec<SqlParam>)> {
    let (cte_name, cte_alias, row_alias) = resolve_identifiers(params)?;

    if params.tables.is_empty() {
        let (sql, params) = empty_items_select().build();
        return Ok((sql, params));
    }

    let order = build_sub_schema_order_by(
        params.order_by.as_ref().unwrap_or(&Value::Null),
        &cte_alias,
        &row_alias,
    )?;

    let mut builder = SelectBuilder::new()
        .with_cte(&cte_name, build_sub_schema_cte(&params.tables)?)
        .column(&cte_alias, "tableId")
        .column(&cte_alias, "rowId")
        .column(&cte_alias, "rowVersionId")
        .column(&cte_alias, "fieldPath")
        .column(&cte_alias, "data")
        .from_raw(SqlFragment::raw(format!(
            "{} {}",
            escape_ident(&cte_name),
            cte_alias
        )));

    if order.joins_row {
        builder = builder.join_raw(SqlFragment::raw(format!(
            "\"Row\" {row_alias} ON {row_alias}.\"versionId\" = {cte_alias}.\"rowVersionId\""
        )));
    }

    if let Some(where_filter) = &params.where_filter {
        builder = builder.where_raw(build_sub_schema_where(where_filter, &cte_alias)?);
    }

    if let Some(fragment) = order.fragment {
        builder = builder.order_by_raw(fragment);
    }

    if let Some(take) = params.take {
        builder = builder.limit(take);
    }
    if let Some(skip) = params.skip {
        builder = builder.offset(skip);
    }

    let (sql, values) = builder.build().build();
    tracing::debug!(sql_len = sql.len(), params = values.len(), "built sub-schema query");
    Ok((sql, values))
}

/// Build the count variant: the same CTE wrapped in `COUNT(*)::bigint`.
pub fn build_sub_schema_count_query(
    params: &SubSchemaQueryParams,
) -> Result<(String, Vec<SqlParam>)> {
    let (cte_name, cte_alias, _) = resolve_identifiers(params)?;

    if params.tables.is_empty() {
        return Ok(("SELECT 0::bigint AS \"count\"".to_string(), Vec::new()));
    }

    let mut builder = SelectBuilder::new()
        .with_cte(&cte_name, build_sub_schema_cte(&params.tables)?)
        .column_raw(SqlFragment::raw("COUNT(*)::bigint AS \"count\""))
        .from_raw(SqlFragment::raw(format!(
            "{} {}",
            escape_ident(&cte_name),
            cte_alias
        )));

    if let Some(where_filter) = &params.where_filter {
        builder = builder.where_raw(build_sub_schema_where(where_filter, &cte_alias)?);
    }

    let (sql, values) = builder.build().build();
    tracing::debug!(sql_len = sql.len(), params = values.len(), "built sub-schema count query");
    Ok((sql, values))
}

fn resolve_identifiers(params: &SubSchemaQueryParams) -> Result<(String, String, String)> {
    let cte_name = params
        .cte_name
        .clone()
        .unwrap_or_else(|| DEFAULT_CTE_NAME.to_string());
    let cte_alias = params
        .cte_alias
        .clone()
        .unwrap_or_else(|| DEFAULT_CTE_ALIAS.to_string());
    let row_alias = params
        .row_alias
        .clone()
        .unwrap_or_else(|| DEFAULT_ROW_ALIAS.to_string());

    validate_identifier(&cte_name)?;
    validate_identifier(&cte_alias)?;
    validate_identifier(&row_alias)?;
    Ok((cte_name, cte_alias, row_alias))
}

fn validate_identifier(name: &str) -> Result<()> {
    if !is_valid_identifier(name) {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}
