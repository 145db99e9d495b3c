//! Keyset-paginated query building.
//!
//! Composes the order compiler, the sort hash and the keyset condition into
//! a single entry point: a query whose WHERE seeks past the cursor row and
//! whose ORDER BY always ends in the unique tiebreaker column, so paging
//! stays stable no matter how deep the caller goes. Cursors carry the sort
//! fingerprint; a cursor minted under a different ORDER BY is rejected.

use crate::cursor::{
    build_keyset_condition, compute_sort_hash, decode_cursor, encode_cursor,
    extract_cursor_values, Tiebreaker,
};
use crate::error::{Error, Result};
use crate::field::FieldConfig;
use crate::filter::compile_where;
use crate::order::{compile_order_by_parts, render_parts, OrderByPart};
use crate::query::resolve_alias;
use crate::value;
use jsonbq_sql::{
    escape_ident, OrderDirection, OrderExpr, SelectBuilder, SqlFragment, SqlParam,
};
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_TAKE: i64 = 50;

/// Parameters for [`build_keyset_query`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeysetQueryParams {
    pub table_name: String,
    pub table_alias: Option<String>,
    pub fields: Option<Vec<String>>,
    pub field_config: FieldConfig,
    #[serde(rename = "where")]
    pub where_filter: Option<Value>,
    pub order_by: Option<Value>,
    /// Unique per-row column appended to the ORDER BY, e.g. `id`.
    pub tiebreaker_field: String,
    /// `asc` (default) or `desc`.
    pub tiebreaker_direction: Option<String>,
    /// Cursor from a previous page, if any.
    pub cursor: Option<String>,
    pub take: Option<i64>,
}

/// A compiled keyset query plus what the caller needs to mint the next
/// page's cursor from its result rows.
#[derive(Clone, Debug)]
pub struct KeysetQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub parts: Vec<OrderByPart>,
    pub sort_hash: String,
}

/// Build a keyset-paginated SELECT. With no cursor this is the first page;
/// with one, the WHERE additionally seeks strictly past the cursor row.
pub fn build_keyset_query(params: &KeysetQueryParams) -> Result<KeysetQuery> {
    let alias = resolve_alias(&params.table_name, params.table_alias.as_deref())?;

    let tiebreaker_direction = match params.tiebreaker_direction.as_deref() {
        None => OrderDirection::Asc,
        Some(s) => OrderDirection::parse(s).ok_or_else(|| {
            Error::invalid_value("tiebreaker", format!("invalid direction: {s}"))
        })?,
    };
    let tiebreaker_expr = tiebreaker_expression(&alias, &params.tiebreaker_field);

    let parts = compile_order_by_parts(
        params.order_by.as_ref().unwrap_or(&Value::Null),
        &params.field_config,
        &alias,
    )?;
    let sort_hash = compute_sort_hash(&parts);

    let mut builder = SelectBuilder::new().from_table_as(&params.table_name, &alias);
    match &params.fields {
        None => builder = builder.all_columns(),
        Some(fields) => {
            for field in fields {
                if field == "*" {
                    builder = builder.all_columns();
                } else {
                    builder = builder.column(&alias, field);
                }
            }
        }
    }

    if let Some(where_filter) = &params.where_filter {
        builder = builder.where_raw(compile_where(where_filter, &params.field_config, &alias)?);
    }

    if let Some(cursor) = &params.cursor {
        let payload = decode_cursor(cursor)
            .ok_or_else(|| Error::invalid_value("cursor", "malformed cursor"))?;
        if !payload.matches(&sort_hash) {
            return Err(Error::invalid_value(
                "cursor",
                "cursor does not match the current order",
            ));
        }

        let condition = build_keyset_condition(
            &parts,
            &payload.values,
            &Tiebreaker {
                expression: tiebreaker_expr.clone(),
                direction: tiebreaker_direction,
                value: payload.tiebreaker,
            },
        )?;
        builder = builder.where_raw(condition.parens());
    }

    // ORDER BY always ends in the tiebreaker for a total order.
    let mut order = render_parts(&parts).unwrap_or_default();
    order.append_sep(
        ", ",
        OrderExpr::from_fragment(tiebreaker_expr, tiebreaker_direction).into_fragment(),
    );
    builder = builder.order_by_raw(order);

    let (sql, values) = builder
        .limit(params.take.unwrap_or(DEFAULT_TAKE))
        .build()
        .build();

    tracing::debug!(
        sql_len = sql.len(),
        params = values.len(),
        cursor = params.cursor.is_some(),
        "built keyset query"
    );
    Ok(KeysetQuery {
        sql,
        params: values,
        parts,
        sort_hash,
    })
}

/// Mint the cursor continuing after the last of `rows` (decoded result rows
/// as JSON objects), or `None` for an empty page.
pub fn next_cursor(
    rows: &[Value],
    parts: &[OrderByPart],
    tiebreaker_field: &str,
    sort_hash: &str,
) -> Option<String> {
    let last = rows.last()?;
    let values = extract_cursor_values(last, parts);
    let tiebreaker = value::stringify(last.get(tiebreaker_field).unwrap_or(&Value::Null));
    Some(encode_cursor(&values, &tiebreaker, sort_hash))
}

fn tiebreaker_expression(alias: &str, field: &str) -> SqlFragment {
    SqlFragment::raw(format!("{}.{}", alias, escape_ident(field)))
}
