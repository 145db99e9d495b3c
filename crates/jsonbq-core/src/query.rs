//! Public build entry points.

use crate::error::{Error, Result};
use crate::field::FieldConfig;
use crate::filter::compile_where;
use crate::order::compile_order_by;
use jsonbq_sql::{escape_ident, is_valid_identifier, SelectBuilder, SqlFragment, SqlParam};
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_TAKE: i64 = 50;

/// Parameters for [`build_query`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryParams {
    pub table_name: String,
    pub table_alias: Option<String>,
    pub fields: Option<Vec<String>>,
    pub field_config: FieldConfig,
    #[serde(rename = "where")]
    pub where_filter: Option<Value>,
    pub order_by: Option<Value>,
    pub take: Option<i64>,
    pub skip: Option<i64>,
}

/// Parameters for [`generate_where`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateWhereParams {
    #[serde(rename = "where")]
    pub where_filter: Value,
    pub field_config: FieldConfig,
    pub table_alias: String,
}

/// Parameters for [`generate_order_by`].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateOrderByParams {
    pub table_alias: String,
    pub order_by: Value,
    pub field_config: FieldConfig,
}

/// Build a full SELECT:
/// `SELECT <fields> FROM "table" alias [WHERE ...] [ORDER BY ...] LIMIT $n OFFSET $n`.
pub fn build_query(params: &QueryParams) -> Result<(String, Vec<SqlParam>)> {
    let alias = resolve_alias(&params.table_name, params.table_alias.as_deref())?;

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

    if let Some(order_by) = &params.order_by {
        if let Some(order) = compile_order_by(order_by, &params.field_config, &alias)? {
            builder = builder.order_by_raw(order);
        }
    }

    let (sql, values) = builder
        .limit(params.take.unwrap_or(DEFAULT_TAKE))
        .offset(params.skip.unwrap_or(0))
        .build()
        .build();

    tracing::debug!(sql_len = sql.len(), params = values.len(), "built query");
    Ok((sql, values))
}

/// Compile a where tree into a WHERE-clause fragment.
pub fn generate_where(params: &GenerateWhereParams) -> Result<SqlFragment> {
    validate_alias(&params.table_alias)?;
    compile_where(&params.where_filter, &params.field_config, &params.table_alias)
}

/// Compile an orderBy value into an ORDER BY fragment, or `None` when no
/// parts survive.
pub fn generate_order_by(params: &GenerateOrderByParams) -> Result<Option<SqlFragment>> {
    validate_alias(&params.table_alias)?;
    compile_order_by(&params.order_by, &params.field_config, &params.table_alias)
}

pub(crate) fn resolve_alias(table_name: &str, alias: Option<&str>) -> Result<String> {
    let alias = match alias {
        Some(alias) => alias.to_string(),
        None => table_name.chars().take(1).collect(),
    };
    validate_alias(&alias)?;
    Ok(alias)
}

pub(crate) fn validate_alias(alias: &str) -> Result<()> {
    if !is_valid_identifier(alias) {
        return Err(Error::InvalidIdentifier(alias.to_string()));
    }
    Ok(())
}

/// A qualified, escaped column reference (`alias."col"`), for callers
/// assembling their own fragments (tiebreakers, custom projections).
pub fn qualified_column(alias: &str, column: &str) -> Result<SqlFragment> {
    validate_alias(alias)?;
    Ok(SqlFragment::raw(format!("{}.{}", alias, escape_ident(column))))
}
