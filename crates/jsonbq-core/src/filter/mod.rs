//! WHERE tree compilation.
//!
//! A where tree is an object whose keys are either field names (compiled by
//! field type) or the `AND`/`OR`/`NOT` combinators. Sibling keys conjoin.

pub(crate) mod json;
pub(crate) mod scalar;
pub(crate) mod search;
pub(crate) mod wildcard;

use crate::error::{Error, Result};
use crate::field::{FieldConfig, FieldType};
use jsonbq_sql::{Expr, SqlFragment};
use serde_json::Value;

/// Compile a where tree into a boolean SQL fragment. `null` and the empty
/// object compile to `TRUE`.
pub fn compile_where(tree: &Value, config: &FieldConfig, alias: &str) -> Result<SqlFragment> {
    if tree.is_null() {
        return Ok(SqlFragment::raw("TRUE"));
    }
    Ok(compile_node(tree, config, alias)?.into_fragment())
}

fn compile_node(node: &Value, config: &FieldConfig, alias: &str) -> Result<Expr> {
    let map = node.as_object().ok_or_else(|| {
        Error::invalid_value("where", format!("expected an object, got {node}"))
    })?;

    let mut conditions = Vec::new();
    for (key, operand) in map {
        match key.as_str() {
            "AND" => {
                let children = compile_children(operand, config, alias)?;
                if !children.is_empty() {
                    conditions.push(combine_and(children));
                }
            }
            "OR" => {
                // An empty OR is vacuous, not FALSE.
                let children = compile_children(operand, config, alias)?;
                if !children.is_empty() {
                    conditions.push(Expr::or_all(children));
                }
            }
            "NOT" => {
                let children = compile_children(operand, config, alias)?;
                if !children.is_empty() {
                    conditions.push(combine_and(children).not());
                }
            }
            field => {
                let fragment = match config.type_of(field) {
                    FieldType::Json => json::compile_json_filter(alias, field, operand)?,
                    scalar_type => {
                        scalar::compile_scalar_filter(alias, field, scalar_type, operand)?
                    }
                };
                conditions.push(Expr::from_fragment(fragment));
            }
        }
    }

    if conditions.is_empty() {
        return Ok(Expr::always());
    }
    Ok(combine_and(conditions))
}

/// A combinator operand: a list of nodes, or a single node.
fn compile_children(operand: &Value, config: &FieldConfig, alias: &str) -> Result<Vec<Expr>> {
    match operand {
        Value::Array(nodes) => nodes
            .iter()
            .map(|n| compile_node(n, config, alias))
            .collect(),
        Value::Object(_) => Ok(vec![compile_node(operand, config, alias)?]),
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
