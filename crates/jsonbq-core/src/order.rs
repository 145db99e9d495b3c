//! ORDER BY compilation.
//!
//! Order items are either `{column: 'asc'|'desc'}` or, for JSON fields,
//! `{field: {path, direction, type, aggregation}}`. Items that do not parse
//! (bad direction, JSON shape on a non-JSON field, unknown cast) are
//! skipped rather than failing the build; an order with no surviving parts
//! compiles to no ORDER BY at all.

use crate::error::Result;
use crate::field::{FieldConfig, FieldType};
use crate::filter::json::JsonTarget;
use crate::path::{self, PathSegment};
use jsonbq_sql::{escape_ident, OrderDirection, OrderExpr, SqlFragment, SqlParam};
use serde_json::Value;

/// Cast applied to the extracted JSON text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderCast {
    Text,
    Int,
    Float,
    Boolean,
    Timestamp,
}

impl OrderCast {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "boolean" => Some(Self::Boolean),
            "timestamp" => Some(Self::Timestamp),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Int => "int",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
        }
    }
}

/// Array aggregation over a wildcard path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregation {
    Min,
    Max,
    Avg,
    First,
    Last,
}

impl Aggregation {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "avg" => Some(Self::Avg),
            "first" => Some(Self::First),
            "last" => Some(Self::Last),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
            Self::First => "first",
            Self::Last => "last",
        }
    }
}

/// JSON order configuration, kept for cursor extraction and sort hashing.
#[derive(Clone, Debug)]
pub struct JsonOrderConfig {
    pub segments: Vec<PathSegment>,
    pub cast: OrderCast,
    pub aggregation: Option<Aggregation>,
}

/// One compiled ORDER BY part.
#[derive(Clone, Debug)]
pub struct OrderByPart {
    pub field: String,
    pub direction: OrderDirection,
    pub expression: SqlFragment,
    pub json: Option<JsonOrderConfig>,
}

/// Compile an orderBy value (one item or a list) into typed parts.
pub fn compile_order_by_parts(
    order_by: &Value,
    config: &FieldConfig,
    alias: &str,
) -> Result<Vec<OrderByPart>> {
    let items: Vec<&Value> = match order_by {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    let mut parts = Vec::new();
    for item in items {
        let Some(map) = item.as_object() else {
            continue;
        };
        for (field, spec) in map {
            match spec {
                Value::String(direction) => {
                    let Some(direction) = OrderDirection::parse(direction) else {
                        continue;
                    };
                    parts.push(OrderByPart {
                        field: field.clone(),
                        direction,
                        expression: SqlFragment::raw(format!(
                            "{}.{}",
                            alias,
                            escape_ident(field)
                        )),
                        json: None,
                    });
                }
                Value::Object(spec) => {
                    if config.type_of(field) != FieldType::Json {
                        continue;
                    }
                    if let Some(part) = compile_json_part(alias, field, spec)? {
                        parts.push(part);
                    }
                }
                _ => continue,
            }
        }
    }

    Ok(parts)
}

/// Compile an orderBy value into a ready ORDER BY fragment, or `None` when
/// no parts survive.
pub fn compile_order_by(
    order_by: &Value,
    config: &FieldConfig,
    alias: &str,
) -> Result<Option<SqlFragment>> {
    let parts = compile_order_by_parts(order_by, config, alias)?;
    Ok(render_parts(&parts))
}

/// Render compiled parts as the ORDER BY list.
pub fn render_parts(parts: &[OrderByPart]) -> Option<SqlFragment> {
    if parts.is_empty() {
        return None;
    }
    Some(SqlFragment::join(
        ", ",
        parts.iter().map(|p| {
            OrderExpr::from_fragment(p.expression.clone(), p.direction).into_fragment()
        }),
    ))
}

fn compile_json_part(
    alias: &str,
    field: &str,
    spec: &serde_json::Map<String, Value>,
) -> Result<Option<OrderByPart>> {
    let Some(direction) = spec
        .get("direction")
        .and_then(Value::as_str)
        .and_then(OrderDirection::parse)
    else {
        return Ok(None);
    };

    let cast = match spec.get("type") {
        None => OrderCast::Text,
        Some(Value::String(name)) => match OrderCast::parse(name) {
            Some(cast) => cast,
            None => return Ok(None),
        },
        Some(_) => return Ok(None),
    };

    let aggregation = match spec.get("aggregation") {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) => match Aggregation::parse(name) {
            Some(agg) => Some(agg),
            None => return Ok(None),
        },
        Some(_) => return Ok(None),
    };

    let segments = path::path_from_value(spec.get("path").unwrap_or(&Value::Null))?;
    let column = format!("{}.{}", alias, escape_ident(field));

    let expression = match aggregation {
        None => plain_expression(&column, &segments, cast),
        Some(agg) => aggregated_expression(&column, &segments, cast, agg),
    };

    Ok(Some(OrderByPart {
        field: field.to_string(),
        direction,
        expression,
        json: Some(JsonOrderConfig {
            segments,
            cast,
            aggregation,
        }),
    }))
}

/// `(col #>> $path)::cast`
fn plain_expression(column: &str, segments: &[PathSegment], cast: OrderCast) -> SqlFragment {
    let mut frag = SqlFragment::raw("(");
    frag.append(text_extraction(column, segments));
    frag.push(")::");
    frag.push(cast.as_sql());
    frag
}

fn aggregated_expression(
    column: &str,
    segments: &[PathSegment],
    cast: OrderCast,
    aggregation: Aggregation,
) -> SqlFragment {
    // Aggregations act on the array at the first wildcard; the rest of the
    // path navigates each element. Without a wildcard the whole path is the
    // array location.
    let (head, tail) = match path::split_at_wildcard(segments) {
        Some((head, tail)) => (head, tail),
        None => (segments, &[][..]),
    };
    let array = JsonTarget::column(column, head).jsonb_expr();

    match aggregation {
        Aggregation::First | Aggregation::Last => {
            let index = if aggregation == Aggregation::First { "0" } else { "-1" };
            let mut element = SqlFragment::raw("(");
            element.append(array);
            element.push(&format!(" -> {index})"));

            let mut frag = SqlFragment::raw("(");
            frag.append(text_extraction_fragment(element, tail));
            frag.push(")::");
            frag.push(cast.as_sql());
            frag
        }
        Aggregation::Min | Aggregation::Max | Aggregation::Avg => {
            let agg_fn = aggregation.as_str().to_uppercase();

            let mut frag = SqlFragment::raw(format!("(SELECT {agg_fn}(("));
            frag.append(text_extraction("elem.value", tail));
            frag.push(")::");
            frag.push(cast.as_sql());
            frag.push(") FROM jsonb_array_elements(");
            frag.append(array);
            frag.push(") AS elem(value))");
            frag
        }
    }
}

/// `expr #>> $path` (or `#>> '{}'` for the whole value).
fn text_extraction(expr: &str, segments: &[PathSegment]) -> SqlFragment {
    text_extraction_fragment(SqlFragment::raw(expr), segments)
}

fn text_extraction_fragment(expr: SqlFragment, segments: &[PathSegment]) -> SqlFragment {
    let mut frag = expr;
    if segments.is_empty() {
        frag.push(" #>> '{}'");
    } else {
        frag.push(" #>> ");
        frag.push_typed_param(
            SqlParam::TextArray(path::segments_to_text_array(segments)),
            "text[]",
        );
    }
    frag
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config() -> FieldConfig {
        FieldConfig::new()
            .declare("createdAt", FieldType::Date)
            .declare("data", FieldType::Json)
    }

    fn order_sql(order_by: Value) -> Option<String> {
        compile_order_by(&order_by, &config(), "u")
            .unwrap()
            .map(|f| f.sql().to_string())
    }

    #[test]
    fn regular_column_order() {
        assert_eq!(
            order_sql(json!({"createdAt": "asc"})).unwrap(),
            "u.\"createdAt\" ASC"
        );
    }

    #[test]
    fn list_preserves_input_order() {
        assert_eq!(
            order_sql(json!([{"createdAt": "desc"}, {"name": "asc"}])).unwrap(),
            "u.\"createdAt\" DESC, u.\"name\" ASC"
        );
    }

    #[test]
    fn invalid_direction_skips_the_item() {
        assert_eq!(
            order_sql(json!([{"createdAt": "upward"}, {"name": "asc"}])).unwrap(),
            "u.\"name\" ASC"
        );
        assert_eq!(order_sql(json!({"createdAt": "upward"})), None);
    }

    #[test]
    fn absent_order_is_none() {
        assert_eq!(order_sql(Value::Null), None);
        assert_eq!(order_sql(json!([])), None);
    }

    #[test]
    fn json_order_defaults_to_text_cast() {
        assert_eq!(
            order_sql(json!({"data": {"path": "user.name", "direction": "asc"}})).unwrap(),
            "(u.\"data\" #>> $1::text[])::text ASC"
        );
    }

    #[test]
    fn json_order_casts_other_types() {
        assert_eq!(
            order_sql(json!({"data": {"path": "score", "direction": "desc", "type": "float"}}))
                .unwrap(),
            "(u.\"data\" #>> $1::text[])::float DESC"
        );
    }

    #[test]
    fn json_shape_on_non_json_field_is_skipped() {
        assert_eq!(
            order_sql(json!({"createdAt": {"path": "x", "direction": "asc"}})),
            None
        );
    }

    #[test]
    fn avg_aggregation_builds_a_subquery() {
        let sql = order_sql(json!({
            "data": {"path": "scores[*]", "direction": "asc", "type": "int", "aggregation": "avg"}
        }))
        .unwrap();
        assert_eq!(
            sql,
            "(SELECT AVG((elem.value #>> '{}')::int) FROM \
             jsonb_array_elements((u.\"data\" #> $1::text[])::jsonb) AS elem(value)) ASC"
        );
    }

    #[test]
    fn min_aggregation_navigates_the_tail() {
        let sql = order_sql(json!({
            "data": {"path": "items[*].price", "direction": "asc", "type": "float",
                     "aggregation": "min"}
        }))
        .unwrap();
        assert_eq!(
            sql,
            "(SELECT MIN((elem.value #>> $1::text[])::float) FROM \
             jsonb_array_elements((u.\"data\" #> $2::text[])::jsonb) AS elem(value)) ASC"
        );
    }

    #[test]
    fn first_and_last_subscript_the_array() {
        let sql = order_sql(json!({
            "data": {"path": "tags[*]", "direction": "asc", "aggregation": "first"}
        }))
        .unwrap();
        assert_eq!(
            sql,
            "(((u.\"data\" #> $1::text[])::jsonb -> 0) #>> '{}')::text ASC"
        );

        let sql = order_sql(json!({
            "data": {"path": "tags[*]", "direction": "desc", "aggregation": "last"}
        }))
        .unwrap();
        assert_eq!(
            sql,
            "(((u.\"data\" #> $1::text[])::jsonb -> -1) #>> '{}')::text DESC"
        );
    }

    #[test]
    fn unknown_cast_or_aggregation_skips_the_item() {
        assert_eq!(
            order_sql(json!({"data": {"path": "x", "direction": "asc", "type": "money"}})),
            None
        );
        assert_eq!(
            order_sql(json!({
                "data": {"path": "x[*]", "direction": "asc", "aggregation": "median"}
            })),
            None
        );
    }

    #[test]
    fn parts_carry_json_metadata() {
        let parts = compile_order_by_parts(
            &json!({"data": {"path": "scores[*]", "direction": "asc", "type": "int",
                              "aggregation": "avg"}}),
            &config(),
            "u",
        )
        .unwrap();
        assert_eq!(parts.len(), 1);
        let json_config = parts[0].json.as_ref().unwrap();
        assert_eq!(json_config.cast, OrderCast::Int);
        assert_eq!(json_config.aggregation, Some(Aggregation::Avg));
    }
}
