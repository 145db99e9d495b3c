//! jsonbq Core - Prisma-style JSONB filter and sort compiler for PostgreSQL.
//!
//! Translates declarative filter/sort trees into parameterized PostgreSQL
//! SQL targeting JSONB columns. The compiler is a pure function: it takes a
//! where tree, an orderBy list, a field-type catalog and a table identifier
//! and returns `(sql, params)` with every user-supplied value bound as a
//! positional parameter. Execution is the caller's concern.
//!
//! # Architecture
//!
//! The compilation pipeline:
//!
//! 1. **Path parsing** (`path`) - Dotted/bracket/wildcard paths to canonical segments
//! 2. **Where compilation** (`filter`) - Tree walk dispatching per-field-type operators
//! 3. **Order compilation** (`order`) - ORDER BY parts with casts and aggregations
//! 4. **Keyset cursors** (`cursor`) - Sort hashes, cursor codec, seek predicates
//! 5. **Sub-schema extraction** (`sub_schema`) - UNION ALL CTEs over (table, path) pairs
//!
//! # Example
//!
//! ```
//! use jsonbq_core::{build_query, FieldConfig, FieldType, QueryParams};
//! use serde_json::json;
//!
//! let (sql, params) = build_query(&QueryParams {
//!     table_name: "users".into(),
//!     field_config: FieldConfig::new()
//!         .declare("isActive", FieldType::Boolean)
//!         .declare("data", FieldType::Json),
//!     where_filter: Some(json!({
//!         "isActive": true,
//!         "data": {"path": "products[*].price", "gt": 100}
//!     })),
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! assert!(sql.contains("EXISTS (SELECT 1 FROM jsonb_array_elements"));
//! assert_eq!(params.len(), 8);
//! ```

pub mod cursor;
pub mod error;
pub mod field;
pub mod filter;
pub mod order;
pub mod pagination;
pub mod path;
pub mod query;
pub mod sub_schema;
pub mod value;

// Re-export main types
pub use cursor::{
    build_keyset_condition, compute_sort_hash, decode_cursor, encode_cursor,
    extract_cursor_values, CursorPayload, Tiebreaker,
};
pub use error::{Error, Result};
pub use field::{FieldConfig, FieldType};
pub use filter::compile_where;
pub use order::{
    compile_order_by, compile_order_by_parts, Aggregation, JsonOrderConfig, OrderByPart,
    OrderCast,
};
pub use pagination::{build_keyset_query, next_cursor, KeysetQuery, KeysetQueryParams};
pub use path::{
    parse_json_path, segments_to_string, segments_to_text_array, validate_json_path,
    PathSegment,
};
pub use query::{
    build_query, generate_order_by, generate_where, qualified_column, GenerateOrderByParams,
    GenerateWhereParams, QueryParams,
};
pub use sub_schema::{
    build_sub_schema_count_query, build_sub_schema_cte, build_sub_schema_order_by,
    build_sub_schema_query, build_sub_schema_where, SubSchemaQueryParams, SubSchemaTable,
};

// Re-export the fragment layer callers compose with
pub use jsonbq_sql::{OrderDirection, SqlFragment, SqlParam};

/// Prelude for common imports.
pub mod prelude {
    pub use super::cursor::{
        build_keyset_condition, compute_sort_hash, decode_cursor, encode_cursor,
        extract_cursor_values, CursorPayload, Tiebreaker,
    };
    pub use super::error::{Error, Result};
    pub use super::field::{FieldConfig, FieldType};
    pub use super::pagination::{build_keyset_query, next_cursor, KeysetQueryParams};
    pub use super::query::{build_query, generate_order_by, generate_where, QueryParams};
    pub use super::sub_schema::{
        build_sub_schema_count_query, build_sub_schema_query, SubSchemaQueryParams,
        SubSchemaTable,
    };
    pub use jsonbq_sql::{OrderDirection, SqlFragment, SqlParam};
}
