//! SELECT statement builder.

use crate::{builder::SqlFragment, identifier::escape_ident};

/// Builder for the SELECT shapes the query compiler emits: optional CTEs,
/// an aliased FROM, plain and lateral joins, WHERE/ORDER BY fragments and
/// parameterized LIMIT/OFFSET.
#[derive(Clone, Debug, Default)]
pub struct SelectBuilder {
    ctes: Vec<(String, SqlFragment)>,
    columns: Vec<SqlFragment>,
    from: Option<SqlFragment>,
    joins: Vec<SqlFragment>,
    where_clauses: Vec<SqlFragment>,
    order_by: Option<SqlFragment>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl SelectBuilder {
    /// Create a new SELECT builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a CTE (WITH clause). The name must already be validated.
    pub fn with_cte(mut self, name: &str, query: SqlFragment) -> Self {
        self.ctes.push((name.to_string(), query));
        self
    }

    /// Add a column expression.
    pub fn column_raw(mut self, sql: SqlFragment) -> Self {
        self.columns.push(sql);
        self
    }

    /// Add a plain column (`alias."col"`).
    pub fn column(mut self, alias: &str, name: &str) -> Self {
        self.columns.push(SqlFragment::raw(format!(
            "{}.{}",
            alias,
            escape_ident(name)
        )));
        self
    }

    /// Add all columns (*).
    pub fn all_columns(mut self) -> Self {
        self.columns.push(SqlFragment::raw("*"));
        self
    }

    /// Set FROM with an alias. The alias must already be validated.
    pub fn from_table_as(mut self, table: &str, alias: &str) -> Self {
        self.from = Some(SqlFragment::raw(format!(
            "{} {}",
            escape_ident(table),
            alias
        )));
        self
    }

    /// Set FROM from raw SQL.
    pub fn from_raw(mut self, sql: SqlFragment) -> Self {
        self.from = Some(sql);
        self
    }

    /// Add an INNER JOIN with a raw ON condition.
    pub fn join_raw(mut self, sql: SqlFragment) -> Self {
        let mut join = SqlFragment::raw(" JOIN ");
        join.append(sql);
        self.joins.push(join);
        self
    }

    /// Add a `CROSS JOIN LATERAL fn(...) WITH ORDINALITY AS alias(cols)`.
    pub fn cross_join_lateral_ordinality(
        mut self,
        call: SqlFragment,
        alias: &str,
        columns: &[&str],
    ) -> Self {
        let mut join = SqlFragment::raw(" CROSS JOIN LATERAL ");
        join.append(call);
        join.push(" WITH ORDINALITY AS ");
        join.push(alias);
        join.push("(");
        join.push(&columns.join(", "));
        join.push(")");
        self.joins.push(join);
        self
    }

    /// Add a WHERE clause; multiple clauses AND-join.
    pub fn where_raw(mut self, sql: SqlFragment) -> Self {
        self.where_clauses.push(sql);
        self
    }

    /// Set the ORDER BY fragment (already comma-joined).
    pub fn order_by_raw(mut self, sql: SqlFragment) -> Self {
        self.order_by = Some(sql);
        self
    }

    /// Set LIMIT, bound as a parameter.
    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Set OFFSET, bound as a parameter.
    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Build the SELECT statement.
    pub fn build(self) -> SqlFragment {
        let mut result = SqlFragment::new();

        if !self.ctes.is_empty() {
            result.push("WITH ");
            for (i, (name, query)) in self.ctes.into_iter().enumerate() {
                if i > 0 {
                    result.push(", ");
                }
                result.push(&escape_ident(&name));
                result.push(" AS (");
                result.append(query);
                result.push(")");
            }
            result.push(" ");
        }

        result.push("SELECT ");
        if self.columns.is_empty() {
            result.push("*");
        } else {
            for (i, col) in self.columns.into_iter().enumerate() {
                if i > 0 {
                    result.push(", ");
                }
                result.append(col);
            }
        }

        if let Some(from) = self.from {
            result.push(" FROM ");
            result.append(from);
        }

        for join in self.joins {
            result.append(join);
        }

        if !self.where_clauses.is_empty() {
            result.push(" WHERE ");
            for (i, clause) in self.where_clauses.into_iter().enumerate() {
                if i > 0 {
                    result.push(" AND ");
                }
                result.append(clause);
            }
        }

        if let Some(order) = self.order_by {
            if !order.is_empty() {
                result.push(" ORDER BY ");
                result.append(order);
            }
        }

        if let Some(limit) = self.limit {
            result.push(" LIMIT ");
            result.push_param(limit);
        }

        if let Some(offset) = self.offset {
            result.push(" OFFSET ");
            result.push_param(offset);
        }

        result
    }
}
