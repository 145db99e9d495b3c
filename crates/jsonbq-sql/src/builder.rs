//! Core SQL fragment type.

use crate::param::SqlParam;
use std::fmt::Write;

/// A SQL fragment with its associated parameters.
///
/// This is the core type for building SQL safely. It maintains a SQL string
/// with positional placeholders ($1, $2, ...) and the vector of parameter
/// values those placeholders bind to. Concatenating two fragments renumbers
/// the placeholders of the appended fragment so ordering is preserved.
#[derive(Clone, Debug, Default)]
pub struct SqlFragment {
    sql: String,
    params: Vec<SqlParam>,
}

impl SqlFragment {
    /// Create a new empty fragment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fragment from raw SQL (no parameters).
    ///
    /// # Warning
    ///
    /// Only use this for known-safe SQL strings (keywords, operators,
    /// escaped identifiers). Never use this with user input.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Create a fragment holding a single placeholder.
    pub fn param(value: impl Into<SqlParam>) -> Self {
        let mut frag = Self::new();
        frag.push_param(value);
        frag
    }

    /// Create a fragment holding a single placeholder with an explicit cast,
    /// e.g. `$1::jsonb`.
    pub fn typed_param(value: impl Into<SqlParam>, pg_type: &str) -> Self {
        let mut frag = Self::new();
        frag.push_typed_param(value, pg_type);
        frag
    }

    /// Get the SQL string.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get the parameters.
    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    /// Get the current parameter count.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Check if the fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Push raw SQL (no parameters).
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Push a parameter and its placeholder.
    pub fn push_param(&mut self, value: impl Into<SqlParam>) -> &mut Self {
        let n = self.params.len() + 1;
        write!(self.sql, "${}", n).unwrap();
        self.params.push(value.into());
        self
    }

    /// Push a parameter with an explicit cast, e.g. `$3::text[]`.
    pub fn push_typed_param(&mut self, value: impl Into<SqlParam>, pg_type: &str) -> &mut Self {
        let n = self.params.len() + 1;
        write!(self.sql, "${}::{}", n, pg_type).unwrap();
        self.params.push(value.into());
        self
    }

    /// Append another fragment, renumbering its placeholders to continue
    /// from the current count.
    pub fn append(&mut self, other: SqlFragment) -> &mut Self {
        renumber_into(&mut self.sql, &other.sql, self.params.len());
        self.params.extend(other.params);
        self
    }

    /// Append with a separator when both sides are non-empty.
    pub fn append_sep(&mut self, sep: &str, other: SqlFragment) -> &mut Self {
        if !self.is_empty() && !other.is_empty() {
            self.push(sep);
        }
        self.append(other)
    }

    /// Join fragments with a separator, skipping empty ones.
    pub fn join(sep: &str, fragments: impl IntoIterator<Item = SqlFragment>) -> Self {
        let mut result = Self::new();
        let mut first = true;

        for frag in fragments {
            if frag.is_empty() {
                continue;
            }
            if !first {
                result.push(sep);
            }
            result.append(frag);
            first = false;
        }

        result
    }

    /// Wrap in parentheses.
    pub fn parens(mut self) -> Self {
        self.sql = format!("({})", self.sql);
        self
    }

    /// Consume into the final `(sql, params)` pair.
    pub fn build(self) -> (String, Vec<SqlParam>) {
        (self.sql, self.params)
    }
}

/// Append `sql` to `out`, shifting every `$n` placeholder by `offset`.
fn renumber_into(out: &mut String, sql: &str, offset: usize) {
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut num = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_digit() {
                num.push(chars.next().unwrap());
            } else {
                break;
            }
        }

        match num.parse::<usize>() {
            Ok(n) => write!(out, "${}", n + offset).unwrap(),
            Err(_) => {
                out.push('$');
                out.push_str(&num);
            }
        }
    }
}
