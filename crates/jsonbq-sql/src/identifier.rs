//! Safe SQL identifier handling.
//!
//! Column and table names are always double-quote escaped; aliases and CTE
//! names that are spliced into SQL unquoted must pass strict validation.

/// Escape a SQL identifier (table name, column name, etc.).
///
/// Wraps the identifier in double quotes and doubles any embedded quotes.
///
/// # Examples
///
/// ```
/// use jsonbq_sql::escape_ident;
///
/// assert_eq!(escape_ident("users"), "\"users\"");
/// assert_eq!(escape_ident("user\"name"), "\"user\"\"name\"");
/// ```
pub fn escape_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Check whether a string is a valid bare identifier.
///
/// Accepts `^[A-Za-z_][A-Za-z0-9_]*$`. This is the rule for table aliases
/// and CTE names, which appear in emitted SQL without quoting.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn escape_ident_doubles_quotes() {
        assert_eq!(escape_ident("users"), "\"users\"");
        assert_eq!(escape_ident("user_table"), "\"user_table\"");
        assert_eq!(escape_ident("user\"name"), "\"user\"\"name\"");
        assert_eq!(escape_ident("My Table"), "\"My Table\"");
        assert_eq!(escape_ident(""), "\"\"");
    }

    #[test]
    fn valid_identifiers() {
        assert!(is_valid_identifier("users"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("u"));
        assert!(is_valid_identifier("sub_schema_items"));
    }

    #[test]
    fn invalid_identifiers() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("123users"));
        assert!(!is_valid_identifier("my-table"));
        assert!(!is_valid_identifier("my table"));
        assert!(!is_valid_identifier("tbl$"));
        assert!(!is_valid_identifier("a;DROP TABLE x"));
    }
}
