//! Full-text search over JSONB.

use crate::error::{Error, Result};
use crate::filter::json::JsonTarget;
use crate::path;
use jsonbq_sql::{SqlFragment, SqlParam};
use serde_json::Value;

/// How the query string is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SearchType {
    /// AND over tokens.
    Plain,
    /// Ordered phrase.
    Phrase,
}

impl SearchType {
    fn query_function(self) -> &'static str {
        match self {
            Self::Plain => "plainto_tsquery",
            Self::Phrase => "phraseto_tsquery",
        }
    }
}

/// Options carried by the `searchLanguage` / `searchType` / `searchIn`
/// metadata keys.
#[derive(Clone, Debug)]
pub(crate) struct SearchOptions {
    language: String,
    search_type: SearchType,
    include: Vec<&'static str>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            language: "simple".to_string(),
            search_type: SearchType::Plain,
            include: vec!["all"],
        }
    }
}

impl SearchOptions {
    pub(crate) fn from_filter(filter: &serde_json::Map<String, Value>) -> Result<Self> {
        let mut options = Self::default();

        if let Some(language) = filter.get("searchLanguage") {
            options.language = language
                .as_str()
                .ok_or_else(|| {
                    Error::InvalidSearchValue(format!("searchLanguage must be a string, got {language}"))
                })?
                .to_string();
        }

        if let Some(search_type) = filter.get("searchType") {
            options.search_type = match search_type.as_str() {
                Some("plain") => SearchType::Plain,
                Some("phrase") => SearchType::Phrase,
                _ => {
                    return Err(Error::InvalidSearchValue(format!(
                        "unknown searchType: {search_type}"
                    )))
                }
            };
        }

        if let Some(search_in) = filter.get("searchIn") {
            options.include = match search_in.as_str() {
                Some("all") => vec!["all"],
                Some("values") => vec!["string", "numeric", "boolean"],
                Some("keys") => vec!["key"],
                Some("strings") => vec!["string"],
                Some("numbers") => vec!["numeric"],
                Some("booleans") => vec!["boolean"],
                _ => {
                    return Err(Error::InvalidSearchValue(format!(
                        "unknown searchIn: {search_in}"
                    )))
                }
            };
        }

        Ok(options)
    }

    fn include_param(&self) -> SqlParam {
        SqlParam::Json(Value::Array(
            self.include.iter().map(|s| Value::String(s.to_string())).collect(),
        ))
    }
}

/// Emit `jsonb_to_tsvector(lang, sub, include) @@ QUERYFN(lang, query)`.
pub(crate) fn compile_search(
    target: &JsonTarget<'_>,
    operand: &Value,
    options: &SearchOptions,
) -> Result<SqlFragment> {
    let query = operand
        .as_str()
        .ok_or_else(|| Error::InvalidSearchValue(format!("expected a string, got {operand}")))?;
    if query.is_empty() {
        return Err(Error::InvalidSearchValue("empty search query".into()));
    }

    let mut frag = SqlFragment::raw("jsonb_to_tsvector(");
    frag.push_typed_param(options.language.clone(), "regconfig");
    frag.push(", ");
    if target.path.is_empty() {
        frag.push(&target.base);
    } else {
        frag.push(&target.base);
        frag.push(" #> ");
        frag.push_typed_param(
            SqlParam::TextArray(path::segments_to_text_array(target.path)),
            "text[]",
        );
    }
    frag.push(", ");
    frag.push_typed_param(options.include_param(), "jsonb");
    frag.push(") @@ ");
    frag.push(options.search_type.query_function());
    frag.push("(");
    frag.push_typed_param(options.language.clone(), "regconfig");
    frag.push(", ");
    frag.push_param(query);
    frag.push(")");
    Ok(frag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn options(filter: Value) -> Result<SearchOptions> {
        SearchOptions::from_filter(filter.as_object().unwrap())
    }

    #[test]
    fn root_search_with_defaults() {
        let target = JsonTarget::column("t.\"data\"", &[]);
        let frag = compile_search(&target, &json!("hello world"), &SearchOptions::default())
            .unwrap();
        assert_eq!(
            frag.sql(),
            "jsonb_to_tsvector($1::regconfig, t.\"data\", $2::jsonb) @@ \
             plainto_tsquery($3::regconfig, $4)"
        );
        assert_eq!(frag.params()[0], SqlParam::Text("simple".into()));
        assert_eq!(frag.params()[1], SqlParam::Json(json!(["all"])));
        assert_eq!(frag.params()[3], SqlParam::Text("hello world".into()));
    }

    #[test]
    fn nested_search_binds_the_path() {
        let segments = crate::path::parse_json_path("docs.body").unwrap();
        let target = JsonTarget::column("t.\"data\"", &segments);
        let frag = compile_search(&target, &json!("rust"), &SearchOptions::default()).unwrap();
        assert_eq!(
            frag.sql(),
            "jsonb_to_tsvector($1::regconfig, t.\"data\" #> $2::text[], $3::jsonb) @@ \
             plainto_tsquery($4::regconfig, $5)"
        );
    }

    #[test]
    fn phrase_type_switches_the_query_function() {
        let opts = options(json!({"searchType": "phrase", "searchLanguage": "english"})).unwrap();
        let target = JsonTarget::column("t.\"data\"", &[]);
        let frag = compile_search(&target, &json!("exact words"), &opts).unwrap();
        assert!(frag.sql().contains("phraseto_tsquery("));
        assert_eq!(frag.params()[0], SqlParam::Text("english".into()));
    }

    #[test]
    fn search_in_maps_to_include_lists() {
        for (name, include) in [
            ("all", json!(["all"])),
            ("values", json!(["string", "numeric", "boolean"])),
            ("keys", json!(["key"])),
            ("strings", json!(["string"])),
            ("numbers", json!(["numeric"])),
            ("booleans", json!(["boolean"])),
        ] {
            let opts = options(json!({"searchIn": name})).unwrap();
            assert_eq!(opts.include_param(), SqlParam::Json(include), "searchIn {name}");
        }
    }

    #[test]
    fn unknown_options_are_rejected() {
        assert!(matches!(
            options(json!({"searchType": "fuzzy"})).unwrap_err(),
            Error::InvalidSearchValue(_)
        ));
        assert!(matches!(
            options(json!({"searchIn": "everything"})).unwrap_err(),
            Error::InvalidSearchValue(_)
        ));
    }

    #[test]
    fn empty_or_non_string_queries_are_rejected() {
        let target = JsonTarget::column("t.\"data\"", &[]);
        assert!(matches!(
            compile_search(&target, &json!(""), &SearchOptions::default()).unwrap_err(),
            Error::InvalidSearchValue(_)
        ));
        assert!(matches!(
            compile_search(&target, &json!(7), &SearchOptions::default()).unwrap_err(),
            Error::InvalidSearchValue(_)
        ));
    }
}
