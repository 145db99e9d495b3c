//! Field-type catalog.
//!
//! The caller declares the type of each filterable field; the compiler never
//! introspects the database. Fields missing from the catalog are treated as
//! strings.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Declared type of a filterable field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Json,
}

impl FieldType {
    /// The wire name of this type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Json => "json",
        }
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "json" => Ok(Self::Json),
            other => Err(Error::UnsupportedFieldType(other.to_string())),
        }
    }
}

/// Mapping from field name to declared type, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldConfig {
    fields: IndexMap<String, FieldType>,
}

impl FieldConfig {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from `(name, type-name)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut fields = IndexMap::new();
        for (name, ty) in pairs {
            fields.insert(name.to_string(), ty.parse()?);
        }
        Ok(Self { fields })
    }

    /// Declare a field.
    pub fn declare(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    /// Resolve a field's type; unknown fields are strings.
    pub fn type_of(&self, name: &str) -> FieldType {
        self.fields.get(name).copied().unwrap_or(FieldType::String)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unknown_fields_default_to_string() {
        let config = FieldConfig::new().declare("age", FieldType::Number);
        assert_eq!(config.type_of("age"), FieldType::Number);
        assert_eq!(config.type_of("nickname"), FieldType::String);
    }

    #[test]
    fn from_pairs_rejects_unknown_type_names() {
        let err = FieldConfig::from_pairs(vec![("age", "integer")]).unwrap_err();
        assert_eq!(err, Error::UnsupportedFieldType("integer".into()));
    }

    #[test]
    fn deserializes_from_json_map() {
        let config: FieldConfig =
            serde_json::from_value(serde_json::json!({"name": "string", "data": "json"})).unwrap();
        assert_eq!(config.type_of("data"), FieldType::Json);
    }
}
