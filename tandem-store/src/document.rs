//! Document snapshots and typed field access.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::path::DocPath;

/// Field map of a document.
pub type Fields = BTreeMap<String, Value>;

/// A point-in-time snapshot of a stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Full path of the document
    pub path: DocPath,
    /// Field values
    pub fields: Fields,
    /// Store-maintained revision, bumped on every committed write
    pub revision: u64,
    /// When the document was last written
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// String field value, if present and a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Boolean field value, if present and a bool.
    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.fields.get(name).and_then(Value::as_bool)
    }

    /// Integer field value, if present and an integer.
    pub fn i64_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::as_i64)
    }

    /// String-array field value; non-string entries are skipped.
    pub fn str_array(&self, name: &str) -> Vec<String> {
        self.fields
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the field exists at all, regardless of type.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(fields: Fields) -> Document {
        Document {
            path: DocPath::parse("users/u1").unwrap(),
            fields,
            revision: 1,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_typed_field_access() {
        let doc = doc(Fields::from([
            ("name".to_string(), json!("ada")),
            ("points".to_string(), json!(42)),
            ("active".to_string(), json!(true)),
            ("tags".to_string(), json!(["a", "b", 3])),
        ]));

        assert_eq!(doc.str_field("name"), Some("ada"));
        assert_eq!(doc.i64_field("points"), Some(42));
        assert_eq!(doc.bool_field("active"), Some(true));
        assert_eq!(doc.str_array("tags"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_missing_and_mistyped_fields() {
        let doc = doc(Fields::from([("points".to_string(), json!("many"))]));

        assert_eq!(doc.i64_field("points"), None);
        assert_eq!(doc.str_field("absent"), None);
        assert!(doc.str_array("absent").is_empty());
        assert!(doc.has_field("points"));
        assert!(!doc.has_field("absent"));
    }
}
