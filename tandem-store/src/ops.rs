//! Write modes and field operations.

use serde_json::Value;

use crate::document::Fields;

/// How `set` treats fields already present on the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Replace the whole document
    Overwrite,
    /// Keep existing fields not named in the write
    Merge,
}

/// A single-field mutation applied by `update`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Set the field to the given value
    Set(Value),
    /// Add to the current integer value; a missing or non-integer field
    /// counts as zero
    Increment(i64),
    /// Append values not already present; a missing or non-array field
    /// counts as an empty array
    ArrayUnion(Vec<Value>),
}

/// Named field operations for one `update` call.
pub type Updates = Vec<(String, FieldOp)>;

/// Apply one operation to a field map.
pub fn apply_op(fields: &mut Fields, name: &str, op: &FieldOp) {
    match op {
        FieldOp::Set(value) => {
            fields.insert(name.to_string(), value.clone());
        }
        FieldOp::Increment(delta) => {
            let current = fields.get(name).and_then(Value::as_i64).unwrap_or(0);
            fields.insert(name.to_string(), Value::from(current + delta));
        }
        FieldOp::ArrayUnion(values) => {
            let mut current = fields
                .get(name)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for value in values {
                if !current.contains(value) {
                    current.push(value.clone());
                }
            }
            fields.insert(name.to_string(), Value::Array(current));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_increment_treats_missing_as_zero() {
        let mut fields = Fields::new();
        apply_op(&mut fields, "points", &FieldOp::Increment(5));
        apply_op(&mut fields, "points", &FieldOp::Increment(-2));
        assert_eq!(fields.get("points"), Some(&json!(3)));
    }

    #[test]
    fn test_increment_resets_non_integer() {
        let mut fields = Fields::from([("points".to_string(), json!("broken"))]);
        apply_op(&mut fields, "points", &FieldOp::Increment(7));
        assert_eq!(fields.get("points"), Some(&json!(7)));
    }

    #[test]
    fn test_array_union_skips_duplicates() {
        let mut fields = Fields::from([("members".to_string(), json!(["a"]))]);
        apply_op(
            &mut fields,
            "members",
            &FieldOp::ArrayUnion(vec![json!("a"), json!("b")]),
        );
        assert_eq!(fields.get("members"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn test_array_union_creates_missing_field() {
        let mut fields = Fields::new();
        apply_op(&mut fields, "members", &FieldOp::ArrayUnion(vec![json!("a")]));
        assert_eq!(fields.get("members"), Some(&json!(["a"])));
    }
}
