//! Field filters for collection queries.

use serde_json::Value;

use crate::document::Fields;

/// A filter over document fields.
///
/// An empty `And` matches everything, an empty `Or` matches nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals value
    Eq(String, Value),
    /// Every branch matches
    And(Vec<Filter>),
    /// At least one branch matches
    Or(Vec<Filter>),
}

impl Filter {
    /// Equality on a named field.
    pub fn field(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(name.into(), value.into())
    }

    /// Conjunction of filters.
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    /// Disjunction of filters.
    pub fn any(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    /// Whether a field map satisfies this filter.
    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Filter::Eq(name, value) => fields.get(name) == Some(value),
            Filter::And(branches) => branches.iter().all(|f| f.matches(fields)),
            Filter::Or(branches) => branches.iter().any(|f| f.matches(fields)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_eq_matches_exact_value() {
        let fields = Fields::from([("status".to_string(), json!("pending"))]);
        assert!(Filter::field("status", "pending").matches(&fields));
        assert!(!Filter::field("status", "completed").matches(&fields));
        assert!(!Filter::field("absent", "pending").matches(&fields));
    }

    #[test]
    fn test_nested_combinators() {
        let fields = Fields::from([
            ("active".to_string(), json!(true)),
            ("giver".to_string(), json!("u1")),
            ("receiver".to_string(), json!("open")),
        ]);

        let filter = Filter::all([
            Filter::field("active", true),
            Filter::any([
                Filter::field("giver", "open"),
                Filter::field("receiver", "open"),
            ]),
        ]);
        assert!(filter.matches(&fields));

        let closed = Filter::all([Filter::field("active", false)]);
        assert!(!closed.matches(&fields));
    }
}
