//! Typed document and collection paths.
//!
//! Paths alternate collection and document segments, so a document path
//! always has an even number of segments ("users/u1",
//! "topics/t1/pairs/p1") and a collection path an odd number
//! ("users", "topics/t1/pairs").

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Path to a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocPath(String);

/// Path to a collection of documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionPath(String);

fn segment_count(raw: &str) -> Result<usize> {
    if raw.is_empty() {
        return Err(StoreError::InvalidPath {
            path: raw.to_string(),
            reason: "empty path".to_string(),
        });
    }
    let mut count = 0;
    for segment in raw.split('/') {
        if segment.is_empty() {
            return Err(StoreError::InvalidPath {
                path: raw.to_string(),
                reason: "empty segment".to_string(),
            });
        }
        count += 1;
    }
    Ok(count)
}

impl DocPath {
    /// Parse a document path. Fails on empty segments or an odd segment
    /// count.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if segment_count(&raw)? % 2 != 0 {
            return Err(StoreError::InvalidPath {
                path: raw,
                reason: "document paths need an even number of segments".to_string(),
            });
        }
        Ok(Self(raw))
    }

    /// The document id (final segment).
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// A subcollection under this document.
    pub fn collection(&self, name: &str) -> Result<CollectionPath> {
        CollectionPath::parse(format!("{}/{}", self.0, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl CollectionPath {
    /// Parse a collection path. Fails on empty segments or an even
    /// segment count.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if segment_count(&raw)? % 2 == 0 {
            return Err(StoreError::InvalidPath {
                path: raw,
                reason: "collection paths need an odd number of segments".to_string(),
            });
        }
        Ok(Self(raw))
    }

    /// Path to a document in this collection.
    pub fn doc(&self, id: &str) -> Result<DocPath> {
        DocPath::parse(format!("{}/{}", self.0, id))
    }

    /// Whether the document is a direct child of this collection.
    pub fn contains(&self, doc: &DocPath) -> bool {
        match doc.as_str().rsplit_once('/') {
            Some((parent, _)) => parent == self.0,
            None => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_path_needs_even_segments() {
        assert!(DocPath::parse("users/u1").is_ok());
        assert!(DocPath::parse("topics/t1/pairs/p1").is_ok());
        assert!(DocPath::parse("users").is_err());
        assert!(DocPath::parse("topics/t1/pairs").is_err());
    }

    #[test]
    fn test_collection_path_needs_odd_segments() {
        assert!(CollectionPath::parse("users").is_ok());
        assert!(CollectionPath::parse("topics/t1/pairs").is_ok());
        assert!(CollectionPath::parse("users/u1").is_err());
    }

    #[test]
    fn test_rejects_empty_segments() {
        assert!(DocPath::parse("").is_err());
        assert!(DocPath::parse("users//u1").is_err());
        assert!(CollectionPath::parse("/users").is_err());
    }

    #[test]
    fn test_join_and_id() {
        let users = CollectionPath::parse("users").unwrap();
        let doc = users.doc("u1").unwrap();
        assert_eq!(doc.as_str(), "users/u1");
        assert_eq!(doc.id(), "u1");

        let rewards = doc.collection("rewards").unwrap();
        assert_eq!(rewards.as_str(), "users/u1/rewards");
    }

    #[test]
    fn test_contains_direct_children_only() {
        let pairs = CollectionPath::parse("topics/t1/pairs").unwrap();
        let child = DocPath::parse("topics/t1/pairs/p1").unwrap();
        let stranger = DocPath::parse("topics/t2/pairs/p1").unwrap();
        assert!(pairs.contains(&child));
        assert!(!pairs.contains(&stranger));
    }
}
