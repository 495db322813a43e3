//! Key range predicates evaluated against encoded index keys.

use docview_codec::Collation;
use std::cmp::Ordering;

/// One end of a key range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBound {
    /// Encoded bound key.
    pub key: Vec<u8>,
    /// Whether rows whose key equals the bound are included.
    pub inclusive: bool,
    /// Tie-break on document ID for rows whose key equals the bound.
    ///
    /// Only consulted for inclusive bounds.
    pub doc_id: Option<String>,
}

impl KeyBound {
    /// Creates an inclusive bound.
    #[must_use]
    pub fn inclusive(key: Vec<u8>) -> Self {
        Self {
            key,
            inclusive: true,
            doc_id: None,
        }
    }

    /// Creates an exclusive bound.
    #[must_use]
    pub fn exclusive(key: Vec<u8>) -> Self {
        Self {
            key,
            inclusive: false,
            doc_id: None,
        }
    }

    /// Sets the document ID tie-break.
    #[must_use]
    pub fn with_doc_id(mut self, doc_id: Option<String>) -> Self {
        self.doc_id = doc_id;
        self
    }
}

/// A range of index keys under a given collation.
///
/// The same [`Collation`] must order the rows being scanned, otherwise the
/// predicate and the row order disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Lower bound, `None` for unbounded.
    pub min: Option<KeyBound>,
    /// Upper bound, `None` for unbounded.
    pub max: Option<KeyBound>,
    /// Collation used to compare keys against the bounds.
    pub collation: Collation,
}

impl KeyRange {
    /// A range matching every key.
    #[must_use]
    pub fn all(collation: Collation) -> Self {
        Self {
            min: None,
            max: None,
            collation,
        }
    }

    /// A range matching exactly one key.
    #[must_use]
    pub fn exact(key: Vec<u8>, collation: Collation) -> Self {
        Self {
            min: Some(KeyBound::inclusive(key.clone())),
            max: Some(KeyBound::inclusive(key)),
            collation,
        }
    }

    /// Sets the lower bound.
    #[must_use]
    pub fn with_min(mut self, bound: Option<KeyBound>) -> Self {
        self.min = bound;
        self
    }

    /// Sets the upper bound.
    #[must_use]
    pub fn with_max(mut self, bound: Option<KeyBound>) -> Self {
        self.max = bound;
        self
    }

    /// Returns whether a row with this key and document ID lies in the range.
    pub fn contains(&self, key: &[u8], doc_id: &str) -> bool {
        if let Some(min) = &self.min {
            match self.collation.compare(key, &min.key) {
                Ordering::Less => return false,
                Ordering::Equal => {
                    if !min.inclusive {
                        return false;
                    }
                    if let Some(min_doc) = &min.doc_id {
                        if doc_id < min_doc.as_str() {
                            return false;
                        }
                    }
                }
                Ordering::Greater => {}
            }
        }
        if let Some(max) = &self.max {
            match self.collation.compare(key, &max.key) {
                Ordering::Greater => return false,
                Ordering::Equal => {
                    if !max.inclusive {
                        return false;
                    }
                    if let Some(max_doc) = &max.doc_id {
                        if doc_id > max_doc.as_str() {
                            return false;
                        }
                    }
                }
                Ordering::Less => {}
            }
        }
        true
    }

    /// Returns whether the range can match nothing.
    ///
    /// Only detects ranges whose lower key collates above the upper key.
    pub fn is_empty(&self) -> bool {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => match self.collation.compare(&min.key, &max.key) {
                Ordering::Greater => true,
                Ordering::Equal => !(min.inclusive && max.inclusive),
                Ordering::Less => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docview_codec::encode;
    use serde_json::json;

    fn key(v: serde_json::Value) -> Vec<u8> {
        encode(&v)
    }

    #[test]
    fn unbounded_contains_everything() {
        let range = KeyRange::all(Collation::Unicode);
        assert!(range.contains(&key(json!(null)), "a"));
        assert!(range.contains(&key(json!({"x": 1})), "b"));
    }

    #[test]
    fn exclusive_end_drops_equal_key() {
        let range = KeyRange::all(Collation::Unicode)
            .with_min(Some(KeyBound::inclusive(key(json!("b")))))
            .with_max(Some(KeyBound::exclusive(key(json!("d")))));
        assert!(!range.contains(&key(json!("a")), "x"));
        assert!(range.contains(&key(json!("b")), "x"));
        assert!(range.contains(&key(json!("c")), "x"));
        assert!(!range.contains(&key(json!("d")), "x"));
    }

    #[test]
    fn doc_id_breaks_ties_on_equal_keys() {
        let range = KeyRange::all(Collation::Unicode)
            .with_min(Some(
                KeyBound::inclusive(key(json!(5))).with_doc_id(Some("doc2".into())),
            ))
            .with_max(Some(
                KeyBound::inclusive(key(json!(7))).with_doc_id(Some("doc4".into())),
            ));
        assert!(!range.contains(&key(json!(5)), "doc1"));
        assert!(range.contains(&key(json!(5)), "doc2"));
        assert!(range.contains(&key(json!(6)), "doc0"));
        assert!(range.contains(&key(json!(7)), "doc4"));
        assert!(!range.contains(&key(json!(7)), "doc5"));
    }

    #[test]
    fn bounds_use_collation() {
        let range = KeyRange::all(Collation::Unicode)
            .with_max(Some(KeyBound::inclusive(key(json!("a")))));
        assert!(!range.contains(&key(json!("A")), "x"));

        let range = KeyRange::all(Collation::Ascii)
            .with_max(Some(KeyBound::inclusive(key(json!("a")))));
        assert!(range.contains(&key(json!("A")), "x"));
    }

    #[test]
    fn inverted_range_is_empty() {
        let range = KeyRange::all(Collation::Unicode)
            .with_min(Some(KeyBound::inclusive(key(json!(9)))))
            .with_max(Some(KeyBound::inclusive(key(json!(1)))));
        assert!(range.is_empty());
        assert!(!KeyRange::exact(key(json!(1)), Collation::Unicode).is_empty());
    }
}
