//! Scraper output decoding
//!
//! The scraper prints a JSON array with one object per Google Scholar
//! profile. Each element is validated on its own: an element that does not
//! fit the [`Author`] shape, or that carries no publications, is skipped and
//! the rest are kept. Only a top-level parse failure is an error.

use crate::model::{Author, AuthorCollection};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors that abort decoding of a whole document
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed scraper output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("scraper output must be a JSON array, found {0}")]
    NotAnArray(&'static str),
}

/// Why a single scraper entry was left out of the decoded collection
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The element did not map onto an author record
    Malformed(String),
    /// The author decoded but owns no publications
    NoPublications(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed entry: {}", msg),
            Self::NoPublications(id) => write!(f, "author {} has no publications", id),
        }
    }
}

/// Decode raw scraper stdout into authors that own at least one publication,
/// in input order.
pub fn decode_results(raw: &str) -> Result<AuthorCollection, DecodeError> {
    let value: Value = serde_json::from_str(raw.trim())?;
    let elements = match value {
        Value::Array(elements) => elements,
        other => return Err(DecodeError::NotAnArray(json_kind(&other))),
    };

    let total = elements.len();
    let authors: AuthorCollection = elements
        .into_iter()
        .enumerate()
        .filter_map(|(index, element)| match validate_author(element) {
            Ok(author) => Some(author),
            Err(reason) => {
                debug!(index, %reason, "skipping scraper entry");
                None
            }
        })
        .collect();

    debug!(total, kept = authors.count(), "decoded scraper output");
    Ok(authors)
}

/// Map one scraper entry onto an [`Author`].
pub fn validate_author(element: Value) -> Result<Author, SkipReason> {
    if !element.is_object() {
        return Err(SkipReason::Malformed(format!(
            "expected an object, found {}",
            json_kind(&element)
        )));
    }

    let author: Author =
        serde_json::from_value(element).map_err(|e| SkipReason::Malformed(e.to_string()))?;

    if !author.has_publications() {
        return Err(SkipReason::NoPublications(author.id));
    }

    Ok(author)
}

/// Encode a decoded collection for the serialized cache.
///
/// Output is deterministic: struct fields keep declaration order and extra
/// fields are stored in sorted maps.
pub fn encode_collection(authors: &AuthorCollection) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(authors)
}

/// Decode the serialized cache written by [`encode_collection`].
pub fn decode_collection(serialized: &str) -> Result<AuthorCollection, DecodeError> {
    Ok(serde_json::from_str(serialized)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn scraper_output() -> String {
        json!([
            {
                "id": "1iQtvdsAAAAJ",
                "name": "Ada Lovelace",
                "publications": [
                    {"title": "Notes on the Analytical Engine", "num_citations": 120, "pub_year": "1843"},
                    {"title": "Sketch", "num_citations": null}
                ]
            },
            {"id": "emptyAAAAAAJ", "publications": []},
            {"name": "no id at all", "publications": [{"title": "orphan"}]},
            "not an object",
            {
                "scholar_id": "dAKCYJgAAAAJ",
                "interests": ["compilers"],
                "publications": [{"title": "A Compiler", "cites": 7}]
            }
        ])
        .to_string()
    }

    #[test]
    fn keeps_valid_authors_in_input_order() {
        let authors = decode_results(&scraper_output()).unwrap();

        let ids: Vec<_> = authors.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["1iQtvdsAAAAJ", "dAKCYJgAAAAJ"]);
        assert_eq!(authors.get(0).unwrap().publications.count(), 2);
        assert_eq!(authors.get(1).unwrap().extra["interests"], json!(["compilers"]));
    }

    #[test]
    fn authors_without_publications_never_appear() {
        let raw = json!([
            {"id": "a", "publications": []},
            {"id": "b"},
            {"id": "c", "publications": [{"title": "kept"}]}
        ])
        .to_string();

        let authors = decode_results(&raw).unwrap();
        assert_eq!(authors.count(), 1);
        assert!(authors.iter().all(|a| a.has_publications()));
    }

    #[test]
    fn malformed_top_level_is_an_error() {
        assert!(matches!(
            decode_results("Traceback (most recent call last):"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode_results(r#"{"id": "x"}"#),
            Err(DecodeError::NotAnArray("an object"))
        ));
    }

    #[test]
    fn empty_array_decodes_to_empty_collection() {
        let authors = decode_results("  []\n").unwrap();
        assert!(authors.is_empty());
    }

    #[test]
    fn skip_reasons_are_explicit() {
        assert!(matches!(
            validate_author(json!(42)),
            Err(SkipReason::Malformed(_))
        ));
        assert_eq!(
            validate_author(json!({"id": "x", "publications": []})),
            Err(SkipReason::NoPublications("x".to_string()))
        );
    }

    #[test]
    fn encode_then_decode_preserves_authors_and_publications() {
        let first = decode_results(&scraper_output()).unwrap();
        let encoded = encode_collection(&first).unwrap();
        let second = decode_collection(&encoded).unwrap();

        let summarize = |authors: &AuthorCollection| -> BTreeSet<(String, String)> {
            authors
                .iter()
                .flat_map(|a| {
                    a.publications
                        .iter()
                        .map(move |p| (a.id.clone(), serde_json::to_string(p).unwrap()))
                })
                .collect()
        };

        assert_eq!(summarize(&first), summarize(&second));
        assert_eq!(first, second);
    }

    #[test]
    fn encoding_is_deterministic() {
        let authors = decode_results(&scraper_output()).unwrap();
        assert_eq!(
            encode_collection(&authors).unwrap(),
            encode_collection(&authors).unwrap()
        );
    }
}
