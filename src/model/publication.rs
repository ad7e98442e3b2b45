//! Publication records as emitted by the scraper

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One scraped paper.
///
/// The known scalar fields are typed; anything else the scraper emits is
/// kept verbatim in `extra` so it survives a round-trip through the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, alias = "author", skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(
        default,
        alias = "pub_year",
        deserialize_with = "lenient_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub year: Option<i64>,
    #[serde(default, alias = "journal", skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(
        default,
        alias = "num_citations",
        alias = "citations",
        deserialize_with = "lenient_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub cites: Option<i64>,
    #[serde(default, alias = "pub_url", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        default,
        rename = "abstract",
        skip_serializing_if = "Option::is_none"
    )]
    pub summary: Option<String>,
    /// Fields the scraper emits that have no typed counterpart
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Publication {
    /// Create a publication with only a title set
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_authors(mut self, authors: impl Into<String>) -> Self {
        self.authors = Some(authors.into());
        self
    }

    pub fn with_year(mut self, year: i64) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    pub fn with_cites(mut self, cites: i64) -> Self {
        self.cites = Some(cites);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Typed lookup of a sortable field. `None` means the field is absent.
    pub fn sort_key(&self, field: SortField) -> Option<SortKey<'_>> {
        match field {
            SortField::Title => self.title.as_deref().map(SortKey::Text),
            SortField::Authors => self.authors.as_deref().map(SortKey::Text),
            SortField::Year => self.year.map(SortKey::Number),
            SortField::Venue => self.venue.as_deref().map(SortKey::Text),
            SortField::Cites => self.cites.map(SortKey::Number),
            SortField::Url => self.url.as_deref().map(SortKey::Text),
            SortField::Abstract => self.summary.as_deref().map(SortKey::Text),
        }
    }
}

/// The scalar fields a publication list can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Title,
    Authors,
    Year,
    Venue,
    Cites,
    Url,
    Abstract,
}

impl SortField {
    pub const ALL: [SortField; 7] = [
        SortField::Title,
        SortField::Authors,
        SortField::Year,
        SortField::Venue,
        SortField::Cites,
        SortField::Url,
        SortField::Abstract,
    ];

    /// Field name as it appears in the serialized cache
    pub fn name(&self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Authors => "authors",
            SortField::Year => "year",
            SortField::Venue => "venue",
            SortField::Cites => "cites",
            SortField::Url => "url",
            SortField::Abstract => "abstract",
        }
    }

    /// Case-insensitive lookup, ignoring surrounding whitespace
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|f| f.name() == wanted)
    }
}

impl std::fmt::Display for SortField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A borrowed field value ready for comparison.
///
/// A given field always yields the same variant, so the derived ordering
/// never has to compare text against numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey<'a> {
    Number(i64),
    Text(&'a str),
}

/// Accept integers, integral floats, numeric strings and null.
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected an integer, found {}", n))),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("expected an integer, found {:?}", s)))
        }
        Some(other) => Err(D::Error::custom(format!(
            "expected an integer, found {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_scraper_field_names() {
        let publication: Publication = serde_json::from_value(json!({
            "title": "Attention",
            "author": "A. Vaswani and N. Shazeer",
            "pub_year": "2017",
            "journal": "NeurIPS",
            "num_citations": 90000,
            "pub_url": "https://example.org/paper"
        }))
        .unwrap();

        assert_eq!(publication.title.as_deref(), Some("Attention"));
        assert_eq!(publication.authors.as_deref(), Some("A. Vaswani and N. Shazeer"));
        assert_eq!(publication.year, Some(2017));
        assert_eq!(publication.venue.as_deref(), Some("NeurIPS"));
        assert_eq!(publication.cites, Some(90000));
        assert_eq!(publication.url.as_deref(), Some("https://example.org/paper"));
        assert!(publication.extra.is_empty());
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let publication: Publication = serde_json::from_value(json!({
            "title": "Paper",
            "author_pub_id": "abc:123",
            "cites_per_year": {"2020": 3}
        }))
        .unwrap();

        assert_eq!(publication.extra.len(), 2);

        let encoded = serde_json::to_string(&publication).unwrap();
        let decoded: Publication = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, publication);
    }

    #[test]
    fn null_and_blank_numbers_are_absent() {
        let publication: Publication =
            serde_json::from_value(json!({"title": "T", "cites": null, "year": " "})).unwrap();
        assert_eq!(publication.cites, None);
        assert_eq!(publication.year, None);
    }

    #[test]
    fn non_numeric_count_is_rejected() {
        let result: Result<Publication, _> =
            serde_json::from_value(json!({"title": "T", "cites": "many"}));
        assert!(result.is_err());
    }

    #[test]
    fn sort_field_lookup_is_case_insensitive() {
        assert_eq!(SortField::from_name(" Cites "), Some(SortField::Cites));
        assert_eq!(SortField::from_name("ABSTRACT"), Some(SortField::Abstract));
        assert_eq!(SortField::from_name("publications"), None);
        assert_eq!(SortField::from_name(""), None);
    }

    #[test]
    fn sort_key_reflects_presence() {
        let publication = Publication::titled("T").with_cites(4);
        assert_eq!(publication.sort_key(SortField::Cites), Some(SortKey::Number(4)));
        assert_eq!(publication.sort_key(SortField::Title), Some(SortKey::Text("T")));
        assert_eq!(publication.sort_key(SortField::Year), None);
    }
}
