//! Scraped Google Scholar profiles

use super::{Publication, PublicationCollection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scraped profile and the publications it owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// Scraper-assigned Google Scholar user id
    #[serde(alias = "scholar_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub publications: PublicationCollection,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Author {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            affiliation: None,
            publications: PublicationCollection::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_publications(mut self, publications: impl IntoIterator<Item = Publication>) -> Self {
        self.publications.add_all(publications);
        self
    }

    pub fn has_publications(&self) -> bool {
        !self.publications.is_empty()
    }
}
