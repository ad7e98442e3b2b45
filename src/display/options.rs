//! Display attribute parsing
//!
//! Attributes arrive as untrusted strings. Each one is entity-decoded and
//! trimmed, then validated; anything invalid falls back to the configured
//! default instead of failing the render.

use crate::model::SortField;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn name(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    /// Case-insensitive lookup, ignoring surrounding whitespace
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    /// Orient an ascending comparison
    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Configured fallbacks for display attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayDefaults {
    pub number_papers_to_show: usize,
    pub sort_by_field: SortField,
    pub sort_by_direction: SortDirection,
}

impl Default for DisplayDefaults {
    fn default() -> Self {
        Self {
            number_papers_to_show: 10,
            sort_by_field: SortField::Cites,
            sort_by_direction: SortDirection::Desc,
        }
    }
}

/// Raw display attributes, as an embedding page passes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayRequest {
    pub number_papers_to_show: Option<String>,
    pub sort_by_field: Option<String>,
    pub sort_by_direction: Option<String>,
}

impl DisplayRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(mut self, value: impl Into<String>) -> Self {
        self.number_papers_to_show = Some(value.into());
        self
    }

    pub fn sort_by(mut self, value: impl Into<String>) -> Self {
        self.sort_by_field = Some(value.into());
        self
    }

    pub fn direction(mut self, value: impl Into<String>) -> Self {
        self.sort_by_direction = Some(value.into());
        self
    }
}

/// Validated display settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayOptions {
    /// Number of publications to show, at least 1
    pub count: usize,
    pub sort_field: SortField,
    pub direction: SortDirection,
}

impl DisplayOptions {
    pub fn resolve(request: &DisplayRequest, defaults: &DisplayDefaults) -> Self {
        let attr = |value: &Option<String>| value.as_deref().map(decode_entities);

        let count = attr(&request.number_papers_to_show)
            .and_then(|raw| parse_count(&raw))
            .unwrap_or(defaults.number_papers_to_show)
            .max(1);

        let sort_field = attr(&request.sort_by_field)
            .and_then(|raw| SortField::from_name(&raw))
            .unwrap_or(defaults.sort_by_field);

        let direction = attr(&request.sort_by_direction)
            .and_then(|raw| SortDirection::from_name(&raw))
            .unwrap_or(defaults.sort_by_direction);

        Self {
            count,
            sort_field,
            direction,
        }
    }
}

impl From<&DisplayDefaults> for DisplayOptions {
    fn from(defaults: &DisplayDefaults) -> Self {
        Self::resolve(&DisplayRequest::default(), defaults)
    }
}

/// Accept any finite number, truncated toward zero; reject counts below 1.
fn parse_count(raw: &str) -> Option<usize> {
    let value: f64 = raw.trim().parse().ok()?;
    if !value.is_finite() || value < 1.0 {
        return None;
    }
    Some(value.trunc() as usize)
}

/// Decode the handful of HTML entities an editor inserts into attributes.
pub fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
