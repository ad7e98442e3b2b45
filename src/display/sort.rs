//! Publication ordering
//!
//! Ordering rules, for a chosen field and direction:
//! - both values present and different: compare values per direction
//! - both present and equal, or both missing: compare titles per direction
//! - exactly one missing: the missing one sorts last, in either direction
//!
//! Titles compare bytewise; a missing title compares as empty.

use super::options::SortDirection;
use crate::model::{Publication, PublicationCollection, SortField};
use std::cmp::Ordering;

pub fn compare_publications(
    a: &Publication,
    b: &Publication,
    field: SortField,
    direction: SortDirection,
) -> Ordering {
    match (a.sort_key(field), b.sort_key(field)) {
        (None, None) => compare_titles(a, b, direction),
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) if x == y => compare_titles(a, b, direction),
        (Some(x), Some(y)) => direction.apply(x.cmp(&y)),
    }
}

fn compare_titles(a: &Publication, b: &Publication, direction: SortDirection) -> Ordering {
    direction.apply(title_of(a).cmp(title_of(b)))
}

fn title_of(publication: &Publication) -> &str {
    publication.title.as_deref().unwrap_or("")
}

/// Stable sort in place
pub fn sort_publications(
    publications: &mut PublicationCollection,
    field: SortField,
    direction: SortDirection,
) {
    publications.sort_by(|a, b| compare_publications(a, b, field, direction));
}
