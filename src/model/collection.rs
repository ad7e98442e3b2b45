//! Ordered record containers

use super::{Author, Publication};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// An insertion-ordered list of records.
///
/// No uniqueness constraint: adding the same record twice keeps both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection<T> {
    items: Vec<T>,
}

/// Authors decoded from one scrape
pub type AuthorCollection = Collection<Author>;

/// Publications, either owned by an author or merged for display
pub type PublicationCollection = Collection<Publication>;

impl<T> Collection<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn add(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn add_all(&mut self, items: impl IntoIterator<Item = T>) {
        self.items.extend(items);
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn values(&self) -> &[T] {
        &self.items
    }

    /// Stable sort: records comparing equal keep their insertion order.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.items.sort_by(compare);
    }
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for Collection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for Collection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Collection<Author> {
    /// Copy every author's publications into one flat collection,
    /// in encounter order within and across authors.
    pub fn merged_publications(&self) -> PublicationCollection {
        self.items
            .iter()
            .flat_map(|author| author.publications.iter().cloned())
            .collect()
    }

    /// Total publications across all authors
    pub fn publication_count(&self) -> usize {
        self.items.iter().map(|a| a.publications.count()).sum()
    }
}
