//! Author and publication records

mod author;
mod collection;
mod publication;

pub use author::Author;
pub use collection::{AuthorCollection, Collection, PublicationCollection};
pub use publication::{Publication, SortField, SortKey};
