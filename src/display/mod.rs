//! Publication list rendering

mod options;
mod pipeline;
mod sort;
mod template;

pub use options::{decode_entities, DisplayDefaults, DisplayOptions, DisplayRequest, SortDirection};
pub use pipeline::{paginate, PresentationPipeline, PLACEHOLDER};
pub use sort::{compare_publications, sort_publications};
pub use template::{escape_html, CardTemplate, PublicationTemplate};
