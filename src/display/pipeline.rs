//! Cache to HTML
//!
//! Load the cached authors, merge their publications into one list, sort,
//! take the requested window and render each item through the template.
//! The pipeline never fails outward: a missing, empty or unreadable cache
//! renders [`PLACEHOLDER`].

use super::options::{DisplayDefaults, DisplayOptions, DisplayRequest};
use super::sort::sort_publications;
use super::template::{CardTemplate, PublicationTemplate};
use crate::model::{Publication, PublicationCollection};
use crate::store::{ResultStore, StorageError, StorageResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shown instead of an empty list when there is nothing to display
pub const PLACEHOLDER: &str =
    "<p>Unfortunately, our researchers are currently on vacation...<br/>Please try again later.</p>";

const CONTAINER_OPEN: &str = "<div class='scholar-scraper-publications'>";
const CONTAINER_CLOSE: &str = "</div>";

/// The first `count` publications, minus any without a title.
///
/// Untitled items inside the window are dropped without pulling in
/// replacements from beyond it, so fewer than `count` may come back.
pub fn paginate(publications: &PublicationCollection, count: usize) -> Vec<&Publication> {
    publications
        .iter()
        .take(count)
        .filter(|p| p.title.is_some())
        .collect()
}

pub struct PresentationPipeline {
    store: ResultStore,
    template: Arc<dyn PublicationTemplate>,
    defaults: DisplayDefaults,
}

impl PresentationPipeline {
    /// Pipeline with the default card template
    pub fn new(store: ResultStore, defaults: DisplayDefaults) -> Self {
        Self {
            store,
            template: Arc::new(CardTemplate),
            defaults,
        }
    }

    pub fn with_template(mut self, template: Arc<dyn PublicationTemplate>) -> Self {
        self.template = template;
        self
    }

    pub fn defaults(&self) -> &DisplayDefaults {
        &self.defaults
    }

    /// Sorted and paginated publications for `options`.
    ///
    /// An empty cache is reported as `NoDataAvailable`.
    pub fn select(&self, options: &DisplayOptions) -> StorageResult<Vec<Publication>> {
        let authors = self.store.load()?;
        let mut publications = authors.merged_publications();
        if publications.is_empty() {
            return Err(StorageError::NoDataAvailable);
        }

        sort_publications(&mut publications, options.sort_field, options.direction);
        let window: Vec<Publication> = paginate(&publications, options.count)
            .into_iter()
            .cloned()
            .collect();

        debug!(
            total = publications.count(),
            shown = window.len(),
            field = %options.sort_field,
            direction = options.direction.name(),
            "selected publications"
        );
        Ok(window)
    }

    /// Render raw display attributes; invalid ones fall back to defaults.
    pub fn render(&self, request: &DisplayRequest) -> String {
        self.render_options(&DisplayOptions::resolve(request, &self.defaults))
    }

    pub fn render_options(&self, options: &DisplayOptions) -> String {
        let publications = match self.select(options) {
            Ok(publications) => publications,
            Err(StorageError::NoDataAvailable) => {
                debug!("no cached publications to display");
                return PLACEHOLDER.to_string();
            }
            Err(e) => {
                warn!(error = %e, "cannot read cached publications");
                return PLACEHOLDER.to_string();
            }
        };

        let mut html = String::from(CONTAINER_OPEN);
        for publication in &publications {
            html.push_str(&self.template.render(publication));
        }
        html.push_str(CONTAINER_CLOSE);
        html
    }
}
