//! Per-publication HTML fragments

use crate::model::Publication;

/// Renders one publication as an HTML fragment.
pub trait PublicationTemplate: Send + Sync {
    fn render(&self, publication: &Publication) -> String;
}

/// Default card: linked title, authors, venue and year, citation count.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardTemplate;

impl PublicationTemplate for CardTemplate {
    fn render(&self, publication: &Publication) -> String {
        let mut html = String::from("<article class='scholar-scraper-publication'>");

        let title = escape_html(publication.title.as_deref().unwrap_or(""));
        match publication.url.as_deref() {
            Some(url) => html.push_str(&format!(
                "<h3 class='scholar-scraper-publication-title'><a href='{}' target='_blank' rel='noopener'>{}</a></h3>",
                escape_html(url),
                title
            )),
            None => html.push_str(&format!(
                "<h3 class='scholar-scraper-publication-title'>{}</h3>",
                title
            )),
        }

        if let Some(authors) = publication.authors.as_deref() {
            html.push_str(&format!(
                "<p class='scholar-scraper-publication-authors'>{}</p>",
                escape_html(authors)
            ));
        }

        let venue_line = match (publication.venue.as_deref(), publication.year) {
            (Some(venue), Some(year)) => Some(format!("{}, {}", escape_html(venue), year)),
            (Some(venue), None) => Some(escape_html(venue)),
            (None, Some(year)) => Some(year.to_string()),
            (None, None) => None,
        };
        if let Some(line) = venue_line {
            html.push_str(&format!(
                "<p class='scholar-scraper-publication-venue'>{}</p>",
                line
            ));
        }

        if let Some(cites) = publication.cites {
            html.push_str(&format!(
                "<span class='scholar-scraper-publication-cites'>Cited by {}</span>",
                cites
            ));
        }

        html.push_str("</article>");
        html
    }
}

/// Escape text for use in HTML content and single- or double-quoted attributes
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
