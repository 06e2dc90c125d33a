//! Article extraction from fetched HTML
//!
//! Metadata comes from OpenGraph and standard meta tags; the body is the
//! paragraph text inside `<article>` (or every `<p>` when the page has none).

use crate::source::FetchedPage;
use crate::store::Article;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Turns a fetched page into structured article fields
pub trait ArticleExtractor: Send + Sync {
    fn extract(&self, page: &FetchedPage) -> Article;
}

/// `scraper`-based readability extraction
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadabilityExtractor;

impl ArticleExtractor for ReadabilityExtractor {
    fn extract(&self, page: &FetchedPage) -> Article {
        let document = Html::parse_document(&page.html);
        let base_url = Url::parse(&page.final_url).ok();

        let canonical = first_attr(&document, "link[rel='canonical'][href]", "href")
            .or_else(|| meta(&document, "og:url"));

        Article {
            url: canonical.and_then(|href| match &base_url {
                Some(base) => resolve_link(&href, base),
                None => Some(href),
            }),
            title: meta(&document, "og:title")
                .or_else(|| first_text(&document, "title"))
                .or_else(|| first_text(&document, "h1")),
            text: extract_body(&document),
            author: meta(&document, "author").or_else(|| meta(&document, "article:author")),
            published: meta(&document, "article:published_time")
                .or_else(|| first_attr(&document, "time[datetime]", "datetime")),
            description: meta(&document, "og:description")
                .or_else(|| meta(&document, "description")),
            image: meta(&document, "og:image"),
            site_name: meta(&document, "og:site_name"),
            links: base_url
                .map(|base| extract_links(&document, &base))
                .unwrap_or_default(),
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .map(element_text)
        .find(|s| !s.is_empty())
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .filter_map(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Reads `<meta property=..>` or `<meta name=..>` content
fn meta(document: &Html, key: &str) -> Option<String> {
    first_attr(
        document,
        &format!("meta[property='{}'][content]", key),
        "content",
    )
    .or_else(|| first_attr(document, &format!("meta[name='{}'][content]", key), "content"))
}

fn extract_body(document: &Html) -> String {
    let paragraphs = |css: &str| -> Vec<String> {
        Selector::parse(css)
            .map(|selector| {
                document
                    .select(&selector)
                    .map(element_text)
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut body = paragraphs("article p");
    if body.is_empty() {
        body = paragraphs("p");
    }
    body.join("\n\n")
}

/// Extracts all followable links, absolute and de-duplicated in page order
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            // Skip if it has the download attribute
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(absolute_url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                if !links.contains(&absolute_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only anchors
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
        Some(absolute_url.to_string())
    } else {
        None
    }
}
