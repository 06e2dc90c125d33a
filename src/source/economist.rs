//! The Economist

use super::{hrefs, pattern, texts, Classification, FetchedPage, SourceCrawler};
use crate::config::TopicConfig;
use regex::Regex;
use scraper::Html;
use std::sync::LazyLock;

/// Dated article paths: economist.com/<section>/YYYY/MM/DD/...
static ARTICLE_PATH: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"economist\.com/.+/\d{4}/\d{2}/\d{2}"));

const HEADLINE_SELECTORS: [&str; 3] = [
    ".article__description",
    ".article__headline",
    ".article__subheadline",
];

#[derive(Debug, Default)]
pub struct EconomistCrawler;

impl EconomistCrawler {
    pub fn new() -> Self {
        Self
    }
}

impl SourceCrawler for EconomistCrawler {
    fn name(&self) -> &'static str {
        "Economist"
    }

    fn requires_session(&self) -> bool {
        true
    }

    /// Topical when a headline, subheadline or description mentions a keyword
    fn classify(&self, page: &FetchedPage, topic: &TopicConfig) -> Classification {
        let document = Html::parse_document(&page.html);

        let headlines = HEADLINE_SELECTORS
            .iter()
            .flat_map(|css| texts(&document, css))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let is_topical = topic
            .keywords
            .iter()
            .any(|keyword| headlines.contains(&keyword.to_lowercase()));

        let links = hrefs(&document, "[href]", page)
            .into_iter()
            .filter(|url| ARTICLE_PATH.is_match(url))
            .collect();

        Classification { is_topical, links }
    }
}
