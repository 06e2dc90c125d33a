//! The New York Times

use super::{hrefs, pattern, texts, Classification, FetchedPage, SourceCrawler};
use crate::config::TopicConfig;
use regex::Regex;
use scraper::Html;
use std::sync::LazyLock;

static ARTICLE_PATH: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"https://www\.nytimes\.com/\d{4}/\d{2}/\d{2}"));

/// Section label carried by pandemic coverage
const SECTION_LABEL: &str = "The Coronavirus Pandemic";

#[derive(Debug, Default)]
pub struct NyTimesCrawler;

impl NyTimesCrawler {
    pub fn new() -> Self {
        Self
    }
}

impl SourceCrawler for NyTimesCrawler {
    fn name(&self) -> &'static str {
        "NYTimes"
    }

    fn requires_session(&self) -> bool {
        true
    }

    /// Topical when the last span mentioning the section label reads exactly
    /// that label
    fn classify(&self, page: &FetchedPage, _topic: &TopicConfig) -> Classification {
        let document = Html::parse_document(&page.html);

        let is_topical = texts(&document, "span")
            .into_iter()
            .filter(|text| text.contains(SECTION_LABEL))
            .last()
            .is_some_and(|text| text.trim() == SECTION_LABEL);

        let links = hrefs(&document, "[href]", page)
            .into_iter()
            .filter(|url| ARTICLE_PATH.is_match(url))
            .collect();

        Classification { is_topical, links }
    }
}
