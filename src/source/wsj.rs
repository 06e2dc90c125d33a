//! The Wall Street Journal

use super::{hrefs, pattern, texts, Classification, FetchedPage, SourceCrawler};
use crate::config::TopicConfig;
use regex::Regex;
use scraper::Html;
use std::sync::LazyLock;

static ARTICLE_PATH: LazyLock<Regex> = LazyLock::new(|| pattern(r"wsj\.com/articles/"));

#[derive(Debug, Default)]
pub struct WsjCrawler;

impl WsjCrawler {
    pub fn new() -> Self {
        Self
    }
}

impl SourceCrawler for WsjCrawler {
    fn name(&self) -> &'static str {
        "WSJ"
    }

    fn requires_session(&self) -> bool {
        true
    }

    /// Topical when any `h4` mentions the coronavirus
    fn classify(&self, page: &FetchedPage, _topic: &TopicConfig) -> Classification {
        let document = Html::parse_document(&page.html);

        let is_topical = texts(&document, "h4")
            .iter()
            .any(|text| text.contains("Coronavirus"));

        let links = hrefs(&document, r#"a[href*="wsj.com/articles"]"#, page)
            .into_iter()
            .filter(|url| ARTICLE_PATH.is_match(url))
            .collect();

        Classification { is_topical, links }
    }
}
