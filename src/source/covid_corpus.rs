//! PAHO journal corpus of COVID-19 research articles
//!
//! Every page of the journal is on-topic, so classification only gathers
//! article links. No session is needed.

use super::{hrefs, Classification, FetchedPage, SourceCrawler};
use crate::config::TopicConfig;
use scraper::Html;

#[derive(Debug, Default)]
pub struct CovidCorpusCrawler;

impl CovidCorpusCrawler {
    pub fn new() -> Self {
        Self
    }
}

impl SourceCrawler for CovidCorpusCrawler {
    fn name(&self) -> &'static str {
        "COVIDCorpus"
    }

    fn links_are_articles(&self) -> bool {
        true
    }

    fn classify(&self, page: &FetchedPage, _topic: &TopicConfig) -> Classification {
        let document = Html::parse_document(&page.html);
        let mut links: Vec<String> = Vec::new();

        for link in hrefs(&document, r#"[href*="/journal/en/articles"]"#, page) {
            if !links.contains(&link) {
                links.push(link);
            }
        }

        Classification {
            is_topical: true,
            links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::page;

    #[test]
    fn test_journal_links_resolved_against_site() {
        let html = r#"
            <html><body>
                <a href="/journal/en/articles/masks-and-transmission">Masks</a>
                <a href="/journal/en/articles/masks-and-transmission">Masks again</a>
                <a href="/journal/en/issues/42">Issue</a>
            </body></html>
        "#;

        let result = CovidCorpusCrawler.classify(
            &page("https://www.paho.org/journal/en/issues/41", html),
            &TopicConfig::default(),
        );
        assert!(result.is_topical);
        assert_eq!(
            result.links,
            vec!["https://www.paho.org/journal/en/articles/masks-and-transmission".to_string()]
        );
        assert!(CovidCorpusCrawler.links_are_articles());
        assert!(!CovidCorpusCrawler.requires_session());
    }
}
