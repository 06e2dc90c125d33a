//! Page fetching
//!
//! Source crawlers never talk to the network themselves; they are handed a
//! [`FetchedPage`] produced by a [`PageFetcher`]. The HTTP implementation:
//! - Sends the configured user agent
//! - Attaches the source's session cookie when one is configured
//! - Reports a rejected session (401/403) as a session error, not a fetch error
//! - Follows redirects and records the final URL
//! - Rejects non-success statuses and non-HTML responses

use crate::config::FetchConfig;
use crate::{Result, RippleError};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;

/// A page as returned by the fetcher
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The URL that was requested
    pub url: String,
    /// URL after redirects; relative links resolve against this
    pub final_url: String,
    pub html: String,
}

/// Credentials sent with requests made on behalf of a source
#[derive(Debug, Clone)]
pub struct Session {
    /// Source the cookie belongs to
    pub source: String,
    pub cookie: String,
}

/// Retrieves rendered pages
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, session: Option<&Session>) -> Result<FetchedPage>;
}

/// Builds an HTTP client with proper configuration
pub fn build_http_client(config: &FetchConfig) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`PageFetcher`]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }
}

fn fetch_error(url: &str, message: impl Into<String>) -> RippleError {
    RippleError::Fetch {
        url: url.to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, session: Option<&Session>) -> Result<FetchedPage> {
        let mut request = self.client.get(url);
        if let Some(session) = session {
            request = request.header(COOKIE, session.cookie.as_str());
        }

        let response = request.send().await.map_err(|e| {
            // Classify error
            if e.is_timeout() {
                fetch_error(url, "Request timeout")
            } else if e.is_connect() {
                fetch_error(url, "Connection refused")
            } else {
                fetch_error(url, e.to_string())
            }
        })?;

        let status = response.status();
        if let Some(session) = session {
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(RippleError::Session {
                    source_name: session.source.clone(),
                    message: format!("session rejected with HTTP {}", status.as_u16()),
                });
            }
        }
        if !status.is_success() {
            return Err(fetch_error(url, format!("HTTP {}", status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.contains("text/html") {
            return Err(fetch_error(
                url,
                format!("Unexpected content type '{}'", content_type),
            ));
        }

        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| fetch_error(url, e.to_string()))?;

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            html,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&FetchConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_html_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p>hello</p>", "text/html"))
            .mount(&server)
            .await;

        let url = format!("{}/article", server.uri());
        let page = fetcher().fetch(&url, None).await.unwrap();
        assert_eq!(page.url, url);
        assert_eq!(page.final_url, url);
        assert_eq!(page.html, "<p>hello</p>");
    }

    #[tokio::test]
    async fn test_session_cookie_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/members"))
            .and(header("cookie", "sid=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p>in</p>", "text/html"))
            .mount(&server)
            .await;

        let session = Session {
            source: "WSJ".to_string(),
            cookie: "sid=abc".to_string(),
        };
        let url = format!("{}/members", server.uri());
        assert!(fetcher().fetch(&url, Some(&session)).await.is_ok());
        assert!(fetcher().fetch(&url, None).await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_session_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/members"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let session = Session {
            source: "Economist".to_string(),
            cookie: "sid=expired".to_string(),
        };
        let url = format!("{}/members", server.uri());

        let err = fetcher().fetch(&url, Some(&session)).await.err().unwrap();
        assert!(
            matches!(err, RippleError::Session { ref source_name, .. } if source_name == "Economist")
        );
        assert!(!err.is_retryable());

        // Without a session the same status is an ordinary fetch failure
        let err = fetcher().fetch(&url, None).await.err().unwrap();
        assert!(matches!(err, RippleError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_error_status_and_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data.json"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
            .mount(&server)
            .await;

        let gone = fetcher().fetch(&format!("{}/gone", server.uri()), None).await;
        assert!(matches!(gone, Err(RippleError::Fetch { ref message, .. }) if message == "HTTP 404"));

        let json = fetcher()
            .fetch(&format!("{}/data.json", server.uri()), None)
            .await;
        assert!(matches!(json, Err(RippleError::Fetch { .. })));
    }
}
