//! HTTP client for the paginated upstream article feed.

use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;

use crate::error::{FetchError, PollError};

/// Destination label for outgoing-request metrics.
pub const UPSTREAM_DESTINATION: &str = "articleservice";

/// Articles requested per page.
pub const PAGE_SIZE: u32 = 2;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PollError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(PollError::Client)?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn page_url(&self, page: u32) -> String {
        format!(
            "{}/?page={}&pageSize={}",
            self.base_url.trim_end_matches('/'),
            page,
            PAGE_SIZE
        )
    }

    /// GET one page. Anything but 200 with a fully-read body is an error.
    pub async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.http.get(url).send().await.map_err(FetchError::Transport)?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.bytes().await.map_err(FetchError::Body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url() {
        let client = UpstreamClient::new("http://feed.local/content/articles").unwrap();
        assert_eq!(
            client.page_url(3),
            "http://feed.local/content/articles/?page=3&pageSize=2"
        );
    }

    #[test]
    fn test_page_url_trailing_slash() {
        let client = UpstreamClient::new("http://feed.local/").unwrap();
        assert_eq!(client.page_url(0), "http://feed.local/?page=0&pageSize=2");
    }
}
