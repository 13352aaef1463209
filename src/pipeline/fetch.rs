//! Web page retrieval and plain-text extraction.

use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// Extracted page text is bounded so a pathological page cannot blow
/// up the summarization request.
pub const PAGE_TEXT_LIMIT: usize = 10_000;

/// Seam the pipeline uses; implemented by [`HttpPageFetcher`] and by
/// test doubles. Returns the raw response body.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> PipelineResult<String>;
}

pub struct HttpPageFetcher {
    http: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http }
    }
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> PipelineResult<String> {
        debug!("Fetching page {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Remote(format!("page fetch failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Remote(format!(
                "page fetch returned {}",
                status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| PipelineError::Remote(format!("page body unreadable: {}", e)))
    }
}

/// Strip markup down to readable text: script/style blocks removed,
/// tags dropped, common entities decoded, whitespace collapsed,
/// truncated to `limit` characters.
pub fn extract_page_text(html: &str, limit: usize) -> String {
    // Compiled per call; this runs once per pipeline stage.
    let blocks = Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>")
        .expect("static regex");
    let tags = Regex::new(r"(?s)<[^>]*>").expect("static regex");
    let whitespace = Regex::new(r"\s+").expect("static regex");

    let text = blocks.replace_all(html, " ");
    let text = tags.replace_all(&text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let text = whitespace.replace_all(&text, " ");
    let text = text.trim();

    if text.chars().count() > limit {
        text.chars().take(limit).collect()
    } else {
        text.to_string()
    }
}
