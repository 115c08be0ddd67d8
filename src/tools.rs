//! # Tools Module
//!
//! The `web_search` tool the analyst agent calls while researching a topic.
//! It queries DuckDuckGo's HTML endpoint (no API key needed) and returns a
//! numbered list of titles and URLs the agent can cite.

use reqwest::Client;
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://html.duckduckgo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// =============================================================================
// ERRORS
// =============================================================================
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Failed to perform web search: {0}")]
    SearchFailed(String),

    #[error("Rate limited by search provider, please wait")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

// =============================================================================
// SEARCH RESULT
// =============================================================================
/// A single web search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
}

// =============================================================================
// WEB SEARCH TOOL
// =============================================================================
#[derive(Debug, Clone)]
pub struct WebSearchTool {
    client: Client,
    base_url: String,
    max_results: usize,
    timeout: Duration,
    /// Pause before each request to stay under the provider's rate limit
    throttle: Duration,
}

impl WebSearchTool {
    pub fn new(max_results: usize) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, max_results)
    }

    /// Point the tool at another host (used for tests)
    pub fn with_base_url(base_url: impl Into<String>, max_results: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_results,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            throttle: Duration::from_millis(500),
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        info!(query = %query, "Performing web search");

        if !self.throttle.is_zero() {
            tokio::time::sleep(self.throttle).await;
        }

        let url = format!("{}/html/?q={}", self.base_url, urlencoding::encode(query));
        debug!(url = %url, "Fetching search results");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            return Err(SearchError::SearchFailed(format!("HTTP {}", status)));
        }

        let body = response.text().await?;
        let results = parse_results(&body, self.max_results);

        if results.is_empty() {
            warn!(query = %query, "No search results found");
        } else {
            info!(query = %query, count = results.len(), "Search completed");
        }

        Ok(results)
    }
}

/// Extract result links from a DuckDuckGo HTML page.
///
/// Result anchors link through a redirect whose `uddg` parameter carries the
/// target URL; the anchor text is the result title.
fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();
    let mut seen = HashSet::new();

    for segment in html.split("uddg=").skip(1) {
        if results.len() >= max_results {
            break;
        }

        let Some(end) = segment.find(['&', '"', '\'']) else {
            continue;
        };
        let Ok(url) = urlencoding::decode(&segment[..end]) else {
            continue;
        };
        let url = url.into_owned();

        if !url.starts_with("http") || url.contains("duckduckgo.com") || !seen.insert(url.clone()) {
            continue;
        }

        let title = anchor_text(&segment[end..])
            .or_else(|| extract_domain(&url))
            .unwrap_or_else(|| "Result".to_string());

        results.push(SearchResult { title, url });
    }

    results
}

/// Text between the end of the opening tag and the closing `</a>`
fn anchor_text(rest: &str) -> Option<String> {
    let start = rest.find('>')? + 1;
    let len = rest[start..].find("</a>")?;
    let text = strip_tags(&rest[start..start + len]);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&amp;", "&").replace("&#x27;", "'").replace("&quot;", "\"")
}

fn extract_domain(url: &str) -> Option<String> {
    url.split("//")
        .nth(1)?
        .split('/')
        .next()
        .map(|s| s.to_string())
}

pub fn format_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No results found for: {}", query);
    }

    let formatted = results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. **{}**\n   URL: {}", i + 1, r.title, r.url))
        .collect::<Vec<_>>()
        .join("\n");

    format!("## Search Results for: {}\n\n{}", query, formatted)
}

// =============================================================================
// RIG TOOL TRAIT IMPLEMENTATION
// =============================================================================
#[derive(Debug, Deserialize, Serialize)]
pub struct SearchArgs {
    /// The search query to execute
    pub query: String,
}

impl Tool for WebSearchTool {
    const NAME: &'static str = "web_search";

    type Args = SearchArgs;
    type Output = String;
    type Error = SearchError;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Search the web for current information about a company: news, \
                          products, leadership, financials, competitors."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query, including the company name"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let results = self.search(&args.query).await?;
        Ok(format_results(&args.query, &results))
    }
}
