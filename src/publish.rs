//! # Publish Module
//!
//! Report publishers:
//! - [`NotionPublisher`]: creates a Notion page under a parent page
//! - [`MarkdownPublisher`]: writes the report to `{output_dir}/{slug}.md`
//!
//! A publish failure never fails a run; the flow engine turns it into a
//! warning next to the report.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use research_flow::{CapabilityError, PageId, PublishCapability};

const NOTION_BASE_URL: &str = "https://api.notion.com";
const NOTION_VERSION: &str = "2022-06-28";

/// Notion rejects rich text longer than this
const MAX_TEXT_CHARS: usize = 2000;

/// Notion accepts at most this many children per request
const MAX_BLOCKS_PER_REQUEST: usize = 100;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// NOTION
// =============================================================================
pub struct NotionPublisher {
    client: Client,
    api_key: String,
    parent_page_id: String,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
}

impl NotionPublisher {
    pub fn new(api_key: impl Into<String>, parent_page_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            parent_page_id: parent_page_id.into(),
            base_url: NOTION_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Point the publisher at another host (used for tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        body: &Value,
    ) -> Result<reqwest::Response, CapabilityError> {
        let response = request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Notion-Version", NOTION_VERSION)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CapabilityError::timeout(e.to_string())
                } else {
                    CapabilityError::transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        match status.as_u16() {
            500..=599 => Err(CapabilityError::transport(format!(
                "Notion server error {}: {}",
                status, error_text
            ))),
            _ => Err(CapabilityError::rejected(format!(
                "Notion returned {}: {}",
                status, error_text
            ))),
        }
    }
}

#[async_trait]
impl PublishCapability for NotionPublisher {
    async fn publish(&self, document_title: &str, body: &str) -> Result<PageId, CapabilityError> {
        let blocks = markdown_blocks(body);
        let mut batches = blocks.chunks(MAX_BLOCKS_PER_REQUEST);
        let first = batches.next().unwrap_or_default();

        let payload = json!({
            "parent": { "page_id": self.parent_page_id },
            "properties": {
                "title": { "title": [ { "text": { "content": truncate(document_title) } } ] }
            },
            "children": first,
        });

        let response = self
            .send(self.client.post(format!("{}/v1/pages", self.base_url)), &payload)
            .await?;
        let page: CreatedPage = response
            .json()
            .await
            .map_err(|e| CapabilityError::malformed(e.to_string()))?;

        debug!(page_id = %page.id, blocks = blocks.len(), "Notion page created");

        for batch in batches {
            let url = format!("{}/v1/blocks/{}/children", self.base_url, page.id);
            self.send(self.client.patch(url), &json!({ "children": batch }))
                .await?;
        }

        info!(page_id = %page.id, title = %document_title, "Report published to Notion");
        Ok(PageId::new(page.id))
    }
}

/// Convert markdown into Notion blocks: headings, bullets and paragraphs.
/// Text longer than Notion's limit is split across consecutive blocks.
fn markdown_blocks(markdown: &str) -> Vec<Value> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    for line in markdown.lines() {
        let trimmed = line.trim();
        let kind = if trimmed.is_empty() {
            None
        } else if let Some(rest) = trimmed.strip_prefix("### ") {
            Some(("heading_3", rest))
        } else if let Some(rest) = trimmed.strip_prefix("## ") {
            Some(("heading_2", rest))
        } else if let Some(rest) = trimmed.strip_prefix("# ") {
            Some(("heading_1", rest))
        } else if let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            Some(("bulleted_list_item", rest))
        } else {
            paragraph.push(line);
            continue;
        };

        flush_paragraph(&mut paragraph, &mut blocks);
        if let Some((block_type, text)) = kind {
            push_text_blocks(&mut blocks, block_type, text);
        }
    }
    flush_paragraph(&mut paragraph, &mut blocks);

    blocks
}

fn flush_paragraph(paragraph: &mut Vec<&str>, blocks: &mut Vec<Value>) {
    if !paragraph.is_empty() {
        push_text_blocks(blocks, "paragraph", &paragraph.join("\n"));
        paragraph.clear();
    }
}

fn push_text_blocks(blocks: &mut Vec<Value>, block_type: &str, text: &str) {
    for chunk in split_chars(text, MAX_TEXT_CHARS) {
        blocks.push(json!({
            "object": "block",
            "type": block_type,
            block_type: {
                "rich_text": [ { "type": "text", "text": { "content": chunk } } ]
            }
        }));
    }
}

/// Split into pieces of at most `max` characters (not bytes)
fn split_chars(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_TEXT_CHARS).collect()
}

// =============================================================================
// MARKDOWN FILE
// =============================================================================
pub struct MarkdownPublisher {
    output_dir: PathBuf,
}

impl MarkdownPublisher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl PublishCapability for MarkdownPublisher {
    async fn publish(&self, document_title: &str, body: &str) -> Result<PageId, CapabilityError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| CapabilityError::transport(format!("Failed to create output dir: {}", e)))?;

        let path = self.output_dir.join(format!("{}.md", slug(document_title)));
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| CapabilityError::transport(format!("Failed to write report: {}", e)))?;

        info!(path = %path.display(), "Report written");
        Ok(PageId::new(path.display().to_string()))
    }
}

/// Lowercase ASCII alphanumerics separated by single dashes
pub fn slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "report".to_string()
    } else {
        slug.to_string()
    }
}
