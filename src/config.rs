//! # Configuration Module
//!
//! Loads configuration from environment variables (and a `.env` file when
//! present). Every value has a default; `validate()` fails fast on values
//! the run could not work with.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

// =============================================================================
// CHECKPOINT BACKEND
// =============================================================================
/// Where run checkpoints are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointBackend {
    /// One file per step under `{checkpoint_dir}/{run_id}/`
    #[default]
    File,
    /// `{checkpoint_dir}/checkpoints.db` (needs the `checkpointer-sqlite` feature)
    Sqlite,
}

impl std::str::FromStr for CheckpointBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            other => anyhow::bail!("unknown checkpoint backend: {}", other),
        }
    }
}

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Main configuration for the company research agent.
#[derive(Debug, Clone)]
pub struct Config {
    /// The Ollama model to use (e.g., "llama3.2", "qwen2.5")
    pub model: String,

    /// Ollama server URL (default: http://localhost:11434)
    pub ollama_host: String,

    /// Temperature for LLM responses (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,

    /// Maximum number of search results per web search
    pub max_search_results: usize,

    /// Maximum number of transitions per run
    pub max_flow_steps: usize,

    /// Checkpoint store: file or sqlite
    pub checkpoint_backend: CheckpointBackend,

    /// Base directory for run checkpoints
    pub checkpoint_dir: PathBuf,

    /// Compress checkpoints with zstd
    pub checkpoint_compression: bool,

    /// Where markdown reports are written
    pub report_output_dir: PathBuf,

    /// Notion integration token
    pub notion_api_key: Option<String>,

    /// Notion page the reports are created under
    pub notion_parent_page_id: Option<String>,

    /// Log level for the application
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            ollama_host: "http://localhost:11434".to_string(),
            temperature: 0.7,
            max_search_results: 5,
            max_flow_steps: 250,
            checkpoint_backend: CheckpointBackend::File,
            checkpoint_dir: PathBuf::from("./checkpoints"),
            checkpoint_compression: false,
            report_output_dir: PathBuf::from("./output"),
            notion_api_key: None,
            notion_parent_page_id: None,
            log_level: "info".to_string(),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Example
    /// ```ignore
    /// let config = Config::from_env()?;
    /// println!("Using model: {}", config.model);
    /// ```
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("OLLAMA_MODEL") {
            config.model = val;
        }

        if let Ok(val) = env::var("OLLAMA_API_BASE_URL") {
            config.ollama_host = val;
        }

        if let Ok(val) = env::var("TEMPERATURE") {
            config.temperature = val
                .parse()
                .context("TEMPERATURE must be a valid floating-point number (e.g., 0.7)")?;
        }

        if let Ok(val) = env::var("MAX_SEARCH_RESULTS") {
            config.max_search_results = val
                .parse()
                .context("MAX_SEARCH_RESULTS must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("MAX_FLOW_STEPS") {
            config.max_flow_steps = val
                .parse()
                .context("MAX_FLOW_STEPS must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("CHECKPOINT_BACKEND") {
            config.checkpoint_backend = val
                .parse()
                .context("CHECKPOINT_BACKEND must be file or sqlite")?;
        }

        if let Ok(val) = env::var("CHECKPOINT_DIR") {
            config.checkpoint_dir = PathBuf::from(val);
        }

        if let Ok(val) = env::var("CHECKPOINT_COMPRESSION") {
            config.checkpoint_compression = parse_bool(&val)
                .context("CHECKPOINT_COMPRESSION must be true or false")?;
        }

        if let Ok(val) = env::var("REPORT_OUTPUT_DIR") {
            config.report_output_dir = PathBuf::from(val);
        }

        config.notion_api_key = non_empty_var("NOTION_API_KEY");
        config.notion_parent_page_id = non_empty_var("NOTION_PARENT_PAGE_ID");

        if let Ok(val) = env::var("RUST_LOG") {
            config.log_level = val;
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.temperature
            );
        }

        if self.max_search_results == 0 {
            anyhow::bail!("MAX_SEARCH_RESULTS must be at least 1");
        }

        if self.max_flow_steps == 0 {
            anyhow::bail!("MAX_FLOW_STEPS must be at least 1");
        }

        if self.model.is_empty() {
            anyhow::bail!("OLLAMA_MODEL cannot be empty");
        }

        if self.checkpoint_backend == CheckpointBackend::Sqlite && !cfg!(feature = "checkpointer-sqlite") {
            anyhow::bail!("CHECKPOINT_BACKEND=sqlite requires the checkpointer-sqlite feature");
        }

        if self.notion_api_key.is_some() != self.notion_parent_page_id.is_some() {
            anyhow::bail!("NOTION_API_KEY and NOTION_PARENT_PAGE_ID must be set together");
        }

        Ok(())
    }

    /// Notion credentials, when both are configured
    pub fn notion(&self) -> Option<(&str, &str)> {
        Some((
            self.notion_api_key.as_deref()?,
            self.notion_parent_page_id.as_deref()?,
        ))
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("not a boolean: {}", other),
    }
}
