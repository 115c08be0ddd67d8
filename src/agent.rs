//! # Agent Module
//!
//! Ollama-backed implementations of the research flow's capabilities, built
//! with Rig agents:
//! - [`OllamaPlanner`]: company name to a list of research topics
//! - [`OllamaAnalyst`]: researches one topic with the `web_search` tool
//! - [`OllamaAccountExecutive`]: reviews findings, answers with feedback or the sentinel
//! - [`OllamaReporter`]: writes the sales readiness report

use async_trait::async_trait;
use regex::Regex;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::ollama;
use std::fmt::Display;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info};

use research_flow::{
    CapabilityError, Findings, PlanningCapability, ReportingCapability, ResearchCapability,
    ResearchTask, ReviewCapability,
};

use crate::config::Config;
use crate::prompts;
use crate::tools::WebSearchTool;

/// Upper bound for one agent call, tool turns included
const AGENT_TIMEOUT_SECS: u64 = 300;

/// Tool-call rounds the analyst may take before answering
const ANALYST_MAX_TURNS: usize = 5;

const URL_PATTERN: &str = r#"https?://[^\s<>()\[\]"'`]+"#;

// =============================================================================
// SHARED OLLAMA BACKEND
// =============================================================================
/// One Ollama client shared by every role.
pub struct OllamaBackend {
    client: ollama::Client,
    model: String,
    temperature: f64,
    search_tool: WebSearchTool,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &Config) -> Self {
        // Rig 0.27's Ollama client reads its host from OLLAMA_API_BASE_URL
        std::env::set_var("OLLAMA_API_BASE_URL", &config.ollama_host);
        let client = ollama::Client::from_env();

        debug!(
            host = %config.ollama_host,
            model = %config.model,
            "Ollama client configured"
        );

        Self {
            client,
            model: config.model.clone(),
            temperature: f64::from(config.temperature),
            search_tool: WebSearchTool::new(config.max_search_results),
            timeout: Duration::from_secs(AGENT_TIMEOUT_SECS),
        }
    }

    /// Single prompt, no tools
    async fn prompt(&self, preamble: &str, prompt: &str) -> Result<String, CapabilityError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(preamble)
            .temperature(self.temperature)
            .build();

        tokio::time::timeout(self.timeout, agent.prompt(prompt))
            .await
            .map_err(|_| CapabilityError::timeout(format!("no answer within {:?}", self.timeout)))?
            .map_err(classify)
    }

    /// Prompt with the web search tool available for several turns
    async fn prompt_with_search(&self, preamble: &str, prompt: &str) -> Result<String, CapabilityError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(preamble)
            .temperature(self.temperature)
            .tool(self.search_tool.clone())
            .build();

        tokio::time::timeout(self.timeout, agent.prompt(prompt).multi_turn(ANALYST_MAX_TURNS))
            .await
            .map_err(|_| CapabilityError::timeout(format!("no answer within {:?}", self.timeout)))?
            .map_err(classify)
    }
}

/// Map a Rig error onto a capability error kind by its message
fn classify(error: impl Display) -> CapabilityError {
    let message = error.to_string();
    let lower = message.to_lowercase();

    if lower.contains("timed out") || lower.contains("timeout") {
        CapabilityError::timeout(message)
    } else if lower.contains("connect") || lower.contains("http") {
        CapabilityError::transport(message)
    } else if lower.contains("json") || lower.contains("deserializ") {
        CapabilityError::malformed(message)
    } else {
        CapabilityError::rejected(message)
    }
}

// =============================================================================
// PLANNER
// =============================================================================
pub struct OllamaPlanner {
    backend: Arc<OllamaBackend>,
}

impl OllamaPlanner {
    pub fn new(backend: Arc<OllamaBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl PlanningCapability for OllamaPlanner {
    async fn plan(&self, company_name: &str) -> Result<Vec<String>, CapabilityError> {
        info!(company = %company_name, "Planning research");

        let answer = self
            .backend
            .prompt(prompts::PLANNER_PREAMBLE, &prompts::planning_prompt(company_name))
            .await?;

        Ok(parse_topics(&answer))
    }
}

/// One topic per line; list markers, numbering and emphasis are stripped.
pub fn parse_topics(answer: &str) -> Vec<String> {
    answer
        .lines()
        .map(|line| {
            let line = line.trim().trim_start_matches(['-', '*', '•']).trim_start();
            let line = match line.find(['.', ')']) {
                Some(idx) if idx > 0 && line[..idx].chars().all(|c| c.is_ascii_digit()) => {
                    &line[idx + 1..]
                }
                _ => line,
            };
            line.trim().trim_matches('*').trim().to_string()
        })
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .collect()
}

// =============================================================================
// ANALYST (RESEARCHER)
// =============================================================================
pub struct OllamaAnalyst {
    backend: Arc<OllamaBackend>,
}

impl OllamaAnalyst {
    pub fn new(backend: Arc<OllamaBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ResearchCapability for OllamaAnalyst {
    async fn research(
        &self,
        company_name: &str,
        topic: &str,
        feedback: Option<&str>,
    ) -> Result<Findings, CapabilityError> {
        info!(company = %company_name, topic = %topic, revision = feedback.is_some(), "Researching topic");

        let answer = self
            .backend
            .prompt_with_search(
                prompts::ANALYST_PREAMBLE,
                &prompts::research_prompt(company_name, topic, feedback),
            )
            .await?;

        let citations = extract_citations(&answer);
        debug!(topic = %topic, citations = citations.len(), "Findings received");

        let findings = Findings::new(answer);
        Ok(if citations.is_empty() {
            findings
        } else {
            findings.with_citations(citations)
        })
    }
}

/// Distinct URLs in order of first appearance
pub fn extract_citations(text: &str) -> Vec<String> {
    static URL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = URL_RE.get_or_init(|| Regex::new(URL_PATTERN).ok()) else {
        return Vec::new();
    };

    let mut citations: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', '*']);
        if !citations.iter().any(|c| c == url) {
            citations.push(url.to_string());
        }
    }
    citations
}

// =============================================================================
// ACCOUNT EXECUTIVE (REVIEWER)
// =============================================================================
pub struct OllamaAccountExecutive {
    backend: Arc<OllamaBackend>,
}

impl OllamaAccountExecutive {
    pub fn new(backend: Arc<OllamaBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ReviewCapability for OllamaAccountExecutive {
    async fn review(&self, findings: &str) -> Result<String, CapabilityError> {
        let answer = self
            .backend
            .prompt(
                prompts::ACCOUNT_EXECUTIVE_PREAMBLE,
                &prompts::review_prompt(findings),
            )
            .await?;

        // Surrounding whitespace only; the sentinel itself must match exactly
        Ok(answer.trim().to_string())
    }
}

// =============================================================================
// REPORTER
// =============================================================================
pub struct OllamaReporter {
    backend: Arc<OllamaBackend>,
}

impl OllamaReporter {
    pub fn new(backend: Arc<OllamaBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ReportingCapability for OllamaReporter {
    async fn report(
        &self,
        company_name: &str,
        completed_tasks: &[ResearchTask],
    ) -> Result<String, CapabilityError> {
        info!(company = %company_name, tasks = completed_tasks.len(), "Writing report");

        self.backend
            .prompt(
                prompts::REPORTER_PREAMBLE,
                &prompts::report_prompt(company_name, &research_notes(completed_tasks)),
            )
            .await
    }
}

/// Completed tasks as markdown notes for the reporter
pub fn research_notes(tasks: &[ResearchTask]) -> String {
    tasks
        .iter()
        .map(|task| {
            let mut section = format!(
                "## {}\n\n{}",
                task.topic,
                task.results.as_deref().unwrap_or("(no findings)")
            );
            if let Some(citations) = task.citations.as_ref().filter(|c| !c.is_empty()) {
                section.push_str("\n\nSources:\n");
                for url in citations {
                    section.push_str(&format!("- {}\n", url));
                }
            }
            section
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
