//! External capabilities the flow depends on
//!
//! Each capability is a narrow, single-operation interface. Backing
//! implementations (an LLM agent, a document store client, a scripted fake in
//! tests) can be swapped without touching the orchestrator.

use async_trait::async_trait;
use std::fmt;

use crate::error::CapabilityError;
use crate::model::ResearchTask;

/// Output of one research pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Findings {
    /// Unstructured findings text
    pub text: String,
    /// Optional supporting citations, in the order they were cited
    pub citations: Option<Vec<String>>,
}

impl Findings {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: None,
        }
    }

    pub fn with_citations(mut self, citations: Vec<String>) -> Self {
        self.citations = Some(citations);
        self
    }
}

/// Identifier of a published document in the external store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageId(pub String);

impl PageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns a company name into an ordered list of research topics.
#[async_trait]
pub trait PlanningCapability: Send + Sync {
    async fn plan(&self, company_name: &str) -> Result<Vec<String>, CapabilityError>;
}

/// Researches one topic for a company.
#[async_trait]
pub trait ResearchCapability: Send + Sync {
    /// `feedback` carries the reviewer's request when this is a revision pass.
    async fn research(
        &self,
        company_name: &str,
        topic: &str,
        feedback: Option<&str>,
    ) -> Result<Findings, CapabilityError>;
}

/// Reviews findings and answers with feedback or the no-feedback sentinel.
#[async_trait]
pub trait ReviewCapability: Send + Sync {
    async fn review(&self, findings: &str) -> Result<String, CapabilityError>;
}

/// Synthesizes the final report from retired tasks.
#[async_trait]
pub trait ReportingCapability: Send + Sync {
    async fn report(
        &self,
        company_name: &str,
        completed_tasks: &[ResearchTask],
    ) -> Result<String, CapabilityError>;
}

/// Writes a document to an external store.
#[async_trait]
pub trait PublishCapability: Send + Sync {
    async fn publish(&self, document_title: &str, body: &str) -> Result<PageId, CapabilityError>;
}
