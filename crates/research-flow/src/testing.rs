//! Scripted capabilities for tests
//!
//! These fakes answer from a fixed script and record what they were asked,
//! so runs can be driven end to end without any external provider.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::capability::{
    Findings, PageId, PlanningCapability, PublishCapability, ReportingCapability,
    ResearchCapability, ReviewCapability,
};
use crate::error::CapabilityError;
use crate::model::ResearchTask;

/// Returns the same topic list on every call
pub struct ScriptedPlanner {
    topics: Vec<String>,
}

impl ScriptedPlanner {
    pub fn new<I, T>(topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PlanningCapability for ScriptedPlanner {
    async fn plan(&self, _company_name: &str) -> Result<Vec<String>, CapabilityError> {
        Ok(self.topics.clone())
    }
}

/// Pops one scripted answer per call; once the script runs out it answers
/// with generic findings for the topic.
pub struct ScriptedResearcher {
    script: Mutex<VecDeque<Result<Findings, CapabilityError>>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedResearcher {
    pub fn new(script: Vec<Result<Findings, CapabilityError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with generic findings
    pub fn echo() -> Self {
        Self::new(Vec::new())
    }

    /// Topics researched, in call order
    pub fn topics(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Revision feedback passed on each call, in call order
    pub fn revisions(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().iter().map(|(_, f)| f.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ResearchCapability for ScriptedResearcher {
    async fn research(
        &self,
        company_name: &str,
        topic: &str,
        feedback: Option<&str>,
    ) -> Result<Findings, CapabilityError> {
        self.calls
            .lock()
            .unwrap()
            .push((topic.to_string(), feedback.map(str::to_string)));

        match self.script.lock().unwrap().pop_front() {
            Some(answer) => answer,
            None => Ok(Findings::new(format!("{} findings on {}", company_name, topic))),
        }
    }
}

/// Pops one scripted answer per call; repeats the last one when exhausted.
pub struct ScriptedReviewer {
    script: Mutex<VecDeque<Result<String, CapabilityError>>>,
    last: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedReviewer {
    pub fn new<I, T>(answers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::from_results(answers.into_iter().map(|a| Ok(a.into())).collect())
    }

    pub fn from_results(script: Vec<Result<String, CapabilityError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewCapability for ScriptedReviewer {
    async fn review(&self, _findings: &str) -> Result<String, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.script.lock().unwrap().pop_front() {
            Some(Ok(answer)) => {
                *self.last.lock().unwrap() = Some(answer.clone());
                Ok(answer)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| CapabilityError::malformed("review script is empty")),
        }
    }
}

/// Answers with a fixed report, or always fails
pub struct ScriptedReporter {
    report: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedReporter {
    pub fn ok(report: impl Into<String>) -> Self {
        Self {
            report: Some(report.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            report: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportingCapability for ScriptedReporter {
    async fn report(
        &self,
        _company_name: &str,
        _completed_tasks: &[ResearchTask],
    ) -> Result<String, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.report
            .clone()
            .ok_or_else(|| CapabilityError::transport("reporting agent unavailable"))
    }
}

/// Records every published document
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, String)>>,
}

impl RecordingPublisher {
    /// (title, body) pairs, in publish order
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl PublishCapability for RecordingPublisher {
    async fn publish(&self, document_title: &str, body: &str) -> Result<PageId, CapabilityError> {
        let mut published = self.published.lock().unwrap();
        published.push((document_title.to_string(), body.to_string()));
        Ok(PageId::new(format!("page-{}", published.len())))
    }
}

/// Publisher whose store is always unreachable
pub struct FailingPublisher;

#[async_trait]
impl PublishCapability for FailingPublisher {
    async fn publish(&self, _document_title: &str, _body: &str) -> Result<PageId, CapabilityError> {
        Err(CapabilityError::transport("document store unreachable"))
    }
}
