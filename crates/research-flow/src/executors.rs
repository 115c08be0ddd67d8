//! Step executors
//!
//! Each executor wraps one external capability, checks its precondition
//! against the workflow state, performs the call, writes the outcome back
//! into the state and hands control back to the orchestrator.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capability::{
    PageId, PlanningCapability, PublishCapability, ReportingCapability, ResearchCapability,
    ReviewCapability,
};
use crate::error::{CapabilityError, FlowError, PublishWarning};
use crate::model::{Feedback, ResearchPlan, WorkflowState};
use crate::orchestrator::Label;

/// What a step produced besides its state mutations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// Where the engine goes next
    pub next: Label,
    /// Page id of a published report
    pub page_id: Option<PageId>,
    /// Non-fatal publish failure
    pub warning: Option<PublishWarning>,
}

impl StepOutput {
    /// Hand control back to the orchestrator
    pub fn route() -> Self {
        Self {
            next: Label::Execute,
            page_id: None,
            warning: None,
        }
    }
}

/// A capability-backed step of the workflow
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Step name for logs and checkpoints
    fn name(&self) -> &'static str;

    /// Run the step against the shared state
    async fn execute(&self, state: &mut WorkflowState) -> Result<StepOutput, FlowError>;
}

/// Entry step: builds the research plan
pub struct Planner {
    capability: Arc<dyn PlanningCapability>,
}

impl Planner {
    pub fn new(capability: Arc<dyn PlanningCapability>) -> Self {
        Self { capability }
    }
}

#[async_trait]
impl StepExecutor for Planner {
    fn name(&self) -> &'static str {
        "planner"
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<StepOutput, FlowError> {
        if state.plan.is_some() {
            return Err(FlowError::precondition("planning runs once per run"));
        }

        let company = state.company_name.clone();
        let topics = self
            .capability
            .plan(&company)
            .await
            .map_err(|e| FlowError::planning_failed(&company, e))?;

        let topics: Vec<String> = topics
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if topics.is_empty() {
            return Err(FlowError::planning(&company, "planning returned no topics"));
        }

        info!(company = %company, topics = topics.len(), "Research plan created");

        let plan = ResearchPlan::from_topics(topics);
        state.current_task = plan.tasks.first().cloned();
        state.plan = Some(plan);

        Ok(StepOutput::route())
    }
}

/// Runs a research pass on the current task
pub struct Researcher {
    capability: Arc<dyn ResearchCapability>,
}

impl Researcher {
    pub fn new(capability: Arc<dyn ResearchCapability>) -> Self {
        Self { capability }
    }
}

#[async_trait]
impl StepExecutor for Researcher {
    fn name(&self) -> &'static str {
        "researcher"
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<StepOutput, FlowError> {
        let company = state.company_name.clone();
        let task = state
            .current_task
            .as_mut()
            .ok_or_else(|| FlowError::precondition("research requires a current task"))?;

        let revision = match &task.feedback {
            Some(Feedback::Revise(text)) => Some(text.clone()),
            _ => None,
        };

        info!(
            task_id = %task.task_id,
            topic = %task.topic,
            feedback_count = task.feedback_count,
            revision = revision.is_some(),
            "Researching topic"
        );

        let findings = self
            .capability
            .research(&company, &task.topic, revision.as_deref())
            .await
            .map_err(|e| FlowError::research(task.task_id.clone(), &task.topic, e))?;

        if findings.text.trim().is_empty() {
            return Err(FlowError::research(
                task.task_id.clone(),
                &task.topic,
                CapabilityError::malformed("research returned empty findings"),
            ));
        }

        debug!(
            task_id = %task.task_id,
            chars = findings.text.len(),
            citations = findings.citations.as_ref().map_or(0, Vec::len),
            "Findings recorded"
        );

        task.results = Some(findings.text);
        task.citations = findings.citations;
        task.feedback = None;

        Ok(StepOutput::route())
    }
}

/// Reviews the current task's findings
pub struct Reviewer {
    capability: Arc<dyn ReviewCapability>,
}

impl Reviewer {
    pub fn new(capability: Arc<dyn ReviewCapability>) -> Self {
        Self { capability }
    }
}

#[async_trait]
impl StepExecutor for Reviewer {
    fn name(&self) -> &'static str {
        "reviewer"
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<StepOutput, FlowError> {
        let task = state
            .current_task
            .as_mut()
            .ok_or_else(|| FlowError::precondition("review requires a current task"))?;

        let results = task.results.as_deref().ok_or_else(|| {
            FlowError::precondition(format!("review called on task {} without results", task.task_id))
        })?;

        let answer = self
            .capability
            .review(results)
            .await
            .map_err(|e| FlowError::review(task.task_id.clone(), e))?;

        if answer.trim().is_empty() {
            return Err(FlowError::review(
                task.task_id.clone(),
                CapabilityError::malformed("review returned an empty answer"),
            ));
        }

        let feedback = Feedback::from_review(answer);
        info!(
            task_id = %task.task_id,
            accepted = feedback.is_accepted(),
            feedback_count = task.feedback_count,
            "Review complete"
        );
        task.feedback = Some(feedback);

        Ok(StepOutput::route())
    }
}

/// Synthesizes the final report and publishes it
pub struct Reporter {
    capability: Arc<dyn ReportingCapability>,
    publisher: Option<Arc<dyn PublishCapability>>,
}

impl Reporter {
    pub fn new(capability: Arc<dyn ReportingCapability>) -> Self {
        Self {
            capability,
            publisher: None,
        }
    }

    /// Publish the report after it is produced
    pub fn with_publisher(mut self, publisher: Arc<dyn PublishCapability>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Title of the published document
    pub fn document_title(company_name: &str) -> String {
        format!("{} Sales Readiness Report", company_name)
    }
}

#[async_trait]
impl StepExecutor for Reporter {
    fn name(&self) -> &'static str {
        "reporter"
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<StepOutput, FlowError> {
        if state.completed_tasks.is_empty() {
            return Err(FlowError::precondition("reporting requires completed tasks"));
        }
        if state.report.is_some() {
            return Err(FlowError::precondition("report already produced for this run"));
        }

        let report = self
            .capability
            .report(&state.company_name, &state.completed_tasks)
            .await
            .map_err(FlowError::reporting_failed)?;

        if report.trim().is_empty() {
            return Err(FlowError::reporting("reporting returned no text"));
        }

        info!(
            company = %state.company_name,
            tasks = state.completed_tasks.len(),
            chars = report.len(),
            "Report synthesized"
        );
        state.report = Some(report);

        let mut output = StepOutput::route();
        let Some(publisher) = &self.publisher else {
            return Ok(output);
        };

        let title = Self::document_title(&state.company_name);
        let body = state.report.as_deref().unwrap_or_default();
        match publisher.publish(&title, body).await {
            Ok(page_id) => {
                info!(page_id = %page_id, title = %title, "Report published");
                output.page_id = Some(page_id);
            }
            Err(e) => {
                warn!(title = %title, error = %e, "Publishing failed, keeping in-memory report");
                output.warning = Some(PublishWarning::new(title, e.to_string()));
            }
        }

        Ok(output)
    }
}
