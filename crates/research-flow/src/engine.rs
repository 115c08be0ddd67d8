//! Flow engine
//!
//! Drives a run from planning to the final report. The engine alternates
//! between the orchestrator (label `execute`) and the step executors, and
//! writes a checkpoint after every transition. The checkpoint records the
//! label that runs next, so a resumed run continues exactly where the
//! previous process stopped.
//!
//! # Example
//!
//! ```ignore
//! let engine = FlowEngine::builder()
//!     .planning(Arc::new(planner))
//!     .research(Arc::new(researcher))
//!     .review(Arc::new(reviewer))
//!     .reporting(Arc::new(reporter))
//!     .checkpointer(checkpointer)
//!     .build()?;
//!
//! let outcome = engine.run("Salesforce").await?;
//! println!("{}", outcome.report);
//! ```

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capability::{
    PageId, PlanningCapability, PublishCapability, ReportingCapability, ResearchCapability,
    ReviewCapability,
};
use crate::checkpoint::{Checkpoint, Checkpointer, MemoryCheckpointer};
use crate::error::{FlowError, PublishWarning};
use crate::executors::{Planner, Reporter, Researcher, Reviewer, StepExecutor, StepOutput};
use crate::model::WorkflowState;
use crate::orchestrator::{self, Label};

const PAGE_ID_KEY: &str = "page_id";
const STEP_NAME_KEY: &str = "step_name";
const WARNINGS_KEY: &str = "publish_warnings";

/// Engine limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of transitions (planning included) before a run aborts
    pub max_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_steps: 250 }
    }
}

impl EngineConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    /// Final report text
    pub report: String,
    /// Page id when the report was published
    pub page_id: Option<PageId>,
    /// Non-fatal publish failures
    pub warnings: Vec<PublishWarning>,
    /// Final workflow state
    pub state: WorkflowState,
    /// Number of transitions recorded for the run
    pub steps: usize,
}

/// Runs the plan/research/review/report workflow for one run id.
pub struct FlowEngine {
    planner: Planner,
    researcher: Researcher,
    reviewer: Reviewer,
    reporter: Reporter,
    checkpointer: Arc<dyn Checkpointer>,
    config: EngineConfig,
}

impl FlowEngine {
    pub fn builder() -> FlowEngineBuilder {
        FlowEngineBuilder::default()
    }

    pub fn run_id(&self) -> &str {
        self.checkpointer.run_id()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a new run for `company_name`.
    ///
    /// Fails with `InvalidInput` when the name is blank or when the run id
    /// already has checkpoints (use [`FlowEngine::resume`] for those).
    pub async fn run(&self, company_name: &str) -> Result<RunOutcome, FlowError> {
        let company_name = company_name.trim();
        if company_name.is_empty() {
            return Err(FlowError::invalid_input("company name must not be empty"));
        }

        if self.checkpointer.latest().await?.is_some() {
            return Err(FlowError::invalid_input(format!(
                "run '{}' already has checkpoints, resume it instead",
                self.run_id()
            )));
        }

        info!(run_id = %self.run_id(), company = %company_name, "Starting research run");

        let mut state = WorkflowState::new(company_name);
        let output = self.planner.execute(&mut state).await?;
        self.save(1, &state, output.next, self.planner.name(), None, &[])
            .await?;

        self.drive(state, 1, output.next, None, Vec::new()).await
    }

    /// Continue the run from its latest checkpoint.
    ///
    /// Returns `Ok(None)` when the run has no checkpoints. A run whose latest
    /// checkpoint is terminal is returned as-is without executing anything.
    pub async fn resume(&self) -> Result<Option<RunOutcome>, FlowError> {
        let Some(checkpoint) = self.checkpointer.latest().await? else {
            return Ok(None);
        };

        if checkpoint.run_id != self.run_id() {
            return Err(FlowError::checkpoint_error(format!(
                "checkpoint belongs to run '{}', expected '{}'",
                checkpoint.run_id,
                self.run_id()
            )));
        }

        info!(
            run_id = %self.run_id(),
            step = checkpoint.step,
            next = %checkpoint.next,
            "Resuming research run"
        );

        let page_id = checkpoint
            .metadata
            .get(PAGE_ID_KEY)
            .map(|id| PageId::new(id.clone()));

        let warnings = match checkpoint.metadata.get(WARNINGS_KEY) {
            Some(json) => serde_json::from_str(json).map_err(|e| {
                FlowError::checkpoint_error(format!("Invalid publish warnings: {}", e))
            })?,
            None => Vec::new(),
        };

        self.drive(checkpoint.state, checkpoint.step, checkpoint.next, page_id, warnings)
            .await
            .map(Some)
    }

    async fn drive(
        &self,
        mut state: WorkflowState,
        mut step: usize,
        mut next: Label,
        mut page_id: Option<PageId>,
        mut warnings: Vec<PublishWarning>,
    ) -> Result<RunOutcome, FlowError> {
        while !next.is_terminal() {
            if step >= self.config.max_steps {
                warn!(run_id = %self.run_id(), step, "Step limit reached");
                return Err(FlowError::StepLimitExceeded(self.config.max_steps));
            }

            let (output, step_name) = match next {
                Label::Execute => {
                    let label = orchestrator::next_step(&mut state);
                    (
                        StepOutput {
                            next: label,
                            ..StepOutput::route()
                        },
                        "orchestrator",
                    )
                }
                Label::Research => (self.researcher.execute(&mut state).await?, self.researcher.name()),
                Label::Review => (self.reviewer.execute(&mut state).await?, self.reviewer.name()),
                Label::Report => (self.reporter.execute(&mut state).await?, self.reporter.name()),
                Label::Stop => break,
            };

            if let Some(id) = output.page_id {
                page_id = Some(id);
            }
            if let Some(warning) = output.warning {
                warnings.push(warning);
            }

            step += 1;
            next = output.next;
            let (done, total) = state.progress();
            debug!(
                run_id = %self.run_id(),
                step,
                step_name,
                next = %next,
                done,
                total,
                "Transition complete"
            );

            self.save(step, &state, next, step_name, page_id.as_ref(), &warnings)
                .await?;
        }

        let report = state
            .report
            .clone()
            .ok_or_else(|| FlowError::reporting("run stopped without a report"))?;

        info!(
            run_id = %self.run_id(),
            steps = step,
            tasks = state.completed_tasks.len(),
            "Research run finished"
        );

        Ok(RunOutcome {
            run_id: self.run_id().to_string(),
            report,
            page_id,
            warnings,
            state,
            steps: step,
        })
    }

    async fn save(
        &self,
        step: usize,
        state: &WorkflowState,
        next: Label,
        step_name: &str,
        page_id: Option<&PageId>,
        warnings: &[PublishWarning],
    ) -> Result<(), FlowError> {
        let mut checkpoint = Checkpoint::new(self.run_id(), step, state.clone(), next)
            .with_metadata(STEP_NAME_KEY, step_name);
        if let Some(id) = page_id {
            checkpoint = checkpoint.with_metadata(PAGE_ID_KEY, id.to_string());
        }
        if !warnings.is_empty() {
            let json = serde_json::to_string(warnings)
                .map_err(|e| FlowError::checkpoint_error(format!("Serialization failed: {}", e)))?;
            checkpoint = checkpoint.with_metadata(WARNINGS_KEY, json);
        }
        self.checkpointer.save(&checkpoint).await
    }
}

/// Builder for [`FlowEngine`]
#[derive(Default)]
pub struct FlowEngineBuilder {
    planning: Option<Arc<dyn PlanningCapability>>,
    research: Option<Arc<dyn ResearchCapability>>,
    review: Option<Arc<dyn ReviewCapability>>,
    reporting: Option<Arc<dyn ReportingCapability>>,
    publisher: Option<Arc<dyn PublishCapability>>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    config: EngineConfig,
}

impl FlowEngineBuilder {
    pub fn planning(mut self, capability: Arc<dyn PlanningCapability>) -> Self {
        self.planning = Some(capability);
        self
    }

    pub fn research(mut self, capability: Arc<dyn ResearchCapability>) -> Self {
        self.research = Some(capability);
        self
    }

    pub fn review(mut self, capability: Arc<dyn ReviewCapability>) -> Self {
        self.review = Some(capability);
        self
    }

    pub fn reporting(mut self, capability: Arc<dyn ReportingCapability>) -> Self {
        self.reporting = Some(capability);
        self
    }

    /// Publish the report once produced. Publishing failures are warnings.
    pub fn publisher(mut self, publisher: Arc<dyn PublishCapability>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Defaults to an in-memory checkpointer with a fresh run id
    pub fn checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.config.max_steps = max_steps;
        self
    }

    pub fn build(self) -> Result<FlowEngine, FlowError> {
        let planning = self
            .planning
            .ok_or_else(|| FlowError::invalid_input("planning capability is required"))?;
        let research = self
            .research
            .ok_or_else(|| FlowError::invalid_input("research capability is required"))?;
        let review = self
            .review
            .ok_or_else(|| FlowError::invalid_input("review capability is required"))?;
        let reporting = self
            .reporting
            .ok_or_else(|| FlowError::invalid_input("reporting capability is required"))?;

        if self.config.max_steps == 0 {
            return Err(FlowError::invalid_input("max_steps must be at least 1"));
        }

        let mut reporter = Reporter::new(reporting);
        if let Some(publisher) = self.publisher {
            reporter = reporter.with_publisher(publisher);
        }

        let checkpointer = self.checkpointer.unwrap_or_else(|| {
            Arc::new(MemoryCheckpointer::new(uuid::Uuid::new_v4().to_string()))
        });

        Ok(FlowEngine {
            planner: Planner::new(planning),
            researcher: Researcher::new(research),
            reviewer: Reviewer::new(review),
            reporter,
            checkpointer,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NO_FEEDBACK;
    use crate::testing::{
        FailingPublisher, RecordingPublisher, ScriptedPlanner, ScriptedReporter,
        ScriptedResearcher, ScriptedReviewer,
    };

    fn engine(reviewer: ScriptedReviewer) -> FlowEngine {
        FlowEngine::builder()
            .planning(Arc::new(ScriptedPlanner::new(["Overview", "Pricing"])))
            .research(Arc::new(ScriptedResearcher::echo()))
            .review(Arc::new(reviewer))
            .reporting(Arc::new(ScriptedReporter::ok("# Acme report")))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_capabilities() {
        let err = FlowEngine::builder()
            .planning(Arc::new(ScriptedPlanner::new(["Overview"])))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }

    #[test]
    fn test_default_config() {
        assert_eq!(EngineConfig::default().max_steps, 250);
        assert_eq!(EngineConfig::default().with_max_steps(7).max_steps, 7);
    }

    #[tokio::test]
    async fn test_run_accepts_every_task() {
        let outcome = engine(ScriptedReviewer::new([NO_FEEDBACK]))
            .run("Acme")
            .await
            .unwrap();

        assert_eq!(outcome.report, "# Acme report");
        assert_eq!(outcome.state.completed_tasks.len(), 2);
        assert!(outcome.page_id.is_none());
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_run_rejects_blank_company() {
        let err = engine(ScriptedReviewer::new([NO_FEEDBACK]))
            .run("   ")
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let engine = FlowEngine::builder()
            .planning(Arc::new(ScriptedPlanner::new(["Overview", "Pricing"])))
            .research(Arc::new(ScriptedResearcher::echo()))
            .review(Arc::new(ScriptedReviewer::new([NO_FEEDBACK])))
            .reporting(Arc::new(ScriptedReporter::ok("report")))
            .max_steps(4)
            .build()
            .unwrap();

        let err = engine.run("Acme").await.unwrap_err();
        assert!(matches!(err, FlowError::StepLimitExceeded(4)));
    }

    #[tokio::test]
    async fn test_publisher_page_id_is_reported() {
        let publisher = Arc::new(RecordingPublisher::default());
        let engine = FlowEngine::builder()
            .planning(Arc::new(ScriptedPlanner::new(["Overview"])))
            .research(Arc::new(ScriptedResearcher::echo()))
            .review(Arc::new(ScriptedReviewer::new([NO_FEEDBACK])))
            .reporting(Arc::new(ScriptedReporter::ok("report")))
            .publisher(publisher.clone())
            .build()
            .unwrap();

        let outcome = engine.run("Acme").await.unwrap();
        assert_eq!(outcome.page_id, Some(PageId::new("page-1")));
        assert_eq!(publisher.published()[0].0, "Acme Sales Readiness Report");
    }

    #[tokio::test]
    async fn test_publish_failure_is_a_warning() {
        let engine = FlowEngine::builder()
            .planning(Arc::new(ScriptedPlanner::new(["Overview"])))
            .research(Arc::new(ScriptedResearcher::echo()))
            .review(Arc::new(ScriptedReviewer::new([NO_FEEDBACK])))
            .reporting(Arc::new(ScriptedReporter::ok("report")))
            .publisher(Arc::new(FailingPublisher))
            .build()
            .unwrap();

        let outcome = engine.run("Acme").await.unwrap();
        assert_eq!(outcome.report, "report");
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.page_id.is_none());
    }

    #[tokio::test]
    async fn test_publish_warning_survives_resume() {
        let engine = FlowEngine::builder()
            .planning(Arc::new(ScriptedPlanner::new(["Overview"])))
            .research(Arc::new(ScriptedResearcher::echo()))
            .review(Arc::new(ScriptedReviewer::new([NO_FEEDBACK])))
            .reporting(Arc::new(ScriptedReporter::ok("report")))
            .publisher(Arc::new(FailingPublisher))
            .build()
            .unwrap();

        let finished = engine.run("Acme").await.unwrap();
        let resumed = engine.resume().await.unwrap().unwrap();

        assert_eq!(finished.warnings.len(), 1);
        assert_eq!(resumed.warnings, finished.warnings);
        assert_eq!(resumed.warnings[0].document_title, "Acme Sales Readiness Report");
    }

    #[tokio::test]
    async fn test_resume_without_checkpoints() {
        let engine = engine(ScriptedReviewer::new([NO_FEEDBACK]));
        assert!(engine.resume().await.unwrap().is_none());
    }
}
