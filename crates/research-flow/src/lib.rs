//! research-flow: feedback-driven company research orchestration
//!
//! A run takes a company name through four kinds of steps:
//! - Planner: turns the company into an ordered list of research topics
//! - Researcher: researches the current topic, revising on feedback
//! - Reviewer: accepts the findings or asks for another pass
//! - Reporter: synthesizes completed tasks into one report, optionally published
//!
//! The orchestrator decides which step runs next from the workflow state
//! alone. Every task gets at most three review rounds before it is retired.
//! The engine checkpoints after every transition so a run can be resumed.
//!
//! # Example
//!
//! ```rust,ignore
//! use research_flow::{FlowEngine, MemoryCheckpointer};
//!
//! let engine = FlowEngine::builder()
//!     .planning(planner)
//!     .research(researcher)
//!     .review(reviewer)
//!     .reporting(reporter)
//!     .checkpointer(Arc::new(MemoryCheckpointer::new("acme")))
//!     .build()?;
//!
//! let outcome = engine.run("Acme").await?;
//! ```

pub mod capability;
pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod executors;
pub mod model;
pub mod orchestrator;
pub mod testing;

// Re-exports for convenience
pub use capability::{
    Findings, PageId, PlanningCapability, PublishCapability, ReportingCapability,
    ResearchCapability, ReviewCapability,
};
pub use checkpoint::{
    create_checkpointer, Checkpoint, Checkpointer, CheckpointerConfig, FileCheckpointer,
    MemoryCheckpointer,
};
#[cfg(feature = "checkpointer-sqlite")]
pub use checkpoint::SqliteCheckpointer;
pub use engine::{EngineConfig, FlowEngine, FlowEngineBuilder, RunOutcome};
pub use error::{CapabilityError, ErrorKind, FlowError, PublishWarning};
pub use executors::{Planner, Reporter, Researcher, Reviewer, StepExecutor, StepOutput};
pub use model::{
    Feedback, ResearchPlan, ResearchTask, TaskId, WorkflowState, MAX_FEEDBACK_ROUNDS, NO_FEEDBACK,
};
pub use orchestrator::{decide, next_step, Decision, Label};
