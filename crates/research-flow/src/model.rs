//! Research task, plan and workflow state
//!
//! The workflow state is a single owned value threaded through every step
//! executor and the orchestrator. The plan keeps the tasks exactly as the
//! planner created them; `current_task` is the working copy of the task in
//! progress and moves into `completed_tasks` on retirement.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal review answer meaning "accept the findings as-is".
///
/// Matched exactly (case-sensitive, no trimming).
pub const NO_FEEDBACK: &str = "No feedback";

/// Maximum number of feedback checks a task goes through before it is
/// retired regardless of review outcome.
pub const MAX_FEEDBACK_ROUNDS: u32 = 3;

/// Unique, immutable identifier of a research task
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a review pass
///
/// Persisted as the raw review text, with [`NO_FEEDBACK`] standing for
/// `Accepted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Feedback {
    /// The reviewer found no issues
    Accepted,
    /// The reviewer asked for another research pass
    Revise(String),
}

impl Feedback {
    /// Interpret a review answer. Only the exact sentinel literal is accepted.
    pub fn from_review(text: impl Into<String>) -> Self {
        let text = text.into();
        if text == NO_FEEDBACK {
            Self::Accepted
        } else {
            Self::Revise(text)
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Accepted => NO_FEEDBACK,
            Self::Revise(text) => text,
        }
    }
}

impl From<String> for Feedback {
    fn from(text: String) -> Self {
        Self::from_review(text)
    }
}

impl From<Feedback> for String {
    fn from(feedback: Feedback) -> Self {
        match feedback {
            Feedback::Accepted => NO_FEEDBACK.to_string(),
            Feedback::Revise(text) => text,
        }
    }
}

/// One topic-scoped unit of research
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchTask {
    /// Generated at creation, never changes
    pub task_id: TaskId,

    /// Research topic, never changes
    pub topic: String,

    /// Findings of the latest research pass
    pub results: Option<String>,

    /// Citations of the latest research pass
    pub citations: Option<Vec<String>>,

    /// Review outcome; cleared by every research pass
    pub feedback: Option<Feedback>,

    /// Number of feedback checks consumed so far
    pub feedback_count: u32,

    /// Set when the orchestrator retires the task
    pub is_complete: bool,
}

impl ResearchTask {
    /// Create a fresh task for a topic
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            task_id: TaskId::new(),
            topic: topic.into(),
            results: None,
            citations: None,
            feedback: None,
            feedback_count: 0,
            is_complete: false,
        }
    }

    /// Whether the retry budget is used up
    pub fn feedback_budget_exhausted(&self) -> bool {
        self.feedback_count >= MAX_FEEDBACK_ROUNDS
    }
}

/// Ordered list of research tasks produced once by the planner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub tasks: Vec<ResearchTask>,
}

impl ResearchPlan {
    /// Wrap each topic in a fresh task, keeping the given order
    pub fn from_topics<I, T>(topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tasks: topics.into_iter().map(ResearchTask::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, task_id: &TaskId) -> Option<&ResearchTask> {
        self.tasks.iter().find(|t| &t.task_id == task_id)
    }
}

/// Shared state of one workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Target company; fixed for the run
    pub company_name: String,

    /// Set once by the planning step
    pub plan: Option<ResearchPlan>,

    /// Retired tasks in retirement order; append-only
    pub completed_tasks: Vec<ResearchTask>,

    /// Working copy of the task in progress
    pub current_task: Option<ResearchTask>,

    /// Final report; set at most once
    pub report: Option<String>,
}

impl WorkflowState {
    pub fn new(company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            plan: None,
            completed_tasks: Vec::new(),
            current_task: None,
            report: None,
        }
    }

    /// Whether a task with this id has been retired
    pub fn is_completed(&self, task_id: &TaskId) -> bool {
        self.completed_tasks.iter().any(|t| &t.task_id == task_id)
    }

    /// First plan task, in insertion order, that has not been retired
    pub fn next_uncompleted_task(&self) -> Option<&ResearchTask> {
        self.plan
            .as_ref()?
            .tasks
            .iter()
            .find(|t| !self.is_completed(&t.task_id))
    }

    /// Retire the current task and advance to the next uncompleted one.
    ///
    /// Returns the id of the retired task, or `None` when there was no
    /// current task or it had already been retired.
    pub fn retire_current_task(&mut self) -> Option<TaskId> {
        let mut task = self.current_task.take()?;
        let task_id = task.task_id.clone();

        if !self.is_completed(&task_id) {
            task.is_complete = true;
            self.completed_tasks.push(task);
        }

        self.current_task = self.next_uncompleted_task().cloned();
        Some(task_id)
    }

    /// Number of planned tasks
    pub fn total_tasks(&self) -> usize {
        self.plan.as_ref().map_or(0, ResearchPlan::len)
    }

    /// (retired, planned)
    pub fn progress(&self) -> (usize, usize) {
        (self.completed_tasks.len(), self.total_tasks())
    }

    /// Planned, every task retired and a report produced
    pub fn is_finished(&self) -> bool {
        self.plan.is_some() && self.current_task.is_none() && self.report.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planned_state(topics: &[&str]) -> WorkflowState {
        let mut state = WorkflowState::new("Acme");
        let plan = ResearchPlan::from_topics(topics.iter().copied());
        state.current_task = plan.tasks.first().cloned();
        state.plan = Some(plan);
        state
    }

    #[test]
    fn test_new_task_defaults() {
        let task = ResearchTask::new("Pricing");
        assert_eq!(task.topic, "Pricing");
        assert!(task.results.is_none());
        assert!(task.citations.is_none());
        assert!(task.feedback.is_none());
        assert_eq!(task.feedback_count, 0);
        assert!(!task.is_complete);
    }

    #[test]
    fn test_task_ids_are_unique() {
        let plan = ResearchPlan::from_topics(["a", "a", "a"]);
        assert_ne!(plan.tasks[0].task_id, plan.tasks[1].task_id);
        assert_ne!(plan.tasks[1].task_id, plan.tasks[2].task_id);
    }

    #[test]
    fn test_feedback_sentinel_is_exact() {
        assert!(Feedback::from_review("No feedback").is_accepted());
        assert!(!Feedback::from_review("no feedback").is_accepted());
        assert!(!Feedback::from_review("No feedback.").is_accepted());
        assert!(!Feedback::from_review(" No feedback").is_accepted());
        assert_eq!(
            Feedback::from_review("needs more detail"),
            Feedback::Revise("needs more detail".to_string())
        );
    }

    #[test]
    fn test_feedback_serializes_as_plain_text() {
        let json = serde_json::to_string(&Feedback::Accepted).unwrap();
        assert_eq!(json, "\"No feedback\"");

        let revise: Feedback = serde_json::from_str("\"add revenue figures\"").unwrap();
        assert_eq!(revise, Feedback::Revise("add revenue figures".to_string()));
    }

    #[test]
    fn test_next_uncompleted_task_follows_plan_order() {
        let mut state = planned_state(&["first", "second", "third"]);
        let first = state.plan.as_ref().unwrap().tasks[0].clone();

        assert_eq!(state.next_uncompleted_task().unwrap().topic, "first");

        state.completed_tasks.push(first);
        assert_eq!(state.next_uncompleted_task().unwrap().topic, "second");
    }

    #[test]
    fn test_next_uncompleted_task_skips_out_of_order_completion() {
        let mut state = planned_state(&["first", "second", "third"]);
        let second = state.plan.as_ref().unwrap().tasks[1].clone();
        state.completed_tasks.push(second);

        assert_eq!(state.next_uncompleted_task().unwrap().topic, "first");
    }

    #[test]
    fn test_retire_moves_task_and_advances() {
        let mut state = planned_state(&["first", "second"]);
        state.current_task.as_mut().unwrap().results = Some("findings".into());

        let retired = state.retire_current_task().unwrap();

        assert_eq!(state.completed_tasks.len(), 1);
        assert_eq!(state.completed_tasks[0].task_id, retired);
        assert!(state.completed_tasks[0].is_complete);
        assert_eq!(state.completed_tasks[0].results.as_deref(), Some("findings"));
        assert_eq!(state.current_task.as_ref().unwrap().topic, "second");
    }

    #[test]
    fn test_retire_last_task_clears_current() {
        let mut state = planned_state(&["only"]);
        state.retire_current_task();

        assert!(state.current_task.is_none());
        assert_eq!(state.progress(), (1, 1));
        assert!(!state.is_finished());

        state.report = Some("report".into());
        assert!(state.is_finished());
    }

    #[test]
    fn test_retire_never_duplicates() {
        let mut state = planned_state(&["only"]);
        let task = state.current_task.clone().unwrap();
        state.retire_current_task();

        // Re-inject the same task as current and retire again
        state.current_task = Some(task);
        state.retire_current_task();

        assert_eq!(state.completed_tasks.len(), 1);
        assert!(state.current_task.is_none());
    }

    #[test]
    fn test_retire_without_current_task() {
        let mut state = WorkflowState::new("Acme");
        assert!(state.retire_current_task().is_none());
        assert!(state.completed_tasks.is_empty());
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let mut state = planned_state(&["first", "second"]);
        {
            let task = state.current_task.as_mut().unwrap();
            task.results = Some("findings".into());
            task.citations = Some(vec!["https://acme.example/about".into()]);
            task.feedback = Some(Feedback::Accepted);
            task.feedback_count = 1;
        }

        let json = serde_json::to_string(&state).unwrap();
        let restored: WorkflowState = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, state);
    }
}
