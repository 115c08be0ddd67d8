//! Routing between workflow steps
//!
//! [`decide`] is a pure function of the workflow state. [`next_step`] applies
//! the decision (feedback accounting, task retirement) and returns the label
//! of the step the engine must run next.
//!
//! ```text
//!                  ┌──────────┐
//!            ┌────▶│ research │─────┐
//!            │     └──────────┘     ▼
//!            │                ┌───────────┐ retire  ┌─────────┐
//!   revise   │                │ next_step │────────▶│ execute │──┐
//!            │     ┌────────┐ └───────────┘         └─────────┘  │
//!            └─────│ review │◀──────┘  ▲                         │
//!                  └────────┘          └─────────────────────────┘
//!                                  all retired ─▶ report ─▶ stop
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::model::{Feedback, WorkflowState, MAX_FEEDBACK_ROUNDS};

/// Symbolic name of the next step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// Run a research pass on the current task
    Research,
    /// Review the current task's findings
    Review,
    /// Synthesize and publish the report
    Report,
    /// Terminal: the run is over
    Stop,
    /// Re-run the orchestrator without executing a capability step
    Execute,
}

impl Label {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stop)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Review => "review",
            Self::Report => "report",
            Self::Stop => "stop",
            Self::Execute => "execute",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the orchestrator will do with the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First research pass of the current task
    Research,
    /// Findings are waiting for review
    Review,
    /// Reviewer asked for changes and budget remains: count the check, research again
    Revise,
    /// Reviewer accepted the findings: count the check, retire the task
    Accept,
    /// Reviewer asked for changes but this check used the last of the budget:
    /// count the check, retire the task
    GiveUp,
    /// Budget was already spent on entry: retire without counting
    ForceRetire,
    /// Every task retired, no report yet
    Report,
    /// Every task retired and the report exists
    Stop,
}

impl Decision {
    /// Whether applying this decision retires the current task
    pub fn retires_task(&self) -> bool {
        matches!(self, Self::Accept | Self::GiveUp | Self::ForceRetire)
    }

    /// Whether applying this decision consumes one feedback check
    pub fn counts_feedback(&self) -> bool {
        matches!(self, Self::Revise | Self::Accept | Self::GiveUp)
    }

    /// Label emitted once the decision has been applied
    pub fn label(&self) -> Label {
        match self {
            Self::Research | Self::Revise => Label::Research,
            Self::Review => Label::Review,
            Self::Accept | Self::GiveUp | Self::ForceRetire => Label::Execute,
            Self::Report => Label::Report,
            Self::Stop => Label::Stop,
        }
    }
}

/// Decide what to do next. First matching rule wins.
pub fn decide(state: &WorkflowState) -> Decision {
    let Some(task) = state.current_task.as_ref() else {
        return if state.report.is_none() {
            Decision::Report
        } else {
            Decision::Stop
        };
    };

    if task.feedback_count == 0 && task.results.is_none() {
        return Decision::Research;
    }

    if task.feedback_count < MAX_FEEDBACK_ROUNDS {
        return match &task.feedback {
            Some(Feedback::Accepted) => Decision::Accept,
            Some(Feedback::Revise(_)) if task.feedback_count + 1 >= MAX_FEEDBACK_ROUNDS => {
                Decision::GiveUp
            }
            Some(Feedback::Revise(_)) => Decision::Revise,
            None => Decision::Review,
        };
    }

    Decision::ForceRetire
}

/// Apply a decision to the state and return the resulting label.
pub fn apply(state: &mut WorkflowState, decision: Decision) -> Label {
    if decision.counts_feedback() {
        if let Some(task) = state.current_task.as_mut() {
            task.feedback_count += 1;
        }
    }

    if decision.retires_task() {
        if let Some(task_id) = state.retire_current_task() {
            debug!(
                task_id = %task_id,
                decision = ?decision,
                next_task = state.current_task.as_ref().map(|t| t.topic.as_str()),
                "Task retired"
            );
        }
    }

    decision.label()
}

/// Decide and apply in one call.
pub fn next_step(state: &mut WorkflowState) -> Label {
    let decision = decide(state);
    let label = apply(state, decision);
    debug!(decision = ?decision, label = %label, "Routed");
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResearchPlan, ResearchTask};

    fn state_with(tasks: &[&str]) -> WorkflowState {
        let mut state = WorkflowState::new("Acme");
        let plan = ResearchPlan::from_topics(tasks.iter().copied());
        state.current_task = plan.tasks.first().cloned();
        state.plan = Some(plan);
        state
    }

    fn current(state: &mut WorkflowState) -> &mut ResearchTask {
        state.current_task.as_mut().unwrap()
    }

    #[test]
    fn test_fresh_task_routes_to_research() {
        let mut state = state_with(&["pricing"]);
        assert_eq!(decide(&state), Decision::Research);
        assert_eq!(next_step(&mut state), Label::Research);
        assert_eq!(current(&mut state).feedback_count, 0);
    }

    #[test]
    fn test_results_without_feedback_route_to_review() {
        let mut state = state_with(&["pricing"]);
        current(&mut state).results = Some("findings".into());

        assert_eq!(next_step(&mut state), Label::Review);
        assert_eq!(current(&mut state).feedback_count, 0);
    }

    #[test]
    fn test_actionable_feedback_routes_back_to_research() {
        let mut state = state_with(&["pricing"]);
        current(&mut state).results = Some("findings".into());
        current(&mut state).feedback = Some(Feedback::from_review("add revenue"));

        assert_eq!(next_step(&mut state), Label::Research);
        assert_eq!(current(&mut state).feedback_count, 1);
        assert!(state.completed_tasks.is_empty());
    }

    #[test]
    fn test_sentinel_feedback_retires_task() {
        let mut state = state_with(&["pricing"]);
        current(&mut state).results = Some("findings".into());
        current(&mut state).feedback = Some(Feedback::Accepted);

        assert_eq!(next_step(&mut state), Label::Execute);
        assert!(state.current_task.is_none());
        assert_eq!(state.completed_tasks.len(), 1);
        assert_eq!(state.completed_tasks[0].feedback_count, 1);
        assert!(state.completed_tasks[0].is_complete);

        assert_eq!(next_step(&mut state), Label::Report);
        state.report = Some("report".into());
        assert_eq!(next_step(&mut state), Label::Stop);
    }

    #[test]
    fn test_last_feedback_check_retires_without_another_pass() {
        let mut state = state_with(&["pricing"]);
        current(&mut state).results = Some("findings".into());
        current(&mut state).feedback_count = 2;
        current(&mut state).feedback = Some(Feedback::from_review("still thin"));

        assert_eq!(decide(&state), Decision::GiveUp);
        assert_eq!(next_step(&mut state), Label::Execute);
        assert_eq!(state.completed_tasks[0].feedback_count, 3);
    }

    #[test]
    fn test_exhausted_budget_force_retires_without_counting() {
        let mut state = state_with(&["pricing", "team"]);
        current(&mut state).results = Some("findings".into());
        current(&mut state).feedback_count = 3;

        assert_eq!(decide(&state), Decision::ForceRetire);
        assert_eq!(next_step(&mut state), Label::Execute);
        assert_eq!(state.completed_tasks[0].feedback_count, 3);
        assert_eq!(current(&mut state).topic, "team");
    }

    #[test]
    fn test_retirement_selects_next_plan_task() {
        let mut state = state_with(&["first", "second"]);
        current(&mut state).results = Some("findings".into());
        current(&mut state).feedback = Some(Feedback::Accepted);

        next_step(&mut state);

        let next = state.current_task.as_ref().unwrap();
        assert_eq!(next.topic, "second");
        assert_ne!(next.task_id, state.completed_tasks[0].task_id);
        assert_eq!(next_step(&mut state), Label::Research);
    }

    #[test]
    fn test_no_plan_and_no_task_routes_to_report() {
        let state = WorkflowState::new("Acme");
        assert_eq!(decide(&state), Decision::Report);
    }

    #[test]
    fn test_decide_is_deterministic() {
        let mut state = state_with(&["pricing"]);
        current(&mut state).results = Some("findings".into());
        current(&mut state).feedback = Some(Feedback::from_review("more"));
        let snapshot = state.clone();

        for _ in 0..10 {
            assert_eq!(decide(&snapshot), Decision::Revise);
        }
        assert_eq!(snapshot, state);
    }

    #[test]
    fn test_non_mutating_decisions_are_idempotent() {
        let mut state = state_with(&["pricing"]);
        let before = state.clone();

        for _ in 0..5 {
            assert_eq!(next_step(&mut state), Label::Research);
        }
        assert_eq!(state, before);

        current(&mut state).results = Some("findings".into());
        let before = state.clone();
        for _ in 0..5 {
            assert_eq!(next_step(&mut state), Label::Review);
        }
        assert_eq!(state, before);
    }

    #[test]
    fn test_every_execute_makes_progress() {
        let mut state = state_with(&["a", "b", "c"]);
        let mut executes = 0;

        // Drive the orchestrator alone: stand in for the executors inline.
        for _ in 0..50 {
            let completed_before = state.completed_tasks.len();
            match next_step(&mut state) {
                Label::Research => {
                    let task = current(&mut state);
                    task.results = Some(format!("findings on {}", task.topic));
                    task.feedback = None;
                }
                Label::Review => current(&mut state).feedback = Some(Feedback::Accepted),
                Label::Execute => {
                    executes += 1;
                    assert_eq!(state.completed_tasks.len(), completed_before + 1);
                }
                Label::Report => state.report = Some("report".into()),
                Label::Stop => break,
            }
        }

        assert_eq!(executes, 3);
        assert!(state.is_finished());
    }

    #[test]
    fn test_label_serialization() {
        assert_eq!(serde_json::to_string(&Label::Execute).unwrap(), "\"execute\"");
        let label: Label = serde_json::from_str("\"review\"").unwrap();
        assert_eq!(label, Label::Review);
        assert!(Label::Stop.is_terminal());
        assert!(!Label::Execute.is_terminal());
    }
}
