//! Integration tests for complete research runs
//!
//! These tests drive the engine end to end with scripted capabilities:
//! - Acceptance, revision and force-retirement of tasks
//! - Task selection order across a multi-task plan
//! - Reporting failures and publish warnings
//! - Step limits and input validation

use std::collections::HashMap;
use std::sync::Arc;

use research_flow::testing::{
    FailingPublisher, RecordingPublisher, ScriptedPlanner, ScriptedReporter, ScriptedResearcher,
    ScriptedReviewer,
};
use research_flow::{
    CapabilityError, Checkpointer, ErrorKind, Findings, FlowEngine, FlowError, Label,
    MemoryCheckpointer, TaskId, MAX_FEEDBACK_ROUNDS, NO_FEEDBACK,
};

struct Harness {
    researcher: Arc<ScriptedResearcher>,
    reviewer: Arc<ScriptedReviewer>,
    reporter: Arc<ScriptedReporter>,
    publisher: Arc<RecordingPublisher>,
    checkpointer: Arc<MemoryCheckpointer>,
    engine: FlowEngine,
}

fn harness(topics: &[&str], reviewer: ScriptedReviewer, reporter: ScriptedReporter) -> Harness {
    let researcher = Arc::new(ScriptedResearcher::echo());
    let reviewer = Arc::new(reviewer);
    let reporter = Arc::new(reporter);
    let publisher = Arc::new(RecordingPublisher::default());
    let checkpointer = Arc::new(MemoryCheckpointer::new("integration-run"));

    let engine = FlowEngine::builder()
        .planning(Arc::new(ScriptedPlanner::new(topics.iter().copied())))
        .research(researcher.clone())
        .review(reviewer.clone())
        .reporting(reporter.clone())
        .publisher(publisher.clone())
        .checkpointer(checkpointer.clone())
        .build()
        .expect("Failed to build engine");

    Harness {
        researcher,
        reviewer,
        reporter,
        publisher,
        checkpointer,
        engine,
    }
}

// =============================================================================
// Feedback Loop Tests
// =============================================================================

/// A single task accepted on the first review is retired after one check
#[tokio::test]
async fn test_single_task_accepted_first_time() {
    let h = harness(
        &["Company overview"],
        ScriptedReviewer::new([NO_FEEDBACK]),
        ScriptedReporter::ok("# Acme"),
    );

    let outcome = h.engine.run("Acme").await.expect("Run failed");

    assert_eq!(outcome.report, "# Acme");
    assert_eq!(outcome.state.completed_tasks.len(), 1);
    let task = &outcome.state.completed_tasks[0];
    assert_eq!(task.feedback_count, 1);
    assert!(task.is_complete);
    assert!(outcome.state.current_task.is_none());
    assert!(outcome.state.is_finished());

    assert_eq!(h.researcher.call_count(), 1);
    assert_eq!(h.reviewer.call_count(), 1);
    assert_eq!(h.reporter.call_count(), 1);

    // report, then stop
    let latest = h.checkpointer.latest().await.unwrap().unwrap();
    assert_eq!(latest.next, Label::Stop);
    let before = h.checkpointer.load(latest.step - 1).await.unwrap().unwrap();
    assert_eq!(before.metadata.get("step_name").map(String::as_str), Some("reporter"));
}

/// Three consecutive revision requests retire the task without a 4th research pass
#[tokio::test]
async fn test_feedback_budget_force_retires_task() {
    let h = harness(
        &["Pricing"],
        ScriptedReviewer::new(["needs more detail"]),
        ScriptedReporter::ok("report"),
    );

    let outcome = h.engine.run("Acme").await.expect("Run failed");

    let task = &outcome.state.completed_tasks[0];
    assert_eq!(task.feedback_count, MAX_FEEDBACK_ROUNDS);
    assert!(task.is_complete);
    assert_eq!(h.researcher.call_count(), 3);
    assert_eq!(h.reviewer.call_count(), 3);
    assert_eq!(outcome.report, "report");
}

/// Revision feedback is handed to the next research pass
#[tokio::test]
async fn test_revision_feedback_reaches_researcher() {
    let h = harness(
        &["Pricing"],
        ScriptedReviewer::new(["add competitor pricing", NO_FEEDBACK]),
        ScriptedReporter::ok("report"),
    );

    let outcome = h.engine.run("Acme").await.expect("Run failed");

    assert_eq!(
        h.researcher.revisions(),
        vec![None, Some("add competitor pricing".to_string())]
    );
    assert_eq!(outcome.state.completed_tasks[0].feedback_count, 2);
}

/// Near-miss sentinels are treated as revision requests
#[tokio::test]
async fn test_sentinel_match_is_exact() {
    let h = harness(
        &["Pricing"],
        ScriptedReviewer::new(["no feedback", NO_FEEDBACK]),
        ScriptedReporter::ok("report"),
    );

    h.engine.run("Acme").await.expect("Run failed");
    assert_eq!(h.researcher.call_count(), 2);
}

// =============================================================================
// Task Selection Tests
// =============================================================================

/// After task 1 retires, task 2 becomes current and task 1 is never re-selected
#[tokio::test]
async fn test_second_task_selected_after_first_retires() {
    let h = harness(
        &["Overview", "Pricing"],
        ScriptedReviewer::new([NO_FEEDBACK]),
        ScriptedReporter::ok("report"),
    );

    let outcome = h.engine.run("Acme").await.expect("Run failed");

    assert_eq!(h.researcher.topics(), vec!["Overview", "Pricing"]);
    let topics: Vec<_> = outcome
        .state
        .completed_tasks
        .iter()
        .map(|t| t.topic.as_str())
        .collect();
    assert_eq!(topics, vec!["Overview", "Pricing"]);

    let mut saw_switch = false;
    for step in h.checkpointer.list().await.unwrap() {
        let cp = h.checkpointer.load(step).await.unwrap().unwrap();
        if cp.state.completed_tasks.len() == 1 {
            let current = cp.state.current_task.as_ref().expect("Task 2 should be current");
            assert_eq!(current.topic, "Pricing");
            assert_eq!(
                cp.state.next_uncompleted_task().map(|t| t.topic.as_str()),
                Some("Pricing")
            );
            saw_switch = true;
        }
    }
    assert!(saw_switch);
}

/// Feedback counts never exceed the budget, never decrease, and tasks retire once
#[tokio::test]
async fn test_checkpoint_history_invariants() {
    let h = harness(
        &["Overview", "Pricing", "Leadership"],
        ScriptedReviewer::new(["more", NO_FEEDBACK, "more", "more", "more", NO_FEEDBACK]),
        ScriptedReporter::ok("report"),
    );

    h.engine.run("Acme").await.expect("Run failed");

    let steps = h.checkpointer.list().await.unwrap();
    assert_eq!(steps, (1..=steps.len()).collect::<Vec<_>>());

    let mut counts: HashMap<TaskId, u32> = HashMap::new();
    for step in steps {
        let cp = h.checkpointer.load(step).await.unwrap().unwrap();
        let tasks = cp.state.completed_tasks.iter().chain(cp.state.current_task.iter());

        for task in tasks {
            assert!(task.feedback_count <= MAX_FEEDBACK_ROUNDS);
            let previous = counts.insert(task.task_id.clone(), task.feedback_count);
            assert!(previous.unwrap_or(0) <= task.feedback_count);
        }

        let mut ids: Vec<_> = cp.state.completed_tasks.iter().map(|t| &t.task_id).collect();
        let total = ids.len();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids.dedup();
        assert_eq!(ids.len(), total, "task retired twice at step {}", step);
    }
}

// =============================================================================
// Reporting and Publishing Tests
// =============================================================================

/// A failing reporting capability aborts the run without publishing
#[tokio::test]
async fn test_reporting_failure_is_fatal() {
    let h = harness(
        &["Overview"],
        ScriptedReviewer::new([NO_FEEDBACK]),
        ScriptedReporter::failing(),
    );

    let err = h.engine.run("Acme").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Reporting);
    assert!(h.publisher.published().is_empty());

    let latest = h.checkpointer.latest().await.unwrap().unwrap();
    assert!(latest.state.report.is_none());
    assert_eq!(latest.next, Label::Report);
}

/// A failing publisher produces a warning and still returns the report
#[tokio::test]
async fn test_publish_failure_returns_warning() {
    let researcher = Arc::new(ScriptedResearcher::echo());
    let engine = FlowEngine::builder()
        .planning(Arc::new(ScriptedPlanner::new(["Overview"])))
        .research(researcher)
        .review(Arc::new(ScriptedReviewer::new([NO_FEEDBACK])))
        .reporting(Arc::new(ScriptedReporter::ok("# Acme")))
        .publisher(Arc::new(FailingPublisher))
        .build()
        .unwrap();

    let outcome = engine.run("Acme").await.expect("Publish failure must not abort the run");

    assert_eq!(outcome.report, "# Acme");
    assert!(outcome.page_id.is_none());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].document_title, "Acme Sales Readiness Report");
}

/// A successful publish returns the page id and the full report body
#[tokio::test]
async fn test_published_report_body() {
    let h = harness(
        &["Overview"],
        ScriptedReviewer::new([NO_FEEDBACK]),
        ScriptedReporter::ok("# Acme\n\nBody"),
    );

    let outcome = h.engine.run("Acme").await.unwrap();

    assert_eq!(outcome.page_id.map(|p| p.0), Some("page-1".to_string()));
    assert_eq!(
        h.publisher.published(),
        vec![("Acme Sales Readiness Report".to_string(), "# Acme\n\nBody".to_string())]
    );
}

// =============================================================================
// Failure and Validation Tests
// =============================================================================

/// Research failures carry the task they failed on
#[tokio::test]
async fn test_research_failure_is_fatal() {
    let engine = FlowEngine::builder()
        .planning(Arc::new(ScriptedPlanner::new(["Overview"])))
        .research(Arc::new(ScriptedResearcher::new(vec![Err(
            CapabilityError::timeout("search timed out"),
        )])))
        .review(Arc::new(ScriptedReviewer::new([NO_FEEDBACK])))
        .reporting(Arc::new(ScriptedReporter::ok("report")))
        .build()
        .unwrap();

    let err = engine.run("Acme").await.unwrap_err();
    match err {
        FlowError::Research { topic, .. } => assert_eq!(topic, "Overview"),
        other => panic!("Expected research error, got {:?}", other),
    }
}

/// Empty findings are rejected
#[tokio::test]
async fn test_blank_findings_rejected() {
    let engine = FlowEngine::builder()
        .planning(Arc::new(ScriptedPlanner::new(["Overview"])))
        .research(Arc::new(ScriptedResearcher::new(vec![Ok(Findings::new("  "))])))
        .review(Arc::new(ScriptedReviewer::new([NO_FEEDBACK])))
        .reporting(Arc::new(ScriptedReporter::ok("report")))
        .build()
        .unwrap();

    assert_eq!(engine.run("Acme").await.unwrap_err().kind(), ErrorKind::Research);
}

/// A planner with no topics fails the run before any research
#[tokio::test]
async fn test_empty_plan_is_planning_error() {
    let researcher = Arc::new(ScriptedResearcher::echo());
    let engine = FlowEngine::builder()
        .planning(Arc::new(ScriptedPlanner::new(Vec::<String>::new())))
        .research(researcher.clone())
        .review(Arc::new(ScriptedReviewer::new([NO_FEEDBACK])))
        .reporting(Arc::new(ScriptedReporter::ok("report")))
        .build()
        .unwrap();

    assert_eq!(engine.run("Acme").await.unwrap_err().kind(), ErrorKind::Planning);
    assert_eq!(researcher.call_count(), 0);
}

/// Runs that cannot converge hit the step limit
#[tokio::test]
async fn test_step_limit_exceeded() {
    let engine = FlowEngine::builder()
        .planning(Arc::new(ScriptedPlanner::new(["A", "B", "C", "D"])))
        .research(Arc::new(ScriptedResearcher::echo()))
        .review(Arc::new(ScriptedReviewer::new(["more"])))
        .reporting(Arc::new(ScriptedReporter::ok("report")))
        .max_steps(10)
        .build()
        .unwrap();

    let err = engine.run("Acme").await.unwrap_err();
    assert!(matches!(err, FlowError::StepLimitExceeded(10)));
}

/// Blank company names are rejected before planning
#[tokio::test]
async fn test_blank_company_rejected() {
    let h = harness(
        &["Overview"],
        ScriptedReviewer::new([NO_FEEDBACK]),
        ScriptedReporter::ok("report"),
    );

    let err = h.engine.run("  \t").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(h.checkpointer.latest().await.unwrap().is_none());
}

/// Starting a run id twice is refused
#[tokio::test]
async fn test_run_twice_refused() {
    let h = harness(
        &["Overview"],
        ScriptedReviewer::new([NO_FEEDBACK]),
        ScriptedReporter::ok("report"),
    );

    h.engine.run("Acme").await.unwrap();
    let err = h.engine.run("Acme").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.reporter.call_count(), 1);
}
