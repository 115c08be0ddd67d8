//! Error types for the research flow
//!
//! A run either returns a complete report or fails with exactly one
//! [`FlowError`]. Publishing problems after a report was produced are not
//! errors: they are reported as [`PublishWarning`] next to the report.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::TaskId;

/// Failure of an external capability call (planning, research, review,
/// reporting or publishing).
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// Transport-level failure reaching the provider
    #[error("transport failure: {0}")]
    Transport(String),

    /// The provider did not answer in time
    #[error("capability timed out: {0}")]
    Timeout(String),

    /// The provider answered with something unusable
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The provider refused the request (auth, quota, validation)
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl CapabilityError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// Stable label for each fatal error kind, used for user-visible reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Planning,
    Precondition,
    Research,
    Review,
    Reporting,
    Checkpoint,
    StepLimitExceeded,
    InvalidInput,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "PlanningError",
            Self::Precondition => "PreconditionError",
            Self::Research => "ResearchError",
            Self::Review => "ReviewError",
            Self::Reporting => "ReportingError",
            Self::Checkpoint => "CheckpointError",
            Self::StepLimitExceeded => "StepLimitExceeded",
            Self::InvalidInput => "InvalidInput",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal errors that abort a run.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Planning produced no usable topics, or the planning call failed
    #[error("Planning failed for {company}: {message}")]
    Planning {
        company: String,
        message: String,
        #[source]
        source: Option<CapabilityError>,
    },

    /// A step ran against state that violates its precondition
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// The research capability failed for a task
    #[error("Research failed for task {task_id} ({topic}): {source}")]
    Research {
        task_id: TaskId,
        topic: String,
        #[source]
        source: CapabilityError,
    },

    /// The review capability failed for a task
    #[error("Review failed for task {task_id}: {source}")]
    Review {
        task_id: TaskId,
        #[source]
        source: CapabilityError,
    },

    /// No report text was produced
    #[error("Reporting failed: {message}")]
    Reporting {
        message: String,
        #[source]
        source: Option<CapabilityError>,
    },

    /// Persisting or loading workflow state failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// The run did not converge within the configured number of transitions
    #[error("Step limit exceeded: {0} transitions")]
    StepLimitExceeded(usize),

    /// The run was started with unusable input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl FlowError {
    /// Create a planning error without an underlying capability failure
    pub fn planning(company: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Planning {
            company: company.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a planning error caused by the planning capability
    pub fn planning_failed(company: impl Into<String>, source: CapabilityError) -> Self {
        Self::Planning {
            company: company.into(),
            message: "planning capability failed".to_string(),
            source: Some(source),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn research(task_id: TaskId, topic: impl Into<String>, source: CapabilityError) -> Self {
        Self::Research {
            task_id,
            topic: topic.into(),
            source,
        }
    }

    pub fn review(task_id: TaskId, source: CapabilityError) -> Self {
        Self::Review { task_id, source }
    }

    /// Create a reporting error without an underlying capability failure
    pub fn reporting(message: impl Into<String>) -> Self {
        Self::Reporting {
            message: message.into(),
            source: None,
        }
    }

    /// Create a reporting error caused by the reporting capability
    pub fn reporting_failed(source: CapabilityError) -> Self {
        Self::Reporting {
            message: "reporting capability failed".to_string(),
            source: Some(source),
        }
    }

    pub fn checkpoint_error(message: impl Into<String>) -> Self {
        Self::Checkpoint(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// The labeled kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Planning { .. } => ErrorKind::Planning,
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::Research { .. } => ErrorKind::Research,
            Self::Review { .. } => ErrorKind::Review,
            Self::Reporting { .. } => ErrorKind::Reporting,
            Self::Checkpoint(_) => ErrorKind::Checkpoint,
            Self::StepLimitExceeded(_) => ErrorKind::StepLimitExceeded,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Non-fatal failure of the publish side-channel.
///
/// The in-memory report is still valid when this is raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishWarning {
    /// Title of the document that could not be published
    pub document_title: String,
    /// Human readable cause
    pub message: String,
}

impl PublishWarning {
    pub fn new(document_title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            document_title: document_title.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PublishWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PublishWarning: could not publish \"{}\": {}",
            self.document_title, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    static_assertions::assert_impl_all!(super::FlowError: Send, Sync);
    static_assertions::assert_impl_all!(super::CapabilityError: Send, Sync);
    use super::*;

    #[test]
    fn test_error_kinds_are_labeled() {
        let task_id = TaskId::new();
        let cases = [
            (FlowError::planning("Acme", "no topics"), "PlanningError"),
            (FlowError::precondition("review without results"), "PreconditionError"),
            (
                FlowError::research(task_id.clone(), "pricing", CapabilityError::timeout("30s")),
                "ResearchError",
            ),
            (
                FlowError::review(task_id, CapabilityError::transport("reset")),
                "ReviewError",
            ),
            (FlowError::reporting("empty report"), "ReportingError"),
            (FlowError::StepLimitExceeded(100), "StepLimitExceeded"),
        ];

        for (err, label) in cases {
            assert_eq!(err.kind().as_str(), label);
        }
    }

    #[test]
    fn test_research_error_display_names_topic() {
        let err = FlowError::research(
            TaskId::from("t-1"),
            "market position",
            CapabilityError::malformed("empty findings"),
        );
        let text = err.to_string();
        assert!(text.contains("t-1"));
        assert!(text.contains("market position"));
        assert!(text.contains("empty findings"));
    }

    #[test]
    fn test_reporting_failed_keeps_source() {
        use std::error::Error;

        let err = FlowError::reporting_failed(CapabilityError::rejected("quota"));
        assert_eq!(err.kind(), ErrorKind::Reporting);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_publish_warning_display() {
        let warning = PublishWarning::new("Acme Sales Readiness Report", "401 Unauthorized");
        let text = warning.to_string();
        assert!(text.starts_with("PublishWarning"));
        assert!(text.contains("401 Unauthorized"));
    }
}
