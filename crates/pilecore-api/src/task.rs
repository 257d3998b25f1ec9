//! Task-status documents of the asynchronous service endpoints.
//!
//! A failed task is a distinct outcome, never an empty result.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, Result};

/// State reported by the task-status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Pending,
    Started,
    Retry,
    Success,
    Failure,
}

impl TaskState {
    /// Whether polling can stop.
    pub fn is_finished(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::Retry => "RETRY",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
        };
        f.write_str(s)
    }
}

/// A task-status document, optionally carrying the task result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskDocument<T> {
    pub state: TaskState,
    pub result: Option<T>,
    #[serde(alias = "msg")]
    pub message: Option<String>,
    pub traceback: Option<String>,
}

/// Outcome of a finished task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed { reason: String },
}

impl<T> TaskOutcome<T> {
    /// # Errors
    ///
    /// `DecodeError::TaskFailed` for a failed task.
    pub fn into_result(self) -> Result<T> {
        match self {
            TaskOutcome::Completed(value) => Ok(value),
            TaskOutcome::Failed { reason } => Err(DecodeError::TaskFailed { reason }),
        }
    }
}

impl<T> TaskDocument<T> {
    /// # Errors
    ///
    /// `TaskNotFinished` while the task is pending, started or retrying;
    /// `MissingResult` for a successful task without a result.
    pub fn into_outcome(self) -> Result<TaskOutcome<T>> {
        match self.state {
            TaskState::Success => self
                .result
                .map(TaskOutcome::Completed)
                .ok_or(DecodeError::MissingResult),
            TaskState::Failure => {
                let reason = match (self.message, self.traceback) {
                    (Some(message), Some(traceback)) => format!("{message}\n{traceback}"),
                    (Some(message), None) => message,
                    (None, Some(traceback)) => traceback,
                    (None, None) => "no message".to_string(),
                };
                Ok(TaskOutcome::Failed { reason })
            }
            state => Err(DecodeError::TaskNotFinished(state)),
        }
    }
}

/// Unwrap a document that may be a task-status envelope.
///
/// A document without a `state` field is taken as a completed result.
///
/// # Errors
///
/// As [`TaskDocument::into_outcome`].
pub fn resolve_document(document: Value) -> Result<TaskOutcome<Value>> {
    if document.get("state").is_none() {
        return Ok(TaskOutcome::Completed(document));
    }
    let task: TaskDocument<Value> = serde_json::from_value(document)?;
    task.into_outcome()
}

/// Delays between task-status polls: doubling from 50 ms, capped at 10 s.
#[derive(Debug, Clone)]
pub struct PollBackoff {
    next: Duration,
    max: Duration,
    remaining: Option<usize>,
}

impl PollBackoff {
    pub const INITIAL: Duration = Duration::from_millis(50);
    pub const MAX: Duration = Duration::from_secs(10);

    pub fn new() -> Self {
        Self::with_bounds(Self::INITIAL, Self::MAX)
    }

    pub fn with_bounds(initial: Duration, max: Duration) -> Self {
        Self {
            next: initial.min(max),
            max,
            remaining: None,
        }
    }

    /// Stop after `attempts` delays.
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.remaining = Some(attempts);
        self
    }
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for PollBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let delays: Vec<u128> = PollBackoff::new().take(10).map(|d| d.as_millis()).collect();
        assert_eq!(
            delays,
            vec![50, 100, 200, 400, 800, 1600, 3200, 6400, 10_000, 10_000]
        );
    }

    #[test]
    fn test_backoff_max_attempts() {
        assert_eq!(PollBackoff::new().with_max_attempts(3).count(), 3);
    }

    #[test]
    fn test_state_parsing() {
        let state: TaskState = serde_json::from_value(json!("RETRY")).unwrap();
        assert_eq!(state, TaskState::Retry);
        assert!(!state.is_finished());
        assert!(TaskState::Failure.is_finished());
    }

    #[test]
    fn test_failure_is_not_empty_result() {
        let doc: TaskDocument<Value> = serde_json::from_value(json!({
            "state": "FAILURE",
            "msg": "CPT could not be parsed",
            "traceback": "Traceback ..."
        }))
        .unwrap();
        let outcome = doc.into_outcome().unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::Failed {
                reason: "CPT could not be parsed\nTraceback ...".to_string()
            }
        );
        assert!(matches!(
            outcome.into_result(),
            Err(DecodeError::TaskFailed { .. })
        ));
    }

    #[test]
    fn test_success_with_empty_result_is_completed() {
        let doc: TaskDocument<Value> =
            serde_json::from_value(json!({ "state": "SUCCESS", "result": { "sub_groups": [] } }))
                .unwrap();
        assert_eq!(
            doc.into_outcome().unwrap(),
            TaskOutcome::Completed(json!({ "sub_groups": [] }))
        );
    }

    #[test]
    fn test_success_without_result_is_error() {
        let doc: TaskDocument<Value> =
            serde_json::from_value(json!({ "state": "SUCCESS" })).unwrap();
        assert!(matches!(doc.into_outcome(), Err(DecodeError::MissingResult)));
    }

    #[test]
    fn test_pending_is_not_finished() {
        assert!(matches!(
            resolve_document(json!({ "state": "PENDING" })),
            Err(DecodeError::TaskNotFinished(TaskState::Pending))
        ));
    }

    #[test]
    fn test_plain_document_is_completed() {
        let doc = json!({ "cpts": [] });
        assert_eq!(
            resolve_document(doc.clone()).unwrap(),
            TaskOutcome::Completed(doc)
        );
    }
}
