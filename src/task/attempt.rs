//! Task attempts and their status state machine
//!
//! Status only ever moves forward:
//!
//! ```text
//! NotSubmitted -> Submitted -> InProgress -> Complete
//!                                  \-> Failed
//! ```
//!
//! Backward transitions and updates to a terminal attempt signal a
//! protocol error from an external worker; they are rejected, leaving the
//! attempt's last valid state intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskError;

/// Lifecycle status of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    /// Created but not yet handed to a worker
    #[default]
    NotSubmitted,
    /// Handed to a provisioning worker
    Submitted,
    /// Worker acknowledged and is executing
    InProgress,
    /// Terminal success
    Complete,
    /// Terminal failure for this attempt
    Failed,
}

impl AttemptStatus {
    /// Position in the forward-only ordering. `Complete` and `Failed`
    /// share the terminal rank.
    fn rank(&self) -> u8 {
        match self {
            AttemptStatus::NotSubmitted => 0,
            AttemptStatus::Submitted => 1,
            AttemptStatus::InProgress => 2,
            AttemptStatus::Complete | AttemptStatus::Failed => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Complete | AttemptStatus::Failed)
    }

    /// Whether moving to `next` is a legal forward transition. Repeated
    /// `Submitted`/`InProgress` reports are allowed (workers may send
    /// progress updates); terminal states accept nothing further.
    pub fn can_transition_to(&self, next: AttemptStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next.rank() > self.rank() {
            return true;
        }
        *self == next && matches!(self, AttemptStatus::Submitted | AttemptStatus::InProgress)
    }
}

/// One execution try of a task. Identity is immutable; status fields only
/// move forward through [`AttemptStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAttempt {
    /// Attempt id, monotonically increasing per task starting at 1
    pub id: u32,

    /// When the attempt was handed to a worker
    #[serde(rename = "submitTime")]
    #[serde(default)]
    pub submit_time: Option<DateTime<Utc>>,

    /// Current status
    pub status: AttemptStatus,

    /// Worker-defined status code from the last report
    #[serde(rename = "statusCode")]
    #[serde(default)]
    pub status_code: Option<i32>,

    /// Human-readable message from the last report
    #[serde(rename = "statusMessage")]
    #[serde(default)]
    pub status_message: Option<String>,

    /// When the status last changed
    #[serde(rename = "statusTime")]
    #[serde(default)]
    pub status_time: Option<DateTime<Utc>>,

    /// Opaque payload sent to the worker describing what to execute
    #[serde(default)]
    pub config: serde_json::Value,

    /// Non-owning link to the compensating task to run if this attempt's
    /// task ultimately fails
    #[serde(rename = "rollbackTask")]
    #[serde(default)]
    pub rollback_task: Option<String>,
}

impl TaskAttempt {
    pub fn new(id: u32, config: serde_json::Value) -> Self {
        Self {
            id,
            submit_time: None,
            status: AttemptStatus::NotSubmitted,
            status_code: None,
            status_message: None,
            status_time: None,
            config,
            rollback_task: None,
        }
    }

    /// Apply a status report. Rejects illegal transitions without touching
    /// any field.
    pub fn record_status(
        &mut self,
        task_id: &str,
        status: AttemptStatus,
        code: Option<i32>,
        message: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), TaskError> {
        if !self.status.can_transition_to(status) {
            return Err(TaskError::InvalidTransition {
                task: task_id.to_string(),
                from: self.status,
                to: status,
            });
        }

        if status == AttemptStatus::Submitted && self.submit_time.is_none() {
            self.submit_time = Some(timestamp);
        }
        self.status = status;
        self.status_code = code;
        self.status_message = message;
        self.status_time = Some(timestamp);
        Ok(())
    }

    /// Last time anything happened on this attempt, for timeout sweeps.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.status_time.or(self.submit_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt() -> TaskAttempt {
        TaskAttempt::new(1, serde_json::Value::Null)
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut a = attempt();
        let now = Utc::now();

        a.record_status("t", AttemptStatus::Submitted, None, None, now)
            .unwrap();
        assert_eq!(a.submit_time, Some(now));

        a.record_status("t", AttemptStatus::InProgress, Some(0), None, now)
            .unwrap();
        a.record_status(
            "t",
            AttemptStatus::Complete,
            Some(0),
            Some("done".to_string()),
            now,
        )
        .unwrap();

        assert_eq!(a.status, AttemptStatus::Complete);
        assert_eq!(a.status_message.as_deref(), Some("done"));
    }

    #[test]
    fn test_skipping_in_progress_is_allowed() {
        let mut a = attempt();
        let now = Utc::now();
        a.record_status("t", AttemptStatus::Submitted, None, None, now)
            .unwrap();
        a.record_status("t", AttemptStatus::Complete, Some(0), None, now)
            .unwrap();
        assert_eq!(a.status, AttemptStatus::Complete);
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut a = attempt();
        let now = Utc::now();
        a.record_status("t", AttemptStatus::InProgress, None, None, now)
            .unwrap();

        let result = a.record_status("t", AttemptStatus::Submitted, None, None, now);
        assert!(matches!(result, Err(TaskError::InvalidTransition { .. })));
        // State untouched by the rejected report.
        assert_eq!(a.status, AttemptStatus::InProgress);
    }

    #[test]
    fn test_terminal_is_idempotent_rejecting() {
        let mut a = attempt();
        let now = Utc::now();
        a.record_status("t", AttemptStatus::Complete, Some(0), None, now)
            .unwrap();

        for status in [
            AttemptStatus::Submitted,
            AttemptStatus::InProgress,
            AttemptStatus::Complete,
            AttemptStatus::Failed,
        ] {
            let result = a.record_status("t", status, None, None, now);
            assert!(matches!(result, Err(TaskError::InvalidTransition { .. })));
        }
        assert_eq!(a.status, AttemptStatus::Complete);
    }

    #[test]
    fn test_progress_updates_allowed() {
        let mut a = attempt();
        let now = Utc::now();
        a.record_status("t", AttemptStatus::InProgress, None, None, now)
            .unwrap();
        // Workers may repeat InProgress with a fresher message.
        a.record_status(
            "t",
            AttemptStatus::InProgress,
            None,
            Some("50%".to_string()),
            now,
        )
        .unwrap();
        assert_eq!(a.status_message.as_deref(), Some("50%"));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&AttemptStatus::NotSubmitted).unwrap();
        assert_eq!(json, "\"NOT_SUBMITTED\"");
        let status: AttemptStatus = serde_json::from_str("\"IN_PROGRESS\"").unwrap();
        assert_eq!(status, AttemptStatus::InProgress);
    }
}
