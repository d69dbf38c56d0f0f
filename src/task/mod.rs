//! Provisioning tasks and attempts
//!
//! A [`ClusterTask`] is one unit of remote work against a node (create the
//! machine, install a service, ...). Each execution try is a
//! [`TaskAttempt`] moving through a small state machine; failed attempts
//! are retried, exhausted tasks fall back to a compensating rollback task,
//! and nothing is ever deleted from attempt history.

pub mod attempt;
pub mod planner;
pub mod registry;
pub mod scheduler;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ProvisionerAction;

pub use attempt::{AttemptStatus, TaskAttempt};
pub use planner::{plan_provision_tasks, PlannerError};
pub use registry::TaskRegistry;
pub use scheduler::{
    spawn_task_scheduler, FinishOutcome, RetryPolicy, SchedulerConfig, TaskHandoff,
    TaskScheduler, TIMEOUT_STATUS_CODE,
};

/// Errors from the task registry and scheduler. `InvalidTransition` and
/// `AttemptAlreadyOpen` are protocol errors: they indicate a misbehaving
/// worker or caller and never mutate state.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Task '{0}' has no attempt yet")]
    NoAttempt(String),

    #[error("Invalid status transition {from:?} -> {to:?} for task '{task}'")]
    InvalidTransition {
        task: String,
        from: AttemptStatus,
        to: AttemptStatus,
    },

    #[error("Task '{0}' already has a non-terminal attempt")]
    AttemptAlreadyOpen(String),

    #[error("Task '{0}' is abandoned")]
    TaskAbandoned(String),
}

/// One unit of remote work: an action against a node (optionally scoped to
/// one service), executed through an ordered history of attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterTask {
    /// Unique task id
    pub id: String,

    /// Owning cluster id
    #[serde(rename = "clusterId")]
    pub cluster_id: String,

    /// Target node id
    #[serde(rename = "nodeId")]
    pub node_id: String,

    /// Target service, absent for machine-level actions
    #[serde(default)]
    pub service: Option<String>,

    /// What the worker should do
    pub action: ProvisionerAction,

    /// Configuration payload template; copied into each new attempt
    #[serde(default)]
    pub config: serde_json::Value,

    /// Attempt history, oldest first; never truncated
    #[serde(default)]
    pub attempts: Vec<TaskAttempt>,

    /// Abandoned tasks are never retried or handed to workers again
    #[serde(default)]
    pub abandoned: bool,

    /// Set on rollback tasks: id of the task this one compensates for
    #[serde(rename = "rollbackFor")]
    #[serde(default)]
    pub rollback_for: Option<String>,
}

impl ClusterTask {
    /// The attempt currently driving this task, if any.
    pub fn current_attempt(&self) -> Option<&TaskAttempt> {
        self.attempts.last()
    }

    /// A task is done once its latest attempt completed successfully.
    pub fn is_done(&self) -> bool {
        self.current_attempt()
            .map(|a| a.status == AttemptStatus::Complete)
            .unwrap_or(false)
    }

    /// Number of attempts made so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}
