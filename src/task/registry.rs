//! Task registry
//!
//! Authoritative arena of all tasks, keyed by task id. Rollback references
//! between tasks are plain id links resolved through this registry, so
//! ownership stays unambiguous and every task is independently
//! serializable. DashMap entry locking serializes all mutation per task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;

use crate::catalog::ProvisionerAction;

use super::attempt::{AttemptStatus, TaskAttempt};
use super::{ClusterTask, TaskError};

#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<String, ClusterTask>>,
    sequence: Arc<AtomicU64>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a new task with an empty attempt history.
    pub fn create_task(
        &self,
        cluster_id: &str,
        node_id: &str,
        service: Option<String>,
        action: ProvisionerAction,
        config: serde_json::Value,
    ) -> ClusterTask {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let task = ClusterTask {
            id: format!("{}-{:03}-{}", cluster_id, seq, action),
            cluster_id: cluster_id.to_string(),
            node_id: node_id.to_string(),
            service,
            action,
            config,
            attempts: vec![],
            abandoned: false,
            rollback_for: None,
        };
        self.tasks.insert(task.id.clone(), task.clone());
        task
    }

    /// Mark `task_id` as the compensating rollback for `origin_task_id`,
    /// and link it from the origin's current attempt.
    pub fn link_rollback(&self, origin_task_id: &str, rollback_task_id: &str) -> Result<(), TaskError> {
        {
            let mut rollback = self
                .tasks
                .get_mut(rollback_task_id)
                .ok_or_else(|| TaskError::TaskNotFound(rollback_task_id.to_string()))?;
            rollback.rollback_for = Some(origin_task_id.to_string());
        }
        let mut origin = self
            .tasks
            .get_mut(origin_task_id)
            .ok_or_else(|| TaskError::TaskNotFound(origin_task_id.to_string()))?;
        match origin.attempts.last_mut() {
            Some(attempt) => {
                attempt.rollback_task = Some(rollback_task_id.to_string());
                Ok(())
            }
            None => Err(TaskError::NoAttempt(origin_task_id.to_string())),
        }
    }

    /// Open the next attempt for a task. Attempt ids are monotonic per
    /// task starting at 1; an attempt can only be opened once the previous
    /// one is terminal, and history is never overwritten.
    pub fn create_attempt(&self, task_id: &str) -> Result<TaskAttempt, TaskError> {
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::TaskNotFound(task_id.to_string()))?;

        if task.abandoned {
            return Err(TaskError::TaskAbandoned(task_id.to_string()));
        }
        if let Some(previous) = task.attempts.last() {
            if !previous.status.is_terminal() {
                return Err(TaskError::AttemptAlreadyOpen(task_id.to_string()));
            }
        }

        let id = task.attempts.len() as u32 + 1;
        // The payload may be regenerated per attempt if prior attempts
        // mutated target state; for now each attempt carries a fresh copy
        // of the task's template.
        let mut attempt = TaskAttempt::new(id, task.config.clone());
        if let Some(previous) = task.attempts.last() {
            attempt.rollback_task = previous.rollback_task.clone();
        }
        task.attempts.push(attempt.clone());
        Ok(attempt)
    }

    /// Apply a status report to a task's current attempt. Protocol errors
    /// (unknown task, missing attempt, backward transition) are returned
    /// without mutating anything.
    pub fn record_status(
        &self,
        task_id: &str,
        status: AttemptStatus,
        code: Option<i32>,
        message: Option<String>,
    ) -> Result<ClusterTask, TaskError> {
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::TaskNotFound(task_id.to_string()))?;
        let id = task.id.clone();
        let attempt = task
            .attempts
            .last_mut()
            .ok_or_else(|| TaskError::NoAttempt(task_id.to_string()))?;
        attempt.record_status(&id, status, code, message, Utc::now())?;
        Ok(task.clone())
    }

    /// Mark a task abandoned. Abandoned tasks are never handed to workers
    /// or retried again.
    pub fn abandon(&self, task_id: &str) -> Result<ClusterTask, TaskError> {
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::TaskNotFound(task_id.to_string()))?;
        task.abandoned = true;
        Ok(task.clone())
    }

    pub fn get(&self, task_id: &str) -> Option<ClusterTask> {
        self.tasks.get(task_id).map(|r| r.clone())
    }

    pub fn list_for_cluster(&self, cluster_id: &str) -> Vec<ClusterTask> {
        let mut tasks: Vec<ClusterTask> = self
            .tasks
            .iter()
            .filter(|r| r.cluster_id == cluster_id)
            .map(|r| r.clone())
            .collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    pub fn list_for_node(&self, node_id: &str) -> Vec<ClusterTask> {
        let mut tasks: Vec<ClusterTask> = self
            .tasks
            .iter()
            .filter(|r| r.node_id == node_id)
            .map(|r| r.clone())
            .collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    /// Ids of tasks whose current attempt has been with a worker longer
    /// than allowed, for the timeout sweep.
    pub fn stuck_tasks(&self, deadline: chrono::DateTime<Utc>) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|r| {
                r.current_attempt().is_some_and(|a| {
                    matches!(
                        a.status,
                        AttemptStatus::Submitted | AttemptStatus::InProgress
                    ) && a.last_activity().is_some_and(|t| t < deadline)
                })
            })
            .map(|r| r.id.clone())
            .collect()
    }
}
