//! Task scheduler - hands ready tasks to polling workers and applies results
//!
//! Workers poll `take()` for work and report back through `finish()`. The
//! scheduler owns the retry/rollback decision: a failed attempt is retried
//! while retries remain and the status code is retriable, falls back to
//! its rollback task when exhausted, and the task is abandoned when no
//! rollback exists. A background sweep fails attempts that have been with
//! a worker past the configured deadline, feeding the same retry path.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::attempt::AttemptStatus;
use super::registry::TaskRegistry;
use super::{ClusterTask, TaskError};

/// Status code recorded when the timeout sweep fails an attempt. Workers
/// use non-negative codes, so this never collides with a real report.
pub const TIMEOUT_STATUS_CODE: i32 = -1;

/// When and how often failed attempts are retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum attempts per task before falling back to rollback
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Status codes worth retrying. A failure reported without a code is
    /// treated as transient and retried.
    #[serde(default = "default_retriable_codes")]
    pub retriable_codes: std::collections::BTreeSet<i32>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retriable_codes() -> std::collections::BTreeSet<i32> {
    [TIMEOUT_STATUS_CODE, 408, 500, 502, 503].into_iter().collect()
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retriable_codes: default_retriable_codes(),
        }
    }
}

impl RetryPolicy {
    fn is_retriable(&self, code: Option<i32>) -> bool {
        match code {
            Some(code) => self.retriable_codes.contains(&code),
            None => true,
        }
    }
}

/// Settings for the background timeout sweep.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to sweep for stuck attempts (seconds)
    pub sweep_interval_secs: u64,
    /// How long an attempt may sit with a worker before it is failed
    pub attempt_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            attempt_timeout_secs: 600,
        }
    }
}

/// What a worker receives from `take()`: the task identity plus the
/// attempt payload it should execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandoff {
    #[serde(rename = "taskId")]
    pub task_id: String,
    #[serde(rename = "attemptId")]
    pub attempt_id: u32,
    pub action: String,
    pub config: serde_json::Value,
}

/// How the scheduler disposed of a finished attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishOutcome {
    /// Attempt completed successfully
    Complete,
    /// Attempt failed; a new attempt was queued
    Retried,
    /// Attempts exhausted; the rollback task was queued
    RolledBack,
    /// No retry and no rollback available; task abandoned
    Abandoned,
}

#[derive(Clone)]
pub struct TaskScheduler {
    registry: TaskRegistry,
    policy: RetryPolicy,
    ready: Arc<Mutex<VecDeque<String>>>,
}

impl TaskScheduler {
    pub fn new(registry: TaskRegistry, policy: RetryPolicy) -> Self {
        Self {
            registry,
            policy,
            ready: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Queue a task for pickup, opening its first attempt if none is open.
    pub fn enqueue(&self, task_id: &str) -> Result<(), TaskError> {
        let task = self
            .registry
            .get(task_id)
            .ok_or_else(|| TaskError::TaskNotFound(task_id.to_string()))?;
        if task.attempts.is_empty() {
            self.registry.create_attempt(task_id)?;
        }
        self.push_ready(task_id.to_string());
        debug!(task = %task_id, "Task queued");
        Ok(())
    }

    fn push_ready(&self, task_id: String) {
        let mut queue = match self.ready.lock() {
            Ok(queue) => queue,
            // A panic while holding the queue lock only loses queue order,
            // never task state; take the queue as-is.
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.push_back(task_id);
    }

    pub fn queued_len(&self) -> usize {
        match self.ready.lock() {
            Ok(queue) => queue.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Claim the next ready task for a worker, marking its attempt
    /// `Submitted`. Tasks abandoned while queued are skipped.
    pub fn take(&self) -> Result<Option<TaskHandoff>, TaskError> {
        loop {
            let task_id = {
                let mut queue = match self.ready.lock() {
                    Ok(queue) => queue,
                    Err(poisoned) => poisoned.into_inner(),
                };
                match queue.pop_front() {
                    Some(id) => id,
                    None => return Ok(None),
                }
            };

            let task = match self.registry.get(&task_id) {
                Some(task) => task,
                None => continue,
            };
            if task.abandoned {
                debug!(task = %task_id, "Skipping abandoned task in queue");
                continue;
            }

            let task =
                self.registry
                    .record_status(&task_id, AttemptStatus::Submitted, None, None)?;
            let attempt = task
                .current_attempt()
                .ok_or_else(|| TaskError::NoAttempt(task_id.clone()))?;

            info!(task = %task_id, attempt = attempt.id, "Task handed to worker");
            return Ok(Some(TaskHandoff {
                task_id: task.id.clone(),
                attempt_id: attempt.id,
                action: task.action.to_string(),
                config: attempt.config.clone(),
            }));
        }
    }

    /// Record a worker progress report without finishing the attempt.
    pub fn progress(
        &self,
        task_id: &str,
        code: Option<i32>,
        message: Option<String>,
    ) -> Result<(), TaskError> {
        self.registry
            .record_status(task_id, AttemptStatus::InProgress, code, message)?;
        Ok(())
    }

    /// Apply a worker's terminal report and decide what happens next.
    pub fn finish(
        &self,
        task_id: &str,
        status: AttemptStatus,
        code: Option<i32>,
        message: Option<String>,
    ) -> Result<FinishOutcome, TaskError> {
        if !status.is_terminal() {
            let task = self
                .registry
                .get(task_id)
                .ok_or_else(|| TaskError::TaskNotFound(task_id.to_string()))?;
            let from = task
                .current_attempt()
                .map(|a| a.status)
                .unwrap_or(AttemptStatus::NotSubmitted);
            return Err(TaskError::InvalidTransition {
                task: task_id.to_string(),
                from,
                to: status,
            });
        }

        let task = self.registry.record_status(task_id, status, code, message)?;

        if status == AttemptStatus::Complete {
            info!(task = %task_id, "Task complete");
            return Ok(FinishOutcome::Complete);
        }
        self.handle_failure(&task, code)
    }

    fn handle_failure(
        &self,
        task: &ClusterTask,
        code: Option<i32>,
    ) -> Result<FinishOutcome, TaskError> {
        let retriable = self.policy.is_retriable(code);
        if retriable && task.attempt_count() < self.policy.max_attempts {
            self.registry.create_attempt(&task.id)?;
            self.push_ready(task.id.clone());
            warn!(
                task = %task.id,
                attempt = task.attempt_count() + 1,
                ?code,
                "Task failed, retrying"
            );
            return Ok(FinishOutcome::Retried);
        }

        let rollback_id = task
            .current_attempt()
            .and_then(|a| a.rollback_task.clone());

        match rollback_id {
            Some(rollback_id) => {
                warn!(task = %task.id, rollback = %rollback_id, "Task exhausted, rolling back");
                self.enqueue(&rollback_id)?;
                Ok(FinishOutcome::RolledBack)
            }
            None => {
                warn!(task = %task.id, "Task exhausted with no rollback, abandoning");
                self.registry.abandon(&task.id)?;
                // A failed rollback abandons the task it was compensating
                // for too; the node is beyond automatic repair.
                if let Some(origin) = &task.rollback_for {
                    self.registry.abandon(origin)?;
                }
                Ok(FinishOutcome::Abandoned)
            }
        }
    }

    /// Stop retrying every outstanding task of a cluster. A task whose
    /// attempt already reached a worker may have half-provisioned a
    /// machine, so its linked rollback is queued. Rollback tasks
    /// themselves are left runnable; they are the cleanup.
    pub fn abandon_cluster(&self, cluster_id: &str) {
        for task in self.registry.list_for_cluster(cluster_id) {
            if task.is_done() || task.abandoned || task.rollback_for.is_some() {
                continue;
            }
            if let Err(err) = self.registry.abandon(&task.id) {
                warn!(task = %task.id, %err, "Failed to abandon task");
                continue;
            }
            let started = task
                .current_attempt()
                .is_some_and(|a| a.status != AttemptStatus::NotSubmitted);
            if !started {
                continue;
            }
            if let Some(rollback_id) = task
                .current_attempt()
                .and_then(|a| a.rollback_task.clone())
            {
                warn!(
                    task = %task.id,
                    rollback = %rollback_id,
                    "Abandoned in-flight task, queuing rollback"
                );
                if let Err(err) = self.enqueue(&rollback_id) {
                    warn!(rollback = %rollback_id, %err, "Failed to queue rollback");
                }
            }
        }
    }

    /// Fail every attempt stuck with a worker past `timeout`, feeding the
    /// normal retry path with [`TIMEOUT_STATUS_CODE`].
    pub fn sweep_timeouts(&self, timeout: Duration) -> Vec<(String, FinishOutcome)> {
        let deadline = Utc::now()
            - chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero());
        let mut outcomes = Vec::new();
        for task_id in self.registry.stuck_tasks(deadline) {
            let result = self.finish(
                &task_id,
                AttemptStatus::Failed,
                Some(TIMEOUT_STATUS_CODE),
                Some("Attempt timed out".to_string()),
            );
            match result {
                Ok(outcome) => {
                    warn!(task = %task_id, ?outcome, "Attempt timed out");
                    outcomes.push((task_id, outcome));
                }
                Err(err) => warn!(task = %task_id, %err, "Timeout sweep failed to fail task"),
            }
        }
        outcomes
    }
}

/// Spawn the timeout sweep as a background task.
pub fn spawn_task_scheduler(
    scheduler: Arc<TaskScheduler>,
    config: SchedulerConfig,
) -> watch::Sender<()> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(());

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.sweep_interval_secs));
        let timeout = Duration::from_secs(config.attempt_timeout_secs);

        info!(
            "Task scheduler started, sweeping timeouts every {}s",
            config.sweep_interval_secs
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    scheduler.sweep_timeouts(timeout);
                }
                _ = shutdown_rx.changed() => {
                    info!("Task scheduler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_tx
}
