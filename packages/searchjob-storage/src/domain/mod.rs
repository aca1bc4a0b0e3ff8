//! Domain layer for exhaustive search jobs
//!
//! # Domain Models
//!
//! - `Job`: one user-submitted exhaustive search request
//! - `Task`: one (repository, revision specifier) unit of work of a job
//! - `ResultRow`: one output record per resolved revision of a task
//! - `Repository`: repository a query token may reference
//!
//! # Port Trait
//!
//! - `JobStore`: durable persistence, state machine and lease protocol
//!
//! # State machines
//!
//! ```text
//! Job:  Queued -> Processing -> Completed | Failed
//!       Queued | Processing  -> Canceled
//!
//! Task: Queued -> Leased -> Completed | Failed
//!                Leased -> Queued        (retry below the ceiling)
//!                Leased -> Canceled      (job cancelled mid-flight)
//!       Queued -> (deleted)             (job cancelled before any lease)
//! ```

pub mod actor;
pub mod query;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Result, StorageError};

pub use actor::{Actor, UserId};
pub use query::{QueryExpander, RevisionPart, RevisionSpec, TaskSpec};

/// Store-assigned task identifier
pub type TaskId = i64;

// ═══════════════════════════════════════════════════════════════════════════
// Domain Models
// ═══════════════════════════════════════════════════════════════════════════

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
    Canceled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(JobState::Queued),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "canceled" => Ok(JobState::Canceled),
            _ => Err(StorageError::database(format!("Invalid job state: {}", s))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Canceled
        )
    }

    /// Forward-only transition check.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Queued, JobState::Processing) => true,
            (JobState::Queued | JobState::Processing, JobState::Completed)
            | (JobState::Queued | JobState::Processing, JobState::Failed)
            | (JobState::Queued | JobState::Processing, JobState::Canceled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Leased,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Leased => "leased",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(TaskState::Queued),
            "leased" => Ok(TaskState::Leased),
            "completed" => Ok(TaskState::Completed),
            "failed" => Ok(TaskState::Failed),
            "canceled" => Ok(TaskState::Canceled),
            _ => Err(StorageError::database(format!("Invalid task state: {}", s))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One exhaustive search request.
///
/// `initiator_id` and `query` never change after creation; `updated_at` is
/// bumped on every state transition and never moves backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub initiator_id: UserId,
    pub query: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Cancellation was requested at some point, even after completion
    pub cancel_requested: bool,
}

/// One (repository, revision specifier) unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: Uuid,
    pub repo_id: i64,
    pub repository: String,
    pub revision_specifier: String,
    pub state: TaskState,
    pub lease_owner: Option<String>,
    pub lease_expiry: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One output record: a task evaluated against one resolved revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultRow {
    pub job_id: Uuid,
    pub repository: String,
    pub revision_specifier: String,
    pub resolved_revision: String,
}

impl ResultRow {
    pub fn for_task(task: &Task, resolved_revision: impl Into<String>) -> Self {
        Self {
            job_id: task.job_id,
            repository: task.repository.clone(),
            revision_specifier: task.revision_specifier.clone(),
            resolved_revision: resolved_revision.into(),
        }
    }
}

/// Repository a query token may reference (by id or by name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
}

/// Task counts for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total: usize,
    pub queued: usize,
    pub leased: usize,
    pub completed: usize,
    pub failed: usize,
    pub canceled: usize,
    pub result_rows: usize,
}

/// Outcome of `complete_task` / `fail_task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTransition {
    /// Task is now Completed
    Completed,
    /// Task went back to Queued for another attempt
    Requeued { attempts: u32 },
    /// Task exhausted its attempts and is now Failed
    Failed { attempts: u32 },
    /// Task was already terminal (e.g. cancelled); nothing changed
    AlreadyTerminal(TaskState),
    /// Lease is held by another worker or expired and was re-queued
    LeaseLost,
}

/// Result of a heartbeat / cancellation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStatus {
    /// Lease still owned; expiry extended
    Active,
    /// Task or its job was cancelled; stop producing output
    Canceled,
    /// Lease no longer owned by this worker
    Lost,
}

// ═══════════════════════════════════════════════════════════════════════════
// Port Trait
// ═══════════════════════════════════════════════════════════════════════════

/// Durable persistence for jobs and tasks.
///
/// The store is the single arbiter of task ownership: workers never
/// coordinate with each other except through these operations.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Expand `query` and persist Job(Queued) with one Task(Queued) per pair,
    /// atomically.
    async fn create_job(&self, actor: &Actor, query: &str) -> Result<Job>;

    async fn get_job(&self, actor: &Actor, id: Uuid) -> Result<Job>;

    /// Jobs visible to `actor`, in creation order.
    async fn list_jobs(&self, actor: &Actor) -> Result<Vec<Job>>;

    /// Cancel a job; returns the number of affected tasks plus result rows.
    async fn cancel_job(&self, actor: &Actor, id: Uuid) -> Result<usize>;

    async fn job_stats(&self, actor: &Actor, id: Uuid) -> Result<JobStats>;

    async fn list_tasks(&self, actor: &Actor, job_id: Uuid) -> Result<Vec<Task>>;

    /// Claim the oldest eligible task for `worker_id`. No two callers ever
    /// receive the same lease.
    async fn lease_next_task(
        &self,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Result<Option<Task>>;

    /// Extend a lease and report whether the task may keep producing output.
    async fn heartbeat(
        &self,
        task_id: TaskId,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Result<LeaseStatus>;

    /// Record one result row; `false` means the row must not be emitted.
    async fn record_result(&self, task_id: TaskId, worker_id: &str, row: &ResultRow)
        -> Result<bool>;

    async fn complete_task(&self, task_id: TaskId, worker_id: &str) -> Result<TaskTransition>;

    async fn fail_task(
        &self,
        task_id: TaskId,
        worker_id: &str,
        error: &str,
    ) -> Result<TaskTransition>;

    /// Any task still Queued or Leased.
    async fn has_pending_work(&self) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        for state in [
            JobState::Queued,
            JobState::Processing,
            JobState::Completed,
            JobState::Failed,
            JobState::Canceled,
        ] {
            assert_eq!(JobState::from_str(state.as_str()).unwrap(), state);
        }
        for state in [
            TaskState::Queued,
            TaskState::Leased,
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Canceled,
        ] {
            assert_eq!(TaskState::from_str(state.as_str()).unwrap(), state);
        }
        assert!(JobState::from_str("running").is_err());
    }

    #[test]
    fn test_job_transitions_only_move_forward() {
        assert!(JobState::Queued.can_transition_to(JobState::Processing));
        assert!(JobState::Processing.can_transition_to(JobState::Completed));
        assert!(JobState::Queued.can_transition_to(JobState::Canceled));
        assert!(!JobState::Processing.can_transition_to(JobState::Queued));
        assert!(!JobState::Completed.can_transition_to(JobState::Canceled));
        assert!(!JobState::Failed.can_transition_to(JobState::Completed));
        assert!(!JobState::Canceled.can_transition_to(JobState::Processing));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Processing.is_terminal());
        assert!(JobState::Canceled.is_terminal());
        assert!(!TaskState::Leased.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }
}
