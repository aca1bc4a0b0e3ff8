//! SQLite Job Store
//!
//! File-based persistent storage using SQLite. Every mutating operation runs
//! in a `BEGIN IMMEDIATE` transaction, so concurrent claimers on separate
//! connections (separate worker processes) are serialized by SQLite itself.

mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    Actor, Job, JobState, JobStats, JobStore, LeaseStatus, QueryExpander, Repository, ResultRow,
    Task, TaskId, TaskState, TaskTransition, UserId,
};
use crate::error::{Result, StorageError};
use schema::{JOB_COLUMNS, SCHEMA, TASK_COLUMNS};

/// Tunables for [`SqliteJobStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Retry ceiling stamped on every new task
    pub max_attempts: u32,
    /// How long a connection waits for another writer before `Unavailable`
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// SQLite-based JobStore implementation
#[derive(Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
    options: StoreOptions,
}

impl SqliteJobStore {
    /// Open (or create) a store at the given path
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(db_path, StoreOptions::default())
    }

    pub fn open_with(db_path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        // WAL lets readers proceed while one worker holds the write lock
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Self::from_connection(conn, options)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, StoreOptions::default())
    }

    pub fn in_memory_with(options: StoreOptions) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, options)
    }

    fn from_connection(conn: Connection, options: StoreOptions) -> Result<Self> {
        if options.max_attempts == 0 {
            return Err(StorageError::config("max_attempts must be at least 1"));
        }
        conn.busy_timeout(options.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            options,
        })
    }

    /// Register a repository that query tokens may reference.
    pub fn add_repository(&self, id: i64, name: &str) -> Result<Repository> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO repos (id, name) VALUES (?1, ?2)",
            params![id, name],
        )?;
        Ok(Repository {
            id,
            name: name.to_string(),
        })
    }

    pub fn list_repositories(&self) -> Result<Vec<Repository>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, name FROM repos ORDER BY id")?;
        let repos = stmt
            .query_map([], repository_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(repos)
    }

    /// Run `f` inside a write-locking transaction; rolled back on error.
    fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Load a job and enforce visibility for `actor`.
    fn authorized_job(conn: &Connection, actor: &Actor, id: Uuid) -> Result<Job> {
        let job = load_job(conn, id)?.ok_or_else(|| StorageError::job_not_found(id))?;
        if !actor.can_access(job.initiator_id) {
            return Err(StorageError::forbidden(format!(
                "{} may not access search job {}",
                actor, id
            )));
        }
        Ok(job)
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create_job(&self, actor: &Actor, query: &str) -> Result<Job> {
        let initiator = actor.user_id().ok_or_else(|| {
            StorageError::forbidden("search jobs can only be created by an authenticated user")
        })?;
        let specs = QueryExpander::expand(query)?;
        let max_attempts = self.options.max_attempts;

        let job = self.transaction(|tx| {
            let mut repos = Vec::with_capacity(specs.len());
            for spec in &specs {
                let repo = lookup_repository(tx, &spec.repository)?.ok_or_else(|| {
                    StorageError::invalid_query(format!(
                        "unknown repository {:?}",
                        spec.repository
                    ))
                })?;
                repos.push(repo);
            }

            let id = Uuid::new_v4();
            let now = now_millis();
            tx.execute(
                "INSERT INTO search_jobs (id, initiator_id, query, state, cancel, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
                params![id.to_string(), initiator.0, query, JobState::Queued.as_str(), now],
            )?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO search_job_tasks
                        (job_id, repo_id, revision_specifier, state, attempts, max_attempts, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6)",
                )?;
                for (spec, repo) in specs.iter().zip(&repos) {
                    stmt.execute(params![
                        id.to_string(),
                        repo.id,
                        spec.revision_specifier,
                        TaskState::Queued.as_str(),
                        max_attempts,
                        now
                    ])?;
                }
            }

            load_job(tx, id)?.ok_or_else(|| StorageError::job_not_found(id))
        })?;

        info!(
            "Created search job {} for {} with {} tasks",
            job.id,
            actor,
            specs.len()
        );
        Ok(job)
    }

    async fn get_job(&self, actor: &Actor, id: Uuid) -> Result<Job> {
        let conn = self.conn.lock();
        Self::authorized_job(&conn, actor, id)
    }

    async fn list_jobs(&self, actor: &Actor) -> Result<Vec<Job>> {
        let conn = self.conn.lock();
        let jobs = match actor.user_id() {
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM search_jobs ORDER BY seq",
                    JOB_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], job_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            Some(user) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM search_jobs WHERE initiator_id = ?1 ORDER BY seq",
                    JOB_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![user.0], job_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(jobs)
    }

    async fn cancel_job(&self, actor: &Actor, id: Uuid) -> Result<usize> {
        let now = now_millis();
        let affected = self.transaction(|tx| {
            Self::authorized_job(tx, actor, id)?;
            let job_id = id.to_string();

            // Never leased: no output can exist, drop the rows outright
            let deleted = tx.execute(
                "DELETE FROM search_job_tasks WHERE job_id = ?1 AND state = 'queued' AND attempts = 0",
                params![job_id],
            )?;

            // Terminal tasks keep their state; only the flag records the cancel
            let flagged = tx.execute(
                "UPDATE search_job_tasks SET cancel = 1
                 WHERE job_id = ?1 AND state IN ('completed', 'failed', 'canceled')",
                params![job_id],
            )?;

            let canceled = tx.execute(
                "UPDATE search_job_tasks
                 SET state = 'canceled', cancel = 1, lease_owner = NULL, lease_expiry = NULL,
                     updated_at = MAX(updated_at, ?2)
                 WHERE job_id = ?1 AND state IN ('queued', 'leased')",
                params![job_id, now],
            )?;

            let rows: i64 = tx.query_row(
                "SELECT COUNT(*) FROM search_job_results WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )?;

            tx.execute(
                "UPDATE search_jobs
                 SET cancel = 1,
                     state = CASE WHEN state IN ('queued', 'processing') THEN 'canceled' ELSE state END,
                     updated_at = CASE WHEN state IN ('queued', 'processing') THEN MAX(updated_at, ?2) ELSE updated_at END
                 WHERE id = ?1",
                params![job_id, now],
            )?;

            debug!(
                job_id = %id,
                deleted,
                canceled,
                flagged,
                rows,
                "search job cancellation accounted"
            );
            Ok(deleted + canceled + flagged + i64_to_usize(rows))
        })?;

        info!("Canceled search job {} ({} rows affected)", id, affected);
        Ok(affected)
    }

    async fn job_stats(&self, actor: &Actor, id: Uuid) -> Result<JobStats> {
        let conn = self.conn.lock();
        Self::authorized_job(&conn, actor, id)?;
        let job_id = id.to_string();

        let mut stats = JobStats::default();
        let mut stmt = conn.prepare(
            "SELECT state, COUNT(*) FROM search_job_tasks WHERE job_id = ?1 GROUP BY state",
        )?;
        let counts = stmt
            .query_map(params![job_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (state, count) in counts {
            let count = i64_to_usize(count);
            stats.total += count;
            match TaskState::from_str(&state)? {
                TaskState::Queued => stats.queued = count,
                TaskState::Leased => stats.leased = count,
                TaskState::Completed => stats.completed = count,
                TaskState::Failed => stats.failed = count,
                TaskState::Canceled => stats.canceled = count,
            }
        }

        let rows: i64 = conn.query_row(
            "SELECT COUNT(*) FROM search_job_results WHERE job_id = ?1",
            params![job_id],
            |row| row.get(0),
        )?;
        stats.result_rows = i64_to_usize(rows);
        Ok(stats)
    }

    async fn list_tasks(&self, actor: &Actor, job_id: Uuid) -> Result<Vec<Task>> {
        let conn = self.conn.lock();
        Self::authorized_job(&conn, actor, job_id)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} WHERE t.job_id = ?1 ORDER BY t.id",
            TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map(params![job_id.to_string()], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    async fn lease_next_task(
        &self,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Result<Option<Task>> {
        if worker_id.trim().is_empty() {
            return Err(StorageError::config("worker_id must not be empty"));
        }
        let now = now_millis();
        let expiry = now.saturating_add(duration_millis(lease_duration));

        let leased = self.transaction(|tx| {
            // A retried call after a lost response hands back the same lease
            let held: Option<TaskId> = tx
                .query_row(
                    "SELECT id FROM search_job_tasks
                     WHERE state = 'leased' AND lease_owner = ?1 AND lease_expiry > ?2
                     ORDER BY id LIMIT 1",
                    params![worker_id, now],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(task_id) = held {
                tx.execute(
                    "UPDATE search_job_tasks SET lease_expiry = ?2 WHERE id = ?1",
                    params![task_id, expiry],
                )?;
                return load_task(tx, task_id);
            }

            fail_exhausted_leases(tx, now)?;

            let candidate: Option<(TaskId, String)> = tx
                .query_row(
                    "SELECT t.id, t.state FROM search_job_tasks t
                     JOIN search_jobs j ON j.id = t.job_id
                     WHERE j.cancel = 0 AND t.cancel = 0
                       AND j.state IN ('queued', 'processing')
                       AND (t.state = 'queued'
                            OR (t.state = 'leased' AND t.lease_expiry <= ?1 AND t.attempts < t.max_attempts))
                     ORDER BY t.id
                     LIMIT 1",
                    params![now],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((task_id, previous_state)) = candidate else {
                return Ok(None);
            };

            let updated = tx.execute(
                "UPDATE search_job_tasks
                 SET state = 'leased', lease_owner = ?2, lease_expiry = ?3,
                     attempts = attempts + 1, updated_at = MAX(updated_at, ?4)
                 WHERE id = ?1
                   AND (state = 'queued' OR (state = 'leased' AND lease_expiry <= ?4))",
                params![task_id, worker_id, expiry, now],
            )?;
            if updated != 1 {
                return Err(StorageError::conflict(format!(
                    "task {} changed state during lease",
                    task_id
                )));
            }

            // rows of the expired attempt are superseded by this one
            if previous_state == TaskState::Leased.as_str() {
                tx.execute(
                    "DELETE FROM search_job_results WHERE task_id = ?1",
                    params![task_id],
                )?;
            }

            tx.execute(
                "UPDATE search_jobs SET state = 'processing', updated_at = MAX(updated_at, ?2)
                 WHERE id = (SELECT job_id FROM search_job_tasks WHERE id = ?1) AND state = 'queued'",
                params![task_id, now],
            )?;

            load_task(tx, task_id)
        })?;

        if let Some(task) = &leased {
            debug!(
                task_id = task.id,
                job_id = %task.job_id,
                worker_id,
                attempts = task.attempts,
                "search job task leased"
            );
        }
        Ok(leased)
    }

    async fn heartbeat(
        &self,
        task_id: TaskId,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Result<LeaseStatus> {
        let now = now_millis();
        let expiry = now.saturating_add(duration_millis(lease_duration));

        self.transaction(|tx| {
            let lease = load_lease(tx, task_id)?.ok_or_else(|| StorageError::task_not_found(task_id))?;
            let status = lease.status(worker_id);
            if status == LeaseStatus::Active {
                tx.execute(
                    "UPDATE search_job_tasks SET lease_expiry = ?2 WHERE id = ?1",
                    params![task_id, expiry],
                )?;
            }
            Ok(status)
        })
    }

    async fn record_result(
        &self,
        task_id: TaskId,
        worker_id: &str,
        row: &ResultRow,
    ) -> Result<bool> {
        let now = now_millis();
        self.transaction(|tx| {
            let lease = load_lease(tx, task_id)?.ok_or_else(|| StorageError::task_not_found(task_id))?;
            if lease.status(worker_id) != LeaseStatus::Active {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO search_job_results (task_id, job_id, resolved_revision, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![task_id, lease.job_id, row.resolved_revision, now],
            )?;
            Ok(true)
        })
    }

    async fn complete_task(&self, task_id: TaskId, worker_id: &str) -> Result<TaskTransition> {
        let now = now_millis();
        let transition = self.transaction(|tx| {
            let lease = load_lease(tx, task_id)?.ok_or_else(|| StorageError::task_not_found(task_id))?;
            if lease.state.is_terminal() {
                return Ok(TaskTransition::AlreadyTerminal(lease.state));
            }
            if !lease.owned_by(worker_id) {
                return Ok(TaskTransition::LeaseLost);
            }

            tx.execute(
                "UPDATE search_job_tasks
                 SET state = 'completed', lease_owner = NULL, lease_expiry = NULL,
                     updated_at = MAX(updated_at, ?2)
                 WHERE id = ?1",
                params![task_id, now],
            )?;
            finalize_job_if_done(tx, &lease.job_id, now)?;
            Ok(TaskTransition::Completed)
        })?;

        debug!(task_id, worker_id, ?transition, "search job task completion reported");
        Ok(transition)
    }

    async fn fail_task(
        &self,
        task_id: TaskId,
        worker_id: &str,
        error: &str,
    ) -> Result<TaskTransition> {
        let now = now_millis();
        let transition = self.transaction(|tx| {
            let lease = load_lease(tx, task_id)?.ok_or_else(|| StorageError::task_not_found(task_id))?;
            if lease.state.is_terminal() {
                return Ok(TaskTransition::AlreadyTerminal(lease.state));
            }
            if !lease.owned_by(worker_id) {
                return Ok(TaskTransition::LeaseLost);
            }

            if lease.attempts < lease.max_attempts {
                tx.execute(
                    "UPDATE search_job_tasks
                     SET state = 'queued', lease_owner = NULL, lease_expiry = NULL,
                         last_error = ?2, updated_at = MAX(updated_at, ?3)
                     WHERE id = ?1",
                    params![task_id, error, now],
                )?;
                // The retried attempt produces the whole task again
                tx.execute(
                    "DELETE FROM search_job_results WHERE task_id = ?1",
                    params![task_id],
                )?;
                return Ok(TaskTransition::Requeued {
                    attempts: lease.attempts,
                });
            }

            tx.execute(
                "UPDATE search_job_tasks
                 SET state = 'failed', lease_owner = NULL, lease_expiry = NULL,
                     last_error = ?2, updated_at = MAX(updated_at, ?3)
                 WHERE id = ?1",
                params![task_id, error, now],
            )?;
            finalize_job_if_done(tx, &lease.job_id, now)?;
            Ok(TaskTransition::Failed {
                attempts: lease.attempts,
            })
        })?;

        debug!(task_id, worker_id, ?transition, error, "search job task failure reported");
        Ok(transition)
    }

    async fn has_pending_work(&self) -> Result<bool> {
        let conn = self.conn.lock();
        let pending: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM search_job_tasks WHERE state IN ('queued', 'leased'))",
            [],
            |row| row.get(0),
        )?;
        Ok(pending)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Row helpers
// ═══════════════════════════════════════════════════════════════════════════

/// Lease-relevant columns of one task plus its job's cancel flag.
struct LeaseRecord {
    job_id: String,
    state: TaskState,
    lease_owner: Option<String>,
    attempts: u32,
    max_attempts: u32,
    canceled: bool,
}

impl LeaseRecord {
    fn owned_by(&self, worker_id: &str) -> bool {
        self.state == TaskState::Leased && self.lease_owner.as_deref() == Some(worker_id)
    }

    fn status(&self, worker_id: &str) -> LeaseStatus {
        if self.canceled || self.state == TaskState::Canceled {
            LeaseStatus::Canceled
        } else if self.owned_by(worker_id) {
            LeaseStatus::Active
        } else {
            LeaseStatus::Lost
        }
    }
}

fn load_lease(conn: &Connection, task_id: TaskId) -> Result<Option<LeaseRecord>> {
    let record = conn
        .query_row(
            "SELECT t.job_id, t.state, t.lease_owner, t.attempts, t.max_attempts, t.cancel, j.cancel
             FROM search_job_tasks t JOIN search_jobs j ON j.id = t.job_id
             WHERE t.id = ?1",
            params![task_id],
            |row| {
                let state: String = row.get(1)?;
                Ok(LeaseRecord {
                    job_id: row.get(0)?,
                    state: TaskState::from_str(&state).map_err(|e| conversion_error(1, e))?,
                    lease_owner: row.get(2)?,
                    attempts: row.get(3)?,
                    max_attempts: row.get(4)?,
                    canceled: row.get::<_, i64>(5)? != 0 || row.get::<_, i64>(6)? != 0,
                })
            },
        )
        .optional()?;
    Ok(record)
}

/// Fail expired leases that already used every attempt, so a task whose
/// workers keep dying cannot be retried forever.
fn fail_exhausted_leases(tx: &Transaction<'_>, now: i64) -> Result<()> {
    let exhausted = {
        let mut stmt = tx.prepare(
            "SELECT id, job_id FROM search_job_tasks
             WHERE state = 'leased' AND lease_expiry <= ?1 AND attempts >= max_attempts",
        )?;
        let rows = stmt
            .query_map(params![now], |row| {
                Ok((row.get::<_, TaskId>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    for (task_id, job_id) in exhausted {
        tx.execute(
            "UPDATE search_job_tasks
             SET state = 'failed', lease_owner = NULL, lease_expiry = NULL,
                 last_error = COALESCE(last_error, 'lease expired'), updated_at = MAX(updated_at, ?2)
             WHERE id = ?1",
            params![task_id, now],
        )?;
        finalize_job_if_done(tx, &job_id, now)?;
        info!("Search job task {} failed after its final lease expired", task_id);
    }
    Ok(())
}

/// Commit the job's aggregate state once no task is left in flight.
///
/// Runs inside the transaction that terminated the task, so two workers
/// finishing the last two tasks cannot both miss (or both apply) it.
fn finalize_job_if_done(conn: &Connection, job_id: &str, now: i64) -> Result<Option<JobState>> {
    let (pending, failed): (i64, i64) = conn.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN state IN ('queued', 'leased') THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN state = 'failed' THEN 1 ELSE 0 END), 0)
         FROM search_job_tasks WHERE job_id = ?1",
        params![job_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    if pending > 0 {
        return Ok(None);
    }

    let next = if failed > 0 {
        JobState::Failed
    } else {
        JobState::Completed
    };
    let current: String = conn.query_row(
        "SELECT state FROM search_jobs WHERE id = ?1",
        params![job_id],
        |row| row.get(0),
    )?;
    if !JobState::from_str(&current)?.can_transition_to(next) {
        return Ok(None);
    }
    conn.execute(
        "UPDATE search_jobs SET state = ?2, updated_at = MAX(updated_at, ?3) WHERE id = ?1",
        params![job_id, next.as_str(), now],
    )?;

    info!("Search job {} finished as {}", job_id, next);
    Ok(Some(next))
}

fn lookup_repository(conn: &Connection, token: &str) -> Result<Option<Repository>> {
    if let Ok(id) = token.parse::<i64>() {
        let by_id = conn
            .query_row(
                "SELECT id, name FROM repos WHERE id = ?1",
                params![id],
                repository_from_row,
            )
            .optional()?;
        if by_id.is_some() {
            return Ok(by_id);
        }
    }

    let by_name = conn
        .query_row(
            "SELECT id, name FROM repos WHERE name = ?1",
            params![token],
            repository_from_row,
        )
        .optional()?;
    Ok(by_name)
}

fn load_job(conn: &Connection, id: Uuid) -> Result<Option<Job>> {
    let job = conn
        .query_row(
            &format!("SELECT {} FROM search_jobs WHERE id = ?1", JOB_COLUMNS),
            params![id.to_string()],
            job_from_row,
        )
        .optional()?;
    Ok(job)
}

fn load_task(conn: &Connection, task_id: TaskId) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {} WHERE t.id = ?1", TASK_COLUMNS),
            params![task_id],
            task_from_row,
        )
        .optional()?;
    Ok(task)
}

fn repository_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let id: String = row.get(0)?;
    let state: String = row.get(3)?;
    Ok(Job {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        initiator_id: UserId(row.get(1)?),
        query: row.get(2)?,
        state: JobState::from_str(&state).map_err(|e| conversion_error(3, e))?,
        cancel_requested: row.get::<_, i64>(4)? != 0,
        created_at: millis_to_datetime(row.get(5)?),
        updated_at: millis_to_datetime(row.get(6)?),
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let job_id: String = row.get(1)?;
    let state: String = row.get(5)?;
    Ok(Task {
        id: row.get(0)?,
        job_id: Uuid::parse_str(&job_id).map_err(|e| conversion_error(1, e))?,
        repo_id: row.get(2)?,
        repository: row.get(3)?,
        revision_specifier: row.get(4)?,
        state: TaskState::from_str(&state).map_err(|e| conversion_error(5, e))?,
        lease_owner: row.get(6)?,
        lease_expiry: row.get::<_, Option<i64>>(7)?.map(millis_to_datetime),
        attempts: row.get(8)?,
        max_attempts: row.get(9)?,
        last_error: row.get(10)?,
        created_at: millis_to_datetime(row.get(11)?),
        updated_at: millis_to_datetime(row.get(12)?),
    })
}

fn conversion_error(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn i64_to_usize(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}
