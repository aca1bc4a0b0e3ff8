//! Worker pool: polling loops that lease tasks and execute them.
//!
//! Each worker runs independently and shares nothing with its siblings
//! except the job store and the result sink. A task's lifecycle per tick:
//!
//! ```text
//! lease -> heartbeat -> resolve -> (heartbeat, search)* -> (record, append)* -> complete
//!                                       any error ------------------------> fail
//! ```
//!
//! Rows are only recorded once every search of the task succeeded, so a
//! retried task never leaves a partial set of rows behind in the store.

use futures::future::join_all;
use searchjob_storage::{
    Actor, JobStore, LeaseStatus, ResultRow, Task, TaskTransition,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::resolver::RevisionResolver;
use crate::searcher::Searcher;
use crate::sink::ResultSink;

/// Collaborators shared by the workers of a pool.
#[derive(Clone)]
pub struct WorkerDeps {
    pub store: Arc<dyn JobStore>,
    pub resolver: RevisionResolver,
    pub searcher: Arc<dyn Searcher>,
    pub sink: Arc<dyn ResultSink>,
}

/// How a leased task ended, before it is reported to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Execution {
    Finished { rows: usize },
    /// Cancelled or lease lost; stop without producing further output
    Stopped(LeaseStatus),
}

pub struct Worker {
    id: String,
    deps: WorkerDeps,
    interval: Duration,
    lease_duration: Duration,
}

impl Worker {
    pub fn new(id: impl Into<String>, deps: WorkerDeps, config: &WorkerConfig) -> Self {
        Self {
            id: id.into(),
            deps,
            interval: config.worker_interval(),
            lease_duration: config.lease_duration(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Poll until `shutdown` fires. An in-flight task always runs to its
    /// completion report before the loop exits.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Worker {} started (interval {:?})", self.id, self.interval);

        while !shutdown.is_cancelled() {
            match self.tick().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => warn!("Worker {}: lease failed: {}", self.id, e),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Worker {} stopped", self.id);
    }

    /// Lease and execute at most one task. `Ok(false)` when nothing was
    /// eligible.
    pub async fn tick(&self) -> Result<bool> {
        let lease = self
            .deps
            .store
            .lease_next_task(&self.id, self.lease_duration)
            .await?;
        let Some(task) = lease else {
            return Ok(false);
        };

        debug!(
            worker_id = %self.id,
            task_id = task.id,
            job_id = %task.job_id,
            attempt = task.attempts,
            "executing search job task"
        );
        self.process(&task).await;
        Ok(true)
    }

    async fn process(&self, task: &Task) {
        let store = &self.deps.store;

        let report = match self.execute(task).await {
            Ok(Execution::Finished { rows }) => {
                debug!(task_id = task.id, rows, "search job task produced rows");
                store.complete_task(task.id, &self.id).await
            }
            // The store reports AlreadyTerminal / LeaseLost without mutating
            Ok(Execution::Stopped(status)) => {
                debug!(task_id = task.id, ?status, "search job task stopped early");
                store.complete_task(task.id, &self.id).await
            }
            Err(e) => {
                warn!(
                    "Worker {}: task {} ({}@{}) failed: {}",
                    self.id, task.id, task.repository, task.revision_specifier, e
                );
                store.fail_task(task.id, &self.id, &e.to_string()).await
            }
        };

        match report {
            Ok(TaskTransition::Completed) => {
                info!("Worker {}: task {} completed", self.id, task.id)
            }
            Ok(TaskTransition::Requeued { attempts }) => info!(
                "Worker {}: task {} requeued after attempt {}/{}",
                self.id, task.id, attempts, task.max_attempts
            ),
            Ok(TaskTransition::Failed { attempts }) => error!(
                "Worker {}: task {} failed permanently after {} attempts",
                self.id, task.id, attempts
            ),
            Ok(TaskTransition::AlreadyTerminal(state)) => {
                info!("Worker {}: task {} already {}", self.id, task.id, state)
            }
            Ok(TaskTransition::LeaseLost) => {
                warn!("Worker {}: lease on task {} was lost", self.id, task.id)
            }
            // Lease expiry hands the task to another worker
            Err(e) => error!(
                "Worker {}: could not report task {}: {}",
                self.id, task.id, e
            ),
        }
    }

    async fn execute(&self, task: &Task) -> Result<Execution> {
        let WorkerDeps {
            store,
            resolver,
            searcher,
            sink,
        } = &self.deps;

        if let Some(status) = self.interrupted(task).await? {
            return Ok(Execution::Stopped(status));
        }

        let job = store.get_job(&Actor::Internal, task.job_id).await?;
        let revisions = resolver
            .resolve(&task.repository, &task.revision_specifier)
            .await?;

        let mut rows = Vec::with_capacity(revisions.len());
        for revision in revisions {
            if let Some(status) = self.interrupted(task).await? {
                return Ok(Execution::Stopped(status));
            }
            let matches = searcher
                .search(&task.repository, &revision, &job.query)
                .await?;
            debug!(
                task_id = task.id,
                revision = %revision,
                matches = matches.len(),
                "revision searched"
            );
            rows.push(ResultRow::for_task(task, revision));
        }

        for row in &rows {
            if !store.record_result(task.id, &self.id, row).await? {
                return Ok(Execution::Stopped(LeaseStatus::Canceled));
            }
            sink.append(row)?;
        }

        Ok(Execution::Finished { rows: rows.len() })
    }

    /// Heartbeat; `Some` when the task must stop producing output.
    async fn interrupted(&self, task: &Task) -> Result<Option<LeaseStatus>> {
        let status = self
            .deps
            .store
            .heartbeat(task.id, &self.id, self.lease_duration)
            .await?;
        Ok((status != LeaseStatus::Active).then_some(status))
    }
}

/// A set of workers started and stopped together.
pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// `config.concurrency` workers sharing `deps`, ids from
    /// [`WorkerConfig::worker_ids`].
    pub fn new(config: &WorkerConfig, deps: WorkerDeps) -> Self {
        let workers = config
            .worker_ids()
            .into_iter()
            .map(|id| Worker::new(id, deps.clone(), config))
            .collect();
        Self::from_workers(workers)
    }

    /// Pool over individually built workers (e.g. one store connection each).
    pub fn from_workers(workers: Vec<Worker>) -> Self {
        Self {
            workers: workers.into_iter().map(Arc::new).collect(),
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    pub fn worker_ids(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.id()).collect()
    }

    /// Spawn every worker loop. No-op when already running or stopped.
    pub fn start(&mut self) {
        if self.is_running() || self.shutdown.is_cancelled() {
            return;
        }

        info!("Starting search job worker pool ({} workers)", self.workers.len());
        for worker in &self.workers {
            let worker = Arc::clone(worker);
            let shutdown = self.shutdown.child_token();
            self.handles
                .push(tokio::spawn(async move { worker.run(shutdown).await }));
        }
    }

    /// Signal every worker and wait for their loops to exit.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        for joined in join_all(self.handles.drain(..)).await {
            if let Err(e) = joined {
                error!("Search job worker terminated abnormally: {}", e);
            }
        }
        info!("Search job worker pool stopped");
    }
}
