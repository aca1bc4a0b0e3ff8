/*
 * Search Job Orchestration
 *
 * Runs exhaustive searches: a user query is split into (repository,
 * revision specifier) tasks that a pool of workers leases, resolves,
 * searches and streams into a result sink.
 *
 * Architecture:
 * - Job/task state machine and leasing (searchjob-storage, SQLite)
 * - Worker pool (tokio polling loops, cancellation token)
 * - Revision resolution (VCS metadata port)
 * - Searcher port
 * - CSV result sinks
 * - Observability (tracing)
 */

// Public modules
pub mod config;
pub mod error;
pub mod observability;
pub mod resolver;
pub mod searcher;
pub mod service;
pub mod sink;
pub mod worker;

// Re-exports
pub use config::{ConfigError, SearchJobsConfig, StoreConfig, WorkerConfig};
pub use error::{ErrorCategory, OrchestratorError, Result};
pub use observability::init_tracing;
pub use resolver::{GitRef, InMemoryVcs, RevisionResolver, VcsMetadataProvider};
pub use searcher::{SearchMatch, Searcher};
pub use service::JobService;
pub use sink::{CsvResultSink, JobCsvDirectorySink, ResultSink, CSV_HEADER};
pub use worker::{Worker, WorkerDeps, WorkerPool};

pub use searchjob_storage::{
    Actor, Job, JobState, JobStats, JobStore, ResultRow, SqliteJobStore, Task, TaskState, UserId,
};
