//! Durable state for exhaustive search jobs.
//!
//! A job is one user query of the form `<repo>@<revspec> ...`. It is expanded
//! into one task per pair, and tasks are handed to workers through leases.
//! The store is the only shared state between workers: leasing, heartbeats,
//! completion and cancellation are all single transactions, so any number of
//! workers (in-process or in separate processes on the same database file)
//! may poll concurrently.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use searchjob_storage::{Actor, JobStore, SqliteJobStore};
//!
//! let store = SqliteJobStore::open("search_jobs.db")?;
//! store.add_repository(1, "github.com/acme/api")?;
//!
//! let job = store.create_job(&Actor::user(7), "1@main 1@*refs/tags/v*").await?;
//!
//! while let Some(task) = store.lease_next_task("worker-1", lease).await? {
//!     // resolve, search, record_result ...
//!     store.complete_task(task.id, "worker-1").await?;
//! }
//! ```

pub mod domain;
pub mod error;

#[cfg(feature = "sqlite")]
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{
    Actor, Job, JobState, JobStats, JobStore, LeaseStatus, QueryExpander, Repository, ResultRow,
    RevisionPart, RevisionSpec, Task, TaskId, TaskSpec, TaskState, TaskTransition, UserId,
};

#[cfg(feature = "sqlite")]
pub use infrastructure::{SqliteJobStore, StoreOptions};
