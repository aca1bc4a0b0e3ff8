//! Table layout for the SQLite job store.
//!
//! `search_job_tasks.state` together with `lease_owner` / `lease_expiry`
//! carries the claim protocol; `cancel` flags survive terminal states so
//! cancellation can be accounted for after completion.

pub(super) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS repos (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS search_jobs (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    initiator_id INTEGER NOT NULL,
    query TEXT NOT NULL,
    state TEXT NOT NULL,
    cancel INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_search_jobs_initiator
    ON search_jobs(initiator_id, seq);

CREATE TABLE IF NOT EXISTS search_job_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    repo_id INTEGER NOT NULL,
    revision_specifier TEXT NOT NULL,
    state TEXT NOT NULL,
    cancel INTEGER NOT NULL DEFAULT 0,
    lease_owner TEXT,
    lease_expiry INTEGER,
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL,
    last_error TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (job_id) REFERENCES search_jobs(id),
    FOREIGN KEY (repo_id) REFERENCES repos(id)
);

CREATE INDEX IF NOT EXISTS idx_search_job_tasks_state
    ON search_job_tasks(state, id);

CREATE INDEX IF NOT EXISTS idx_search_job_tasks_job
    ON search_job_tasks(job_id, state);

CREATE TABLE IF NOT EXISTS search_job_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL,
    job_id TEXT NOT NULL,
    resolved_revision TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (task_id) REFERENCES search_job_tasks(id)
);

CREATE INDEX IF NOT EXISTS idx_search_job_results_job
    ON search_job_results(job_id);

CREATE INDEX IF NOT EXISTS idx_search_job_results_task
    ON search_job_results(task_id);
";

pub(super) const JOB_COLUMNS: &str =
    "id, initiator_id, query, state, cancel, created_at, updated_at";

pub(super) const TASK_COLUMNS: &str = "t.id, t.job_id, t.repo_id, r.name, t.revision_specifier, \
     t.state, t.lease_owner, t.lease_expiry, t.attempts, t.max_attempts, t.last_error, \
     t.created_at, t.updated_at \
     FROM search_job_tasks t JOIN repos r ON r.id = t.repo_id";
