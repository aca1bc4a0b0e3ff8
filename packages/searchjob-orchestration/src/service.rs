//! Caller-facing operations on search jobs.

use searchjob_storage::{Actor, Job, JobStats, JobStore, Task};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

/// Facade used by API handlers. Authorization is enforced by the store; this
/// layer validates input, translates errors and logs lifecycle events.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn create_search_job(&self, actor: &Actor, query: &str) -> Result<Job> {
        if query.trim().is_empty() {
            return Err(OrchestratorError::InvalidQuery(
                "query must not be empty".to_string(),
            ));
        }

        let job = self.store.create_job(actor, query).await.map_err(|e| {
            warn!("Search job rejected for {}: {}", actor, e);
            OrchestratorError::from(e)
        })?;
        info!("Search job {} queued by {}: {:?}", job.id, actor, job.query);
        Ok(job)
    }

    pub async fn get_search_job(&self, actor: &Actor, id: Uuid) -> Result<Job> {
        Ok(self.store.get_job(actor, id).await?)
    }

    pub async fn list_search_jobs(&self, actor: &Actor) -> Result<Vec<Job>> {
        Ok(self.store.list_jobs(actor).await?)
    }

    /// Cancel a job; returns the number of affected tasks and result rows.
    pub async fn cancel_search_job(&self, actor: &Actor, id: Uuid) -> Result<usize> {
        let affected = self.store.cancel_job(actor, id).await?;
        info!("Search job {} canceled by {} ({} affected)", id, actor, affected);
        Ok(affected)
    }

    pub async fn search_job_stats(&self, actor: &Actor, id: Uuid) -> Result<JobStats> {
        Ok(self.store.job_stats(actor, id).await?)
    }

    pub async fn list_search_job_tasks(&self, actor: &Actor, id: Uuid) -> Result<Vec<Task>> {
        Ok(self.store.list_tasks(actor, id).await?)
    }
}
