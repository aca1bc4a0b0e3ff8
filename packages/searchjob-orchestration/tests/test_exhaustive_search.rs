//! Exhaustive search jobs end to end: service, worker pool, store, sink.

use async_trait::async_trait;
use searchjob_orchestration::{
    Actor, InMemoryVcs, Job, JobCsvDirectorySink, JobService, JobState, RevisionResolver,
    SearchMatch, Searcher, SqliteJobStore, TaskState, Worker, WorkerConfig, WorkerDeps,
    WorkerPool, CSV_HEADER,
};
use searchjob_storage::StoreOptions;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

struct EchoSearcher;

#[async_trait]
impl Searcher for EchoSearcher {
    async fn search(
        &self,
        repository: &str,
        revision: &str,
        _query: &str,
    ) -> searchjob_orchestration::Result<Vec<SearchMatch>> {
        Ok(vec![SearchMatch {
            repository: repository.to_string(),
            revision: revision.to_string(),
            path: "main.go".to_string(),
            line: None,
        }])
    }
}

fn worker_config(concurrency: usize) -> WorkerConfig {
    WorkerConfig {
        worker_interval_ms: 10,
        lease_duration_ms: 60_000,
        concurrency,
        id_prefix: "exhaustive-search-worker".to_string(),
    }
}

fn vcs() -> Arc<InMemoryVcs> {
    let vcs = InMemoryVcs::new();
    vcs.set_ref("repoa", "refs/heads/rev1", "c1");
    vcs.set_ref("repoa", "refs/heads/rev2", "c2");
    vcs.set_ref("repob", "refs/heads/rev3", "c3");
    vcs.set_ref("repob", "refs/heads/main", "c4");
    Arc::new(vcs)
}

fn open_store(path: &Path, options: StoreOptions) -> Arc<SqliteJobStore> {
    let store = SqliteJobStore::open_with(path, options).unwrap();
    if store.list_repositories().unwrap().is_empty() {
        store.add_repository(1, "repoa").unwrap();
        store.add_repository(2, "repob").unwrap();
    }
    Arc::new(store)
}

async fn wait_until_terminal(service: &JobService, actor: &Actor, id: Uuid) -> Job {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let job = service.get_search_job(actor, id).await.unwrap();
            if job.state.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not reach a terminal state")
}

/// Data rows of an artifact, sorted (cross-task order is unspecified).
fn artifact_rows(path: &Path) -> Vec<String> {
    let text = std::fs::read_to_string(path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(CSV_HEADER));
    let mut rows: Vec<String> = lines.map(str::to_string).collect();
    rows.sort();
    rows
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_end_to_end_search_job() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("jobs.db"), StoreOptions::default());
    let sink = Arc::new(JobCsvDirectorySink::new(dir.path().join("results")).unwrap());
    let service = JobService::new(store.clone());

    let deps = WorkerDeps {
        store,
        resolver: RevisionResolver::new(vcs()),
        searcher: Arc::new(EchoSearcher),
        sink: sink.clone(),
    };
    let mut pool = WorkerPool::new(&worker_config(2), deps);
    pool.start();

    let alice = Actor::user(1);
    let job = service
        .create_search_job(&alice, "1@rev1 1@rev2 2@rev3")
        .await
        .unwrap();
    assert_eq!(
        service.list_search_job_tasks(&alice, job.id).await.unwrap().len(),
        3
    );

    let done = wait_until_terminal(&service, &alice, job.id).await;
    pool.stop().await;

    assert_eq!(done.state, JobState::Completed);
    assert_eq!(
        artifact_rows(&sink.path_for(job.id)),
        vec!["repoa,rev1,c1", "repoa,rev2,c2", "repob,rev3,c3"]
    );

    // 3 terminal tasks flagged + 3 recorded rows
    assert_eq!(service.cancel_search_job(&alice, job.id).await.unwrap(), 6);
    let after = service.get_search_job(&alice, job.id).await.unwrap();
    assert_eq!(after.state, JobState::Completed);
    assert!(after.cancel_requested);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unresolvable_specifier_fails_job_after_ceiling() {
    let dir = TempDir::new().unwrap();
    let options = StoreOptions {
        max_attempts: 2,
        ..StoreOptions::default()
    };
    let store = open_store(&dir.path().join("jobs.db"), options);
    let sink = Arc::new(JobCsvDirectorySink::new(dir.path()).unwrap());
    let service = JobService::new(store.clone());

    let deps = WorkerDeps {
        store,
        resolver: RevisionResolver::new(vcs()),
        searcher: Arc::new(EchoSearcher),
        sink: sink.clone(),
    };
    let mut pool = WorkerPool::new(&worker_config(3), deps);
    pool.start();

    let alice = Actor::user(1);
    let job = service
        .create_search_job(&alice, "repoa@rev1 repoa@missing repob@main")
        .await
        .unwrap();
    let done = wait_until_terminal(&service, &alice, job.id).await;
    pool.stop().await;

    assert_eq!(done.state, JobState::Failed);

    let tasks = service.list_search_job_tasks(&alice, job.id).await.unwrap();
    assert_eq!(tasks[0].state, TaskState::Completed);
    assert_eq!(tasks[2].state, TaskState::Completed);
    assert_eq!(tasks[1].state, TaskState::Failed);
    assert_eq!(tasks[1].attempts, 2);
    assert!(tasks[1]
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("missing")));

    assert_eq!(
        artifact_rows(&sink.path_for(job.id)),
        vec!["repoa,rev1,c1", "repob,main,c4"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_before_any_lease() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("jobs.db"), StoreOptions::default());
    let sink = Arc::new(JobCsvDirectorySink::new(dir.path()).unwrap());
    let service = JobService::new(store.clone());

    let alice = Actor::user(1);
    let job = service
        .create_search_job(&alice, "1@rev1 1@rev2 2@rev3 2@main")
        .await
        .unwrap();
    assert_eq!(service.cancel_search_job(&alice, job.id).await.unwrap(), 4);

    let deps = WorkerDeps {
        store,
        resolver: RevisionResolver::new(vcs()),
        searcher: Arc::new(EchoSearcher),
        sink: sink.clone(),
    };
    let mut pool = WorkerPool::new(&worker_config(2), deps);
    pool.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    pool.stop().await;

    let job = service.get_search_job(&alice, job.id).await.unwrap();
    assert_eq!(job.state, JobState::Canceled);
    assert_eq!(
        service.search_job_stats(&alice, job.id).await.unwrap().result_rows,
        0
    );
    assert!(!sink.path_for(job.id).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_on_separate_connections_share_the_queue() {
    const TASKS: usize = 30;

    let dir = TempDir::new().unwrap();
    let db = dir.path().join("jobs.db");
    let api_store = open_store(&db, StoreOptions::default());
    let sink = Arc::new(JobCsvDirectorySink::new(dir.path().join("results")).unwrap());
    let service = JobService::new(api_store);

    let alice = Actor::user(1);
    let query = (0..TASKS)
        .map(|i| if i % 2 == 0 { "1@*heads/*" } else { "2@main" })
        .collect::<Vec<_>>()
        .join(" ");
    let job = service.create_search_job(&alice, &query).await.unwrap();

    // each worker gets its own connection, like a separate process would
    let config = worker_config(4);
    let workers = config
        .worker_ids()
        .into_iter()
        .map(|id| {
            let deps = WorkerDeps {
                store: open_store(&db, StoreOptions::default()),
                resolver: RevisionResolver::new(vcs()),
                searcher: Arc::new(EchoSearcher),
                sink: sink.clone(),
            };
            Worker::new(id, deps, &config)
        })
        .collect();
    let mut pool = WorkerPool::from_workers(workers);
    pool.start();

    let done = wait_until_terminal(&service, &alice, job.id).await;
    pool.stop().await;
    assert_eq!(done.state, JobState::Completed);

    // repoa globs fan out to two commits per task, repob main to one
    let rows = artifact_rows(&sink.path_for(job.id));
    assert_eq!(rows.len(), TASKS / 2 * 2 + TASKS / 2);
    let stats = service.search_job_stats(&alice, job.id).await.unwrap();
    assert_eq!(stats.completed, TASKS);
    assert_eq!(stats.result_rows, rows.len());

    let tasks = service.list_search_job_tasks(&alice, job.id).await.unwrap();
    assert!(tasks.iter().all(|t| t.attempts == 1));
    let distinct: HashSet<&String> = rows.iter().collect();
    assert_eq!(distinct.len(), 3);
}
