//! Worker ids across pools sharing one database file
//!
//! Two stores opened on the same file stand in for two worker processes
//! started from the same default configuration.

use searchjob_orchestration::{Actor, JobStore, SqliteJobStore, WorkerConfig};
use searchjob_storage::LeaseStatus;
use std::time::Duration;
use tempfile::TempDir;

const LEASE: Duration = Duration::from_secs(60);

#[tokio::test]
async fn test_default_worker_ids_do_not_share_leases() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("search_jobs.db");

    let first = SqliteJobStore::open(&path).unwrap();
    first.add_repository(1, "repoa").unwrap();
    let second = SqliteJobStore::open(&path).unwrap();

    let alice = Actor::user(1);
    let job = first
        .create_job(&alice, "repoa@rev1 repoa@rev2")
        .await
        .unwrap();

    // each process builds its pool from an identical default config
    let first_id = WorkerConfig::default().worker_ids().remove(0);
    let second_id = WorkerConfig::default().worker_ids().remove(0);
    assert_ne!(first_id, second_id);

    let a = first.lease_next_task(&first_id, LEASE).await.unwrap().unwrap();
    let b = second
        .lease_next_task(&second_id, LEASE)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(a.id, b.id);
    assert!(second
        .lease_next_task(&second_id, LEASE)
        .await
        .unwrap()
        .is_some_and(|again| again.id == b.id));

    // neither process can act on the other's lease
    assert_eq!(
        second.heartbeat(a.id, &second_id, LEASE).await.unwrap(),
        LeaseStatus::Lost
    );
    assert_eq!(
        first.heartbeat(b.id, &first_id, LEASE).await.unwrap(),
        LeaseStatus::Lost
    );

    let tasks = first.list_tasks(&alice, job.id).await.unwrap();
    assert!(tasks.iter().all(|t| t.attempts == 1));
}
