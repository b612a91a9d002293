//! End-to-end idempotency: repeated submissions through the durable store
//! produce exactly one side effect and identical cached results.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use calbridge_core::idempotency_key;
use calbridge_core::ports::{EnqueueOutcome, JobQueue, JobStore};
use calbridge_domain::{JobRecord, OperationKind, Result as DomainResult};
use calbridge_infra::database::SqliteJobStore;
use calbridge_infra::{DatabaseManager, JobDispatcher, JobExecutor, JobExecutorConfig};
use tempfile::TempDir;

/// Dispatcher standing in for a provider write: counts invocations.
struct CountingDispatcher {
    mutations: AtomicUsize,
}

#[async_trait]
impl JobDispatcher for CountingDispatcher {
    async fn dispatch(&self, _job: &JobRecord) -> DomainResult<serde_json::Value> {
        let n = self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({"event_id": "evt-1", "mutation": n}))
    }
}

#[tokio::test]
async fn n_submissions_one_mutation_identical_results() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = TempDir::new().unwrap();
    let db = DatabaseManager::open(&calbridge_domain::DatabaseConfig {
        path: dir.path().join("jobs.db").to_string_lossy().into_owned(),
        pool_size: 2,
    })
    .unwrap();
    let store = Arc::new(SqliteJobStore::new(db));
    let dispatcher = Arc::new(CountingDispatcher { mutations: AtomicUsize::new(0) });

    let payload = r#"{"title":"Planning"}"#;
    let key = idempotency_key("u1", OperationKind::CreateEvent, payload);

    // First submission is accepted, the rest collapse.
    let mut outcomes = Vec::new();
    for _ in 0..3 {
        outcomes.push(
            store
                .enqueue(OperationKind::CreateEvent, payload.to_string(), key.clone())
                .await
                .unwrap(),
        );
    }
    assert_eq!(outcomes[0], EnqueueOutcome::Accepted);
    assert_eq!(outcomes[1], EnqueueOutcome::Duplicate);
    assert_eq!(outcomes[2], EnqueueOutcome::Duplicate);

    // One batch run performs the single side effect.
    let store_trait: Arc<dyn JobStore> = store.clone();
    let dispatcher_trait: Arc<dyn JobDispatcher> = dispatcher.clone();
    JobExecutor::process_batch(&store_trait, &dispatcher_trait, &JobExecutorConfig::default())
        .await
        .unwrap();
    assert_eq!(dispatcher.mutations.load(Ordering::SeqCst), 1);

    // Subsequent submissions return the same cached result, no new run.
    let cached = store
        .enqueue(OperationKind::CreateEvent, payload.to_string(), key.clone())
        .await
        .unwrap();
    let EnqueueOutcome::AlreadySucceeded(result) = cached else {
        panic!("expected cached result, got {cached:?}");
    };
    assert!(result.contains("evt-1"));

    JobExecutor::process_batch(&store_trait, &dispatcher_trait, &JobExecutorConfig::default())
        .await
        .unwrap();
    assert_eq!(
        dispatcher.mutations.load(Ordering::SeqCst),
        1,
        "a succeeded job must never run again"
    );

    let record = store.get(&key).await.unwrap().unwrap();
    assert_eq!(record.attempt_count, 1);
}
