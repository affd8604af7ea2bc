//! End-to-end Task Queue scenarios against a live Redis instance
//! (`spec.md` §8 scenarios S5/S6). These are `#[ignore]`d by default since
//! they need `REDIS_URL` (or local default `redis://127.0.0.1:6379`)
//! pointing at a real server; run with `cargo test -- --ignored` once one
//! is available.

use llmflow_queue::{RedisHandle, SubmitOptions, TaskQueue, TaskState, WorkerDirectory};

async fn queue() -> TaskQueue {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_owned());
    let redis = RedisHandle::connect(&url).await.expect("redis must be reachable for this test");
    TaskQueue::new(redis)
}

/// Scenario S6 (`spec.md` §8): cancelling a task before any worker claims
/// it transitions it straight to `cancelled`, and a second `cancel_task`
/// call is a no-op that returns `false` -- cancellation idempotence
/// (`spec.md` §8 #8).
#[tokio::test]
#[ignore = "requires a live Redis instance"]
async fn cancel_before_claim_is_idempotent() {
    let queue = queue().await;
    let outcome = queue
        .submit_flow_task("demo_flow", serde_json::json!({"x": 1}), SubmitOptions::default())
        .await
        .unwrap();

    assert!(queue.cancel_task(outcome.task_id).await.unwrap());
    assert!(!queue.cancel_task(outcome.task_id).await.unwrap());

    let status = queue.get_task_status(outcome.task_id).await.unwrap().unwrap();
    assert_eq!(status.status, TaskState::Cancelled);
    assert!(status.completed_at.is_some());
}

/// Scenario S5 (`spec.md` §8): a submitted task observes the
/// `pending -> in_progress -> completed` sequence, and a worker's
/// heartbeats are visible via `WorkerDirectory` while it runs.
#[tokio::test]
#[ignore = "requires a live Redis instance"]
async fn submit_claim_progress_complete_sequence() {
    let queue = queue().await;
    let worker_id = format!("test-worker-{}", uuid::Uuid::new_v4());
    let redis = queue.redis().clone();
    let workers = WorkerDirectory::new(redis);
    workers.register(&worker_id, "flows", "localhost", std::process::id(), "0.1.0").await.unwrap();

    let outcome = queue
        .submit_flow_task("demo_flow", serde_json::json!({}), SubmitOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.status, TaskState::Pending);

    let job = queue.dequeue("flows", 5.0).await.unwrap().expect("job should be enqueued");
    assert_eq!(job.task_id, outcome.task_id);

    queue.mark_task_started(outcome.task_id, &worker_id).await.unwrap();
    workers.report_task_started(&worker_id).await.unwrap();

    for pct in [25, 50, 75] {
        queue.update_task_progress(outcome.task_id, pct, Some("working")).await.unwrap();
    }

    queue.complete_task(outcome.task_id, Some(serde_json::json!({"ok": true})), None).await.unwrap();
    workers.report_task_completed(&worker_id).await.unwrap();

    let status = queue.get_task_status(outcome.task_id).await.unwrap().unwrap();
    assert_eq!(status.status, TaskState::Completed);
    assert_eq!(status.progress_percentage, 100);
    assert_eq!(status.outputs, Some(serde_json::json!({"ok": true})));

    let health = workers.get(&worker_id).await.unwrap().unwrap();
    assert_eq!(health.total_processed, 1);

    // re-requesting a missing task's status is the one place callers see `None`
    let missing = queue.get_task_status(uuid::Uuid::new_v4()).await.unwrap();
    assert!(missing.is_none());

    // a terminal task can't be cancelled after the fact
    assert!(!queue.cancel_task(outcome.task_id).await.unwrap());
}
