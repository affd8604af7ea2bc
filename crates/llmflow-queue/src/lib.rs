//! The Task Queue (`SPEC_FULL.md` §4.G): a Redis-backed dispatcher that
//! submits flow executions to out-of-process workers, with durable task
//! status, progress heartbeats, worker health reporting and cooperative
//! cancellation.
//!
//! `queue.rs` is the submitter side (`TaskQueue`); `workers.rs` is the
//! consumer-facing health directory (`WorkerDirectory`), shared by both the
//! worker process (writing its own heartbeats) and an admin dashboard
//! (reading them). `store.rs` is the durable mirror described in
//! `DESIGN.md` OQ-1 -- Redis alone is the source of truth for in-flight
//! state, but terminal outcomes also land in `tasks`/`worker_health` so
//! they survive the observation store's TTLs.

pub mod keys;
pub mod model;
pub mod queue;
pub mod redis;
pub mod store;
pub mod workers;

pub use keys::{DEFAULT_QUEUE_NAME, HEARTBEAT_INTERVAL_SECS};
pub use model::{FlowJob, ProgressUpdate, SubmitOutcome, TaskState, TaskStatus, WorkerHealth, WorkerState};
pub use queue::{QueueError, SubmitOptions, TaskQueue};
pub use redis::{QueueTransportError, RedisHandle};
pub use store::{TaskStore, TaskStoreError, WorkerHealthStore};
pub use workers::{WorkerDirectory, WorkerDirectoryError, WORKER_OFFLINE_TTL};
