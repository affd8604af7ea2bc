//! The four key families of the observation store (`spec.md` §4.G) and
//! their TTLs. Centralized here so `queue.rs` and `workers.rs` never embed
//! a `format!` literal of their own -- the prefixes are the one thing every
//! reader of this module needs memorized.

pub const TASK_TTL_SECS: u64 = 24 * 60 * 60;
pub const PROGRESS_TTL_SECS: u64 = 24 * 60 * 60;
pub const WORKER_TTL_SECS: u64 = 60 * 60;

pub const DEFAULT_QUEUE_NAME: &str = "flows";
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

pub fn task_key(task_id: &str) -> String {
    format!("task:{task_id}")
}

pub fn progress_key(task_id: &str) -> String {
    format!("progress:{task_id}")
}

pub fn worker_key(worker_id: &str) -> String {
    format!("worker:{worker_id}")
}

pub fn queue_stats_key(queue_name: &str) -> String {
    format!("queue:stats:{queue_name}")
}
