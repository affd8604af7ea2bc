//! The explicit per-run execution context (`spec.md` §4.E, §4.H). Grounded
//! on the teacher's `agent::execution_context::ExecutionContext`: one struct
//! bundling per-run state, passed by reference into step execution, with
//! accessor/mutator methods rather than ambient task-local state.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

use llmflow_service::LlmService;
use uuid::Uuid;

/// Carries everything a step needs to call back into the service and to
/// report its own progress, for the lifetime of a single flow run.
pub struct ExecutionContext {
    service: Arc<LlmService>,
    run_id: Uuid,
    user_id: Option<Uuid>,
    step_counter: AtomicI32,
    total_tokens: AtomicU32,
    total_cost_microcents: AtomicU32,
}

impl ExecutionContext {
    pub fn new(service: Arc<LlmService>, run_id: Uuid, user_id: Option<Uuid>) -> Self {
        ExecutionContext {
            service,
            run_id,
            user_id,
            step_counter: AtomicI32::new(0),
            total_tokens: AtomicU32::new(0),
            total_cost_microcents: AtomicU32::new(0),
        }
    }

    pub fn service(&self) -> &LlmService {
        &self.service
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    /// Returns the next 1-based, dense `step_order` for this run. Every
    /// call advances the counter, so two concurrently executing steps in
    /// the same run (there are none today, `spec.md` §4.E steps run
    /// serially) would never observe the same order twice.
    pub fn next_step_order(&self) -> i32 {
        self.step_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Running token/cost totals, tracked so the caller can report final
    /// usage without re-summing every step row.
    pub fn record_usage(&self, tokens: u32, cost: f64) {
        self.total_tokens.fetch_add(tokens, Ordering::SeqCst);
        self.total_cost_microcents.fetch_add((cost * 1_000_000.0).round() as u32, Ordering::SeqCst);
    }

    pub fn total_tokens(&self) -> u32 {
        self.total_tokens.load(Ordering::SeqCst)
    }

    pub fn total_cost_estimate(&self) -> f64 {
        self.total_cost_microcents.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmflow_db::DbHandle;

    async fn fake_service() -> Arc<LlmService> {
        let db = DbHandle::connect("sqlite::memory:").await.unwrap();
        llmflow_migration::Migrator::up(db.connection(), None).await.unwrap();
        let registry = llmflow_core::ProviderRegistry::new(vec![]);
        let cache = llmflow_cache::ResponseCache::new(std::env::temp_dir(), false, 24, 10);
        Arc::new(LlmService::new(registry, cache, db, llmflow_service::ServiceConfig::default()))
    }

    #[tokio::test]
    async fn step_order_increments_densely_from_one() {
        let ctx = ExecutionContext::new(fake_service().await, Uuid::new_v4(), None);
        assert_eq!(ctx.next_step_order(), 1);
        assert_eq!(ctx.next_step_order(), 2);
        assert_eq!(ctx.next_step_order(), 3);
    }

    #[tokio::test]
    async fn usage_accumulates_across_steps() {
        let ctx = ExecutionContext::new(fake_service().await, Uuid::new_v4(), None);
        ctx.record_usage(100, 0.002);
        ctx.record_usage(50, 0.001);
        assert_eq!(ctx.total_tokens(), 150);
        assert!((ctx.total_cost_estimate() - 0.003).abs() < 1e-9);
    }
}
