//! Schema migrations for the seven relational tables named in
//! `SPEC_FULL.md` §6.1: `conversations`, `conversation_messages`,
//! `flow_runs`, `flow_step_runs`, `llm_requests`, `tasks`, `worker_health`.

pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240101_000001_create_tables::Migration)]
    }
}
