//! Relational persistence for the conversation/flow/ledger/task tables.
//!
//! `sea-orm` was chosen over the teacher's own `rusqlite` session store
//! (`agent::session::sqlite`) because its `DatabaseTransaction` is already
//! an async commit/rollback object -- exactly the "session provider"
//! contract `spec.md` §6 names, without hand-rolling one over
//! `spawn_blocking` the way the teacher's synchronous store does.

pub mod entity;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Connection(#[from] sea_orm::DbErr),
}

/// Thin wrapper around a `sea_orm::DatabaseConnection`. Every unit of work
/// that must be all-or-nothing (a flow step write plus its run-status
/// update, a dense-ordinal message append) runs inside `with_transaction`,
/// which commits on `Ok` and rolls back on `Err` -- the scoped-session
/// contract `spec.md` §6 describes.
#[derive(Clone)]
pub struct DbHandle {
    connection: DatabaseConnection,
}

impl DbHandle {
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let mut options = ConnectOptions::new(database_url.to_owned());
        options.sqlx_logging(false);
        let connection = Database::connect(options).await?;
        Ok(DbHandle { connection })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Runs `work` inside a transaction, committing on success and rolling
    /// back on any error (including one raised inside `work` itself).
    pub async fn with_transaction<F, T, E>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(
            &'c DatabaseTransaction,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, E>> + Send + 'c>>
            + Send,
        T: Send,
        E: From<DbError> + Send,
    {
        let txn = self.connection.begin().await.map_err(DbError::from)?;
        match work(&txn).await {
            Ok(value) => {
                txn.commit().await.map_err(DbError::from)?;
                Ok(value)
            }
            Err(e) => {
                let _ = txn.rollback().await;
                Err(e)
            }
        }
    }
}
