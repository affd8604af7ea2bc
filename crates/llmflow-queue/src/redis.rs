//! The "Redis handle" external collaborator named in `spec.md` §6: a
//! pooled, shared connection the Task Queue Service and the worker both
//! hold. `redis::aio::ConnectionManager` already reconnects transparently
//! on a dropped connection, so there is no hand-rolled pool here.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};

#[derive(Debug, thiserror::Error)]
pub enum QueueTransportError {
    #[error(transparent)]
    Redis(#[from] RedisError),
    #[error("failed to (de)serialize queue payload: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A cloneable handle around a single pooled Redis connection manager,
/// matching `spec.md` §5's "Redis connections are pooled and shared".
#[derive(Clone)]
pub struct RedisHandle {
    manager: ConnectionManager,
}

impl RedisHandle {
    pub async fn connect(redis_url: &str) -> Result<Self, QueueTransportError> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        Ok(RedisHandle { manager })
    }

    pub async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<(), QueueTransportError> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, QueueTransportError> {
        let mut conn = self.manager.clone();
        Ok(conn.get(key).await?)
    }

    pub async fn del(&self, key: &str) -> Result<(), QueueTransportError> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    pub async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, QueueTransportError> {
        let mut conn = self.manager.clone();
        let mut iter = conn.scan_match::<_, String>(pattern).await?;
        let mut keys = Vec::new();
        while let Some(key) = futures::StreamExt::next(&mut iter).await {
            keys.push(key);
        }
        Ok(keys)
    }

    /// `enqueue_job`: pushes a serialized job onto the head of the list
    /// named after the queue (`spec.md` §6's job-queue contract), so a
    /// worker's `brpop` drains in FIFO order.
    pub async fn enqueue_job(&self, queue_name: &str, payload: &str) -> Result<(), QueueTransportError> {
        let mut conn = self.manager.clone();
        conn.lpush::<_, _, ()>(list_key(queue_name), payload).await?;
        Ok(())
    }

    /// Blocking pop with a timeout, the worker's half of `enqueue_job`.
    /// Returns `None` on timeout so the caller's loop can check for
    /// shutdown between polls.
    pub async fn dequeue_job(&self, queue_name: &str, timeout_secs: f64) -> Result<Option<String>, QueueTransportError> {
        let mut conn = self.manager.clone();
        let result: Option<(String, String)> = conn.brpop(list_key(queue_name), timeout_secs).await?;
        Ok(result.map(|(_list, payload)| payload))
    }
}

fn list_key(queue_name: &str) -> String {
    format!("queue:list:{queue_name}")
}
