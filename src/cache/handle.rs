use std::sync::Arc;

use redis::aio::ConnectionManager;
use tokio::sync::RwLock;

/// Lazily-established Redis connection shared by the presence store and the
/// conversation-summary cache. The connection is attempted on first use and
/// re-attempted on later calls if it never came up, so a Redis outage at
/// boot does not take the server down.
#[derive(Clone)]
pub struct RedisHandle {
    client: redis::Client,
    conn: Arc<RwLock<Option<ConnectionManager>>>,
}

impl RedisHandle {
    pub fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            conn: Arc::new(RwLock::new(None)),
        })
    }

    /// Returns a live connection, or None if Redis is unreachable. Callers
    /// treat None as "cache unavailable" and fall back to defaults.
    pub async fn conn(&self) -> Option<ConnectionManager> {
        if let Some(conn) = self.conn.read().await.clone() {
            return Some(conn);
        }

        match ConnectionManager::new(self.client.clone()).await {
            Ok(conn) => {
                *self.conn.write().await = Some(conn.clone());
                Some(conn)
            }
            Err(e) => {
                tracing::warn!("Redis unavailable: {}", e);
                None
            }
        }
    }
}
