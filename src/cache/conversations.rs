use redis::AsyncCommands;
use uuid::Uuid;

use crate::{cache::RedisHandle, message::message_dto::ConversationSummary};

fn cache_key(user_id: Uuid) -> String {
    format!("user_conversations:{}", user_id)
}

/// TTL-bounded cache of formatted conversation summaries, keyed by user.
/// A derived, invalidate-on-write view: the messaging service clears the
/// affected users' entries on every send, read, delete and clear.
///
/// All operations are best-effort. If Redis is down, reads miss and writes
/// are dropped; the source of truth is always Postgres.
#[derive(Clone)]
pub struct ConversationCache {
    redis: RedisHandle,
    ttl_secs: u64,
}

impl ConversationCache {
    pub fn new(redis: RedisHandle, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }

    pub async fn get(&self, user_id: Uuid) -> Option<Vec<ConversationSummary>> {
        let mut conn = self.redis.conn().await?;

        let raw: Option<String> = match conn.get(cache_key(user_id)).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("conversation cache read failed for {}: {}", user_id, e);
                return None;
            }
        };

        raw.and_then(|json| serde_json::from_str(&json).ok())
    }

    pub async fn put(&self, user_id: Uuid, conversations: &[ConversationSummary]) {
        let Some(mut conn) = self.redis.conn().await else {
            return;
        };

        let json = match serde_json::to_string(conversations) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("failed to serialize conversation summaries: {}", e);
                return;
            }
        };

        if let Err(e) = conn
            .set_ex::<_, _, ()>(cache_key(user_id), json, self.ttl_secs)
            .await
        {
            tracing::warn!("conversation cache write failed for {}: {}", user_id, e);
        }
    }

    pub async fn invalidate(&self, user_id: Uuid) {
        let Some(mut conn) = self.redis.conn().await else {
            return;
        };

        if let Err(e) = conn.del::<_, ()>(cache_key(user_id)).await {
            tracing::warn!("conversation cache invalidation failed for {}: {}", user_id, e);
        }
    }
}
