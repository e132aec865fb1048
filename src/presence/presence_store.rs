use std::collections::HashMap;

use chrono::Utc;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::cache::RedisHandle;

const ONLINE_USERS_KEY: &str = "online_users";
const LAST_SEEN_ONLINE_TTL_SECS: u64 = 300;
const LAST_SEEN_OFFLINE_TTL_SECS: u64 = 86_400;

fn last_seen_key(user_id: Uuid) -> String {
    format!("user_last_seen:{}", user_id)
}

/// Redis-backed record of which users currently hold a live connection.
///
/// Presence is best-effort, not a correctness-critical path: every
/// operation swallows Redis failures, logs them, and reports the safe
/// default (offline / empty). The `user_last_seen` keys double as a
/// "recently seen" signal with a short TTL while online and a long one
/// once offline.
#[derive(Clone)]
pub struct PresenceStore {
    redis: RedisHandle,
}

impl PresenceStore {
    pub fn new(redis: RedisHandle) -> Self {
        Self { redis }
    }

    pub async fn set_online(&self, user_id: Uuid, connection_handle: Uuid) {
        let Some(mut conn) = self.redis.conn().await else {
            return;
        };

        if let Err(e) = conn
            .hset::<_, _, _, ()>(
                ONLINE_USERS_KEY,
                user_id.to_string(),
                connection_handle.to_string(),
            )
            .await
        {
            tracing::warn!("failed to mark {} online: {}", user_id, e);
            return;
        }

        let _ = conn
            .set_ex::<_, _, ()>(
                last_seen_key(user_id),
                Utc::now().timestamp_millis(),
                LAST_SEEN_ONLINE_TTL_SECS,
            )
            .await;
    }

    pub async fn set_offline(&self, user_id: Uuid) {
        let Some(mut conn) = self.redis.conn().await else {
            return;
        };

        if let Err(e) = conn
            .hdel::<_, _, ()>(ONLINE_USERS_KEY, user_id.to_string())
            .await
        {
            tracing::warn!("failed to mark {} offline: {}", user_id, e);
            return;
        }

        let _ = conn
            .set_ex::<_, _, ()>(
                last_seen_key(user_id),
                Utc::now().timestamp_millis(),
                LAST_SEEN_OFFLINE_TTL_SECS,
            )
            .await;
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        let Some(mut conn) = self.redis.conn().await else {
            return false;
        };

        match conn.hexists(ONLINE_USERS_KEY, user_id.to_string()).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!("presence check failed for {}: {}", user_id, e);
                false
            }
        }
    }

    /// All online users and their connection handles.
    pub async fn online_users(&self) -> HashMap<Uuid, String> {
        let Some(mut conn) = self.redis.conn().await else {
            return HashMap::new();
        };

        let raw: HashMap<String, String> = match conn.hgetall(ONLINE_USERS_KEY).await {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("failed to list online users: {}", e);
                return HashMap::new();
            }
        };

        raw.into_iter()
            .filter_map(|(id, handle)| Uuid::parse_str(&id).ok().map(|id| (id, handle)))
            .collect()
    }

    /// Millisecond timestamp of the user's last presence transition, if the
    /// "recently seen" key has not expired.
    pub async fn last_seen(&self, user_id: Uuid) -> Option<i64> {
        let mut conn = self.redis.conn().await?;

        match conn.get::<_, Option<i64>>(last_seen_key(user_id)).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("last-seen lookup failed for {}: {}", user_id, e);
                None
            }
        }
    }
}
