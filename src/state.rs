use std::sync::Arc;

use crate::{
    db::DbPool,
    message::message_service::Messaging,
    presence::PresenceStore,
    user::UserDirectory,
    websocket::{ConnectionManager, RateLimiter},
};

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub users: Arc<dyn UserDirectory>,
    pub messaging: Arc<dyn Messaging>,
    pub presence: PresenceStore,
    pub ws_connections: ConnectionManager,
    pub rate_limiter: RateLimiter,
}

#[derive(Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub redis_url: String,
    pub conversation_cache_ttl_secs: u64,
    pub ws_rate_limit_max: u32,
    pub ws_rate_limit_window_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            jwt_secret: std::env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            jwt_expiration_hours: std::env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a number"),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string()),
            conversation_cache_ttl_secs: std::env::var("CONVERSATION_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .expect("CONVERSATION_CACHE_TTL_SECS must be a number"),
            ws_rate_limit_max: std::env::var("WS_RATE_LIMIT_MAX")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .expect("WS_RATE_LIMIT_MAX must be a number"),
            ws_rate_limit_window_secs: std::env::var("WS_RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .expect("WS_RATE_LIMIT_WINDOW_SECS must be a number"),
        }
    }
}
