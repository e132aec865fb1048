use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lingolink::{
    cache::{ConversationCache, RedisHandle},
    conversation::ConversationRepository,
    db::{create_pool, run_migrations},
    message::{MessageRepository, MessageService, Messaging},
    presence::PresenceStore,
    routes::create_router,
    state::{AppState, Config},
    user::{UserDirectory, UserRepository},
    websocket::{ConnectionManager, RateLimiter},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,lingolink=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env());

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL environment variable is not set")?;

    tracing::info!("Connecting to database...");
    let db = create_pool(&database_url)
        .await
        .context("failed to connect to database")?;

    tracing::info!("Running migrations...");
    run_migrations(&db).await.context("migrations failed")?;

    // Redis backs presence and the conversation-summary cache; the server
    // still comes up (degraded) if it is unreachable.
    let redis = RedisHandle::new(&config.redis_url).context("invalid REDIS_URL")?;
    let presence = PresenceStore::new(redis.clone());
    let conversation_cache = ConversationCache::new(redis, config.conversation_cache_ttl_secs);

    // Repositories
    let user_repository = Arc::new(UserRepository::new(db.clone()));
    let message_repository = MessageRepository::new(db.clone());
    let conversation_repository = ConversationRepository::new(db.clone());

    // Messaging core, one contract for both the REST facade and the gateway
    let messaging: Arc<dyn Messaging> = Arc::new(MessageService::new(
        message_repository,
        conversation_repository,
        user_repository.clone() as Arc<dyn UserDirectory>,
        conversation_cache,
    ));

    // Real-time gateway state
    let ws_connections = ConnectionManager::new();
    let rate_limiter = RateLimiter::new(
        config.ws_rate_limit_max,
        Duration::from_secs(config.ws_rate_limit_window_secs),
    );
    rate_limiter.start_sweeper(Duration::from_secs(60));

    let state = AppState {
        db,
        config: config.clone(),
        users: user_repository as Arc<dyn UserDirectory>,
        messaging,
        presence,
        ws_connections,
        rate_limiter,
    };

    let app = create_router(state);

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
