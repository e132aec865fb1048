pub mod conversations;
pub mod handle;

pub use conversations::ConversationCache;
pub use handle::RedisHandle;
