pub mod connection;
pub mod events;
pub mod handler;
pub mod rate_limit;
pub mod types;

pub use connection::{ConnectionManager, WsSender};
pub use events::{conversation_room, dispatch_client_event, ConnectionCtx};
pub use handler::{announce_online, close_connection, ws_handler};
pub use rate_limit::RateLimiter;
