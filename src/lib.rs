pub mod auth;
pub mod cache;
pub mod conversation;
pub mod db;
pub mod error;
pub mod message;
pub mod middleware;
pub mod presence;
pub mod routes;
pub mod state;
pub mod user;
pub mod websocket;
