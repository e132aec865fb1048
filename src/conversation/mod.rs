pub mod conversation_models;
pub mod conversation_repository;

pub use conversation_models::{conversation_key, sort_pair, Conversation, ConversationRow};
pub use conversation_repository::ConversationRepository;
