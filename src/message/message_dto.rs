use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    message::message_models::{MessageResponse, MessageType},
    user::UserProfile,
};

#[derive(Clone, Debug, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    pub recipient_id: Uuid,
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
}

/// What `send_message` hands back: the persisted message with the sender's
/// display fields attached, plus the canonical conversation id the clients
/// use as their routing room.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SendOutcome {
    pub message: MessageResponse,
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LastMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Formatted per-user conversation summary; this is the cached shape.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub other_user: UserProfile,
    pub last_message: Option<LastMessage>,
    pub last_activity: DateTime<Utc>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConversationInfo {
    pub conversation_id: String,
    pub other_user: UserProfile,
    pub is_online: bool,
    pub last_seen_ms: Option<i64>,
    pub are_friends: bool,
    pub unread_count: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OnlineFriend {
    pub id: Uuid,
    pub fullname: String,
    pub profile_pic: String,
    pub is_online: bool,
}
