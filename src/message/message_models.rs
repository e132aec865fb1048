use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::user::UserProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "message_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Message row with the sender's display fields joined in, for reads that
/// feed straight into the client.
#[derive(Debug, Clone, FromRow)]
pub struct MessageWithSender {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub sender_fullname: String,
    pub sender_profile_pic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender: UserProfile,
    pub recipient_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<MessageWithSender> for MessageResponse {
    fn from(row: MessageWithSender) -> Self {
        Self {
            id: row.id,
            sender: UserProfile {
                id: row.sender_id,
                fullname: row.sender_fullname,
                profile_pic: row.sender_profile_pic,
            },
            recipient_id: row.recipient_id,
            content: row.content,
            message_type: row.message_type,
            file_url: row.file_url,
            file_name: row.file_name,
            is_read: row.is_read,
            read_at: row.read_at,
            created_at: row.created_at,
        }
    }
}

impl MessageResponse {
    pub fn from_message(message: Message, sender: UserProfile) -> Self {
        Self {
            id: message.id,
            sender,
            recipient_id: message.recipient_id,
            content: message.content,
            message_type: message.message_type,
            file_url: message.file_url,
            file_name: message.file_name,
            is_read: message.is_read,
            read_at: message.read_at,
            created_at: message.created_at,
        }
    }
}
