use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    message::{
        message_dto::ConversationSummary,
        message_models::{MessageResponse, MessageType},
    },
    user::UserProfile,
};

/// Raw inbound frame: the event name first, so malformed payloads can still
/// be answered with the scoped error for that event.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

// ── Inbound payloads ────────────────────────────────────────────────────

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    50
}

fn default_search_limit() -> u32 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct DmSendPayload {
    pub recipient_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DmSeenPayload {
    pub other_user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DmDeletePayload {
    pub message_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetMessagesPayload {
    pub other_user_id: Uuid,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchPayload {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinConversationPayload {
    pub other_user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaveConversationPayload {
    pub conversation_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypingPayload {
    pub conversation_id: String,
}

// ── Outbound events ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedError {
    pub message: String,
    /// The inbound event that failed, so clients can correlate.
    pub event: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DmDeliveryPayload {
    pub message: MessageResponse,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationMessage {
    pub id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMessagePayload {
    pub sender: UserProfile,
    pub message: NotificationMessage,
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeenConfirmedPayload {
    pub other_user_id: Uuid,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadReceiptPayload {
    pub read_by: Uuid,
    pub read_by_name: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DmDeletedPayload {
    pub message_id: Uuid,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageDeletedPayload {
    pub message_id: Uuid,
    pub deleted_by: Uuid,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagesLoadedPayload {
    pub other_user_id: Uuid,
    pub messages: Vec<MessageResponse>,
    pub page: u32,
    pub has_more: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationsLoadedPayload {
    pub conversations: Vec<ConversationSummary>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadCountPayload {
    pub count: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultsPayload {
    pub query: String,
    pub results: Vec<MessageResponse>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FriendPresencePayload {
    pub user_id: Uuid,
    pub fullname: String,
    pub profile_pic: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationJoinedPayload {
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinedAndLoadedPayload {
    pub conversation_id: String,
    pub other_user_id: Uuid,
    pub messages: Vec<MessageResponse>,
    pub page: u32,
    pub has_more: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypingNoticePayload {
    pub user_id: Uuid,
    pub fullname: Option<String>,
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "dm:sent")]
    DmSent(DmDeliveryPayload),
    #[serde(rename = "dm:received")]
    DmReceived(DmDeliveryPayload),
    #[serde(rename = "new_message_notification")]
    NewMessageNotification(NewMessagePayload),
    #[serde(rename = "dm:seen_confirmed")]
    DmSeenConfirmed(SeenConfirmedPayload),
    #[serde(rename = "dm:read_receipt")]
    DmReadReceipt(ReadReceiptPayload),
    #[serde(rename = "dm:deleted")]
    DmDeleted(DmDeletedPayload),
    #[serde(rename = "dm:message_deleted")]
    DmMessageDeleted(MessageDeletedPayload),
    #[serde(rename = "dm:messages_loaded")]
    DmMessagesLoaded(MessagesLoadedPayload),
    #[serde(rename = "conversations:loaded")]
    ConversationsLoaded(ConversationsLoadedPayload),
    #[serde(rename = "unread:count")]
    UnreadCount(UnreadCountPayload),
    #[serde(rename = "messages:search_results")]
    SearchResults(SearchResultsPayload),
    #[serde(rename = "friend_online")]
    FriendOnline(FriendPresencePayload),
    #[serde(rename = "friend_offline")]
    FriendOffline(FriendPresencePayload),
    #[serde(rename = "conversation_joined")]
    ConversationJoined(ConversationJoinedPayload),
    #[serde(rename = "conversation_left")]
    ConversationLeft(ConversationJoinedPayload),
    #[serde(rename = "conversation:joined_and_loaded")]
    ConversationJoinedAndLoaded(JoinedAndLoadedPayload),
    #[serde(rename = "user_typing")]
    UserTyping(TypingNoticePayload),
    #[serde(rename = "user_stopped_typing")]
    UserStoppedTyping(TypingNoticePayload),
    #[serde(rename = "pong")]
    Pong { timestamp: DateTime<Utc> },
    #[serde(rename = "dm:error")]
    DmError(ScopedError),
    #[serde(rename = "conversations:error")]
    ConversationsError(ScopedError),
    #[serde(rename = "unread:error")]
    UnreadError(ScopedError),
    #[serde(rename = "messages:search_error")]
    SearchError(ScopedError),
    #[serde(rename = "conversation:error")]
    ConversationError(ScopedError),
}

impl ServerEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::DmSent(_) => "dm:sent",
            ServerEvent::DmReceived(_) => "dm:received",
            ServerEvent::NewMessageNotification(_) => "new_message_notification",
            ServerEvent::DmSeenConfirmed(_) => "dm:seen_confirmed",
            ServerEvent::DmReadReceipt(_) => "dm:read_receipt",
            ServerEvent::DmDeleted(_) => "dm:deleted",
            ServerEvent::DmMessageDeleted(_) => "dm:message_deleted",
            ServerEvent::DmMessagesLoaded(_) => "dm:messages_loaded",
            ServerEvent::ConversationsLoaded(_) => "conversations:loaded",
            ServerEvent::UnreadCount(_) => "unread:count",
            ServerEvent::SearchResults(_) => "messages:search_results",
            ServerEvent::FriendOnline(_) => "friend_online",
            ServerEvent::FriendOffline(_) => "friend_offline",
            ServerEvent::ConversationJoined(_) => "conversation_joined",
            ServerEvent::ConversationLeft(_) => "conversation_left",
            ServerEvent::ConversationJoinedAndLoaded(_) => "conversation:joined_and_loaded",
            ServerEvent::UserTyping(_) => "user_typing",
            ServerEvent::UserStoppedTyping(_) => "user_stopped_typing",
            ServerEvent::Pong { .. } => "pong",
            ServerEvent::DmError(_) => "dm:error",
            ServerEvent::ConversationsError(_) => "conversations:error",
            ServerEvent::UnreadError(_) => "unread:error",
            ServerEvent::SearchError(_) => "messages:search_error",
            ServerEvent::ConversationError(_) => "conversation:error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_dm_send_envelope() {
        let recipient = Uuid::new_v4();
        let raw = json!({
            "event": "dm:send",
            "data": { "recipient_id": recipient, "content": "hei!" }
        })
        .to_string();

        let envelope: ClientEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(envelope.event, "dm:send");

        let payload: DmSendPayload = serde_json::from_value(envelope.data).unwrap();
        assert_eq!(payload.recipient_id, recipient);
        assert_eq!(payload.content, "hei!");
        assert_eq!(payload.message_type, MessageType::Text);
    }

    #[test]
    fn missing_required_field_fails_payload_parse_not_envelope() {
        let raw = json!({ "event": "dm:seen", "data": {} }).to_string();

        let envelope: ClientEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(envelope.event, "dm:seen");
        assert!(serde_json::from_value::<DmSeenPayload>(envelope.data).is_err());
    }

    #[test]
    fn scoped_error_serializes_with_colon_event_name() {
        let event = ServerEvent::DmError(ScopedError {
            message: "Recipient ID and content are required".to_string(),
            event: "dm:send".to_string(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "dm:error");
        assert_eq!(value["data"]["event"], "dm:send");
    }

    #[test]
    fn pong_carries_timestamp() {
        let value = serde_json::to_value(ServerEvent::Pong {
            timestamp: Utc::now(),
        })
        .unwrap();
        assert_eq!(value["event"], "pong");
        assert!(value["data"]["timestamp"].is_string());
    }
}
