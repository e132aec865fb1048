use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::message::message_models::MessageType;

/// Orders a pair of participant ids ascending. The sorted pair is both the
/// storage key (`user_low`/`user_high`) and the basis of the canonical
/// conversation id.
pub fn sort_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Canonical conversation id for an unordered pair of users. Also used as
/// the real-time routing room name, so both sides derive the same room
/// regardless of who computes it.
pub fn conversation_key(a: Uuid, b: Uuid) -> String {
    let (low, high) = sort_pair(a, b);
    format!("{}_{}", low, high)
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub user_low: Uuid,
    pub user_high: Uuid,
    pub last_message_id: Option<Uuid>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One active conversation of a user as read back from the store, with the
/// other participant's display fields and the last message joined in.
#[derive(Debug, Clone, FromRow)]
pub struct ConversationRow {
    pub id: Uuid,
    pub user_low: Uuid,
    pub user_high: Uuid,
    pub last_activity: DateTime<Utc>,
    pub unread_count: i64,
    pub other_id: Uuid,
    pub other_fullname: String,
    pub other_profile_pic: String,
    pub last_message_id: Option<Uuid>,
    pub last_message_sender_id: Option<Uuid>,
    pub last_message_content: Option<String>,
    pub last_message_type: Option<MessageType>,
    pub last_message_is_read: Option<bool>,
    pub last_message_created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(conversation_key(a, b), conversation_key(b, a));
    }

    #[test]
    fn conversation_key_joins_sorted_ids() {
        let a = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        let b = Uuid::parse_str("00000000-0000-0000-0000-000000000002").unwrap();
        assert_eq!(conversation_key(b, a), format!("{}_{}", a, b));
    }
}
