use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::Result,
    message::message_models::{Message, MessageType, MessageWithSender},
};

const MESSAGE_WITH_SENDER_COLUMNS: &str =
    "m.id, m.sender_id, m.recipient_id, m.content, m.message_type,
     m.file_url, m.file_name, m.is_read, m.read_at, m.created_at,
     u.fullname AS sender_fullname, u.profile_pic AS sender_profile_pic";

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        content: &str,
        message_type: MessageType,
        file_url: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (sender_id, recipient_id, content, message_type, file_url, file_name)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(sender_id)
        .bind(recipient_id)
        .bind(content)
        .bind(message_type)
        .bind(file_url)
        .bind(file_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    /// Non-deleted messages between the pair, newest first.
    pub async fn find_conversation(
        &self,
        user_id: Uuid,
        other_user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageWithSender>> {
        let messages = sqlx::query_as::<_, MessageWithSender>(&format!(
            "SELECT {MESSAGE_WITH_SENDER_COLUMNS}
             FROM messages m
             JOIN users u ON u.id = m.sender_id
             WHERE ((m.sender_id = $1 AND m.recipient_id = $2)
                OR (m.sender_id = $2 AND m.recipient_id = $1))
             AND m.is_deleted = FALSE
             ORDER BY m.created_at DESC
             LIMIT $3 OFFSET $4",
        ))
        .bind(user_id)
        .bind(other_user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    /// Flips every unread message from `other_user_id` to read. Already-read
    /// messages keep their original read_at, so re-running is a no-op.
    pub async fn mark_conversation_read(
        &self,
        user_id: Uuid,
        other_user_id: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE messages
             SET is_read = TRUE, read_at = now()
             WHERE sender_id = $2 AND recipient_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .bind(other_user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Soft delete, sender-only. Returns None when the message does not
    /// exist, is already deleted, or belongs to someone else.
    pub async fn soft_delete(&self, message_id: Uuid, sender_id: Uuid) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(
            "UPDATE messages
             SET is_deleted = TRUE, deleted_at = now()
             WHERE id = $1 AND sender_id = $2 AND is_deleted = FALSE
             RETURNING *",
        )
        .bind(message_id)
        .bind(sender_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    pub async fn count_unread(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages
             WHERE recipient_id = $1 AND is_read = FALSE AND is_deleted = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Case-insensitive substring search over the user's own messages,
    /// sent or received, newest first.
    pub async fn search(
        &self,
        user_id: Uuid,
        query: &str,
        limit: i64,
    ) -> Result<Vec<MessageWithSender>> {
        let pattern = format!("%{}%", escape_like(query));

        let messages = sqlx::query_as::<_, MessageWithSender>(&format!(
            "SELECT {MESSAGE_WITH_SENDER_COLUMNS}
             FROM messages m
             JOIN users u ON u.id = m.sender_id
             WHERE (m.sender_id = $1 OR m.recipient_id = $1)
             AND m.content ILIKE $2
             AND m.is_deleted = FALSE
             ORDER BY m.created_at DESC
             LIMIT $3",
        ))
        .bind(user_id)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_like_metacharacters() {
        assert_eq!(escape_like("50%_done\\"), "50\\%\\_done\\\\");
        assert_eq!(escape_like("hello"), "hello");
    }
}
