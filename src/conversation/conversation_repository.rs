use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    conversation::conversation_models::{sort_pair, Conversation, ConversationRow},
    error::Result,
};

#[derive(Clone)]
pub struct ConversationRepository {
    pool: PgPool,
}

impl ConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_between(&self, user_id: Uuid, other_id: Uuid) -> Result<Option<Conversation>> {
        let (low, high) = sort_pair(user_id, other_id);

        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE user_low = $1 AND user_high = $2",
        )
        .bind(low)
        .bind(high)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    /// Creates the canonical conversation for the pair together with its
    /// two participant rows: unread 0 for the sender, 1 for the recipient,
    /// both active. Returns None if another writer created it first; the
    /// caller then falls back to `record_message` on the existing row.
    pub async fn create_for_pair(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        first_message_id: Uuid,
    ) -> Result<Option<Conversation>> {
        let (low, high) = sort_pair(sender_id, recipient_id);

        let mut tx = self.pool.begin().await?;

        let conversation = sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations (user_low, user_high, last_message_id, last_activity)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (user_low, user_high) DO NOTHING
             RETURNING *",
        )
        .bind(low)
        .bind(high)
        .bind(first_message_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(conversation) = &conversation {
            sqlx::query(
                "INSERT INTO conversation_participants (conversation_id, user_id, unread_count, is_active)
                 VALUES ($1, $2, 0, TRUE), ($1, $3, 1, TRUE)",
            )
            .bind(conversation.id)
            .bind(sender_id)
            .bind(recipient_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(conversation)
    }

    /// Advances the last-message pointer and bumps the recipient's unread
    /// counter. The increment is a single UPDATE so concurrent sends to the
    /// same conversation cannot lose updates.
    pub async fn record_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        recipient_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE conversations
             SET last_message_id = $2, last_activity = now()
             WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "UPDATE conversation_participants
             SET unread_count = unread_count + 1
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn zero_unread(&self, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE conversation_participants
             SET unread_count = 0
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Hides the conversation for one participant and clears their counter.
    /// The conversation row itself is never deleted.
    pub async fn set_inactive(&self, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE conversation_participants
             SET is_active = FALSE, unread_count = 0
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn unread_for(&self, conversation_id: Uuid, user_id: Uuid) -> Result<i64> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT unread_count FROM conversation_participants
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.unwrap_or(0))
    }

    /// The user's active conversations with the other participant's profile
    /// and the last message joined in, newest activity first. The active
    /// filter is a plain join against the participant row.
    pub async fn list_active_for_user(&self, user_id: Uuid) -> Result<Vec<ConversationRow>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            "SELECT c.id,
                    c.user_low,
                    c.user_high,
                    c.last_activity,
                    me.unread_count,
                    u.id AS other_id,
                    u.fullname AS other_fullname,
                    u.profile_pic AS other_profile_pic,
                    m.id AS last_message_id,
                    m.sender_id AS last_message_sender_id,
                    m.content AS last_message_content,
                    m.message_type AS last_message_type,
                    m.is_read AS last_message_is_read,
                    m.created_at AS last_message_created_at
             FROM conversations c
             JOIN conversation_participants me
               ON me.conversation_id = c.id AND me.user_id = $1 AND me.is_active
             JOIN conversation_participants other
               ON other.conversation_id = c.id AND other.user_id <> $1
             JOIN users u ON u.id = other.user_id
             LEFT JOIN messages m ON m.id = c.last_message_id
             ORDER BY c.last_activity DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
