use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    cache::ConversationCache,
    conversation::{conversation_key, ConversationRepository, ConversationRow},
    error::{AppError, Result},
    message::{
        message_dto::{ConversationSummary, LastMessage, SendMessageRequest, SendOutcome},
        message_models::{Message, MessageResponse, MessageType},
        message_repository::MessageRepository,
    },
    user::{UserDirectory, UserProfile},
};

/// Conversation stats for the info endpoint; the caller layers presence on
/// top, since presence is not this service's to answer.
#[derive(Debug, Clone)]
pub struct ConversationStats {
    pub conversation_id: String,
    pub other_user: UserProfile,
    pub are_friends: bool,
    pub unread_count: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// The messaging core. One contract consumed by both the REST facade and
/// the real-time gateway; owns all writes to messages, conversations and
/// the conversation-summary cache.
#[async_trait]
pub trait Messaging: Send + Sync {
    /// Persists a message between friends, finds-or-creates the canonical
    /// conversation, bumps the recipient's unread counter and invalidates
    /// both participants' cached summaries.
    async fn send_message(
        &self,
        sender_id: Uuid,
        request: SendMessageRequest,
    ) -> Result<SendOutcome>;

    /// Non-deleted messages of the pair in chronological order. Pages are
    /// 1-based; `has_more` is the caller comparing the returned count to
    /// `limit`, which is an approximation (an exact-limit final page reads
    /// as "more available").
    async fn get_conversation_messages(
        &self,
        user_id: Uuid,
        other_user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Vec<MessageResponse>>;

    /// Marks everything from `other_user_id` as read and zeroes the
    /// reader's unread counter. Idempotent.
    async fn mark_messages_as_read(&self, user_id: Uuid, other_user_id: Uuid) -> Result<()>;

    /// Cache-first summary list of the user's active conversations, newest
    /// activity first.
    async fn get_user_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>>;

    /// Sender-only soft delete. Returns the updated message so callers can
    /// broadcast the deletion.
    async fn delete_message(&self, user_id: Uuid, message_id: Uuid) -> Result<Message>;

    async fn get_unread_count(&self, user_id: Uuid) -> Result<i64>;

    async fn search_messages(
        &self,
        user_id: Uuid,
        query: &str,
        limit: u32,
    ) -> Result<Vec<MessageResponse>>;

    async fn get_conversation_stats(
        &self,
        user_id: Uuid,
        other_user_id: Uuid,
    ) -> Result<ConversationStats>;

    /// Hides the conversation for the caller only. It does not resurface
    /// on new messages; the other participant is unaffected.
    async fn clear_conversation(&self, user_id: Uuid, other_user_id: Uuid) -> Result<()>;

    /// Conversation ids currently present in the user's summary cache.
    /// Used by the gateway to pre-join routing rooms on connect.
    async fn cached_conversation_ids(&self, user_id: Uuid) -> Vec<String>;
}

#[derive(Clone)]
pub struct MessageService {
    messages: MessageRepository,
    conversations: ConversationRepository,
    users: Arc<dyn UserDirectory>,
    cache: ConversationCache,
}

impl MessageService {
    pub fn new(
        messages: MessageRepository,
        conversations: ConversationRepository,
        users: Arc<dyn UserDirectory>,
        cache: ConversationCache,
    ) -> Self {
        Self {
            messages,
            conversations,
            users,
            cache,
        }
    }

    async fn invalidate_both(&self, a: Uuid, b: Uuid) {
        self.cache.invalidate(a).await;
        self.cache.invalidate(b).await;
    }
}

fn clamp_limit(limit: u32) -> i64 {
    limit.clamp(1, 100) as i64
}

fn summary_from_row(row: ConversationRow) -> ConversationSummary {
    let last_message = match (
        row.last_message_id,
        row.last_message_sender_id,
        row.last_message_content,
        row.last_message_type,
        row.last_message_is_read,
        row.last_message_created_at,
    ) {
        (Some(id), Some(sender_id), Some(content), Some(message_type), Some(is_read), Some(created_at)) => {
            Some(LastMessage {
                id,
                sender_id,
                content,
                message_type,
                is_read,
                created_at,
            })
        }
        _ => None,
    };

    ConversationSummary {
        conversation_id: conversation_key(row.user_low, row.user_high),
        other_user: UserProfile {
            id: row.other_id,
            fullname: row.other_fullname,
            profile_pic: row.other_profile_pic,
        },
        last_message,
        last_activity: row.last_activity,
        unread_count: row.unread_count,
    }
}

#[async_trait]
impl Messaging for MessageService {
    async fn send_message(
        &self,
        sender_id: Uuid,
        request: SendMessageRequest,
    ) -> Result<SendOutcome> {
        request.validate()?;

        let content = request.content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("Message content is required".to_string()));
        }
        if sender_id == request.recipient_id {
            return Err(AppError::Validation(
                "Cannot send a message to yourself".to_string(),
            ));
        }
        if request.message_type != MessageType::Text && request.file_url.is_none() {
            return Err(AppError::Validation(
                "File messages require a file reference".to_string(),
            ));
        }

        let sender = self
            .users
            .find_by_id(sender_id)
            .await?
            .ok_or(AppError::NotFound("Sender not found".to_string()))?;

        if !self.users.are_friends(sender_id, request.recipient_id).await? {
            return Err(AppError::NotFriends);
        }

        let message = self
            .messages
            .create(
                sender_id,
                request.recipient_id,
                content,
                request.message_type,
                request.file_url.as_deref(),
                request.file_name.as_deref(),
            )
            .await
            .map_err(wrap_store("failed to send message"))?;

        match self
            .conversations
            .find_between(sender_id, request.recipient_id)
            .await?
        {
            Some(conversation) => {
                self.conversations
                    .record_message(conversation.id, message.id, request.recipient_id)
                    .await?;
            }
            None => {
                let created = self
                    .conversations
                    .create_for_pair(sender_id, request.recipient_id, message.id)
                    .await?;

                // A concurrent send created it first; fall back to updating
                // the existing row.
                if created.is_none() {
                    if let Some(conversation) = self
                        .conversations
                        .find_between(sender_id, request.recipient_id)
                        .await?
                    {
                        self.conversations
                            .record_message(conversation.id, message.id, request.recipient_id)
                            .await?;
                    }
                }
            }
        }

        self.invalidate_both(sender_id, request.recipient_id).await;

        let conversation_id = conversation_key(sender_id, request.recipient_id);

        Ok(SendOutcome {
            message: MessageResponse::from_message(message, sender.into()),
            conversation_id,
        })
    }

    async fn get_conversation_messages(
        &self,
        user_id: Uuid,
        other_user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Vec<MessageResponse>> {
        let page = page.max(1);
        let limit = clamp_limit(limit);
        let offset = (page as i64 - 1) * limit;

        let mut messages = self
            .messages
            .find_conversation(user_id, other_user_id, limit, offset)
            .await
            .map_err(wrap_store("failed to get messages"))?;

        // Fetched newest-first for pagination; return oldest-first.
        messages.reverse();

        Ok(messages.into_iter().map(MessageResponse::from).collect())
    }

    async fn mark_messages_as_read(&self, user_id: Uuid, other_user_id: Uuid) -> Result<()> {
        self.messages
            .mark_conversation_read(user_id, other_user_id)
            .await
            .map_err(wrap_store("failed to mark messages as read"))?;

        if let Some(conversation) = self
            .conversations
            .find_between(user_id, other_user_id)
            .await?
        {
            self.conversations
                .zero_unread(conversation.id, user_id)
                .await?;
            self.cache.invalidate(user_id).await;
        }

        Ok(())
    }

    async fn get_user_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>> {
        if let Some(cached) = self.cache.get(user_id).await {
            return Ok(cached);
        }

        let rows = self
            .conversations
            .list_active_for_user(user_id)
            .await
            .map_err(wrap_store("failed to get conversations"))?;

        let summaries: Vec<ConversationSummary> = rows.into_iter().map(summary_from_row).collect();

        self.cache.put(user_id, &summaries).await;

        Ok(summaries)
    }

    async fn delete_message(&self, user_id: Uuid, message_id: Uuid) -> Result<Message> {
        let message = self
            .messages
            .soft_delete(message_id, user_id)
            .await
            .map_err(wrap_store("failed to delete message"))?
            .ok_or(AppError::NotFound(
                "Message not found or not authorized".to_string(),
            ))?;

        self.invalidate_both(message.sender_id, message.recipient_id)
            .await;

        Ok(message)
    }

    async fn get_unread_count(&self, user_id: Uuid) -> Result<i64> {
        self.messages
            .count_unread(user_id)
            .await
            .map_err(wrap_store("failed to get unread count"))
    }

    async fn search_messages(
        &self,
        user_id: Uuid,
        query: &str,
        limit: u32,
    ) -> Result<Vec<MessageResponse>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("Search query is required".to_string()));
        }

        let messages = self
            .messages
            .search(user_id, query, clamp_limit(limit))
            .await
            .map_err(wrap_store("failed to search messages"))?;

        Ok(messages.into_iter().map(MessageResponse::from).collect())
    }

    async fn get_conversation_stats(
        &self,
        user_id: Uuid,
        other_user_id: Uuid,
    ) -> Result<ConversationStats> {
        let other_user = self
            .users
            .find_by_id(other_user_id)
            .await?
            .ok_or(AppError::NotFound("User not found".to_string()))?;

        let are_friends = self.users.are_friends(user_id, other_user_id).await?;
        let conversation = self
            .conversations
            .find_between(user_id, other_user_id)
            .await?;

        let (unread_count, last_activity) = match &conversation {
            Some(conversation) => (
                self.conversations
                    .unread_for(conversation.id, user_id)
                    .await?,
                Some(conversation.last_activity),
            ),
            None => (0, None),
        };

        Ok(ConversationStats {
            conversation_id: conversation_key(user_id, other_user_id),
            other_user: other_user.into(),
            are_friends,
            unread_count,
            last_activity,
        })
    }

    async fn clear_conversation(&self, user_id: Uuid, other_user_id: Uuid) -> Result<()> {
        if let Some(conversation) = self
            .conversations
            .find_between(user_id, other_user_id)
            .await?
        {
            self.conversations
                .set_inactive(conversation.id, user_id)
                .await?;
            self.cache.invalidate(user_id).await;
        }

        Ok(())
    }

    async fn cached_conversation_ids(&self, user_id: Uuid) -> Vec<String> {
        self.cache
            .get(user_id)
            .await
            .map(|summaries| {
                summaries
                    .into_iter()
                    .map(|summary| summary.conversation_id)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Re-labels a storage error with the failing operation, leaving domain
/// errors untouched.
fn wrap_store(context: &'static str) -> impl FnOnce(AppError) -> AppError {
    move |err| match err {
        AppError::Store { source, .. } => AppError::Store { context, source },
        other => other,
    }
}
