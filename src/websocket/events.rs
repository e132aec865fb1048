use std::ops::ControlFlow;

use chrono::Utc;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::{
    conversation::conversation_key,
    message::message_dto::SendMessageRequest,
    state::AppState,
    user::UserProfile,
    websocket::types::{
        ClientEnvelope, ConversationJoinedPayload, ConversationsLoadedPayload, DmDeletePayload,
        DmDeletedPayload, DmDeliveryPayload, DmSeenPayload, DmSendPayload, GetMessagesPayload,
        JoinConversationPayload, JoinedAndLoadedPayload, LeaveConversationPayload,
        MessageDeletedPayload, MessagesLoadedPayload, NewMessagePayload, NotificationMessage,
        ReadReceiptPayload, ScopedError, SearchPayload, SearchResultsPayload, SeenConfirmedPayload,
        ServerEvent, TypingPayload, TypingNoticePayload, UnreadCountPayload,
    },
};

/// Identity of one live connection, resolved during the handshake.
#[derive(Debug, Clone)]
pub struct ConnectionCtx {
    pub user_id: Uuid,
    pub conn_id: Uuid,
    pub fullname: String,
    pub profile_pic: String,
}

pub fn conversation_room(conversation_id: &str) -> String {
    format!("conversation_{}", conversation_id)
}

/// Maps an inbound event name to its scoped error event. Every handler
/// failure is routed back to the originating connection only.
fn scoped_error(event: &str, message: String) -> ServerEvent {
    let payload = ScopedError {
        message,
        event: event.to_string(),
    };

    if event.starts_with("conversations:") {
        ServerEvent::ConversationsError(payload)
    } else if event.starts_with("unread:") {
        ServerEvent::UnreadError(payload)
    } else if event.starts_with("messages:search") {
        ServerEvent::SearchError(payload)
    } else if event.starts_with("conversation") || event == "join_conversation" || event == "leave_conversation" {
        ServerEvent::ConversationError(payload)
    } else {
        ServerEvent::DmError(payload)
    }
}

/// Handles one inbound frame. Returns `Break` when the connection should
/// close (explicit logout); every error path emits a scoped error event
/// instead of disconnecting.
pub async fn dispatch_client_event(
    state: &AppState,
    ctx: &ConnectionCtx,
    text: &str,
) -> ControlFlow<()> {
    let envelope: ClientEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            // No event name to scope an error to; drop the frame.
            tracing::debug!("unparseable frame from {}: {}", ctx.user_id, e);
            return ControlFlow::Continue(());
        }
    };

    let event = envelope.event.as_str();

    if state.rate_limiter.check(ctx.user_id).is_err() {
        state.ws_connections.send_to_conn(
            ctx.conn_id,
            scoped_error(event, "Rate limit exceeded".to_string()),
        );
        return ControlFlow::Continue(());
    }

    match event {
        "dm:send" => {
            if let Some(payload) = parse_payload::<DmSendPayload>(state, ctx, event, envelope.data) {
                handle_dm_send(state, ctx, payload).await;
            }
        }
        "dm:seen" => {
            if let Some(payload) = parse_payload::<DmSeenPayload>(state, ctx, event, envelope.data) {
                handle_dm_seen(state, ctx, payload).await;
            }
        }
        "dm:delete" => {
            if let Some(payload) = parse_payload::<DmDeletePayload>(state, ctx, event, envelope.data) {
                handle_dm_delete(state, ctx, payload).await;
            }
        }
        "dm:get_messages" => {
            if let Some(payload) =
                parse_payload::<GetMessagesPayload>(state, ctx, event, envelope.data)
            {
                handle_get_messages(state, ctx, payload).await;
            }
        }
        "conversations:get" => handle_get_conversations(state, ctx).await,
        "unread:get_count" => handle_unread_count(state, ctx).await,
        "messages:search" => {
            if let Some(payload) = parse_payload::<SearchPayload>(state, ctx, event, envelope.data) {
                handle_search(state, ctx, payload).await;
            }
        }
        "join_conversation" => {
            if let Some(payload) =
                parse_payload::<JoinConversationPayload>(state, ctx, event, envelope.data)
            {
                handle_join_conversation(state, ctx, payload).await;
            }
        }
        "leave_conversation" => {
            if let Some(payload) =
                parse_payload::<LeaveConversationPayload>(state, ctx, event, envelope.data)
            {
                handle_leave_conversation(state, ctx, payload);
            }
        }
        "conversation:join_and_load" => {
            if let Some(payload) =
                parse_payload::<GetMessagesPayload>(state, ctx, event, envelope.data)
            {
                handle_join_and_load(state, ctx, payload).await;
            }
        }
        "typing_start" => {
            if let Some(payload) = parse_payload::<TypingPayload>(state, ctx, event, envelope.data) {
                relay_typing(state, ctx, payload, true);
            }
        }
        "typing_stop" => {
            if let Some(payload) = parse_payload::<TypingPayload>(state, ctx, event, envelope.data) {
                relay_typing(state, ctx, payload, false);
            }
        }
        "ping" => {
            state.ws_connections.send_to_conn(
                ctx.conn_id,
                ServerEvent::Pong {
                    timestamp: Utc::now(),
                },
            );
        }
        "logout" => return ControlFlow::Break(()),
        unknown => {
            tracing::debug!("ignoring unknown event '{}' from {}", unknown, ctx.user_id);
        }
    }

    ControlFlow::Continue(())
}

fn parse_payload<T: DeserializeOwned>(
    state: &AppState,
    ctx: &ConnectionCtx,
    event: &str,
    data: serde_json::Value,
) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(payload) => Some(payload),
        Err(e) => {
            state.ws_connections.send_to_conn(
                ctx.conn_id,
                scoped_error(event, format!("Invalid payload: {}", e)),
            );
            None
        }
    }
}

async fn handle_dm_send(state: &AppState, ctx: &ConnectionCtx, payload: DmSendPayload) {
    let recipient_id = payload.recipient_id;
    let request = SendMessageRequest {
        recipient_id,
        content: payload.content,
        message_type: payload.message_type,
        file_url: payload.file_url,
        file_name: payload.file_name,
    };

    let outcome = match state.messaging.send_message(ctx.user_id, request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            state
                .ws_connections
                .send_to_conn(ctx.conn_id, scoped_error("dm:send", e.to_string()));
            return;
        }
    };

    let now = Utc::now();

    state.ws_connections.send_to_conn(
        ctx.conn_id,
        ServerEvent::DmSent(DmDeliveryPayload {
            message: outcome.message.clone(),
            conversation_id: outcome.conversation_id.clone(),
            timestamp: now,
        }),
    );

    // Deliver only if the recipient is reachable: a local connection is
    // authoritative, the presence store covers other gateway instances.
    let recipient_reachable = state.ws_connections.is_connected(recipient_id)
        || state.presence.is_online(recipient_id).await;
    if !recipient_reachable {
        return;
    }

    state.ws_connections.send_to_room(
        &conversation_room(&outcome.conversation_id),
        Some(ctx.conn_id),
        ServerEvent::DmReceived(DmDeliveryPayload {
            message: outcome.message.clone(),
            conversation_id: outcome.conversation_id.clone(),
            timestamp: now,
        }),
    );

    state.ws_connections.send_to_user(
        recipient_id,
        ServerEvent::NewMessageNotification(NewMessagePayload {
            sender: UserProfile {
                id: ctx.user_id,
                fullname: ctx.fullname.clone(),
                profile_pic: ctx.profile_pic.clone(),
            },
            message: NotificationMessage {
                id: outcome.message.id,
                content: outcome.message.content.clone(),
                message_type: outcome.message.message_type,
                created_at: outcome.message.created_at,
            },
            conversation_id: outcome.conversation_id,
        }),
    );
}

async fn handle_dm_seen(state: &AppState, ctx: &ConnectionCtx, payload: DmSeenPayload) {
    if let Err(e) = state
        .messaging
        .mark_messages_as_read(ctx.user_id, payload.other_user_id)
        .await
    {
        state
            .ws_connections
            .send_to_conn(ctx.conn_id, scoped_error("dm:seen", e.to_string()));
        return;
    }

    let conversation_id = conversation_key(ctx.user_id, payload.other_user_id);
    let now = Utc::now();

    state.ws_connections.send_to_conn(
        ctx.conn_id,
        ServerEvent::DmSeenConfirmed(SeenConfirmedPayload {
            other_user_id: payload.other_user_id,
            conversation_id: conversation_id.clone(),
            timestamp: now,
        }),
    );

    state.ws_connections.send_to_room(
        &conversation_room(&conversation_id),
        Some(ctx.conn_id),
        ServerEvent::DmReadReceipt(ReadReceiptPayload {
            read_by: ctx.user_id,
            read_by_name: ctx.fullname.clone(),
            conversation_id,
            timestamp: now,
        }),
    );
}

async fn handle_dm_delete(state: &AppState, ctx: &ConnectionCtx, payload: DmDeletePayload) {
    let message = match state
        .messaging
        .delete_message(ctx.user_id, payload.message_id)
        .await
    {
        Ok(message) => message,
        Err(e) => {
            state
                .ws_connections
                .send_to_conn(ctx.conn_id, scoped_error("dm:delete", e.to_string()));
            return;
        }
    };

    let conversation_id = conversation_key(message.sender_id, message.recipient_id);
    let now = Utc::now();

    state.ws_connections.send_to_conn(
        ctx.conn_id,
        ServerEvent::DmDeleted(DmDeletedPayload {
            message_id: message.id,
            conversation_id: conversation_id.clone(),
            timestamp: now,
        }),
    );

    state.ws_connections.send_to_room(
        &conversation_room(&conversation_id),
        Some(ctx.conn_id),
        ServerEvent::DmMessageDeleted(MessageDeletedPayload {
            message_id: message.id,
            deleted_by: ctx.user_id,
            conversation_id,
            timestamp: now,
        }),
    );
}

async fn handle_get_messages(state: &AppState, ctx: &ConnectionCtx, payload: GetMessagesPayload) {
    match state
        .messaging
        .get_conversation_messages(ctx.user_id, payload.other_user_id, payload.page, payload.limit)
        .await
    {
        Ok(messages) => {
            let has_more = messages.len() as u32 == payload.limit;
            state.ws_connections.send_to_conn(
                ctx.conn_id,
                ServerEvent::DmMessagesLoaded(MessagesLoadedPayload {
                    other_user_id: payload.other_user_id,
                    messages,
                    page: payload.page,
                    has_more,
                    timestamp: Utc::now(),
                }),
            );
        }
        Err(e) => {
            state
                .ws_connections
                .send_to_conn(ctx.conn_id, scoped_error("dm:get_messages", e.to_string()));
        }
    }
}

async fn handle_get_conversations(state: &AppState, ctx: &ConnectionCtx) {
    match state.messaging.get_user_conversations(ctx.user_id).await {
        Ok(conversations) => {
            state.ws_connections.send_to_conn(
                ctx.conn_id,
                ServerEvent::ConversationsLoaded(ConversationsLoadedPayload {
                    conversations,
                    timestamp: Utc::now(),
                }),
            );
        }
        Err(e) => {
            state
                .ws_connections
                .send_to_conn(ctx.conn_id, scoped_error("conversations:get", e.to_string()));
        }
    }
}

async fn handle_unread_count(state: &AppState, ctx: &ConnectionCtx) {
    match state.messaging.get_unread_count(ctx.user_id).await {
        Ok(count) => {
            state.ws_connections.send_to_conn(
                ctx.conn_id,
                ServerEvent::UnreadCount(UnreadCountPayload {
                    count,
                    timestamp: Utc::now(),
                }),
            );
        }
        Err(e) => {
            state
                .ws_connections
                .send_to_conn(ctx.conn_id, scoped_error("unread:get_count", e.to_string()));
        }
    }
}

async fn handle_search(state: &AppState, ctx: &ConnectionCtx, payload: SearchPayload) {
    match state
        .messaging
        .search_messages(ctx.user_id, &payload.query, payload.limit)
        .await
    {
        Ok(results) => {
            state.ws_connections.send_to_conn(
                ctx.conn_id,
                ServerEvent::SearchResults(SearchResultsPayload {
                    query: payload.query,
                    results,
                    timestamp: Utc::now(),
                }),
            );
        }
        Err(e) => {
            state
                .ws_connections
                .send_to_conn(ctx.conn_id, scoped_error("messages:search", e.to_string()));
        }
    }
}

async fn handle_join_conversation(
    state: &AppState,
    ctx: &ConnectionCtx,
    payload: JoinConversationPayload,
) {
    // Friendship is re-checked at join time, independently of send checks.
    match state.users.are_friends(ctx.user_id, payload.other_user_id).await {
        Ok(true) => {}
        Ok(false) => {
            state.ws_connections.send_to_conn(
                ctx.conn_id,
                scoped_error("join_conversation", "Can only chat with friends".to_string()),
            );
            return;
        }
        Err(e) => {
            state
                .ws_connections
                .send_to_conn(ctx.conn_id, scoped_error("join_conversation", e.to_string()));
            return;
        }
    }

    let conversation_id = conversation_key(ctx.user_id, payload.other_user_id);
    state
        .ws_connections
        .join_room(ctx.conn_id, &conversation_room(&conversation_id));

    state.ws_connections.send_to_conn(
        ctx.conn_id,
        ServerEvent::ConversationJoined(ConversationJoinedPayload { conversation_id }),
    );
}

fn handle_leave_conversation(
    state: &AppState,
    ctx: &ConnectionCtx,
    payload: LeaveConversationPayload,
) {
    state
        .ws_connections
        .leave_room(ctx.conn_id, &conversation_room(&payload.conversation_id));

    state.ws_connections.send_to_conn(
        ctx.conn_id,
        ServerEvent::ConversationLeft(ConversationJoinedPayload {
            conversation_id: payload.conversation_id,
        }),
    );
}

/// Join the room, load a page of history and mark it read in one round
/// trip, for clients opening a chat view.
async fn handle_join_and_load(state: &AppState, ctx: &ConnectionCtx, payload: GetMessagesPayload) {
    const EVENT: &str = "conversation:join_and_load";

    match state.users.are_friends(ctx.user_id, payload.other_user_id).await {
        Ok(true) => {}
        Ok(false) => {
            state.ws_connections.send_to_conn(
                ctx.conn_id,
                scoped_error(EVENT, "Can only chat with friends".to_string()),
            );
            return;
        }
        Err(e) => {
            state
                .ws_connections
                .send_to_conn(ctx.conn_id, scoped_error(EVENT, e.to_string()));
            return;
        }
    }

    let conversation_id = conversation_key(ctx.user_id, payload.other_user_id);
    state
        .ws_connections
        .join_room(ctx.conn_id, &conversation_room(&conversation_id));

    let messages = match state
        .messaging
        .get_conversation_messages(ctx.user_id, payload.other_user_id, payload.page, payload.limit)
        .await
    {
        Ok(messages) => messages,
        Err(e) => {
            state
                .ws_connections
                .send_to_conn(ctx.conn_id, scoped_error(EVENT, e.to_string()));
            return;
        }
    };

    if let Err(e) = state
        .messaging
        .mark_messages_as_read(ctx.user_id, payload.other_user_id)
        .await
    {
        state
            .ws_connections
            .send_to_conn(ctx.conn_id, scoped_error(EVENT, e.to_string()));
        return;
    }

    let now = Utc::now();
    let has_more = messages.len() as u32 == payload.limit;

    state.ws_connections.send_to_conn(
        ctx.conn_id,
        ServerEvent::ConversationJoinedAndLoaded(JoinedAndLoadedPayload {
            conversation_id: conversation_id.clone(),
            other_user_id: payload.other_user_id,
            messages,
            page: payload.page,
            has_more,
            timestamp: now,
        }),
    );

    state.ws_connections.send_to_room(
        &conversation_room(&conversation_id),
        Some(ctx.conn_id),
        ServerEvent::DmReadReceipt(ReadReceiptPayload {
            read_by: ctx.user_id,
            read_by_name: ctx.fullname.clone(),
            conversation_id,
            timestamp: now,
        }),
    );
}

fn relay_typing(state: &AppState, ctx: &ConnectionCtx, payload: TypingPayload, started: bool) {
    let notice = TypingNoticePayload {
        user_id: ctx.user_id,
        fullname: started.then(|| ctx.fullname.clone()),
        conversation_id: payload.conversation_id.clone(),
    };

    let event = if started {
        ServerEvent::UserTyping(notice)
    } else {
        ServerEvent::UserStoppedTyping(notice)
    };

    state.ws_connections.send_to_room(
        &conversation_room(&payload.conversation_id),
        Some(ctx.conn_id),
        event,
    );
}
