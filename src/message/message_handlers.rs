use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    message::{
        message_dto::{ConversationInfo, OnlineFriend, SendMessageRequest, SendOutcome},
        message_models::Message,
    },
    middleware::AuthUser,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
    limit: Option<u32>,
}

/// Send a message to a friend
#[utoipa::path(
    post,
    path = "/api/messages/send",
    tag = "messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = SendOutcome),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Recipient is not a friend")
    ),
    security(("bearer_auth" = []))
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    let outcome = state.messaging.send_message(user_id, payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": outcome })),
    ))
}

/// Get conversation messages with a specific user
#[utoipa::path(
    get,
    path = "/api/messages/conversation/{other_user_id}",
    tag = "messages",
    params(
        ("other_user_id" = Uuid, Path, description = "Other participant"),
        ("page" = Option<u32>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u32>, Query, description = "Messages per page (default: 50)")
    ),
    responses(
        (status = 200, description = "Messages in chronological order"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_conversation_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(other_user_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(50);

    let messages = state
        .messaging
        .get_conversation_messages(user_id, other_user_id, page, limit)
        .await?;

    // Approximate signal: a final page of exactly `limit` messages also
    // reads as "more available".
    let has_more = messages.len() as u32 == limit;

    Ok(Json(json!({
        "success": true,
        "data": {
            "messages": messages,
            "pagination": { "page": page, "limit": limit, "has_more": has_more }
        }
    })))
}

/// Get conversation info (profile, presence, unread count)
#[utoipa::path(
    get,
    path = "/api/messages/conversation/{other_user_id}/info",
    tag = "messages",
    params(("other_user_id" = Uuid, Path, description = "Other participant")),
    responses(
        (status = 200, description = "Conversation info", body = ConversationInfo),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_conversation_info(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(other_user_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let stats = state
        .messaging
        .get_conversation_stats(user_id, other_user_id)
        .await?;

    let is_online = state.presence.is_online(other_user_id).await;
    let last_seen_ms = state.presence.last_seen(other_user_id).await;

    let info = ConversationInfo {
        conversation_id: stats.conversation_id,
        other_user: stats.other_user,
        is_online,
        last_seen_ms,
        are_friends: stats.are_friends,
        unread_count: stats.unread_count,
        last_activity: stats.last_activity,
    };

    Ok(Json(json!({ "success": true, "data": info })))
}

/// Hide a conversation for the current user
#[utoipa::path(
    put,
    path = "/api/messages/conversation/{other_user_id}/clear",
    tag = "messages",
    params(("other_user_id" = Uuid, Path, description = "Other participant")),
    responses((status = 200, description = "Conversation cleared")),
    security(("bearer_auth" = []))
)]
pub async fn clear_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(other_user_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state
        .messaging
        .clear_conversation(user_id, other_user_id)
        .await?;

    Ok(Json(json!({ "success": true, "message": "Conversation cleared" })))
}

/// Mark all messages from a user as read
#[utoipa::path(
    put,
    path = "/api/messages/read/{other_user_id}",
    tag = "messages",
    params(("other_user_id" = Uuid, Path, description = "Sender whose messages are read")),
    responses((status = 200, description = "Messages marked as read")),
    security(("bearer_auth" = []))
)]
pub async fn mark_messages_as_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(other_user_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state
        .messaging
        .mark_messages_as_read(user_id, other_user_id)
        .await?;

    Ok(Json(json!({ "success": true, "message": "Messages marked as read" })))
}

/// Get all conversations for the authenticated user
#[utoipa::path(
    get,
    path = "/api/messages/conversations",
    tag = "messages",
    responses((status = 200, description = "Conversation summaries, newest activity first")),
    security(("bearer_auth" = []))
)]
pub async fn get_user_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse> {
    let conversations = state.messaging.get_user_conversations(user_id).await?;

    Ok(Json(json!({ "success": true, "data": conversations })))
}

/// Delete a message (soft delete, sender only)
#[utoipa::path(
    delete,
    path = "/api/messages/{message_id}",
    tag = "messages",
    params(("message_id" = Uuid, Path, description = "Message to delete")),
    responses(
        (status = 200, description = "Message deleted", body = Message),
        (status = 404, description = "Message not found or not owned by caller")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let message = state.messaging.delete_message(user_id, message_id).await?;

    Ok(Json(json!({ "success": true, "data": message })))
}

/// Get count of unread messages addressed to the current user
#[utoipa::path(
    get,
    path = "/api/messages/unread/count",
    tag = "messages",
    responses((status = 200, description = "Unread count")),
    security(("bearer_auth" = []))
)]
pub async fn get_unread_count(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse> {
    let count = state.messaging.get_unread_count(user_id).await?;

    Ok(Json(json!({ "success": true, "data": { "unread_count": count } })))
}

/// Search the current user's messages
#[utoipa::path(
    get,
    path = "/api/messages/search",
    tag = "messages",
    params(
        ("q" = String, Query, description = "Substring to search for"),
        ("limit" = Option<u32>, Query, description = "Maximum results (default: 20)")
    ),
    responses((status = 200, description = "Matching messages, newest first")),
    security(("bearer_auth" = []))
)]
pub async fn search_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse> {
    let q = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or(AppError::Validation("Search query is required".to_string()))?;

    let results = state
        .messaging
        .search_messages(user_id, q, query.limit.unwrap_or(20))
        .await?;

    let count = results.len();

    Ok(Json(json!({
        "success": true,
        "data": { "query": q, "results": results, "count": count }
    })))
}

/// List the current user's friends that are online right now
#[utoipa::path(
    get,
    path = "/api/messages/friends/online",
    tag = "messages",
    responses((status = 200, description = "Online friends")),
    security(("bearer_auth" = []))
)]
pub async fn get_online_friends(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse> {
    let friends = state.users.friend_profiles(user_id).await?;
    let online = state.presence.online_users().await;

    // A friend with no presence entry is simply offline, never an error.
    let online_friends: Vec<OnlineFriend> = friends
        .into_iter()
        .filter(|friend| online.contains_key(&friend.id))
        .map(|friend| OnlineFriend {
            id: friend.id,
            fullname: friend.fullname,
            profile_pic: friend.profile_pic,
            is_online: true,
        })
        .collect();

    Ok(Json(json!({ "success": true, "data": online_friends })))
}
