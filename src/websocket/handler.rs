use std::ops::ControlFlow;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::Utc;
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware::AuthUser,
    state::AppState,
    websocket::{
        events::{conversation_room, dispatch_client_event, ConnectionCtx},
        types::{FriendPresencePayload, ServerEvent},
    },
};

/// Real-time gateway endpoint. Authentication happens in the shared JWT
/// middleware before the upgrade, so an unauthenticated request never
/// reaches the event loop.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Response> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::Unauthorized("User not found".to_string()))?;

    let ctx = ConnectionCtx {
        user_id,
        conn_id: Uuid::new_v4(),
        fullname: user.fullname,
        profile_pic: user.profile_pic,
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, ctx, state)))
}

async fn handle_socket(socket: WebSocket, ctx: ConnectionCtx, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    state.ws_connections.register(ctx.user_id, ctx.conn_id, tx);
    state.presence.set_online(ctx.user_id, ctx.conn_id).await;

    // Pre-join the rooms of conversations the user has cached, so receipts
    // and deliveries arrive before the client explicitly joins.
    for conversation_id in state.messaging.cached_conversation_ids(ctx.user_id).await {
        state
            .ws_connections
            .join_room(ctx.conn_id, &conversation_room(&conversation_id));
    }

    let friend_ids = match state.users.friend_ids(ctx.user_id).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!("failed to load friends for {}: {:?}", ctx.user_id, e);
            Vec::new()
        }
    };

    announce_online(&state, &ctx, &friend_ids);

    tracing::info!("user {} connected ({})", ctx.user_id, ctx.conn_id);

    // Outbound: channel -> socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!("failed to serialize {}: {}", event.name(), e),
            }
        }
    });

    // Inbound: socket -> dispatcher, one event at a time per connection.
    let recv_state = state.clone();
    let recv_ctx = ctx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let ControlFlow::Break(()) =
                        dispatch_client_event(&recv_state, &recv_ctx, &text).await
                    {
                        break;
                    }
                }
                Message::Close(_) => break,
                // Binary frames carry nothing on this protocol.
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let remaining = close_connection(&state, &ctx, &friend_ids).await;

    tracing::info!(
        "user {} disconnected ({}), {} connection(s) left",
        ctx.user_id,
        ctx.conn_id,
        remaining
    );
}

/// Tells each friend's live connections the user came online.
pub fn announce_online(state: &AppState, ctx: &ConnectionCtx, friend_ids: &[Uuid]) {
    for friend_id in friend_ids {
        state.ws_connections.send_to_user(
            *friend_id,
            ServerEvent::FriendOnline(FriendPresencePayload {
                user_id: ctx.user_id,
                fullname: ctx.fullname.clone(),
                profile_pic: Some(ctx.profile_pic.clone()),
                timestamp: Utc::now(),
            }),
        );
    }
}

/// Unregisters the connection. Presence and the offline broadcast wait for
/// the user's last connection; closing one of several tabs is not "going
/// offline". Returns how many connections the user still holds.
pub async fn close_connection(
    state: &AppState,
    ctx: &ConnectionCtx,
    friend_ids: &[Uuid],
) -> usize {
    let remaining = state.ws_connections.unregister(ctx.conn_id);

    if remaining == 0 {
        state.presence.set_offline(ctx.user_id).await;

        for friend_id in friend_ids {
            state.ws_connections.send_to_user(
                *friend_id,
                ServerEvent::FriendOffline(FriendPresencePayload {
                    user_id: ctx.user_id,
                    fullname: ctx.fullname.clone(),
                    profile_pic: None,
                    timestamp: Utc::now(),
                }),
            );
        }
    }

    remaining
}
