use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    message::{
        message_dto::{
            ConversationInfo, ConversationSummary, LastMessage, OnlineFriend, SendMessageRequest,
            SendOutcome,
        },
        message_handlers,
        message_models::{Message, MessageResponse, MessageType},
    },
    middleware::auth_middleware,
    state::AppState,
    user::UserProfile,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::message::message_handlers::send_message,
        crate::message::message_handlers::get_conversation_messages,
        crate::message::message_handlers::get_conversation_info,
        crate::message::message_handlers::clear_conversation,
        crate::message::message_handlers::mark_messages_as_read,
        crate::message::message_handlers::get_user_conversations,
        crate::message::message_handlers::delete_message,
        crate::message::message_handlers::get_unread_count,
        crate::message::message_handlers::search_messages,
        crate::message::message_handlers::get_online_friends,
    ),
    components(
        schemas(
            SendMessageRequest,
            SendOutcome,
            Message,
            MessageResponse,
            MessageType,
            ConversationSummary,
            LastMessage,
            ConversationInfo,
            OnlineFriend,
            UserProfile,
        )
    ),
    tags(
        (name = "messages", description = "Direct messaging and presence endpoints")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            "http://localhost:5173".parse().unwrap(),
            "http://127.0.0.1:5173".parse().unwrap(),
            "http://localhost:3000".parse().unwrap(),
        ]))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let message_routes = Router::new()
        .route("/send", post(message_handlers::send_message))
        .route("/conversations", get(message_handlers::get_user_conversations))
        .route(
            "/conversation/:other_user_id",
            get(message_handlers::get_conversation_messages),
        )
        .route(
            "/conversation/:other_user_id/info",
            get(message_handlers::get_conversation_info),
        )
        .route(
            "/conversation/:other_user_id/clear",
            put(message_handlers::clear_conversation),
        )
        .route("/read/:other_user_id", put(message_handlers::mark_messages_as_read))
        .route("/unread/count", get(message_handlers::get_unread_count))
        .route("/search", get(message_handlers::search_messages))
        .route("/friends/online", get(message_handlers::get_online_friends))
        .route("/:message_id", delete(message_handlers::delete_message))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // WebSocket route (token accepted via query parameter)
    let ws_routes = Router::new()
        .route("/ws", get(crate::websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .nest("/messages", message_routes)
        .merge(ws_routes);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
