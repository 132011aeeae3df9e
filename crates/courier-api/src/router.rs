use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::Deserialize;

use courier_gateway::session;

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{chats, groups, messages};

/// Assemble the full application router: public auth routes, protected
/// REST routes, and the WebSocket endpoint. Cross-cutting layers (CORS,
/// tracing) are the binary's concern.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/chats/create", post(chats::create_chat))
        .route("/chats/list", get(chats::list_chats))
        .route("/chats/{chat_id}", delete(chats::delete_chat))
        .route("/groups/create", post(groups::create_group))
        .route("/messages/history/{chat_id}", get(messages::get_history))
        .route("/messages/{message_id}/read", post(messages::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/ws/chat/{chat_id}", get(ws_upgrade))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: String,
}

/// Upgrade to a chat socket. Credential and membership checks happen
/// inside the session so failures can be reported as structured error
/// frames before the policy-violation close.
async fn ws_upgrade(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        session::handle_socket(
            socket,
            state.registry.clone(),
            state.db.clone(),
            state.jwt_secret.clone(),
            chat_id,
            query.token,
        )
    })
}
