use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use courier_types::api::{ChatSummary, Claims, CreateChatRequest, CreateChatResponse};
use courier_types::events::{ChatNotice, ServerEvent};
use courier_types::models::{ChatKind, ChatMember, DEFAULT_AVATAR_URL};

use crate::auth::AppState;
use crate::store;

/// Chat id 0 is the account-wide notification channel: every REST-side
/// chat mutation announces itself there so clients refresh their lists.
pub(crate) const NOTIFY_CHAT_ID: i64 = 0;

pub async fn create_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.username == claims.username {
        return Err(StatusCode::BAD_REQUEST);
    }

    let peer_name = req.username.clone();
    let peer = store::query(&state.db, move |db| db.get_user_by_username(&peer_name))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    // Check if chat already exists
    let (user1, user2) = (claims.sub, peer.id);
    let existing = store::query(&state.db, move |db| db.find_direct_chat(user1, user2)).await?;
    if existing.is_some() {
        return Err(StatusCode::CONFLICT);
    }

    let chat_name = format!("{} & {}", claims.username, peer.username);
    let name = chat_name.clone();
    let chat_id = store::query(&state.db, move |db| {
        db.create_direct_chat(&name, user1, user2)
    })
    .await?;

    info!(
        "Chat {} created between {} and {}",
        chat_id, claims.username, peer.username
    );

    state
        .registry
        .broadcast(
            NOTIFY_CHAT_ID,
            &ServerEvent::ChatCreated {
                chat: ChatNotice {
                    chat_id,
                    name: chat_name,
                    kind: ChatKind::OneOnOne,
                },
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(CreateChatResponse { chat_id })))
}

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.sub;
    let summaries = store::query(&state.db, move |db| {
        let chats = db.chats_for_user(user_id)?;
        let mut summaries = Vec::with_capacity(chats.len());
        for chat in chats {
            let members = db
                .members_of_chat(chat.id)?
                .into_iter()
                .map(|m| ChatMember {
                    user_id: m.user_id,
                    username: m.username,
                    avatar_url: m
                        .avatar_url
                        .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string()),
                })
                .collect();
            summaries.push(ChatSummary {
                chat_id: chat.id,
                name: chat.name,
                kind: ChatKind::from_str(&chat.kind).unwrap_or(ChatKind::OneOnOne),
                members,
            });
        }
        Ok(summaries)
    })
    .await?;

    Ok(Json(summaries))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.sub;
    let (exists, member) = store::query(&state.db, move |db| {
        let exists = db.chat_exists(chat_id)?;
        let member = exists && db.is_member(chat_id, user_id)?;
        Ok((exists, member))
    })
    .await?;
    if !exists {
        return Err(StatusCode::NOT_FOUND);
    }
    if !member {
        return Err(StatusCode::FORBIDDEN);
    }

    store::query(&state.db, move |db| db.delete_chat(chat_id)).await?;

    info!("Chat {} deleted by {}", chat_id, claims.username);

    state
        .registry
        .broadcast(NOTIFY_CHAT_ID, &ServerEvent::ChatDeleted { chat_id })
        .await;

    Ok(Json(serde_json::json!({ "chat_id": chat_id })))
}
