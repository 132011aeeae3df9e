use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use courier_types::api::{Claims, CreateGroupRequest, CreateGroupResponse};
use courier_types::events::{ChatNotice, ServerEvent};
use courier_types::models::ChatKind;

use crate::auth::AppState;
use crate::chats::NOTIFY_CHAT_ID;
use crate::store;

pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Resolve every named participant; the creator is always included and
    // becomes the group's admin.
    let admin_id = claims.sub;
    let participants = req.participants.clone();
    let member_ids = store::query(&state.db, move |db| {
        let mut ids = Vec::with_capacity(participants.len() + 1);
        for username in &participants {
            match db.get_user_by_username(username)? {
                Some(user) => ids.push(user.id),
                None => return Ok(None),
            }
        }
        if !ids.contains(&admin_id) {
            ids.push(admin_id);
        }
        Ok(Some(ids))
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    let name = req.name.clone();
    let chat_id = store::query(&state.db, move |db| {
        db.create_group_chat(&name, admin_id, &member_ids)
    })
    .await?;

    info!(
        "Group '{}' ({}) created by {}",
        req.name, chat_id, claims.username
    );

    state
        .registry
        .broadcast(
            NOTIFY_CHAT_ID,
            &ServerEvent::GroupCreated {
                chat: ChatNotice {
                    chat_id,
                    name: req.name,
                    kind: ChatKind::Group,
                },
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(CreateGroupResponse { chat_id })))
}
