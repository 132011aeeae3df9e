use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, warn};

use courier_types::api::{Claims, HistoryMessage, HistoryResponse};
use courier_types::models::{DEFAULT_AVATAR_URL, ReactionGroup};

use crate::auth::AppState;
use crate::store;

pub async fn get_history(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.sub;
    let member = store::query(&state.db, move |db| db.is_member(chat_id, user_id)).await?;
    if !member {
        warn!("User {} is not a member of chat {}", user_id, chat_id);
        return Err(StatusCode::FORBIDDEN);
    }

    let (rows, reaction_rows, read_rows) = store::query(&state.db, move |db| {
        let rows = db.messages_for_chat(chat_id)?;
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let reactions = db.reactions_for_messages(&ids)?;
        let reads = db.reads_for_messages(&ids)?;
        Ok((rows, reactions, reads))
    })
    .await?;

    // Group reactions by message_id -> reaction -> user_ids
    let mut reaction_map: HashMap<i64, HashMap<String, Vec<i64>>> = HashMap::new();
    for r in reaction_rows {
        reaction_map
            .entry(r.message_id)
            .or_default()
            .entry(r.reaction)
            .or_default()
            .push(r.user_id);
    }

    let mut read_map: HashMap<i64, Vec<i64>> = HashMap::new();
    for (message_id, user_id) in read_rows {
        read_map.entry(message_id).or_default().push(user_id);
    }

    let history: Vec<HistoryMessage> = rows
        .into_iter()
        .map(|row| {
            // File messages store JSON metadata; hand it to the client as a
            // structured object, falling back to the raw text if a legacy
            // row fails to parse.
            let (kind, content) = if row.kind == "file" {
                match serde_json::from_str(&row.content) {
                    Ok(value) => ("file", value),
                    Err(e) => {
                        debug!("Unparseable file metadata on message {}: {}", row.id, e);
                        ("message", serde_json::Value::String(row.content))
                    }
                }
            } else {
                ("message", serde_json::Value::String(row.content))
            };

            let reactions = reaction_map
                .remove(&row.id)
                .map(|by_symbol| {
                    by_symbol
                        .into_iter()
                        .map(|(reaction, user_ids)| ReactionGroup {
                            reaction,
                            count: user_ids.len(),
                            user_ids,
                        })
                        .collect()
                })
                .unwrap_or_default();

            HistoryMessage {
                id: row.id,
                kind: kind.to_string(),
                content,
                sender: row.sender_name,
                avatar_url: row
                    .sender_avatar_url
                    .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string()),
                timestamp: row.created_at,
                edited_at: row.edited_at,
                reply_to: row.reply_to,
                reactions,
                read_by: read_map.remove(&row.id).unwrap_or_default(),
            }
        })
        .collect();

    debug!("Returning {} messages for chat {}", history.len(), chat_id);
    Ok(Json(HistoryResponse { history }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = claims.sub;

    let meta = store::query(&state.db, move |db| db.message_meta(message_id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    let chat_id = meta.chat_id;
    let member = store::query(&state.db, move |db| db.is_member(chat_id, user_id)).await?;
    if !member {
        return Err(StatusCode::FORBIDDEN);
    }

    let marked = store::query(&state.db, move |db| db.mark_read(message_id, user_id)).await?;

    Ok(Json(serde_json::json!({ "read": marked })))
}
