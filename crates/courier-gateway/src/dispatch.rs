use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error};

use courier_db::Database;
use courier_db::models::MessageMeta;
use courier_types::events::{ClientFrame, FilePayload, MessagePayload, ServerEvent};

/// Identity and chat binding of one active session, resolved once during
/// the connection handshake and fixed for the connection's lifetime.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: i64,
    pub username: String,
    pub avatar_url: String,
    pub chat_id: i64,
}

/// Recoverable per-event failures. The session replies with an error frame
/// to the sender only and stays active; nothing is broadcast or persisted
/// beyond what the variant states. Authentication and membership failures
/// are connection-level and never reach the dispatcher; the session closes
/// those with a policy-violation code before entering its receive loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed frame, missing field, or a field that fails validation.
    #[error("{0}")]
    Validation(String),

    /// The caller is not allowed to perform this operation on this message.
    #[error("{0}")]
    Forbidden(String),

    /// The referenced message does not exist in this chat.
    #[error("{0}")]
    NotFound(String),

    /// The store rejected the write; the event was not broadcast.
    #[error("{0}")]
    Persistence(String),
}

/// Decode one inbound frame, enforce its contract, perform the persistence
/// side-effect, and produce the event to broadcast. Runs to completion
/// before the session reads the next frame, so a client's own events are
/// always applied and announced in the order it sent them.
pub async fn dispatch(
    db: &Arc<Database>,
    ctx: &SessionContext,
    raw: &str,
) -> Result<ServerEvent, DispatchError> {
    let frame: ClientFrame = serde_json::from_str(raw).map_err(|e| {
        debug!("Frame decode error from {}: {}", ctx.username, e);
        DispatchError::Validation("Invalid message format".into())
    })?;

    match frame {
        ClientFrame::Message { content, reply_to } => {
            handle_message(db, ctx, content, reply_to).await
        }
        ClientFrame::File {
            file_url,
            file_name,
            file_type,
            file_size,
            reply_to,
        } => handle_file(db, ctx, file_url, file_name, file_type, file_size, reply_to).await,
        ClientFrame::Edit {
            message_id,
            content,
        } => handle_edit(db, ctx, message_id, content).await,
        ClientFrame::Delete { message_id } => handle_delete(db, ctx, message_id).await,
        ClientFrame::ReactionAdd {
            message_id,
            reaction,
        } => handle_reaction(db, ctx, message_id, reaction, true).await,
        ClientFrame::ReactionRemove {
            message_id,
            reaction,
        } => handle_reaction(db, ctx, message_id, reaction, false).await,
    }
}

async fn handle_message(
    db: &Arc<Database>,
    ctx: &SessionContext,
    content: String,
    reply_to: Option<i64>,
) -> Result<ServerEvent, DispatchError> {
    if content.trim().is_empty() {
        return Err(DispatchError::Validation("Empty message".into()));
    }

    if let Some(target) = reply_to {
        require_message_in_chat(db, ctx, target).await?;
    }

    let chat_id = ctx.chat_id;
    let sender_id = ctx.user_id;
    let sender_name = ctx.username.clone();
    let stored = content.clone();
    let message_id = with_store(db, "Failed to save message", move |db| {
        db.insert_message(chat_id, sender_id, &sender_name, "text", &stored, reply_to)
    })
    .await?;

    debug!(
        "Message saved: chat_id={}, sender={}, id={}",
        chat_id, ctx.username, message_id
    );

    Ok(ServerEvent::Message {
        username: ctx.username.clone(),
        avatar_url: ctx.avatar_url.clone(),
        is_deleted: false,
        data: MessagePayload {
            chat_id,
            content,
            message_id,
            reply_to,
        },
        timestamp: Utc::now(),
    })
}

async fn handle_file(
    db: &Arc<Database>,
    ctx: &SessionContext,
    file_url: String,
    file_name: String,
    file_type: String,
    file_size: i64,
    reply_to: Option<i64>,
) -> Result<ServerEvent, DispatchError> {
    if file_url.is_empty() || file_name.is_empty() || file_type.is_empty() || file_size <= 0 {
        return Err(DispatchError::Validation("Missing file metadata".into()));
    }

    if let Some(target) = reply_to {
        require_message_in_chat(db, ctx, target).await?;
    }

    // The store keeps file messages as JSON-encoded metadata; the blob
    // itself lives on the external file host behind file_url.
    let metadata = serde_json::json!({
        "file_url": file_url,
        "file_name": file_name,
        "file_type": file_type,
        "file_size": file_size,
    })
    .to_string();

    let chat_id = ctx.chat_id;
    let sender_id = ctx.user_id;
    let sender_name = ctx.username.clone();
    let message_id = with_store(db, "Failed to save file message", move |db| {
        db.insert_message(chat_id, sender_id, &sender_name, "file", &metadata, reply_to)
    })
    .await?;

    debug!(
        "File message saved: chat_id={}, sender={}, id={}",
        chat_id, ctx.username, message_id
    );

    Ok(ServerEvent::File {
        username: ctx.username.clone(),
        avatar_url: ctx.avatar_url.clone(),
        is_deleted: false,
        data: FilePayload {
            chat_id,
            file_url,
            file_name,
            file_type,
            file_size,
            message_id,
            reply_to,
        },
        timestamp: Utc::now(),
    })
}

async fn handle_edit(
    db: &Arc<Database>,
    ctx: &SessionContext,
    message_id: i64,
    content: String,
) -> Result<ServerEvent, DispatchError> {
    if content.trim().is_empty() {
        return Err(DispatchError::Validation("Empty message".into()));
    }

    let meta = require_message_in_chat(db, ctx, message_id).await?;
    if meta.sender_id != ctx.user_id {
        return Err(DispatchError::Forbidden(
            "You are not the author of this message".into(),
        ));
    }
    if meta.kind == "file" {
        return Err(DispatchError::Validation(
            "File messages cannot be edited".into(),
        ));
    }

    let stored = content.clone();
    with_store(db, "Failed to edit message", move |db| {
        db.update_message_content(message_id, &stored)
    })
    .await?;

    Ok(ServerEvent::Edit {
        message_id,
        new_content: content,
        timestamp: Utc::now(),
    })
}

async fn handle_delete(
    db: &Arc<Database>,
    ctx: &SessionContext,
    message_id: i64,
) -> Result<ServerEvent, DispatchError> {
    let meta = require_message_in_chat(db, ctx, message_id).await?;
    if meta.sender_id != ctx.user_id {
        return Err(DispatchError::Forbidden(
            "You are not the author of this message".into(),
        ));
    }

    with_store(db, "Failed to delete message", move |db| {
        db.delete_message(message_id)
    })
    .await?;

    Ok(ServerEvent::Delete {
        message_id,
        timestamp: Utc::now(),
    })
}

async fn handle_reaction(
    db: &Arc<Database>,
    ctx: &SessionContext,
    message_id: i64,
    reaction: String,
    add: bool,
) -> Result<ServerEvent, DispatchError> {
    if reaction.is_empty() {
        return Err(DispatchError::Validation("Missing reaction".into()));
    }

    require_message_in_chat(db, ctx, message_id).await?;

    let user_id = ctx.user_id;
    let stored = reaction.clone();
    if add {
        let added = with_store(db, "Failed to add reaction", move |db| {
            db.add_reaction(message_id, user_id, &stored)
        })
        .await?;
        if !added {
            return Err(DispatchError::Validation(
                "You already reacted with this reaction".into(),
            ));
        }
        Ok(ServerEvent::ReactionAdd {
            message_id,
            user_id,
            reaction,
            timestamp: Utc::now(),
        })
    } else {
        let removed = with_store(db, "Failed to remove reaction", move |db| {
            db.remove_reaction(message_id, user_id, &stored)
        })
        .await?;
        if !removed {
            return Err(DispatchError::Validation(
                "You cannot remove this reaction".into(),
            ));
        }
        Ok(ServerEvent::ReactionRemove {
            message_id,
            user_id,
            reaction,
            timestamp: Utc::now(),
        })
    }
}

/// Look up a message and confirm it belongs to the session's chat. A
/// message in some other chat is reported as missing rather than leaking
/// its existence.
async fn require_message_in_chat(
    db: &Arc<Database>,
    ctx: &SessionContext,
    message_id: i64,
) -> Result<MessageMeta, DispatchError> {
    let chat_id = ctx.chat_id;
    let meta = with_store(db, "Failed to load message", move |db| {
        db.message_meta(message_id)
    })
    .await?;

    match meta {
        Some(meta) if meta.chat_id == chat_id => Ok(meta),
        _ => Err(DispatchError::NotFound("Message not found".into())),
    }
}

/// Run one store operation off the async runtime. Failures are logged with
/// their cause and surfaced to the client as the given message.
async fn with_store<T, F>(
    db: &Arc<Database>,
    failure: &str,
    op: F,
) -> Result<T, DispatchError>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
{
    let db = db.clone();
    match tokio::task::spawn_blocking(move || op(&db)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!("{}: {:#}", failure, e);
            Err(DispatchError::Persistence(failure.to_string()))
        }
        Err(e) => {
            error!("Store task join error: {}", e);
            Err(DispatchError::Persistence(failure.to_string()))
        }
    }
}
