use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, info, warn};

use courier_db::Database;
use courier_types::api::Claims;
use courier_types::events::ServerEvent;
use courier_types::models::DEFAULT_AVATAR_URL;

use crate::dispatch::{self, SessionContext};
use crate::registry::Registry;

/// Close code sent when authentication or chat membership fails.
const POLICY_VIOLATION: u16 = 1008;

/// Resolve a bearer credential to the identity it was minted for.
pub fn resolve_token(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// Drive one WebSocket connection through its whole lifecycle: credential
/// resolution, membership authorization (skipped for the reserved chat id
/// 0), registration, the sequential receive loop, and unregistration.
pub async fn handle_socket(
    socket: WebSocket,
    registry: Registry,
    db: Arc<Database>,
    jwt_secret: String,
    chat_id: i64,
    token: String,
) {
    // Authenticating
    let Some(claims) = resolve_token(&token, &jwt_secret) else {
        reject(socket, "Invalid token").await;
        return;
    };
    let user_id = claims.sub;
    let username = claims.username;

    // The token may outlive the account it was minted for.
    let user = {
        let db = db.clone();
        match tokio::task::spawn_blocking(move || db.get_user_by_id(user_id)).await {
            Ok(Ok(user)) => user,
            Ok(Err(e)) => {
                warn!("User lookup failed for {}: {:#}", user_id, e);
                return;
            }
            Err(e) => {
                warn!("User lookup task join error: {}", e);
                return;
            }
        }
    };
    let Some(user) = user else {
        reject(socket, "Account does not exist").await;
        return;
    };

    // Authorizing: chat id 0 is the account-wide notification channel and
    // needs no membership proof.
    if chat_id != 0 {
        let check = {
            let db = db.clone();
            tokio::task::spawn_blocking(move || {
                let exists = db.chat_exists(chat_id)?;
                let member = exists && db.is_member(chat_id, user_id)?;
                anyhow::Ok((exists, member))
            })
            .await
        };
        match check {
            Ok(Ok((true, true))) => {
                debug!("User {} verified as participant in chat {}", user_id, chat_id);
            }
            Ok(Ok((false, _))) => {
                warn!("Chat {} does not exist", chat_id);
                reject(socket, "Chat does not exist").await;
                return;
            }
            Ok(Ok((true, false))) => {
                warn!(
                    "User {} not found in participants for chat {}",
                    user_id, chat_id
                );
                reject(socket, "You are not a member of this chat").await;
                return;
            }
            Ok(Err(e)) => {
                warn!("Membership lookup failed for chat {}: {:#}", chat_id, e);
                return;
            }
            Err(e) => {
                warn!("Membership lookup task join error: {}", e);
                return;
            }
        }
    }

    let ctx = SessionContext {
        user_id,
        username: username.clone(),
        avatar_url: user
            .avatar_url
            .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string()),
        chat_id,
    };

    // Active
    let (conn_id, reply_tx, mut outbound_rx) = registry.register(chat_id).await;
    info!("{} ({}) connected to chat {}", username, user_id, chat_id);

    let (mut sender, mut receiver) = socket.split();

    // Forward registry traffic to the peer. Everything this connection ever
    // receives funnels through one channel, so broadcast order is preserved
    // per chat.
    let send_chat_id = chat_id;
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(e) = sender.send(Message::Text(text.into())).await {
                warn!("Error broadcasting to chat {}: {}", send_chat_id, e);
                break;
            }
        }
    });

    // One frame at a time: each event fully persists and broadcasts before
    // the next frame is read, so a single client's events keep their order.
    loop {
        tokio::select! {
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        debug!(
                            "Received message in chat {} from {}: {}",
                            chat_id, username, text
                        );
                        match dispatch::dispatch(&db, &ctx, &text).await {
                            Ok(event) => registry.broadcast(chat_id, &event).await,
                            Err(err) => {
                                debug!(
                                    "Rejected frame from {} in chat {}: {}",
                                    username, chat_id, err
                                );
                                let reply = ServerEvent::Error {
                                    message: err.to_string(),
                                };
                                let text = serde_json::to_string(&reply).unwrap();
                                if reply_tx.send(text).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary are not protocol frames
                    Some(Err(e)) => {
                        warn!(
                            "Socket error for {} in chat {}: {}",
                            username, chat_id, e
                        );
                        break;
                    }
                }
            }
            _ = &mut send_task => break,
        }
    }

    // Closed: unregister before the task exits so no broadcast issued
    // after this point can target the dead connection.
    registry.unregister(chat_id, conn_id).await;
    send_task.abort();
    info!("{} ({}) disconnected from chat {}", username, user_id, chat_id);
}

/// Send a structured error and close with a policy-violation code. Used
/// for the fatal pre-registration failures; per-event errors go through
/// the session's reply channel instead and leave the connection open.
async fn reject(mut socket: WebSocket, message: &str) {
    let error = ServerEvent::Error {
        message: message.into(),
    };
    let text = serde_json::to_string(&error).unwrap();
    let _ = socket.send(Message::Text(text.into())).await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: POLICY_VIOLATION,
            reason: "policy violation".into(),
        })))
        .await;
}
