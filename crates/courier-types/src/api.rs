use serde::{Deserialize, Serialize};

use crate::models::{ChatKind, ChatMember, ReactionGroup};

// -- JWT Claims --

/// JWT claims shared across courier-api (REST middleware) and
/// courier-gateway (WebSocket authentication). Canonical definition lives
/// here in courier-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub token: String,
}

// -- Chats --

/// Create a one-on-one chat with another user, named by username.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChatRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct CreateChatResponse {
    pub chat_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ChatSummary {
    pub chat_id: i64,
    pub name: String,
    pub kind: ChatKind,
    pub members: Vec<ChatMember>,
}

// -- Groups --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: String,
    pub participants: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateGroupResponse {
    pub chat_id: i64,
}

// -- Messages --

/// One entry of `GET /messages/history/{chat_id}`.
///
/// `content` is the plain text for text messages and the decoded file
/// metadata object for file/voice messages; `kind` distinguishes the two
/// the same way the live `message`/`file` events do.
#[derive(Debug, Serialize)]
pub struct HistoryMessage {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: serde_json::Value,
    pub sender: String,
    pub avatar_url: String,
    pub timestamp: String,
    pub edited_at: Option<String>,
    pub reply_to: Option<i64>,
    pub reactions: Vec<ReactionGroup>,
    pub read_by: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryMessage>,
}
