use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Frames sent FROM client TO server over a chat socket.
///
/// The wire format is a flat JSON object with a `type` discriminator;
/// unknown discriminators and missing fields fail to decode and are
/// rejected centrally by the session, never per-handler.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Plain text message.
    Message {
        content: String,
        #[serde(default)]
        reply_to: Option<i64>,
    },

    /// File (or voice) message metadata. The blob itself lives on
    /// an external file host and is referenced by `file_url`.
    File {
        file_url: String,
        file_name: String,
        file_type: String,
        file_size: i64,
        #[serde(default)]
        reply_to: Option<i64>,
    },

    /// Replace the content of an own, previously sent text message.
    Edit { message_id: i64, content: String },

    /// Remove an own message entirely.
    Delete { message_id: i64 },

    /// Attach a reaction to a message.
    ReactionAdd { message_id: i64, reaction: String },

    /// Detach a previously attached reaction.
    ReactionRemove { message_id: i64, reaction: String },
}

/// Events sent FROM server TO clients, either to every connection of one
/// chat or (for the `chat_*`/`group_*` notices) to the reserved chat id 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new text message was posted.
    Message {
        username: String,
        avatar_url: String,
        is_deleted: bool,
        data: MessagePayload,
        timestamp: DateTime<Utc>,
    },

    /// A new file or voice message was posted.
    File {
        username: String,
        avatar_url: String,
        is_deleted: bool,
        data: FilePayload,
        timestamp: DateTime<Utc>,
    },

    /// A message's content was replaced by its sender.
    Edit {
        message_id: i64,
        new_content: String,
        timestamp: DateTime<Utc>,
    },

    /// A message was removed by its sender.
    Delete {
        message_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// A reaction was added to a message.
    ReactionAdd {
        message_id: i64,
        user_id: i64,
        reaction: String,
        timestamp: DateTime<Utc>,
    },

    /// A reaction was removed from a message.
    ReactionRemove {
        message_id: i64,
        user_id: i64,
        reaction: String,
        timestamp: DateTime<Utc>,
    },

    /// An operation was rejected; delivered to the offending sender only.
    Error { message: String },

    /// A one-on-one chat was created (chat id 0 only).
    ChatCreated { chat: ChatNotice },

    /// A chat was deleted along with its history (chat id 0 only).
    ChatDeleted { chat_id: i64 },

    /// A group chat was created (chat id 0 only).
    GroupCreated { chat: ChatNotice },
}

/// Payload of a broadcast text message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub chat_id: i64,
    pub content: String,
    pub message_id: i64,
    pub reply_to: Option<i64>,
}

/// Payload of a broadcast file/voice message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePayload {
    pub chat_id: i64,
    pub file_url: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub message_id: i64,
    pub reply_to: Option<i64>,
}

/// Summary attached to chat-list refresh notices on chat id 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatNotice {
    pub chat_id: i64,
    pub name: String,
    pub kind: crate::models::ChatKind,
}
