/// Database row types — these map directly to SQLite rows.
/// Distinct from courier-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: String,
}

pub struct ChatRow {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub user1_id: Option<i64>,
    pub user2_id: Option<i64>,
}

pub struct MessageRow {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub kind: String,
    pub content: String,
    pub reply_to: Option<i64>,
    pub created_at: String,
    pub edited_at: Option<String>,
    /// Joined from users at query time; None when the sender is gone.
    pub sender_avatar_url: Option<String>,
}

/// The slice of a message the dispatcher needs for authorization checks.
pub struct MessageMeta {
    pub chat_id: i64,
    pub sender_id: i64,
    pub kind: String,
}

pub struct ReactionRow {
    pub message_id: i64,
    pub user_id: i64,
    pub reaction: String,
}

pub struct ChatMemberRow {
    pub chat_id: i64,
    pub user_id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
}
