use serde::{Deserialize, Serialize};

/// Chat flavor: a fixed pair of users, or a named group with an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatKind {
    #[serde(rename = "one-on-one")]
    OneOnOne,
    #[serde(rename = "group")]
    Group,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatKind::OneOnOne => "one-on-one",
            ChatKind::Group => "group",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "one-on-one" => Some(ChatKind::OneOnOne),
            "group" => Some(ChatKind::Group),
            _ => None,
        }
    }
}

/// A chat participant as shown in chat lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMember {
    pub user_id: i64,
    pub username: String,
    pub avatar_url: String,
}

/// Reactions on one message grouped by symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub reaction: String,
    pub count: usize,
    pub user_ids: Vec<i64>,
}

/// Fallback avatar for users who never uploaded one.
pub const DEFAULT_AVATAR_URL: &str = "/static/avatars/default.jpg";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_kind_round_trips_through_str() {
        assert_eq!(ChatKind::from_str("one-on-one"), Some(ChatKind::OneOnOne));
        assert_eq!(ChatKind::from_str("group"), Some(ChatKind::Group));
        assert_eq!(ChatKind::from_str("broadcast"), None);
        assert_eq!(ChatKind::OneOnOne.as_str(), "one-on-one");
    }
}
