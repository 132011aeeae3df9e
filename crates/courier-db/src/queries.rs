use anyhow::Result;
use rusqlite::Connection;

use crate::Database;
use crate::models::{ChatMemberRow, ChatRow, MessageMeta, MessageRow, ReactionRow, UserRow};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        bio: Option<&str>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, password, bio) VALUES (?1, ?2, ?3)",
                rusqlite::params![username, password_hash, bio],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", &[&username]))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &[&id]))
    }

    /// Remove an account. Messages keep their sender id + name snapshot;
    /// the user's reactions, read marks and memberships go with the account.
    pub fn delete_user(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM reactions WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM message_reads WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM participants WHERE user_id = ?1", [id])?;
            tx.execute("UPDATE chats SET user1_id = NULL WHERE user1_id = ?1", [id])?;
            tx.execute("UPDATE chats SET user2_id = NULL WHERE user2_id = ?1", [id])?;
            tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(())
        })
    }

    // -- Chats --

    pub fn create_direct_chat(&self, name: &str, user1_id: i64, user2_id: i64) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chats (name, kind, user1_id, user2_id) VALUES (?1, 'one-on-one', ?2, ?3)",
                rusqlite::params![name, user1_id, user2_id],
            )?;
            let chat_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO participants (chat_id, user_id) VALUES (?1, ?2)",
                [chat_id, user1_id],
            )?;
            tx.execute(
                "INSERT INTO participants (chat_id, user_id) VALUES (?1, ?2)",
                [chat_id, user2_id],
            )?;
            tx.commit()?;
            Ok(chat_id)
        })
    }

    pub fn find_direct_chat(&self, user1_id: i64, user2_id: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id FROM chats
                 WHERE kind = 'one-on-one' AND (
                     (user1_id = ?1 AND user2_id = ?2) OR
                     (user1_id = ?2 AND user2_id = ?1)
                 )",
                [user1_id, user2_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn create_group_chat(&self, name: &str, admin_id: i64, member_ids: &[i64]) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chats (name, kind) VALUES (?1, 'group')",
                [name],
            )?;
            let chat_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO chat_groups (chat_id, admin_id) VALUES (?1, ?2)",
                [chat_id, admin_id],
            )?;
            for user_id in member_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO participants (chat_id, user_id) VALUES (?1, ?2)",
                    [chat_id, *user_id],
                )?;
            }
            tx.commit()?;
            Ok(chat_id)
        })
    }

    pub fn chat_exists(&self, chat_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT 1 FROM chats WHERE id = ?1", [chat_id], |_| Ok(()))
                .optional()?
                .is_some())
        })
    }

    pub fn get_chat(&self, chat_id: i64) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, kind, user1_id, user2_id FROM chats WHERE id = ?1",
                [chat_id],
                |row| {
                    Ok(ChatRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        kind: row.get(2)?,
                        user1_id: row.get(3)?,
                        user2_id: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Delete a chat and everything hanging off it, in one transaction:
    /// reactions and read marks of its messages, the messages, the
    /// participant rows, the group record, the chat itself.
    pub fn delete_chat(&self, chat_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM reactions WHERE message_id IN
                     (SELECT id FROM messages WHERE chat_id = ?1)",
                [chat_id],
            )?;
            tx.execute(
                "DELETE FROM message_reads WHERE message_id IN
                     (SELECT id FROM messages WHERE chat_id = ?1)",
                [chat_id],
            )?;
            tx.execute("DELETE FROM messages WHERE chat_id = ?1", [chat_id])?;
            tx.execute("DELETE FROM participants WHERE chat_id = ?1", [chat_id])?;
            tx.execute("DELETE FROM chat_groups WHERE chat_id = ?1", [chat_id])?;
            tx.execute("DELETE FROM chats WHERE id = ?1", [chat_id])?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn chats_for_user(&self, user_id: i64) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.kind, c.user1_id, c.user2_id
                 FROM chats c
                 JOIN participants p ON c.id = p.chat_id
                 WHERE p.user_id = ?1
                 ORDER BY c.id",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ChatRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        kind: row.get(2)?,
                        user1_id: row.get(3)?,
                        user2_id: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn members_of_chat(&self, chat_id: i64) -> Result<Vec<ChatMemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.chat_id, u.id, u.username, u.avatar_url
                 FROM participants p
                 JOIN users u ON p.user_id = u.id
                 WHERE p.chat_id = ?1
                 ORDER BY u.id",
            )?;

            let rows = stmt
                .query_map([chat_id], |row| {
                    Ok(ChatMemberRow {
                        chat_id: row.get(0)?,
                        user_id: row.get(1)?,
                        username: row.get(2)?,
                        avatar_url: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Membership --

    pub fn is_member(&self, chat_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM participants WHERE chat_id = ?1 AND user_id = ?2",
                    [chat_id, user_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        chat_id: i64,
        sender_id: i64,
        sender_name: &str,
        kind: &str,
        content: &str,
        reply_to: Option<i64>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (chat_id, sender_id, sender_name, kind, content, reply_to)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![chat_id, sender_id, sender_name, kind, content, reply_to],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn message_meta(&self, message_id: i64) -> Result<Option<MessageMeta>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT chat_id, sender_id, kind FROM messages WHERE id = ?1",
                [message_id],
                |row| {
                    Ok(MessageMeta {
                        chat_id: row.get(0)?,
                        sender_id: row.get(1)?,
                        kind: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn update_message_content(&self, message_id: i64, content: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET content = ?1, edited_at = datetime('now') WHERE id = ?2",
                rusqlite::params![content, message_id],
            )?;
            Ok(())
        })
    }

    pub fn delete_message(&self, message_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM reactions WHERE message_id = ?1", [message_id])?;
            tx.execute(
                "DELETE FROM message_reads WHERE message_id = ?1",
                [message_id],
            )?;
            tx.execute("DELETE FROM messages WHERE id = ?1", [message_id])?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn messages_for_chat(&self, chat_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, chat_id))
    }

    // -- Reactions --

    /// Attach a reaction. Returns false when the same (user, reaction) pair
    /// is already present; the check and the insert run under the single
    /// connection lock, and the unique index backs them up.
    pub fn add_reaction(&self, message_id: i64, user_id: i64, reaction: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let existing = conn
                .query_row(
                    "SELECT 1 FROM reactions
                     WHERE message_id = ?1 AND user_id = ?2 AND reaction = ?3",
                    rusqlite::params![message_id, user_id, reaction],
                    |_| Ok(()),
                )
                .optional()?;

            if existing.is_some() {
                return Ok(false);
            }

            conn.execute(
                "INSERT INTO reactions (message_id, user_id, reaction) VALUES (?1, ?2, ?3)",
                rusqlite::params![message_id, user_id, reaction],
            )?;
            Ok(true)
        })
    }

    /// Detach a reaction. Returns false when no such pair was present.
    pub fn remove_reaction(&self, message_id: i64, user_id: i64, reaction: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "DELETE FROM reactions
                 WHERE message_id = ?1 AND user_id = ?2 AND reaction = ?3",
                rusqlite::params![message_id, user_id, reaction],
            )?;
            Ok(affected > 0)
        })
    }

    /// Batch-fetch reactions for a set of message IDs.
    pub fn reactions_for_messages(&self, message_ids: &[i64]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, user_id, reaction FROM reactions WHERE message_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        reaction: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Read marks --

    pub fn mark_read(&self, message_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, user_id) VALUES (?1, ?2)",
                [message_id, user_id],
            )?;
            Ok(affected > 0)
        })
    }

    pub fn reads_for_messages(&self, message_ids: &[i64]) -> Result<Vec<(i64, i64)>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, user_id FROM message_reads WHERE message_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user(
    conn: &Connection,
    filter: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password, avatar_url, bio, created_at FROM users WHERE {}",
        filter
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row(params, |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                avatar_url: row.get(3)?,
                bio: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages(conn: &Connection, chat_id: i64) -> Result<Vec<MessageRow>> {
    // JOIN users to fetch the sender's current avatar in a single query;
    // the name stays the stored snapshot.
    let mut stmt = conn.prepare(
        "SELECT m.id, m.chat_id, m.sender_id, m.sender_name, m.kind, m.content,
                m.reply_to, m.created_at, m.edited_at, u.avatar_url
         FROM messages m
         LEFT JOIN users u ON m.sender_id = u.id
         WHERE m.chat_id = ?1
         ORDER BY m.created_at ASC, m.id ASC",
    )?;

    let rows = stmt
        .query_map([chat_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                chat_id: row.get(1)?,
                sender_id: row.get(2)?,
                sender_name: row.get(3)?,
                kind: row.get(4)?,
                content: row.get(5)?,
                reply_to: row.get(6)?,
                created_at: row.get(7)?,
                edited_at: row.get(8)?,
                sender_avatar_url: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
