use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            avatar_url  TEXT,
            bio         TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS chats (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            kind        TEXT NOT NULL DEFAULT 'one-on-one',
            user1_id    INTEGER REFERENCES users(id),
            user2_id    INTEGER REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- admin_id carries no foreign key: like message senders, a group
        -- outlives its admin's account.
        CREATE TABLE IF NOT EXISTS chat_groups (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id     INTEGER NOT NULL REFERENCES chats(id),
            admin_id    INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS participants (
            chat_id     INTEGER NOT NULL REFERENCES chats(id),
            user_id     INTEGER NOT NULL REFERENCES users(id),
            PRIMARY KEY (chat_id, user_id)
        );

        -- sender_id carries no foreign key: messages keep the sender's id
        -- and name snapshot even after the account is deleted.
        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id     INTEGER NOT NULL REFERENCES chats(id),
            sender_id   INTEGER NOT NULL,
            sender_name TEXT NOT NULL,
            kind        TEXT NOT NULL DEFAULT 'text',
            content     TEXT NOT NULL,
            reply_to    INTEGER REFERENCES messages(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            edited_at   TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, created_at);

        CREATE TABLE IF NOT EXISTS reactions (
            message_id  INTEGER NOT NULL REFERENCES messages(id),
            user_id     INTEGER NOT NULL REFERENCES users(id),
            reaction    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(message_id, user_id, reaction)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        CREATE TABLE IF NOT EXISTS message_reads (
            message_id  INTEGER NOT NULL REFERENCES messages(id),
            user_id     INTEGER NOT NULL REFERENCES users(id),
            PRIMARY KEY (message_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
