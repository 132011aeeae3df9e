//! Event dispatcher tests against an in-memory store: the §4.3-style
//! contracts of each frame type, exercised exactly as the session does it.

use std::sync::Arc;

use courier_db::Database;
use courier_gateway::dispatch::{self, DispatchError, SessionContext};
use courier_types::events::ServerEvent;

struct Fixture {
    db: Arc<Database>,
    alice: i64,
    bob: i64,
    chat: i64,
}

fn fixture() -> Fixture {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let alice = db.create_user("alice", "hash", None).unwrap();
    let bob = db.create_user("bob", "hash", None).unwrap();
    let chat = db.create_direct_chat("alice & bob", alice, bob).unwrap();
    Fixture {
        db,
        alice,
        bob,
        chat,
    }
}

fn ctx(user_id: i64, username: &str, chat_id: i64) -> SessionContext {
    SessionContext {
        user_id,
        username: username.into(),
        avatar_url: "/static/avatars/default.jpg".into(),
        chat_id,
    }
}

async fn send_text(f: &Fixture, ctx: &SessionContext, content: &str) -> i64 {
    let frame = format!(r#"{{"type":"message","content":"{}"}}"#, content);
    let event = dispatch::dispatch(&f.db, ctx, &frame).await.unwrap();
    match event {
        ServerEvent::Message { data, .. } => data.message_id,
        other => panic!("expected message event, got {:?}", other),
    }
}

#[tokio::test]
async fn message_persists_then_builds_broadcast_event() {
    let f = fixture();
    let alice = ctx(f.alice, "alice", f.chat);

    let event = dispatch::dispatch(
        &f.db,
        &alice,
        r#"{"type":"message","content":"hi","reply_to":null}"#,
    )
    .await
    .unwrap();

    let ServerEvent::Message {
        username,
        is_deleted,
        data,
        ..
    } = event
    else {
        panic!("expected message event");
    };
    assert_eq!(username, "alice");
    assert!(!is_deleted);
    assert_eq!(data.chat_id, f.chat);
    assert_eq!(data.content, "hi");
    assert_eq!(data.reply_to, None);

    // Already persisted by the time the event exists.
    let rows = f.db.messages_for_chat(f.chat).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, data.message_id);
    assert_eq!(rows[0].sender_name, "alice");
}

#[tokio::test]
async fn blank_message_is_rejected_without_persisting() {
    let f = fixture();
    let alice = ctx(f.alice, "alice", f.chat);

    let err = dispatch::dispatch(&f.db, &alice, r#"{"type":"message","content":"   "}"#)
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Validation(_)));
    assert_eq!(err.to_string(), "Empty message");
    assert!(f.db.messages_for_chat(f.chat).unwrap().is_empty());
}

#[tokio::test]
async fn malformed_and_unknown_frames_are_rejected_centrally() {
    let f = fixture();
    let alice = ctx(f.alice, "alice", f.chat);

    for raw in [
        "not json at all",
        r#"{"type":"group_hug"}"#,
        r#"{"type":"edit","message_id":1}"#,
        r#"{"content":"missing type"}"#,
    ] {
        let err = dispatch::dispatch(&f.db, &alice, raw).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid message format", "frame: {}", raw);
    }
}

#[tokio::test]
async fn file_frame_persists_metadata_and_rejects_incomplete_metadata() {
    let f = fixture();
    let alice = ctx(f.alice, "alice", f.chat);

    let event = dispatch::dispatch(
        &f.db,
        &alice,
        r#"{"type":"file","file_url":"/static/uploads/x.png","file_name":"x.png","file_type":"image","file_size":2048}"#,
    )
    .await
    .unwrap();
    let ServerEvent::File { data, .. } = event else {
        panic!("expected file event");
    };
    assert_eq!(data.file_name, "x.png");

    let rows = f.db.messages_for_chat(f.chat).unwrap();
    assert_eq!(rows[0].kind, "file");
    let stored: serde_json::Value = serde_json::from_str(&rows[0].content).unwrap();
    assert_eq!(stored["file_url"], "/static/uploads/x.png");
    assert_eq!(stored["file_size"], 2048);

    let err = dispatch::dispatch(
        &f.db,
        &alice,
        r#"{"type":"file","file_url":"","file_name":"x","file_type":"image","file_size":1}"#,
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "Missing file metadata");
}

#[tokio::test]
async fn edit_by_non_sender_is_forbidden_and_leaves_content_unchanged() {
    let f = fixture();
    let alice = ctx(f.alice, "alice", f.chat);
    let bob = ctx(f.bob, "bob", f.chat);
    let msg = send_text(&f, &alice, "original").await;

    let frame = format!(
        r#"{{"type":"edit","message_id":{},"content":"hijacked"}}"#,
        msg
    );
    let err = dispatch::dispatch(&f.db, &bob, &frame).await.unwrap_err();

    assert!(matches!(err, DispatchError::Forbidden(_)));
    assert_eq!(err.to_string(), "You are not the author of this message");

    let rows = f.db.messages_for_chat(f.chat).unwrap();
    assert_eq!(rows[0].content, "original");
    assert!(rows[0].edited_at.is_none());
}

#[tokio::test]
async fn edit_by_sender_updates_content_and_broadcasts_new_content() {
    let f = fixture();
    let alice = ctx(f.alice, "alice", f.chat);
    let msg = send_text(&f, &alice, "typo").await;

    let frame = format!(
        r#"{{"type":"edit","message_id":{},"content":"fixed"}}"#,
        msg
    );
    let event = dispatch::dispatch(&f.db, &alice, &frame).await.unwrap();

    let ServerEvent::Edit {
        message_id,
        new_content,
        ..
    } = event
    else {
        panic!("expected edit event");
    };
    assert_eq!(message_id, msg);
    assert_eq!(new_content, "fixed");
    assert_eq!(f.db.messages_for_chat(f.chat).unwrap()[0].content, "fixed");
}

#[tokio::test]
async fn file_messages_cannot_be_edited() {
    let f = fixture();
    let alice = ctx(f.alice, "alice", f.chat);

    let event = dispatch::dispatch(
        &f.db,
        &alice,
        r#"{"type":"file","file_url":"/u/a.ogg","file_name":"a.ogg","file_type":"voice","file_size":9000}"#,
    )
    .await
    .unwrap();
    let ServerEvent::File { data, .. } = event else {
        panic!("expected file event");
    };

    let frame = format!(
        r#"{{"type":"edit","message_id":{},"content":"new"}}"#,
        data.message_id
    );
    let err = dispatch::dispatch(&f.db, &alice, &frame).await.unwrap_err();
    assert_eq!(err.to_string(), "File messages cannot be edited");
}

#[tokio::test]
async fn delete_by_sender_removes_the_row() {
    let f = fixture();
    let alice = ctx(f.alice, "alice", f.chat);
    let msg = send_text(&f, &alice, "goodbye").await;

    let frame = format!(r#"{{"type":"delete","message_id":{}}}"#, msg);
    let event = dispatch::dispatch(&f.db, &alice, &frame).await.unwrap();

    assert!(matches!(event, ServerEvent::Delete { message_id, .. } if message_id == msg));
    assert!(f.db.messages_for_chat(f.chat).unwrap().is_empty());
    assert!(f.db.message_meta(msg).unwrap().is_none());
}

#[tokio::test]
async fn delete_by_non_sender_is_forbidden() {
    let f = fixture();
    let alice = ctx(f.alice, "alice", f.chat);
    let bob = ctx(f.bob, "bob", f.chat);
    let msg = send_text(&f, &alice, "keep me").await;

    let frame = format!(r#"{{"type":"delete","message_id":{}}}"#, msg);
    let err = dispatch::dispatch(&f.db, &bob, &frame).await.unwrap_err();

    assert!(matches!(err, DispatchError::Forbidden(_)));
    assert_eq!(f.db.messages_for_chat(f.chat).unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_reaction_succeeds_once_then_rejects() {
    let f = fixture();
    let alice = ctx(f.alice, "alice", f.chat);
    let bob = ctx(f.bob, "bob", f.chat);
    let msg = send_text(&f, &alice, "react to me").await;

    let add = format!(
        r#"{{"type":"reaction_add","message_id":{},"reaction":"👍"}}"#,
        msg
    );
    let event = dispatch::dispatch(&f.db, &bob, &add).await.unwrap();
    assert!(matches!(
        event,
        ServerEvent::ReactionAdd { user_id, .. } if user_id == f.bob
    ));

    let err = dispatch::dispatch(&f.db, &bob, &add).await.unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));
    assert_eq!(err.to_string(), "You already reacted with this reaction");

    // Removal works exactly once afterward.
    let remove = format!(
        r#"{{"type":"reaction_remove","message_id":{},"reaction":"👍"}}"#,
        msg
    );
    let event = dispatch::dispatch(&f.db, &bob, &remove).await.unwrap();
    assert!(matches!(event, ServerEvent::ReactionRemove { .. }));

    let err = dispatch::dispatch(&f.db, &bob, &remove).await.unwrap_err();
    assert_eq!(err.to_string(), "You cannot remove this reaction");
}

#[tokio::test]
async fn operations_on_messages_of_other_chats_report_not_found() {
    let f = fixture();
    let carol = f.db.create_user("carol", "hash", None).unwrap();
    let other_chat = f.db.create_direct_chat("bob & carol", f.bob, carol).unwrap();
    let foreign = f
        .db
        .insert_message(other_chat, f.bob, "bob", "text", "elsewhere", None)
        .unwrap();

    let alice = ctx(f.alice, "alice", f.chat);
    for frame in [
        format!(r#"{{"type":"edit","message_id":{},"content":"x"}}"#, foreign),
        format!(r#"{{"type":"delete","message_id":{}}}"#, foreign),
        format!(
            r#"{{"type":"reaction_add","message_id":{},"reaction":"👍"}}"#,
            foreign
        ),
    ] {
        let err = dispatch::dispatch(&f.db, &alice, &frame).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(_)), "frame: {}", frame);
        assert_eq!(err.to_string(), "Message not found");
    }

    // The foreign message is untouched.
    assert_eq!(
        f.db.messages_for_chat(other_chat).unwrap()[0].content,
        "elsewhere"
    );
}

#[tokio::test]
async fn reply_to_must_reference_a_message_in_the_same_chat() {
    let f = fixture();
    let alice = ctx(f.alice, "alice", f.chat);

    let err = dispatch::dispatch(
        &f.db,
        &alice,
        r#"{"type":"message","content":"hi","reply_to":4242}"#,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound(_)));

    let msg = send_text(&f, &alice, "root").await;
    let frame = format!(
        r#"{{"type":"message","content":"reply","reply_to":{}}}"#,
        msg
    );
    let event = dispatch::dispatch(&f.db, &alice, &frame).await.unwrap();
    let ServerEvent::Message { data, .. } = event else {
        panic!("expected message event");
    };
    assert_eq!(data.reply_to, Some(msg));
}
