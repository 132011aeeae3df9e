//! Store-level tests against an in-memory database: membership,
//! reaction uniqueness, cascading deletes, sender snapshots.

use courier_db::Database;

fn seed_user(db: &Database, name: &str) -> i64 {
    db.create_user(name, "argon2-hash-placeholder", None)
        .unwrap()
}

fn seed_chat(db: &Database, a: i64, b: i64) -> i64 {
    db.create_direct_chat("a & b", a, b).unwrap()
}

#[test]
fn membership_follows_participants_table() {
    let db = Database::open_in_memory().unwrap();
    let alice = seed_user(&db, "alice");
    let bob = seed_user(&db, "bob");
    let carol = seed_user(&db, "carol");
    let chat = seed_chat(&db, alice, bob);

    assert!(db.is_member(chat, alice).unwrap());
    assert!(db.is_member(chat, bob).unwrap());
    assert!(!db.is_member(chat, carol).unwrap());
}

#[test]
fn find_direct_chat_matches_either_order() {
    let db = Database::open_in_memory().unwrap();
    let alice = seed_user(&db, "alice");
    let bob = seed_user(&db, "bob");
    let chat = seed_chat(&db, alice, bob);

    assert_eq!(db.find_direct_chat(alice, bob).unwrap(), Some(chat));
    assert_eq!(db.find_direct_chat(bob, alice).unwrap(), Some(chat));
    assert_eq!(db.find_direct_chat(alice, alice).unwrap(), None);
}

#[test]
fn duplicate_reaction_is_rejected_and_removal_is_exactly_once() {
    let db = Database::open_in_memory().unwrap();
    let alice = seed_user(&db, "alice");
    let bob = seed_user(&db, "bob");
    let chat = seed_chat(&db, alice, bob);
    let msg = db
        .insert_message(chat, alice, "alice", "text", "hi", None)
        .unwrap();

    assert!(db.add_reaction(msg, bob, "👍").unwrap());
    assert!(!db.add_reaction(msg, bob, "👍").unwrap());
    // A different symbol from the same user is a separate reaction.
    assert!(db.add_reaction(msg, bob, "🎉").unwrap());

    assert!(db.remove_reaction(msg, bob, "👍").unwrap());
    assert!(!db.remove_reaction(msg, bob, "👍").unwrap());
}

#[test]
fn message_edit_sets_edited_at() {
    let db = Database::open_in_memory().unwrap();
    let alice = seed_user(&db, "alice");
    let bob = seed_user(&db, "bob");
    let chat = seed_chat(&db, alice, bob);
    let msg = db
        .insert_message(chat, alice, "alice", "text", "hi", None)
        .unwrap();

    db.update_message_content(msg, "hi there").unwrap();

    let rows = db.messages_for_chat(chat).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].content, "hi there");
    assert!(rows[0].edited_at.is_some());
}

#[test]
fn delete_message_takes_reactions_and_reads_with_it() {
    let db = Database::open_in_memory().unwrap();
    let alice = seed_user(&db, "alice");
    let bob = seed_user(&db, "bob");
    let chat = seed_chat(&db, alice, bob);
    let msg = db
        .insert_message(chat, alice, "alice", "text", "hi", None)
        .unwrap();
    db.add_reaction(msg, bob, "👍").unwrap();
    db.mark_read(msg, bob).unwrap();

    db.delete_message(msg).unwrap();

    assert!(db.message_meta(msg).unwrap().is_none());
    assert!(db.reactions_for_messages(&[msg]).unwrap().is_empty());
    assert!(db.reads_for_messages(&[msg]).unwrap().is_empty());
    assert!(db.messages_for_chat(chat).unwrap().is_empty());
}

#[test]
fn delete_chat_cascades_to_all_dependents() {
    let db = Database::open_in_memory().unwrap();
    let alice = seed_user(&db, "alice");
    let bob = seed_user(&db, "bob");
    let chat = seed_chat(&db, alice, bob);
    let msg = db
        .insert_message(chat, alice, "alice", "text", "hi", None)
        .unwrap();
    db.add_reaction(msg, bob, "👍").unwrap();
    db.mark_read(msg, alice).unwrap();

    db.delete_chat(chat).unwrap();

    assert!(!db.chat_exists(chat).unwrap());
    assert!(!db.is_member(chat, alice).unwrap());
    assert!(db.messages_for_chat(chat).unwrap().is_empty());
    assert!(db.reactions_for_messages(&[msg]).unwrap().is_empty());
}

#[test]
fn sender_snapshot_survives_account_deletion() {
    let db = Database::open_in_memory().unwrap();
    let alice = seed_user(&db, "alice");
    let bob = seed_user(&db, "bob");
    let chat = seed_chat(&db, alice, bob);
    db.insert_message(chat, alice, "alice", "text", "hi", None)
        .unwrap();

    db.delete_user(alice).unwrap();

    let rows = db.messages_for_chat(chat).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sender_name, "alice");
    assert_eq!(rows[0].sender_id, alice);
    // The avatar join comes back empty for a deleted account.
    assert!(rows[0].sender_avatar_url.is_none());
}

#[test]
fn group_chat_creation_registers_all_members_once() {
    let db = Database::open_in_memory().unwrap();
    let alice = seed_user(&db, "alice");
    let bob = seed_user(&db, "bob");
    let carol = seed_user(&db, "carol");

    // Admin listed twice on purpose: participants are deduplicated.
    let chat = db
        .create_group_chat("the crew", alice, &[alice, bob, carol, alice])
        .unwrap();

    let members = db.members_of_chat(chat).unwrap();
    assert_eq!(members.len(), 3);
    assert!(db.is_member(chat, carol).unwrap());

    let row = db.get_chat(chat).unwrap().unwrap();
    assert_eq!(row.kind, "group");
}
