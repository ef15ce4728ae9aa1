// tests/store_test.rs - Integration test: session store retention, export/import, persistence

use pretty_assertions::assert_eq;

use noveler::chat::context::build_context;
use noveler::chat::store::{SessionStore, SessionsSnapshot, StoreLimits};
use noveler::chat::{ChatMessage, Role};

fn limits(max_messages: usize) -> StoreLimits {
    StoreLimits {
        max_messages_per_session: max_messages,
        max_context_messages: 20,
    }
}

#[test]
fn test_retention_caps_long_conversation() {
    let mut store = SessionStore::with_limits(limits(100));
    for i in 0..150 {
        store.append_message(ChatMessage::user(format!("m{i}")));
    }
    let session = store.current();
    assert_eq!(session.messages.len(), 100);
    assert_eq!(session.messages[0].content, "m50");
    assert_eq!(session.messages[99].content, "m149");
}

#[test]
fn test_retention_never_drops_system_messages() {
    let mut store = SessionStore::with_limits(limits(10));
    store.append_message(ChatMessage::system("You write fantasy."));
    for i in 0..30 {
        store.append_message(ChatMessage::user(format!("u{i}")));
    }
    let session = store.current();
    assert_eq!(session.messages.len(), 10);
    assert_eq!(session.messages[0].role, Role::System);
    assert_eq!(session.messages[1].content, "u21");
}

#[test]
fn test_context_window_is_bounded_view() {
    let mut store = SessionStore::new();
    for i in 0..30 {
        store.append_message(ChatMessage::user(format!("m{i}")));
    }
    let session = store.current();
    let ctx = build_context(session, 20, "sys");
    assert_eq!(ctx.len(), 21);
    assert_eq!(ctx[0].role, Role::System);
    assert_eq!(ctx[1].content, "m10");
    assert_eq!(session.messages.len(), 30);
}

#[test]
fn test_delete_current_reassigns_to_most_recent() {
    let mut store = SessionStore::new();
    let a = store.create_session(Some("a")).id.clone();
    let b = store.create_session(Some("b")).id.clone();
    store.append_message_to(&a, ChatMessage::user("touch a")).unwrap();

    assert_eq!(store.current_id(), Some(b.as_str()));
    assert!(store.delete_session(&b));
    assert_eq!(store.current_id(), Some(a.as_str()));
    assert!(!store.delete_session(&b));
}

#[test]
fn test_delete_last_session_then_current_recreates() {
    let mut store = SessionStore::new();
    let id = store.current().id.clone();
    assert!(store.delete_session(&id));
    assert!(store.is_empty());
    assert_eq!(store.current_id(), None);
    let fresh = store.current().id.clone();
    assert_ne!(fresh, id);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_list_sessions_most_recent_first() {
    let mut store = SessionStore::new();
    let a = store.create_session(Some("a")).id.clone();
    let b = store.create_session(Some("b")).id.clone();
    std::thread::sleep(std::time::Duration::from_millis(2));
    store.append_message_to(&a, ChatMessage::user("newer")).unwrap();

    let order: Vec<&str> = store.list_sessions().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(order, vec![a.as_str(), b.as_str()]);
}

#[test]
fn test_export_import_all_round_trip() {
    let mut store = SessionStore::new();
    store.create_session(Some("Plot"));
    store.append_message(ChatMessage::system("rules"));
    store.append_message(ChatMessage::user("who is the villain?"));
    let mut reply = ChatMessage::assistant("The archivist.");
    reply.reasoning_content = Some("foreshadowing in ch. 2".into());
    store.append_message(reply);
    store.create_session(Some("Names"));
    store.append_message(ChatMessage::user("a name for a river"));

    let snapshot = store.export_all();
    let json = serde_json::to_string(&snapshot).unwrap();
    let parsed: SessionsSnapshot = serde_json::from_str(&json).unwrap();

    let mut restored = SessionStore::new();
    restored.import_all(parsed);
    assert_eq!(restored.export_all(), snapshot);
    assert_eq!(restored.current_id(), store.current_id());
}

#[test]
fn test_snapshot_wire_keys_are_camel_case() {
    let mut store = SessionStore::new();
    store.append_message(ChatMessage::user("hi"));
    let v = serde_json::to_value(store.export_all()).unwrap();
    assert!(v.get("currentSessionId").is_some());
    let session = &v["sessions"][0];
    assert!(session.get("createdAt").is_some());
    assert!(session.get("updatedAt").is_some());
    assert_eq!(session["messages"][0]["role"], "user");
}

#[tokio::test]
async fn test_save_and_load_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("sessions.json");

    let mut store = SessionStore::new();
    store.append_message(ChatMessage::user("persist me"));
    store.save_to(&path).await.unwrap();
    assert!(!path.with_extension("json.tmp").exists());

    let loaded = SessionStore::load_from(&path, StoreLimits::default()).unwrap();
    assert_eq!(loaded.export_all(), store.export_all());
}

#[test]
fn test_load_or_default_without_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut store =
        SessionStore::load_or_default(&dir.path().join("missing.json"), StoreLimits::default())
            .unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.current().title, "Default chat");
}

#[test]
fn test_load_rejects_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(SessionStore::load_from(&path, StoreLimits::default()).is_err());
}

#[tokio::test]
async fn test_load_trims_sessions_written_under_larger_cap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");

    let mut store = SessionStore::with_limits(limits(50));
    store.append_message(ChatMessage::system("Keep me."));
    for i in 0..30 {
        store.append_message(ChatMessage::user(format!("m{i}")));
    }
    store.save_to(&path).await.unwrap();

    let loaded = SessionStore::load_from(&path, limits(10)).unwrap();
    let session = loaded.get(loaded.current_id().unwrap()).unwrap();
    assert_eq!(session.messages.len(), 10);
    assert!(session.messages[0].is_system());
    assert_eq!(session.messages[1].content, "m21");
    assert_eq!(session.messages[9].content, "m29");
}
