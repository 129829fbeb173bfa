//! Contract tests run against both persistence backends, plus a few
//! backend-specific checks (ownership for sqlite, crash artifacts for the
//! file store).

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

use driftline::errors::AppError;
use driftline::models::ChatMessage;
use driftline::store::{ChatStore, FileChatStore, SqliteChatStore};

async fn file_store() -> (TempDir, FileChatStore) {
    let dir = TempDir::new().unwrap();
    let store = FileChatStore::new(dir.path()).await.unwrap();
    (dir, store)
}

async fn memory_store() -> SqliteChatStore {
    SqliteChatStore::connect("sqlite::memory:").await.unwrap()
}

fn msg(id: &str, role: &str, text: &str) -> ChatMessage {
    serde_json::from_value(json!({
        "id": id,
        "role": role,
        "parts": [{ "type": "text", "text": text }],
        "createdAt": Utc::now().to_rfc3339(),
    }))
    .unwrap()
}

fn tool_msg(id: &str) -> ChatMessage {
    serde_json::from_value(json!({
        "id": id,
        "role": "assistant",
        "parts": [
            {
                "type": "tool-webSearch",
                "toolCallId": "call_42",
                "state": "output-available",
                "input": { "query": "weather in lisbon" },
                "output": { "results": [{ "title": "forecast", "url": "https://example.com" }] }
            },
            { "type": "text", "text": "It will rain." }
        ],
        "createdAt": Utc::now().to_rfc3339(),
    }))
    .unwrap()
}

// ── Shared contract checks ───────────────────────────────────────────────────

async fn check_round_trip(store: &dyn ChatStore) {
    let id = store.create(None).await.unwrap();
    let messages = vec![msg("m1", "user", "hello"), tool_msg("m2")];

    store.save(&id, &messages, None).await.unwrap();
    let loaded = store.load(&id, None).await.unwrap();
    assert_eq!(loaded, messages);
}

async fn check_save_is_idempotent(store: &dyn ChatStore) {
    let id = store.create(None).await.unwrap();
    let messages = vec![msg("m1", "user", "hello"), msg("m2", "assistant", "hi")];

    store.save(&id, &messages, None).await.unwrap();
    store.save(&id, &messages, None).await.unwrap();

    assert_eq!(store.load(&id, None).await.unwrap(), messages);
    let listing = store.list(None).await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].message_count, 2);
}

async fn check_reconciliation_diff(store: &dyn ChatStore) {
    let id = store.create(None).await.unwrap();
    store
        .save(
            &id,
            &[
                msg("m1", "user", "original"),
                msg("m2", "assistant", "dropped later"),
                msg("m3", "assistant", "kept"),
            ],
            None,
        )
        .await
        .unwrap();

    // m1 edited, m2 removed, m4 added.
    let next = vec![
        msg("m1", "user", "edited"),
        msg("m3", "assistant", "kept"),
        msg("m4", "user", "new"),
    ];
    store.save(&id, &next, None).await.unwrap();

    let loaded = store.load(&id, None).await.unwrap();
    let ids: Vec<&str> = loaded.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m3", "m4"]);
    assert_eq!(loaded[0].text_content(), "edited");
}

async fn check_nonexistent_loads_empty(store: &dyn ChatStore) {
    assert!(store.load("never-created", None).await.unwrap().is_empty());
}

async fn check_invalid_id_rejected(store: &dyn ChatStore) {
    let too_long = "x".repeat(256);
    for bad in ["../escape", "a/b", "", too_long.as_str()] {
        let err = store.load(bad, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidChatId { .. }), "id {bad:?}");
        let err = store.save(bad, &[msg("m1", "user", "x")], None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidChatId { .. }), "id {bad:?}");
    }
}

async fn check_invalid_batch_leaves_state(store: &dyn ChatStore) {
    let id = store.create(None).await.unwrap();
    let good = vec![msg("m1", "user", "kept state")];
    store.save(&id, &good, None).await.unwrap();

    let mut broken = msg("m2", "assistant", "half-written");
    broken.id = String::new();
    let err = store
        .save(&id, &[msg("m1", "user", "changed"), broken], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidMessage { .. }));

    // Whole batch rejected: prior state untouched.
    assert_eq!(store.load(&id, None).await.unwrap(), good);
}

async fn check_duplicate_ids_rejected(store: &dyn ChatStore) {
    let id = store.create(None).await.unwrap();
    let good = vec![msg("m1", "user", "kept state")];
    store.save(&id, &good, None).await.unwrap();

    // Two entries contending for the same reconciliation key would make the
    // backends diverge (array keeps both, upsert collapses them), so the
    // batch is rejected up front on both.
    let err = store
        .save(
            &id,
            &[msg("m1", "user", "first"), msg("m1", "user", "second")],
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidMessage { .. }));
    assert_eq!(store.load(&id, None).await.unwrap(), good);
}

async fn check_listing_order_and_empty_chats(store: &dyn ChatStore) {
    let empty = store.create(None).await.unwrap();
    let first = store.create(None).await.unwrap();
    let second = store.create(None).await.unwrap();

    store
        .save(&first, &[msg("m1", "user", "older chat")], None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    store
        .save(&second, &[msg("m1", "user", "newer chat")], None)
        .await
        .unwrap();

    let listing = store.list(None).await.unwrap();
    let ids: Vec<&str> = listing.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![second.as_str(), first.as_str()]);
    assert!(!ids.contains(&empty.as_str()));
    assert_eq!(listing[0].title, "newer chat");
    assert_eq!(listing[0].last_message, "newer chat");
}

async fn check_title_derivation(store: &dyn ChatStore) {
    let id = store.create(None).await.unwrap();
    assert_eq!(store.title(&id, None).await.unwrap(), "New Chat");

    let long = "q".repeat(51);
    store
        .save(
            &id,
            &[msg("m0", "system", "preamble"), msg("m1", "user", &long)],
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        store.title(&id, None).await.unwrap(),
        format!("{}...", "q".repeat(50))
    );

    assert_eq!(store.title("never-created", None).await.unwrap(), "New Chat");
}

// ── File backend ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn file_round_trip() {
    let (_dir, store) = file_store().await;
    check_round_trip(&store).await;
}

#[tokio::test]
async fn file_save_is_idempotent() {
    let (_dir, store) = file_store().await;
    check_save_is_idempotent(&store).await;
}

#[tokio::test]
async fn file_reconciliation_diff() {
    let (_dir, store) = file_store().await;
    check_reconciliation_diff(&store).await;
}

#[tokio::test]
async fn file_nonexistent_loads_empty() {
    let (_dir, store) = file_store().await;
    check_nonexistent_loads_empty(&store).await;
}

#[tokio::test]
async fn file_invalid_id_rejected_before_io() {
    let (dir, store) = file_store().await;
    check_invalid_id_rejected(&store).await;
    // No stray files were created by the rejected operations.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn file_invalid_batch_leaves_state() {
    let (_dir, store) = file_store().await;
    check_invalid_batch_leaves_state(&store).await;
}

#[tokio::test]
async fn file_duplicate_ids_rejected() {
    let (_dir, store) = file_store().await;
    check_duplicate_ids_rejected(&store).await;
}

#[tokio::test]
async fn file_listing_order_and_empty_chats() {
    let (_dir, store) = file_store().await;
    check_listing_order_and_empty_chats(&store).await;
}

#[tokio::test]
async fn file_title_derivation() {
    let (_dir, store) = file_store().await;
    check_title_derivation(&store).await;
}

#[tokio::test]
async fn file_corrupt_chat_degrades_to_empty() {
    let (dir, store) = file_store().await;
    let id = store.create(None).await.unwrap();
    store
        .save(&id, &[msg("m1", "user", "fine")], None)
        .await
        .unwrap();

    std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

    // load degrades, list omits, neither raises.
    assert!(store.load("broken", None).await.unwrap().is_empty());
    let listing = store.list(None).await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].id, id);
}

#[tokio::test]
async fn file_interrupted_write_leaves_old_state() {
    let (dir, store) = file_store().await;
    let id = store.create(None).await.unwrap();
    let committed = vec![msg("m1", "user", "committed state")];
    store.save(&id, &committed, None).await.unwrap();

    // A crash between temp-write and rename leaves a `.tmp` behind. The
    // reader must see the old complete state and the listing must not pick
    // the artifact up as a chat.
    std::fs::write(
        dir.path().join(format!("{id}.json.tmp")),
        "[{\"id\": \"m2\"",
    )
    .unwrap();

    assert_eq!(store.load(&id, None).await.unwrap(), committed);
    let listing = store.list(None).await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].id, id);
}

// ── Sqlite backend ───────────────────────────────────────────────────────────

#[tokio::test]
async fn sqlite_round_trip() {
    check_round_trip(&memory_store().await).await;
}

#[tokio::test]
async fn sqlite_save_is_idempotent() {
    check_save_is_idempotent(&memory_store().await).await;
}

#[tokio::test]
async fn sqlite_reconciliation_diff() {
    check_reconciliation_diff(&memory_store().await).await;
}

#[tokio::test]
async fn sqlite_nonexistent_loads_empty() {
    check_nonexistent_loads_empty(&memory_store().await).await;
}

#[tokio::test]
async fn sqlite_invalid_id_rejected_before_io() {
    check_invalid_id_rejected(&memory_store().await).await;
}

#[tokio::test]
async fn sqlite_invalid_batch_leaves_state() {
    check_invalid_batch_leaves_state(&memory_store().await).await;
}

#[tokio::test]
async fn sqlite_duplicate_ids_rejected() {
    check_duplicate_ids_rejected(&memory_store().await).await;
}

#[tokio::test]
async fn sqlite_listing_order_and_empty_chats() {
    check_listing_order_and_empty_chats(&memory_store().await).await;
}

#[tokio::test]
async fn sqlite_title_derivation() {
    check_title_derivation(&memory_store().await).await;
}

#[tokio::test]
async fn sqlite_ownership_isolation() {
    let store = memory_store().await;
    let id = store.create(Some("alice")).await.unwrap();
    store
        .save(&id, &[msg("m1", "user", "alice's chat")], Some("alice"))
        .await
        .unwrap();

    let err = store.load(&id, Some("bob")).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized { .. }));
    let err = store
        .save(&id, &[msg("m1", "user", "overwrite")], Some("bob"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized { .. }));
    let err = store.title(&id, Some("bob")).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized { .. }));

    // Listings are owner-scoped.
    assert!(store.list(Some("bob")).await.unwrap().is_empty());
    assert_eq!(store.list(Some("alice")).await.unwrap().len(), 1);

    // Bob's rejected save changed nothing.
    let loaded = store.load(&id, Some("alice")).await.unwrap();
    assert_eq!(loaded[0].text_content(), "alice's chat");
}

#[tokio::test]
async fn sqlite_corrupt_message_record_is_skipped() {
    let store = memory_store().await;
    let id = store.create(None).await.unwrap();
    store
        .save(
            &id,
            &[msg("m1", "user", "good"), msg("m2", "assistant", "bad soon")],
            None,
        )
        .await
        .unwrap();

    sqlx::query("UPDATE messages SET content = 'not json' WHERE id = 'm2'")
        .execute(store.pool())
        .await
        .unwrap();

    let loaded = store.load(&id, None).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, "m1");

    // Listing still works off the cached columns.
    assert_eq!(store.list(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn sqlite_interrupted_reconcile_rolls_back_cleanly() {
    let store = memory_store().await;
    let id = store.create(None).await.unwrap();
    let committed = vec![msg("m1", "user", "original"), msg("m2", "assistant", "doomed")];
    store.save(&id, &committed, None).await.unwrap();

    // Simulated storage fault in the middle of the reconcile: the incoming
    // batch edits m1 (upsert applied) and omits m2, and the delete phase
    // blows up. The earlier upsert must roll back with it.
    sqlx::query(
        "CREATE TRIGGER fault_injection BEFORE DELETE ON messages
         BEGIN SELECT RAISE(ABORT, 'simulated crash'); END",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let err = store
        .save(&id, &[msg("m1", "user", "edited")], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DatabaseQueryFailed { .. }));

    // Pre-save state, complete and unmixed.
    assert_eq!(store.load(&id, None).await.unwrap(), committed);
    let count: i64 = sqlx::query_scalar("SELECT message_count FROM chats WHERE id = $1")
        .bind(&id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 2);

    // With the fault gone the same save applies fully.
    sqlx::query("DROP TRIGGER fault_injection")
        .execute(store.pool())
        .await
        .unwrap();
    store.save(&id, &[msg("m1", "user", "edited")], None).await.unwrap();
    let loaded = store.load(&id, None).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].text_content(), "edited");
}

#[tokio::test]
async fn sqlite_file_backed_concurrent_chats_do_not_interfere() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite:{}", dir.path().join("chats.db").display());
    let store = SqliteChatStore::connect(&url).await.unwrap();

    let chat_a = store.create(None).await.unwrap();
    let chat_b = store.create(None).await.unwrap();

    // Interleaved turns on two unrelated chats; a file-backed store runs a
    // real pool, so neither side waits on the other's transactions.
    let (a, b) = tokio::join!(
        async {
            let mut transcript = Vec::new();
            for i in 0..5 {
                transcript.push(msg(&format!("a{i}"), "user", &format!("a turn {i}")));
                store.save(&chat_a, &transcript, None).await.unwrap();
            }
            store.load(&chat_a, None).await.unwrap()
        },
        async {
            let mut transcript = Vec::new();
            for i in 0..5 {
                transcript.push(msg(&format!("b{i}"), "user", &format!("b turn {i}")));
                store.save(&chat_b, &transcript, None).await.unwrap();
            }
            store.load(&chat_b, None).await.unwrap()
        },
    );

    assert_eq!(a.len(), 5);
    assert_eq!(b.len(), 5);
    assert!(a.iter().all(|m| m.id.starts_with('a')));
    assert!(b.iter().all(|m| m.id.starts_with('b')));
    assert_eq!(store.list(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn sqlite_message_rows_match_reconciled_sequence() {
    let store = memory_store().await;
    let id = store.create(None).await.unwrap();
    store
        .save(
            &id,
            &[msg("m1", "user", "one"), msg("m2", "assistant", "two")],
            None,
        )
        .await
        .unwrap();
    store.save(&id, &[msg("m2", "assistant", "two")], None).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE chat_id = $1")
        .bind(&id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);

    let title: String = sqlx::query_scalar("SELECT title FROM chats WHERE id = $1")
        .bind(&id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    // No user message left; title falls back to the first message overall.
    assert_eq!(title, "two");
}
