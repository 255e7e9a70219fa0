//! Cross-component scenarios against a real database file.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;

use banter_db::{Database, DatabaseConfig, SqlValue, StorageError};

const SCHEMA: &str = "CREATE TABLE messages (
    id TEXT PRIMARY KEY,
    chat_id TEXT NOT NULL,
    body TEXT NOT NULL,
    read INTEGER NOT NULL DEFAULT 0
)";

async fn open_db(dir: &tempfile::TempDir) -> Database {
    open_db_with(dir, |_config| {}).await
}

async fn open_db_with(
    dir: &tempfile::TempDir,
    tweak: impl FnOnce(&mut DatabaseConfig),
) -> Database {
    let mut config = DatabaseConfig::new(dir.path().join("banter.db"));
    tweak(&mut config);
    let db = Database::new(config);
    db.initialize().unwrap();
    db.with_write_connection(|ctx| {
        ctx.connection().execute_batch(SCHEMA).unwrap();
        Ok(())
    })
    .await
    .unwrap();
    db
}

fn msg_row(id: &str, chat: &str, body: &str) -> Vec<SqlValue> {
    vec![
        SqlValue::Text(id.to_string()),
        SqlValue::Text(chat.to_string()),
        SqlValue::Text(body.to_string()),
        SqlValue::Integer(0),
    ]
}

async fn count_messages(db: &Database) -> i64 {
    db.execute_read_query("SELECT COUNT(*) FROM messages".to_string(), vec![], |row| {
        row.get(0)
    })
    .await
    .unwrap()
    .pop()
    .unwrap()
}

// -- read path equivalence --

#[tokio::test]
async fn pooled_and_fallback_reads_return_same_results() {
    let dir = tempfile::tempdir().unwrap();
    let pooled = open_db(&dir).await;
    let _ = pooled
        .bulk_insert(
            "messages",
            &["id", "chat_id", "body", "read"],
            (0..10).map(|i| msg_row(&format!("m{i}"), "c1", "hi")).collect(),
        )
        .await
        .unwrap();

    let via_pool = pooled
        .execute_read_query(
            "SELECT id FROM messages ORDER BY id".to_string(),
            vec![],
            |row| row.get::<_, String>(0),
        )
        .await
        .unwrap();

    // Zero ceiling forces every read through the gateway.
    let fallback_dir = tempfile::tempdir().unwrap();
    let fallback = open_db_with(&fallback_dir, |config| config.max_readers = 0).await;
    let _ = fallback
        .bulk_insert(
            "messages",
            &["id", "chat_id", "body", "read"],
            (0..10).map(|i| msg_row(&format!("m{i}"), "c1", "hi")).collect(),
        )
        .await
        .unwrap();
    let via_gateway = fallback
        .execute_read_query(
            "SELECT id FROM messages ORDER BY id".to_string(),
            vec![],
            |row| row.get::<_, String>(0),
        )
        .await
        .unwrap();

    assert_eq!(via_pool, via_gateway);
    pooled.shutdown().await;
    fallback.shutdown().await;
}

#[tokio::test]
async fn in_memory_database_reads_through_gateway() {
    let db = Database::new(DatabaseConfig::new(":memory:"));
    db.initialize().unwrap();
    db.with_write_connection(|ctx| {
        ctx.connection().execute_batch(SCHEMA).unwrap();
        ctx.execute(
            "INSERT INTO messages (id, chat_id, body) VALUES ('m1', 'c1', 'hello')",
            &[],
        )
    })
    .await
    .unwrap();

    let bodies = db
        .execute_read_query("SELECT body FROM messages".to_string(), vec![], |row| {
            row.get::<_, String>(0)
        })
        .await
        .unwrap();
    assert_eq!(bodies, vec!["hello".to_string()]);
    db.shutdown().await;
}

// -- write serialization --

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_lose_no_writes() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(open_db(&dir).await);

    let mut handles = Vec::new();
    for task in 0..8 {
        let db = Arc::clone(&db);
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                let id = format!("t{task}-m{i}");
                db.with_write_connection(move |ctx| {
                    ctx.execute(
                        "INSERT INTO messages (id, chat_id, body) VALUES (?1, 'c1', 'x')",
                        &[SqlValue::Text(id)],
                    )
                })
                .await
                .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(count_messages(&db).await, 200);
    db.shutdown().await;
}

#[tokio::test]
async fn detached_write_lands_before_later_awaited_write() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;

    db.with_write_connection_detached(|ctx| {
        let _ = ctx.execute(
            "INSERT INTO messages (id, chat_id, body) VALUES ('d1', 'c1', 'detached')",
            &[],
        )?;
        Ok(())
    });

    // Counting through the gateway serializes strictly after the
    // detached job; a pooled read would race it.
    let count: i64 = db
        .with_write_connection(|ctx| {
            ctx.query("SELECT COUNT(*) FROM messages", &[], |row| row.get(0))
                .map(|mut v| v.pop().unwrap())
        })
        .await
        .unwrap();
    assert_eq!(count, 1);
    db.shutdown().await;
}

// -- transactions and retry --

#[tokio::test]
async fn transaction_rollback_leaves_no_partial_state() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;

    let err = db
        .run_in_transaction(|ctx| -> banter_db::Result<()> {
            let _ = ctx.execute(
                "INSERT INTO messages (id, chat_id, body) VALUES ('m1', 'c1', 'x')",
                &[],
            )?;
            // Duplicate key forces a constraint failure mid-transaction.
            let _ = ctx.execute(
                "INSERT INTO messages (id, chat_id, body) VALUES ('m1', 'c1', 'y')",
                &[],
            )?;
            Ok(())
        })
        .await
        .unwrap_err();
    assert_matches!(err, StorageError::Execution { .. });

    assert_eq!(count_messages(&db).await, 0);
    db.shutdown().await;
}

#[tokio::test]
async fn retry_succeeds_after_transient_failures() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let value = db
        .execute_with_retry(move |ctx| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                return Err(StorageError::Busy {
                    message: "simulated contention".to_string(),
                });
            }
            ctx.execute(
                "INSERT INTO messages (id, chat_id, body) VALUES ('m1', 'c1', 'x')",
                &[],
            )
        })
        .await
        .unwrap();

    assert_eq!(value, 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(count_messages(&db).await, 1);
    db.shutdown().await;
}

#[tokio::test]
async fn retry_gives_up_after_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let err = db
        .execute_with_retry(move |_ctx| -> banter_db::Result<()> {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Locked {
                message: "simulated".to_string(),
            })
        })
        .await
        .unwrap_err();

    assert_matches!(err, StorageError::MaxRetriesExceeded { attempts: 3, .. });
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    db.shutdown().await;
}

#[tokio::test]
async fn non_retryable_error_fails_on_first_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let err = db
        .execute_with_retry(move |_ctx| -> banter_db::Result<()> {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::operation("bad input"))
        })
        .await
        .unwrap_err();

    assert_matches!(err, StorageError::Operation { .. });
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    db.shutdown().await;
}

// -- bulk operations --

#[tokio::test]
async fn bulk_insert_then_delete_large_batches() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;

    let rows: Vec<Vec<SqlValue>> = (0..1000)
        .map(|i| msg_row(&format!("m{i:04}"), "c1", &format!("message {i}")))
        .collect();
    let inserted = db
        .bulk_insert("messages", &["id", "chat_id", "body", "read"], rows)
        .await
        .unwrap();
    assert_eq!(inserted, 1000);

    let keys: Vec<SqlValue> = (0..500)
        .map(|i| SqlValue::Text(format!("m{i:04}")))
        .collect();
    let deleted = db.bulk_delete("messages", "id", keys).await.unwrap();
    assert_eq!(deleted, 500);
    assert_eq!(count_messages(&db).await, 500);
    db.shutdown().await;
}

#[tokio::test]
async fn bulk_update_marks_read_flags() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    let _ = db
        .bulk_insert(
            "messages",
            &["id", "chat_id", "body", "read"],
            vec![msg_row("m1", "c1", "a"), msg_row("m2", "c1", "b")],
        )
        .await
        .unwrap();

    let updated = db
        .bulk_update(
            "messages",
            "id",
            &["read"],
            vec![vec![SqlValue::Text("m1".to_string()), SqlValue::Integer(1)]],
        )
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let read_ids = db
        .execute_read_query(
            "SELECT id FROM messages WHERE read = 1".to_string(),
            vec![],
            |row| row.get::<_, String>(0),
        )
        .await
        .unwrap();
    assert_eq!(read_ids, vec!["m1".to_string()]);
    db.shutdown().await;
}

#[tokio::test]
async fn bulk_empty_inputs_are_noops() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;

    assert_eq!(
        db.bulk_insert("messages", &["id"], vec![]).await.unwrap(),
        0
    );
    assert_eq!(
        db.bulk_update("messages", "id", &["read"], vec![])
            .await
            .unwrap(),
        0
    );
    assert_eq!(db.bulk_delete("messages", "id", vec![]).await.unwrap(), 0);
    db.shutdown().await;
}

// -- statement cache through the public surface --

#[tokio::test]
async fn repeated_sql_hits_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;

    for i in 0..5 {
        let id = format!("m{i}");
        db.with_write_connection(move |ctx| {
            ctx.execute(
                "INSERT INTO messages (id, chat_id, body) VALUES (?1, 'c1', 'x')",
                &[SqlValue::Text(id)],
            )
        })
        .await
        .unwrap();
    }

    let stats = db
        .with_write_connection(|ctx| Ok(ctx.cache_stats()))
        .await
        .unwrap();
    assert_eq!(stats.misses, 1, "repeated INSERT compiles once");
    assert_eq!(stats.hits, 4);
    db.shutdown().await;
}

#[tokio::test]
async fn cache_capacity_bounds_entries() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db_with(&dir, |config| config.statement_cache_capacity = 2).await;

    for i in 0..4 {
        // Distinct SQL text per statement to force misses.
        let sql = format!("INSERT INTO messages (id, chat_id, body) VALUES ('m{i}', 'c1', 'x')");
        db.with_write_connection(move |ctx| ctx.execute(&sql, &[]))
            .await
            .unwrap();
    }

    let stats = db
        .with_write_connection(|ctx| Ok(ctx.cache_stats()))
        .await
        .unwrap();
    assert!(stats.len <= 2);
    assert!(stats.evictions >= 2);
    db.shutdown().await;
}

// -- maintenance through the facade --

#[tokio::test]
async fn manual_checkpoint_and_vacuum() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    let _ = db
        .bulk_insert(
            "messages",
            &["id", "chat_id", "body", "read"],
            (0..100).map(|i| msg_row(&format!("m{i}"), "c1", "x")).collect(),
        )
        .await
        .unwrap();

    let stats = db.checkpoint().await.unwrap();
    assert!(!stats.busy);

    // Default threshold is far above anything this test reclaims.
    assert!(!db.vacuum_if_needed().await.unwrap());
    db.shutdown().await;
}

// -- lifecycle --

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = open_db(&dir).await;
        let _ = db
            .bulk_insert(
                "messages",
                &["id", "chat_id", "body", "read"],
                vec![msg_row("m1", "c1", "persisted")],
            )
            .await
            .unwrap();
        db.shutdown().await;
    }

    let db = Database::new(DatabaseConfig::new(dir.path().join("banter.db")));
    db.initialize().unwrap();
    let bodies = db
        .execute_read_query("SELECT body FROM messages".to_string(), vec![], |row| {
            row.get::<_, String>(0)
        })
        .await
        .unwrap();
    assert_eq!(bodies, vec!["persisted".to_string()]);
    db.shutdown().await;
}
