//! End-to-End Pipeline Tests
//!
//! Runs terse command lines through a [`Session`] backed by a real `SQLite`
//! database and checks what reaches the database and the screen:
//! - classification, deduction and synthesis produce the expected SQL
//! - modifications change the stored rows
//! - empty results and driver errors are reported, not panicked on
//! - session state (table, options) survives failed commands

#![cfg(feature = "sqlite")]

use miniquery::{
    DisplayMode, MiniError, Outcome, QueryKind, Session, Settings, SqliteEngine, TerminalWidth,
};
use pretty_assertions::assert_eq;

// ============================================================================
// Test Helpers
// ============================================================================

/// Create a test `SQLite` database with sample data
fn create_test_sqlite_db() -> std::path::PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let thread_id = std::thread::current().id();
    let temp_file = std::env::temp_dir().join(format!("test_pipeline_{thread_id:?}_{id}.db"));
    let _ = std::fs::remove_file(&temp_file);

    {
        use rusqlite::Connection;
        let conn = Connection::open(&temp_file).expect("Failed to create temp database");

        conn.execute(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT,
                age INTEGER
            )",
            [],
        )
        .expect("Failed to create table");

        conn.execute_batch(
            "INSERT INTO users (name, email, age) VALUES ('Alice', 'alice@example.com', 30);
             INSERT INTO users (name, email, age) VALUES ('Bob', 'bob@example.com', 25);
             INSERT INTO users (name, email, age) VALUES ('Charlie', NULL, 35);",
        )
        .expect("Failed to insert");
    }

    temp_file
}

fn cleanup_sqlite_db(path: &std::path::Path) {
    let _ = std::fs::remove_file(path);
}

fn new_session(path: &std::path::Path, format: DisplayMode) -> Session<SqliteEngine> {
    let settings = Settings {
        database: Some(path.display().to_string()),
        format,
        ..Settings::default()
    };
    let engine = SqliteEngine::from_settings(&settings).expect("sqlite settings");
    let mut session = Session::new(settings, engine).with_width(TerminalWidth::Unbounded);
    session.seed_options(None).expect("seed options");
    session
}

async fn run(
    session: &mut Session<SqliteEngine>,
    tokens: &[&str],
) -> (Result<Outcome, MiniError>, String) {
    let mut out = Vec::new();
    let outcome = session.dispatch(tokens, &mut out).await;
    (outcome, String::from_utf8(out).expect("utf-8 output"))
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn test_select_with_predicate_and_columns() {
    let db = create_test_sqlite_db();
    let mut session = new_session(&db, DisplayMode::NoWrap);

    let (outcome, text) = run(&mut session, &["users", "id=1", "+name", "+email"]).await;
    assert_eq!(outcome.unwrap(), Outcome::Rows { kind: QueryKind::Select, count: 1 });
    assert_eq!(text, "name  email\n\nAlice alice@example.com\n");

    cleanup_sqlite_db(&db);
}

#[tokio::test]
async fn test_null_rendered_as_literal() {
    let db = create_test_sqlite_db();
    let mut session = new_session(&db, DisplayMode::NoWrap);

    let (_, text) = run(&mut session, &["users", "+name", "+email", "/name"]).await;
    insta::assert_snapshot!(text.trim_end(), @r"
    name    email

    Alice   alice@example.com
    Bob     bob@example.com
    Charlie NULL
    ");

    cleanup_sqlite_db(&db);
}

#[tokio::test]
async fn test_tab_and_vertical_formats() {
    let db = create_test_sqlite_db();
    let mut session = new_session(&db, DisplayMode::Wrap);

    let (_, text) = run(&mut session, &["-tab", "users", "+name", "+email", "age>30"]).await;
    assert_eq!(text, "name\temail\nCharlie\t\n");

    let (_, text) = run(&mut session, &["-vertical", "users", "+id", "+name", "id=2"]).await;
    assert_eq!(text, "*** 1. row ***\n  id: 2\nname: Bob\n");

    cleanup_sqlite_db(&db);
}

#[tokio::test]
async fn test_or_and_limit() {
    let db = create_test_sqlite_db();
    let mut session = new_session(&db, DisplayMode::Tab);

    let (outcome, text) =
        run(&mut session, &["-o", "-limit=5", "users", "+name", "name=Bob", "age>=35", "/id"])
            .await;
    assert_eq!(outcome.unwrap(), Outcome::Rows { kind: QueryKind::Select, count: 2 });
    assert_eq!(text, "name\nBob\nCharlie\n");

    cleanup_sqlite_db(&db);
}

#[tokio::test]
async fn test_two_valued_logic_includes_nulls() {
    let db = create_test_sqlite_db();
    let mut session = new_session(&db, DisplayMode::Tab);

    let (_, text) = run(&mut session, &["users", "+name", "email!=bob@example.com", "/id"]).await;
    assert_eq!(text, "name\nAlice\n");

    let (_, text) =
        run(&mut session, &["-2v", "users", "+name", "email!=bob@example.com", "/id"]).await;
    assert_eq!(text, "name\nAlice\nCharlie\n");

    cleanup_sqlite_db(&db);
}

#[tokio::test]
async fn test_wrapped_layout_splits_columns() {
    let db = create_test_sqlite_db();
    let mut session = new_session(&db, DisplayMode::Wrap).with_width(TerminalWidth::Columns(20));

    let (_, text) = run(&mut session, &["users", "id=3"]).await;
    insta::assert_snapshot!(text.trim_end(), @r"
    id name    email

    3  Charlie NULL

    age

    35
    ");

    cleanup_sqlite_db(&db);
}

// ============================================================================
// Modifications
// ============================================================================

#[tokio::test]
async fn test_insert_update_delete_round() {
    let db = create_test_sqlite_db();
    let mut session = new_session(&db, DisplayMode::Tab);

    let (outcome, _) = run(&mut session, &["users", "name.=Dana", "age.=41"]).await;
    assert_eq!(outcome.unwrap(), Outcome::Affected { kind: QueryKind::Insert, rows: 1 });

    let (outcome, _) = run(&mut session, &["users", "age+=1", "name=Dana"]).await;
    assert_eq!(outcome.unwrap(), Outcome::Affected { kind: QueryKind::Update, rows: 1 });

    let (_, text) = run(&mut session, &["users", "+age", "name=Dana"]).await;
    assert_eq!(text, "age\n42\n");

    let (outcome, text) = run(&mut session, &["users", "name~=Dana"]).await;
    assert_eq!(outcome.unwrap(), Outcome::Affected { kind: QueryKind::Delete, rows: 1 });
    assert_eq!(text, "1 row(s) affected.\n");

    let (outcome, _) = run(&mut session, &["users", "name=Dana"]).await;
    assert_eq!(outcome.unwrap(), Outcome::EmptyResult);

    cleanup_sqlite_db(&db);
}

#[tokio::test]
async fn test_literal_sql_command() {
    let db = create_test_sqlite_db();
    let mut session = new_session(&db, DisplayMode::Tab);

    let (outcome, text) =
        run(&mut session, &["\\sq", "SELECT", "count(*)", "AS", "n", "FROM", "users"]).await;
    assert_eq!(outcome.unwrap(), Outcome::Rows { kind: QueryKind::Select, count: 1 });
    assert_eq!(text, "n\n3\n");

    cleanup_sqlite_db(&db);
}

// ============================================================================
// Failures and State
// ============================================================================

#[tokio::test]
async fn test_empty_result_keeps_state() {
    let db = create_test_sqlite_db();
    let mut session = new_session(&db, DisplayMode::Tab);
    run(&mut session, &["\\table", "users"]).await.0.unwrap();
    run(&mut session, &["\\set", "vertical"]).await.0.unwrap();
    let persistent = session.options().persistent().clone();

    let (outcome, text) = run(&mut session, &["id=999"]).await;
    assert_eq!(outcome.unwrap(), Outcome::EmptyResult);
    assert_eq!(text, "");
    assert_eq!(session.settings().table.as_deref(), Some("users"));
    assert_eq!(session.options().persistent(), &persistent);

    cleanup_sqlite_db(&db);
}

#[tokio::test]
async fn test_driver_error_keeps_native_text() {
    let db = create_test_sqlite_db();
    let mut session = new_session(&db, DisplayMode::Tab);

    let err = run(&mut session, &["accounts"]).await.0.unwrap_err();
    assert_eq!(err.error_code(), "DRIVER_ERROR");
    assert!(err.message().contains("no such table: accounts"), "{}", err.message());

    // The session still works afterwards
    let (outcome, _) = run(&mut session, &["users", "id=1"]).await;
    assert!(outcome.is_ok());

    cleanup_sqlite_db(&db);
}

#[tokio::test]
async fn test_inconsistent_kind_touches_nothing() {
    let db = create_test_sqlite_db();
    let mut session = new_session(&db, DisplayMode::Tab);

    let err = run(&mut session, &["\\insert", "users", "age+=1"]).await.0.unwrap_err();
    assert_eq!(err.error_code(), "INCONSISTENT_QUERY_TYPE");

    let (_, text) = run(&mut session, &["users", "+age", "/id"]).await;
    assert_eq!(text, "age\n30\n25\n35\n");

    cleanup_sqlite_db(&db);
}

#[tokio::test]
async fn test_switching_database() {
    let db = create_test_sqlite_db();
    let other = create_test_sqlite_db();
    let mut session = new_session(&db, DisplayMode::Tab);

    run(&mut session, &["users", "id~=1"]).await.0.unwrap();
    run(&mut session, &["\\db", other.display().to_string().as_str()]).await.0.unwrap();

    let (_, text) = run(&mut session, &["users", "+name", "id=1"]).await;
    assert_eq!(text, "name\nAlice\n");

    cleanup_sqlite_db(&db);
    cleanup_sqlite_db(&other);
}
