use crate::fs_manager::PortablePathManager;
use crate::models::{ChatMessage, ChatSession};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

/// Opens (creating if needed) the chat history database and applies the
/// schema. Pass `Some(":memory:")` in tests.
pub async fn init_db(db_path: Option<&str>) -> Result<SqlitePool, sqlx::Error> {
    let db_url = match db_path {
        Some(path) => format!("sqlite://{}", path),
        None => {
            let path = PortablePathManager::db_dir().join("admichat.sqlite");
            format!("sqlite://{}", path.to_string_lossy())
        }
    };

    info!("Initializing chat history database at: {}", db_url);

    let in_memory = db_path == Some(":memory:");
    let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

    // An in-memory database lives and dies with its connection, so the
    // pool must be pinned to a single one or later connections would see
    // an empty database.
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 5 })
        .connect_with(options)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_name TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY(session_id) REFERENCES sessions(id)
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, created_at);
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

/// Inserts the session row if this client id has never been seen.
/// Session ids are generated browser-side, so the first message of a new
/// visitor creates the session implicitly.
pub async fn ensure_session(
    pool: &SqlitePool,
    id: &str,
    user_name: Option<&str>,
) -> Result<ChatSession, sqlx::Error> {
    if let Some(existing) = sqlx::query_as::<_, ChatSession>(
        "SELECT id, user_name, created_at FROM sessions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    {
        return Ok(existing);
    }

    let created_at = Utc::now().timestamp();
    sqlx::query_as::<_, ChatSession>(
        r#"
        INSERT INTO sessions (id, user_name, created_at)
        VALUES (?, ?, ?)
        RETURNING id, user_name, created_at
        "#,
    )
    .bind(id)
    .bind(user_name)
    .bind(created_at)
    .fetch_one(pool)
    .await
}

pub async fn add_message(
    pool: &SqlitePool,
    session_id: &str,
    role: &str,
    content: &str,
) -> Result<ChatMessage, sqlx::Error> {
    let created_at = Utc::now().timestamp();

    sqlx::query_as::<_, ChatMessage>(
        r#"
        INSERT INTO messages (session_id, role, content, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING id, session_id, role, content, created_at
        "#,
    )
    .bind(session_id)
    .bind(role)
    .bind(content)
    .bind(created_at)
    .fetch_one(pool)
    .await
}

pub async fn get_session_messages(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Vec<ChatMessage>, sqlx::Error> {
    sqlx::query_as::<_, ChatMessage>(
        r#"
        SELECT id, session_id, role, content, created_at
        FROM messages
        WHERE session_id = ?
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
}

/// Renders the session history as the "Human:/Assistant:" transcript the
/// chat prompt embeds. Empty string for a fresh session.
pub async fn history_as_transcript(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<String, sqlx::Error> {
    let messages = get_session_messages(pool, session_id).await?;
    Ok(messages
        .iter()
        .map(|msg| {
            let speaker = if msg.role == "user" { "Human" } else { "Assistant" };
            format!("{}: {}", speaker, msg.content)
        })
        .collect::<Vec<_>>()
        .join("\n"))
}
