//! Database access for cqm-classifier
//!
//! SQLite database in the root folder. Structured values (reports, color
//! percentages, features, assessments) are stored as JSON text.

pub mod sessions;

pub use sessions::SqliteSessionStore;

use cqm_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the database file (and its parent directory) when missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create classification tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS classification_sessions (
            session_id TEXT PRIMARY KEY,
            coffee_lot_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            classification_result TEXT,
            total_grains_analyzed INTEGER NOT NULL DEFAULT 0,
            processing_time_seconds REAL,
            created_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS grain_analyses (
            analysis_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES classification_sessions(session_id) ON DELETE CASCADE,
            bean_index INTEGER NOT NULL,
            image_url TEXT,
            storage_public_id TEXT,
            color_percentages TEXT NOT NULL,
            features TEXT NOT NULL,
            quality_assessment TEXT NOT NULL,
            final_score REAL NOT NULL,
            final_category TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sessions_coffee_lot ON classification_sessions(coffee_lot_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_grain_analyses_session ON grain_analyses(session_id, bean_index)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (classification_sessions, grain_analyses)");

    Ok(())
}
