//! Database access layer
//!
//! One SQLite file in the root folder holding the `collection_data` table.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

use crate::Result;

pub mod records;

pub use records::{CollectionRecord, NewCollectionRecord, RecordFilter};

/// Open (creating if needed) the database and ensure the schema exists
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let options = SqliteConnectOptions::from_str(&db_url)?;
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the schema applied
///
/// The pool never recycles its connection, so the database lives as long as
/// the pool does.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the collection table and its indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collection_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            house_id TEXT NOT NULL,
            image1 TEXT NOT NULL,
            image2 TEXT,
            image1_prediction TEXT NOT NULL,
            image2_prediction TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_collection_data_created_at ON collection_data (created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_collection_data_house_id ON collection_data (house_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (collection_data)");

    Ok(())
}
