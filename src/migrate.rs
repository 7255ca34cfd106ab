use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    create_schema(&pool).await?;
    println!("Database initialized at {}", config.db.path.display());
    Ok(())
}

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // Create segments table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS segments (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            clause_id TEXT NOT NULL,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create segment_vectors table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS segment_vectors (
            segment_id TEXT PRIMARY KEY,
            vector BLOB NOT NULL,
            dims INTEGER NOT NULL,
            model TEXT NOT NULL,
            FOREIGN KEY (segment_id) REFERENCES segments(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_segments_position ON segments(position)")
        .execute(pool)
        .await?;

    Ok(())
}
