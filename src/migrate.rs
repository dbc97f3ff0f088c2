use anyhow::Result;
use sqlx::SqlitePool;

/// Create every table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Durable cache tier
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Pipeline runs
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id TEXT PRIMARY KEY,
            company TEXT NOT NULL,
            audience TEXT,
            follow_up TEXT,
            status TEXT NOT NULL,
            failed_stage TEXT,
            error TEXT,
            started_at INTEGER NOT NULL,
            finished_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Stage outputs, one row per completed stage
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stage_results (
            run_id TEXT NOT NULL,
            stage TEXT NOT NULL,
            position INTEGER NOT NULL,
            output_json TEXT NOT NULL,
            completed_at INTEGER NOT NULL,
            PRIMARY KEY (run_id, stage),
            FOREIGN KEY (run_id) REFERENCES runs(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
