//! Run history.
//!
//! Every pipeline run gets a row in `runs`; each stage that completes adds its
//! JSON output to `stage_results`. The history is read by `adsmith history`,
//! `adsmith show` and the `/runs` endpoints.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::agents::{ResearchRequest, StageName};

pub const DEFAULT_LIST_LIMIT: i64 = 20;
pub const MAX_LIST_LIMIT: i64 = 200;

/// Reject list limits outside `1..=MAX_LIST_LIMIT`. SQLite reads a
/// negative `LIMIT` as unbounded.
pub fn check_list_limit(limit: i64) -> Result<i64> {
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        anyhow::bail!("limit must be between 1 and {}", MAX_LIST_LIMIT);
    }
    Ok(limit)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "succeeded" => RunStatus::Succeeded,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Running,
        }
    }
}

/// One row of `adsmith history`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: String,
    pub company: String,
    pub audience: Option<String>,
    pub follow_up: Option<String>,
    pub status: RunStatus,
    pub failed_stage: Option<String>,
    pub error: Option<String>,
    pub started_at: String, // ISO8601
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: String,
    pub output: serde_json::Value,
    pub completed_at: String,
}

/// A run with its stage outputs in pipeline order.
#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: RunSummary,
    pub stages: Vec<StageRecord>,
}

fn iso(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

fn summary_from_row(row: &SqliteRow) -> RunSummary {
    let status: String = row.get("status");
    let finished_at: Option<i64> = row.get("finished_at");
    RunSummary {
        id: row.get("id"),
        company: row.get("company"),
        audience: row.get("audience"),
        follow_up: row.get("follow_up"),
        status: RunStatus::parse(&status),
        failed_stage: row.get("failed_stage"),
        error: row.get("error"),
        started_at: iso(row.get("started_at")),
        finished_at: finished_at.map(iso),
    }
}

#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a `running` row and return its id.
    pub async fn start_run(&self, request: &ResearchRequest) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO runs (id, company, audience, follow_up, status, started_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.company)
        .bind(&request.audience)
        .bind(&request.follow_up)
        .bind(RunStatus::Running.as_str())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn record_stage<T: Serialize>(
        &self,
        run_id: &str,
        stage: StageName,
        output: &T,
    ) -> Result<()> {
        let json = serde_json::to_string(output)
            .with_context(|| format!("serializing {} output", stage))?;
        sqlx::query(
            r#"
            INSERT INTO stage_results (run_id, stage, position, output_json, completed_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(run_id, stage) DO UPDATE SET
                output_json = excluded.output_json,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(run_id)
        .bind(stage.as_str())
        .bind(stage.position() as i64)
        .bind(json)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a run finished. `failure` names the stage that aborted it.
    pub async fn finish_run(
        &self,
        run_id: &str,
        failure: Option<(StageName, &str)>,
    ) -> Result<()> {
        let (status, stage, error) = match failure {
            None => (RunStatus::Succeeded, None, None),
            Some((stage, error)) => (RunStatus::Failed, Some(stage.as_str()), Some(error)),
        };
        sqlx::query(
            "UPDATE runs SET status = ?, failed_stage = ?, error = ?, finished_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(stage)
        .bind(error)
        .bind(Utc::now().timestamp())
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: i64) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(
            "SELECT id, company, audience, follow_up, status, failed_stage, error, started_at, finished_at \
             FROM runs ORDER BY started_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(summary_from_row).collect())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunDetail>> {
        let Some(row) = sqlx::query(
            "SELECT id, company, audience, follow_up, status, failed_stage, error, started_at, finished_at \
             FROM runs WHERE id = ?",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let stage_rows = sqlx::query(
            "SELECT stage, output_json, completed_at FROM stage_results WHERE run_id = ? ORDER BY position ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stages = Vec::with_capacity(stage_rows.len());
        for row in &stage_rows {
            let stage: String = row.get("stage");
            let json: String = row.get("output_json");
            let output = serde_json::from_str(&json)
                .with_context(|| format!("stored {} output for run {} is not JSON", stage, run_id))?;
            stages.push(StageRecord {
                stage,
                output,
                completed_at: iso(row.get("completed_at")),
            });
        }

        Ok(Some(RunDetail {
            run: summary_from_row(&row),
            stages,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use tempfile::TempDir;

    async fn store(tmp: &TempDir) -> HistoryStore {
        let pool = db::connect_path(&tmp.path().join("history.sqlite"))
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        HistoryStore::new(pool)
    }

    #[tokio::test]
    async fn records_a_successful_run() {
        let tmp = TempDir::new().unwrap();
        let history = store(&tmp).await;
        let request = ResearchRequest::new("Acme").with_audience("runners");

        let id = history.start_run(&request).await.unwrap();
        history
            .record_stage(&id, StageName::Marketing, &serde_json::json!({"m": 2}))
            .await
            .unwrap();
        history
            .record_stage(&id, StageName::Research, &serde_json::json!({"r": 1}))
            .await
            .unwrap();
        history.finish_run(&id, None).await.unwrap();

        let detail = history.get_run(&id).await.unwrap().unwrap();
        assert_eq!(detail.run.company, "Acme");
        assert_eq!(detail.run.audience.as_deref(), Some("runners"));
        assert_eq!(detail.run.status, RunStatus::Succeeded);
        assert!(detail.run.finished_at.is_some());
        let stages: Vec<&str> = detail.stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(stages, vec!["research", "marketing"]);
        assert_eq!(detail.stages[0].output["r"], 1);
    }

    #[tokio::test]
    async fn records_failure_and_lists_newest_first() {
        let tmp = TempDir::new().unwrap();
        let history = store(&tmp).await;

        let first = history.start_run(&ResearchRequest::new("First")).await.unwrap();
        let second = history.start_run(&ResearchRequest::new("Second")).await.unwrap();
        history
            .finish_run(&second, Some((StageName::Marketing, "model unavailable")))
            .await
            .unwrap();

        let runs = history.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].failed_stage.as_deref(), Some("marketing"));
        assert_eq!(runs[0].error.as_deref(), Some("model unavailable"));
        assert_eq!(runs[1].id, first);
        assert_eq!(runs[1].status, RunStatus::Running);

        assert_eq!(history.list_runs(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_run_is_none() {
        let tmp = TempDir::new().unwrap();
        let history = store(&tmp).await;
        assert!(history.get_run("nope").await.unwrap().is_none());
    }
}
