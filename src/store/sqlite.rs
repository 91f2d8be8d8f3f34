//! SQLite-based run store.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{check_task_limit, RunStore, StoreError};
use crate::agents::types::{AgentTask, LoopStep, ModelSettings, Run, UserBase};

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    goal TEXT NOT NULL,
    model_settings TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_user ON runs(user_id);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    run_id TEXT NOT NULL,
    step TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_tasks_run_step ON tasks(run_id, step);
"#;

/// Raw column values of a `runs` row.
type RunRow = (String, String, String, String, String, Option<String>);

pub struct SqliteRunStore {
    conn: Arc<Mutex<Connection>>,
    max_loops: u32,
}

impl SqliteRunStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn open(path: PathBuf, max_loops: u32) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Database(format!("Failed to create database dir: {}", e))
            })?;
        }

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            conn.execute_batch(SCHEMA)?;
            Ok::<_, StoreError>(conn)
        })
        .await
        .map_err(join_error)??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_loops,
        })
    }

    fn select_run(conn: &Connection, user_id: &str, run_id: Uuid) -> Result<Run, StoreError> {
        let row: Option<RunRow> = conn
            .query_row(
                "SELECT id, user_id, goal, model_settings, start_time, end_time
                 FROM runs WHERE id = ?1 AND user_id = ?2",
                params![run_id.to_string(), user_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?;
        row.ok_or(StoreError::NotFound(run_id)).and_then(run_from_row)
    }

    fn count_tasks(conn: &Connection, run_id: Uuid, step: LoopStep) -> Result<u32, StoreError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE run_id = ?1 AND step = ?2",
            params![run_id.to_string(), step.as_str()],
            |row| row.get(0),
        )?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
    StoreError::Database(format!("Task join error: {}", e))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Database(format!("Invalid timestamp '{}': {}", raw, e)))
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Database(format!("Invalid id '{}': {}", raw, e)))
}

fn run_from_row(row: RunRow) -> Result<Run, StoreError> {
    let (id, user_id, goal, settings, start_time, end_time) = row;
    let model_settings: ModelSettings = serde_json::from_str(&settings)
        .map_err(|e| StoreError::Database(format!("Invalid model settings: {}", e)))?;
    Ok(Run {
        run_id: parse_uuid(&id)?,
        user_id,
        goal,
        model_settings,
        start_time: parse_time(&start_time)?,
        end_time: end_time.as_deref().map(parse_time).transpose()?,
    })
}

#[async_trait]
impl RunStore for SqliteRunStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn create_run(
        &self,
        user: &UserBase,
        goal: &str,
        settings: &ModelSettings,
    ) -> Result<Run, StoreError> {
        let run = Run {
            run_id: Uuid::new_v4(),
            user_id: user.id.clone(),
            goal: goal.to_string(),
            model_settings: settings.clone(),
            start_time: Utc::now(),
            end_time: None,
        };
        // The custom key is skipped on serialisation, so it never reaches disk.
        let settings_json = serde_json::to_string(&run.model_settings)
            .map_err(|e| StoreError::Database(format!("Failed to encode settings: {}", e)))?;

        let conn = self.conn.clone();
        let row = run.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO runs (id, user_id, goal, model_settings, start_time, end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
                params![
                    row.run_id.to_string(),
                    row.user_id,
                    row.goal,
                    settings_json,
                    row.start_time.to_rfc3339(),
                ],
            )?;
            Ok::<_, StoreError>(())
        })
        .await
        .map_err(join_error)??;

        Ok(run)
    }

    async fn get_run(&self, user_id: &str, run_id: Uuid) -> Result<Run, StoreError> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            Self::select_run(&conn, &user_id, run_id)
        })
        .await
        .map_err(join_error)?
    }

    async fn create_task(
        &self,
        user_id: &str,
        run_id: Uuid,
        step: LoopStep,
    ) -> Result<AgentTask, StoreError> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        let max_loops = self.max_loops;
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction()?;
            Self::select_run(&tx, &user_id, run_id)?;
            let existing = Self::count_tasks(&tx, run_id, step)?;
            check_task_limit(run_id, step, existing, max_loops)?;

            let task = AgentTask {
                task_id: Uuid::new_v4(),
                run_id,
                step,
                created_at: Utc::now(),
            };
            tx.execute(
                "INSERT INTO tasks (id, run_id, step, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    task.task_id.to_string(),
                    run_id.to_string(),
                    step.as_str(),
                    task.created_at.to_rfc3339(),
                ],
            )?;
            tx.commit()?;
            Ok(task)
        })
        .await
        .map_err(join_error)?
    }

    async fn task_count(&self, run_id: Uuid, step: LoopStep) -> Result<u32, StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            Self::count_tasks(&conn, run_id, step)
        })
        .await
        .map_err(join_error)?
    }

    async fn finish_run(&self, user_id: &str, run_id: Uuid) -> Result<Run, StoreError> {
        let conn = self.conn.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let updated = conn.execute(
                "UPDATE runs SET end_time = COALESCE(end_time, ?1) WHERE id = ?2 AND user_id = ?3",
                params![Utc::now().to_rfc3339(), run_id.to_string(), user_id],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(run_id));
            }
            Self::select_run(&conn, &user_id, run_id)
        })
        .await
        .map_err(join_error)?
    }
}
