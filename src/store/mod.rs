//! Run and task storage with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for tests and development)
//! - `sqlite`: SQLite database
//!
//! Every backend enforces the per-run loop guard when a task is registered:
//! at most `max_loops` tasks of one step type, and a single summary. The
//! check and the insert happen under one lock so concurrent registrations
//! for the same run cannot both pass the limit.

mod memory;
mod sqlite;

pub use memory::InMemoryRunStore;
pub use sqlite::SqliteRunStore;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::agents::types::{AgentTask, LoopStep, ModelSettings, Run, UserBase};
use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Run {0} not found")]
    NotFound(Uuid),

    #[error("Run {run_id} reached the limit of {max_loops} {step} tasks")]
    MaxLoops {
        run_id: Uuid,
        step: LoopStep,
        max_loops: u32,
    },

    #[error("Run {0} has already been summarized")]
    MultipleSummary(Uuid),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Storage for runs and the tasks registered against them.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Whether data survives a restart.
    fn is_persistent(&self) -> bool;

    async fn create_run(
        &self,
        user: &UserBase,
        goal: &str,
        settings: &ModelSettings,
    ) -> Result<Run, StoreError>;

    /// A run owned by `user_id`. Runs of other users are reported as not found.
    async fn get_run(&self, user_id: &str, run_id: Uuid) -> Result<Run, StoreError>;

    /// Register one step against a run, enforcing the loop guard.
    async fn create_task(
        &self,
        user_id: &str,
        run_id: Uuid,
        step: LoopStep,
    ) -> Result<AgentTask, StoreError>;

    async fn task_count(&self, run_id: Uuid, step: LoopStep) -> Result<u32, StoreError>;

    /// Stamp the run's end time. Later calls keep the first stamp.
    async fn finish_run(&self, user_id: &str, run_id: Uuid) -> Result<Run, StoreError>;
}

/// Loop guard shared by all backends. `existing` counts tasks of `step` already stored.
pub(crate) fn check_task_limit(
    run_id: Uuid,
    step: LoopStep,
    existing: u32,
    max_loops: u32,
) -> Result<(), StoreError> {
    if step == LoopStep::Summarize && existing >= 1 {
        return Err(StoreError::MultipleSummary(run_id));
    }
    if existing >= max_loops {
        return Err(StoreError::MaxLoops {
            run_id,
            step,
            max_loops,
        });
    }
    Ok(())
}

/// Store selected by config: SQLite when a database path is set, memory otherwise.
pub async fn create_run_store(config: &Config) -> Result<Arc<dyn RunStore>, StoreError> {
    match &config.database_path {
        Some(path) => {
            tracing::info!("Using SQLite run store at {}", path.display());
            Ok(Arc::new(SqliteRunStore::open(path.clone(), config.max_loops).await?))
        }
        None => {
            tracing::info!("Using in-memory run store");
            Ok(Arc::new(InMemoryRunStore::new(config.max_loops)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_checks() {
        let run_id = Uuid::new_v4();
        assert!(check_task_limit(run_id, LoopStep::Analyze, 0, 2).is_ok());
        assert!(check_task_limit(run_id, LoopStep::Analyze, 1, 2).is_ok());
        assert!(matches!(
            check_task_limit(run_id, LoopStep::Analyze, 2, 2),
            Err(StoreError::MaxLoops { max_loops: 2, .. })
        ));
        assert!(check_task_limit(run_id, LoopStep::Summarize, 0, 2).is_ok());
        assert!(matches!(
            check_task_limit(run_id, LoopStep::Summarize, 1, 5),
            Err(StoreError::MultipleSummary(id)) if id == run_id
        ));
    }
}
