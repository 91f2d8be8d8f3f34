//! In-memory run store (non-persistent).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{check_task_limit, RunStore, StoreError};
use crate::agents::types::{AgentTask, LoopStep, ModelSettings, Run, UserBase};

#[derive(Default)]
struct State {
    runs: HashMap<Uuid, Run>,
    tasks: HashMap<Uuid, Vec<AgentTask>>,
}

impl State {
    fn owned_run(&self, user_id: &str, run_id: Uuid) -> Result<&Run, StoreError> {
        self.runs
            .get(&run_id)
            .filter(|run| run.user_id == user_id)
            .ok_or(StoreError::NotFound(run_id))
    }

    fn count(&self, run_id: Uuid, step: LoopStep) -> u32 {
        self.tasks
            .get(&run_id)
            .map_or(0, |tasks| tasks.iter().filter(|t| t.step == step).count() as u32)
    }
}

#[derive(Clone)]
pub struct InMemoryRunStore {
    state: Arc<RwLock<State>>,
    max_loops: u32,
}

impl InMemoryRunStore {
    pub fn new(max_loops: u32) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            max_loops,
        }
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    fn is_persistent(&self) -> bool {
        false
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
        self.state.write().await.runs.insert(run.run_id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, user_id: &str, run_id: Uuid) -> Result<Run, StoreError> {
        self.state.read().await.owned_run(user_id, run_id).cloned()
    }

    async fn create_task(
        &self,
        user_id: &str,
        run_id: Uuid,
        step: LoopStep,
    ) -> Result<AgentTask, StoreError> {
        let mut state = self.state.write().await;
        state.owned_run(user_id, run_id)?;
        check_task_limit(run_id, step, state.count(run_id, step), self.max_loops)?;

        let task = AgentTask {
            task_id: Uuid::new_v4(),
            run_id,
            step,
            created_at: Utc::now(),
        };
        state.tasks.entry(run_id).or_default().push(task.clone());
        Ok(task)
    }

    async fn task_count(&self, run_id: Uuid, step: LoopStep) -> Result<u32, StoreError> {
        Ok(self.state.read().await.count(run_id, step))
    }

    async fn finish_run(&self, user_id: &str, run_id: Uuid) -> Result<Run, StoreError> {
        let mut state = self.state.write().await;
        state.owned_run(user_id, run_id)?;
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or(StoreError::NotFound(run_id))?;
        run.end_time.get_or_insert_with(Utc::now);
        Ok(run.clone())
    }
}
