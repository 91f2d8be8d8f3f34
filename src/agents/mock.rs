//! Canned agent used when the service runs in mock mode.

use async_trait::async_trait;

use super::error::AgentError;
use super::service::AgentService;
use super::types::{Analysis, AnalysisArguments};
use crate::llm::{stream_string, TextStream};

/// Answers every step without touching the network.
#[derive(Debug, Clone, Default)]
pub struct MockAgentService;

impl MockAgentService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentService for MockAgentService {
    async fn start_goal(&self, goal: &str) -> Result<Vec<String>, AgentError> {
        Ok(vec![
            format!("Research the background of: {}", goal),
            "Outline the steps needed to finish".to_string(),
        ])
    }

    async fn analyze_task(
        &self,
        _goal: &str,
        task: &str,
        _tool_names: &[String],
    ) -> Result<Analysis, AgentError> {
        Ok(Analysis::new(
            crate::tools::get_default_tool().name(),
            AnalysisArguments {
                reasoning: "Mock mode always reasons directly.".to_string(),
                arg: task.to_string(),
            },
        ))
    }

    async fn execute_task(
        &self,
        _goal: &str,
        task: &str,
        analysis: &Analysis,
    ) -> Result<TextStream, AgentError> {
        Ok(stream_string(format!(
            "Mock result of running `{}` for task: {}",
            analysis.action, task
        )))
    }

    async fn create_tasks(
        &self,
        _goal: &str,
        tasks: &[String],
        _last_task: &str,
        _result: &str,
        completed_tasks: &[String],
    ) -> Result<Vec<String>, AgentError> {
        let task = format!("Mock follow-up task {}", tasks.len() + completed_tasks.len() + 1);
        Ok(vec![task])
    }

    async fn summarize_task(
        &self,
        goal: &str,
        results: &[String],
    ) -> Result<TextStream, AgentError> {
        Ok(stream_string(format!(
            "# Summary\n\nMock summary of {} results for goal: {}",
            results.len(),
            goal
        )))
    }

    async fn chat(&self, message: &str, _results: &[String]) -> Result<TextStream, AgentError> {
        Ok(stream_string(format!("Mock reply to: {}", message)))
    }
}
