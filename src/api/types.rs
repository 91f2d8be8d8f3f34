//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::types::{Analysis, ModelSettings};

/// Request to start a new run for a goal.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRunCreate {
    pub goal: String,

    #[serde(default)]
    pub model_settings: ModelSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTaskAnalyze {
    pub run_id: Uuid,
    pub goal: String,
    pub task: String,

    /// Optional tools the caller enabled; the defaults are always offered
    #[serde(default)]
    pub tool_names: Vec<String>,

    #[serde(default)]
    pub model_settings: ModelSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTaskExecute {
    pub run_id: Uuid,
    pub goal: String,
    pub task: String,
    pub analysis: Analysis,

    #[serde(default)]
    pub model_settings: ModelSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTaskCreate {
    pub run_id: Uuid,
    pub goal: String,

    /// Tasks still pending
    #[serde(default)]
    pub tasks: Vec<String>,

    pub last_task: String,
    pub result: String,

    #[serde(default)]
    pub completed_tasks: Vec<String>,

    #[serde(default)]
    pub model_settings: ModelSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummarize {
    pub run_id: Uuid,
    pub goal: String,

    #[serde(default)]
    pub results: Vec<String>,

    #[serde(default)]
    pub model_settings: ModelSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentChat {
    pub run_id: Uuid,
    pub message: String,

    #[serde(default)]
    pub results: Vec<String>,

    #[serde(default)]
    pub model_settings: ModelSettings,
}

/// Tasks produced by the start and create steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewTasksResponse {
    pub run_id: Uuid,
    pub new_tasks: Vec<String>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub dev_mode: bool,
    pub mock_mode: bool,
    pub persistent_store: bool,
    pub max_loops: u32,
}

/// An optional tool as listed to callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub image_url: String,
    /// Usable by this caller right now
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolInfo>,
}

/// Error body returned with every non-success status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable error code
    pub code: String,
}
