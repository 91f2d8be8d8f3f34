//! Core types for the agent loop.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported model identifiers.
///
/// Deserialising an identifier outside this set fails, which is how unknown
/// models are rejected at the edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LlmModel {
    #[default]
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[serde(rename = "gpt-3.5-turbo-16k")]
    Gpt35Turbo16k,
    #[serde(rename = "gpt-4")]
    Gpt4,
}

impl LlmModel {
    pub const ALL: [LlmModel; 3] = [LlmModel::Gpt35Turbo, LlmModel::Gpt35Turbo16k, LlmModel::Gpt4];

    /// Wire identifier sent to the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmModel::Gpt35Turbo => "gpt-3.5-turbo",
            LlmModel::Gpt35Turbo16k => "gpt-3.5-turbo-16k",
            LlmModel::Gpt4 => "gpt-4",
        }
    }

    /// Declared context window (prompt + completion tokens).
    pub fn max_tokens(&self) -> u32 {
        match self {
            LlmModel::Gpt35Turbo => 4000,
            LlmModel::Gpt35Turbo16k => 16000,
            LlmModel::Gpt4 => 8000,
        }
    }

    /// Look up a model by its wire identifier.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

impl std::fmt::Display for LlmModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static model -> context size table, as served by the models endpoint.
pub fn model_max_tokens() -> HashMap<LlmModel, u32> {
    LlmModel::ALL.into_iter().map(|m| (m, m.max_tokens())).collect()
}

fn default_temperature() -> f64 {
    0.9
}

fn default_language() -> String {
    "English".to_string()
}

/// Caller-chosen model parameters for a run.
///
/// `max_tokens` is never taken from the caller; it is derived from the model
/// when the settings are built or deserialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ModelSettingsInput", rename_all = "camelCase")]
pub struct ModelSettings {
    pub model: LlmModel,
    /// Never echoed back or persisted.
    #[serde(skip_serializing)]
    pub custom_api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub language: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelSettingsInput {
    #[serde(default, alias = "customModelName")]
    model: LlmModel,
    #[serde(default)]
    custom_api_key: Option<String>,
    #[serde(default = "default_temperature")]
    temperature: f64,
    #[serde(default = "default_language")]
    language: String,
}

impl From<ModelSettingsInput> for ModelSettings {
    fn from(input: ModelSettingsInput) -> Self {
        Self {
            model: input.model,
            custom_api_key: input.custom_api_key.filter(|k| !k.trim().is_empty()),
            temperature: input.temperature,
            max_tokens: input.model.max_tokens(),
            language: input.language,
        }
    }
}

impl ModelSettings {
    pub fn new(model: LlmModel) -> Self {
        Self {
            model,
            custom_api_key: None,
            temperature: default_temperature(),
            max_tokens: model.max_tokens(),
            language: default_language(),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_custom_api_key(mut self, key: impl Into<String>) -> Self {
        self.custom_api_key = Some(key.into());
        self
    }

    /// Check the invariants a deserialised value cannot enforce by itself.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..=1.0).contains(&self.temperature) || self.temperature.is_nan() {
            return Err(SettingsError::Temperature(self.temperature));
        }
        if self.max_tokens != self.model.max_tokens() {
            return Err(SettingsError::MaxTokens {
                model: self.model,
                max_tokens: self.max_tokens,
            });
        }
        if self.language.trim().is_empty() {
            return Err(SettingsError::Language);
        }
        Ok(())
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self::new(LlmModel::default())
    }
}

/// Invalid model settings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("Temperature must be between 0 and 1, got {0}")]
    Temperature(f64),

    #[error("max_tokens {max_tokens} does not match the table value for {model}")]
    MaxTokens { model: LlmModel, max_tokens: u32 },

    #[error("Language must not be empty")]
    Language,
}

/// Caller identity as resolved by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBase {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl UserBase {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// The steps of the agent loop, used to count tasks per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStep {
    Start,
    Analyze,
    Execute,
    Create,
    Summarize,
    Chat,
}

impl LoopStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStep::Start => "start",
            LoopStep::Analyze => "analyze",
            LoopStep::Execute => "execute",
            LoopStep::Create => "create",
            LoopStep::Summarize => "summarize",
            LoopStep::Chat => "chat",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "start" => Some(LoopStep::Start),
            "analyze" => Some(LoopStep::Analyze),
            "execute" => Some(LoopStep::Execute),
            "create" => Some(LoopStep::Create),
            "summarize" => Some(LoopStep::Summarize),
            "chat" => Some(LoopStep::Chat),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoopStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One goal-execution session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub run_id: Uuid,
    pub user_id: String,
    pub goal: String,
    pub model_settings: ModelSettings,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// A step registered against a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTask {
    pub task_id: Uuid,
    pub run_id: Uuid,
    pub step: LoopStep,
    pub created_at: DateTime<Utc>,
}

/// Arguments the model supplies when it picks a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisArguments {
    pub reasoning: String,
    pub arg: String,
}

/// The decision of which tool to run for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub action: String,
    pub reasoning: String,
    pub arg: String,
}

impl Analysis {
    pub fn new(action: impl Into<String>, arguments: AnalysisArguments) -> Self {
        Self {
            action: action.into(),
            reasoning: arguments.reasoning,
            arg: arguments.arg,
        }
    }

    /// Fallback decision: reason about the task directly with the default tool.
    pub fn default_for(task: &str) -> Self {
        Self {
            action: crate::tools::get_default_tool().name().to_string(),
            reasoning: "No suitable tool could be selected, so I will reason through the task directly."
                .to_string(),
            arg: task.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_derive_max_tokens_from_model() {
        let settings: ModelSettings = serde_json::from_value(serde_json::json!({
            "model": "gpt-4",
            "temperature": 0.2,
            "maxTokens": 99999
        }))
        .unwrap();
        assert_eq!(settings.model, LlmModel::Gpt4);
        assert_eq!(settings.max_tokens, 8000);
        assert_eq!(settings.language, "English");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        let result: Result<ModelSettings, _> =
            serde_json::from_value(serde_json::json!({"model": "gpt-5-ultra"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_temperature_out_of_range_fails_validation() {
        let settings = ModelSettings::new(LlmModel::Gpt35Turbo).with_temperature(1.5);
        assert_eq!(settings.validate(), Err(SettingsError::Temperature(1.5)));
    }

    #[test]
    fn test_blank_custom_key_is_dropped() {
        let settings: ModelSettings =
            serde_json::from_value(serde_json::json!({"customApiKey": "  "})).unwrap();
        assert_eq!(settings.custom_api_key, None);
        assert_eq!(settings.model, LlmModel::Gpt35Turbo);
    }

    #[test]
    fn test_model_table() {
        let table = model_max_tokens();
        assert_eq!(table[&LlmModel::Gpt35Turbo], 4000);
        assert_eq!(table[&LlmModel::Gpt35Turbo16k], 16000);
        assert_eq!(table[&LlmModel::Gpt4], 8000);
        assert_eq!(LlmModel::from_name("gpt-4"), Some(LlmModel::Gpt4));
        assert_eq!(LlmModel::from_name("gpt-4o"), None);
    }

    #[test]
    fn test_loop_step_names() {
        for step in [
            LoopStep::Start,
            LoopStep::Analyze,
            LoopStep::Execute,
            LoopStep::Create,
            LoopStep::Summarize,
            LoopStep::Chat,
        ] {
            assert_eq!(LoopStep::from_name(step.as_str()), Some(step));
        }
    }

    #[test]
    fn test_default_analysis_binds_task() {
        let analysis = Analysis::default_for("Research bagels");
        assert_eq!(analysis.action, "reason");
        assert_eq!(analysis.arg, "Research bagels");
    }
}
