use thiserror::Error;

use super::parser::ParseError;
use super::types::SettingsError;
use crate::llm::LlmError;
use crate::store::StoreError;
use crate::tokenizer::TokenizerError;
use crate::tools::ToolError;

/// Failure of one agent loop step.
///
/// Analysis validation failures never appear here: they are recovered with
/// the default analysis. Tool failures appear only once every fallback has
/// been tried.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Model backend failed: {0}")]
    Backend(#[from] LlmError),

    #[error(transparent)]
    Tool(ToolError),

    #[error("Tokenizer failed: {0}")]
    Tokenizer(#[from] TokenizerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid model settings: {0}")]
    Settings(#[from] SettingsError),
}

impl From<ToolError> for AgentError {
    /// Backend failures inside a tool are reported as backend failures.
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::Llm(e) => AgentError::Backend(e),
            other => AgentError::Tool(other),
        }
    }
}
