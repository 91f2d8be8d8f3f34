//! Model client module for talking to the remote language-model service.
//!
//! This module provides a trait-based abstraction over the backend, with an
//! OpenAI-compatible HTTP client (direct or Azure gateway) as the primary
//! implementation. Streamed completions are exposed as [`TextStream`]: a lazily
//! produced, finite sequence of text chunks. Dropping the stream aborts the
//! underlying request.

mod error;
mod openai;
#[cfg(test)]
pub(crate) mod testing;

pub use error::{classify_http_status, LlmError, LlmErrorKind, RetryConfig, MAX_RETRIES};
pub use openai::{Endpoint, OpenAiClient};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

/// A boxed stream of text chunks produced by a model or a tool.
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

/// Role in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Function definition offered to the model as a callable option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Function call chosen by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as a JSON string. May be empty for no-argument functions.
    #[serde(default)]
    pub arguments: String,
}

/// A fully specified completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub functions: Option<Vec<FunctionDefinition>>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Caller tag forwarded to the backend for abuse tracking.
    pub user: Option<String>,
}

/// Response from a non-streamed completion.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub function_call: Option<FunctionCall>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Token usage information (if provided by the backend).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Create a usage object ensuring `total_tokens` is consistent.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Trait for model backends.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a completion request and wait for the full answer.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Send a completion request and receive the answer chunk by chunk.
    ///
    /// Errors before the first chunk are returned directly; later failures
    /// surface as an `Err` item inside the stream.
    async fn stream(&self, request: &ChatRequest) -> Result<TextStream, LlmError>;
}

/// Turn static text into a [`TextStream`], one word (with its trailing whitespace) per chunk.
pub fn stream_string(text: impl Into<String>) -> TextStream {
    let text = text.into();
    let chunks: Vec<Result<String, LlmError>> = text
        .split_inclusive(char::is_whitespace)
        .map(|chunk| Ok(chunk.to_string()))
        .collect();
    stream::iter(chunks).boxed()
}

/// Drain a [`TextStream`] into a single string.
pub async fn collect_stream(mut stream: TextStream) -> Result<String, LlmError> {
    let mut out = String::new();
    while let Some(chunk) = stream.next().await {
        out.push_str(&chunk?);
    }
    Ok(out)
}
