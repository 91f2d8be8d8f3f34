//! Tools the agent can pick for a task.
//!
//! The set is closed: each tool is a [`Tool`] variant sharing one call
//! contract (goal, task, argument and a [`ToolContext`] in, text stream out).
//! Some tools fall back to another when they have nothing to offer:
//!
//! - `sid` -> `search` (no linked account, no token, backend failure, no snippets)
//! - `wikipedia` -> `search` (lookup failure or no pages)
//! - `search` -> `reason` (no API key, backend failure or no results)
//!
//! Availability is checked fresh on every call: statically against the
//! config, and for personal tools against the caller's linked accounts.

mod code;
mod reason;
mod search;
mod sid;
pub mod summarize;
mod wikipedia;

pub use summarize::{CitedSnippet, Snippet};

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::accounts::{AccountAccessor, SID_PROVIDER};
use crate::agents::model_factory::ChatModel;
use crate::agents::types::UserBase;
use crate::config::Config;
use crate::llm::{FunctionDefinition, LlmError, TextStream};
use crate::tokenizer::TokenService;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("{tool} request failed: {message}")]
    Request { tool: &'static str, message: String },
}

impl ToolError {
    pub(crate) fn request(tool: &'static str, message: impl ToString) -> Self {
        Self::Request {
            tool,
            message: message.to_string(),
        }
    }
}

/// Everything a tool may need besides its own arguments.
#[derive(Clone)]
pub struct ToolContext {
    pub model: ChatModel,
    pub tokens: TokenService,
    pub language: String,
    pub user: UserBase,
    pub accounts: Arc<dyn AccountAccessor>,
    pub config: Arc<Config>,
    pub http: reqwest::Client,
}

impl ToolContext {
    pub fn new(
        model: ChatModel,
        tokens: TokenService,
        language: impl Into<String>,
        user: UserBase,
        accounts: Arc<dyn AccountAccessor>,
        config: Arc<Config>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("autotask/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self {
            model,
            tokens,
            language: language.into(),
            user,
            accounts,
            config,
            http,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Tool {
    #[default]
    Reason,
    Code,
    Search,
    Wikipedia,
    Sid,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::Reason,
        Tool::Code,
        Tool::Search,
        Tool::Wikipedia,
        Tool::Sid,
    ];

    /// Identifier used in analyses and function definitions.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Reason => "reason",
            Tool::Code => "code",
            Tool::Search => "search",
            Tool::Wikipedia => "wikipedia",
            Tool::Sid => "sid",
        }
    }

    /// Description shown to the model.
    pub fn description(&self) -> &'static str {
        match self {
            Tool::Reason => {
                "Reason about task via existing information or understanding. Very strong and \
                 can do many things. Use when no other tool fits the task."
            }
            Tool::Code => {
                "Should only be used to write code, refactor code, fix code bugs, and explain \
                 programming concepts."
            }
            Tool::Search => {
                "Search Google for short up to date searches for simple questions about public \
                 information news and people."
            }
            Tool::Wikipedia => {
                "Search Wikipedia for information about historical people, companies, events, \
                 places or research. This should be used over search for broad overviews of \
                 specific nouns."
            }
            Tool::Sid => {
                "Find private information by searching through notion, email and google drive. \
                 Should be used when questions refer to personal information."
            }
        }
    }

    /// Description shown to people choosing tools.
    pub fn public_description(&self) -> &'static str {
        match self {
            Tool::Reason => "Reason about a task using the model's own knowledge.",
            Tool::Code => "Write and review code.",
            Tool::Search => "Search the web for up to date information.",
            Tool::Wikipedia => "Search Wikipedia for historical information.",
            Tool::Sid => "Grant access to your Notion, Google Drive, etc.",
        }
    }

    pub fn arg_description(&self) -> &'static str {
        match self {
            Tool::Reason => "Your reasoning about how to accomplish the task.",
            Tool::Code => "A detailed description of the code to write.",
            Tool::Search => {
                "The query argument to search for. This value is always populated and cannot be \
                 an empty string."
            }
            Tool::Wikipedia => "A simple query string of just the noun in question.",
            Tool::Sid => "The query to search for. It should be a question in natural language.",
        }
    }

    pub fn image_url(&self) -> &'static str {
        match self {
            Tool::Reason => "/tools/openai-white.png",
            Tool::Code => "/tools/openai-white.png",
            Tool::Search => "/tools/google.png",
            Tool::Wikipedia => "/tools/wikipedia.png",
            Tool::Sid => "/tools/sid.png",
        }
    }

    /// Whether the service config allows this tool at all.
    pub fn available(&self, config: &Config) -> bool {
        match self {
            Tool::Search => config.serp_api_key.is_some(),
            Tool::Sid => config.sid_enabled(),
            Tool::Reason | Tool::Code | Tool::Wikipedia => true,
        }
    }

    /// Whether this caller can use the tool right now.
    pub async fn dynamic_available(&self, user: &UserBase, accounts: &dyn AccountAccessor) -> bool {
        match self {
            Tool::Sid => match accounts.installation(&user.id, SID_PROVIDER).await {
                Ok(Some(installation)) => installation.access_token.is_some(),
                Ok(None) => false,
                Err(e) => {
                    tracing::warn!("Installation lookup failed for {}: {}", user.id, e);
                    false
                }
            },
            _ => true,
        }
    }

    /// The tool as a function the model can call with `reasoning` and `arg`.
    pub fn function_definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "reasoning": {
                        "type": "string",
                        "description": "Reasoning is how the task will be accomplished with the \
                                        current function. Detail your overall plan along with any \
                                        concerns you have. Ensure this reasoning value is in the \
                                        user defined language."
                    },
                    "arg": {
                        "type": "string",
                        "description": self.arg_description()
                    }
                },
                "required": ["reasoning", "arg"]
            }),
        }
    }

    /// Run the tool. Fallbacks happen inside; an error means the chain is exhausted.
    pub async fn call(
        &self,
        ctx: &ToolContext,
        goal: &str,
        task: &str,
        arg: &str,
    ) -> Result<TextStream, ToolError> {
        tracing::info!(tool = self.name(), "Running tool for task: {}", crate::util::preview(task, 80));
        match self {
            Tool::Reason => reason::call(ctx, goal, task).await,
            Tool::Code => code::call(ctx, goal, task, arg).await,
            Tool::Search => search::call(ctx, goal, task, arg).await,
            Tool::Wikipedia => wikipedia::call(ctx, goal, task, arg).await,
            Tool::Sid => sid::call(ctx, goal, task, arg).await,
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Look up a tool by identifier. Unknown names resolve to the default tool.
pub fn get_tool_from_name(name: &str) -> Tool {
    Tool::ALL
        .into_iter()
        .find(|tool| tool.name() == name)
        .unwrap_or_else(get_default_tool)
}

pub fn get_default_tool() -> Tool {
    Tool::default()
}

/// Tools every caller gets without asking.
pub fn get_default_tools() -> Vec<Tool> {
    vec![Tool::Reason, Tool::Code]
}

/// Tools a caller can opt into.
pub fn get_external_tools() -> Vec<Tool> {
    vec![Tool::Search, Tool::Wikipedia, Tool::Sid]
}

/// Every tool the config allows.
pub fn get_available_tools(config: &Config) -> Vec<Tool> {
    get_external_tools()
        .into_iter()
        .chain(get_default_tools())
        .filter(|tool| tool.available(config))
        .collect()
}

/// The requested tools plus the defaults, without duplicates, limited to
/// those available to this caller. Order follows the request.
pub async fn get_user_tools(
    names: &[String],
    user: &UserBase,
    accounts: &dyn AccountAccessor,
    config: &Config,
) -> Vec<Tool> {
    let mut candidates: Vec<Tool> = Vec::new();
    for tool in names
        .iter()
        .map(|n| get_tool_from_name(n))
        .chain(get_default_tools())
    {
        if !candidates.contains(&tool) {
            candidates.push(tool);
        }
    }

    let mut tools = Vec::with_capacity(candidates.len());
    for tool in candidates {
        if tool.available(config) && tool.dynamic_available(user, accounts).await {
            tools.push(tool);
        }
    }
    tools
}
