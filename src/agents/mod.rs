//! Agents module - the goal-to-tasks loop.
//!
//! # Steps
//! - **start**: break a goal into tasks
//! - **analyze**: pick a tool for one task
//! - **execute**: run the tool and stream its result
//! - **create**: propose at most one follow-up task
//! - **summarize**: condense all results
//! - **chat**: answer questions over the results
//!
//! The caller drives the loop; each step is a separate request carrying the
//! outputs of the previous one. Loop limits are enforced by the run store.

mod error;
mod mock;
pub mod model_factory;
pub mod parser;
pub mod prompts;
pub mod rate_limit;
mod service;
pub mod types;

pub use error::AgentError;
pub use mock::MockAgentService;
pub use service::{AgentService, OpenAiAgentService};

use std::sync::Arc;

use crate::accounts::AccountAccessor;
use crate::config::Config;
use crate::tokenizer::TokenService;
use types::{ModelSettings, UserBase};

/// Agent for one caller request: canned in mock mode, backend-driven otherwise.
pub fn create_agent_service(
    config: Arc<Config>,
    settings: &ModelSettings,
    user: &UserBase,
    streaming: bool,
    accounts: Arc<dyn AccountAccessor>,
    tokens: TokenService,
) -> Arc<dyn AgentService> {
    if config.mock_mode {
        tracing::debug!("Mock mode enabled, using canned agent");
        return Arc::new(MockAgentService::new());
    }

    let model = model_factory::create_model(&config, settings, user, streaming, None);
    Arc::new(OpenAiAgentService::new(
        model,
        settings.clone(),
        tokens,
        user.clone(),
        accounts,
        config,
    ))
}
