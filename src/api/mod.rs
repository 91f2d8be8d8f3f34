//! HTTP API for the agent loop.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `GET /api/models` - Supported models and their context sizes
//! - `GET /api/agent/tools` - Optional tools and whether the caller can use them
//! - `POST /api/agent/start` - Create a run and the initial task list
//! - `POST /api/agent/analyze` - Pick a tool for a task
//! - `POST /api/agent/execute` - Run a task (SSE)
//! - `POST /api/agent/create` - Propose a follow-up task
//! - `POST /api/agent/summarize` - Summarize the run's results (SSE)
//! - `POST /api/agent/chat` - Ask about the run's results (SSE)
//!
//! Every agent step registers a task against its run first, so the per-run
//! loop limits apply before any model call is made.

mod auth;
mod error;
mod routes;
pub mod types;

pub use auth::{dev_user, issue_jwt};
pub use error::ApiError;
pub use routes::{router, serve, AppState};
pub use types::*;
