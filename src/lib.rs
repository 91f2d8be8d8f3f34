//! # autotask
//!
//! Goal-driven task agent backed by an OpenAI-compatible model service.
//!
//! This library provides:
//! - The agent loop: break a goal into tasks, pick a tool per task, run it,
//!   propose follow-ups, and summarize or chat over the results
//! - A closed set of tools with fallback chains (reasoning, code, web search,
//!   Wikipedia, personal knowledge search)
//! - Token budgeting so prompt plus completion fit the model's context
//! - An HTTP API with streamed results and per-run loop limits
//!
//! ## Loop
//!
//! ```text
//!   start ──▶ analyze ──▶ execute ──▶ create ─┐
//!               ▲                              │
//!               └──────────────────────────────┘
//!   summarize / chat at any point after execute
//! ```
//!
//! The caller drives every transition; the run store caps how many times
//! each step may be repeated for a run.
//!
//! ## Modules
//! - `agents`: the agent service, prompts, output parser and model factory
//! - `llm`: the model backend client and streaming types
//! - `tools`: tool registry and implementations
//! - `tokenizer`: token counting and budgeting
//! - `store`: runs and loop-limit bookkeeping
//! - `accounts`: linked external accounts used by personal tools
//! - `api`: HTTP surface

pub mod accounts;
pub mod agents;
pub mod api;
pub mod config;
pub mod llm;
pub mod store;
pub mod tokenizer;
pub mod tools;
pub mod util;

pub use config::Config;
