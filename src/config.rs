//! Configuration management for autotask.
//!
//! Configuration is read once from environment variables (all prefixed with
//! `AUTOTASK_`) and then passed around explicitly as an `Arc<Config>`:
//! - `AUTOTASK_OPENAI_API_KEY` - Required. Key for the model backend.
//! - `AUTOTASK_OPENAI_API_BASE` - Optional. Defaults to `https://api.openai.com/v1`.
//!   A base containing `azure` selects the Azure gateway variant.
//! - `AUTOTASK_OPENAI_API_VERSION` - Optional. Azure API version.
//! - `AUTOTASK_HELICONE_API_BASE` / `AUTOTASK_HELICONE_API_KEY` - Optional. Observability proxy.
//! - `AUTOTASK_SERP_API_KEY` - Optional. Enables the web search tool.
//! - `AUTOTASK_SID_CLIENT_ID` / `_SECRET` / `_REDIRECT_URI` - Optional. Enables the
//!   personal knowledge search tool.
//! - `AUTOTASK_MAX_LOOPS` - Optional. Per-run limit for each step type. Defaults to `25`.
//! - `AUTOTASK_MOCK_MODE` - Optional. Serve canned responses without calling the backend.
//! - `AUTOTASK_DATABASE_PATH` - Optional. SQLite file for runs; in-memory when unset.
//! - `AUTOTASK_HOST` / `AUTOTASK_PORT` - Optional. Defaults to `127.0.0.1:8000`.
//! - `AUTOTASK_DEV_MODE` - Optional. Disables JWT checks. Defaults to `true`.
//! - `AUTOTASK_JWT_SECRET` - Required when dev mode is off.

use std::path::PathBuf;
use thiserror::Error;

use crate::util::env_var_bool;

pub const ENV_PREFIX: &str = "AUTOTASK_";

const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_API_VERSION: &str = "2023-08-01-preview";
const DEFAULT_HELICONE_API_BASE: &str = "https://oai.hconeai.com/v1";
const DEFAULT_SID_API_BASE: &str = "https://api.sid.ai";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Skip caller authentication and use a fixed development identity
    pub dev_mode: bool,

    /// HS256 secret used to verify caller tokens
    pub jwt_secret: Option<String>,

    /// Model backend endpoint
    pub openai_api_base: String,

    /// Model backend key (used unless the caller supplies their own)
    pub openai_api_key: String,

    /// API version sent to the Azure gateway
    pub openai_api_version: String,

    /// Helicone proxy endpoint
    pub helicone_api_base: String,

    /// Helicone key; routing through the proxy is enabled when set
    pub helicone_api_key: Option<String>,

    /// Serper key for the web search tool
    pub serp_api_key: Option<String>,

    pub sid_client_id: Option<String>,
    pub sid_client_secret: Option<String>,
    pub sid_redirect_uri: Option<String>,

    /// Knowledge-search backend endpoint
    pub sid_api_base: String,

    /// Maximum number of tasks of one step type per run
    pub max_loops: u32,

    /// Serve canned agent responses instead of calling the backend
    pub mock_mode: bool,

    /// SQLite database for runs and tasks (in-memory store when `None`)
    pub database_path: Option<PathBuf>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            ConfigError::InvalidValue(format!("{}{}", ENV_PREFIX, name), e.to_string())
        }),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if the backend key is not set, or if
    /// dev mode is off and no JWT secret is configured.
    pub fn from_env() -> Result<Self, ConfigError> {
        let openai_api_key = var("OPENAI_API_KEY").ok_or_else(|| {
            ConfigError::MissingEnvVar(format!("{}OPENAI_API_KEY", ENV_PREFIX))
        })?;

        let dev_mode = env_var_bool(&format!("{}DEV_MODE", ENV_PREFIX), true);
        let jwt_secret = var("JWT_SECRET");
        if !dev_mode && jwt_secret.is_none() {
            return Err(ConfigError::MissingEnvVar(format!(
                "{}JWT_SECRET",
                ENV_PREFIX
            )));
        }

        let max_loops: u32 = parse_var("MAX_LOOPS", 25)?;
        if max_loops == 0 {
            return Err(ConfigError::InvalidValue(
                format!("{}MAX_LOOPS", ENV_PREFIX),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_var("PORT", 8000)?,
            dev_mode,
            jwt_secret,
            openai_api_base: var("OPENAI_API_BASE")
                .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string()),
            openai_api_key,
            openai_api_version: var("OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_OPENAI_API_VERSION.to_string()),
            helicone_api_base: var("HELICONE_API_BASE")
                .unwrap_or_else(|| DEFAULT_HELICONE_API_BASE.to_string()),
            helicone_api_key: var("HELICONE_API_KEY"),
            serp_api_key: var("SERP_API_KEY"),
            sid_client_id: var("SID_CLIENT_ID"),
            sid_client_secret: var("SID_CLIENT_SECRET"),
            sid_redirect_uri: var("SID_REDIRECT_URI"),
            sid_api_base: var("SID_API_BASE").unwrap_or_else(|| DEFAULT_SID_API_BASE.to_string()),
            max_loops,
            mock_mode: env_var_bool(&format!("{}MOCK_MODE", ENV_PREFIX), false),
            database_path: var("DATABASE_PATH").map(PathBuf::from),
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(openai_api_key: impl Into<String>, openai_api_base: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            dev_mode: true,
            jwt_secret: None,
            openai_api_base: openai_api_base.into(),
            openai_api_key: openai_api_key.into(),
            openai_api_version: DEFAULT_OPENAI_API_VERSION.to_string(),
            helicone_api_base: DEFAULT_HELICONE_API_BASE.to_string(),
            helicone_api_key: None,
            serp_api_key: None,
            sid_client_id: None,
            sid_client_secret: None,
            sid_redirect_uri: None,
            sid_api_base: DEFAULT_SID_API_BASE.to_string(),
            max_loops: 25,
            mock_mode: false,
            database_path: None,
        }
    }

    /// Whether model traffic is routed through the Helicone proxy.
    pub fn helicone_enabled(&self) -> bool {
        !self.helicone_api_base.is_empty() && self.helicone_api_key.is_some()
    }

    /// Whether the personal knowledge search integration is configured.
    pub fn sid_enabled(&self) -> bool {
        self.sid_client_id.is_some()
            && self.sid_client_secret.is_some()
            && self.sid_redirect_uri.is_some()
    }

    /// Whether the configured base endpoint is an Azure OpenAI gateway.
    pub fn uses_azure(&self) -> bool {
        self.openai_api_base.contains("azure")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_predicates() {
        let mut config = Config::new("sk-test", "https://api.openai.com/v1");
        assert!(!config.helicone_enabled());
        assert!(!config.sid_enabled());
        assert!(!config.uses_azure());

        config.helicone_api_key = Some("hk".to_string());
        config.sid_client_id = Some("id".to_string());
        config.sid_client_secret = Some("secret".to_string());
        assert!(config.helicone_enabled());
        assert!(!config.sid_enabled());

        config.sid_redirect_uri = Some("https://example.com/cb".to_string());
        config.openai_api_base = "https://acme.openai.azure.com/v1".to_string();
        assert!(config.sid_enabled());
        assert!(config.uses_azure());
    }
}
