//! Builds configured model handles from service config and caller settings.

use std::sync::Arc;

use crate::agents::types::{LlmModel, ModelSettings, UserBase};
use crate::config::Config;
use crate::llm::{
    ChatMessage, ChatRequest, ChatResponse, Endpoint, FunctionDefinition, LlmClient, LlmError,
    OpenAiClient, TextStream,
};
use crate::tokenizer::{ModelDescriptor, TokenService};
use crate::util::timed;

/// Endpoint used for caller-supplied keys, which never go through the gateway or proxy.
pub const OPENAI_DIRECT_BASE: &str = "https://api.openai.com/v1";

/// A ready-to-call model: identity, sampling parameters and a backend client.
///
/// `max_tokens` is the completion budget. It starts at the model's context
/// size and is narrowed per request by the token service.
#[derive(Clone)]
pub struct ChatModel {
    pub model: LlmModel,
    pub temperature: f64,
    pub max_tokens: u32,
    pub streaming: bool,
    /// Caller tag forwarded to the backend.
    pub user: Option<String>,
    client: Arc<dyn LlmClient>,
}

impl std::fmt::Debug for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatModel")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("streaming", &self.streaming)
            .finish_non_exhaustive()
    }
}

impl ChatModel {
    pub fn new(client: Arc<dyn LlmClient>, settings: &ModelSettings, user: &UserBase) -> Self {
        Self {
            model: settings.model,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            streaming: false,
            user: user.email.clone(),
            client,
        }
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Same backend, another model, with that model's full context as budget.
    pub fn with_model(mut self, model: LlmModel) -> Self {
        self.model = model;
        self.max_tokens = model.max_tokens();
        self
    }

    /// Copy of this handle with its completion budget fitted to `prompt_parts`.
    pub fn budgeted(&self, tokens: &TokenService, prompt_parts: &[&str]) -> Self {
        let mut model = self.clone();
        tokens.calculate_max_tokens(&mut model, prompt_parts);
        model
    }

    pub fn request(
        &self,
        messages: Vec<ChatMessage>,
        functions: Option<Vec<FunctionDefinition>>,
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.as_str().to_string(),
            messages,
            functions,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            user: self.user.clone(),
        }
    }

    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        functions: Option<Vec<FunctionDefinition>>,
    ) -> Result<ChatResponse, LlmError> {
        let request = self.request(messages, functions);
        let (result, _) = timed(
            &format!("{} completion", self.model),
            self.client.complete(&request),
        )
        .await;
        result
    }

    /// Completion as a chunk stream. Non-streaming handles fetch the whole
    /// answer and replay it word by word.
    pub async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TextStream, LlmError> {
        if !self.streaming {
            let response = self.complete(messages, None).await?;
            return Ok(crate::llm::stream_string(response.content.unwrap_or_default()));
        }
        let request = self.request(messages, None);
        let (result, _) = timed(
            &format!("{} stream open", self.model),
            self.client.stream(&request),
        )
        .await;
        result
    }
}

impl ModelDescriptor for ChatModel {
    fn context_size(&self) -> u32 {
        self.model.max_tokens()
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn set_max_tokens(&mut self, max_tokens: u32) {
        self.max_tokens = max_tokens;
    }
}

/// Build a model handle. No network traffic happens here.
///
/// `force_model` takes precedence over the caller's chosen model.
pub fn create_model(
    config: &Config,
    settings: &ModelSettings,
    user: &UserBase,
    streaming: bool,
    force_model: Option<LlmModel>,
) -> ChatModel {
    let (endpoint, headers) = endpoint_and_headers(config, settings, user);
    tracing::debug!(
        endpoint = ?endpoint,
        model = %force_model.unwrap_or(settings.model),
        streaming,
        "Creating model client"
    );
    let client: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(endpoint, headers));
    create_model_with_client(client, settings, user, streaming, force_model)
}

/// Same as [`create_model`] over an existing backend client.
pub fn create_model_with_client(
    client: Arc<dyn LlmClient>,
    settings: &ModelSettings,
    user: &UserBase,
    streaming: bool,
    force_model: Option<LlmModel>,
) -> ChatModel {
    let model = ChatModel::new(client, settings, user).with_streaming(streaming);
    match force_model {
        Some(forced) => model.with_model(forced),
        None => model,
    }
}

/// Backend base URL plus proxy headers for the direct variant.
///
/// Traffic goes through the Helicone proxy only when it is configured and
/// the caller did not bring their own key; custom keys always go straight
/// to OpenAI.
pub fn base_and_headers(
    config: &Config,
    settings: &ModelSettings,
    user: &UserBase,
) -> (String, Vec<(String, String)>) {
    let use_helicone = config.helicone_enabled() && settings.custom_api_key.is_none();
    let base = if use_helicone {
        config.helicone_api_base.clone()
    } else if settings.custom_api_key.is_some() {
        OPENAI_DIRECT_BASE.to_string()
    } else {
        config.openai_api_base.clone()
    };

    let headers = if use_helicone {
        helicone_headers(config, user)
    } else {
        Vec::new()
    };
    (base, headers)
}

fn helicone_headers(config: &Config, user: &UserBase) -> Vec<(String, String)> {
    vec![
        (
            "Helicone-Auth".to_string(),
            format!("Bearer {}", config.helicone_api_key.as_deref().unwrap_or_default()),
        ),
        ("Helicone-Cache-Enabled".to_string(), "true".to_string()),
        ("Helicone-User-Id".to_string(), user.id.clone()),
        (
            "Helicone-OpenAI-Api-Base".to_string(),
            config.openai_api_base.clone(),
        ),
    ]
}

/// Azure gateway when no custom key is present and the base says so; direct otherwise.
fn endpoint_and_headers(
    config: &Config,
    settings: &ModelSettings,
    user: &UserBase,
) -> (Endpoint, Vec<(String, String)>) {
    let mut headers = Vec::new();

    if settings.custom_api_key.is_none() && config.uses_azure() {
        let base = config
            .openai_api_base
            .trim_end_matches('/')
            .trim_end_matches("v1")
            .trim_end_matches('/')
            .to_string();
        headers.push(("api-key".to_string(), config.openai_api_key.clone()));
        push_identity_headers(&mut headers, &config.openai_api_key, user);
        if config.helicone_enabled() {
            headers.extend(helicone_headers(config, user));
        }
        let endpoint = Endpoint::Azure {
            base,
            api_version: config.openai_api_version.clone(),
        };
        return (endpoint, headers);
    }

    let (base, proxy_headers) = base_and_headers(config, settings, user);
    let key = settings
        .custom_api_key
        .as_deref()
        .unwrap_or(&config.openai_api_key);
    push_identity_headers(&mut headers, key, user);
    headers.extend(proxy_headers);
    (Endpoint::Direct { base }, headers)
}

fn push_identity_headers(headers: &mut Vec<(String, String)>, key: &str, user: &UserBase) {
    headers.push(("Authorization".to_string(), format!("Bearer {}", key)));
    if let Some(email) = &user.email {
        headers.push(("User-Email".to_string(), email.clone()));
    }
}
