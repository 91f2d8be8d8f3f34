//! OpenAI-compatible API client with automatic retry for transient errors.
//!
//! Talks either to an OpenAI-style endpoint directly or to an Azure OpenAI
//! deployment; the difference is confined to URL construction and headers.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

use super::error::{LlmError, RetryConfig};
use super::{
    ChatMessage, ChatRequest, ChatResponse, FunctionCall, FunctionDefinition, LlmClient,
    TextStream, TokenUsage,
};

/// Where completion requests are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `{base}/chat/completions`
    Direct { base: String },
    /// `{base}/openai/deployments/{deployment}/chat/completions?api-version={api_version}`
    Azure { base: String, api_version: String },
}

impl Endpoint {
    /// Full completion URL for the given model id.
    pub fn completions_url(&self, model: &str) -> String {
        match self {
            Endpoint::Direct { base } => {
                format!("{}/chat/completions", base.trim_end_matches('/'))
            }
            Endpoint::Azure { base, api_version } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base.trim_end_matches('/'),
                azure_deployment_name(model),
                api_version
            ),
        }
    }
}

/// Azure deployment names cannot contain dots (`gpt-3.5-turbo` -> `gpt-35-turbo`).
pub fn azure_deployment_name(model: &str) -> String {
    model.replace('.', "")
}

/// OpenAI-compatible client with automatic retry for transient errors.
pub struct OpenAiClient {
    client: Client,
    endpoint: Endpoint,
    headers: Vec<(String, String)>,
    retry_config: RetryConfig,
}

impl OpenAiClient {
    /// Create a new client with default retry configuration.
    pub fn new(endpoint: Endpoint, headers: Vec<(String, String)>) -> Self {
        Self::with_retry_config(endpoint, headers, RetryConfig::default())
    }

    /// Create a new client with custom retry configuration.
    pub fn with_retry_config(
        endpoint: Endpoint,
        headers: Vec<(String, String)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            headers,
            retry_config,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    /// Parse Retry-After header if present.
    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    fn map_send_error(e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::network_error(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            LlmError::network_error(format!("Connection failed: {}", e))
        } else {
            LlmError::network_error(format!("Request failed: {}", e))
        }
    }

    fn request_builder(&self, body: &WireRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(self.endpoint.completions_url(&body.model))
            .header("Content-Type", "application/json");
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.json(body)
    }

    /// Execute a single non-streamed request without retry.
    async fn execute_request(&self, body: &WireRequest) -> Result<ChatResponse, LlmError> {
        let response = self
            .request_builder(body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), &text, retry_after));
        }

        let parsed: WireResponse = serde_json::from_str(&text).map_err(|e| {
            LlmError::parse_error(format!("Failed to parse response: {}, body: {}", e, text))
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::parse_error("No choices in response".to_string()))?;

        Ok(ChatResponse {
            content: choice.message.content,
            function_call: choice.message.function_call,
            finish_reason: choice.finish_reason,
            usage: parsed
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
        })
    }

    /// Open an event stream and wait for the backend to accept it.
    async fn open_stream(&self, body: &WireRequest) -> Result<EventSource, LlmError> {
        let mut source = self
            .request_builder(body)
            .eventsource()
            .map_err(|e| LlmError::network_error(format!("Cannot build stream request: {}", e)))?;
        // Reconnecting would replay the whole completion; retries happen here instead.
        source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        match source.next().await {
            Some(Ok(Event::Open)) => Ok(source),
            Some(Ok(Event::Message(_))) => Err(LlmError::parse_error(
                "Backend sent data before opening the stream".to_string(),
            )),
            Some(Err(e)) => {
                source.close();
                Err(Self::map_stream_error(e).await)
            }
            None => Err(LlmError::network_error(
                "Stream closed before it was opened".to_string(),
            )),
        }
    }

    async fn map_stream_error(error: reqwest_eventsource::Error) -> LlmError {
        match error {
            reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
                let retry_after = Self::parse_retry_after(response.headers());
                let body = response.text().await.unwrap_or_default();
                LlmError::from_status(status.as_u16(), &body, retry_after)
            }
            reqwest_eventsource::Error::Transport(e) => Self::map_send_error(e),
            other => LlmError::network_error(other.to_string()),
        }
    }

    /// Run `op` with automatic retry for transient errors.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(
                            "Request succeeded after {} retries (total time: {:?})",
                            attempt,
                            start.elapsed()
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !self.retry_config.should_retry(&error, attempt) {
                        if attempt > 0 {
                            tracing::error!(
                                "Request failed after {} retries (total time: {:?}): {}",
                                attempt,
                                start.elapsed(),
                                error
                            );
                        } else {
                            tracing::error!("Request failed (non-retryable): {}", error);
                        }
                        return Err(error);
                    }

                    let remaining = self
                        .retry_config
                        .max_retry_duration
                        .saturating_sub(start.elapsed());
                    let delay = error.suggested_delay(attempt).min(remaining);
                    if delay.is_zero() {
                        tracing::warn!(
                            "Retry attempt {} failed, no time remaining: {}",
                            attempt + 1,
                            error
                        );
                        return Err(error);
                    }

                    tracing::warn!(
                        "Retry attempt {} failed with {}, retrying in {:?}: {}",
                        attempt + 1,
                        error.kind,
                        delay,
                        error.message
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = WireRequest::from_request(request, false);
        tracing::debug!("Sending completion request: model={}", body.model);
        self.with_retry(|| self.execute_request(&body)).await
    }

    async fn stream(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let body = WireRequest::from_request(request, true);
        tracing::debug!("Opening completion stream: model={}", body.model);
        let mut source = self.with_retry(|| self.open_stream(&body)).await?;

        let stream = async_stream::stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => continue,
                    Ok(Event::Message(message)) => {
                        if message.data.trim() == "[DONE]" {
                            break;
                        }
                        match serde_json::from_str::<WireStreamChunk>(&message.data) {
                            Ok(chunk) => {
                                if let Some(text) = chunk.into_text() {
                                    yield Ok(text);
                                }
                            }
                            Err(e) => {
                                yield Err(LlmError::parse_error(format!(
                                    "Failed to parse stream chunk: {}, data: {}",
                                    e, message.data
                                )));
                                break;
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        yield Err(LlmError::network_error(format!("Stream interrupted: {}", e)));
                        break;
                    }
                }
            }
            source.close();
        };

        Ok(stream.boxed())
    }
}

/// OpenAI chat completion request format.
#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<Vec<FunctionDefinition>>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    stream: bool,
}

impl WireRequest {
    fn from_request(request: &ChatRequest, stream: bool) -> Self {
        Self {
            model: request.model.clone(),
            messages: request.messages.clone(),
            functions: request.functions.clone().filter(|f| !f.is_empty()),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            user: request.user.clone(),
            stream,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    #[serde(default)]
    delta: WireDelta,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

impl WireStreamChunk {
    fn into_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|t| !t.is_empty())
    }
}
