//! Scripted in-process backend for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    stream_string, ChatRequest, ChatResponse, FunctionCall, LlmClient, LlmError, TextStream,
};

/// Replies from a queue, then with `fallback_text`; records every request.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    fallback_text: String,
}

impl ScriptedClient {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            fallback_text: fallback_text.into(),
        }
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push(Ok(ChatResponse {
            content: Some(text.into()),
            ..Default::default()
        }));
    }

    pub fn push_function_call(&self, name: &str, arguments: &str) {
        self.push(Ok(ChatResponse {
            function_call: Some(FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            }),
            finish_reason: Some("function_call".to_string()),
            ..Default::default()
        }));
    }

    pub fn push(&self, reply: Result<ChatResponse, LlmError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ChatResponse {
                    content: Some(self.fallback_text.clone()),
                    ..Default::default()
                })
            })
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.next_reply(request)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let reply = self.next_reply(request)?;
        Ok(stream_string(reply.content.unwrap_or_default()))
    }
}
