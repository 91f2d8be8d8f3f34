//! Summaries over text snippets, streamed from the model.

use std::fmt;

use crate::agents::model_factory::ChatModel;
use crate::agents::prompts;
use crate::llm::{ChatMessage, LlmError, TextStream};
use crate::tokenizer::TokenService;

/// Uncited text fed to a summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub text: String,
}

impl Snippet {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// How the model sees the snippet.
impl fmt::Display for Snippet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{text: {}}}", self.text)
    }
}

/// Snippet with a 1-based citation index and source link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitedSnippet {
    pub index: usize,
    pub text: String,
    pub url: String,
}

impl CitedSnippet {
    pub fn new(index: usize, text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for CitedSnippet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{i: {}, text: {}, url: {}}}", self.index, self.text, self.url)
    }
}

/// Render snippets as a bracketed list.
pub fn render_snippets<T: fmt::Display>(snippets: &[T]) -> String {
    let items: Vec<String> = snippets.iter().map(ToString::to_string).collect();
    format!("[{}]", items.join(", "))
}

/// Stream `prompt` as a single user message with a budget fitted to it.
async fn stream_prompt(
    model: &ChatModel,
    tokens: &TokenService,
    prompt: String,
) -> Result<TextStream, LlmError> {
    let model = model.budgeted(tokens, &[&prompt]);
    model.stream(vec![ChatMessage::user(prompt)]).await
}

pub async fn summarize(
    model: &ChatModel,
    tokens: &TokenService,
    language: &str,
    goal: &str,
    text: &str,
) -> Result<TextStream, LlmError> {
    let prompt = prompts::summarize(goal, language, text);
    stream_prompt(model, tokens, prompt).await
}

pub async fn summarize_with_sources(
    model: &ChatModel,
    tokens: &TokenService,
    language: &str,
    goal: &str,
    query: &str,
    snippets: &[CitedSnippet],
) -> Result<TextStream, LlmError> {
    let prompt =
        prompts::summarize_with_sources(goal, language, query, &render_snippets(snippets));
    stream_prompt(model, tokens, prompt).await
}

/// Summary over the caller's own documents; no citations.
pub async fn summarize_personal(
    model: &ChatModel,
    tokens: &TokenService,
    language: &str,
    goal: &str,
    query: &str,
    snippets: &[Snippet],
) -> Result<TextStream, LlmError> {
    let prompt = prompts::summarize_personal(goal, language, query, &render_snippets(snippets));
    stream_prompt(model, tokens, prompt).await
}
