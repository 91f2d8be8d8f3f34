//! Web search through the Serper Google Search API.
//!
//! A direct answer box is streamed back as-is; otherwise the top organic
//! results are summarised with citations. No key, a failed request or no
//! results all fall back to plain reasoning.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::summarize::{summarize_with_sources, CitedSnippet};
use super::{reason, ToolContext, ToolError};
use crate::llm::{stream_string, TextStream};

const SERPER_URL: &str = "https://google.serper.dev/search";

/// Organic results considered per query.
const MAX_RESULTS: usize = 5;

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct SerperResponse {
    #[serde(default, rename = "answerBox")]
    answer_box: Option<AnswerBox>,
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Default, Deserialize)]
struct AnswerBox {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

impl SerperResponse {
    /// Text of the answer box, if Google produced one.
    fn answer(&self) -> Option<&str> {
        let answer_box = self.answer_box.as_ref()?;
        answer_box
            .answer
            .as_deref()
            .or(answer_box.snippet.as_deref())
            .filter(|a| !a.trim().is_empty())
    }

    fn cited_snippets(&self) -> Vec<CitedSnippet> {
        self.organic
            .iter()
            .take(MAX_RESULTS)
            .enumerate()
            .filter_map(|(i, result)| {
                let mut texts: Vec<String> = result.snippet.iter().cloned().collect();
                texts.extend(
                    result
                        .attributes
                        .iter()
                        .map(|(key, value)| format!("{}: {}.", key, value)),
                );
                if texts.is_empty() {
                    return None;
                }
                Some(CitedSnippet::new(i + 1, texts.join("\n"), result.link.clone()))
            })
            .collect()
    }
}

pub(super) async fn call(
    ctx: &ToolContext,
    goal: &str,
    task: &str,
    arg: &str,
) -> Result<TextStream, ToolError> {
    match run_search(ctx, goal, arg).await? {
        Some(stream) => Ok(stream),
        None => {
            tracing::info!("Search produced nothing usable, reasoning instead");
            reason::call(ctx, goal, task).await
        }
    }
}

/// `Ok(None)` means "no result": the caller should fall back.
async fn run_search(
    ctx: &ToolContext,
    goal: &str,
    query: &str,
) -> Result<Option<TextStream>, ToolError> {
    let Some(api_key) = ctx.config.serp_api_key.as_deref() else {
        tracing::warn!("No search API key configured");
        return Ok(None);
    };

    let response = match fetch_results(&ctx.http, api_key, query).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Search request failed: {}", e);
            return Ok(None);
        }
    };

    if let Some(answer) = response.answer() {
        return Ok(Some(stream_string(answer)));
    }

    let snippets = response.cited_snippets();
    if snippets.is_empty() {
        return Ok(None);
    }
    let stream = summarize_with_sources(
        &ctx.model,
        &ctx.tokens,
        &ctx.language,
        goal,
        query,
        &snippets,
    )
    .await?;
    Ok(Some(stream))
}

async fn fetch_results(
    http: &reqwest::Client,
    api_key: &str,
    query: &str,
) -> Result<SerperResponse, ToolError> {
    let response = http
        .post(SERPER_URL)
        .header("X-API-KEY", api_key)
        .header("Content-Type", "application/json")
        .json(&SerperRequest { q: query })
        .send()
        .await
        .map_err(|e| ToolError::request("search", e))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ToolError::request(
            "search",
            format!("Serper API error ({}): {}", status, body),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| ToolError::request("search", e))
}
