//! Personal knowledge search over the caller's connected documents
//! (Notion, Drive, email) through the SID API.

use serde::{Deserialize, Serialize};

use super::summarize::{summarize_personal, Snippet};
use super::{search, ToolContext, ToolError};
use crate::accounts::SID_PROVIDER;
use crate::llm::TextStream;

/// Snippets requested per query.
const RESULT_LIMIT: u32 = 10;

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    limit: u32,
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    text: String,
}

pub(super) async fn call(
    ctx: &ToolContext,
    goal: &str,
    task: &str,
    arg: &str,
) -> Result<TextStream, ToolError> {
    match run_sid(ctx, goal, task, arg).await? {
        Some(stream) => Ok(stream),
        None => search::call(ctx, goal, task, arg).await,
    }
}

/// `Ok(None)` when there is no linked account, no token or nothing found.
async fn run_sid(
    ctx: &ToolContext,
    goal: &str,
    task: &str,
    query: &str,
) -> Result<Option<TextStream>, ToolError> {
    let user_id = &ctx.user.id;
    let installation = match ctx.accounts.installation(user_id, SID_PROVIDER).await {
        Ok(Some(installation)) => installation,
        Ok(None) => {
            tracing::warn!("No sid installation found for user {}", user_id);
            return Ok(None);
        }
        Err(e) => {
            tracing::warn!("Could not look up sid installation for {}: {}", user_id, e);
            return Ok(None);
        }
    };

    let token = match ctx.accounts.access_token(&installation).await {
        Ok(Some(token)) => token,
        Ok(None) => {
            tracing::warn!("Unable to fetch sid access token for {}", user_id);
            return Ok(None);
        }
        Err(e) => {
            tracing::warn!("Sid token lookup failed for {}: {}", user_id, e);
            return Ok(None);
        }
    };

    let snippets = match query_snippets(ctx, &token, query).await {
        Ok(snippets) => snippets,
        Err(e) => {
            tracing::error!("Sid search failed: {}", e);
            return Ok(None);
        }
    };
    if snippets.is_empty() {
        return Ok(None);
    }

    let stream =
        summarize_personal(&ctx.model, &ctx.tokens, &ctx.language, goal, task, &snippets).await?;
    Ok(Some(stream))
}

async fn query_snippets(
    ctx: &ToolContext,
    token: &str,
    query: &str,
) -> Result<Vec<Snippet>, ToolError> {
    let url = format!(
        "{}/v1/users/me/query",
        ctx.config.sid_api_base.trim_end_matches('/')
    );
    let response = ctx
        .http
        .post(url)
        .bearer_auth(token)
        .json(&QueryRequest {
            query,
            limit: RESULT_LIMIT,
        })
        .send()
        .await
        .map_err(|e| ToolError::request("sid", e))?;

    if !response.status().is_success() {
        return Err(ToolError::request(
            "sid",
            format!("Sid API error ({})", response.status()),
        ));
    }

    let body: QueryResponse = response
        .json()
        .await
        .map_err(|e| ToolError::request("sid", e))?;
    Ok(body
        .results
        .into_iter()
        .filter(|r| !r.text.trim().is_empty())
        .map(|r| Snippet::new(r.text))
        .collect())
}
