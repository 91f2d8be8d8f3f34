//! Wikipedia lookups: page intros for the best matching articles.

use std::collections::HashMap;

use serde::Deserialize;

use super::{search, ToolContext, ToolError};
use crate::llm::{stream_string, TextStream};

const WIKIPEDIA_API: &str = "https://en.wikipedia.org/w/api.php";

/// Pages returned per query.
const TOP_K_RESULTS: usize = 3;

/// Intro text per page, in characters.
const MAX_EXTRACT_CHARS: usize = 4000;

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    query: Option<QueryPages>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: HashMap<String, Page>,
}

#[derive(Debug, Clone, Deserialize)]
struct Page {
    title: String,
    /// Rank in the search results.
    #[serde(default)]
    index: u32,
    #[serde(default)]
    extract: String,
}

pub(super) async fn call(
    ctx: &ToolContext,
    goal: &str,
    task: &str,
    arg: &str,
) -> Result<TextStream, ToolError> {
    match lookup(&ctx.http, arg).await {
        Ok(Some(text)) => Ok(stream_string(text)),
        Ok(None) => {
            tracing::info!("No Wikipedia pages for '{}', searching the web", arg);
            search::call(ctx, goal, task, arg).await
        }
        Err(e) => {
            tracing::warn!("Wikipedia lookup failed, searching the web: {}", e);
            search::call(ctx, goal, task, arg).await
        }
    }
}

fn search_url(query: &str) -> String {
    format!(
        "{}?action=query&format=json&generator=search&gsrsearch={}&gsrlimit={}\
         &prop=extracts&exintro=1&explaintext=1&exlimit={}",
        WIKIPEDIA_API,
        urlencoding::encode(query),
        TOP_K_RESULTS,
        TOP_K_RESULTS
    )
}

async fn lookup(http: &reqwest::Client, query: &str) -> Result<Option<String>, ToolError> {
    let response = http
        .get(search_url(query))
        .send()
        .await
        .map_err(|e| ToolError::request("wikipedia", e))?;

    if !response.status().is_success() {
        return Err(ToolError::request(
            "wikipedia",
            format!("Wikipedia API error ({})", response.status()),
        ));
    }

    let body: QueryResponse = response
        .json()
        .await
        .map_err(|e| ToolError::request("wikipedia", e))?;
    Ok(format_pages(body))
}

/// `Page: <title>\nSummary: <intro>` blocks in search rank order.
fn format_pages(response: QueryResponse) -> Option<String> {
    let mut pages: Vec<Page> = response
        .query
        .map(|q| q.pages.into_values().collect())
        .unwrap_or_default();
    pages.sort_by_key(|p| p.index);

    let blocks: Vec<String> = pages
        .into_iter()
        .filter(|p| !p.extract.trim().is_empty())
        .map(|p| {
            format!(
                "Page: {}\nSummary: {}",
                p.title,
                crate::util::preview(p.extract.trim(), MAX_EXTRACT_CHARS)
            )
        })
        .collect();

    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_encodes_query() {
        let url = search_url("Nike & Adidas");
        assert!(url.starts_with(WIKIPEDIA_API));
        assert!(url.contains("gsrsearch=Nike%20%26%20Adidas"));
        assert!(url.contains("gsrlimit=3"));
    }

    #[test]
    fn test_pages_are_ranked() {
        let response: QueryResponse = serde_json::from_value(serde_json::json!({
            "query": {"pages": {
                "2": {"title": "Adidas", "index": 2, "extract": "German company."},
                "1": {"title": "Nike, Inc.", "index": 1, "extract": "American company."},
                "3": {"title": "Empty", "index": 3, "extract": "  "}
            }}
        }))
        .unwrap();
        assert_eq!(
            format_pages(response).unwrap(),
            "Page: Nike, Inc.\nSummary: American company.\n\nPage: Adidas\nSummary: German company."
        );
    }

    #[test]
    fn test_no_pages_is_none() {
        assert_eq!(format_pages(QueryResponse::default()), None);
        let response: QueryResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(format_pages(response), None);
    }
}
