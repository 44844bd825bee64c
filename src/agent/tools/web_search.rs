use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Tool, ToolContext, ToolFuture, ToolResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>>;
}

/// Serper's Google search API.
pub struct SerperSearch {
    base_url: String,
    api_key: String,
    num: usize,
    http: reqwest::Client,
}

impl SerperSearch {
    pub fn new(base_url: &str, api_key: &str, num: usize) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(std::time::Duration::from_secs(30)).build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), api_key: api_key.to_string(), num, http })
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl WebSearch for SerperSearch {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>> {
        let resp = self
            .http
            .post(format!("{}/search", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&serde_json::json!({ "q": query, "num": self.num }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            match status.as_u16() {
                401 | 403 => anyhow::bail!("search failed: invalid API key ({})", status),
                429 => anyhow::bail!("search failed: rate limit exceeded ({})", status),
                _ => anyhow::bail!("search failed: {}", status),
            }
        }
        let v: SerperResponse = resp.json().await?;
        Ok(v.organic
            .into_iter()
            .take(self.num)
            .map(|o| SearchHit { title: o.title, url: o.link, snippet: o.snippet })
            .collect())
    }
}

pub struct WebSearchTool {
    backend: Arc<dyn WebSearch>,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn WebSearch>) -> Self { Self { backend } }
}

pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, h)| format!("{}. {}\nURL: {}\n{}", i + 1, h.title, h.url, h.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl Tool for WebSearchTool {
    fn name(&self) -> &'static str { "web_search" }

    fn description(&self) -> &str { "Search the web for current information with sources" }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "query": { "type": "string", "description": "The search query" } },
            "required": ["query"]
        })
    }

    fn run<'a>(&'a self, ctx: ToolContext<'a>, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let query = args.get("query").and_then(|v| v.as_str()).ok_or_else(|| anyhow::anyhow!("missing query"))?;
            tracing::debug!(call_id = ctx.call_id, %query, "web search");
            let hits = self.backend.search(query).await?;
            if hits.is_empty() {
                return Ok(ToolResult { summary: format!("search:{} hits:0", query), output: format!("No results found for: {}", query) });
            }
            Ok(ToolResult { summary: format!("search:{} hits:{}", query, hits.len()), output: format_hits(&hits) })
        })
    }
}
