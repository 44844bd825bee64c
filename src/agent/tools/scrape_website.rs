use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;

use super::{Tool, ToolContext, ToolFuture, ToolResult};

#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn scrape(&self, url: &str) -> anyhow::Result<String>;
}

/// `None` allows every host; otherwise the host or one of its parents must be listed.
pub fn is_allowed_host(allowlist: &Option<Vec<String>>, host: &str) -> bool {
    let Some(list) = allowlist else { return true };
    let host = host.to_ascii_lowercase();
    list.iter().any(|entry| {
        let entry = entry.trim().to_ascii_lowercase();
        host == entry || host.ends_with(&format!(".{}", entry))
    })
}

pub struct HttpScraper {
    max_chars: usize,
    allowlist: Option<Vec<String>>,
    http: reqwest::Client,
}

impl HttpScraper {
    pub fn new(max_chars: usize, allowlist: Option<Vec<String>>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; research_chat/0.1)")
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { max_chars, allowlist, http })
    }
}

#[async_trait]
impl PageScraper for HttpScraper {
    async fn scrape(&self, url: &str) -> anyhow::Result<String> {
        let parsed = url::Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("unsupported scheme: {}", parsed.scheme());
        }
        let host = parsed.host_str().ok_or_else(|| anyhow::anyhow!("invalid host"))?;
        if !is_allowed_host(&self.allowlist, host) {
            anyhow::bail!("host not allowlisted: {}", host);
        }
        let resp = self.http.get(parsed.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("fetch failed: {}", status);
        }
        let is_html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);
        let body = resp.text().await?;
        let text = if is_html { extract_text(&body) } else { collapse_whitespace(&body) };
        Ok(truncate_chars(&text, self.max_chars))
    }
}

/// Visible text of an HTML document: title plus body text, scripts and styles dropped.
pub fn extract_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut parts = Vec::new();
    if let Ok(sel) = Selector::parse("title") {
        if let Some(t) = doc.select(&sel).next() {
            let title = collapse_whitespace(&t.text().collect::<String>());
            if !title.is_empty() {
                parts.push(title);
            }
        }
    }
    let root = Selector::parse("body").ok().and_then(|sel| doc.select(&sel).next()).unwrap_or_else(|| doc.root_element());
    let mut body = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| matches!(e.name(), "script" | "style" | "noscript" | "template" | "head"))
                .unwrap_or(false)
        });
        if !hidden {
            body.push_str(text);
            body.push(' ');
        }
    }
    let body = collapse_whitespace(&body);
    if !body.is_empty() {
        parts.push(body);
    }
    parts.join("\n\n")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}... [content truncated at {} chars]", &s[..idx], max),
        None => s.to_string(),
    }
}

pub struct ScrapeWebsiteTool {
    backend: Arc<dyn PageScraper>,
}

impl ScrapeWebsiteTool {
    pub fn new(backend: Arc<dyn PageScraper>) -> Self { Self { backend } }
}

impl Tool for ScrapeWebsiteTool {
    fn name(&self) -> &'static str { "scrape_website" }

    fn description(&self) -> &str { "Extract detailed content from websites" }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "url": { "type": "string", "description": "Absolute http(s) URL of the page to read" } },
            "required": ["url"]
        })
    }

    fn run<'a>(&'a self, ctx: ToolContext<'a>, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let url = args.get("url").and_then(|v| v.as_str()).ok_or_else(|| anyhow::anyhow!("missing url"))?;
            tracing::debug!(call_id = ctx.call_id, %url, "scrape website");
            let content = self.backend.scrape(url).await?;
            Ok(ToolResult { summary: format!("url:{} chars:{}", url, content.chars().count()), output: content })
        })
    }
}
