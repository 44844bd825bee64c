use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::InitializationError;
use crate::llm::ToolSchema;
use crate::settings::EffectiveSettings;

pub mod scrape_website;
pub mod web_search;

pub struct ToolContext<'a> {
    /// Id the model assigned to this call.
    pub call_id: &'a str,
}

pub struct ToolResult {
    pub summary: String,
    /// Text handed back to the model.
    pub output: String,
}

pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>>;

pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    fn run<'a>(&'a self, ctx: ToolContext<'a>, args: Value) -> ToolFuture<'a>;

    fn schema(&self) -> ToolSchema {
        ToolSchema { name: self.name().into(), description: self.description().into(), parameters: self.parameters() }
    }
}

/// Ordered set of tools an agent may call.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self { Self { tools: Vec::new() } }
    pub fn register(&mut self, t: Arc<dyn Tool>) { self.tools.push(t); }
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().map(|b| b.as_ref()).find(|t| t.name() == name)
    }
    pub fn len(&self) -> usize { self.tools.len() }
    pub fn is_empty(&self) -> bool { self.tools.is_empty() }
    pub fn names(&self) -> Vec<&'static str> { self.tools.iter().map(|t| t.name()).collect() }
    pub fn schemas(&self) -> Vec<ToolSchema> { self.tools.iter().map(|t| t.schema()).collect() }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Search first, then scrape.
pub fn build_tools(settings: &EffectiveSettings, search_key: Option<&str>) -> Result<ToolRegistry, InitializationError> {
    let api_key = search_key
        .filter(|k| !k.trim().is_empty())
        .ok_or(InitializationError::MissingCredential(crate::config::SEARCH_KEY_NAME))?;
    let search = web_search::SerperSearch::new(&settings.search_base_url, api_key, settings.max_search_results)
        .map_err(|e| InitializationError::Client { component: "tools", reason: e.to_string() })?;
    let scraper = scrape_website::HttpScraper::new(settings.max_scrape_chars, settings.scrape_allowlist.clone())
        .map_err(|e| InitializationError::Client { component: "tools", reason: e.to_string() })?;

    let mut r = ToolRegistry::new();
    r.register(Arc::new(web_search::WebSearchTool::new(Arc::new(search))));
    r.register(Arc::new(scrape_website::ScrapeWebsiteTool::new(Arc::new(scraper))));
    tracing::info!(tools = ?r.names(), "tools configured");
    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tools_in_order() {
        let r = build_tools(&EffectiveSettings::default(), Some("serper")).unwrap();
        assert_eq!(r.names(), vec!["web_search", "scrape_website"]);
        assert!(r.get("scrape_website").is_some());
        assert!(r.get("files.write").is_none());
        let schemas = r.schemas();
        assert_eq!(schemas[0].parameters["required"][0], "query");
        assert_eq!(schemas[1].parameters["required"][0], "url");
    }

    #[test]
    fn missing_search_key_is_initialization_error() {
        let err = build_tools(&EffectiveSettings::default(), None).unwrap_err();
        assert_eq!(err, InitializationError::MissingCredential("SERPER_API_KEY"));
    }
}
