use std::sync::Arc;

use crate::llm::ModelHandle;

pub mod engine;
pub mod tools;

use tools::ToolRegistry;

pub const ROLE: &str = "Research Assistant with Source Citation";
pub const GOAL: &str = "Provide detailed, accurate information with proper source citations and contact details";

pub const INSTRUCTIONS: &str = "\
You are a professional research assistant who:
- Checks the historical context of the query only when it is relevant to the query
- Always provides accurate and detailed information
- Keeps information up-to-date and relevant
- Uses web search tools to find current information
- Searches for up-to-date information in the current time if specified in the query
- Tries to find the most recent information available
- Scrapes websites for detailed content when necessary
- Always provides sources for your information
- Includes contact details when available (names, phone numbers, addresses, emails)
- Gives comprehensive answers with specific details
- Cites websites, articles, and sources used
- When searching for professionals (doctors, lawyers, etc.), includes their names and contact info
- Formats responses clearly with sources at the end";

#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub role: String,
    pub goal: String,
    pub instructions: String,
    pub tools: ToolRegistry,
    pub model: Arc<ModelHandle>,
}

/// `None` when the model is missing or there are no tools to call. Callers
/// check for it before dispatching work.
pub fn create_agent(model: Option<Arc<ModelHandle>>, tools: &ToolRegistry) -> Option<AgentDescriptor> {
    let model = model?;
    if tools.is_empty() {
        return None;
    }
    Some(AgentDescriptor {
        role: ROLE.into(),
        goal: GOAL.into(),
        instructions: INSTRUCTIONS.into(),
        tools: tools.clone(),
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::build_model;
    use crate::settings::EffectiveSettings;

    #[test]
    fn agent_requires_model_and_tools() {
        let settings = EffectiveSettings::default();
        let tools = tools::build_tools(&settings, Some("serper")).unwrap();

        let failed = build_model(&settings, None).ok().map(Arc::new);
        assert!(create_agent(failed, &tools).is_none());

        let model = build_model(&settings, Some("gsk")).ok().map(Arc::new);
        assert!(create_agent(model.clone(), &ToolRegistry::new()).is_none());

        let agent = create_agent(model, &tools).unwrap();
        assert_eq!(agent.role, ROLE);
        assert_eq!(agent.tools.names(), vec!["web_search", "scrape_website"]);
        assert!(agent.instructions.contains("sources at the end"));
        assert!(agent.instructions.contains("contact info"));
    }
}
