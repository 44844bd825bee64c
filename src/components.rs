use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::agent::tools::{build_tools, ToolRegistry};
use crate::agent::{create_agent, AgentDescriptor};
use crate::config::Credentials;
use crate::error::InitializationError;
use crate::llm::{build_model, ModelHandle};
use crate::settings::EffectiveSettings;

/// Composition root. Tools, model and agent are built on first use and the
/// outcome, success or failure, is kept for the life of the process.
pub struct Components {
    settings: EffectiveSettings,
    credentials: Credentials,
    tools: OnceCell<Result<ToolRegistry, InitializationError>>,
    model: OnceCell<Result<Arc<ModelHandle>, InitializationError>>,
    agent: OnceCell<Option<Arc<AgentDescriptor>>>,
}

impl Components {
    pub fn new(settings: EffectiveSettings, credentials: Credentials) -> Self {
        Self { settings, credentials, tools: OnceCell::new(), model: OnceCell::new(), agent: OnceCell::new() }
    }

    pub fn settings(&self) -> &EffectiveSettings { &self.settings }
    pub fn credentials(&self) -> &Credentials { &self.credentials }

    pub fn tools(&self) -> Result<&ToolRegistry, &InitializationError> {
        self.tools
            .get_or_init(|| {
                let r = build_tools(&self.settings, self.credentials.search_key());
                if let Err(e) = &r {
                    tracing::error!(error = %e, "error setting up tools");
                }
                r
            })
            .as_ref()
    }

    pub fn model(&self) -> Result<Arc<ModelHandle>, &InitializationError> {
        self.model
            .get_or_init(|| {
                let r = build_model(&self.settings, self.credentials.llm_key()).map(Arc::new);
                if let Err(e) = &r {
                    tracing::error!(error = %e, "error setting up LLM");
                }
                r
            })
            .as_ref()
            .map(Arc::clone)
    }

    pub fn agent(&self) -> Option<Arc<AgentDescriptor>> {
        self.agent
            .get_or_init(|| {
                let empty = ToolRegistry::new();
                let tools = self.tools().unwrap_or(&empty);
                let agent = create_agent(self.model().ok(), tools).map(Arc::new);
                if agent.is_none() {
                    tracing::error!("failed to initialize the research agent");
                }
                agent
            })
            .clone()
    }

    /// Messages for every component that failed to build.
    pub fn initialization_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let Err(e) = self.tools() {
            errors.push(format!("Error setting up tools: {}", e));
        }
        if let Err(e) = self.model() {
            errors.push(format!("Error setting up LLM: {}", e));
        }
        errors
    }
}
