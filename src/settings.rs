use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigurationError;

pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_SEARCH_BASE_URL: &str = "https://google.serper.dev";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelParams {
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ToolPolicies {
    pub max_search_results: Option<usize>,
    pub max_scrape_chars: Option<usize>,
    pub scrape_allowlist: Option<Vec<String>>,
}

/// One configuration layer. Every field is optional so layers can be stacked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SettingsLayer {
    pub model: Option<String>,
    pub model_params: Option<ModelParams>,
    pub llm_base_url: Option<String>,
    pub search_base_url: Option<String>,
    pub max_iterations: Option<usize>,
    pub tool_policies: Option<ToolPolicies>,
    pub session_ttl_secs: Option<u64>,
}

impl SettingsLayer {
    pub fn defaults() -> Self {
        Self {
            model: Some(DEFAULT_MODEL.into()),
            model_params: Some(ModelParams { temperature: Some(0.7), timeout_secs: Some(60) }),
            llm_base_url: Some(DEFAULT_LLM_BASE_URL.into()),
            search_base_url: Some(DEFAULT_SEARCH_BASE_URL.into()),
            max_iterations: Some(8),
            tool_policies: Some(ToolPolicies {
                max_search_results: Some(10),
                max_scrape_chars: Some(20_000),
                scrape_allowlist: None,
            }),
            session_ttl_secs: Some(DEFAULT_SESSION_TTL_SECS),
        }
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let temperature = parse_opt::<f32>(&get, "RESEARCH_CHAT_TEMPERATURE")?;
        let timeout_secs = parse_opt::<u64>(&get, "RESEARCH_CHAT_TIMEOUT_SECS")?;
        let max_search_results = parse_opt::<usize>(&get, "RESEARCH_CHAT_MAX_SEARCH_RESULTS")?;
        let max_scrape_chars = parse_opt::<usize>(&get, "RESEARCH_CHAT_MAX_SCRAPE_CHARS")?;
        let scrape_allowlist = get("RESEARCH_CHAT_SCRAPE_ALLOWLIST").map(|v| {
            v.split(',').map(|h| h.trim().to_string()).filter(|h| !h.is_empty()).collect()
        });
        Ok(Self {
            model: get("RESEARCH_CHAT_MODEL"),
            model_params: Some(ModelParams { temperature, timeout_secs }),
            llm_base_url: get("GROQ_BASE_URL"),
            search_base_url: get("SERPER_BASE_URL"),
            max_iterations: parse_opt::<usize>(&get, "RESEARCH_CHAT_MAX_ITERATIONS")?,
            tool_policies: Some(ToolPolicies { max_search_results, max_scrape_chars, scrape_allowlist }),
            session_ttl_secs: parse_opt::<u64>(&get, "RESEARCH_CHAT_SESSION_TTL_SECS")?,
        })
    }
}

fn parse_opt<T: std::str::FromStr>(
    get: &dyn Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigurationError> {
    match get(name) {
        None => Ok(None),
        Some(v) => v.trim().parse::<T>().map(Some).map_err(|_| ConfigurationError::InvalidSetting {
            name: name.to_string(),
            value: v,
        }),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveSettings {
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub llm_base_url: String,
    pub search_base_url: String,
    pub max_iterations: usize,
    pub max_search_results: usize,
    pub max_scrape_chars: usize,
    pub scrape_allowlist: Option<Vec<String>>,
    /// Sessions idle longer than this are dropped.
    pub session_ttl: Duration,
}

impl Default for EffectiveSettings {
    fn default() -> Self {
        let d = SettingsLayer::defaults();
        resolve_effective_settings(&d, &SettingsLayer::default(), &SettingsLayer::default())
    }
}

/// Precedence: cli > env > defaults, field by field.
pub fn resolve_effective_settings(
    defaults: &SettingsLayer,
    env: &SettingsLayer,
    cli: &SettingsLayer,
) -> EffectiveSettings {
    let layers = [cli, env, defaults];
    let pick = |f: &dyn Fn(&SettingsLayer) -> Option<String>| layers.iter().find_map(|l| f(*l));

    let model = pick(&|l| l.model.clone()).unwrap_or_else(|| DEFAULT_MODEL.into());
    let temperature = layers
        .iter()
        .find_map(|l| l.model_params.as_ref().and_then(|p| p.temperature))
        .unwrap_or(0.7);
    let timeout_secs = layers
        .iter()
        .find_map(|l| l.model_params.as_ref().and_then(|p| p.timeout_secs))
        .unwrap_or(60);
    let max_search_results = layers
        .iter()
        .find_map(|l| l.tool_policies.as_ref().and_then(|p| p.max_search_results))
        .unwrap_or(10);
    let max_scrape_chars = layers
        .iter()
        .find_map(|l| l.tool_policies.as_ref().and_then(|p| p.max_scrape_chars))
        .unwrap_or(20_000);
    let scrape_allowlist = layers
        .iter()
        .find_map(|l| l.tool_policies.as_ref().and_then(|p| p.scrape_allowlist.clone()));

    EffectiveSettings {
        model,
        temperature,
        timeout: Duration::from_secs(timeout_secs),
        llm_base_url: pick(&|l| l.llm_base_url.clone()).unwrap_or_else(|| DEFAULT_LLM_BASE_URL.into()),
        search_base_url: pick(&|l| l.search_base_url.clone()).unwrap_or_else(|| DEFAULT_SEARCH_BASE_URL.into()),
        max_iterations: layers.iter().find_map(|l| l.max_iterations).unwrap_or(8),
        max_search_results,
        max_scrape_chars,
        scrape_allowlist,
        session_ttl: Duration::from_secs(
            layers.iter().find_map(|l| l.session_ttl_secs).unwrap_or(DEFAULT_SESSION_TTL_SECS),
        ),
    }
}
