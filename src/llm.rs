use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::InitializationError;
use crate::settings::EffectiveSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON text as produced by the model.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { role: Role::Assistant, content, tool_calls, tool_call_id: None }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: Role::Tool, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: Some(call_id.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSchema>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub model: String,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, req: ModelRequest) -> anyhow::Result<ModelResponse>;
}

/// Model identifier, sampling temperature and timeout bound to a client.
#[derive(Clone)]
pub struct ModelHandle {
    pub model_id: String,
    pub temperature: f32,
    pub timeout: Duration,
    client: Arc<dyn LanguageModel>,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model_id", &self.model_id)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ModelHandle {
    pub fn new(model_id: impl Into<String>, temperature: f32, timeout: Duration, client: Arc<dyn LanguageModel>) -> Self {
        Self { model_id: model_id.into(), temperature, timeout, client }
    }

    pub async fn generate(&self, messages: Vec<ChatMessage>, tools: Vec<ToolSchema>) -> anyhow::Result<ModelResponse> {
        self.client
            .generate(ModelRequest {
                model: self.model_id.clone(),
                messages,
                tools,
                temperature: Some(self.temperature),
            })
            .await
    }
}

pub fn build_model(settings: &EffectiveSettings, credential: Option<&str>) -> Result<ModelHandle, InitializationError> {
    let api_key = credential
        .filter(|k| !k.trim().is_empty())
        .ok_or(InitializationError::MissingCredential(crate::config::LLM_KEY_NAME))?;
    if !(0.0..=1.0).contains(&settings.temperature) {
        return Err(InitializationError::Temperature(settings.temperature.to_string()));
    }
    let client = OpenAICompatible::new(&settings.llm_base_url, api_key, settings.timeout)
        .map_err(|e| InitializationError::Client { component: "LLM", reason: e.to_string() })?;
    tracing::info!(model = %settings.model, temperature = settings.temperature, "language model configured");
    Ok(ModelHandle::new(settings.model.clone(), settings.temperature, settings.timeout, Arc::new(client)))
}

#[derive(Clone)]
pub struct OpenAICompatible {
    base_url: String,
    api_key: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl OpenAICompatible {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), api_key: api_key.to_string(), timeout, http })
    }
}

#[derive(Debug, Serialize)]
struct OaiChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")] tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")] tool_choice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")] temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OaiChatResponse {
    choices: Vec<OaiChoice>,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct OaiChoice { message: OaiMessage }

#[derive(Debug, Deserialize)]
struct OaiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OaiToolCall>,
}

#[derive(Debug, Deserialize)]
struct OaiToolCall { id: String, function: OaiFunction }

#[derive(Debug, Deserialize)]
struct OaiFunction { name: String, arguments: String }

fn message_to_wire(m: &ChatMessage) -> Value {
    let mut v = serde_json::json!({ "role": m.role, "content": m.content });
    if !m.tool_calls.is_empty() {
        v["tool_calls"] = m
            .tool_calls
            .iter()
            .map(|c| serde_json::json!({
                "id": c.id,
                "type": "function",
                "function": { "name": c.name, "arguments": c.arguments },
            }))
            .collect();
    }
    if let Some(id) = &m.tool_call_id {
        v["tool_call_id"] = Value::String(id.clone());
    }
    v
}

fn tool_to_wire(t: &ToolSchema) -> Value {
    serde_json::json!({
        "type": "function",
        "function": { "name": t.name, "description": t.description, "parameters": t.parameters },
    })
}

#[async_trait]
impl LanguageModel for OpenAICompatible {
    async fn generate(&self, req: ModelRequest) -> anyhow::Result<ModelResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = OaiChatRequest {
            model: &req.model,
            messages: req.messages.iter().map(message_to_wire).collect(),
            tools: req.tools.iter().map(tool_to_wire).collect(),
            tool_choice: (!req.tools.is_empty()).then_some("auto"),
            temperature: req.temperature,
        };
        tracing::debug!(model = %req.model, messages = body.messages.len(), "chat completion request");
        let resp = match self.http.post(url).bearer_auth(&self.api_key).json(&body).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => anyhow::bail!("request timed out after {}s", self.timeout.as_secs()),
            Err(e) => return Err(e.into()),
        };
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            match status.as_u16() {
                401 | 403 => anyhow::bail!("invalid API key ({}): {}", status, detail),
                429 => anyhow::bail!("rate limit exceeded ({}): {}", status, detail),
                _ => anyhow::bail!("model call failed: {}: {}", status, detail),
            }
        }
        let v: OaiChatResponse = resp.json().await?;
        let Some(choice) = v.choices.into_iter().next() else {
            anyhow::bail!("model returned no choices");
        };
        Ok(ModelResponse {
            content: choice.message.content,
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(|c| ToolCall { id: c.id, name: c.function.name, arguments: c.function.arguments })
                .collect(),
            model: v.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::{HeaderMap, StatusCode}, routing::post, Json, Router};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn settings_for(base: &str) -> EffectiveSettings {
        EffectiveSettings { llm_base_url: base.into(), ..Default::default() }
    }

    #[test]
    fn build_model_without_credential_fails_softly() {
        let err = build_model(&EffectiveSettings::default(), None).unwrap_err();
        assert_eq!(err, InitializationError::MissingCredential("GROQ_API_KEY"));
        assert!(build_model(&EffectiveSettings::default(), Some("")).is_err());
    }

    #[test]
    fn build_model_rejects_out_of_range_temperature() {
        let s = EffectiveSettings { temperature: 1.5, ..Default::default() };
        assert!(matches!(build_model(&s, Some("gsk")), Err(InitializationError::Temperature(_))));
    }

    #[tokio::test]
    async fn parses_content_and_tool_calls() {
        let app = Router::new().route(
            "/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers.get("authorization").unwrap(), "Bearer gsk-test");
                assert_eq!(body["tools"][0]["function"]["name"], "web_search");
                assert_eq!(body["tool_choice"], "auto");
                Json(serde_json::json!({
                    "model": body["model"],
                    "choices": [{ "message": {
                        "content": null,
                        "tool_calls": [{ "id": "c1", "type": "function",
                            "function": { "name": "web_search", "arguments": "{\"query\":\"rust\"}" } }]
                    }}]
                }))
            }),
        );
        let base = spawn(app).await;
        let handle = build_model(&settings_for(&base), Some("gsk-test")).unwrap();
        let tools = vec![ToolSchema { name: "web_search".into(), description: "d".into(), parameters: serde_json::json!({}) }];
        let resp = handle.generate(vec![ChatMessage::user("hi")], tools).await.unwrap();
        assert_eq!(resp.model, crate::settings::DEFAULT_MODEL);
        assert!(resp.content.is_none());
        assert_eq!(resp.tool_calls[0].name, "web_search");
        assert_eq!(resp.tool_calls[0].arguments, "{\"query\":\"rust\"}");
    }

    #[tokio::test]
    async fn maps_status_codes_to_classifiable_errors() {
        let app = Router::new()
            .route("/a/chat/completions", post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }))
            .route("/b/chat/completions", post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }));
        let base = spawn(app).await;

        let a = build_model(&settings_for(&format!("{}/a", base)), Some("k")).unwrap();
        let err = a.generate(vec![ChatMessage::user("x")], vec![]).await.unwrap_err();
        assert!(err.to_string().contains("invalid API key"));

        let b = build_model(&settings_for(&format!("{}/b", base)), Some("k")).unwrap();
        let err = b.generate(vec![ChatMessage::user("x")], vec![]).await.unwrap_err();
        assert!(err.to_string().contains("rate limit exceeded"));
    }

    #[tokio::test]
    async fn slow_endpoint_reports_timeout() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "late"
            }),
        );
        let base = spawn(app).await;
        let s = EffectiveSettings { llm_base_url: base, timeout: Duration::from_millis(200), ..Default::default() };
        let handle = build_model(&s, Some("k")).unwrap();
        let err = handle.generate(vec![ChatMessage::user("x")], vec![]).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn tool_messages_carry_call_ids_on_the_wire() {
        let m = ChatMessage::tool_result("c9", "result");
        let v = message_to_wire(&m);
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "c9");

        let a = ChatMessage::assistant(None, vec![ToolCall { id: "c9".into(), name: "scrape_website".into(), arguments: "{}".into() }]);
        let v = message_to_wire(&a);
        assert_eq!(v["tool_calls"][0]["function"]["name"], "scrape_website");
        assert!(v["content"].is_null());
    }
}
