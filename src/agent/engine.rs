use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::agent::AgentDescriptor;
use crate::agent::tools::{ToolContext, ToolRegistry};
use crate::llm::{ChatMessage, ToolCall};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub description: String,
    pub expected_output: String,
}

/// Runs one task for an agent to completion and returns the final answer.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn kickoff(&self, agent: &AgentDescriptor, task: &TaskSpec) -> anyhow::Result<String>;
}

/// Chat-completions loop: the model either answers or asks for tool calls,
/// whose results are appended before asking again.
#[derive(Debug, Clone)]
pub struct ToolCallingRuntime {
    max_iterations: usize,
}

impl ToolCallingRuntime {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations: max_iterations.max(1) }
    }
}

pub fn system_prompt(agent: &AgentDescriptor) -> String {
    format!("You are {}.\nYour personal goal is: {}\n\n{}", agent.role, agent.goal, agent.instructions)
}

pub fn task_prompt(task: &TaskSpec) -> String {
    format!(
        "{}\n\nThis is the expected criteria for your final answer: {}\nYou MUST return the actual complete content as the final answer, not a summary.",
        task.description.trim(),
        task.expected_output
    )
}

static THINK_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("static regex"));

/// Drops `<think>...</think>` reasoning traces some hosted models emit.
pub fn strip_reasoning(text: &str) -> String {
    THINK_BLOCK.replace_all(text, "").trim().to_string()
}

pub async fn dispatch_tool(tools: &ToolRegistry, call: &ToolCall) -> String {
    let Some(tool) = tools.get(&call.name) else {
        tracing::warn!(tool = %call.name, "model requested unknown tool");
        return format!("Error: unknown tool '{}'. Available tools: {}", call.name, tools.names().join(", "));
    };
    let args: Value = if call.arguments.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        match serde_json::from_str(&call.arguments) {
            Ok(v) => v,
            Err(e) => return format!("Error: invalid arguments for {}: {}", call.name, e),
        }
    };
    match tool.run(ToolContext { call_id: &call.id }, args).await {
        Ok(res) => {
            tracing::info!(tool = tool.name(), summary = %res.summary, "tool ok");
            res.output
        }
        Err(e) => {
            tracing::warn!(tool = tool.name(), error = %e, "tool failed");
            format!("Error: {}", e)
        }
    }
}

#[async_trait]
impl Orchestrator for ToolCallingRuntime {
    async fn kickoff(&self, agent: &AgentDescriptor, task: &TaskSpec) -> anyhow::Result<String> {
        let mut messages = vec![ChatMessage::system(system_prompt(agent)), ChatMessage::user(task_prompt(task))];
        let schemas = agent.tools.schemas();

        for iteration in 0..self.max_iterations {
            tracing::debug!(iteration = iteration + 1, "agent iteration");
            let resp = agent.model.generate(messages.clone(), schemas.clone()).await?;

            if !resp.tool_calls.is_empty() {
                messages.push(ChatMessage::assistant(resp.content.clone(), resp.tool_calls.clone()));
                for call in &resp.tool_calls {
                    let output = dispatch_tool(&agent.tools, call).await;
                    messages.push(ChatMessage::tool_result(call.id.clone(), output));
                }
                continue;
            }

            return match resp.content.map(|c| strip_reasoning(&c)) {
                Some(answer) if !answer.is_empty() => Ok(answer),
                _ => anyhow::bail!("LLM returned empty response"),
            };
        }

        anyhow::bail!("max iterations ({}) reached without a final answer", self.max_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tools::{Tool, ToolFuture, ToolResult};
    use crate::agent::create_agent;
    use crate::llm::{LanguageModel, ModelHandle, ModelRequest, ModelResponse, Role};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct ScriptedModel {
        replies: Mutex<VecDeque<ModelResponse>>,
        seen: Mutex<Vec<ModelRequest>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<ModelResponse>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.into()), seen: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, req: ModelRequest) -> anyhow::Result<ModelResponse> {
            self.seen.lock().unwrap().push(req);
            self.replies.lock().unwrap().pop_front().ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    struct EchoTool;

    impl Tool for EchoTool {
        fn name(&self) -> &'static str { "web_search" }
        fn description(&self) -> &str { "echo" }
        fn parameters(&self) -> Value { serde_json::json!({"type": "object"}) }
        fn run<'a>(&'a self, _ctx: ToolContext<'a>, args: Value) -> ToolFuture<'a> {
            Box::pin(async move {
                let q = args.get("query").and_then(|v| v.as_str()).ok_or_else(|| anyhow::anyhow!("missing query"))?;
                Ok(ToolResult { summary: "echo".into(), output: format!("results for {}", q) })
            })
        }
    }

    fn call(id: &str, name: &str, args: &str) -> ModelResponse {
        ModelResponse {
            content: None,
            tool_calls: vec![ToolCall { id: id.into(), name: name.into(), arguments: args.into() }],
            model: "m".into(),
        }
    }

    fn answer(text: &str) -> ModelResponse {
        ModelResponse { content: Some(text.into()), tool_calls: vec![], model: "m".into() }
    }

    fn agent_with(model: Arc<ScriptedModel>) -> AgentDescriptor {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool));
        let handle = ModelHandle::new("m", 0.7, Duration::from_secs(5), model);
        create_agent(Some(Arc::new(handle)), &tools).unwrap()
    }

    fn task() -> TaskSpec {
        TaskSpec { description: "Find rust news".into(), expected_output: "Detailed response".into() }
    }

    #[tokio::test]
    async fn runs_tool_then_returns_answer() {
        let model = ScriptedModel::new(vec![
            call("c1", "web_search", r#"{"query":"rust"}"#),
            answer("<think>plan</think>\nRust 2.0 shipped.\n\nSources:\n- https://blog.rust-lang.org/"),
        ]);
        let agent = agent_with(model.clone());
        let out = ToolCallingRuntime::new(5).kickoff(&agent, &task()).await.unwrap();
        assert_eq!(out, "Rust 2.0 shipped.\n\nSources:\n- https://blog.rust-lang.org/");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].messages[0].role, Role::System);
        assert!(seen[0].messages[0].content.as_deref().unwrap().contains("Research Assistant with Source Citation"));
        assert!(seen[0].messages[1].content.as_deref().unwrap().contains("expected criteria for your final answer: Detailed response"));
        assert_eq!(seen[0].tools[0].name, "web_search");
        assert_eq!(seen[0].temperature, Some(0.7));
        let last = seen[1].messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(last.content.as_deref(), Some("results for rust"));
    }

    #[tokio::test]
    async fn tool_errors_are_fed_back_to_model() {
        let model = ScriptedModel::new(vec![
            call("c1", "git.commit", "{}"),
            call("c2", "web_search", "{}"),
            call("c3", "web_search", "not json"),
            answer("done"),
        ]);
        let agent = agent_with(model.clone());
        assert_eq!(ToolCallingRuntime::new(5).kickoff(&agent, &task()).await.unwrap(), "done");
        let seen = model.seen.lock().unwrap();
        let tool_outputs: Vec<String> = seen[3]
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.content.clone())
            .collect();
        assert!(tool_outputs[0].starts_with("Error: unknown tool 'git.commit'"));
        assert_eq!(tool_outputs[1], "Error: missing query");
        assert!(tool_outputs[2].starts_with("Error: invalid arguments for web_search"));
    }

    #[tokio::test]
    async fn stops_at_iteration_cap() {
        let model = ScriptedModel::new(vec![
            call("c1", "web_search", r#"{"query":"a"}"#),
            call("c2", "web_search", r#"{"query":"b"}"#),
            answer("too late"),
        ]);
        let agent = agent_with(model);
        let err = ToolCallingRuntime::new(2).kickoff(&agent, &task()).await.unwrap_err();
        assert!(err.to_string().contains("max iterations (2)"));
    }

    #[tokio::test]
    async fn empty_answer_is_an_error() {
        let agent = agent_with(ScriptedModel::new(vec![answer("<think>only thoughts</think>")]));
        let err = ToolCallingRuntime::new(3).kickoff(&agent, &task()).await.unwrap_err();
        assert_eq!(err.to_string(), "LLM returned empty response");
    }

    #[tokio::test]
    async fn model_errors_propagate() {
        let agent = agent_with(ScriptedModel::new(vec![]));
        let err = ToolCallingRuntime::new(3).kickoff(&agent, &task()).await.unwrap_err();
        assert_eq!(err.to_string(), "script exhausted");
    }

    #[test]
    fn strip_reasoning_handles_multiline_blocks() {
        assert_eq!(strip_reasoning("<think>\na\nb\n</think>  Answer"), "Answer");
        assert_eq!(strip_reasoning("plain"), "plain");
    }
}
