use std::time::Instant;

use crate::agent::AgentDescriptor;
use crate::agent::engine::{Orchestrator, TaskSpec};
use crate::prompt;
use crate::session::ConversationLog;

pub const NOT_INITIALIZED: &str = "Error: Agent not properly initialized. Please check your API keys.";
pub const EXPECTED_OUTPUT: &str = "Detailed response with sources and contact information when applicable";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Credential,
    Timeout,
    RateLimit,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Credential => "credential",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::RateLimit => "rate_limit",
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            ErrorCategory::Credential => "Please check that your API keys are correctly set in the .env file.",
            ErrorCategory::Timeout => "The request timed out. Please try again.",
            ErrorCategory::RateLimit => "Rate limit exceeded. Please wait a moment and try again.",
        }
    }
}

/// Substring match over English error text. A hint, not a taxonomy: wording
/// from providers and client libraries changes between versions.
pub fn classify(error_text: &str) -> Option<ErrorCategory> {
    let lower = error_text.to_lowercase();
    if lower.contains("api key") || lower.contains("api_key") {
        Some(ErrorCategory::Credential)
    } else if lower.contains("timeout") || lower.contains("timed out") {
        Some(ErrorCategory::Timeout)
    } else if lower.contains("rate limit") || lower.contains("rate_limit") {
        Some(ErrorCategory::RateLimit)
    } else {
        None
    }
}

pub fn error_message(error_text: &str) -> String {
    let mut msg = format!("I encountered an error: {}", error_text);
    if let Some(category) = classify(error_text) {
        msg.push_str("\n\n");
        msg.push_str(category.hint());
    }
    msg
}

pub fn build_task(query: &str, log: &ConversationLog) -> TaskSpec {
    TaskSpec { description: prompt::assemble(query, log), expected_output: EXPECTED_OUTPUT.into() }
}

/// One attempt, no retries. Failures come back as text so the caller can
/// record them like any other answer.
pub async fn respond(
    query: &str,
    agent: Option<&AgentDescriptor>,
    runtime: &dyn Orchestrator,
    log: &ConversationLog,
) -> String {
    let Some(agent) = agent else {
        tracing::warn!("submission rejected: agent not initialized");
        metrics::counter!("research_chat_responses_total", "outcome" => "not_initialized").increment(1);
        return NOT_INITIALIZED.to_string();
    };

    let task = build_task(query, log);
    let started = Instant::now();
    let result = runtime.kickoff(agent, &task).await;
    metrics::histogram!("research_chat_response_seconds").record(started.elapsed().as_secs_f64());

    match result {
        Ok(answer) => {
            tracing::info!(chars = answer.len(), elapsed_ms = started.elapsed().as_millis() as u64, "agent answered");
            metrics::counter!("research_chat_responses_total", "outcome" => "ok").increment(1);
            answer
        }
        Err(e) => {
            let text = format!("{:#}", e);
            let category = classify(&text).map(|c| c.as_str()).unwrap_or("unknown");
            tracing::error!(error = %text, category, "agent run failed");
            metrics::counter!("research_chat_responses_total", "outcome" => "error").increment(1);
            metrics::counter!("research_chat_errors_total", "category" => category).increment(1);
            error_message(&text)
        }
    }
}
