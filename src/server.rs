use axum::extract::{Form, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{routing::{get, post}, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use minijinja::Environment;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use uuid::Uuid;

use crate::agent::engine::Orchestrator;
use crate::components::Components;
use crate::error::ConfigurationError;
use crate::pipeline;
use crate::session::{ConversationLog, ConversationTurn, SessionStore};

pub const SESSION_COOKIE: &str = "research_chat_session";
pub const EXAMPLE_QUERY: &str = "Find top 3 dermatologists in Los Angeles with their names and contact information";
pub const EMPTY_MESSAGE_WARNING: &str = "Please enter a message!";
pub const CLEARED_NOTICE: &str = "Chat history cleared!";

const EXAMPLE_HINTS: [&str; 4] = [
    "Find doctors in New York",
    "Latest AI news",
    "Best restaurants in Paris",
    "Python programming tutorials",
];
const PLACEHOLDER: &str = "Type your question here... (e.g., 'Find cardiologists in Boston with their contact details')";

#[derive(Clone)]
pub struct AppState {
    pub components: Arc<Components>,
    pub runtime: Arc<dyn Orchestrator>,
    pub sessions: SessionStore,
    pub credential_check: Result<(), ConfigurationError>,
    pub metrics: Option<PrometheusHandle>,
    templates: Arc<Environment<'static>>,
}

impl AppState {
    pub fn new(
        components: Arc<Components>,
        runtime: Arc<dyn Orchestrator>,
        metrics: Option<PrometheusHandle>,
    ) -> anyhow::Result<Self> {
        let mut env = Environment::new();
        env.add_template("page.html", include_str!("../templates/page.html"))?;
        let credential_check = components.credentials().check();
        let sessions = SessionStore::with_idle_ttl(components.settings().session_ttl);
        Ok(Self {
            components,
            runtime,
            sessions,
            credential_check,
            metrics,
            templates: Arc::new(env),
        })
    }
}

#[derive(Debug, Serialize)]
struct TurnView<'a> {
    timestamp: &'a str,
    user_text: &'a str,
    assistant_text: &'a str,
}

#[derive(Debug, Serialize)]
struct PageView<'a> {
    keys_valid: bool,
    missing_keys: Vec<&'static str>,
    agent_ready: bool,
    init_errors: Vec<String>,
    history: Vec<TurnView<'a>>,
    warning: Option<&'a str>,
    notice: Option<&'a str>,
    example_hints: &'a [&'a str],
    placeholder: &'a str,
}

fn render_page(
    state: &AppState,
    log: &ConversationLog,
    warning: Option<&str>,
    notice: Option<&str>,
) -> Result<Html<String>, StatusCode> {
    let (keys_valid, missing_keys) = state.components.credentials().validate();
    // components are only built once the keys are present
    let agent_ready = keys_valid && state.components.agent().is_some();
    let init_errors = if keys_valid && !agent_ready { state.components.initialization_errors() } else { Vec::new() };
    let view = PageView {
        keys_valid,
        missing_keys,
        agent_ready,
        init_errors,
        history: log
            .iter()
            .map(|t| TurnView { timestamp: &t.timestamp, user_text: &t.user_text, assistant_text: &t.assistant_text })
            .collect(),
        warning,
        notice,
        example_hints: &EXAMPLE_HINTS,
        placeholder: PLACEHOLDER,
    };
    let tmpl = state.templates.get_template("page.html").map_err(|e| {
        tracing::error!(error = %e, "template missing");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    tmpl.render(&view).map(Html).map_err(|e| {
        tracing::error!(error = %e, "template render failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn session_cookie(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|kv| kv.trim().split_once('='))
        .find(|(k, _)| *k == SESSION_COOKIE)
        .and_then(|(_, v)| Uuid::parse_str(v.trim()).ok())
}

fn set_cookie(mut resp: Response, value: &str) -> Response {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            resp.headers_mut().append(header::SET_COOKIE, v);
        }
        Err(e) => tracing::warn!(error = %e, "invalid cookie value"),
    }
    resp
}

fn with_session_cookie(resp: Response, id: Uuid, created: bool) -> Response {
    if !created {
        return resp;
    }
    set_cookie(resp, &format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id))
}

#[derive(Debug, Default, Deserialize)]
struct IndexQuery {
    cleared: Option<String>,
}

async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<IndexQuery>,
) -> Response {
    let (id, handle, created) = state.sessions.get_or_create(session_cookie(&headers)).await;
    let session = handle.lock().await;
    let notice = q.cleared.is_some().then_some(CLEARED_NOTICE);
    let page = render_page(&state, &session.log, None, notice);
    drop(session);
    with_session_cookie(page.into_response(), id, created)
}

#[derive(Debug, Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub action: Option<String>,
}

async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ChatForm>,
) -> Response {
    let (id, handle, created) = state.sessions.get_or_create(session_cookie(&headers)).await;
    // held for the whole agent call: one submission at a time per session
    let mut session = handle.lock().await;

    if let Err(e) = &state.credential_check {
        tracing::warn!(error = %e, "submission refused: configuration incomplete");
        let page = render_page(&state, &session.log, None, None);
        return with_session_cookie(page.into_response(), id, created);
    }

    let query = match form.action.as_deref() {
        Some("example") => EXAMPLE_QUERY.to_string(),
        _ => form.message.trim().to_string(),
    };
    if query.is_empty() {
        let page = render_page(&state, &session.log, Some(EMPTY_MESSAGE_WARNING), None);
        return with_session_cookie(page.into_response(), id, created);
    }

    metrics::counter!("research_chat_submissions_total").increment(1);
    tracing::info!(session_id = %id, chars = query.len(), "processing submission");
    let agent = state.components.agent();
    let answer = pipeline::respond(&query, agent.as_deref(), state.runtime.as_ref(), &session.log).await;
    session.log.append(ConversationTurn::now(query, answer));
    drop(session);

    with_session_cookie(Redirect::to("/").into_response(), id, created)
}

async fn clear_history(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, handle, created) = state.sessions.get_or_create(session_cookie(&headers)).await;
    let mut session = handle.lock().await;
    let dropped = session.log.len();
    session.log.clear();
    drop(session);
    tracing::info!(session_id = %id, turns = dropped, "chat history cleared");
    with_session_cookie(Redirect::to("/?cleared=1").into_response(), id, created)
}

async fn end_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_cookie(&headers) {
        state.sessions.end(id).await;
    }
    set_cookie(
        Redirect::to("/").into_response(),
        &format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", SESSION_COOKIE),
    )
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    keys_valid: bool,
    missing_keys: Vec<&'static str>,
    sessions: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let (keys_valid, missing_keys) = state.components.credentials().validate();
    Json(HealthResponse {
        status: "ok",
        keys_valid,
        missing_keys,
        sessions: state.sessions.len().await,
    })
}

async fn metrics_text(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.as_ref().map(|h| h.render()).ok_or(StatusCode::NOT_FOUND)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/chat", post(submit))
        .route("/clear", post(clear_history))
        .route("/session/end", post(end_session))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let reaper = state.sessions.spawn_reaper();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await;
    reaper.abort();
    served?;
    Ok(())
}
