use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing_subscriber::{fmt, EnvFilter};

mod agent;
mod components;
mod config;
mod error;
mod llm;
mod pipeline;
mod prompt;
mod server;
mod session;
mod settings;

use settings::{ModelParams, SettingsLayer};

#[derive(Debug, Parser)]
#[command(name = "research_chat")]
#[command(about = "Research chat assistant with web search and scraping", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Start {
        #[arg(long, default_value = "127.0.0.1:8501")]
        listen: String,
        /// dotenv file to read; defaults to ./.env when present
        #[arg(long)]
        env_file: Option<PathBuf>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Drop sessions idle for this long.
        #[arg(long)]
        session_ttl_secs: Option<u64>,
        /// Do not install the Prometheus recorder; /metrics answers 404.
        #[arg(long)]
        no_metrics: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start { listen, env_file, model, temperature, timeout_secs, session_ttl_secs, no_metrics } => {
            let addr: SocketAddr = listen.parse()?;
            let vars = config::load_env_file(env_file.as_deref())?;

            let env_layer = SettingsLayer::from_lookup(config::layered_lookup(&vars))?;
            let cli_layer = SettingsLayer {
                model,
                model_params: Some(ModelParams { temperature, timeout_secs }),
                session_ttl_secs,
                ..SettingsLayer::default()
            };
            let settings = settings::resolve_effective_settings(&SettingsLayer::defaults(), &env_layer, &cli_layer);
            tracing::info!(model = %settings.model, temperature = settings.temperature, "settings resolved");

            let credentials = config::Credentials::from_sources(|k| std::env::var(k).ok(), &vars);
            let keys_ok = match credentials.check() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "chat disabled until keys are configured");
                    false
                }
            };

            let metrics = if no_metrics {
                None
            } else {
                Some(PrometheusBuilder::new().install_recorder()?)
            };

            let runtime = Arc::new(agent::engine::ToolCallingRuntime::new(settings.max_iterations));
            let components = Arc::new(components::Components::new(settings, credentials));
            if keys_ok && components.agent().is_none() {
                for e in components.initialization_errors() {
                    tracing::error!("{}", e);
                }
            }

            let state = server::AppState::new(components, runtime, metrics)?;
            server::serve(addr, state).await?;
        }
    }
    Ok(())
}
