use anyhow::{Context, Result};
use clap::Parser;
use preplive::providers::{BraveSearch, LlmClient, OpenAiLlm, SearchClient};
use preplive::{create_router, AppState, RelayConfig};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "preplive", about = "Real-time meeting listen-in relay")]
struct Args {
    /// Configuration file (name without extension, config-crate style)
    #[arg(long, default_value = "config/preplive")]
    config: String,

    /// Override the HTTP listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = RelayConfig::load_or_default(&args.config);
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v0.1.0", cfg.service.name);

    for env in [
        &cfg.stt.api_key_env,
        &cfg.realtime.api_key_env,
        &cfg.providers.llm_api_key_env,
        &cfg.providers.search_api_key_env,
    ] {
        if std::env::var(env).is_err() {
            warn!("{} not set; the dependent feature will be unavailable", env);
        }
    }

    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiLlm::new(
        cfg.providers.llm_base_url.clone(),
        std::env::var(&cfg.providers.llm_api_key_env).unwrap_or_default(),
        cfg.suggest.model.clone(),
    ));
    let search: Arc<dyn SearchClient> = Arc::new(BraveSearch::new(
        cfg.providers.search_base_url.clone(),
        std::env::var(&cfg.providers.search_api_key_env).unwrap_or_default(),
    ));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let state = AppState::new(Arc::new(cfg), llm, search);
    let router = create_router(state);

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router).await?;

    Ok(())
}
