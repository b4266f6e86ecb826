use std::env;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use log_drain_mcp::config::{Config, ServerMode};
use log_drain_mcp::dispatch::Dispatcher;
use log_drain_mcp::http::{serve_http, AppState};
use log_drain_mcp::ingest::IngestPipeline;
use log_drain_mcp::mcp::run_stdio;
use log_drain_mcp::store::LogStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <config.yaml|json>", args[0]);
        std::process::exit(1);
    }

    let config = Config::load_from_path(Path::new(&args[1]))?;
    let store = LogStore::connect(&config.database).await?;
    let pipeline = Arc::new(IngestPipeline::new(
        store.clone(),
        config.auth.drain_secret.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(store));
    let state = AppState {
        pipeline,
        dispatcher: dispatcher.clone(),
        auth: Arc::new(config.auth.clone()),
    };

    match config.server.mode {
        ServerMode::Http => serve_http(&config, state).await?,
        ServerMode::Stdio => run_stdio(dispatcher).await?,
        ServerMode::Both => {
            let http_config = config.clone();
            let http_task = tokio::spawn(async move { serve_http(&http_config, state).await });
            let stdio_task = tokio::spawn(async move { run_stdio(dispatcher).await });
            http_task.await.expect("http task panicked")?;
            stdio_task.await.expect("stdio task panicked")?;
        }
    }

    Ok(())
}
