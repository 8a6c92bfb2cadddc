mod cli;

use anyhow::Context;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use enadeflow_core::impls::{HttpFetcher, HttpObjectStore, ZipExtractor};
use enadeflow_core::{PipelineConfig, Ports, RunController};

/// Load the TOML config, falling back to defaults if the file is absent.
/// Environment variables take precedence for storage credentials.
fn load_config(path: &Path) -> anyhow::Result<PipelineConfig> {
    let mut config = if path.exists() {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?
    } else {
        PipelineConfig::default()
    };
    config.apply_env();
    Ok(config)
}

fn ports(config: &PipelineConfig) -> Ports {
    Ports {
        fetcher: Arc::new(HttpFetcher::new()),
        extractor: Arc::new(ZipExtractor),
        store: Arc::new(HttpObjectStore::new(
            config.storage_url.clone(),
            config.storage_token.clone(),
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Run => {
            let controller = RunController::new(config.clone(), ports(&config));
            let report = controller.run_once().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Command::Serve => {
            let controller = RunController::new(config.clone(), ports(&config));
            let handle = controller.cancel_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, finishing in-flight work");
                    handle.cancel();
                }
            });
            controller.run_on_interval().await?;
        }
        Command::Tasks => {
            let graph = enadeflow_core::build_graph(&config, &ports(&config))?;
            for id in graph.task_ids() {
                let task = graph.task(id).expect("listing ids taken from the graph");
                let inputs = if task.inputs.is_empty() {
                    "-".to_string()
                } else {
                    task.inputs.join(", ")
                };
                println!("{:<16} {:?}  inputs: {inputs}", id.to_string(), task.kind);
            }
        }
    }
    Ok(())
}
