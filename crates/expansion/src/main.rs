//! RefGraph expansion CLI
//!
//! Registers a local seed document and expands its citation graph:
//! `expansion <seed-file> [--max-depth N] [--concurrency N] [--memory]`.
//! The final report is printed as JSON on stdout.

use anyhow::Context;
use clap::Parser;
use refgraph_common::config::StoreBackend;
use refgraph_common::{connect_store, AppConfig, VERSION};
use refgraph_expansion::{
    register_seed, ExpansionController, ExpansionRequest, RunState, SeedDocument,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "expansion", version, about = "Expand the citation graph of a seed document")]
struct Cli {
    /// Seed document (.txt, .md or .pdf)
    seed: PathBuf,

    /// Maximum expansion depth (defaults to expansion.default_max_depth)
    #[arg(long)]
    max_depth: Option<u32>,

    /// Nodes processed concurrently (defaults to expansion.default_concurrency)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Use the in-memory graph store regardless of configuration
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load().context("failed to load configuration")?;
    if cli.memory {
        config.store.backend = StoreBackend::Memory;
    }
    init_tracing(&config);
    info!("Starting RefGraph expansion v{}", VERSION);

    let store = connect_store(&config).await?;

    let seed = SeedDocument::from_file(&cli.seed)
        .await
        .with_context(|| format!("failed to read seed {}", cli.seed.display()))?;
    let registration = register_seed(store.as_ref(), seed, &config.resolver).await?;

    let controller = ExpansionController::from_config(&config, store)?;
    let mut request = ExpansionRequest::new(registration.node.id);
    request.max_depth = cli.max_depth;
    request.concurrency = cli.concurrency;
    let handle = controller.start(request)?;
    info!(run_id = %handle.run_id(), seed_id = %handle.seed_id(), "Expansion run started");

    let report = tokio::select! {
        report = handle.join() => report?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling run");
            handle.cancel();
            handle.join().await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(match report.state {
        RunState::Done => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
