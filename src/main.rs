//! Process entry point (A3): argument parsing, config/checkpoint loading,
//! logging setup, and graceful Ctrl-C driven shutdown around the engine.

mod cache;
mod checkpoint;
mod config;
mod engine;
mod error;
mod gateway;
mod logging;
mod record;
mod store;
mod tier;
mod tier_set;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;

use crate::config::{EngineTuning, RawConfig};
use crate::engine::{Engine, FileCheckpointSink, NullCheckpointSink};
use crate::error::FatalError;
use crate::gateway::HttpGateway;
use crate::store::TierStore;

/// BFS crawler for ranked match records.
#[derive(Parser, Debug)]
#[command(name = "rankcrawl", about = "BFS crawler for ranked match records from a rate-limited game API")]
struct Cli {
    /// Path to the TOML configuration file.
    configuration_file: PathBuf,

    /// Disable checkpoint emission at shutdown.
    #[arg(long)]
    no_state: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fatal: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FatalError> {
    let raw = RawConfig::load(&cli.configuration_file)?;
    let logging_level = config::parse_level(&raw.logging_level)?;
    logging::init(logging_level)?;

    let rt = tokio::runtime::Runtime::new()?;
    let gateway = Arc::new(HttpGateway::new(
        format!("https://{}.api.rankcrawl.invalid", raw.cassiopeia.region),
        raw.cassiopeia.api_key.clone(),
    ));

    let runtime_config = rt.block_on(config::prepare_config(raw, gateway.as_ref()))?;
    std::fs::create_dir_all(&runtime_config.destination_directory)?;

    let checkpoint_path = checkpoint::checkpoint_path(&cli.configuration_file);
    let resume = if cli.no_state {
        None
    } else {
        checkpoint::read(&checkpoint_path)?
    };
    if resume.is_some() {
        log::info!("resuming from checkpoint {}", checkpoint_path.display());
    }

    let store = TierStore::new(
        runtime_config.destination_directory.clone(),
        runtime_config.matches_per_file,
        runtime_config.base_file_name.clone(),
    );
    let record_sink = Arc::new(Mutex::new(store));

    let checkpoint_sink: Arc<dyn engine::CheckpointSink> = if cli.no_state {
        Arc::new(NullCheckpointSink)
    } else {
        Arc::new(FileCheckpointSink::new(checkpoint_path))
    };

    let engine = Arc::new(Engine::new(
        runtime_config,
        EngineTuning::default(),
        gateway,
        rt.handle().clone(),
        record_sink,
        checkpoint_sink,
        resume,
    ));

    let shutdown_engine = Arc::clone(&engine);
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("received interrupt, shutting down");
            shutdown_engine.request_shutdown();
        }
    });

    engine.run();
    Ok(())
}
