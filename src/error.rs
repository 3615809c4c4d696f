use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::gateway::GatewayError;
use crate::tier::TierError;

/// Everything that can terminate the process with a non-zero exit code.
///
/// Errors encountered *inside* a worker loop never reach this type; they are
/// triaged and logged in place (see `engine::triage_gateway_error`).
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Tier(#[from] TierError),
    #[error("gateway error during startup: {0}")]
    Gateway(#[from] GatewayError),
    #[error("logging setup failed: {0}")]
    Logging(#[from] log::SetLoggerError),
    #[error("logging init error: {0}")]
    LoggingInit(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
