//! Checkpoint codec (C8).
//!
//! Serializes the engine's frontier/dedup state to a binary blob sibling to
//! the config file (`<config>.checkpoint`), keyed by a magic header and
//! format version for forward compatibility (spec.md §4.6). The blob itself
//! is opaque to everything but this module; `bincode` is used the way
//! `harborgrid-justin-caddy` uses it for its own on-disk snapshots.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAGIC: [u8; 4] = *b"RKC1";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to write checkpoint {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("failed to read checkpoint {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("checkpoint {0} has an unrecognized header")]
    BadMagic(PathBuf),
    #[error("failed to decode checkpoint {0}: {1}")]
    Decode(PathBuf, bincode::Error),
    #[error("failed to encode checkpoint: {0}")]
    Encode(bincode::Error),
}

/// The four frontier/dedup sets the engine hands to the checkpoint sink at
/// shutdown (spec.md §4.4.7). `analyzed_players` is optional in the wire
/// format per spec.md §4.6 ("and optionally analyzed_players").
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CheckpointData {
    pub players_to_analyze: Vec<i64>,
    pub analyzed_players: Vec<i64>,
    pub matches_to_download: Vec<i64>,
    pub downloaded_matches: Vec<i64>,
}

impl CheckpointData {
    pub fn from_sets(
        players_to_analyze: &HashSet<i64>,
        analyzed_players: &HashSet<i64>,
        matches_to_download: &HashSet<i64>,
        downloaded_matches: &HashSet<i64>,
    ) -> Self {
        CheckpointData {
            players_to_analyze: players_to_analyze.iter().copied().collect(),
            analyzed_players: analyzed_players.iter().copied().collect(),
            matches_to_download: matches_to_download.iter().copied().collect(),
            downloaded_matches: downloaded_matches.iter().copied().collect(),
        }
    }
}

/// Path of the checkpoint file sibling to `config_path`.
pub fn checkpoint_path(config_path: &Path) -> PathBuf {
    let mut os_string = config_path.as_os_str().to_owned();
    os_string.push(".checkpoint");
    PathBuf::from(os_string)
}

pub fn write(path: &Path, data: &CheckpointData) -> Result<(), CheckpointError> {
    let mut buf = MAGIC.to_vec();
    buf.extend(bincode::serialize(data).map_err(CheckpointError::Encode)?);
    std::fs::write(path, buf).map_err(|e| CheckpointError::Write(path.to_path_buf(), e))
}

pub fn read(path: &Path) -> Result<Option<CheckpointData>, CheckpointError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path).map_err(|e| CheckpointError::Read(path.to_path_buf(), e))?;
    if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
        return Err(CheckpointError::BadMagic(path.to_path_buf()));
    }
    let data = bincode::deserialize(&bytes[MAGIC.len()..])
        .map_err(|e| CheckpointError::Decode(path.to_path_buf(), e))?;
    Ok(Some(data))
}
