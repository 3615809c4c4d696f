//! Configuration preparation (C7).
//!
//! `RawConfig` is the literal TOML shape described in spec.md §6.
//! `prepare_config` resolves it (plus any on-disk checkpoint) into the
//! `RuntimeConfig` the engine actually runs with, including seed-player
//! resolution (spec.md §4.5), grounded in
//! `original_source/lol_scraper/match_downloader.py`'s `prepare_config`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::Gateway;
use crate::tier::{GameMap, Queue, Tier, TierError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid tier/queue/map in config: {0}")]
    Tier(#[from] TierError),
    #[error("invalid logging level '{0}'")]
    LoggingLevel(String),
    #[error("cassiopeia.api_key is required")]
    MissingApiKey,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TimeFields {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    #[serde(default)]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    #[serde(default)]
    pub second: u32,
}

impl TimeFields {
    fn to_utc(self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, self.day, self.hour, self.minute, self.second)
            .single()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum RateLimits {
    Single(u32, u32),
    Many(Vec<(u32, u32)>),
}

#[derive(Debug, Deserialize, Clone)]
pub struct CassiopeiaConfig {
    pub api_key: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub rate_limits: Option<RateLimits>,
    #[serde(default)]
    pub print_calls: bool,
}

/// The literal TOML configuration shape (spec.md §6).
#[derive(Debug, Deserialize, Clone)]
pub struct RawConfig {
    pub destination_directory: String,
    #[serde(default)]
    pub base_file_name: String,
    #[serde(default)]
    pub matches_per_file: usize,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub map: Option<String>,
    #[serde(default)]
    pub minimum_tier: Option<String>,
    #[serde(default = "default_true")]
    pub include_timeline: bool,
    pub start_time: Option<TimeFields>,
    pub end_time: Option<TimeFields>,
    #[serde(default)]
    pub minimum_patch: String,
    pub seed_players: Option<Vec<String>>,
    pub seed_players_id: Option<Vec<i64>>,
    pub cassiopeia: CassiopeiaConfig,
    pub logging_level: Option<String>,
}

impl RawConfig {
    pub fn load(path: &Path) -> Result<RawConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let mut raw: RawConfig = toml::from_str(&text)?;
        if raw.destination_directory.starts_with("__file__") {
            let config_dir = path
                .canonicalize()
                .ok()
                .and_then(|p| p.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| PathBuf::from("."));
            raw.destination_directory = raw
                .destination_directory
                .replacen("__file__", &config_dir.to_string_lossy(), 1);
        }
        Ok(raw)
    }
}

/// Resolved, ready-to-run configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub destination_directory: PathBuf,
    pub base_file_name: String,
    pub matches_per_file: usize,
    pub queue: Queue,
    pub map: GameMap,
    pub minimum_tier: Tier,
    pub include_timeline: bool,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub minimum_patch: String,
    pub seed_players_id: Vec<i64>,
    pub logging_level: log::LevelFilter,
    pub api_key: String,
}

/// `NOTSET` (the spec's default `logging_level`) does not mean "silence
/// everything" — the ground-truth source (`lol_scraper/match_downloader.py`)
/// leaves the Python root logger at its `WARNING` default in that case, so
/// the §4.4.6/§7 triage warnings and §4.4.7 periodic metrics stay visible
/// out of the box. Mirror that by treating `NOTSET` as `Warn`.
pub fn parse_level(level: &Option<String>) -> Result<log::LevelFilter, ConfigError> {
    match level.as_deref().unwrap_or("NOTSET").to_ascii_uppercase().as_str() {
        "NOTSET" => Ok(log::LevelFilter::Warn),
        "TRACE" => Ok(log::LevelFilter::Trace),
        "DEBUG" => Ok(log::LevelFilter::Debug),
        "INFO" => Ok(log::LevelFilter::Info),
        "WARNING" | "WARN" => Ok(log::LevelFilter::Warn),
        "ERROR" => Ok(log::LevelFilter::Error),
        "CRITICAL" => Ok(log::LevelFilter::Error),
        other => Err(ConfigError::LoggingLevel(other.to_string())),
    }
}

/// Resolves seed players per spec.md §4.5: explicit ids, else names (via the
/// gateway), else the challenger+master leaderboards. Retries indefinitely
/// on gateway error so a transient network blip at startup is not fatal.
async fn resolve_seed_players(
    raw: &RawConfig,
    queue: Queue,
    gateway: &dyn Gateway,
) -> Vec<i64> {
    if let Some(ids) = &raw.seed_players_id {
        if !ids.is_empty() {
            return ids.clone();
        }
    }

    loop {
        let attempt = async {
            if let Some(names) = &raw.seed_players {
                let resolved = gateway.summoner_names_to_id(names).await?;
                Ok::<Vec<i64>, crate::gateway::GatewayError>(resolved.into_values().collect())
            } else {
                gateway.challenger_and_master_ids(queue).await
            }
        }
        .await;

        match attempt {
            Ok(ids) => return ids,
            Err(err) => {
                log::warn!("seed player resolution failed, retrying: {err}");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

pub async fn prepare_config(
    raw: RawConfig,
    gateway: &dyn Gateway,
) -> Result<RuntimeConfig, ConfigError> {
    if raw.cassiopeia.api_key.trim().is_empty() {
        return Err(ConfigError::MissingApiKey);
    }

    let queue = match &raw.queue {
        Some(q) => Queue::parse(q)?,
        None => Queue::RankedSolo5x5,
    };
    let map = match &raw.map {
        Some(m) => GameMap::parse(m)?,
        None => GameMap::SummonersRift,
    };
    let minimum_tier = match &raw.minimum_tier {
        Some(t) => Tier::parse(t)?,
        None => Tier::Bronze,
    };

    let end = raw.end_time.and_then(TimeFields::to_utc).unwrap_or_else(Utc::now);
    let start = raw
        .start_time
        .and_then(TimeFields::to_utc)
        .unwrap_or_else(|| end - chrono::Duration::days(30));

    let logging_level = parse_level(&raw.logging_level)?;

    let seed_players_id = resolve_seed_players(&raw, queue, gateway).await;

    Ok(RuntimeConfig {
        destination_directory: PathBuf::from(&raw.destination_directory),
        base_file_name: raw.base_file_name.clone(),
        matches_per_file: raw.matches_per_file,
        queue,
        map,
        minimum_tier,
        include_timeline: raw.include_timeline,
        start,
        end,
        minimum_patch: raw.minimum_patch.clone(),
        seed_players_id,
        logging_level,
        api_key: raw.cassiopeia.api_key.clone(),
    })
}

/// Environment overrides (spec.md §6); each falls back to the engine's
/// documented default when unset or unparseable.
pub fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineTuning {
    pub max_analyzed_players_size: usize,
    pub eviction_rate: f64,
    pub max_players_in_queue: Option<usize>,
    pub max_players_download_threads: usize,
    pub matches_download_threads: usize,
    pub logging_interval: u64,
    pub patch_cache_ttl: Duration,
}

impl Default for EngineTuning {
    fn default() -> Self {
        EngineTuning {
            max_analyzed_players_size: env_usize("MAX_ANALYZED_PLAYERS_SIZE", 50_000),
            eviction_rate: env_f64("EVICTION_RATE", 0.5),
            max_players_in_queue: std::env::var("MAX_PLAYERS_IN_QUEUE")
                .ok()
                .and_then(|v| v.parse().ok()),
            max_players_download_threads: env_usize("MAX_PLAYERS_DOWNLOAD_THREADS", 8),
            matches_download_threads: env_usize("MATCHES_DOWNLOAD_THREADS", 4),
            logging_interval: env_usize("LOGGING_INTERVAL", 60) as u64,
            patch_cache_ttl: Duration::from_millis(env_usize("PATCH_CACHE_TTL_MS", 3_600_000) as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use crate::record::MatchRecord;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubGateway {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Gateway for StubGateway {
        async fn summoner_names_to_id(
            &self,
            names: &[String],
        ) -> Result<HashMap<String, i64>, GatewayError> {
            Ok(names.iter().enumerate().map(|(i, n)| (n.clone(), i as i64)).collect())
        }
        async fn leagues_by_summoner_ids(
            &self,
            _ids: &[i64],
            _queue: Queue,
        ) -> Result<crate::tier_set::TierSet, GatewayError> {
            Ok(crate::tier_set::TierSet::new(0))
        }
        async fn get_match_list(
            &self,
            _player_id: i64,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _queue: Queue,
        ) -> Result<Vec<i64>, GatewayError> {
            Ok(Vec::new())
        }
        async fn get_match(&self, _match_id: i64, _include_timeline: bool) -> Result<MatchRecord, GatewayError> {
            unreachable!()
        }
        async fn challenger_and_master_ids(&self, _queue: Queue) -> Result<Vec<i64>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1, 2, 3])
        }
        async fn latest_patch_version(&self) -> Result<String, GatewayError> {
            Ok("5.20".to_string())
        }
    }

    fn minimal_raw() -> RawConfig {
        RawConfig {
            destination_directory: "/tmp/out".to_string(),
            base_file_name: String::new(),
            matches_per_file: 0,
            queue: None,
            map: None,
            minimum_tier: None,
            include_timeline: true,
            start_time: None,
            end_time: None,
            minimum_patch: String::new(),
            seed_players: None,
            seed_players_id: None,
            cassiopeia: CassiopeiaConfig {
                api_key: "key".to_string(),
                region: "na".to_string(),
                rate_limits: None,
                print_calls: false,
            },
            logging_level: None,
        }
    }

    #[tokio::test]
    async fn defaults_start_to_30_days_before_end() {
        let gateway = StubGateway { calls: AtomicUsize::new(0) };
        let runtime = prepare_config(minimal_raw(), &gateway).await.unwrap();
        let delta = runtime.end - runtime.start;
        assert_eq!(delta.num_days(), 30);
    }

    #[tokio::test]
    async fn falls_back_to_leaderboard_seed_when_nothing_explicit() {
        let gateway = StubGateway { calls: AtomicUsize::new(0) };
        let runtime = prepare_config(minimal_raw(), &gateway).await.unwrap();
        assert_eq!(runtime.seed_players_id, vec![1, 2, 3]);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn explicit_seed_ids_skip_gateway() {
        let gateway = StubGateway { calls: AtomicUsize::new(0) };
        let mut raw = minimal_raw();
        raw.seed_players_id = Some(vec![42]);
        let runtime = prepare_config(raw, &gateway).await.unwrap();
        assert_eq!(runtime.seed_players_id, vec![42]);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let mut raw = minimal_raw();
        raw.cassiopeia.api_key = String::new();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let gateway = StubGateway { calls: AtomicUsize::new(0) };
        let result = rt.block_on(prepare_config(raw, &gateway));
        assert!(matches!(result, Err(ConfigError::MissingApiKey)));
    }
}
