//! External-API gateway (C5).
//!
//! The HTTP client's rate limiting and retry behavior are out of scope for
//! this crate (spec.md §1): `HttpGateway` issues plain batched requests and
//! lets transport/status errors surface as a `GatewayError` for the engine
//! to triage (spec.md §4.4.6). Batched operation shapes and the
//! `get_tier_from_participants` derivation are grounded in
//! `original_source/lol_scraper/summoners_api.py`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::record::MatchRecord;
use crate::tier::{Queue, Tier};
use crate::tier_set::TierSet;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("api client error (status {0})")]
    ApiClient(u16),
    #[error("api server error (status {0})")]
    ApiServer(u16),
    #[error("api error (status {0})")]
    ApiOther(u16),
    #[error("decode error: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn from_status(status: u16) -> GatewayError {
        match status {
            400..=499 => GatewayError::ApiClient(status),
            500..=599 => GatewayError::ApiServer(status),
            other => GatewayError::ApiOther(other),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            GatewayError::from_status(status.as_u16())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

/// The three batched operations spec.md §4.3 names, plus the startup-only
/// leaderboard/version lookups §4.5 and §4.2 need. Modeled as a trait so
/// tests can swap in a mock without touching the engine (spec.md §9,
/// "duck-typed callbacks").
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn summoner_names_to_id(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, i64>, GatewayError>;

    async fn leagues_by_summoner_ids(
        &self,
        ids: &[i64],
        queue: Queue,
    ) -> Result<TierSet, GatewayError>;

    async fn get_match_list(
        &self,
        player_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        queue: Queue,
    ) -> Result<Vec<i64>, GatewayError>;

    async fn get_match(&self, match_id: i64, include_timeline: bool) -> Result<MatchRecord, GatewayError>;

    async fn challenger_and_master_ids(&self, queue: Queue) -> Result<Vec<i64>, GatewayError>;

    async fn latest_patch_version(&self) -> Result<String, GatewayError>;
}

/// `leagues_by_summoner_ids` + filter to `>= minimum_tier`, plus the
/// match-wide minimum tier (the *worst* tier observed). Spec.md §4.3.
pub async fn get_tier_from_participants(
    gateway: &dyn Gateway,
    summoner_ids: &[i64],
    minimum_tier: Tier,
    queue: Queue,
) -> Result<(Tier, TierSet), GatewayError> {
    let leagues = gateway.leagues_by_summoner_ids(summoner_ids, queue).await?;

    let mut match_min_tier = Tier::Challenger;
    let mut filtered = TierSet::new(0);
    for tier in crate::tier::ALL_TIERS {
        let ids: Vec<i64> = leagues.tier(tier).collect();
        if ids.is_empty() {
            continue;
        }
        match_min_tier = match_min_tier.worst(tier);
        if tier.is_better_or_equal(minimum_tier) {
            filtered.update_tier(ids, tier);
        }
    }
    Ok((match_min_tier, filtered))
}

/// `reqwest`-backed gateway against a configurable base URL. The wire shapes
/// below are a plausible DTO surface for a rank-and-match API; decoding
/// failures surface as `GatewayError::Decode`.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        HttpGateway {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Deserialize)]
struct SummonerDto {
    name: String,
    id: i64,
}

#[derive(Deserialize)]
struct LeagueEntryDto {
    #[serde(rename = "playerOrTeamId")]
    player_or_team_id: i64,
    queue: String,
    tier: String,
}

#[derive(Deserialize)]
struct LeagueListDto {
    entries: Vec<LeagueEntryDto>,
}

#[derive(Deserialize)]
struct MatchListEntryDto {
    #[serde(rename = "matchId")]
    match_id: i64,
}

#[derive(Deserialize)]
struct MatchListDto {
    matches: Vec<MatchListEntryDto>,
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn summoner_names_to_id(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, i64>, GatewayError> {
        let mut out = HashMap::new();
        for batch in names.chunks(40) {
            let resp = self
                .client
                .get(self.url("/v1/summoners/by-name"))
                .query(&[("api_key", &self.api_key)])
                .query(&[("names", batch.join(","))])
                .send()
                .await?
                .error_for_status()?;
            let summoners: Vec<SummonerDto> = resp
                .json()
                .await
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            for s in summoners {
                out.insert(s.name, s.id);
            }
        }
        Ok(out)
    }

    async fn leagues_by_summoner_ids(
        &self,
        ids: &[i64],
        queue: Queue,
    ) -> Result<TierSet, GatewayError> {
        let mut out = TierSet::new(0);
        for batch in ids.chunks(10) {
            let id_list = batch.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
            let resp = self
                .client
                .get(self.url("/v1/leagues/by-summoner"))
                .query(&[("api_key", &self.api_key)])
                .query(&[("ids", id_list)])
                .send()
                .await?
                .error_for_status()?;
            let leagues: HashMap<String, LeagueListDto> = resp
                .json()
                .await
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            for list in leagues.into_values() {
                for entry in list.entries {
                    if entry.queue != queue.name() {
                        continue;
                    }
                    let tier = Tier::parse(&entry.tier)
                        .map_err(|e| GatewayError::Decode(e.to_string()))?;
                    out.update_tier([entry.player_or_team_id], tier);
                }
            }
        }
        Ok(out)
    }

    async fn get_match_list(
        &self,
        player_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        queue: Queue,
    ) -> Result<Vec<i64>, GatewayError> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/matchlists/by-summoner/{player_id}")))
            .query(&[("api_key", &self.api_key)])
            .query(&[
                ("beginTime", start.timestamp_millis().to_string()),
                ("endTime", end.timestamp_millis().to_string()),
                ("rankedQueues", queue.name().to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let list: MatchListDto = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(list.matches.into_iter().map(|m| m.match_id).collect())
    }

    async fn get_match(&self, match_id: i64, include_timeline: bool) -> Result<MatchRecord, GatewayError> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/matches/{match_id}")))
            .query(&[("api_key", &self.api_key)])
            .query(&[("includeTimeline", include_timeline.to_string())])
            .send()
            .await?
            .error_for_status()?;
        resp.json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn challenger_and_master_ids(&self, queue: Queue) -> Result<Vec<i64>, GatewayError> {
        let mut ids = Vec::new();
        for path in ["/v1/league/challenger", "/v1/league/master"] {
            let resp = self
                .client
                .get(self.url(path))
                .query(&[("api_key", &self.api_key)])
                .query(&[("type", queue.name().to_string())])
                .send()
                .await?
                .error_for_status()?;
            let list: LeagueListDto = resp
                .json()
                .await
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            ids.extend(list.entries.into_iter().map(|e| e.player_or_team_id));
        }
        Ok(ids)
    }

    async fn latest_patch_version(&self) -> Result<String, GatewayError> {
        let resp = self
            .client
            .get(self.url("/v1/versions"))
            .send()
            .await?
            .error_for_status()?;
        let versions: Vec<String> = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        let full = versions
            .first()
            .ok_or_else(|| GatewayError::Decode("empty version list".to_string()))?;
        Ok(truncate_to_major_minor(full))
    }
}

/// Patch version comparison is lexicographic on `major.minor`, matching the
/// source's intentionally-not-semver-correct behavior (spec.md §9).
pub fn truncate_to_major_minor(version: &str) -> String {
    version.splitn(3, '.').take(2).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_drops_patch_component() {
        assert_eq!(truncate_to_major_minor("5.20.1"), "5.20");
        assert_eq!(truncate_to_major_minor("5.20"), "5.20");
        assert_eq!(truncate_to_major_minor("5"), "5");
    }

    #[test]
    fn status_classification_matches_triage_table() {
        assert!(matches!(GatewayError::from_status(404), GatewayError::ApiClient(404)));
        assert!(matches!(GatewayError::from_status(503), GatewayError::ApiServer(503)));
        assert!(matches!(GatewayError::from_status(301), GatewayError::ApiOther(301)));
    }
}
