//! Match record shape accepted by the sink (§3 "Match record").
//!
//! Opaque to the engine beyond the attributes it reads for filtering; the
//! gateway is responsible for decoding the wire DTO into this type.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ParticipantPlayer {
    #[serde(rename = "summonerId")]
    pub summoner_id: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ParticipantIdentity {
    pub player: ParticipantPlayer,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchRecord {
    #[serde(rename = "matchId")]
    pub match_id: i64,
    #[serde(rename = "mapId")]
    pub map_id: i64,
    #[serde(rename = "matchVersion")]
    pub match_version: String,
    #[serde(rename = "participantIdentities")]
    pub participant_identities: Vec<ParticipantIdentity>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MatchRecord {
    pub fn participant_summoner_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.participant_identities
            .iter()
            .map(|p| p.player.summoner_id)
    }

    /// Single-line JSON serialization for the append-only sink.
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).expect("MatchRecord always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_json_line_has_no_newline() {
        let record = MatchRecord {
            match_id: 1,
            map_id: 11,
            match_version: "5.20.1".to_string(),
            participant_identities: vec![ParticipantIdentity {
                player: ParticipantPlayer { summoner_id: 42 },
            }],
            extra: Default::default(),
        };
        let line = record.to_json_line();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"matchId\":1"));
    }
}
