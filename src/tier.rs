//! Totally-ordered skill tier enumeration (C1).
//!
//! Ordered by ordinal, strongest first: `Challenger < Master < ... < Bronze`.
//! Lower ordinal means a *better* tier; `best`/`worst` compare ordinals, not
//! names. Mirrors `original_source/lol_scraper/data_types.py`'s `Tier` enum.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no tier with name '{0}'")]
pub struct TierError(pub String);

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Challenger = 0,
    Master = 1,
    Diamond = 2,
    Platinum = 3,
    Gold = 4,
    Silver = 5,
    Bronze = 6,
}

pub const ALL_TIERS: [Tier; 7] = [
    Tier::Challenger,
    Tier::Master,
    Tier::Diamond,
    Tier::Platinum,
    Tier::Gold,
    Tier::Silver,
    Tier::Bronze,
];

impl Tier {
    /// Case-insensitive, single-letter-prefix parse (`"Gold"`, `"g"`, `"GOLD"` all work).
    pub fn parse(s: &str) -> Result<Tier, TierError> {
        let initial = s
            .chars()
            .next()
            .ok_or_else(|| TierError(s.to_string()))?
            .to_ascii_lowercase();
        match initial {
            'c' => Ok(Tier::Challenger),
            'm' => Ok(Tier::Master),
            'd' => Ok(Tier::Diamond),
            'p' => Ok(Tier::Platinum),
            'g' => Ok(Tier::Gold),
            's' => Ok(Tier::Silver),
            'b' => Ok(Tier::Bronze),
            _ => Err(TierError(s.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tier::Challenger => "challenger",
            Tier::Master => "master",
            Tier::Diamond => "diamond",
            Tier::Platinum => "platinum",
            Tier::Gold => "gold",
            Tier::Silver => "silver",
            Tier::Bronze => "bronze",
        }
    }

    /// Smaller ordinal wins.
    pub fn best(self, other: Tier) -> Tier {
        if self as u8 <= other as u8 {
            self
        } else {
            other
        }
    }

    /// Larger ordinal wins.
    pub fn worst(self, other: Tier) -> Tier {
        if self as u8 >= other as u8 {
            self
        } else {
            other
        }
    }

    pub fn is_better_or_equal(self, other: Tier) -> bool {
        (self as u8) <= (other as u8)
    }

    /// Every tier at least as strong as `tier`, challenger-first.
    pub fn equals_and_above(tier: Tier) -> impl Iterator<Item = Tier> {
        ALL_TIERS
            .into_iter()
            .filter(move |t| t.is_better_or_equal(tier))
    }

    /// The strict complement of `equals_and_above`.
    pub fn all_below(tier: Tier) -> impl Iterator<Item = Tier> {
        ALL_TIERS
            .into_iter()
            .filter(move |t| !t.is_better_or_equal(tier))
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Matchmade queue the game was played in.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    #[serde(rename = "RANKED_SOLO_5x5")]
    RankedSolo5x5,
    #[serde(rename = "RANKED_TEAM_3x3")]
    RankedTeam3x3,
    #[serde(rename = "RANKED_TEAM_5x5")]
    RankedTeam5x5,
}

impl Default for Queue {
    fn default() -> Self {
        Queue::RankedSolo5x5
    }
}

impl Queue {
    pub fn name(&self) -> &'static str {
        match self {
            Queue::RankedSolo5x5 => "RANKED_SOLO_5x5",
            Queue::RankedTeam3x3 => "RANKED_TEAM_3x3",
            Queue::RankedTeam5x5 => "RANKED_TEAM_5x5",
        }
    }

    pub fn parse(s: &str) -> Result<Queue, TierError> {
        match s {
            "RANKED_SOLO_5x5" => Ok(Queue::RankedSolo5x5),
            "RANKED_TEAM_3x3" => Ok(Queue::RankedTeam3x3),
            "RANKED_TEAM_5x5" => Ok(Queue::RankedTeam5x5),
            other => Err(TierError(other.to_string())),
        }
    }
}

/// The map a match was played on. Only one variant exists today, matching
/// the source's single-member `Maps` enum, but it is parsed rather than
/// hardcoded so a second map can be added without touching the engine.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameMap {
    SummonersRift,
}

impl GameMap {
    pub fn id(&self) -> i64 {
        match self {
            GameMap::SummonersRift => 11,
        }
    }

    pub fn parse(s: &str) -> Result<GameMap, TierError> {
        match s {
            "SUMMONERS_RIFT" => Ok(GameMap::SummonersRift),
            other => Err(TierError(other.to_string())),
        }
    }
}

impl Default for GameMap {
    fn default() -> Self {
        GameMap::SummonersRift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive_and_prefix_based() {
        for (input, expected) in [
            ("gold", Tier::Gold),
            ("GOLD", Tier::Gold),
            ("g", Tier::Gold),
            ("Challenger", Tier::Challenger),
            ("bronzeee", Tier::Bronze),
        ] {
            assert_eq!(Tier::parse(input).unwrap(), expected);
        }
    }

    #[test]
    fn parse_idempotent() {
        for t in ALL_TIERS {
            let once = Tier::parse(t.name()).unwrap();
            let twice = Tier::parse(once.name()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!(Tier::parse("z").is_err());
        assert!(Tier::parse("").is_err());
    }

    #[test]
    fn ordinal_ordering_not_name_ordering() {
        assert_eq!(Tier::Challenger.best(Tier::Bronze), Tier::Challenger);
        assert_eq!(Tier::Challenger.worst(Tier::Bronze), Tier::Bronze);
        assert!(Tier::Master.is_better_or_equal(Tier::Master));
        assert!(Tier::Master.is_better_or_equal(Tier::Diamond));
        assert!(!Tier::Diamond.is_better_or_equal(Tier::Master));
    }

    #[test]
    fn equals_and_above_and_all_below_are_complements() {
        let above: Vec<_> = Tier::equals_and_above(Tier::Gold).collect();
        let below: Vec<_> = Tier::all_below(Tier::Gold).collect();
        assert_eq!(above.len() + below.len(), ALL_TIERS.len());
        assert!(above.contains(&Tier::Gold));
        assert!(!below.contains(&Tier::Gold));
        assert!(above.contains(&Tier::Challenger));
        assert!(below.contains(&Tier::Bronze));
    }
}
