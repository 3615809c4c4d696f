//! Tier-bucketed ID containers (C2).
//!
//! `TierSet` maps `Tier -> HashSet<i64>` with an optional per-tier capacity.
//! `TierSeed` adds player-location lookups and defaults its cap to 1000.
//! Grounded in `original_source/lol_scraper/data_types.py`'s `TierSet`/`TierSeed`.

use std::collections::HashMap;

use nohash_hasher::IntSet;
use serde::{Deserialize, Serialize};

use crate::tier::{Tier, ALL_TIERS};

type IdSet = IntSet<i64>;

#[derive(Debug, Clone)]
pub struct TierSet {
    tiers: HashMap<Tier, IdSet>,
    max_items_per_set: usize,
}

impl Default for TierSet {
    fn default() -> Self {
        TierSet::new(0)
    }
}

impl TierSet {
    /// `max_items_per_set == 0` means unbounded (I3 does not apply).
    pub fn new(max_items_per_set: usize) -> Self {
        TierSet {
            tiers: HashMap::new(),
            max_items_per_set,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.values().all(|s| s.is_empty())
    }

    pub fn len(&self) -> usize {
        self.tiers.values().map(|s| s.len()).sum()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.tiers.values().any(|s| s.contains(&id))
    }

    pub fn tier(&self, tier: Tier) -> impl Iterator<Item = i64> + '_ {
        self.tiers.get(&tier).into_iter().flatten().copied()
    }

    pub fn tier_len(&self, tier: Tier) -> usize {
        self.tiers.get(&tier).map_or(0, |s| s.len())
    }

    /// Add `values` to `tier`, truncating silently once the cap is hit (I3).
    pub fn update_tier(&mut self, values: impl IntoIterator<Item = i64>, tier: Tier) {
        let set = self.tiers.entry(tier).or_default();
        if self.max_items_per_set == 0 {
            set.extend(values);
            return;
        }
        let can_add = self.max_items_per_set.saturating_sub(set.len());
        for v in values.into_iter().take(can_add) {
            set.insert(v);
        }
    }

    /// Tier-by-tier additive merge (`+=`).
    pub fn merge(&mut self, other: &TierSet) {
        for tier in ALL_TIERS {
            if let Some(addition) = other.tiers.get(&tier) {
                if !addition.is_empty() {
                    self.update_tier(addition.iter().copied(), tier);
                }
            }
        }
    }

    /// Remove every id present in `other` from the matching tier (`-=`).
    pub fn subtract(&mut self, other: &TierSet) {
        for (tier, values) in self.tiers.iter_mut() {
            if let Some(removal) = other.tiers.get(tier) {
                for id in removal {
                    values.remove(id);
                }
            }
        }
    }

    /// Pop up to `clamp(min_n, floor(pct * |set|), |set|)` elements from
    /// `tier`, in arbitrary order (I2: never more than the set holds).
    pub fn consume(&mut self, tier: Tier, min_n: usize, pct: f64) -> Vec<i64> {
        let Some(set) = self.tiers.get_mut(&tier) else {
            return Vec::new();
        };
        let len = set.len();
        let by_pct = (pct * len as f64).floor() as usize;
        let want = min_n.max(by_pct).min(len);
        let mut out = Vec::with_capacity(want);
        for _ in 0..want {
            if let Some(&id) = set.iter().next() {
                set.remove(&id);
                out.push(id);
            } else {
                break;
            }
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (tier, values) in &self.tiers {
            if !values.is_empty() {
                let ids: Vec<i64> = values.iter().copied().collect();
                map.insert(tier.name().to_string(), serde_json::json!(ids));
            }
        }
        serde_json::Value::Object(map)
    }

    pub fn from_json(value: &serde_json::Value) -> Result<TierSet, crate::tier::TierError> {
        let mut out = TierSet::default();
        if let Some(obj) = value.as_object() {
            for (name, ids) in obj {
                let tier = Tier::parse(name)?;
                let values: Vec<i64> = ids
                    .as_array()
                    .map(|a| a.iter().filter_map(|v| v.as_i64()).collect())
                    .unwrap_or_default();
                out.tiers.insert(tier, values.into_iter().collect());
            }
        }
        Ok(out)
    }
}

impl Serialize for TierSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TierSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        TierSet::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// `TierSet` plus player-location queries, defaulting to a 1000-item cap.
#[derive(Debug, Clone)]
pub struct TierSeed(TierSet);

impl Default for TierSeed {
    fn default() -> Self {
        TierSeed(TierSet::new(1000))
    }
}

impl TierSeed {
    pub fn new(max_items_per_set: usize) -> Self {
        TierSeed(TierSet::new(max_items_per_set))
    }

    pub fn inner(&self) -> &TierSet {
        &self.0
    }

    pub fn inner_mut(&mut self) -> &mut TierSet {
        &mut self.0
    }

    /// `Some(tier)` the player is filed under; `None` if not present (I1
    /// guarantees there is at most one).
    pub fn get_player_tier(&self, player_id: i64) -> Option<Tier> {
        ALL_TIERS
            .into_iter()
            .find(|&t| self.0.tiers.get(&t).is_some_and(|s| s.contains(&player_id)))
    }

    pub fn remove_players_below_tier(&mut self, tier: Tier) {
        for t in Tier::all_below(tier) {
            self.0.tiers.remove(&t);
        }
    }
}

impl std::ops::Deref for TierSeed {
    type Target = TierSet;
    fn deref(&self) -> &TierSet {
        &self.0
    }
}

impl std::ops::DerefMut for TierSeed {
    fn deref_mut(&mut self) -> &mut TierSet {
        &mut self.0
    }
}
