use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

/// Rarity tier of a collectible item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    /// Price of an item of this tier at a 1.0x market multiplier.
    pub fn base_price(&self) -> u64 {
        match self {
            Rarity::Common => 20,
            Rarity::Uncommon => 60,
            Rarity::Rare => 150,
            Rarity::Epic => 400,
            Rarity::Legendary => 1_200,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum RarityTableError {
    #[error("rarity table is empty")]
    Empty,
    #[error("rarity {0} has zero weight")]
    ZeroWeight(Rarity),
    #[error("rarity {0} listed twice")]
    Duplicate(Rarity),
    #[error("total weight overflows")]
    Overflow,
}

/// Ordered `(rarity, weight)` pairs used for cumulative-weight sampling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(Rarity, u32)>", into = "Vec<(Rarity, u32)>")]
pub struct RarityTable {
    tiers: Vec<(Rarity, u32)>,
    total: u64,
}

impl RarityTable {
    pub fn new(tiers: Vec<(Rarity, u32)>) -> Result<Self, RarityTableError> {
        if tiers.is_empty() {
            return Err(RarityTableError::Empty);
        }
        let mut total: u64 = 0;
        for (idx, (rarity, weight)) in tiers.iter().enumerate() {
            if *weight == 0 {
                return Err(RarityTableError::ZeroWeight(*rarity));
            }
            if tiers[..idx].iter().any(|(seen, _)| seen == rarity) {
                return Err(RarityTableError::Duplicate(*rarity));
            }
            total = total
                .checked_add(*weight as u64)
                .ok_or(RarityTableError::Overflow)?;
        }
        Ok(Self { tiers, total })
    }

    pub fn tiers(&self) -> &[(Rarity, u32)] {
        &self.tiers
    }

    pub fn total_weight(&self) -> u64 {
        self.total
    }

    /// Maps a uniform draw `u` in `[0, total_weight)` to the tier whose span contains it.
    ///
    /// Values at or beyond the total land in the last tier.
    pub fn tier_at(&self, u: u64) -> Rarity {
        let mut cumulative: u64 = 0;
        for (rarity, weight) in &self.tiers {
            cumulative += *weight as u64;
            if u < cumulative {
                return *rarity;
            }
        }
        self.tiers[self.tiers.len() - 1].0
    }
}

impl Default for RarityTable {
    fn default() -> Self {
        Self {
            tiers: vec![
                (Rarity::Common, 600),
                (Rarity::Uncommon, 250),
                (Rarity::Rare, 100),
                (Rarity::Epic, 40),
                (Rarity::Legendary, 10),
            ],
            total: 1_000,
        }
    }
}

impl TryFrom<Vec<(Rarity, u32)>> for RarityTable {
    type Error = RarityTableError;

    fn try_from(value: Vec<(Rarity, u32)>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RarityTable> for Vec<(Rarity, u32)> {
    fn from(value: RarityTable) -> Self {
        value.tiers
    }
}
