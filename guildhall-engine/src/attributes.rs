//! Shared attribute schema used by adventurers and mission difficulty classes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five named attributes. Brawn, cunning, spellcraft, and influence are
/// "main" attributes: a mission rolls exactly one check per main attribute,
/// made by the best-suited assigned adventurer. Reliability is the "support"
/// attribute: every assigned adventurer rolls it individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    #[default]
    Brawn,
    Cunning,
    Spellcraft,
    Influence,
    Reliability,
}

impl Attribute {
    /// All attributes in canonical order.
    pub const ALL: [Self; 5] = [
        Self::Brawn,
        Self::Cunning,
        Self::Spellcraft,
        Self::Influence,
        Self::Reliability,
    ];

    /// The four main attributes in canonical order.
    pub const MAIN: [Self; 4] = [
        Self::Brawn,
        Self::Cunning,
        Self::Spellcraft,
        Self::Influence,
    ];

    /// The single support attribute.
    pub const SUPPORT: Self = Self::Reliability;

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Brawn => "brawn",
            Self::Cunning => "cunning",
            Self::Spellcraft => "spellcraft",
            Self::Influence => "influence",
            Self::Reliability => "reliability",
        }
    }

    #[must_use]
    pub const fn is_main(self) -> bool {
        !matches!(self, Self::Reliability)
    }

    #[must_use]
    pub const fn is_support(self) -> bool {
        matches!(self, Self::Reliability)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brawn" => Ok(Self::Brawn),
            "cunning" => Ok(Self::Cunning),
            "spellcraft" => Ok(Self::Spellcraft),
            "influence" => Ok(Self::Influence),
            "reliability" => Ok(Self::Reliability),
            _ => Err(()),
        }
    }
}

/// Derived roll modifier for an attribute score: floor((score - 10) / 2).
#[must_use]
pub const fn score_modifier(score: i32) -> i32 {
    (score - 10).div_euclid(2)
}

/// One integer value per named attribute. Used both for adventurer base
/// scores and for mission difficulty classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeBlock {
    #[serde(default = "AttributeBlock::default_score")]
    pub brawn: i32,
    #[serde(default = "AttributeBlock::default_score")]
    pub cunning: i32,
    #[serde(default = "AttributeBlock::default_score")]
    pub spellcraft: i32,
    #[serde(default = "AttributeBlock::default_score")]
    pub influence: i32,
    #[serde(default = "AttributeBlock::default_score")]
    pub reliability: i32,
}

impl AttributeBlock {
    const fn default_score() -> i32 {
        10
    }

    /// A block with the same value in every slot.
    #[must_use]
    pub const fn uniform(value: i32) -> Self {
        Self {
            brawn: value,
            cunning: value,
            spellcraft: value,
            influence: value,
            reliability: value,
        }
    }

    #[must_use]
    pub const fn get(&self, attribute: Attribute) -> i32 {
        match attribute {
            Attribute::Brawn => self.brawn,
            Attribute::Cunning => self.cunning,
            Attribute::Spellcraft => self.spellcraft,
            Attribute::Influence => self.influence,
            Attribute::Reliability => self.reliability,
        }
    }

    pub const fn set(&mut self, attribute: Attribute, value: i32) {
        match attribute {
            Attribute::Brawn => self.brawn = value,
            Attribute::Cunning => self.cunning = value,
            Attribute::Spellcraft => self.spellcraft = value,
            Attribute::Influence => self.influence = value,
            Attribute::Reliability => self.reliability = value,
        }
    }

    /// Derived modifier for one attribute in this block.
    #[must_use]
    pub const fn modifier(&self, attribute: Attribute) -> i32 {
        score_modifier(self.get(attribute))
    }
}

impl Default for AttributeBlock {
    fn default() -> Self {
        Self::uniform(Self::default_score())
    }
}
