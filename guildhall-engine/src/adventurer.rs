//! Adventurer entity: attributes, derived level/experience, per-mission
//! result history, and death bookkeeping.
//!
//! Experience is never stored as a plain field. It is always recomputed as
//! `base_exp` plus the sum of per-mission gains, and level is a pure
//! function of that total, so no update path can desynchronize them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::attributes::{Attribute, AttributeBlock};
use crate::calendar::GuildDate;
use crate::error::Rejection;
use crate::mission::{Mission, MissionId, MissionState};

/// Newtype id for adventurers. Fresh ids are allocated by the Guild.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdventurerId(pub String);

impl AdventurerId {
    #[must_use]
    pub fn new(value: &str) -> Self {
        Self(value.trim().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdventurerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    #[default]
    Male,
    Female,
}

impl Sex {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Race {
    #[default]
    Human,
    Elf,
    Dwarf,
    Halfling,
    Gnome,
    #[serde(rename = "half-orc")]
    HalfOrc,
}

impl Race {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Elf => "elf",
            Self::Dwarf => "dwarf",
            Self::Halfling => "halfling",
            Self::Gnome => "gnome",
            Self::HalfOrc => "half-orc",
        }
    }
}

/// One row of the level table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRow {
    pub level: u8,
    pub exp_min: i64,
    pub exp_bonus: i32,
}

/// Monotone level table, levels 0-5. Extending it only requires appending
/// rows with strictly increasing `exp_min`.
pub const LEVEL_TABLE: [LevelRow; 6] = [
    LevelRow { level: 0, exp_min: 0, exp_bonus: 0 },
    LevelRow { level: 1, exp_min: 2, exp_bonus: 1 },
    LevelRow { level: 2, exp_min: 7, exp_bonus: 2 },
    LevelRow { level: 3, exp_min: 15, exp_bonus: 3 },
    LevelRow { level: 4, exp_min: 26, exp_bonus: 4 },
    LevelRow { level: 5, exp_min: 40, exp_bonus: 5 },
];

/// Level reached at a given cumulative experience total.
#[must_use]
pub fn level_for_exp(exp: i64) -> u8 {
    LEVEL_TABLE
        .iter()
        .rev()
        .find(|row| exp >= row.exp_min)
        .map_or(0, |row| row.level)
}

/// Experience bonus granted at a given level.
#[must_use]
pub fn exp_bonus_for_level(level: u8) -> i32 {
    LEVEL_TABLE
        .iter()
        .rev()
        .find(|row| level >= row.level)
        .map_or(0, |row| row.exp_bonus)
}

/// Stored outcome of one mission for one adventurer. Appended into the
/// adventurer's history when the mission is finished, never rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MissionResultRecord {
    #[serde(default)]
    pub crits_count: u32,
    #[serde(default)]
    pub died: bool,
    #[serde(default)]
    pub exp_gained: i64,
}

/// Derived adventurer lifecycle state. Never stored; always recomputed from
/// the death marker and the mission roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdventurerState {
    Waiting,
    Assigned,
    Away,
    Dead,
}

impl AdventurerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Assigned => "assigned",
            Self::Away => "away",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for AdventurerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creation payload for an adventurer, either hand-written or produced by
/// the random generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AdventurerData {
    pub name: String,
    #[serde(default)]
    pub portrait: String,
    #[serde(default)]
    pub sex: Sex,
    #[serde(default)]
    pub race: Race,
    #[serde(default)]
    pub class: Attribute,
    #[serde(default)]
    pub attributes: AttributeBlock,
    #[serde(default)]
    pub base_exp: i64,
}

/// A persistent guild member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adventurer {
    pub id: AdventurerId,
    pub name: String,
    #[serde(default)]
    pub portrait: String,
    #[serde(default)]
    pub sex: Sex,
    #[serde(default)]
    pub race: Race,
    /// One of the four main attributes; grants the class bonus during
    /// generation and is otherwise flavor.
    pub class: Attribute,
    #[serde(default)]
    pub attributes: AttributeBlock,
    /// Administratively assigned starting experience.
    #[serde(default)]
    pub base_exp: i64,
    /// Append-only mission id -> stored result mapping.
    #[serde(default)]
    pub mission_results: BTreeMap<MissionId, MissionResultRecord>,
    #[serde(default)]
    pub death_date: Option<GuildDate>,
    /// Prior deaths survive revival.
    #[serde(default)]
    pub past_death_dates: Vec<GuildDate>,
}

impl Adventurer {
    #[must_use]
    pub fn from_data(id: AdventurerId, data: AdventurerData) -> Self {
        Self {
            id,
            name: data.name,
            portrait: data.portrait,
            sex: data.sex,
            race: data.race,
            class: data.class,
            attributes: data.attributes,
            base_exp: data.base_exp,
            mission_results: BTreeMap::new(),
            death_date: None,
            past_death_dates: Vec::new(),
        }
    }

    /// Total experience: base plus the sum of per-mission gains.
    #[must_use]
    pub fn exp(&self) -> i64 {
        self.base_exp
            + self
                .mission_results
                .values()
                .map(|record| record.exp_gained)
                .sum::<i64>()
    }

    /// Level derived from total experience.
    #[must_use]
    pub fn level(&self) -> u8 {
        level_for_exp(self.exp())
    }

    /// Experience bonus derived from level.
    #[must_use]
    pub fn exp_bonus(&self) -> i32 {
        exp_bonus_for_level(self.level())
    }

    /// Lifetime critical rolls across all recorded missions.
    #[must_use]
    pub fn crits_count(&self) -> u32 {
        self.mission_results
            .values()
            .map(|record| record.crits_count)
            .sum()
    }

    /// Full roll modifier for one attribute: score modifier plus the
    /// level-derived experience bonus.
    #[must_use]
    pub fn total_roll_mod(&self, attribute: Attribute) -> i32 {
        self.attributes.modifier(attribute) + self.exp_bonus()
    }

    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.death_date.is_some()
    }

    /// Derived lifecycle state against the current mission roster.
    pub fn state<'a, I>(&self, missions: I, now: GuildDate) -> AdventurerState
    where
        I: IntoIterator<Item = &'a Mission>,
    {
        if self.is_dead() {
            return AdventurerState::Dead;
        }
        let engaged = missions
            .into_iter()
            .find(|mission| mission.finish_date.is_none() && mission.assigned.contains(&self.id));
        match engaged {
            None => AdventurerState::Waiting,
            Some(mission) if mission.state(now) == MissionState::Ongoing => AdventurerState::Away,
            Some(_) => AdventurerState::Assigned,
        }
    }

    /// Append the stored outcome of a finished mission. Returns false when
    /// a record for this mission already exists; the history is append-only
    /// and existing entries are never rewritten.
    pub fn record_mission_result(
        &mut self,
        mission_id: MissionId,
        record: MissionResultRecord,
    ) -> bool {
        if self.mission_results.contains_key(&mission_id) {
            return false;
        }
        self.mission_results.insert(mission_id, record);
        true
    }

    /// Mark the adventurer dead as of `date`. No-op for the already dead;
    /// the first death date stands.
    pub fn mark_dead(&mut self, date: GuildDate) {
        if self.death_date.is_none() {
            self.death_date = Some(date);
        }
    }

    /// Move the current death date into history and clear it.
    pub fn revive(&mut self) -> Result<(), Rejection> {
        match self.death_date.take() {
            Some(date) => {
                self.past_death_dates.push(date);
                Ok(())
            }
            None => Err(Rejection::NotDead {
                name: self.name.clone(),
            }),
        }
    }
}

/// Typed partial update for an adventurer. `None` fields are untouched;
/// `death_date` uses a nested `Option` so it can be explicitly cleared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdventurerPatch {
    pub name: Option<String>,
    pub portrait: Option<String>,
    pub attributes: Option<AttributeBlock>,
    pub base_exp: Option<i64>,
    pub death_date: Option<Option<GuildDate>>,
}

impl AdventurerPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.portrait.is_none()
            && self.attributes.is_none()
            && self.base_exp.is_none()
            && self.death_date.is_none()
    }

    /// Apply to an adventurer, returning the diff of fields that actually
    /// changed. Unchanged requested fields are dropped from the diff.
    pub fn apply(&self, adventurer: &mut Adventurer) -> Self {
        let mut applied = Self::default();
        if let Some(name) = &self.name
            && *name != adventurer.name
        {
            adventurer.name = name.clone();
            applied.name = Some(name.clone());
        }
        if let Some(portrait) = &self.portrait
            && *portrait != adventurer.portrait
        {
            adventurer.portrait = portrait.clone();
            applied.portrait = Some(portrait.clone());
        }
        if let Some(attributes) = self.attributes
            && attributes != adventurer.attributes
        {
            adventurer.attributes = attributes;
            applied.attributes = Some(attributes);
        }
        if let Some(base_exp) = self.base_exp
            && base_exp != adventurer.base_exp
        {
            adventurer.base_exp = base_exp;
            applied.base_exp = Some(base_exp);
        }
        if let Some(death_date) = self.death_date
            && death_date != adventurer.death_date
        {
            adventurer.death_date = death_date;
            applied.death_date = Some(death_date);
        }
        applied
    }
}
