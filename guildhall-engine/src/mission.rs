//! Mission entity: difficulty classes, risk tiers, rewards, the assignment
//! set, and the five-stage lifecycle state machine.
//!
//! States move strictly forward: open -> ready -> ongoing -> returned ->
//! logged. The state is never stored; it is derived from the assignment
//! count, the three lifecycle dates, and the caller-supplied "now".

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::adventurer::AdventurerId;
use crate::attributes::AttributeBlock;
use crate::calendar::GuildDate;
use crate::error::{EngineError, InvariantError, Rejection};
use crate::resolver::MissionResults;
use crate::seed;

/// Upper bound on distinct item rewards per mission.
pub const MAX_ITEM_REWARDS: usize = 3;

/// Newtype id for missions. The id string doubles as the deterministic
/// duration seed, so it must be stable for the mission's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissionId(pub String);

impl MissionId {
    #[must_use]
    pub fn new(value: &str) -> Self {
        Self(value.trim().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Risk tier. Each tier defines how far below the DC a failing check must
/// land before it kills the roller; fumbles always kill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    #[default]
    Low,
    Medium,
    High,
}

impl Risk {
    /// Lethality threshold: a check kills when
    /// `death_margin + margin < 0`. `None` means only fumbles kill.
    #[must_use]
    pub const fn death_margin(self) -> Option<i32> {
        match self {
            Self::Low => None,
            Self::Medium => Some(10),
            Self::High => Some(5),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Risk {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(()),
        }
    }
}

/// A cloneable item record resolved from the reward catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub name: String,
    /// Present when the catalog's item model carries a quantity field; the
    /// engine sets it instead of cloning the record N times.
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// An opaque item reference plus how many to grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReward {
    pub item_ref: String,
    #[serde(default = "ItemReward::default_quantity")]
    pub quantity: u32,
}

impl ItemReward {
    const fn default_quantity() -> u32 {
        1
    }
}

/// Mission reward table with the double-grant guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Rewards {
    #[serde(default)]
    pub gold: i64,
    #[serde(default)]
    pub items: Vec<ItemReward>,
    /// Free-text rewards ("a favor from the harbormaster").
    #[serde(default)]
    pub other: SmallVec<[String; 2]>,
    /// Set in the same operation that grants, so a retry after a
    /// collaborator failure is safe and a retry after success is rejected.
    #[serde(default)]
    pub granted: bool,
}

/// Lifecycle states in strict forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionState {
    /// Fewer than the minimum adventurers assigned; nothing actionable.
    Open,
    /// Assignment count within bounds and not started.
    Ready,
    /// Started, computed return date still in the future.
    Ongoing,
    /// Computed remaining duration has elapsed; finish permitted.
    Returned,
    /// Finished and logged; terminal.
    Logged,
}

impl MissionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Ready => "ready",
            Self::Ongoing => "ongoing",
            Self::Returned => "returned",
            Self::Logged => "logged",
        }
    }
}

impl fmt::Display for MissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creation payload for a mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionData {
    pub name: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub dc: AttributeBlock,
    #[serde(default)]
    pub risk: Risk,
    #[serde(default = "MissionData::default_duration")]
    pub duration_in_days: u16,
    #[serde(default = "MissionData::default_min")]
    pub min_adventurers: u8,
    #[serde(default = "MissionData::default_max")]
    pub max_adventurers: u8,
    #[serde(default)]
    pub rewards: Rewards,
}

impl MissionData {
    const fn default_duration() -> u16 {
        7
    }

    const fn default_min() -> u8 {
        1
    }

    const fn default_max() -> u8 {
        4
    }

    /// Validate creation bounds. Routine input errors, so rejections.
    pub fn validate(&self) -> Result<(), Rejection> {
        if self.min_adventurers == 0 || self.min_adventurers > self.max_adventurers {
            return Err(Rejection::InvalidPartyBounds {
                min: self.min_adventurers,
                max: self.max_adventurers,
            });
        }
        if self.duration_in_days == 0 {
            return Err(Rejection::ZeroDuration);
        }
        if self.rewards.items.len() > MAX_ITEM_REWARDS {
            return Err(Rejection::TooManyItemRewards {
                max: MAX_ITEM_REWARDS,
            });
        }
        Ok(())
    }
}

impl Default for MissionData {
    fn default() -> Self {
        Self {
            name: String::new(),
            hidden: false,
            dc: AttributeBlock::default(),
            risk: Risk::default(),
            duration_in_days: Self::default_duration(),
            min_adventurers: Self::default_min(),
            max_adventurers: Self::default_max(),
            rewards: Rewards::default(),
        }
    }
}

/// A time-boxed job on the guild board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub name: String,
    /// Hidden missions are not shown on the board until revealed.
    #[serde(default)]
    pub hidden: bool,
    /// Difficulty class per attribute (four main plus support).
    #[serde(default)]
    pub dc: AttributeBlock,
    #[serde(default)]
    pub risk: Risk,
    /// Nominal duration; the actual schedule uses the seeded estimate.
    pub duration_in_days: u16,
    pub min_adventurers: u8,
    pub max_adventurers: u8,
    #[serde(default)]
    pub rewards: Rewards,
    #[serde(default)]
    pub assigned: BTreeSet<AdventurerId>,
    #[serde(default)]
    pub start_date: Option<GuildDate>,
    #[serde(default)]
    pub return_date: Option<GuildDate>,
    #[serde(default)]
    pub finish_date: Option<GuildDate>,
    /// Set exactly once when the mission starts; immutable afterwards
    /// except for the summary text rewritten by an early return.
    #[serde(default)]
    pub results: Option<MissionResults>,
}

impl Mission {
    #[must_use]
    pub fn from_data(id: MissionId, data: MissionData) -> Self {
        Self {
            id,
            name: data.name,
            hidden: data.hidden,
            dc: data.dc,
            risk: data.risk,
            duration_in_days: data.duration_in_days,
            min_adventurers: data.min_adventurers,
            max_adventurers: data.max_adventurers,
            rewards: data.rewards,
            assigned: BTreeSet::new(),
            start_date: None,
            return_date: None,
            finish_date: None,
            results: None,
        }
    }

    /// Deterministic estimated duration: same mission id and nominal
    /// duration always estimate the same day count.
    #[must_use]
    pub fn estimated_duration_days(&self) -> u16 {
        seed::estimated_duration_days(self.id.as_str(), self.duration_in_days)
    }

    #[must_use]
    pub const fn has_started(&self) -> bool {
        self.start_date.is_some()
    }

    /// Whether the computed return date has elapsed.
    #[must_use]
    pub fn has_returned(&self, now: GuildDate) -> bool {
        self.return_date.is_some_and(|date| now >= date)
    }

    /// Days until the party is back; zero or negative once returned.
    #[must_use]
    pub fn remaining_days(&self, now: GuildDate) -> i64 {
        self.return_date.map_or(0, |date| now.days_until(date))
    }

    /// Whether the mission appears on the board.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        !self.hidden
    }

    /// Derived lifecycle state.
    #[must_use]
    pub fn state(&self, now: GuildDate) -> MissionState {
        if self.finish_date.is_some() {
            return MissionState::Logged;
        }
        if self.has_started() {
            return if self.has_returned(now) {
                MissionState::Returned
            } else {
                MissionState::Ongoing
            };
        }
        let count = self.assigned.len();
        if count >= usize::from(self.min_adventurers) && count <= usize::from(self.max_adventurers)
        {
            MissionState::Ready
        } else {
            MissionState::Open
        }
    }

    #[must_use]
    pub fn can_start(&self, now: GuildDate) -> bool {
        self.state(now) == MissionState::Ready
    }

    /// Add an adventurer to the party. Capacity and duplicate violations
    /// are rejections; touching the set after start is an invariant breach.
    pub fn assign(&mut self, id: AdventurerId, name: &str) -> Result<(), EngineError> {
        if self.has_started() {
            return Err(InvariantError::AssignmentLocked.into());
        }
        if self.assigned.contains(&id) {
            return Err(Rejection::AlreadyAssigned {
                name: name.to_string(),
            }
            .into());
        }
        if self.assigned.len() >= usize::from(self.max_adventurers) {
            return Err(Rejection::CapacityReached {
                max: self.max_adventurers,
            }
            .into());
        }
        self.assigned.insert(id);
        Ok(())
    }

    /// Remove an adventurer from the party. Returns whether anything was
    /// removed; unassigning an absent adventurer is a quiet no-op.
    pub fn unassign(&mut self, id: &AdventurerId) -> Result<bool, InvariantError> {
        if self.has_started() {
            return Err(InvariantError::AssignmentLocked);
        }
        Ok(self.assigned.remove(id))
    }

    /// Clear the whole party.
    pub fn unassign_all(&mut self) -> Result<(), InvariantError> {
        if self.has_started() {
            return Err(InvariantError::AssignmentLocked);
        }
        self.assigned.clear();
        Ok(())
    }

    /// Store the resolution snapshot together with the start and computed
    /// return dates. One call site (Guild::start_mission); the state guard
    /// lives there so the whole transition is checked before any write.
    pub(crate) fn record_start(&mut self, start: GuildDate, results: MissionResults) {
        debug_assert!(self.results.is_none(), "results are set exactly once");
        self.return_date = Some(start.add_days(i64::from(self.estimated_duration_days())));
        self.start_date = Some(start);
        self.results = Some(results);
    }

    /// Administrative early return: force the return date to now and
    /// rewrite only the cosmetic summary; rolls and outcomes stand.
    pub fn return_now(&mut self, now: GuildDate) -> Result<(), EngineError> {
        let state = self.state(now);
        if state != MissionState::Ongoing {
            return Err(InvariantError::WrongMissionState {
                operation: "return_now",
                required: MissionState::Ongoing.as_str(),
                actual: state.as_str(),
            }
            .into());
        }
        self.return_date = Some(now);
        if let Some(results) = &mut self.results {
            results.summary.push_str(&format!("\nRecalled early on {now}."));
        }
        Ok(())
    }

    pub(crate) fn record_finish(&mut self, now: GuildDate) {
        self.finish_date = Some(now);
    }
}

/// Typed partial update for a mission. Roll-bearing fields (DCs, risk,
/// duration, party bounds) are locked once the mission has started.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MissionPatch {
    pub name: Option<String>,
    pub hidden: Option<bool>,
    pub dc: Option<AttributeBlock>,
    pub risk: Option<Risk>,
    pub duration_in_days: Option<u16>,
    pub min_adventurers: Option<u8>,
    pub max_adventurers: Option<u8>,
    pub gold: Option<i64>,
    pub items: Option<Vec<ItemReward>>,
    pub other: Option<Vec<String>>,
}

impl MissionPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.hidden.is_none()
            && self.dc.is_none()
            && self.risk.is_none()
            && self.duration_in_days.is_none()
            && self.min_adventurers.is_none()
            && self.max_adventurers.is_none()
            && self.gold.is_none()
            && self.items.is_none()
            && self.other.is_none()
    }

    fn locked_field(&self, mission: &Mission) -> Option<&'static str> {
        if !mission.has_started() {
            return None;
        }
        if self.dc.is_some() {
            Some("dc")
        } else if self.risk.is_some() {
            Some("risk")
        } else if self.duration_in_days.is_some() {
            Some("duration_in_days")
        } else if self.min_adventurers.is_some() {
            Some("min_adventurers")
        } else if self.max_adventurers.is_some() {
            Some("max_adventurers")
        } else {
            None
        }
    }

    /// Apply to a mission, returning the diff of fields that actually
    /// changed. Nothing is written when any part of the patch is illegal.
    pub fn apply(&self, mission: &mut Mission, now: GuildDate) -> Result<Self, EngineError> {
        let state = mission.state(now);
        if state == MissionState::Logged && !self.is_empty() {
            return Err(InvariantError::WrongMissionState {
                operation: "update",
                required: "any state before logged",
                actual: state.as_str(),
            }
            .into());
        }
        if let Some(field) = self.locked_field(mission) {
            return Err(InvariantError::MissionFieldLocked { field }.into());
        }
        if let Some(items) = &self.items
            && items.len() > MAX_ITEM_REWARDS
        {
            return Err(Rejection::TooManyItemRewards {
                max: MAX_ITEM_REWARDS,
            }
            .into());
        }
        let min = self.min_adventurers.unwrap_or(mission.min_adventurers);
        let max = self.max_adventurers.unwrap_or(mission.max_adventurers);
        if (self.min_adventurers.is_some() || self.max_adventurers.is_some())
            && (min == 0 || min > max)
        {
            return Err(Rejection::InvalidPartyBounds { min, max }.into());
        }

        let mut applied = Self::default();
        if let Some(name) = &self.name
            && *name != mission.name
        {
            mission.name = name.clone();
            applied.name = Some(name.clone());
        }
        if let Some(hidden) = self.hidden
            && hidden != mission.hidden
        {
            mission.hidden = hidden;
            applied.hidden = Some(hidden);
        }
        if let Some(dc) = self.dc
            && dc != mission.dc
        {
            mission.dc = dc;
            applied.dc = Some(dc);
        }
        if let Some(risk) = self.risk
            && risk != mission.risk
        {
            mission.risk = risk;
            applied.risk = Some(risk);
        }
        if let Some(duration) = self.duration_in_days
            && duration != mission.duration_in_days
        {
            mission.duration_in_days = duration;
            applied.duration_in_days = Some(duration);
        }
        if let Some(min) = self.min_adventurers
            && min != mission.min_adventurers
        {
            mission.min_adventurers = min;
            applied.min_adventurers = Some(min);
        }
        if let Some(max) = self.max_adventurers
            && max != mission.max_adventurers
        {
            mission.max_adventurers = max;
            applied.max_adventurers = Some(max);
        }
        if let Some(gold) = self.gold
            && gold != mission.rewards.gold
        {
            mission.rewards.gold = gold;
            applied.gold = Some(gold);
        }
        if let Some(items) = &self.items
            && *items != mission.rewards.items
        {
            mission.rewards.items = items.clone();
            applied.items = Some(items.clone());
        }
        if let Some(other) = &self.other
            && mission.rewards.other.as_slice() != other.as_slice()
        {
            mission.rewards.other = SmallVec::from_vec(other.clone());
            applied.other = Some(other.clone());
        }
        Ok(applied)
    }
}
