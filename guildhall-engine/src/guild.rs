//! Guild aggregate root.
//!
//! Owns the adventurer and mission collections and is the sole mutation
//! surface: every creation, patch, assignment, and lifecycle transition
//! funnels through here, so a persisted snapshot of the whole aggregate is
//! always internally consistent. The in-memory Guild is a cache over that
//! snapshot; [`Guild::apply_remote_snapshot`] rebuilds it wholesale when
//! the persistence layer reports an external change.

use log::debug;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::adventurer::{
    Adventurer, AdventurerData, AdventurerId, AdventurerPatch, AdventurerState,
};
use crate::calendar::GuildDate;
use crate::error::{CollaboratorError, EngineError, InvariantError, Rejection};
use crate::generate;
use crate::mission::{
    ItemRecord, Mission, MissionData, MissionId, MissionPatch, MissionState,
};
use crate::resolver::{MissionResults, Resolver};
use crate::{RewardCatalog, RewardSink};

const ID_LENGTH: usize = 16;

/// The aggregate: a roster of adventurers and a board of missions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Guild {
    pub name: String,
    #[serde(default)]
    adventurers: BTreeMap<AdventurerId, Adventurer>,
    #[serde(default)]
    missions: BTreeMap<MissionId, Mission>,
}

impl Guild {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            adventurers: BTreeMap::new(),
            missions: BTreeMap::new(),
        }
    }

    // ---- reads ------------------------------------------------------

    #[must_use]
    pub fn adventurer(&self, id: &AdventurerId) -> Option<&Adventurer> {
        self.adventurers.get(id)
    }

    #[must_use]
    pub fn mission(&self, id: &MissionId) -> Option<&Mission> {
        self.missions.get(id)
    }

    pub fn adventurers(&self) -> impl Iterator<Item = &Adventurer> {
        self.adventurers.values()
    }

    pub fn missions(&self) -> impl Iterator<Item = &Mission> {
        self.missions.values()
    }

    /// Missions shown on the board (hidden ones are not assignable yet).
    pub fn visible_missions(&self) -> impl Iterator<Item = &Mission> {
        self.missions.values().filter(|mission| mission.is_visible())
    }

    /// Derived lifecycle state for one adventurer.
    pub fn adventurer_state(
        &self,
        id: &AdventurerId,
        now: GuildDate,
    ) -> Result<AdventurerState, InvariantError> {
        let adventurer = self.require_adventurer(id)?;
        Ok(adventurer.state(self.missions.values(), now))
    }

    /// The unfinished mission an adventurer is currently committed to.
    #[must_use]
    pub fn engagement(&self, id: &AdventurerId) -> Option<&Mission> {
        self.missions
            .values()
            .find(|mission| mission.finish_date.is_none() && mission.assigned.contains(id))
    }

    // ---- creation ---------------------------------------------------

    /// Allocate a fresh id unused by either collection.
    fn allocate_id<R: Rng>(&self, rng: &mut R) -> String {
        loop {
            let id: String = rng
                .sample_iter(&Alphanumeric)
                .take(ID_LENGTH)
                .map(char::from)
                .collect();
            let used = self.adventurers.contains_key(&AdventurerId(id.clone()))
                || self.missions.contains_key(&MissionId(id.clone()));
            if !used {
                return id;
            }
        }
    }

    /// Create an adventurer from an explicit payload. Returns the live
    /// instance from the collection, not the transient payload.
    pub fn create_adventurer_from_data<R: Rng>(
        &mut self,
        data: AdventurerData,
        rng: &mut R,
    ) -> &Adventurer {
        let id = AdventurerId(self.allocate_id(rng));
        debug!("guild '{}': creating adventurer {id}", self.name);
        let adventurer = Adventurer::from_data(id.clone(), data);
        self.adventurers.insert(id.clone(), adventurer);
        &self.adventurers[&id]
    }

    /// Create a randomly generated adventurer, avoiding portrait
    /// collisions with the current roster.
    pub fn create_adventurer_random<R: Rng>(&mut self, rng: &mut R) -> &Adventurer {
        let taken: Vec<String> = self
            .adventurers
            .values()
            .map(|adventurer| adventurer.portrait.clone())
            .collect();
        let data = generate::generate_adventurer(rng, &taken);
        self.create_adventurer_from_data(data, rng)
    }

    /// Create a mission from an explicit payload.
    pub fn create_mission_from_data<R: Rng>(
        &mut self,
        data: MissionData,
        rng: &mut R,
    ) -> Result<&Mission, EngineError> {
        data.validate()?;
        let id = MissionId(self.allocate_id(rng));
        debug!("guild '{}': creating mission {id}", self.name);
        let mission = Mission::from_data(id.clone(), data);
        self.missions.insert(id.clone(), mission);
        Ok(&self.missions[&id])
    }

    // ---- updates ----------------------------------------------------

    /// Apply a typed patch to an adventurer, returning the applied diff.
    pub fn update_adventurer(
        &mut self,
        id: &AdventurerId,
        patch: &AdventurerPatch,
    ) -> Result<AdventurerPatch, EngineError> {
        let adventurer = self
            .adventurers
            .get_mut(id)
            .ok_or_else(|| InvariantError::UnknownAdventurer { id: id.0.clone() })?;
        Ok(patch.apply(adventurer))
    }

    /// Apply a typed patch to a mission, returning the applied diff.
    pub fn update_mission(
        &mut self,
        id: &MissionId,
        patch: &MissionPatch,
        now: GuildDate,
    ) -> Result<MissionPatch, EngineError> {
        let mission = self
            .missions
            .get_mut(id)
            .ok_or_else(|| InvariantError::UnknownMission { id: id.0.clone() })?;
        patch.apply(mission, now)
    }

    /// Delete entities by raw id. Each id must resolve to exactly one
    /// collection; all ids are validated before anything is removed, so a
    /// failed call deletes nothing.
    pub fn delete_embedded(&mut self, ids: &[&str], now: GuildDate) -> Result<(), EngineError> {
        for raw in ids {
            let as_adventurer = AdventurerId::new(raw);
            let as_mission = MissionId::new(raw);
            match (
                self.adventurers.get(&as_adventurer),
                self.missions.get(&as_mission),
            ) {
                (Some(adventurer), None) => {
                    if self.engagement(&as_adventurer).is_some() {
                        return Err(InvariantError::AdventurerStillAssigned {
                            name: adventurer.name.clone(),
                        }
                        .into());
                    }
                }
                (None, Some(mission)) => {
                    if mission.state(now) == MissionState::Ongoing {
                        return Err(Rejection::DeleteOngoingMission {
                            name: mission.name.clone(),
                        }
                        .into());
                    }
                }
                _ => {
                    return Err(InvariantError::AmbiguousId {
                        id: (*raw).to_string(),
                    }
                    .into());
                }
            }
        }
        for raw in ids {
            let removed_adventurer = self.adventurers.remove(&AdventurerId::new(raw)).is_some();
            if !removed_adventurer {
                self.missions.remove(&MissionId::new(raw));
            }
            debug!("guild '{}': deleted {raw}", self.name);
        }
        Ok(())
    }

    // ---- assignment -------------------------------------------------

    /// Assign an adventurer to a mission. Validates existence, death,
    /// exclusivity, capacity, and duplicates; rejections leave both the
    /// mission and the adventurer untouched.
    pub fn assign_adventurer(
        &mut self,
        mission_id: &MissionId,
        adventurer_id: &AdventurerId,
    ) -> Result<(), EngineError> {
        let adventurer = self.require_adventurer(adventurer_id)?;
        if adventurer.is_dead() {
            return Err(Rejection::AdventurerDead {
                name: adventurer.name.clone(),
            }
            .into());
        }
        if let Some(elsewhere) = self.engagement(adventurer_id)
            && elsewhere.id != *mission_id
        {
            return Err(Rejection::AssignedElsewhere {
                name: adventurer.name.clone(),
                mission: elsewhere.name.clone(),
            }
            .into());
        }
        let name = adventurer.name.clone();
        let mission = self
            .missions
            .get_mut(mission_id)
            .ok_or_else(|| InvariantError::UnknownMission {
                id: mission_id.0.clone(),
            })?;
        mission.assign(adventurer_id.clone(), &name)
    }

    /// Remove an adventurer from a mission party.
    pub fn unassign_adventurer(
        &mut self,
        mission_id: &MissionId,
        adventurer_id: &AdventurerId,
    ) -> Result<bool, EngineError> {
        let mission = self
            .missions
            .get_mut(mission_id)
            .ok_or_else(|| InvariantError::UnknownMission {
                id: mission_id.0.clone(),
            })?;
        Ok(mission.unassign(adventurer_id)?)
    }

    /// Adventurer-side unassign: a quiet no-op unless the adventurer is
    /// currently committed to an engagement that has not started. A started
    /// mission keeps its roster locked through return and finish.
    pub fn unassign_from_engagement(
        &mut self,
        adventurer_id: &AdventurerId,
        now: GuildDate,
    ) -> Result<bool, EngineError> {
        let state = self.adventurer_state(adventurer_id, now)?;
        if state != AdventurerState::Assigned {
            return Ok(false);
        }
        let Some(mission) = self.engagement(adventurer_id) else {
            return Ok(false);
        };
        if mission.has_started() {
            return Ok(false);
        }
        let mission_id = mission.id.clone();
        self.unassign_adventurer(&mission_id, adventurer_id)
    }

    /// Clear a mission's whole party.
    pub fn unassign_all(&mut self, mission_id: &MissionId) -> Result<(), EngineError> {
        let mission = self
            .missions
            .get_mut(mission_id)
            .ok_or_else(|| InvariantError::UnknownMission {
                id: mission_id.0.clone(),
            })?;
        Ok(mission.unassign_all()?)
    }

    // ---- lifecycle --------------------------------------------------

    /// Start a ready mission: resolve every check and store the immutable
    /// results snapshot together with the start and return dates.
    pub fn start_mission<R: Rng>(
        &mut self,
        mission_id: &MissionId,
        now: GuildDate,
        rng: &mut R,
    ) -> Result<&MissionResults, EngineError> {
        let mission = self.require_mission(mission_id)?;
        match mission.state(now) {
            MissionState::Ready => {}
            MissionState::Open => {
                return Err(Rejection::BelowMinimum {
                    min: mission.min_adventurers,
                    assigned: mission.assigned.len(),
                }
                .into());
            }
            other => {
                return Err(InvariantError::WrongMissionState {
                    operation: "start",
                    required: MissionState::Ready.as_str(),
                    actual: other.as_str(),
                }
                .into());
            }
        }

        let mut party = Vec::with_capacity(mission.assigned.len());
        for id in &mission.assigned {
            party.push(self.adventurers.get(id).ok_or_else(|| {
                InvariantError::UnknownAdventurer { id: id.0.clone() }
            })?);
        }
        let mut resolver = Resolver::new(mission, party);
        resolver.evaluate(rng)?;
        let results = resolver.into_results()?;
        debug!(
            "guild '{}': mission {mission_id} started, success={}",
            self.name, results.is_success
        );

        let mission = self
            .missions
            .get_mut(mission_id)
            .expect("mission existed above");
        mission.record_start(now, results);
        Ok(mission.results.as_ref().expect("results just stored"))
    }

    /// Administrative early return.
    pub fn return_mission_now(
        &mut self,
        mission_id: &MissionId,
        now: GuildDate,
    ) -> Result<(), EngineError> {
        let mission = self
            .missions
            .get_mut(mission_id)
            .ok_or_else(|| InvariantError::UnknownMission {
                id: mission_id.0.clone(),
            })?;
        mission.return_now(now)
    }

    /// Grant a mission's rewards through the catalog and sink. Guarded
    /// against double grants unless `force` is set; the guard flips in the
    /// same operation as the grant, so a retry after a collaborator
    /// failure is safe.
    pub fn grant_rewards<C: RewardCatalog, K: RewardSink>(
        &mut self,
        mission_id: &MissionId,
        catalog: &C,
        sink: &mut K,
        force: bool,
    ) -> Result<(), EngineError> {
        let mission = self.require_mission(mission_id)?;
        if mission.rewards.granted && !force {
            return Err(Rejection::RewardsAlreadyGranted.into());
        }

        let mut items = Vec::new();
        for reward in &mission.rewards.items {
            let record = catalog.resolve_item(&reward.item_ref).map_err(|err| {
                CollaboratorError::ItemResolution {
                    item_ref: reward.item_ref.clone(),
                    reason: err.to_string(),
                }
            })?;
            if record.quantity.is_some() {
                // The catalog's item model carries a quantity field; set it
                // instead of cloning the record N times.
                items.push(ItemRecord {
                    quantity: Some(reward.quantity),
                    ..record
                });
            } else {
                items.extend(std::iter::repeat_n(record, reward.quantity as usize));
            }
        }
        sink.grant(mission.rewards.gold, &items)
            .map_err(|err| CollaboratorError::RewardGrant {
                reason: err.to_string(),
            })?;

        let mission = self
            .missions
            .get_mut(mission_id)
            .expect("mission existed above");
        mission.rewards.granted = true;
        debug!("guild '{}': rewards granted for {mission_id}", self.name);
        Ok(())
    }

    /// Finish a returned mission: grant rewards, propagate each stored
    /// per-adventurer outcome into the permanent histories, and log the
    /// mission. Fails closed before the party has returned, and a logged
    /// mission cannot be finished twice.
    pub fn finish_mission<C: RewardCatalog, K: RewardSink>(
        &mut self,
        mission_id: &MissionId,
        now: GuildDate,
        catalog: &C,
        sink: &mut K,
    ) -> Result<(), EngineError> {
        let mission = self.require_mission(mission_id)?;
        let state = mission.state(now);
        if state != MissionState::Returned {
            return Err(InvariantError::WrongMissionState {
                operation: "finish",
                required: MissionState::Returned.as_str(),
                actual: state.as_str(),
            }
            .into());
        }
        let outcomes = mission
            .results
            .as_ref()
            .map(|results| results.adventurers.clone())
            .unwrap_or_default();
        let death_date = mission.return_date.unwrap_or(now);
        let already_granted = mission.rewards.granted;

        // Rewards first: a collaborator failure aborts the finish with no
        // state written, and the granted guard makes the retry safe. A
        // standalone grant that already ran counts as done.
        if !already_granted {
            self.grant_rewards(mission_id, catalog, sink, false)?;
        }

        for (adventurer_id, record) in outcomes {
            let Some(adventurer) = self.adventurers.get_mut(&adventurer_id) else {
                // Deleted since the mission started; nothing to propagate.
                continue;
            };
            adventurer.record_mission_result(mission_id.clone(), record);
            if record.died {
                adventurer.mark_dead(death_date);
            }
        }

        let mission = self
            .missions
            .get_mut(mission_id)
            .expect("mission existed above");
        mission.record_finish(now);
        debug!("guild '{}': mission {mission_id} logged", self.name);
        Ok(())
    }

    /// Administrative kill: only a waiting adventurer can be struck down
    /// outside of mission resolution.
    pub fn kill_adventurer(
        &mut self,
        id: &AdventurerId,
        now: GuildDate,
    ) -> Result<(), EngineError> {
        let state = self.adventurer_state(id, now)?;
        if state != AdventurerState::Waiting {
            let adventurer = self.require_adventurer(id)?;
            return Err(Rejection::NotWaiting {
                name: adventurer.name.clone(),
            }
            .into());
        }
        let adventurer = self
            .adventurers
            .get_mut(id)
            .expect("state lookup found the adventurer");
        adventurer.mark_dead(now);
        Ok(())
    }

    /// Administrative revive: clears the current death date into history.
    pub fn revive_adventurer(&mut self, id: &AdventurerId) -> Result<(), EngineError> {
        let adventurer = self
            .adventurers
            .get_mut(id)
            .ok_or_else(|| InvariantError::UnknownAdventurer { id: id.0.clone() })?;
        Ok(adventurer.revive()?)
    }

    // ---- synchronization --------------------------------------------

    /// Replace the in-memory aggregate with an externally persisted
    /// snapshot. Last write observed wins; the engine never merges.
    pub fn apply_remote_snapshot(&mut self, snapshot: Self) {
        debug!(
            "guild '{}': applying remote snapshot ({} adventurers, {} missions)",
            snapshot.name,
            snapshot.adventurers.len(),
            snapshot.missions.len()
        );
        *self = snapshot;
    }

    // ---- helpers ----------------------------------------------------

    fn require_adventurer(&self, id: &AdventurerId) -> Result<&Adventurer, InvariantError> {
        self.adventurers
            .get(id)
            .ok_or_else(|| InvariantError::UnknownAdventurer { id: id.0.clone() })
    }

    fn require_mission(&self, id: &MissionId) -> Result<&Mission, InvariantError> {
        self.missions
            .get(id)
            .ok_or_else(|| InvariantError::UnknownMission { id: id.0.clone() })
    }
}
