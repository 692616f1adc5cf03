//! Guildhall Engine
//!
//! Platform-agnostic core logic for a guild management simulation: an
//! adventurer roster, a mission board, and dice-driven mission resolution.
//! This crate provides all simulation mechanics without UI or
//! platform-specific dependencies; persistence and the reward economy are
//! injected through the traits defined here.

pub mod adventurer;
pub mod attributes;
pub mod calendar;
pub mod dice;
pub mod error;
pub mod generate;
pub mod guild;
pub mod mission;
pub mod numbers;
pub mod resolver;
pub mod seed;

// Re-export commonly used types
pub use adventurer::{
    Adventurer, AdventurerData, AdventurerId, AdventurerPatch, AdventurerState, LevelRow, Race,
    Sex, exp_bonus_for_level, level_for_exp,
};
pub use attributes::{Attribute, AttributeBlock, score_modifier};
pub use calendar::GuildDate;
pub use dice::{D20Check, DiceStreams, d20_check, roll_3d6};
pub use error::{CollaboratorError, EngineError, InvariantError, Rejection};
pub use guild::Guild;
pub use mission::{
    ItemRecord, ItemReward, Mission, MissionData, MissionId, MissionPatch, MissionState, Rewards,
    Risk,
};
pub use resolver::{CheckRoll, MissionResults, Resolver};

/// Trait for resolving reward item references against the item system.
/// The host application provides this.
pub trait RewardCatalog {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resolve an item reference into a concrete item record.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference does not name a known item.
    fn resolve_item(&self, item_ref: &str) -> Result<ItemRecord, Self::Error>;
}

/// Trait for receiving granted rewards (gold and resolved items).
/// The host application provides this.
pub trait RewardSink {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Accept one mission's worth of rewards in a single call.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewards cannot be deposited; the engine
    /// treats the whole grant as not having happened.
    fn grant(&mut self, gold: i64, items: &[ItemRecord]) -> Result<(), Self::Error>;
}

/// Trait for abstracting guild snapshot persistence.
/// Platform-specific implementations should provide this.
pub trait GuildStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Save a guild snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be saved.
    fn save_guild(&self, save_name: &str, guild: &Guild) -> Result<(), Self::Error>;

    /// Load a guild snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be loaded.
    fn load_guild(&self, save_name: &str) -> Result<Option<Guild>, Self::Error>;

    /// Delete a saved guild.
    ///
    /// # Errors
    ///
    /// Returns an error if the save cannot be deleted.
    fn delete_guild(&self, save_name: &str) -> Result<(), Self::Error>;
}

/// Main engine tying a guild to its injected collaborators and a seeded
/// pair of dice streams (generation and resolution draws never perturb
/// each other).
pub struct GuildEngine<C, S>
where
    C: RewardCatalog,
    S: GuildStorage,
{
    catalog: C,
    storage: S,
    dice: DiceStreams,
}

impl<C, S> GuildEngine<C, S>
where
    C: RewardCatalog,
    S: GuildStorage,
{
    /// Create a new engine with the provided reward catalog, storage, and
    /// dice seed. The same seed replays the same generation and resolution
    /// draws in order.
    pub fn new(catalog: C, storage: S, seed: u64) -> Self {
        Self {
            catalog,
            storage,
            dice: DiceStreams::from_seed(seed),
        }
    }

    /// Create a fresh, empty guild.
    #[must_use]
    pub fn create_guild(&self, name: &str) -> Guild {
        Guild::new(name)
    }

    /// Add a randomly generated adventurer, drawing from the engine's
    /// generation stream.
    pub fn create_adventurer_random(&self, guild: &mut Guild) -> AdventurerId {
        let mut rng = self.dice.generation();
        guild.create_adventurer_random(&mut *rng).id.clone()
    }

    /// Start a ready mission, rolling every check from the engine's
    /// resolution stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the mission is not ready to start.
    pub fn start_mission<'g>(
        &self,
        guild: &'g mut Guild,
        mission_id: &MissionId,
        now: GuildDate,
    ) -> Result<&'g MissionResults, EngineError> {
        let mut rng = self.dice.resolution();
        guild.start_mission(mission_id, now, &mut *rng)
    }

    /// Save a guild snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be saved.
    pub fn save_guild(&self, save_name: &str, guild: &Guild) -> Result<(), S::Error> {
        self.storage.save_guild(save_name, guild)
    }

    /// Load a guild snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be loaded.
    pub fn load_guild(&self, save_name: &str) -> Result<Option<Guild>, anyhow::Error>
    where
        S::Error: Into<anyhow::Error>,
    {
        self.storage.load_guild(save_name).map_err(Into::into)
    }

    /// Delete a saved guild.
    ///
    /// # Errors
    ///
    /// Returns an error if the save cannot be deleted.
    pub fn delete_guild(&self, save_name: &str) -> Result<(), S::Error> {
        self.storage.delete_guild(save_name)
    }

    /// Reload the persisted snapshot and replace the in-memory guild when
    /// it differs. Returns whether anything changed. The in-memory guild
    /// is a cache over storage; external writes win wholesale.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be loaded.
    pub fn refresh(&self, save_name: &str, guild: &mut Guild) -> Result<bool, anyhow::Error>
    where
        S::Error: Into<anyhow::Error>,
    {
        match self.load_guild(save_name)? {
            Some(snapshot) if snapshot != *guild => {
                guild.apply_remote_snapshot(snapshot);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Apply one mutation and persist the resulting snapshot in one call:
    /// the single-writer-per-update discipline. A failed mutation leaves
    /// the guild untouched and persists nothing; a failed save leaves the
    /// mutated guild in memory for the caller to retry.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation is rejected or the save fails.
    pub fn commit<F, T>(
        &self,
        save_name: &str,
        guild: &mut Guild,
        op: F,
    ) -> Result<T, anyhow::Error>
    where
        F: FnOnce(&mut Guild) -> Result<T, EngineError>,
        S::Error: Into<anyhow::Error>,
    {
        let value = op(guild)?;
        self.storage
            .save_guild(save_name, guild)
            .map_err(Into::into)?;
        Ok(value)
    }

    /// Finish a returned mission through the engine's reward catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the mission is in the wrong state, rewards fail
    /// to resolve, or the sink rejects the grant.
    pub fn finish_mission<K: RewardSink>(
        &self,
        guild: &mut Guild,
        mission_id: &MissionId,
        now: GuildDate,
        sink: &mut K,
    ) -> Result<(), EngineError> {
        guild.finish_mission(mission_id, now, &self.catalog, sink)
    }

    /// Grant (or with `force`, re-grant) a mission's rewards through the
    /// engine's reward catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewards were already granted without
    /// `force`, or a collaborator fails.
    pub fn grant_rewards<K: RewardSink>(
        &self,
        guild: &mut Guild,
        mission_id: &MissionId,
        sink: &mut K,
        force: bool,
    ) -> Result<(), EngineError> {
        guild.grant_rewards(mission_id, &self.catalog, sink, force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::testing::{ScriptedRng, d20_script};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::convert::Infallible;
    use std::rc::Rc;

    #[derive(Clone, Copy, Default)]
    struct FixtureCatalog;

    impl RewardCatalog for FixtureCatalog {
        type Error = Infallible;

        fn resolve_item(&self, item_ref: &str) -> Result<ItemRecord, Self::Error> {
            Ok(ItemRecord {
                name: item_ref.to_string(),
                quantity: None,
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        gold: i64,
        items: Vec<ItemRecord>,
    }

    impl RewardSink for RecordingSink {
        type Error = Infallible;

        fn grant(&mut self, gold: i64, items: &[ItemRecord]) -> Result<(), Self::Error> {
            self.gold += gold;
            self.items.extend_from_slice(items);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MemoryStorage {
        saves: Rc<RefCell<HashMap<String, Guild>>>,
    }

    impl GuildStorage for MemoryStorage {
        type Error = Infallible;

        fn save_guild(&self, save_name: &str, guild: &Guild) -> Result<(), Self::Error> {
            self.saves
                .borrow_mut()
                .insert(save_name.to_string(), guild.clone());
            Ok(())
        }

        fn load_guild(&self, save_name: &str) -> Result<Option<Guild>, Self::Error> {
            Ok(self.saves.borrow().get(save_name).cloned())
        }

        fn delete_guild(&self, save_name: &str) -> Result<(), Self::Error> {
            self.saves.borrow_mut().remove(save_name);
            Ok(())
        }
    }

    fn now() -> GuildDate {
        GuildDate::new(847, 5, 10).unwrap()
    }

    #[test]
    fn engine_creates_saves_and_roundtrips_guilds() {
        let engine = GuildEngine::new(FixtureCatalog, MemoryStorage::default(), 0xABCD);
        let mut guild = engine.create_guild("Emberhold");
        engine.create_adventurer_random(&mut guild);
        engine.save_guild("slot-one", &guild).unwrap();

        let loaded = engine.load_guild("slot-one").unwrap().expect("save exists");
        assert_eq!(loaded, guild);
        assert!(engine.load_guild("missing-slot").unwrap().is_none());

        engine.delete_guild("slot-one").unwrap();
        assert!(engine.load_guild("slot-one").unwrap().is_none());
    }

    #[test]
    fn refresh_applies_external_writes_and_reports_change() {
        let storage = MemoryStorage::default();
        let engine = GuildEngine::new(FixtureCatalog, storage.clone(), 7);
        let mut guild = engine.create_guild("Emberhold");
        engine.save_guild("slot-one", &guild).unwrap();
        assert!(!engine.refresh("slot-one", &mut guild).unwrap());

        // Simulate another process writing a newer snapshot.
        let mut remote = guild.clone();
        let mut rng = SmallRng::seed_from_u64(99);
        remote.create_adventurer_random(&mut rng);
        storage.save_guild("slot-one", &remote).unwrap();

        assert!(engine.refresh("slot-one", &mut guild).unwrap());
        assert_eq!(guild, remote);
        assert!(!engine.refresh("slot-one", &mut guild).unwrap());
    }

    #[test]
    fn commit_persists_exactly_the_successful_mutations() {
        let storage = MemoryStorage::default();
        let engine = GuildEngine::new(FixtureCatalog, storage.clone(), 7);
        let mut guild = engine.create_guild("Emberhold");
        engine.save_guild("slot-one", &guild).unwrap();

        let mut rng = SmallRng::seed_from_u64(5);
        let id = engine
            .commit("slot-one", &mut guild, |guild| {
                Ok(guild.create_adventurer_random(&mut rng).id.clone())
            })
            .unwrap();
        let persisted = storage.load_guild("slot-one").unwrap().unwrap();
        assert!(persisted.adventurer(&id).is_some());

        // A rejected mutation persists nothing new.
        let before = storage.load_guild("slot-one").unwrap().unwrap();
        let missing = MissionId::new("no-such-mission");
        assert!(
            engine
                .commit("slot-one", &mut guild, |guild| {
                    guild.assign_adventurer(&missing, &id)
                })
                .is_err()
        );
        assert_eq!(storage.load_guild("slot-one").unwrap().unwrap(), before);
    }

    #[test]
    fn engine_streams_replay_per_seed() {
        let a = GuildEngine::new(FixtureCatalog, MemoryStorage::default(), 0xFEED);
        let b = GuildEngine::new(FixtureCatalog, MemoryStorage::default(), 0xFEED);
        let mut guild_a = a.create_guild("Emberhold");
        let mut guild_b = b.create_guild("Emberhold");
        for _ in 0..3 {
            a.create_adventurer_random(&mut guild_a);
            b.create_adventurer_random(&mut guild_b);
        }
        assert_eq!(guild_a, guild_b);

        let c = GuildEngine::new(FixtureCatalog, MemoryStorage::default(), 0xFACE);
        let mut guild_c = c.create_guild("Emberhold");
        c.create_adventurer_random(&mut guild_c);
        assert_ne!(guild_a, guild_c);
    }

    #[test]
    fn engine_finishes_missions_through_its_catalog() {
        let engine = GuildEngine::new(FixtureCatalog, MemoryStorage::default(), 1);
        let mut rng = SmallRng::seed_from_u64(1);
        let mut guild = engine.create_guild("Emberhold");
        let adventurer_id = guild
            .create_adventurer_from_data(
                AdventurerData {
                    name: "Thrain".to_string(),
                    attributes: AttributeBlock::uniform(14),
                    ..AdventurerData::default()
                },
                &mut rng,
            )
            .id
            .clone();
        let mission_id = guild
            .create_mission_from_data(
                MissionData {
                    name: "Rat cellar".to_string(),
                    dc: AttributeBlock::uniform(5),
                    rewards: Rewards {
                        gold: 25,
                        items: vec![ItemReward {
                            item_ref: "potion".to_string(),
                            quantity: 1,
                        }],
                        ..Rewards::default()
                    },
                    ..MissionData::default()
                },
                &mut rng,
            )
            .unwrap()
            .id
            .clone();
        guild.assign_adventurer(&mission_id, &adventurer_id).unwrap();
        guild
            .start_mission(&mission_id, now(), &mut ScriptedRng::new(vec![
                d20_script(15);
                5
            ]))
            .unwrap();
        let back = guild.mission(&mission_id).unwrap().return_date.unwrap();

        let mut sink = RecordingSink::default();
        engine
            .finish_mission(&mut guild, &mission_id, back, &mut sink)
            .unwrap();
        assert_eq!(sink.gold, 25);
        assert_eq!(sink.items.len(), 1);
        assert!(matches!(
            engine.grant_rewards(&mut guild, &mission_id, &mut sink, false),
            Err(EngineError::Rejected(Rejection::RewardsAlreadyGranted))
        ));
    }
}
