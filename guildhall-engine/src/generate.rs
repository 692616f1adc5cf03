//! Randomized adventurer generation: weighted tables, 3d6 attribute rolls
//! with the class bonus, and non-colliding portrait selection.

use rand::Rng;

use crate::adventurer::{AdventurerData, Race, Sex};
use crate::attributes::{Attribute, AttributeBlock};
use crate::dice::roll_3d6;

/// Flat bonus to the attribute matching the adventurer's class, applied
/// once during generation.
pub const CLASS_ATTRIBUTE_BONUS: i32 = 3;

/// Number of portrait slots in the shipped art set.
pub const PORTRAIT_SLOTS: usize = 16;

const MALE_NAMES: [&str; 12] = [
    "Thrain", "Okk", "Aldric", "Bram", "Cedric", "Doran", "Edwin", "Falk", "Garrick", "Hale",
    "Ivo", "Jorund",
];

const FEMALE_NAMES: [&str; 12] = [
    "Mira", "Vell", "Astrid", "Brenna", "Catlin", "Delia", "Elsbeth", "Freya", "Gwynn", "Hild",
    "Isolde", "Jun",
];

const SURNAMES: [&str; 12] = [
    "Ashdown", "Blackbriar", "Coppervein", "Dunmore", "Emberfall", "Farshore", "Grimsbane",
    "Hollowell", "Ironfoot", "Kestrel", "Longstride", "Mossbank",
];

/// Weighted sampling table. Entries with zero weight are never picked.
#[derive(Debug, Clone)]
pub struct WeightedTable<T> {
    entries: Vec<(T, u32)>,
    total: u32,
}

impl<T> WeightedTable<T> {
    /// Build a table. At least one entry must carry positive weight.
    #[must_use]
    pub fn new(entries: Vec<(T, u32)>) -> Self {
        let total = entries.iter().map(|(_, weight)| *weight).sum();
        debug_assert!(total > 0, "weighted table needs positive total weight");
        Self { entries, total }
    }

    /// Draw one entry, consuming a single sample from the RNG.
    pub fn pick<R: Rng>(&self, rng: &mut R) -> &T {
        let mut remaining = rng.gen_range(0..self.total);
        for (value, weight) in &self.entries {
            if remaining < *weight {
                return value;
            }
            remaining -= weight;
        }
        // Unreachable when total matches the entries; keep the last entry
        // as the safety net.
        &self.entries[self.entries.len() - 1].0
    }
}

/// Race distribution used by random generation.
#[must_use]
pub fn race_table() -> WeightedTable<Race> {
    WeightedTable::new(vec![
        (Race::Human, 40),
        (Race::Elf, 20),
        (Race::Dwarf, 15),
        (Race::Halfling, 10),
        (Race::Gnome, 10),
        (Race::HalfOrc, 5),
    ])
}

/// Portrait path for a slot index.
#[must_use]
pub fn portrait_path(slot: usize) -> String {
    format!("portraits/adventurer-{slot:02}.webp")
}

/// Pick a portrait slot not in use by the current roster. Bounded rejection
/// loop first, then a linear scan; when every slot is taken the draw is
/// reused, collisions and all.
pub fn pick_portrait<R: Rng>(rng: &mut R, taken: &[String]) -> String {
    let is_taken = |slot: usize| taken.iter().any(|path| *path == portrait_path(slot));
    let mut last = 0;
    for _ in 0..PORTRAIT_SLOTS {
        let slot = rng.gen_range(0..PORTRAIT_SLOTS);
        if !is_taken(slot) {
            return portrait_path(slot);
        }
        last = slot;
    }
    (0..PORTRAIT_SLOTS)
        .find(|slot| !is_taken(*slot))
        .map_or_else(|| portrait_path(last), portrait_path)
}

/// Roll a full attribute block: 3d6 per attribute, plus the class bonus on
/// the class attribute.
pub fn roll_attributes<R: Rng>(rng: &mut R, class: Attribute) -> AttributeBlock {
    let mut block = AttributeBlock::uniform(0);
    for attribute in Attribute::ALL {
        let mut score = roll_3d6(rng);
        if attribute == class {
            score += CLASS_ATTRIBUTE_BONUS;
        }
        block.set(attribute, score);
    }
    block
}

/// Generate a complete adventurer payload. `taken_portraits` are the
/// portrait paths already used by the roster.
pub fn generate_adventurer<R: Rng>(rng: &mut R, taken_portraits: &[String]) -> AdventurerData {
    let sex = if rng.gen_bool(0.5) { Sex::Male } else { Sex::Female };
    let class = Attribute::MAIN[rng.gen_range(0..Attribute::MAIN.len())];
    let race = *race_table().pick(rng);
    let first = match sex {
        Sex::Male => MALE_NAMES[rng.gen_range(0..MALE_NAMES.len())],
        Sex::Female => FEMALE_NAMES[rng.gen_range(0..FEMALE_NAMES.len())],
    };
    let surname = SURNAMES[rng.gen_range(0..SURNAMES.len())];
    AdventurerData {
        name: format!("{first} {surname}"),
        portrait: pick_portrait(rng, taken_portraits),
        sex,
        race,
        class,
        attributes: roll_attributes(rng, class),
        base_exp: 0,
    }
}
