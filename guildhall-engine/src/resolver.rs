//! Mission resolution.
//!
//! Constructed per mission start, evaluated exactly once, then read. For
//! each main attribute one check is rolled by the assigned adventurer with
//! the highest total roll modifier (first encountered wins ties, in party
//! order); the support attribute is rolled by every assigned adventurer.
//! No roll depends on another's result, so evaluation order carries no
//! correctness weight beyond reproducibility of the RNG stream.

use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::adventurer::{Adventurer, AdventurerId, MissionResultRecord};
use crate::attributes::Attribute;
use crate::dice::{D20Check, d20_check};
use crate::error::InvariantError;
use crate::mission::Mission;

/// One evaluated check, stored immutably in the mission results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRoll {
    pub attribute: Attribute,
    pub adventurer_id: AdventurerId,
    pub roll: D20Check,
    /// Whether this check killed its roller: a fumble, or a failure margin
    /// beyond the mission risk tier's death margin.
    pub lethal: bool,
}

/// The immutable snapshot stored on a mission at start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionResults {
    pub checks: Vec<CheckRoll>,
    pub adventurers: BTreeMap<AdventurerId, MissionResultRecord>,
    pub summary: String,
    pub is_success: bool,
}

/// Ephemeral resolution state. Never persisted; the extract at the end
/// ([`Resolver::into_results`]) is what the mission stores.
pub struct Resolver<'a> {
    mission: &'a Mission,
    party: Vec<&'a Adventurer>,
    strict: bool,
    resolved: Option<Resolved>,
}

struct Resolved {
    checks: Vec<CheckRoll>,
    by_key: BTreeMap<(AdventurerId, Attribute), CheckRoll>,
    adventurers: BTreeMap<AdventurerId, MissionResultRecord>,
    summary: String,
    is_success: bool,
}

impl<'a> Resolver<'a> {
    /// Build a resolver over a mission and its party, in party order.
    /// The Guild passes adventurers in ascending id order, which is what
    /// makes the documented tie-break reproducible across processes.
    #[must_use]
    pub fn new(mission: &'a Mission, party: Vec<&'a Adventurer>) -> Self {
        Self {
            mission,
            party,
            strict: false,
            resolved: None,
        }
    }

    /// Strict mode: a second `evaluate` call is an error instead of a no-op.
    #[must_use]
    pub const fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    #[must_use]
    pub const fn is_evaluated(&self) -> bool {
        self.resolved.is_some()
    }

    /// Roll every check and aggregate the outcome. All checks are
    /// independent; they are drawn from the RNG in a fixed order (main
    /// attributes in canonical order, then support per party member).
    pub fn evaluate<R: Rng>(&mut self, rng: &mut R) -> Result<(), InvariantError> {
        if self.resolved.is_some() {
            if self.strict {
                return Err(InvariantError::DoubleEvaluation);
            }
            return Ok(());
        }
        if self.party.is_empty() {
            return Err(InvariantError::EmptyParty);
        }

        let mut checks = Vec::with_capacity(Attribute::MAIN.len() + self.party.len());
        for attribute in Attribute::MAIN {
            let roller = self.best_for(attribute);
            checks.push(self.roll_check(rng, roller, attribute));
        }
        for adventurer in &self.party {
            checks.push(self.roll_check(rng, adventurer, Attribute::SUPPORT));
        }

        let adventurers = self.aggregate(&checks);
        let is_success = Self::mission_success(&checks, &adventurers);
        let summary = self.compose_summary(&checks, &adventurers, is_success);
        let by_key = checks
            .iter()
            .map(|check| {
                (
                    (check.adventurer_id.clone(), check.attribute),
                    check.clone(),
                )
            })
            .collect();

        self.resolved = Some(Resolved {
            checks,
            by_key,
            adventurers,
            summary,
            is_success,
        });
        Ok(())
    }

    /// Best-suited party member for a main attribute: highest total roll
    /// modifier, first encountered wins on ties.
    fn best_for(&self, attribute: Attribute) -> &'a Adventurer {
        let mut best = self.party[0];
        for candidate in &self.party[1..] {
            if candidate.total_roll_mod(attribute) > best.total_roll_mod(attribute) {
                best = candidate;
            }
        }
        best
    }

    fn roll_check<R: Rng>(
        &self,
        rng: &mut R,
        adventurer: &Adventurer,
        attribute: Attribute,
    ) -> CheckRoll {
        let roll = d20_check(
            rng,
            adventurer.total_roll_mod(attribute),
            self.mission.dc.get(attribute),
        );
        let lethal = roll.fumble
            || self
                .mission
                .risk
                .death_margin()
                .is_some_and(|margin| margin + roll.margin < 0);
        CheckRoll {
            attribute,
            adventurer_id: adventurer.id.clone(),
            roll,
            lethal,
        }
    }

    /// Per-adventurer aggregation over their own checks only.
    fn aggregate(&self, checks: &[CheckRoll]) -> BTreeMap<AdventurerId, MissionResultRecord> {
        let mut outcomes = BTreeMap::new();
        for adventurer in &self.party {
            let own: SmallVec<[&CheckRoll; 8]> = checks
                .iter()
                .filter(|check| check.adventurer_id == adventurer.id)
                .collect();
            let died = own.iter().any(|check| check.lethal);
            let crits_count = own.iter().filter(|check| check.roll.critical).count() as u32;
            let exp_gained = i64::from(crits_count) + i64::from(!died);
            outcomes.insert(
                adventurer.id.clone(),
                MissionResultRecord {
                    crits_count,
                    died,
                    exp_gained,
                },
            );
        }
        outcomes
    }

    /// Success requires both halves independently: some main check
    /// succeeded, and some adventurer whose own support check succeeded
    /// survived the mission. The second half is deliberately about the
    /// support roller surviving, not about the best support roll.
    fn mission_success(
        checks: &[CheckRoll],
        outcomes: &BTreeMap<AdventurerId, MissionResultRecord>,
    ) -> bool {
        let main_succeeded = checks
            .iter()
            .any(|check| check.attribute.is_main() && check.roll.success);
        let reporter_survived = checks.iter().any(|check| {
            check.attribute.is_support()
                && check.roll.success
                && outcomes
                    .get(&check.adventurer_id)
                    .is_some_and(|outcome| !outcome.died)
        });
        main_succeeded && reporter_survived
    }

    fn compose_summary(
        &self,
        checks: &[CheckRoll],
        outcomes: &BTreeMap<AdventurerId, MissionResultRecord>,
        is_success: bool,
    ) -> String {
        let name_of = |id: &AdventurerId| {
            self.party
                .iter()
                .find(|adventurer| adventurer.id == *id)
                .map_or("someone", |adventurer| adventurer.name.as_str())
        };

        let mut text = format!(
            "'{}' {}.",
            self.mission.name,
            if is_success { "succeeded" } else { "failed" }
        );
        for check in checks.iter().filter(|check| check.attribute.is_main()) {
            let _ = write!(
                text,
                "\n{}: {} rolled {} against DC {} ({}).",
                check.attribute,
                name_of(&check.adventurer_id),
                check.roll.total,
                self.mission.dc.get(check.attribute),
                if check.roll.success { "success" } else { "failure" }
            );
        }
        let reports = checks
            .iter()
            .filter(|check| check.attribute.is_support() && check.roll.success)
            .count();
        let _ = write!(
            text,
            "\nReliable reports: {reports} of {}.",
            self.party.len()
        );
        let fallen: Vec<&str> = outcomes
            .iter()
            .filter(|(_, outcome)| outcome.died)
            .map(|(id, _)| name_of(id))
            .collect();
        if fallen.is_empty() {
            text.push_str("\nNo casualties.");
        } else {
            let _ = write!(text, "\nFallen: {}.", fallen.join(", "));
        }
        text
    }

    /// All checks keyed by (adventurer, attribute).
    pub fn check_results(
        &self,
    ) -> Result<&BTreeMap<(AdventurerId, Attribute), CheckRoll>, InvariantError> {
        self.resolved
            .as_ref()
            .map(|resolved| &resolved.by_key)
            .ok_or(InvariantError::ResultsBeforeEvaluation)
    }

    /// Aggregated per-adventurer outcomes.
    pub fn adventurer_results(
        &self,
    ) -> Result<&BTreeMap<AdventurerId, MissionResultRecord>, InvariantError> {
        self.resolved
            .as_ref()
            .map(|resolved| &resolved.adventurers)
            .ok_or(InvariantError::ResultsBeforeEvaluation)
    }

    pub fn is_success(&self) -> Result<bool, InvariantError> {
        self.resolved
            .as_ref()
            .map(|resolved| resolved.is_success)
            .ok_or(InvariantError::ResultsBeforeEvaluation)
    }

    /// Extract the storable snapshot, consuming the resolver.
    pub fn into_results(self) -> Result<MissionResults, InvariantError> {
        let resolved = self
            .resolved
            .ok_or(InvariantError::ResultsBeforeEvaluation)?;
        Ok(MissionResults {
            checks: resolved.checks,
            adventurers: resolved.adventurers,
            summary: resolved.summary,
            is_success: resolved.is_success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adventurer::AdventurerData;
    use crate::attributes::AttributeBlock;
    use crate::dice::testing::{ScriptedRng, d20_script};
    use crate::mission::{MissionData, MissionId, Risk};

    fn adventurer(id: &str, name: &str, block: AttributeBlock) -> Adventurer {
        Adventurer::from_data(
            AdventurerId::new(id),
            AdventurerData {
                name: name.to_string(),
                attributes: block,
                class: Attribute::Brawn,
                ..AdventurerData::default()
            },
        )
    }

    fn mission(risk: Risk, dc: i32) -> Mission {
        Mission::from_data(
            MissionId::new("m1"),
            MissionData {
                name: "Bandit camp".to_string(),
                risk,
                dc: AttributeBlock::uniform(dc),
                min_adventurers: 1,
                max_adventurers: 4,
                ..MissionData::default()
            },
        )
    }

    /// Script for a two-member party: four main rolls then two support
    /// rolls, in that order.
    fn duo_script(mains: [i32; 4], supports: [i32; 2]) -> ScriptedRng {
        let mut script: Vec<u32> = mains.iter().map(|n| d20_script(*n)).collect();
        script.extend(supports.iter().map(|n| d20_script(*n)));
        ScriptedRng::new(script)
    }

    #[test]
    fn results_before_evaluation_always_error() {
        let m = mission(Risk::Low, 10);
        let a = adventurer("a1", "Thrain", AttributeBlock::default());
        let resolver = Resolver::new(&m, vec![&a]);
        assert_eq!(
            resolver.check_results().unwrap_err(),
            InvariantError::ResultsBeforeEvaluation
        );
        assert_eq!(
            resolver.adventurer_results().unwrap_err(),
            InvariantError::ResultsBeforeEvaluation
        );
        assert_eq!(
            resolver.is_success().unwrap_err(),
            InvariantError::ResultsBeforeEvaluation
        );
    }

    #[test]
    fn best_modifier_rolls_each_main_check() {
        let m = mission(Risk::Low, 10);
        // Mira is strictly better at cunning, Thrain everywhere else.
        let thrain = adventurer("a1", "Thrain", AttributeBlock::uniform(14));
        let mira = adventurer(
            "a2",
            "Mira",
            AttributeBlock {
                cunning: 18,
                ..AttributeBlock::uniform(8)
            },
        );
        let mut resolver = Resolver::new(&m, vec![&thrain, &mira]);
        resolver
            .evaluate(&mut duo_script([10, 10, 10, 10], [10, 10]))
            .unwrap();
        let by_key = resolver.check_results().unwrap();
        assert!(by_key.contains_key(&(AdventurerId::new("a1"), Attribute::Brawn)));
        assert!(by_key.contains_key(&(AdventurerId::new("a2"), Attribute::Cunning)));
        assert!(by_key.contains_key(&(AdventurerId::new("a1"), Attribute::Spellcraft)));
        // Everyone rolls support.
        assert!(by_key.contains_key(&(AdventurerId::new("a1"), Attribute::Reliability)));
        assert!(by_key.contains_key(&(AdventurerId::new("a2"), Attribute::Reliability)));
    }

    #[test]
    fn tie_break_picks_first_in_party_order() {
        let m = mission(Risk::Low, 10);
        let first = adventurer("a1", "Thrain", AttributeBlock::uniform(12));
        let second = adventurer("a2", "Mira", AttributeBlock::uniform(12));
        let mut resolver = Resolver::new(&m, vec![&first, &second]);
        resolver
            .evaluate(&mut duo_script([10, 10, 10, 10], [10, 10]))
            .unwrap();
        let by_key = resolver.check_results().unwrap();
        for attribute in Attribute::MAIN {
            assert!(
                by_key.contains_key(&(AdventurerId::new("a1"), attribute)),
                "tie on {attribute} should go to the first party member"
            );
        }
    }

    #[test]
    fn medium_risk_death_boundary() {
        // DC 15 everywhere, modifier 0: natural N gives margin N - 15.
        let m = mission(Risk::Medium, 15);
        let solo = adventurer("a1", "Thrain", AttributeBlock::uniform(10));

        // Natural 4: margin -11, 10 + (-11) < 0, lethal.
        let mut resolver = Resolver::new(&m, vec![&solo]);
        resolver
            .evaluate(&mut ScriptedRng::new(vec![d20_script(4); 5]))
            .unwrap();
        assert!(resolver.adventurer_results().unwrap()[&solo.id].died);

        // Natural 6: margin -9, 10 + (-9) >= 0, survivable.
        let mut resolver = Resolver::new(&m, vec![&solo]);
        resolver
            .evaluate(&mut ScriptedRng::new(vec![d20_script(6); 5]))
            .unwrap();
        assert!(!resolver.adventurer_results().unwrap()[&solo.id].died);
    }

    #[test]
    fn empty_party_is_an_invariant_error() {
        let m = mission(Risk::Low, 10);
        let mut resolver = Resolver::new(&m, Vec::new());
        assert_eq!(
            resolver.evaluate(&mut ScriptedRng::new(vec![d20_script(10)])),
            Err(InvariantError::EmptyParty)
        );
        assert!(!resolver.is_evaluated());
    }

    #[test]
    fn fumble_kills_at_any_risk_tier() {
        let m = mission(Risk::Low, 5);
        let solo = adventurer("a1", "Thrain", AttributeBlock::uniform(18));
        let mut resolver = Resolver::new(&m, vec![&solo]);
        // One fumble among otherwise comfortable rolls.
        resolver
            .evaluate(&mut ScriptedRng::new(vec![
                d20_script(1),
                d20_script(15),
                d20_script(15),
                d20_script(15),
                d20_script(15),
            ]))
            .unwrap();
        let outcome = &resolver.adventurer_results().unwrap()[&solo.id];
        assert!(outcome.died);
        assert_eq!(outcome.exp_gained, 0);
    }

    #[test]
    fn low_risk_margin_failures_never_kill() {
        let m = mission(Risk::Low, 20);
        let solo = adventurer("a1", "Thrain", AttributeBlock::uniform(3));
        let mut resolver = Resolver::new(&m, vec![&solo]);
        // Natural 2 with modifier -4: margin -22, but low risk, no fumble.
        resolver
            .evaluate(&mut ScriptedRng::new(vec![d20_script(2); 5]))
            .unwrap();
        assert!(!resolver.adventurer_results().unwrap()[&solo.id].died);
    }

    #[test]
    fn success_needs_main_check_and_surviving_reporter() {
        let m = mission(Risk::Low, 10);
        let solo = adventurer("a1", "Thrain", AttributeBlock::uniform(10));

        // Main checks pass, support fails: no reliable report, failure.
        let mut resolver = Resolver::new(&m, vec![&solo]);
        resolver
            .evaluate(&mut ScriptedRng::new(vec![
                d20_script(15),
                d20_script(15),
                d20_script(15),
                d20_script(15),
                d20_script(5),
            ]))
            .unwrap();
        assert!(!resolver.is_success().unwrap());

        // Support passes, every main check fails: still failure.
        let mut resolver = Resolver::new(&m, vec![&solo]);
        resolver
            .evaluate(&mut ScriptedRng::new(vec![
                d20_script(5),
                d20_script(5),
                d20_script(5),
                d20_script(5),
                d20_script(15),
            ]))
            .unwrap();
        assert!(!resolver.is_success().unwrap());

        // Both halves met: success.
        let mut resolver = Resolver::new(&m, vec![&solo]);
        resolver
            .evaluate(&mut ScriptedRng::new(vec![d20_script(15); 5]))
            .unwrap();
        assert!(resolver.is_success().unwrap());
    }

    #[test]
    fn dead_reporter_does_not_count_even_with_successful_support() {
        let m = mission(Risk::Low, 10);
        // Mira is best at every main attribute, so she rolls them all;
        // her brawn fumble kills her, then her successful support check
        // must not satisfy the reporting half.
        let thrain = adventurer("a1", "Thrain", AttributeBlock::uniform(8));
        let mira = adventurer("a2", "Mira", AttributeBlock::uniform(16));
        let mut resolver = Resolver::new(&m, vec![&thrain, &mira]);
        resolver
            .evaluate(&mut duo_script(
                [1, 19, 19, 19], // Mira: fumble brawn, carries the rest
                [4, 19],         // Thrain fails support, Mira passes it
            ))
            .unwrap();
        let outcomes = resolver.adventurer_results().unwrap();
        assert!(outcomes[&mira.id].died);
        assert!(!outcomes[&thrain.id].died);
        let support = &resolver.check_results().unwrap()
            [&(AdventurerId::new("a2"), Attribute::Reliability)];
        assert!(support.roll.success, "Mira's report roll itself passed");
        assert!(!resolver.is_success().unwrap());
    }

    #[test]
    fn experience_counts_crits_and_survival() {
        let m = mission(Risk::Low, 10);
        let solo = adventurer("a1", "Thrain", AttributeBlock::uniform(10));
        let mut resolver = Resolver::new(&m, vec![&solo]);
        // Two crits among the five checks, no deaths.
        resolver
            .evaluate(&mut ScriptedRng::new(vec![
                d20_script(20),
                d20_script(12),
                d20_script(20),
                d20_script(12),
                d20_script(12),
            ]))
            .unwrap();
        let outcome = &resolver.adventurer_results().unwrap()[&solo.id];
        assert_eq!(outcome.crits_count, 2);
        assert!(!outcome.died);
        assert_eq!(outcome.exp_gained, 3);
    }

    #[test]
    fn dead_roller_keeps_crit_experience() {
        // Experience is crits plus the survival point: a critical scored
        // before a lethal check still pays out, only the survival point
        // is lost.
        let m = mission(Risk::Medium, 15);
        let solo = adventurer("a1", "Thrain", AttributeBlock::uniform(10));
        let mut resolver = Resolver::new(&m, vec![&solo]);
        resolver
            .evaluate(&mut ScriptedRng::new(vec![
                d20_script(20),
                d20_script(4),
                d20_script(4),
                d20_script(4),
                d20_script(4),
            ]))
            .unwrap();
        let outcome = &resolver.adventurer_results().unwrap()[&solo.id];
        assert!(outcome.died);
        assert_eq!(outcome.crits_count, 1);
        assert_eq!(outcome.exp_gained, 1);
    }

    #[test]
    fn evaluate_twice_is_a_noop_unless_strict() {
        let m = mission(Risk::Low, 10);
        let solo = adventurer("a1", "Thrain", AttributeBlock::uniform(10));
        let mut resolver = Resolver::new(&m, vec![&solo]);
        resolver
            .evaluate(&mut ScriptedRng::new(vec![d20_script(15); 5]))
            .unwrap();
        let before = resolver.check_results().unwrap().clone();

        // Second evaluation with a completely different script changes nothing.
        resolver
            .evaluate(&mut ScriptedRng::new(vec![d20_script(2); 5]))
            .unwrap();
        assert_eq!(resolver.check_results().unwrap(), &before);

        let mut strict = Resolver::new(&m, vec![&solo]).strict();
        strict
            .evaluate(&mut ScriptedRng::new(vec![d20_script(15); 5]))
            .unwrap();
        assert_eq!(
            strict.evaluate(&mut ScriptedRng::new(vec![d20_script(2); 5])),
            Err(InvariantError::DoubleEvaluation)
        );
    }

    #[test]
    fn summary_names_the_outcome_and_casualties() {
        let m = mission(Risk::High, 15);
        let solo = adventurer("a1", "Thrain", AttributeBlock::uniform(10));
        let mut resolver = Resolver::new(&m, vec![&solo]);
        resolver
            .evaluate(&mut ScriptedRng::new(vec![d20_script(1); 5]))
            .unwrap();
        let results = resolver.into_results().unwrap();
        assert!(results.summary.contains("failed"));
        assert!(results.summary.contains("Fallen: Thrain"));
    }
}
