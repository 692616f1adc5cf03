//! Engine error taxonomy.
//!
//! Three tiers with different handling contracts:
//!
//! - [`InvariantError`]: a caller bypassed the state machine. Fail fast;
//!   a UI should log these as diagnostics, not show them to players.
//! - [`Rejection`]: routine, expected user errors. Carry a presentable
//!   message and guarantee no state was mutated.
//! - [`CollaboratorError`]: an external dependency failed. The enclosing
//!   operation aborts without corrupting already-committed state.

use thiserror::Error;

/// Programmer errors: the state machine was bypassed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantError {
    #[error("resolver results read before evaluation")]
    ResultsBeforeEvaluation,
    #[error("cannot resolve a mission with an empty party")]
    EmptyParty,
    #[error("resolver evaluated twice in strict mode")]
    DoubleEvaluation,
    #[error("mission field '{field}' cannot change after the mission has started")]
    MissionFieldLocked { field: &'static str },
    #[error("mission assignments cannot change after the mission has started")]
    AssignmentLocked,
    #[error("operation '{operation}' requires mission state '{required}' but found '{actual}'")]
    WrongMissionState {
        operation: &'static str,
        required: &'static str,
        actual: &'static str,
    },
    #[error("adventurer '{name}' is assigned to an unfinished mission and cannot be deleted")]
    AdventurerStillAssigned { name: String },
    #[error("unknown adventurer id '{id}'")]
    UnknownAdventurer { id: String },
    #[error("unknown mission id '{id}'")]
    UnknownMission { id: String },
    #[error("id '{id}' does not resolve to exactly one collection")]
    AmbiguousId { id: String },
}

/// Expected user errors: surfaced as rejected operations with a
/// user-facing message; the aggregate is left untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("the mission party is full ({max} adventurers)")]
    CapacityReached { max: u8 },
    #[error("{name} is already assigned to this mission")]
    AlreadyAssigned { name: String },
    #[error("{name} is already assigned to '{mission}'")]
    AssignedElsewhere { name: String, mission: String },
    #[error("{name} is dead and cannot be assigned")]
    AdventurerDead { name: String },
    #[error("the mission needs at least {min} adventurers ({assigned} assigned)")]
    BelowMinimum { min: u8, assigned: usize },
    #[error("rewards for this mission have already been granted")]
    RewardsAlreadyGranted,
    #[error("a mission carries at most {max} item rewards")]
    TooManyItemRewards { max: usize },
    #[error("adventurer party bounds are invalid (min {min}, max {max})")]
    InvalidPartyBounds { min: u8, max: u8 },
    #[error("mission duration must be at least one day")]
    ZeroDuration,
    #[error("{name} is not dead and cannot be revived")]
    NotDead { name: String },
    #[error("{name} is not waiting at the guild and cannot be killed")]
    NotWaiting { name: String },
    #[error("mission '{name}' is underway and cannot be deleted")]
    DeleteOngoingMission { name: String },
}

/// External dependency failures at the reward and persistence seams.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("could not resolve reward item '{item_ref}': {reason}")]
    ItemResolution { item_ref: String, reason: String },
    #[error("reward grant failed: {reason}")]
    RewardGrant { reason: String },
}

/// Umbrella error returned by Guild and GuildEngine entry points.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl EngineError {
    /// Whether a UI should present this as a friendly message rather than
    /// a diagnostic.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}
