//! Deterministic per-mission seeding.
//!
//! A mission's estimated duration is randomized around its nominal duration,
//! but must come out identical every time the same mission is inspected,
//! including across processes looking at the same persisted guild. The seed
//! is therefore derived purely from the mission id string via FNV-1a 32-bit,
//! normalized to the unit interval.

use crate::numbers::{round_f64_to_u16, u16_to_f64};

/// Spread applied around the nominal duration: the estimate lands in
/// `[0.75, 1.25) x nominal`, never below one day.
const DURATION_FACTOR_BASE: f64 = 0.75;
const DURATION_FACTOR_SPREAD: f64 = 0.5;

/// FNV-1a 32-bit over the raw bytes of an id string.
#[must_use]
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash = (hash ^ u32::from(*b)).wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Hash an id into the half-open unit interval [0, 1).
#[must_use]
pub fn unit_from_id(id: &str) -> f64 {
    let denom = f64::from(u32::MAX) + 1.0;
    f64::from(fnv1a32(id.as_bytes())) / denom
}

/// Deterministic estimated duration for a mission, in days.
///
/// Same id and nominal duration always produce the same estimate.
#[must_use]
pub fn estimated_duration_days(id: &str, nominal_days: u16) -> u16 {
    let factor = DURATION_FACTOR_SPREAD.mul_add(unit_from_id(id), DURATION_FACTOR_BASE);
    round_f64_to_u16(u16_to_f64(nominal_days) * factor).max(1)
}
