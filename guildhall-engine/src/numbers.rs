//! Numeric conversion helpers centralizing safe casts for day arithmetic.

use num_traits::cast::cast;

/// Round a f64 and clamp it into the u16 range, returning 0 for NaN values.
#[must_use]
pub fn round_f64_to_u16(value: f64) -> u16 {
    if value.is_nan() {
        return 0;
    }
    let max = cast::<u16, f64>(u16::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(0.0, max).round();
    cast::<f64, u16>(clamped).unwrap_or(0)
}

/// Widen a u16 day count to f64 for scaling math.
#[must_use]
pub fn u16_to_f64(value: u16) -> f64 {
    cast::<u16, f64>(value).unwrap_or(0.0)
}
