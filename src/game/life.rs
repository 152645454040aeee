pub const MAX_HEALTH: i32 = 100;

// Releasing a hold early costs less than letting a note scroll past, but more
// than a BAD tap.
pub struct LifeChange;
impl LifeChange {
    pub const PERFECT: i32 = 3;
    pub const GOOD: i32 = 1;
    pub const BAD: i32 = -5;
    pub const MISS: i32 = -10;
    pub const HOLD_BROKEN: i32 = -8;
}

/// Applies `delta` and clamps to `[0, MAX_HEALTH]`.
#[inline(always)]
pub fn apply(health: i32, delta: i32) -> i32 {
    health.saturating_add(delta).clamp(0, MAX_HEALTH)
}
