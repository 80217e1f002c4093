//! Millisecond clock helpers shared by the telemetry queue and the engine.
//!
//! Timestamps are 32-bit millisecond readings of the platform clock and wrap
//! roughly every 49.7 days. Every age computation goes through [`elapsed`]
//! so a wrap between two readings never shows up as a multi-week gap.

/// Millisecond reading of the platform clock.
pub type Timestamp = u32;

/// Deltas beyond half the clock range are treated as a slightly
/// future-dated reading rather than a real age.
const FUTURE_CUTOFF: u32 = u32::MAX / 2;

/// Milliseconds elapsed from `earlier` to `now`, modulo clock wrap.
///
/// Returns 0 when `earlier` is ahead of `now`, so ages never go negative.
#[must_use]
pub fn elapsed(now: Timestamp, earlier: Timestamp) -> u32 {
    let delta = now.wrapping_sub(earlier);
    if delta > FUTURE_CUTOFF {
        0
    } else {
        delta
    }
}
