//! Fixed-capacity telemetry sample queue and its exponential-decay filter.
//!
//! Each earbud keeps short histories of phone-link RSSI and microphone
//! quality here. Samples are stored as a u16 offset from a shared
//! `base_time` so ten of them fit in a handful of bytes; when the newest
//! offset drifts past a safety margin the whole window is rebased, which
//! changes the internal encoding but never an absolute sample time.

use crate::time::{elapsed, Timestamp};

/// Samples a queue holds before the oldest is evicted.
pub const QUEUE_CAPACITY: usize = 10;

/// Once the newest sample sits this far past `base_time`, offsets are
/// shifted down to keep headroom in the u16 encoding.
const REBASE_TRIGGER_MS: u32 = 49_152;

/// A fresh sample weighs `1 << WEIGHT_SHIFT`; each elapsed half-life
/// halves that, down to a floor after [`MAX_HALF_LIVES`] halvings.
const WEIGHT_SHIFT: u32 = 10;
const MAX_HALF_LIVES: u32 = 10;

/// 1/sqrt(2) as `SQRT_HALF_NUM / 1024`, used to smooth the halving steps.
const SQRT_HALF_NUM: u32 = 724;

/// Raw byte marking an unknown voice-quality reading.
pub const UNKNOWN_QUALITY: u8 = 0xFF;

/// How raw queue bytes are decoded when filtering or reading back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// Signed dBm readings stored as their two's-complement byte.
    Rssi,
    /// Unsigned 0..=15 microphone quality scores.
    MicQuality,
}

#[derive(Debug, Clone, Copy, Default)]
struct Sample {
    rel_time: u16,
    value: u8,
}

/// Ring buffer of timestamped samples over a rebasing time origin.
#[derive(Debug, Clone)]
pub struct SampleQueue {
    kind: SampleKind,
    samples: [Sample; QUEUE_CAPACITY],
    base_time: Timestamp,
    front: usize,
    rear: usize,
    len: usize,
}

impl SampleQueue {
    #[must_use]
    pub fn new(kind: SampleKind) -> Self {
        Self {
            kind,
            samples: [Sample::default(); QUEUE_CAPACITY],
            base_time: 0,
            front: 0,
            rear: 0,
            len: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a sample taken at `at`, evicting the oldest when full.
    ///
    /// Timestamps are expected to arrive roughly in order; the rebasing
    /// keeps the u16 offsets representable for any spacing well under the
    /// rebase margin, which every filter max-age is.
    pub fn push(&mut self, value: u8, at: Timestamp) {
        if self.len == 0 {
            self.base_time = at;
            self.front = 0;
            self.rear = 0;
            self.samples[0] = Sample { rel_time: 0, value };
            self.len = 1;
        } else {
            self.rear = (self.rear + 1) % QUEUE_CAPACITY;
            let rel_time = at.wrapping_sub(self.base_time) as u16;
            self.samples[self.rear] = Sample { rel_time, value };
            if self.len < QUEUE_CAPACITY {
                self.len += 1;
            } else {
                self.front = (self.front + 1) % QUEUE_CAPACITY;
            }
        }
        if at.wrapping_sub(self.base_time) > REBASE_TRIGGER_MS {
            self.rebase();
        }
    }

    /// Shift every offset down by the oldest sample's offset and advance
    /// `base_time` to match. Absolute sample times are unchanged.
    fn rebase(&mut self) {
        let shift = self.samples[self.front].rel_time;
        if shift == 0 {
            return;
        }
        let mut idx = self.front;
        for _ in 0..self.len {
            self.samples[idx].rel_time = self.samples[idx].rel_time.wrapping_sub(shift);
            idx = (idx + 1) % QUEUE_CAPACITY;
        }
        self.base_time = self.base_time.wrapping_add(u32::from(shift));
    }

    fn decode(&self, raw: u8) -> i16 {
        match self.kind {
            SampleKind::Rssi => i16::from(raw as i8),
            SampleKind::MicQuality => i16::from(raw),
        }
    }

    /// Time-decayed estimate of the signal value at `now`.
    ///
    /// Walks newest to oldest; a sample older than `max_age_ms` ends the
    /// walk since everything behind it is older still. Unknown-quality
    /// bytes are skipped for microphone queues. Returns `None` when no
    /// sample qualified.
    #[must_use]
    pub fn filtered(&self, now: Timestamp, half_life_ms: u32, max_age_ms: u32) -> Option<i16> {
        debug_assert!(half_life_ms > 0, "half-life of zero is not meaningful");
        let mut total_value: i32 = 0;
        let mut total_weight: i32 = 0;
        let mut idx = self.rear;
        for _ in 0..self.len {
            let sample = self.samples[idx];
            idx = if idx == 0 { QUEUE_CAPACITY - 1 } else { idx - 1 };
            if self.kind == SampleKind::MicQuality && sample.value == UNKNOWN_QUALITY {
                continue;
            }
            let sample_time = self.base_time.wrapping_add(u32::from(sample.rel_time));
            let age = elapsed(now, sample_time);
            if age > max_age_ms {
                break;
            }
            let weight = decay_weight(age, half_life_ms) as i32;
            total_value += weight * i32::from(self.decode(sample.value));
            total_weight += weight;
        }
        if total_weight > 0 {
            Some(rounded_ratio(total_value, total_weight))
        } else {
            None
        }
    }

    /// Decoded `(value, absolute time)` pairs, oldest first.
    #[must_use]
    pub fn samples(&self) -> Vec<(i16, Timestamp)> {
        let mut out = Vec::with_capacity(self.len);
        let mut idx = self.front;
        for _ in 0..self.len {
            let sample = self.samples[idx];
            out.push((
                self.decode(sample.value),
                self.base_time.wrapping_add(u32::from(sample.rel_time)),
            ));
            idx = (idx + 1) % QUEUE_CAPACITY;
        }
        out
    }
}

/// Integer weight of a sample `age` milliseconds old.
///
/// The base weight halves per elapsed half-life. The residual inside the
/// current half-life interval picks a correction: none in the first
/// quarter, a 1/sqrt(2) multiply through the middle half, and a further
/// halving in the last quarter, approximating continuous decay.
pub(crate) fn decay_weight(age: u32, half_life_ms: u32) -> u32 {
    let n_half = (age / half_life_ms).min(MAX_HALF_LIVES);
    let mut weight = 1_u32 << (WEIGHT_SHIFT - n_half);
    let residual_x4 = 4 * (age - n_half * half_life_ms);
    if residual_x4 > half_life_ms && residual_x4 <= 3 * half_life_ms {
        weight = (weight * SQRT_HALF_NUM) >> WEIGHT_SHIFT;
    } else if residual_x4 > 3 * half_life_ms {
        weight >>= 1;
    }
    weight
}

/// Ratio rounded half away from zero, matching the filter's integer
/// averaging of signed dBm values.
fn rounded_ratio(total_value: i32, total_weight: i32) -> i16 {
    let half = total_weight / 2;
    let rounded = if total_value >= 0 {
        (total_value + half) / total_weight
    } else {
        (total_value - half) / total_weight
    };
    rounded as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mic_queue() -> SampleQueue {
        SampleQueue::new(SampleKind::MicQuality)
    }

    fn rssi_queue() -> SampleQueue {
        SampleQueue::new(SampleKind::Rssi)
    }

    #[test]
    fn push_and_read_back_preserves_values_and_times() {
        let mut queue = mic_queue();
        queue.push(3, 1_000);
        queue.push(7, 1_400);
        queue.push(9, 2_100);
        assert_eq!(queue.samples(), vec![(3, 1_000), (7, 1_400), (9, 2_100)]);
    }

    #[test]
    fn read_back_is_transparent_across_clock_wrap() {
        let start = u32::MAX - 1_000;
        let mut queue = rssi_queue();
        queue.push((-60_i8) as u8, start);
        queue.push((-70_i8) as u8, start.wrapping_add(800));
        queue.push((-65_i8) as u8, start.wrapping_add(2_000));
        assert_eq!(
            queue.samples(),
            vec![
                (-60, start),
                (-70, start.wrapping_add(800)),
                (-65, start.wrapping_add(2_000)),
            ]
        );
    }

    #[test]
    fn full_queue_evicts_oldest_first() {
        let mut queue = mic_queue();
        for i in 0..14_u32 {
            queue.push(i as u8, i * 100);
        }
        assert_eq!(queue.len(), QUEUE_CAPACITY);
        let samples = queue.samples();
        assert_eq!(samples.first(), Some(&(4, 400)));
        assert_eq!(samples.last(), Some(&(13, 1_300)));
    }

    #[test]
    fn rebase_advances_base_without_changing_absolute_times() {
        let mut queue = mic_queue();
        for i in 0..QUEUE_CAPACITY as u32 {
            queue.push(1, i * 5_000);
        }
        // Evicts the t=0 sample and leaves the newest 50s past the base,
        // which crosses the rebase trigger.
        queue.push(2, 50_000);
        assert_eq!(queue.base_time, 5_000);
        let samples = queue.samples();
        assert_eq!(samples.first(), Some(&(1, 5_000)));
        assert_eq!(samples.last(), Some(&(2, 50_000)));
    }

    #[test]
    fn filter_of_single_fresh_sample_returns_its_value() {
        let mut queue = rssi_queue();
        queue.push((-62_i8) as u8, 10_000);
        assert_eq!(queue.filtered(10_000, 1_000, 4_000), Some(-62));
    }

    #[test]
    fn filter_ignores_samples_past_max_age() {
        let mut queue = mic_queue();
        queue.push(15, 0);
        queue.push(5, 9_000);
        // The t=0 sample is 10s old and outside the 4s window.
        assert_eq!(queue.filtered(10_000, 1_000, 4_000), Some(5));
    }

    #[test]
    fn filter_returns_none_when_every_sample_is_stale() {
        let mut queue = mic_queue();
        queue.push(8, 0);
        assert_eq!(queue.filtered(60_000, 1_000, 4_000), None);
    }

    #[test]
    fn filter_returns_none_on_empty_queue() {
        assert_eq!(mic_queue().filtered(1_000, 1_000, 4_000), None);
    }

    #[test]
    fn filter_skips_unknown_mic_bytes() {
        let mut queue = mic_queue();
        queue.push(6, 1_000);
        queue.push(UNKNOWN_QUALITY, 1_500);
        assert_eq!(queue.filtered(1_500, 1_000, 4_000), Some(6));
    }

    #[test]
    fn filter_weighs_recent_samples_heavier() {
        let mut queue = mic_queue();
        queue.push(0, 0);
        queue.push(10, 4_000);
        // The newer sample carries 16x the weight of the 4-half-life-old one.
        let value = queue.filtered(4_000, 1_000, 8_000).expect("samples in window");
        assert!(value > 5, "expected recency bias, got {value}");
    }

    #[test]
    fn decay_weight_steps_through_interval_quarters() {
        assert_eq!(decay_weight(0, 1_000), 1_024);
        assert_eq!(decay_weight(250, 1_000), 1_024);
        assert_eq!(decay_weight(251, 1_000), 724);
        assert_eq!(decay_weight(750, 1_000), 724);
        assert_eq!(decay_weight(751, 1_000), 512);
        assert_eq!(decay_weight(1_000, 1_000), 512);
    }

    #[test]
    fn decay_weight_floors_after_ten_half_lives() {
        assert_eq!(decay_weight(10_000, 1_000), 1);
        assert_eq!(decay_weight(30_000, 1_000), 0);
    }

    proptest! {
        #[test]
        fn len_never_exceeds_capacity(
            deltas in proptest::collection::vec((0u8..=250, 0u32..5_000), 0..40)
        ) {
            let mut queue = mic_queue();
            let mut now = 0_u32;
            for (value, delta) in deltas {
                now = now.wrapping_add(delta);
                queue.push(value, now);
                prop_assert!(queue.len() <= QUEUE_CAPACITY);
            }
        }

        #[test]
        fn eviction_keeps_exactly_the_newest_samples(extra in 1usize..20) {
            let mut queue = mic_queue();
            let total = QUEUE_CAPACITY + extra;
            for i in 0..total {
                queue.push((i % 200) as u8, (i as u32) * 100);
            }
            let samples = queue.samples();
            prop_assert_eq!(samples.len(), QUEUE_CAPACITY);
            for (offset, (value, at)) in samples.into_iter().enumerate() {
                let i = total - QUEUE_CAPACITY + offset;
                prop_assert_eq!(value, (i % 200) as i16);
                prop_assert_eq!(at, (i as u32) * 100);
            }
        }

        #[test]
        fn decay_weight_is_non_increasing_with_age(
            half_life in 1u32..5_000,
            age in 0u32..500_000,
            step in 0u32..500_000,
        ) {
            prop_assert!(decay_weight(age, half_life) >= decay_weight(age + step, half_life));
        }

        #[test]
        fn round_trip_spans_the_clock_range(
            start in any::<u32>(),
            deltas in proptest::collection::vec(1u32..8_000, 1..QUEUE_CAPACITY)
        ) {
            let mut queue = mic_queue();
            let mut now = start;
            let mut expected = Vec::new();
            for (i, delta) in deltas.iter().enumerate() {
                queue.push(i as u8, now);
                expected.push((i as i16, now));
                now = now.wrapping_add(*delta);
            }
            prop_assert_eq!(queue.samples(), expected);
        }
    }
}
