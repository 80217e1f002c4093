//! Per-urgency threshold tables for the signal- and voice-quality rules.
//!
//! Both rules share the same shape: filter each bud's history with a
//! tier's decay parameters, then compare the local value against an
//! absolute floor and the remote advantage against a relative margin.
//! Tiers are consulted from most to least urgent and the first match wins.

use serde::{Deserialize, Serialize};

use crate::notify::Urgency;

/// Filter and comparison parameters for one urgency tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierParams {
    /// Sample weight halves per elapsed multiple of this.
    pub half_life_ms: u32,
    /// Samples older than this are ignored outright.
    pub max_age_ms: u32,
    /// The local filtered value must sit below this for the tier to fire.
    pub abs_threshold: i16,
    /// Remote-minus-local must exceed this for the tier to fire.
    pub rel_threshold: i16,
}

/// One parameter set per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub critical: TierParams,
    pub high: TierParams,
    pub low: TierParams,
}

impl Thresholds {
    /// Tiers paired with their urgency, most urgent first.
    #[must_use]
    pub fn descending(&self) -> [(Urgency, TierParams); 3] {
        [
            (Urgency::Critical, self.critical),
            (Urgency::High, self.high),
            (Urgency::Low, self.low),
        ]
    }
}

/// Shipping table for phone-link RSSI, in dBm.
///
/// The critical tier reacts within half a second to a link that has
/// dropped below -90 dBm while the other bud still sees a clearly
/// stronger signal; the lower tiers trade reaction speed for stability.
pub const DEFAULT_RSSI_THRESHOLDS: Thresholds = Thresholds {
    critical: TierParams {
        half_life_ms: 500,
        max_age_ms: 2_000,
        abs_threshold: -90,
        rel_threshold: 15,
    },
    high: TierParams {
        half_life_ms: 1_000,
        max_age_ms: 4_000,
        abs_threshold: -85,
        rel_threshold: 12,
    },
    low: TierParams {
        half_life_ms: 2_000,
        max_age_ms: 8_000,
        abs_threshold: -80,
        rel_threshold: 10,
    },
};

/// Shipping table for microphone quality scores (0 = worst, 15 = best).
pub const DEFAULT_MIC_THRESHOLDS: Thresholds = Thresholds {
    critical: TierParams {
        half_life_ms: 500,
        max_age_ms: 2_000,
        abs_threshold: 5,
        rel_threshold: 2,
    },
    high: TierParams {
        half_life_ms: 1_000,
        max_age_ms: 4_000,
        abs_threshold: 8,
        rel_threshold: 2,
    },
    low: TierParams {
        half_life_ms: 2_000,
        max_age_ms: 8_000,
        abs_threshold: 11,
        rel_threshold: 2,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descending_walks_critical_first() {
        let tiers = DEFAULT_RSSI_THRESHOLDS.descending();
        assert_eq!(tiers[0].0, Urgency::Critical);
        assert_eq!(tiers[1].0, Urgency::High);
        assert_eq!(tiers[2].0, Urgency::Low);
    }

    #[test]
    fn default_tables_widen_their_window_toward_low_urgency() {
        for table in [DEFAULT_RSSI_THRESHOLDS, DEFAULT_MIC_THRESHOLDS] {
            assert!(table.critical.max_age_ms < table.high.max_age_ms);
            assert!(table.high.max_age_ms < table.low.max_age_ms);
            assert!(table.critical.half_life_ms < table.low.half_life_ms);
        }
    }
}
