//! Construction-time engine configuration: enabled rules and tunables.

use serde::{Deserialize, Serialize};

use crate::notify::Urgency;
use crate::thresholds::{Thresholds, DEFAULT_MIC_THRESHOLDS, DEFAULT_RSSI_THRESHOLDS};

/// Which optional rules an engine is built with.
///
/// Disabling a rule removes its telemetry queue and its evaluation step;
/// the remaining rules behave exactly as they would otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    /// Recommend moving off a bud whose battery has gone critical.
    pub battery: bool,
    /// Recommend moving toward the bud with the stronger phone link.
    pub signal: bool,
    /// During calls, recommend moving toward the better microphone.
    pub voice: bool,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            battery: true,
            signal: true,
            voice: true,
        }
    }
}

/// Minimum gap between repeated recommendations, per urgency.
///
/// The shipping tuning leaves all three at zero, which disables the
/// debounce without removing the mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RetryIntervals {
    pub low_ms: u32,
    pub high_ms: u32,
    pub critical_ms: u32,
}

impl RetryIntervals {
    /// Minimum repeat interval for a recommendation of this urgency.
    #[must_use]
    pub fn for_urgency(&self, urgency: Urgency) -> u32 {
        match urgency {
            Urgency::Low => self.low_ms,
            Urgency::High => self.high_ms,
            Urgency::Invalid | Urgency::Critical => self.critical_ms,
        }
    }
}

/// Timing knobs and the wear-sensor fallback policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    /// Evaluations closer together than this are skipped entirely
    /// (0 = evaluate on every event, the shipping tuning).
    pub min_update_interval_ms: u32,
    /// How long the local bud must have been out of ear before that on
    /// its own recommends moving the primary role.
    pub out_of_ear_grace_ms: u32,
    /// Placement assumed while the wear sensor has not reported.
    pub in_ear_fallback: bool,
    pub retry: RetryIntervals,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            min_update_interval_ms: 0,
            out_of_ear_grace_ms: 2_100,
            in_ear_fallback: true,
            retry: RetryIntervals::default(),
        }
    }
}

/// Everything an engine needs at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rules: RuleSet,
    pub tunables: Tunables,
    pub rssi: Thresholds,
    pub mic: Thresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules: RuleSet::default(),
            tunables: Tunables::default(),
            rssi: DEFAULT_RSSI_THRESHOLDS,
            mic: DEFAULT_MIC_THRESHOLDS,
        }
    }
}
