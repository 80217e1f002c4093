//! Per-earbud state snapshot and the authoritative placement accessor.

use crate::config::RuleSet;
use crate::events::BatteryState;
use crate::queue::{SampleKind, SampleQueue};
use crate::time::Timestamp;

/// Everything the engine tracks about one earbud.
///
/// Only built-in rules get a telemetry queue; a bud in an engine with the
/// voice rule disabled simply has no microphone history to consult.
#[derive(Debug, Clone)]
pub(crate) struct BudState {
    pub(crate) in_case: bool,
    /// Raw wear-sensor state; `None` until the sensor reports. Rules must
    /// go through [`BudState::is_in_ear`] instead of reading this.
    pub(crate) in_ear: Option<bool>,
    pub(crate) last_time_in_ear: Option<Timestamp>,
    pub(crate) in_out_transition: Option<Timestamp>,
    pub(crate) battery: BatteryState,
    pub(crate) voice_quality: Option<SampleQueue>,
    pub(crate) phone_rssi: Option<SampleQueue>,
}

impl BudState {
    pub(crate) fn new(
        rules: &RuleSet,
        in_case: bool,
        in_ear: Option<bool>,
        battery: BatteryState,
    ) -> Self {
        Self {
            in_case,
            in_ear,
            last_time_in_ear: None,
            in_out_transition: None,
            battery: if rules.battery {
                battery
            } else {
                BatteryState::Unknown
            },
            voice_quality: rules
                .voice
                .then(|| SampleQueue::new(SampleKind::MicQuality)),
            phone_rssi: rules.signal.then(|| SampleQueue::new(SampleKind::Rssi)),
        }
    }

    /// Effective in-ear state. A bud in its case always reads as out of
    /// ear; an unreported wear sensor falls back to the configured
    /// assumption.
    pub(crate) fn is_in_ear(&self, fallback: bool) -> bool {
        if self.in_case {
            false
        } else {
            self.in_ear.unwrap_or(fallback)
        }
    }
}
