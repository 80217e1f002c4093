//! Inbound event model: everything the platform reports about either bud.
//!
//! Events arrive pre-timestamped from the state-mirroring layer; the
//! engine never reads a clock of its own. The serde shape doubles as the
//! replay trace format, one JSON object per line.

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Which earbud an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudSide {
    Local,
    Remote,
}

/// Placement transitions reported by the case and wear sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    InCase,
    OutOfCase,
    InEar,
    OutOfEar,
}

/// Coarse battery classification from the battery monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatteryState {
    #[default]
    Unknown,
    TooLow,
    Critical,
    Low,
    Ok,
}

/// One RF link-quality reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkQualitySample {
    /// Received signal strength in dBm; valid readings are negative.
    pub rssi: i8,
    /// Controller link-quality indicator, carried but not used by any rule.
    pub link_quality: u8,
    /// True for the bud-to-bud link; only phone-link readings feed the
    /// signal rule.
    pub peer_link: bool,
}

/// Event payloads the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EventKind {
    /// A bud moved between case, ear, and neither.
    Placement { side: BudSide, placement: Placement },
    /// A SCO (call audio) link came up or went down.
    Sco { active: bool },
    /// A bud's battery classification changed.
    Battery { side: BudSide, state: BatteryState },
    /// Microphone quality score, 0 = worst, 15 = best, 0xFF = unknown.
    VoiceQuality { side: BudSide, quality: u8 },
    /// RF link quality reading for one of a bud's links.
    LinkQuality { side: BudSide, sample: LinkQualitySample },
}

/// An event plus the millisecond clock reading when it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// State mirrored from the platform when the engine is built, so the
/// first evaluation starts from reality rather than blank defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StateSnapshot {
    pub local_in_case: bool,
    /// `None` while the wear sensor has not reported.
    pub local_in_ear: Option<bool>,
    pub remote_in_case: bool,
    pub remote_in_ear: Option<bool>,
    pub local_battery: BatteryState,
    pub remote_battery: BatteryState,
    pub sco_active: bool,
}
