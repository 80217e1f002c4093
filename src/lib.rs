//! Handover decision engine for true-wireless earbud pairs.
//!
//! One bud of a pair owns the phone link (the "primary" role); this crate
//! decides whether and how urgently that role should move to the other
//! bud. It fuses placement, battery, call, phone-link RSSI and microphone
//! quality telemetry from both buds into a single debounced
//! recommendation delivered to one registered observer.

pub mod config;
pub mod engine;
pub mod events;
pub mod notify;
pub mod queue;
pub mod service;
pub mod telemetry;
pub mod thresholds;
pub mod time;

mod bud;

pub use config::{EngineConfig, RetryIntervals, RuleSet, Tunables};
pub use engine::{BudReport, EngineReport, HandoverEngine};
pub use events::{
    BatteryState, BudSide, EventKind, LinkQualitySample, Placement, StateSnapshot, TimedEvent,
};
pub use notify::{HandoverNotification, HandoverObserver, HandoverReason, HandoverResult, Urgency};
pub use service::{HandoverService, ServiceError, TimerDriver};
