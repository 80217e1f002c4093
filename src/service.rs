//! Lifecycle and event-routing facade around the decision engine.
//!
//! The platform owns the clock, the scheduler, and the event stream; this
//! facade owns the engine instance and the one piece of scheduled
//! behavior in the system, the out-of-ear grace timer. The timer is armed
//! through a caller-supplied [`TimerDriver`] whenever the local bud stops
//! reading as worn, and its expiry comes back in as an ordinary
//! [`HandoverService::handle_timer`] call.

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::engine::{EngineReport, HandoverEngine};
use crate::events::{BudSide, EventKind, StateSnapshot, TimedEvent};
use crate::notify::{HandoverObserver, Urgency};
use crate::time::Timestamp;

/// Errors from service lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceError {
    /// `init` was called while an engine instance already exists.
    AlreadyInitialised,
    /// The operation needs a live engine and none exists.
    NotInitialised,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyInitialised => write!(f, "handover service is already initialised"),
            Self::NotInitialised => write!(f, "handover service is not initialised"),
        }
    }
}

impl std::error::Error for ServiceError {}

/// One-shot timer owned by the host platform; its expiry must come back
/// as a [`HandoverService::handle_timer`] call.
pub trait TimerDriver {
    /// Schedule a single callback after `delay_ms`, replacing any pending
    /// one.
    fn arm(&mut self, delay_ms: u32);
    /// Drop any pending callback.
    fn cancel(&mut self);
}

/// Routes platform events into the engine and owns the grace timer.
pub struct HandoverService {
    config: EngineConfig,
    engine: Option<HandoverEngine>,
    timer: Box<dyn TimerDriver>,
    timer_armed: bool,
}

impl HandoverService {
    #[must_use]
    pub fn new(config: EngineConfig, timer: Box<dyn TimerDriver>) -> Self {
        Self {
            config,
            engine: None,
            timer,
            timer_armed: false,
        }
    }

    /// Build the engine from the platform snapshot and register the
    /// single notification client. An immediate timer kick is scheduled
    /// so the starting state gets one evaluation without waiting for an
    /// event.
    pub fn init(
        &mut self,
        client: Box<dyn HandoverObserver>,
        snapshot: StateSnapshot,
    ) -> Result<(), ServiceError> {
        if self.engine.is_some() {
            return Err(ServiceError::AlreadyInitialised);
        }
        self.engine = Some(HandoverEngine::new(self.config, snapshot, client));
        self.timer.arm(0);
        self.timer_armed = true;
        info!("handover service initialised");
        Ok(())
    }

    /// Tear down the engine and cancel any pending timer.
    pub fn destroy(&mut self) -> Result<(), ServiceError> {
        if self.engine.take().is_none() {
            return Err(ServiceError::NotInitialised);
        }
        self.cancel_timer();
        info!("handover service destroyed");
        Ok(())
    }

    /// Whether an engine instance is live.
    #[must_use]
    pub fn is_initialised(&self) -> bool {
        self.engine.is_some()
    }

    /// Route one timestamped platform event to the engine.
    pub fn handle_event(&mut self, event: TimedEvent) -> Result<(), ServiceError> {
        let engine = self.engine.as_mut().ok_or(ServiceError::NotInitialised)?;
        let now = event.timestamp;
        match event.kind {
            EventKind::Placement { side, placement } => {
                engine.handle_placement(now, side, placement);
                if side == BudSide::Local {
                    self.reconcile_timer();
                }
            }
            EventKind::Sco { active } => engine.handle_sco(now, active),
            EventKind::Battery { side, state } => engine.handle_battery(now, side, state),
            EventKind::VoiceQuality { side, quality } => {
                engine.handle_voice_quality(now, side, quality);
            }
            EventKind::LinkQuality { side, sample } => {
                engine.handle_link_quality(now, side, sample);
            }
        }
        Ok(())
    }

    /// Drain every event currently queued on `events`; returns how many
    /// were handled.
    pub fn pump(&mut self, events: &Receiver<TimedEvent>) -> Result<usize, ServiceError> {
        let mut handled = 0;
        for event in events.try_iter() {
            self.handle_event(event)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Grace-timer expiry: runs an ordinary evaluation pass.
    pub fn handle_timer(&mut self, now: Timestamp) -> Result<(), ServiceError> {
        self.timer_armed = false;
        let engine = self.engine.as_mut().ok_or(ServiceError::NotInitialised)?;
        debug!(timestamp = now, "grace timer fired");
        engine.update(now);
        Ok(())
    }

    /// Operator-forced handover: always `{external, critical}`.
    pub fn external_handover_request(&mut self, now: Timestamp) -> Result<(), ServiceError> {
        let engine = self.engine.as_mut().ok_or(ServiceError::NotInitialised)?;
        engine.handle_external_request(now, Urgency::Critical);
        Ok(())
    }

    /// Diagnostic report from the live engine.
    pub fn report(&self) -> Result<EngineReport, ServiceError> {
        self.engine
            .as_ref()
            .map(HandoverEngine::report)
            .ok_or(ServiceError::NotInitialised)
    }

    /// Keep exactly one grace timer outstanding while the local bud reads
    /// as out of ear; cancel it the moment it is back in ear or in its
    /// case. Repeated out-of-ear events do not restart the countdown.
    fn reconcile_timer(&mut self) {
        let out_of_ear = self
            .engine
            .as_ref()
            .is_some_and(HandoverEngine::local_out_of_ear);
        if out_of_ear && !self.timer_armed {
            self.timer.arm(self.config.tunables.out_of_ear_grace_ms);
            self.timer_armed = true;
        } else if !out_of_ear {
            self.cancel_timer();
        }
    }

    fn cancel_timer(&mut self) {
        if self.timer_armed {
            self.timer.cancel();
            self.timer_armed = false;
        }
    }
}
