//! The handover decision engine.
//!
//! Every platform event lands in one of the `handle_*` entry points,
//! mutates the bud snapshots, and triggers an evaluation pass. The pass
//! walks the rules in a fixed order, merges candidates by maximum urgency
//! (ties keep the earlier rule), lets a healthy local microphone suppress
//! weaker candidates during calls, and hands the outcome to the notifier.
//!
//! Everything here is single-threaded by construction: entry points run
//! to completion and no state escapes the engine.

use serde::Serialize;
use tracing::{debug, trace};

use crate::bud::BudState;
use crate::config::EngineConfig;
use crate::events::{BatteryState, BudSide, LinkQualitySample, Placement, StateSnapshot};
use crate::notify::{HandoverObserver, HandoverReason, HandoverResult, Notifier, Urgency};
use crate::queue::{SampleQueue, UNKNOWN_QUALITY};
use crate::time::{elapsed, Timestamp};

/// What the voice-quality tiers concluded for this pass.
enum VoiceVerdict {
    /// No tier matched in either direction.
    None,
    /// The remote microphone is enough better to recommend moving.
    Recommend(Urgency),
    /// The local microphone is enough better to hold weaker candidates.
    Suppress(Urgency),
}

/// Decision engine for one earbud pair.
pub struct HandoverEngine {
    config: EngineConfig,
    /// Time of the last full evaluation pass.
    timestamp: Option<Timestamp>,
    in_call: bool,
    local: BudState,
    remote: BudState,
    notifier: Notifier,
}

impl HandoverEngine {
    /// Build an engine from the platform's current state and register the
    /// single notification client.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        snapshot: StateSnapshot,
        client: Box<dyn HandoverObserver>,
    ) -> Self {
        let local = BudState::new(
            &config.rules,
            snapshot.local_in_case,
            snapshot.local_in_ear,
            snapshot.local_battery,
        );
        let remote = BudState::new(
            &config.rules,
            snapshot.remote_in_case,
            snapshot.remote_in_ear,
            snapshot.remote_battery,
        );
        let notifier = Notifier::new(client, config.tunables.retry);
        Self {
            config,
            timestamp: None,
            in_call: snapshot.sco_active,
            local,
            remote,
            notifier,
        }
    }

    fn local_in_ear(&self) -> bool {
        self.local.is_in_ear(self.config.tunables.in_ear_fallback)
    }

    fn remote_in_ear(&self) -> bool {
        self.remote.is_in_ear(self.config.tunables.in_ear_fallback)
    }

    fn bud_mut(&mut self, side: BudSide) -> &mut BudState {
        match side {
            BudSide::Local => &mut self.local,
            BudSide::Remote => &mut self.remote,
        }
    }

    /// Whether the local bud is neither worn nor docked, the placement
    /// state the out-of-ear grace timer covers. Drives the caller-owned
    /// timer; a docked bud is handled by the in-case rule immediately.
    #[must_use]
    pub fn local_out_of_ear(&self) -> bool {
        !self.local.in_case && !self.local_in_ear()
    }

    /// Stamp `last_time_in_ear` on whichever buds are worn right now.
    fn refresh_in_ear_times(&mut self, now: Timestamp) {
        if self.local_in_ear() {
            self.local.last_time_in_ear = Some(now);
        }
        if self.remote_in_ear() {
            self.remote.last_time_in_ear = Some(now);
        }
    }

    /// Apply a placement transition and re-evaluate.
    pub fn handle_placement(&mut self, now: Timestamp, side: BudSide, placement: Placement) {
        trace!(timestamp = now, ?side, ?placement, "placement event");
        // Stamp wear times against the state preceding this transition.
        self.refresh_in_ear_times(now);
        let fallback = self.config.tunables.in_ear_fallback;
        let bud = self.bud_mut(side);
        match placement {
            Placement::InCase => bud.in_case = true,
            Placement::OutOfCase => bud.in_case = false,
            Placement::InEar => {
                if !bud.is_in_ear(fallback) {
                    bud.in_out_transition = Some(now);
                }
                bud.in_ear = Some(true);
            }
            Placement::OutOfEar => {
                if bud.is_in_ear(fallback) {
                    bud.in_out_transition = Some(now);
                }
                bud.in_ear = Some(false);
            }
        }
        self.update(now);
    }

    /// Track call-audio state and re-evaluate.
    pub fn handle_sco(&mut self, now: Timestamp, active: bool) {
        debug!(timestamp = now, active, "sco state change");
        self.refresh_in_ear_times(now);
        self.in_call = active;
        self.update(now);
    }

    /// Record a bud's battery classification and re-evaluate.
    pub fn handle_battery(&mut self, now: Timestamp, side: BudSide, state: BatteryState) {
        if !self.config.rules.battery {
            trace!(timestamp = now, "battery rule disabled; update ignored");
            return;
        }
        debug!(timestamp = now, ?side, ?state, "battery state change");
        self.bud_mut(side).battery = state;
        self.update(now);
    }

    /// Record a microphone quality score and re-evaluate.
    pub fn handle_voice_quality(&mut self, now: Timestamp, side: BudSide, quality: u8) {
        if !self.config.rules.voice {
            trace!(timestamp = now, "voice rule disabled; sample ignored");
            return;
        }
        trace!(timestamp = now, ?side, quality, "voice quality sample");
        // The unknown sentinel adds no information and would evict a real
        // sample from the window.
        if quality != UNKNOWN_QUALITY {
            if let Some(queue) = self.bud_mut(side).voice_quality.as_mut() {
                queue.push(quality, now);
            }
        }
        self.update(now);
    }

    /// Record a phone-link RSSI reading and re-evaluate. Peer-link
    /// readings are dropped: the bud-to-bud link says nothing about which
    /// bud the phone hears better.
    pub fn handle_link_quality(&mut self, now: Timestamp, side: BudSide, sample: LinkQualitySample) {
        if !self.config.rules.signal {
            trace!(timestamp = now, "signal rule disabled; sample ignored");
            return;
        }
        if sample.peer_link {
            return;
        }
        trace!(timestamp = now, ?side, rssi = sample.rssi, "phone link quality sample");
        if let Some(queue) = self.bud_mut(side).phone_rssi.as_mut() {
            queue.push(sample.rssi as u8, now);
        }
        self.update(now);
    }

    /// Force a recommendation with the given urgency, bypassing every
    /// rule. Invalid urgencies are ignored without side effects.
    pub fn handle_external_request(&mut self, now: Timestamp, urgency: Urgency) {
        if urgency == Urgency::Invalid {
            debug!(timestamp = now, "external request with invalid urgency ignored");
            return;
        }
        debug!(timestamp = now, ?urgency, "external handover request");
        self.timestamp = Some(now);
        self.notifier
            .submit(now, HandoverResult::new(HandoverReason::External, urgency));
    }

    /// Run one evaluation pass and hand the merged outcome to the
    /// notifier.
    ///
    /// Passes closer together than the minimum update interval skip the
    /// rules entirely but still forward the empty result, so a standing
    /// recommendation can be cancelled even while rate limited.
    pub fn update(&mut self, now: Timestamp) {
        let mut result = HandoverResult::NONE;
        if let Some(previous) = self.timestamp {
            if elapsed(now, previous) < self.config.tunables.min_update_interval_ms {
                self.notifier.submit(previous, result);
                return;
            }
        }

        debug!(timestamp = now, "evaluating handover rules");
        trace!(
            local_in_case = self.local.in_case,
            local_in_ear = ?self.local.in_ear,
            remote_in_case = self.remote.in_case,
            remote_in_ear = ?self.remote.in_ear,
            "bud placement"
        );
        self.timestamp = Some(now);

        // (1) Local bud back in its case while the remote is out.
        if self.local.in_case && !self.remote.in_case {
            result = result.merge(HandoverResult::new(
                HandoverReason::InCase,
                Urgency::Critical,
            ));
        }

        // (2) Local battery critical while the remote still has charge.
        if self.config.rules.battery
            && self.local.battery == BatteryState::Critical
            && self.remote.battery != BatteryState::Critical
        {
            if self.local_in_ear() && !self.remote_in_ear() {
                // Never vacate a bud in active use for one that is unwearable.
                debug!(timestamp = now, "battery handover suppressed; remote bud is out of ear");
            } else {
                result = result.merge(HandoverResult::new(
                    HandoverReason::BatteryLevel,
                    Urgency::High,
                ));
            }
        }

        self.refresh_in_ear_times(now);

        // (3) Local bud out of ear while the remote is worn.
        if !self.local_in_ear() && self.remote_in_ear() {
            let grace_expired = match self.local.last_time_in_ear {
                None => true,
                Some(last) => elapsed(now, last) >= self.config.tunables.out_of_ear_grace_ms,
            };
            if grace_expired {
                result = result.merge(HandoverResult::new(
                    HandoverReason::OutOfEar,
                    Urgency::High,
                ));
            }
        }

        // (4) Phone-link signal quality, unless the remote cannot take over.
        if self.config.rules.signal {
            let skip = (self.local_in_ear() && !self.remote_in_ear())
                || self.remote.in_case
                || (self.config.rules.battery && self.remote.battery == BatteryState::Critical);
            if !skip {
                if let Some(urgency) = self.link_urgency(now) {
                    result = result.merge(HandoverResult::new(
                        HandoverReason::SignalQuality,
                        urgency,
                    ));
                }
            }
        }

        // (5) Microphone quality, only meaningful during a call.
        if self.config.rules.voice && self.in_call && !self.remote.in_case {
            match self.voice_verdict(now) {
                VoiceVerdict::Recommend(urgency) => {
                    result = result.merge(HandoverResult::new(
                        HandoverReason::VoiceQuality,
                        urgency,
                    ));
                }
                VoiceVerdict::Suppress(tier) => {
                    if suppresses(tier, result.urgency) {
                        debug!(
                            timestamp = now,
                            reason = ?result.reason,
                            urgency = ?result.urgency,
                            "handover suppressed; the local microphone is the better one"
                        );
                        result = HandoverResult::NONE;
                    }
                }
                VoiceVerdict::None => {}
            }
        }

        self.notifier.submit(now, result);
    }

    /// Walk the RSSI tiers, most urgent first; the first tier where both
    /// filtered values are valid dBm readings and the remote link is
    /// enough stronger wins.
    fn link_urgency(&self, now: Timestamp) -> Option<Urgency> {
        let local = self.local.phone_rssi.as_ref()?;
        let remote = self.remote.phone_rssi.as_ref()?;
        for (urgency, tier) in self.config.rssi.descending() {
            let (Some(local_dbm), Some(remote_dbm)) = (
                local.filtered(now, tier.half_life_ms, tier.max_age_ms),
                remote.filtered(now, tier.half_life_ms, tier.max_age_ms),
            ) else {
                continue;
            };
            trace!(timestamp = now, ?urgency, local_dbm, remote_dbm, "rssi tier check");
            if local_dbm < 0
                && remote_dbm < 0
                && local_dbm < tier.abs_threshold
                && remote_dbm - local_dbm > tier.rel_threshold
            {
                return Some(urgency);
            }
        }
        None
    }

    /// Walk the microphone tiers, most urgent first, stopping at the
    /// first match in either direction. A remote win recommends moving; a
    /// local win becomes a suppression of weaker candidates instead.
    fn voice_verdict(&self, now: Timestamp) -> VoiceVerdict {
        let Some(local) = self.local.voice_quality.as_ref() else {
            return VoiceVerdict::None;
        };
        let Some(remote) = self.remote.voice_quality.as_ref() else {
            return VoiceVerdict::None;
        };
        for (urgency, tier) in self.config.mic.descending() {
            let (Some(local_vq), Some(remote_vq)) = (
                local.filtered(now, tier.half_life_ms, tier.max_age_ms),
                remote.filtered(now, tier.half_life_ms, tier.max_age_ms),
            ) else {
                continue;
            };
            trace!(timestamp = now, ?urgency, local_vq, remote_vq, "voice tier check");
            if local_vq < tier.abs_threshold && remote_vq - local_vq > tier.rel_threshold {
                return VoiceVerdict::Recommend(urgency);
            }
            if remote_vq < tier.abs_threshold && local_vq - remote_vq > tier.rel_threshold {
                return VoiceVerdict::Suppress(urgency);
            }
        }
        VoiceVerdict::None
    }

    /// Serializable snapshot of engine state for diagnostics and replay
    /// output.
    #[must_use]
    pub fn report(&self) -> EngineReport {
        let fallback = self.config.tunables.in_ear_fallback;
        EngineReport {
            timestamp: self.timestamp,
            in_call: self.in_call,
            last_handover_attempt: self.notifier.last_attempt(),
            result: self.notifier.last_result(),
            local: BudReport::of(&self.local, fallback),
            remote: BudReport::of(&self.remote, fallback),
        }
    }
}

/// Whether a suppression at `tier` clears a merged result of `urgency`.
/// Critical results are never cleared.
fn suppresses(tier: Urgency, urgency: Urgency) -> bool {
    match tier {
        Urgency::Critical => matches!(urgency, Urgency::Low | Urgency::High),
        Urgency::High => urgency == Urgency::Low,
        Urgency::Low | Urgency::Invalid => false,
    }
}

/// Diagnostic snapshot of the whole engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineReport {
    pub timestamp: Option<Timestamp>,
    pub in_call: bool,
    pub last_handover_attempt: Option<Timestamp>,
    pub result: HandoverResult,
    pub local: BudReport,
    pub remote: BudReport,
}

/// Diagnostic snapshot of one bud, with queue contents decoded to
/// `(value, absolute time)` pairs, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct BudReport {
    pub in_case: bool,
    /// Effective in-ear state, after case and fallback handling.
    pub in_ear: bool,
    pub battery: BatteryState,
    pub last_time_in_ear: Option<Timestamp>,
    pub in_out_transition: Option<Timestamp>,
    pub voice_quality: Vec<(i16, Timestamp)>,
    pub phone_rssi: Vec<(i16, Timestamp)>,
}

impl BudReport {
    fn of(bud: &BudState, fallback: bool) -> Self {
        let dump = |queue: &Option<SampleQueue>| {
            queue.as_ref().map(SampleQueue::samples).unwrap_or_default()
        };
        Self {
            in_case: bud.in_case,
            in_ear: bud.is_in_ear(fallback),
            battery: bud.battery,
            last_time_in_ear: bud.last_time_in_ear,
            in_out_transition: bud.in_out_transition,
            voice_quality: dump(&bud.voice_quality),
            phone_rssi: dump(&bud.phone_rssi),
        }
    }
}
