//! Handover results, client notifications, and the debouncing notifier.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RetryIntervals;
use crate::time::{elapsed, Timestamp};

/// Why a handover is recommended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoverReason {
    Invalid,
    BatteryLevel,
    VoiceQuality,
    SignalQuality,
    InCase,
    OutOfEar,
    External,
}

/// How strongly a handover is recommended.
///
/// Ordered so that merging evaluation results can keep the maximum:
/// `Invalid < Low < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Invalid,
    Low,
    High,
    Critical,
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverResult {
    /// Whether a handover is recommended at all.
    pub handover: bool,
    pub reason: HandoverReason,
    pub urgency: Urgency,
}

impl HandoverResult {
    /// The empty result: nothing to recommend.
    pub const NONE: Self = Self {
        handover: false,
        reason: HandoverReason::Invalid,
        urgency: Urgency::Invalid,
    };

    /// Build a result; it recommends a handover only when both the reason
    /// and the urgency are valid.
    #[must_use]
    pub fn new(reason: HandoverReason, urgency: Urgency) -> Self {
        Self {
            handover: reason != HandoverReason::Invalid && urgency != Urgency::Invalid,
            reason,
            urgency,
        }
    }

    /// Keep the more urgent of two results; ties keep `self`, so earlier
    /// rules win when urgencies are equal.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        if self.urgency >= other.urgency {
            self
        } else {
            other
        }
    }
}

/// Payload delivered to the registered client for a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverNotification {
    pub timestamp: Timestamp,
    pub reason: HandoverReason,
    pub urgency: Urgency,
}

/// The single registered client fed by the notifier.
pub trait HandoverObserver {
    /// A handover is recommended now.
    fn handover_recommended(&mut self, notification: HandoverNotification);
    /// A previously recommended handover no longer applies.
    fn handover_cancelled(&mut self);
}

/// Turns raw evaluation results into client notifications, cancelling a
/// cleared recommendation and debouncing repeats per urgency.
pub(crate) struct Notifier {
    client: Box<dyn HandoverObserver>,
    retry: RetryIntervals,
    last_result: HandoverResult,
    last_attempt: Option<Timestamp>,
}

impl Notifier {
    pub(crate) fn new(client: Box<dyn HandoverObserver>, retry: RetryIntervals) -> Self {
        Self {
            client,
            retry,
            last_result: HandoverResult::NONE,
            last_attempt: None,
        }
    }

    pub(crate) fn last_result(&self) -> HandoverResult {
        self.last_result
    }

    pub(crate) fn last_attempt(&self) -> Option<Timestamp> {
        self.last_attempt
    }

    /// Apply a fresh evaluation result.
    ///
    /// An empty result cancels a standing recommendation. A recommendation
    /// inside its urgency's retry window is dropped without touching any
    /// state, so the attempt clock keeps running from the original emit.
    pub(crate) fn submit(&mut self, now: Timestamp, result: HandoverResult) {
        if !result.handover {
            if self.last_result.handover {
                info!(timestamp = now, "handover recommendation cancelled");
                self.client.handover_cancelled();
            }
            self.last_result = result;
            return;
        }

        let min_retry = self.retry.for_urgency(result.urgency);
        if let Some(attempted) = self.last_attempt {
            if elapsed(now, attempted) < min_retry {
                info!(
                    timestamp = now,
                    reason = ?result.reason,
                    urgency = ?result.urgency,
                    "recommendation dropped inside the retry window"
                );
                return;
            }
        }

        self.last_result = result;
        self.last_attempt = Some(now);
        info!(
            timestamp = now,
            reason = ?result.reason,
            urgency = ?result.urgency,
            "handover recommended"
        );
        self.client.handover_recommended(HandoverNotification {
            timestamp: now,
            reason: result.reason,
            urgency: result.urgency,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Seen {
        Recommended(HandoverNotification),
        Cancelled,
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Seen>>>);

    impl Recorder {
        fn take(&self) -> Vec<Seen> {
            self.0.borrow_mut().drain(..).collect()
        }
    }

    impl HandoverObserver for Recorder {
        fn handover_recommended(&mut self, notification: HandoverNotification) {
            self.0.borrow_mut().push(Seen::Recommended(notification));
        }

        fn handover_cancelled(&mut self) {
            self.0.borrow_mut().push(Seen::Cancelled);
        }
    }

    fn notifier(retry: RetryIntervals) -> (Notifier, Recorder) {
        let recorder = Recorder::default();
        (Notifier::new(Box::new(recorder.clone()), retry), recorder)
    }

    #[test]
    fn result_recommends_only_when_both_fields_are_valid() {
        assert!(HandoverResult::new(HandoverReason::InCase, Urgency::Critical).handover);
        assert!(!HandoverResult::new(HandoverReason::InCase, Urgency::Invalid).handover);
        assert!(!HandoverResult::new(HandoverReason::Invalid, Urgency::Critical).handover);
    }

    #[test]
    fn merge_ties_keep_the_earlier_result() {
        let first = HandoverResult::new(HandoverReason::InCase, Urgency::Critical);
        let second = HandoverResult::new(HandoverReason::VoiceQuality, Urgency::Critical);
        assert_eq!(first.merge(second).reason, HandoverReason::InCase);
    }

    #[test]
    fn submit_emits_and_records_the_attempt_time() {
        let (mut notifier, recorder) = notifier(RetryIntervals::default());
        notifier.submit(100, HandoverResult::new(HandoverReason::OutOfEar, Urgency::High));
        assert_eq!(notifier.last_attempt(), Some(100));
        assert_eq!(
            recorder.take(),
            vec![Seen::Recommended(HandoverNotification {
                timestamp: 100,
                reason: HandoverReason::OutOfEar,
                urgency: Urgency::High,
            })]
        );
    }

    #[test]
    fn clearing_a_standing_recommendation_emits_one_cancel() {
        let (mut notifier, recorder) = notifier(RetryIntervals::default());
        notifier.submit(100, HandoverResult::new(HandoverReason::InCase, Urgency::Critical));
        notifier.submit(200, HandoverResult::NONE);
        notifier.submit(300, HandoverResult::NONE);
        let seen = recorder.take();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], Seen::Cancelled);
        assert!(!notifier.last_result().handover);
    }

    #[test]
    fn repeat_inside_the_retry_window_is_dropped_silently() {
        let retry = RetryIntervals {
            high_ms: 5_000,
            ..RetryIntervals::default()
        };
        let (mut notifier, recorder) = notifier(retry);
        let result = HandoverResult::new(HandoverReason::BatteryLevel, Urgency::High);
        notifier.submit(1_000, result);
        notifier.submit(3_000, result);
        assert_eq!(recorder.take().len(), 1);
        assert_eq!(notifier.last_attempt(), Some(1_000));
        notifier.submit(6_000, result);
        assert_eq!(recorder.take().len(), 1);
        assert_eq!(notifier.last_attempt(), Some(6_000));
    }

    #[test]
    fn retry_windows_are_looked_up_per_urgency() {
        let retry = RetryIntervals {
            low_ms: 10_000,
            high_ms: 0,
            critical_ms: 0,
        };
        let (mut notifier, recorder) = notifier(retry);
        notifier.submit(0, HandoverResult::new(HandoverReason::SignalQuality, Urgency::Low));
        // A high-urgency follow-up is not bound by the low window.
        notifier.submit(100, HandoverResult::new(HandoverReason::OutOfEar, Urgency::High));
        assert_eq!(recorder.take().len(), 2);
    }

    proptest! {
        #[test]
        fn merge_always_yields_the_maximum_urgency(a in 0usize..4, b in 0usize..4) {
            let urgencies = [Urgency::Invalid, Urgency::Low, Urgency::High, Urgency::Critical];
            let left = HandoverResult::new(HandoverReason::OutOfEar, urgencies[a]);
            let right = HandoverResult::new(HandoverReason::SignalQuality, urgencies[b]);
            let forward = left.merge(right);
            let backward = right.merge(left);
            prop_assert_eq!(forward.urgency, backward.urgency);
            prop_assert_eq!(forward.urgency, urgencies[a.max(b)]);
        }
    }
}
