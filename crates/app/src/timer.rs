//! In-process timer queue — a min-heap of due instants.
//!
//! The single-threaded dispatch loop sleeps until [`TimerQueue::next_due`] and
//! then drains [`TimerQueue::pop_due`]. Cancellation is lazy: a cancelled
//! handle leaves its heap entry behind, which is skipped when it surfaces.
//! Cancelling is idempotent and safe even if the timer already fired.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use hestia_domain::id::ActuatorId;
use hestia_domain::time::Timestamp;

/// What a timer expiry means to the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKey {
    /// Periodic scheduler check.
    SchedulerTick,
    /// An automatic block's suppression window ends.
    BlockExpiry(ActuatorId),
    /// A shutter movement measurement never saw its stop signal.
    CalibrationTimeout(ActuatorId),
}

/// Revocable reference to an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(u64);

/// Min-heap of pending timers with lazily-cancelled entries.
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<(Timestamp, u64)>>,
    live: HashMap<u64, TimerKey>,
    next_id: u64,
}

impl TimerQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer for `due`; returns a handle usable for cancellation.
    pub fn arm(&mut self, due: Timestamp, key: TimerKey) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, key);
        self.heap.push(Reverse((due, id)));
        TimerHandle(id)
    }

    /// Revoke a timer. Idempotent; a handle that already fired is a no-op.
    pub fn cancel(&mut self, handle: TimerHandle) {
        self.live.remove(&handle.0);
    }

    /// The earliest live due instant, if any.
    ///
    /// Dead heap entries surfacing at the head are discarded on the way.
    pub fn next_due(&mut self) -> Option<Timestamp> {
        while let Some(Reverse((due, id))) = self.heap.peek().copied() {
            if self.live.contains_key(&id) {
                return Some(due);
            }
            self.heap.pop();
        }
        None
    }

    /// Pop the next live timer that is due at or before `now`.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<TimerKey> {
        while let Some(Reverse((due, id))) = self.heap.peek().copied() {
            if due > now {
                return None;
            }
            self.heap.pop();
            if let Some(key) = self.live.remove(&id) {
                return Some(key);
            }
        }
        None
    }

    /// Number of live (non-cancelled) timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(minute: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, minute, 0).unwrap()
    }

    #[test]
    fn should_pop_timers_in_due_order() {
        let mut queue = TimerQueue::new();
        let a = ActuatorId::new();
        let b = ActuatorId::new();
        queue.arm(at(20), TimerKey::BlockExpiry(b));
        queue.arm(at(10), TimerKey::BlockExpiry(a));

        assert_eq!(queue.next_due(), Some(at(10)));
        assert_eq!(queue.pop_due(at(30)), Some(TimerKey::BlockExpiry(a)));
        assert_eq!(queue.pop_due(at(30)), Some(TimerKey::BlockExpiry(b)));
        assert_eq!(queue.pop_due(at(30)), None);
    }

    #[test]
    fn should_not_pop_timers_that_are_not_yet_due() {
        let mut queue = TimerQueue::new();
        queue.arm(at(10), TimerKey::SchedulerTick);
        assert_eq!(queue.pop_due(at(5)), None);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn should_skip_cancelled_timers() {
        let mut queue = TimerQueue::new();
        let id = ActuatorId::new();
        let handle = queue.arm(at(10), TimerKey::BlockExpiry(id));
        queue.arm(at(20), TimerKey::SchedulerTick);

        queue.cancel(handle);
        assert_eq!(queue.next_due(), Some(at(20)));
        assert_eq!(queue.pop_due(at(30)), Some(TimerKey::SchedulerTick));
    }

    #[test]
    fn should_treat_double_cancel_as_noop() {
        let mut queue = TimerQueue::new();
        let handle = queue.arm(at(10), TimerKey::SchedulerTick);
        queue.cancel(handle);
        queue.cancel(handle);
        assert!(queue.is_empty());
    }

    #[test]
    fn should_allow_cancelling_after_fire() {
        let mut queue = TimerQueue::new();
        let handle = queue.arm(at(10), TimerKey::SchedulerTick);
        assert_eq!(queue.pop_due(at(10)), Some(TimerKey::SchedulerTick));
        queue.cancel(handle);
        assert!(queue.is_empty());
    }

    #[test]
    fn should_return_none_when_empty() {
        let mut queue = TimerQueue::new();
        assert_eq!(queue.next_due(), None);
        assert_eq!(queue.pop_due(at(0)), None);
    }
}
