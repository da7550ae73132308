//! Deterministic timer queue.
//!
//! Every component that waits on time (reconnect backoff, heartbeats, deal
//! pacing, showdown countdown, chip animations) owns a [`Scheduler`] and is
//! driven by whoever owns the clock: the async driver in production, plain
//! integer milliseconds in tests. Cancelling a handle removes the timer, but
//! components still tag their timers with a generation and re-check it when
//! the timer fires, so a timer that escapes cancellation is harmless.

use std::collections::{BTreeMap, HashMap};

/// Milliseconds on a monotonic clock whose origin is chosen by the driver.
pub type Millis = u64;

/// Cancellation token for a scheduled timer.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TimerHandle(u64);

/// A monotonically increasing epoch used to invalidate deferred work.
///
/// Each restart of a sequence bumps the generation; every deferred step
/// carries the generation it was scheduled under and is discarded on
/// mismatch.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Generation(pub u64);

impl Generation {
    /// Advance to the next generation and return it.
    pub fn bump(&mut self) -> Generation {
        self.0 = self.0.wrapping_add(1);
        *self
    }
}

/// Ordered timer queue. Timers with the same deadline fire in the order they
/// were scheduled.
#[derive(Debug)]
pub struct Scheduler<T> {
    next_id: u64,
    timers: BTreeMap<(Millis, u64), T>,
    deadlines: HashMap<u64, Millis>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            timers: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Schedule `payload` to fire `delay` milliseconds after `now`.
    pub fn schedule(&mut self, now: Millis, delay: Millis, payload: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        let deadline = now.saturating_add(delay);
        self.timers.insert((deadline, id), payload);
        self.deadlines.insert(id, deadline);
        TimerHandle(id)
    }

    /// Remove a pending timer. Returns `false` if it already fired or was
    /// already cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.deadlines.remove(&handle.0) {
            Some(deadline) => self.timers.remove(&(deadline, handle.0)).is_some(),
            None => false,
        }
    }

    /// Drop every pending timer.
    pub fn clear(&mut self) {
        self.timers.clear();
        self.deadlines.clear();
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest timer whose deadline is at or before
    /// `now`, together with that deadline.
    pub fn pop_due(&mut self, now: Millis) -> Option<(Millis, T)> {
        let (&(deadline, id), _) = self.timers.first_key_value()?;
        if deadline > now {
            return None;
        }
        self.deadlines.remove(&id);
        self.timers
            .remove(&(deadline, id))
            .map(|payload| (deadline, payload))
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_deadline_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(0, 300, "c");
        scheduler.schedule(0, 100, "a");
        scheduler.schedule(0, 200, "b");

        assert_eq!(scheduler.next_deadline(), Some(100));
        assert_eq!(scheduler.pop_due(50), None);
        assert_eq!(scheduler.pop_due(250), Some((100, "a")));
        assert_eq!(scheduler.pop_due(250), Some((200, "b")));
        assert_eq!(scheduler.pop_due(250), None);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_same_deadline_is_fifo() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(10, 0, 1);
        scheduler.schedule(10, 0, 2);
        scheduler.schedule(10, 0, 3);
        let fired: Vec<_> = std::iter::from_fn(|| scheduler.pop_due(10).map(|(_, p)| p)).collect();
        assert_eq!(fired, vec![1, 2, 3]);
    }

    #[test]
    fn test_cancel() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(0, 100, ());
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(0, 5, ());
        assert!(scheduler.pop_due(5).is_some());
        assert!(!scheduler.cancel(handle));
    }

    #[test]
    fn test_generation_bump() {
        let mut generation = Generation::default();
        let first = generation.bump();
        let second = generation.bump();
        assert_ne!(first, second);
        assert_eq!(generation, second);
    }
}
