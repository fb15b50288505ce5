//! Timer scheduling
//!
//! Every timed behavior in the lobby (controller polling, run ticks, the hard
//! timeout, handshake retries, catalog refresh, the SDK's mock fallback) is an
//! alarm registered with a [`Scheduler`]. Alarms come back to their owner
//! through its `receive_alarm` method; registering returns a [`TimerToken`]
//! that cancels the alarm.
//!
//! [`TimerQueue`] is a deterministic implementation driven by an explicit
//! clock. Headless hosts pump it from their own loop; tests use it to step
//! time precisely.

use std::collections::BTreeMap;

use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use web_time::Duration;

/// Handle to a scheduled alarm
///
/// Tokens are never reused, so clearing a token whose alarm already fired or
/// was cleared is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerToken(u64);

/// Something that can deliver alarms of type `A` later
pub trait Scheduler<A> {
    /// Current time on the scheduler's monotonic clock
    fn now(&self) -> Duration;

    /// Delivers `alarm` once, after `delay`
    fn set_timeout(&mut self, alarm: A, delay: Duration) -> TimerToken;

    /// Delivers `alarm` every `period` until cleared
    fn set_interval(&mut self, alarm: A, period: Duration) -> TimerToken;

    /// Cancels an alarm; a no-op for unknown or spent tokens
    fn clear(&mut self, token: TimerToken);
}

#[derive(Debug, Clone)]
struct Entry<A> {
    due: Duration,
    period: Option<Duration>,
    alarm: A,
}

/// A manually advanced timer queue
///
/// Alarms fire in due order; ties fire in registration order. While an alarm
/// is being handled [`Scheduler::now`] reports its due time, so handlers see
/// the same clock they would under a real event loop.
#[derive(Debug)]
#[derive_where(Default)]
pub struct TimerQueue<A> {
    now: Duration,
    next_token: u64,
    entries: BTreeMap<TimerToken, Entry<A>>,
}

impl<A: Clone> TimerQueue<A> {
    /// Creates an empty queue at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of alarms still scheduled
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Whether the alarm behind `token` is still scheduled
    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.entries.contains_key(&token)
    }

    /// Scheduled alarms, in no particular order
    pub fn alarms(&self) -> impl Iterator<Item = &A> {
        self.entries.values().map(|entry| &entry.alarm)
    }

    /// Due time of the earliest alarm
    pub fn next_due(&self) -> Option<Duration> {
        self.entries.values().map(|entry| entry.due).min()
    }

    /// Removes and returns the earliest alarm due at or before `until`
    ///
    /// Intervals are re-armed one period after their due time. When nothing
    /// is due the clock moves to `until`.
    pub fn pop_due(&mut self, until: Duration) -> Option<A> {
        let Some((token, due)) = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.due <= until)
            .min_by_key(|(token, entry)| (entry.due, **token))
            .map(|(token, entry)| (*token, entry.due))
        else {
            self.now = self.now.max(until);
            return None;
        };

        self.now = self.now.max(due);

        let entry = self.entries.get_mut(&token)?;
        let alarm = entry.alarm.clone();
        match entry.period {
            Some(period) => entry.due = due + period,
            None => {
                self.entries.remove(&token);
            }
        }
        Some(alarm)
    }

    /// Fires every alarm due by `until`, in order, collecting them
    ///
    /// Prefer the owner's own `advance_to` when handlers may clear timers:
    /// this collects first, so a clear made while handling cannot suppress an
    /// alarm already collected.
    pub fn drain_until(&mut self, until: Duration) -> Vec<A> {
        std::iter::from_fn(|| self.pop_due(until)).collect()
    }

    fn insert(&mut self, alarm: A, delay: Duration, period: Option<Duration>) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        self.entries.insert(
            token,
            Entry {
                due: self.now + delay,
                period,
                alarm,
            },
        );
        token
    }
}

impl<A: Clone> Scheduler<A> for TimerQueue<A> {
    fn now(&self) -> Duration {
        self.now
    }

    fn set_timeout(&mut self, alarm: A, delay: Duration) -> TimerToken {
        self.insert(alarm, delay, None)
    }

    fn set_interval(&mut self, alarm: A, period: Duration) -> TimerToken {
        let period = period.max(Duration::from_millis(1));
        self.insert(alarm, period, Some(period))
    }

    fn clear(&mut self, token: TimerToken) {
        self.entries.remove(&token);
    }
}
