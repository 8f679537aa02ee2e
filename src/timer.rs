//! Wall-clock anchored rest countdown.
//!
//! The timer stores an absolute end time and recomputes the remaining time
//! from the clock on every tick, so a host that is suspended mid-rest reads a
//! correct value on resume instead of a value that drifted by the number of
//! missed ticks.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::error::StorageError;

/// Delay before a completion found during restore is delivered
pub const DEFAULT_REDELIVERY_DELAY_MS: i64 = 100;

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }

    pub fn advance_secs(&self, seconds: i64) {
        self.advance(Duration::seconds(seconds));
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// What survives a suspension: enough to rebuild the countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub end_time: DateTime<Utc>,
    pub total_seconds: u32,
}

/// Narrow key-value store for rest timer end times
pub trait TimerStateStore {
    fn save_timer(&mut self, key: &str, snapshot: &TimerSnapshot) -> Result<(), StorageError>;
    fn load_timer(&self, key: &str) -> Result<Option<TimerSnapshot>, StorageError>;
    fn clear_timer(&mut self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Idle,
    Armed,
    /// Expired while suspended; delivered on the first tick at or after `deliver_at`
    Pending { deliver_at: DateTime<Utc> },
    Fired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestTimer {
    total_seconds: u32,
    end_time: Option<DateTime<Utc>>,
    exact_remaining: f64,
    has_started: bool,
    completion: Completion,
    redelivery_delay: Duration,
}

impl Default for RestTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl RestTimer {
    pub fn new() -> Self {
        Self {
            total_seconds: 0,
            end_time: None,
            exact_remaining: 0.0,
            has_started: false,
            completion: Completion::Idle,
            redelivery_delay: Duration::milliseconds(DEFAULT_REDELIVERY_DELAY_MS),
        }
    }

    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }

    /// Begin counting down `duration_seconds` from `now`
    pub fn start(&mut self, duration_seconds: u32, now: DateTime<Utc>) {
        self.total_seconds = duration_seconds;
        self.end_time = Some(now + Duration::seconds(i64::from(duration_seconds)));
        self.exact_remaining = f64::from(duration_seconds);
        self.has_started = true;
        self.completion = Completion::Armed;
    }

    /// Rebuild a countdown from a snapshot taken before suspension.
    ///
    /// An already elapsed end time still produces exactly one completion,
    /// delivered by a later `tick` rather than during the restore itself.
    pub fn restore(snapshot: TimerSnapshot, now: DateTime<Utc>, redelivery_delay: Duration) -> Self {
        let mut timer = Self::new().with_redelivery_delay(redelivery_delay);
        timer.total_seconds = snapshot.total_seconds;
        timer.has_started = true;

        let remaining = seconds_between(now, snapshot.end_time);
        if remaining > 0.0 {
            timer.end_time = Some(snapshot.end_time);
            timer.exact_remaining = remaining;
            timer.completion = Completion::Armed;
        } else {
            timer.exact_remaining = 0.0;
            timer.completion = Completion::Pending {
                deliver_at: now + redelivery_delay,
            };
        }

        timer
    }

    /// Recompute the remaining time from the clock.
    ///
    /// Returns `Some(TimerEvent::Completed)` exactly once per started countdown.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<TimerEvent> {
        match self.completion {
            Completion::Armed => {
                let end_time = self.end_time?;
                let remaining = seconds_between(now, end_time);
                if remaining > 0.0 {
                    self.exact_remaining = remaining;
                    None
                } else {
                    self.fire()
                }
            }
            Completion::Pending { deliver_at } if now >= deliver_at => self.fire(),
            _ => None,
        }
    }

    fn fire(&mut self) -> Option<TimerEvent> {
        self.exact_remaining = 0.0;
        self.has_started = false;
        self.end_time = None;
        self.completion = Completion::Fired;
        Some(TimerEvent::Completed)
    }

    /// Cancel the countdown without firing
    pub fn stop(&mut self) {
        self.has_started = false;
        self.end_time = None;
        if self.completion != Completion::Fired {
            self.completion = Completion::Idle;
        }
    }

    /// Debug shortcut: move the end time so `to_seconds` remain.
    ///
    /// Never extends a rest; returns whether the end time was rewritten.
    pub fn fast_forward(&mut self, to_seconds: u32, now: DateTime<Utc>) -> bool {
        if self.completion != Completion::Armed || f64::from(to_seconds) >= self.exact_remaining {
            return false;
        }
        self.end_time = Some(now + Duration::seconds(i64::from(to_seconds)));
        self.exact_remaining = f64::from(to_seconds);
        true
    }

    /// Remaining time rounded up, for display
    pub fn remaining_whole_seconds(&self) -> u32 {
        self.exact_remaining.max(0.0).ceil() as u32
    }

    pub fn exact_remaining(&self) -> f64 {
        self.exact_remaining
    }

    /// Fraction of the rest still to go, in `[0, 1]`
    pub fn progress_fraction(&self) -> f64 {
        if self.total_seconds == 0 {
            return 0.0;
        }
        (self.exact_remaining / f64::from(self.total_seconds)).clamp(0.0, 1.0)
    }

    pub fn has_started(&self) -> bool {
        self.has_started
    }

    /// Started and not yet fired or stopped
    pub fn is_running(&self) -> bool {
        matches!(
            self.completion,
            Completion::Armed | Completion::Pending { .. }
        )
    }

    pub fn has_fired(&self) -> bool {
        self.completion == Completion::Fired
    }

    pub fn total_seconds(&self) -> u32 {
        self.total_seconds
    }

    /// State to persist while suspended; `None` once stopped or fired
    pub fn snapshot(&self) -> Option<TimerSnapshot> {
        match self.completion {
            Completion::Armed => self.end_time.map(|end_time| TimerSnapshot {
                end_time,
                total_seconds: self.total_seconds,
            }),
            // Already elapsed: any end time in the past restores to a pending completion
            Completion::Pending { deliver_at } => Some(TimerSnapshot {
                end_time: deliver_at - self.redelivery_delay,
                total_seconds: self.total_seconds,
            }),
            _ => None,
        }
    }

    /// `m:ss` countdown text
    pub fn time_string(&self) -> String {
        let remaining = self.remaining_whole_seconds();
        format!("{}:{:02}", remaining / 60, remaining % 60)
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
