/*!
 # Auto schedule

 The hour window that drives the light while auto mode is on, the clock it
 is evaluated against, and the ticker that re-evaluates it periodically.
*/

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use chrono::Timelike;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// An auto-on window expressed in whole hours of the local day
///
/// The light is on from `start_hour` (inclusive) to `end_hour` (exclusive).
/// When `start_hour > end_hour` the window spans midnight. Equal bounds give
/// an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSchedule {
    /// Hour at which the light turns on (0-23)
    pub start_hour: u8,
    /// Hour at which the light turns off (0-23)
    pub end_hour: u8,
}

impl AutoSchedule {
    pub fn new(start_hour: u8, end_hour: u8) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    /// Whether the window crosses midnight
    pub fn wraps_midnight(&self) -> bool {
        self.start_hour > self.end_hour
    }

    /// Whether the light should be on at `hour`
    pub fn is_active_at(&self, hour: u8) -> bool {
        if self.wraps_midnight() {
            hour >= self.start_hour || hour < self.end_hour
        } else {
            hour >= self.start_hour && hour < self.end_hour
        }
    }
}

impl fmt::Display for AutoSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h -> {}h", self.start_hour, self.end_hour)
    }
}

/// Source of the current local hour
pub trait Clock: Send + Sync {
    /// Current hour of the local day (0-23)
    fn current_hour(&self) -> u8;
}

/// Wall clock in the local timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_hour(&self) -> u8 {
        chrono::Local::now().hour() as u8
    }
}

/// A clock that reports whatever hour it was last set to
#[derive(Debug, Default)]
pub struct FixedClock {
    hour: AtomicU8,
}

impl FixedClock {
    pub fn new(hour: u8) -> Self {
        Self {
            hour: AtomicU8::new(hour),
        }
    }

    pub fn set_hour(&self, hour: u8) {
        self.hour.store(hour, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn current_hour(&self) -> u8 {
        self.hour.load(Ordering::Relaxed)
    }
}

/// Handle to a background task that fires a callback at a fixed period
///
/// The first tick fires one period after the start. The callback returns
/// `false` to end the task. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct ScheduleTicker {
    handle: JoinHandle<()>,
}

impl ScheduleTicker {
    /// Spawns the ticker on the current tokio runtime
    pub fn start<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        debug!("Starting schedule ticker every {:?}", period);
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                trace!("Schedule tick");
                if !on_tick() {
                    debug!("Schedule ticker owner gone, exiting");
                    break;
                }
            }
        });

        Self { handle }
    }

    /// Whether the background task has ended
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the background task
    pub fn stop(self) {
        // Drop does the abort
        debug!("Stopping schedule ticker");
    }
}

impl Drop for ScheduleTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
