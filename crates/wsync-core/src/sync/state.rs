//! Scheduler state machine
//!
//! Pure bookkeeping for the one-second tick: counts down to the next round,
//! decides when a round is forced, and backs off when forced rounds keep
//! finding nothing to send. Time does not appear here; the caller invokes
//! [`SchedulerState::tick`] once per second.

use serde::{Deserialize, Serialize};

use crate::session::Session;

/// Seconds between rounds for regular accounts
pub const DEFAULT_UPDATE_FREQUENCY_SECS: u32 = 25;
/// Seconds between rounds for teachers and admins
pub const ELEVATED_UPDATE_FREQUENCY_SECS: u32 = 5;
/// Rounds between forced rounds
pub const DEFAULT_FORCED_UPDATE_EVERY: u32 = 25;
/// Forced rounds in a row without changes before backing off
pub const FORCED_STREAK_LIMIT: u32 = 50;
/// Multiplier applied to the forced-round spacing while backed off
pub const FORCED_BACKOFF_FACTOR: u32 = 10;

/// Cadence settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    pub update_frequency_secs: u32,
    pub elevated_update_frequency_secs: u32,
    pub forced_update_every: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            update_frequency_secs: DEFAULT_UPDATE_FREQUENCY_SECS,
            elevated_update_frequency_secs: ELEVATED_UPDATE_FREQUENCY_SECS,
            forced_update_every: DEFAULT_FORCED_UPDATE_EVERY,
        }
    }
}

impl SchedulerSettings {
    /// Round period for the given session
    pub fn period_for(&self, session: &Session) -> u32 {
        if session.is_elevated() {
            self.elevated_update_frequency_secs
        } else {
            self.update_frequency_secs
        }
    }
}

/// What the scheduler should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    /// No session; nothing counted
    Idle,
    /// Still counting down
    Countdown { seconds_till_next_update: i64 },
    /// Run a round now
    Sync { forced: bool },
}

/// Counters driving the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerState {
    period: u32,
    forced_update_every: u32,
    seconds_till_next_update: i64,
    counter_till_forced_update: i64,
    forced_updates_in_a_row: u32,
}

impl SchedulerState {
    /// Fresh state for a round period in seconds
    pub fn new(period: u32, forced_update_every: u32) -> Self {
        let forced_update_every = forced_update_every.max(1);
        Self {
            period,
            forced_update_every,
            seconds_till_next_update: i64::from(period),
            counter_till_forced_update: i64::from(forced_update_every),
            forced_updates_in_a_row: 0,
        }
    }

    /// State for a session under the given settings
    pub fn for_session(settings: &SchedulerSettings, session: &Session) -> Self {
        Self::new(settings.period_for(session), settings.forced_update_every)
    }

    /// Advance by one second
    pub fn tick(&mut self, session_active: bool) -> TickDecision {
        if !session_active {
            return TickDecision::Idle;
        }

        self.seconds_till_next_update -= 1;
        if self.seconds_till_next_update >= 0 {
            return TickDecision::Countdown {
                seconds_till_next_update: self.seconds_till_next_update,
            };
        }

        self.seconds_till_next_update = i64::from(self.period);
        self.counter_till_forced_update -= 1;

        let forced = self.counter_till_forced_update <= 0;
        if forced {
            self.forced_updates_in_a_row += 1;
            self.counter_till_forced_update = i64::from(self.forced_update_every);
            if self.forced_updates_in_a_row > FORCED_STREAK_LIMIT {
                self.counter_till_forced_update *= i64::from(FORCED_BACKOFF_FACTOR);
            }
        }

        TickDecision::Sync { forced }
    }

    /// A round carried user changes: leave backoff
    pub fn record_real_change(&mut self) {
        self.forced_updates_in_a_row = 0;
        self.counter_till_forced_update = self
            .counter_till_forced_update
            .min(i64::from(self.forced_update_every));
    }

    /// Change the round period (e.g. after a role change)
    ///
    /// The running countdown is clamped to the new period.
    pub fn set_period(&mut self, period: u32) {
        self.period = period;
        self.seconds_till_next_update = self.seconds_till_next_update.min(i64::from(period));
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn seconds_till_next_update(&self) -> i64 {
        self.seconds_till_next_update
    }

    pub fn counter_till_forced_update(&self) -> i64 {
        self.counter_till_forced_update
    }

    pub fn forced_updates_in_a_row(&self) -> u32 {
        self.forced_updates_in_a_row
    }
}
