// ABOUTME: Restart rules for the gateway connection loop.
// ABOUTME: Classifies connection errors and numbers restarts; exponential pacing is opt-in.

use super::GatewayError;
use parley_core::config::RestartConfig;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RestartPolicy {
    /// Delay before the first restart of a failure streak
    pub initial_delay: Duration,
    /// Upper bound for the delay
    pub max_delay: Duration,
    /// Growth of the delay per consecutive failure
    pub multiplier: u32,
    /// Consecutive failures tolerated (0 = unlimited)
    pub max_restarts: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(60),
            multiplier: 2,
            max_restarts: 0,
        }
    }
}

/// Seconds from configuration; values too large for a `Duration` saturate.
fn secs(value: f64) -> Duration {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) => duration,
        Err(_) if value > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

impl From<&RestartConfig> for RestartPolicy {
    fn from(config: &RestartConfig) -> Self {
        Self {
            initial_delay: secs(config.initial_delay_secs),
            max_delay: secs(config.max_delay_secs),
            multiplier: config.multiplier,
            max_restarts: config.max_restarts,
        }
    }
}

impl RestartPolicy {
    /// Delay before restarting after the `streak`-th consecutive failure.
    fn delay(&self, streak: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(streak.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = f64::from(self.multiplier.max(1)).powi(exponent);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// What the worker does after a connection loop ended with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Fatal error: flush the log and stop.
    Stop,
    /// Reconnect after `delay`. `restart` counts every restart of this worker.
    Restart { restart: u32, delay: Duration },
    /// The consecutive failure limit was exceeded.
    GiveUp { failures: u32 },
}

/// Restart bookkeeping for one gateway worker.
#[derive(Debug)]
pub struct RestartState {
    policy: RestartPolicy,
    restarts: u32,
    streak: u32,
}

impl RestartState {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            restarts: 0,
            streak: 0,
        }
    }

    /// Number of the connection attempt in progress, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.restarts.saturating_add(1)
    }

    /// The connection came up; the failure streak ends.
    pub fn connected(&mut self) {
        self.streak = 0;
    }

    pub fn on_error(&mut self, err: &GatewayError) -> Verdict {
        if err.is_fatal() {
            return Verdict::Stop;
        }
        self.streak = self.streak.saturating_add(1);
        if self.policy.max_restarts > 0 && self.streak > self.policy.max_restarts {
            return Verdict::GiveUp {
                failures: self.streak,
            };
        }
        self.restarts = self.restarts.saturating_add(1);
        Verdict::Restart {
            restart: self.restarts,
            delay: self.policy.delay(self.streak),
        }
    }
}
