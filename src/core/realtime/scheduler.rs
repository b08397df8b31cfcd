//! Rollover timing.
//!
//! [`RolloverConfig::delay_until_rollover`] is the pure scheduling rule;
//! [`Deadline`] is the single cancellable timer slot the state machine
//! selects on. Arming a deadline replaces any pending one, so at most one
//! trigger is ever outstanding.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::{Instant, sleep_until};

/// Safety margin before credential expiry.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(15);

/// Minimum delay before any rollover.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(10);

/// Delay used when the expiry is unknown or a rollover failed.
pub const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_secs(90);

/// How long a candidate may take to connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Timing constants of the rollover state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloverConfig {
    pub safety_margin: Duration,
    pub min_delay: Duration,
    pub fallback_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for RolloverConfig {
    fn default() -> Self {
        Self {
            safety_margin: DEFAULT_SAFETY_MARGIN,
            min_delay: DEFAULT_MIN_DELAY,
            fallback_delay: DEFAULT_FALLBACK_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl RolloverConfig {
    /// Delay from `now_ms` until the next rollover should start.
    ///
    /// `expiry - margin`, floored at `min_delay`; `fallback_delay` when the
    /// expiry is unknown.
    pub fn delay_until_rollover(&self, expires_at_ms: Option<i64>, now_ms: i64) -> Duration {
        let delay = match expires_at_ms {
            Some(expires) => {
                let ms = expires
                    .saturating_sub(now_ms)
                    .saturating_sub(self.safety_margin.as_millis() as i64);
                Duration::from_millis(ms.max(0) as u64)
            }
            None => self.fallback_delay,
        };
        delay.max(self.min_delay)
    }
}

/// Convenience wrapper around [`RolloverConfig::delay_until_rollover`] with
/// the default timings.
pub fn rollover_delay(expires_at_ms: Option<i64>, now_ms: i64) -> Duration {
    RolloverConfig::default().delay_until_rollover(expires_at_ms, now_ms)
}

/// Wall-clock milliseconds since the epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// A single cancellable deadline.
#[derive(Debug, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `delay` from now, replacing any pending deadline.
    pub fn arm(&mut self, delay: Duration) -> Instant {
        let at = Instant::now() + delay;
        if self.at.replace(at).is_some() {
            tracing::debug!("Replacing pending deadline");
        }
        at
    }

    /// Disarm; returns whether a deadline was pending.
    pub fn cancel(&mut self) -> bool {
        self.at.take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    /// Time left until the deadline, if armed.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Resolves when the armed deadline passes, then disarms.
    ///
    /// Pends forever while unarmed. Cancel-safe: dropping the future leaves
    /// the deadline armed.
    pub async fn fired(&mut self) {
        match self.at {
            Some(at) => {
                sleep_until(at).await;
                self.at = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
