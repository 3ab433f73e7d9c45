use rand::Rng;
use std::time::Duration;

pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3_000);

/// Delay schedule between reconnect attempts
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay for every attempt
    Fixed(Duration),
    /// `initial * multiplier^(attempt - 1)`, capped at `max`.
    /// With `jitter` the delay is drawn uniformly from `[delay / 2, delay]`.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl Backoff {
    /// Upper bound of the delay before attempt number `attempt` (1-based)
    pub fn base_delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
                ..
            } => {
                let exponent = attempt.saturating_sub(1).min(63) as i32;
                let scaled = initial.as_secs_f64() * multiplier.powi(exponent);
                if !scaled.is_finite() || scaled >= max.as_secs_f64() {
                    *max
                } else {
                    Duration::from_secs_f64(scaled)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            backoff: Backoff::default(),
        }
    }
}

/// Decides whether and when to re-open the channel after a close.
///
/// Holds the attempt counter: zeroed once a channel is connected, bumped for
/// every scheduled retry.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.config.max_attempts
    }

    /// Delay to wait before attempt number `attempt_count` (1-based)
    pub fn next_delay(&self, attempt_count: u32) -> Duration {
        let delay = self.config.backoff.base_delay(attempt_count);
        match &self.config.backoff {
            Backoff::Exponential { jitter: true, .. } if !delay.is_zero() => {
                let half = delay / 2;
                rand::thread_rng().gen_range(half..=delay)
            }
            _ => delay,
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn exhausted(&self) -> bool {
        !self.should_retry(self.attempts)
    }

    /// Account for a close or failed open.
    ///
    /// Returns the attempt number and delay of the retry to schedule, or
    /// `None` once retries are exhausted.
    pub fn schedule_retry(&mut self) -> Option<(u32, Duration)> {
        if !self.should_retry(self.attempts) {
            return None;
        }
        self.attempts += 1;
        Some((self.attempts, self.next_delay(self.attempts)))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}
