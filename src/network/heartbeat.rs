use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Time between pings while connected
    pub interval: Duration,
    /// How long a ping may go unanswered before the channel is treated as
    /// half-open. `None` never checks for a response.
    pub response_timeout: Option<Duration>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            response_timeout: None,
        }
    }
}

/// What the link driver should do when the heartbeat fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    /// Send a ping
    Ping,
    /// The previous ping was never answered within the response timeout
    Expired { unanswered_for: Duration },
}

/// Periodic liveness pings for an open channel.
///
/// Owns at most one interval. The first ping fires one full interval after
/// [`start`](Self::start), matching a plain repeating timer.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    interval: Option<Interval>,
    awaiting_response_since: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            interval: None,
            awaiting_response_since: None,
        }
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    /// Start (or restart) the ping interval
    pub fn start(&mut self) {
        let period = self.config.interval;
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self.awaiting_response_since = None;
        debug!(interval_ms = period.as_millis() as u64, "Heartbeat started");
    }

    /// Cancel the interval. Safe to call when not running.
    pub fn stop(&mut self) {
        if self.interval.take().is_some() {
            debug!("Heartbeat stopped");
        }
        self.awaiting_response_since = None;
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next beat. Pends forever while stopped.
    pub async fn tick(&mut self) -> Beat {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
                self.classify(Instant::now())
            }
            None => std::future::pending().await,
        }
    }

    fn classify(&mut self, now: Instant) -> Beat {
        if let (Some(timeout), Some(since)) =
            (self.config.response_timeout, self.awaiting_response_since)
        {
            let unanswered_for = now.saturating_duration_since(since);
            if unanswered_for >= timeout {
                return Beat::Expired { unanswered_for };
            }
        }
        Beat::Ping
    }

    /// Record that a ping went out
    pub fn ping_sent(&mut self) {
        if self.awaiting_response_since.is_none() {
            self.awaiting_response_since = Some(Instant::now());
        }
    }

    /// Record a `heartbeat.response` from the server
    pub fn response_received(&mut self) {
        self.awaiting_response_since = None;
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response_since.is_some()
    }
}
