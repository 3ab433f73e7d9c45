//! Connection lifecycle controller for the call-center channel.
//!
//! A single driver task owns the channel handle, the heartbeat interval and
//! the reconnect timer. Everything else talks to it through a [`LinkHandle`].
//! Because only the driver touches those resources, clearing them during
//! `disconnect` guarantees no stale timer can fire against a dead channel.

use crate::messages::{self, CodecError, EnvelopeKind, Heartbeat};
use crate::network::dispatcher::{DispatchOutcome, EventDispatcher, DEFAULT_SUBSCRIBER_CAPACITY};
use crate::network::heartbeat::{Beat, HeartbeatConfig, HeartbeatMonitor};
use crate::network::reconnect::{Backoff, ReconnectConfig, ReconnectPolicy};
use crate::network::transport::{self, Channel, Connector, TransportError};
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep, timeout, Sleep};
use tracing::{debug, info, instrument, trace, warn};

/// Upper bound on the close handshake during `disconnect`
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

const LINK_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Lifecycle notifications, separate from the call-center event stream
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    ReconnectScheduled {
        attempt: u32,
        delay: Duration,
    },
    HeartbeatSent {
        timestamp: u64,
    },
    /// A ping went unanswered past the response timeout
    HeartbeatTimedOut {
        unanswered_for: Duration,
    },
    /// Retries are exhausted; the link stays down until `connect` is called
    ConnectionLost {
        attempts: u32,
    },
}

/// Counters kept by the driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub connections_opened: u64,
    pub frames_received: u64,
    pub malformed_frames: u64,
    pub unrouted_frames: u64,
    pub events_published: u64,
    pub heartbeats_sent: u64,
    pub reconnects_scheduled: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    /// Current value of the reconnect attempt counter
    pub reconnect_attempts: u32,
}

/// Result of [`LinkHandle::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the transport
    Sent,
    /// Not transmitted because the link was not connected
    Dropped,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Link driver has stopped")]
    Stopped,

    #[error("Invalid link configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub heartbeat: HeartbeatConfig,
    pub reconnect: ReconnectConfig,
    /// Buffer per event subscriber
    pub subscriber_capacity: usize,
    /// An open still pending after this counts as a failed attempt
    pub open_timeout: Duration,
    /// A write still pending after this drops the channel
    pub write_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl LinkConfig {
    /// Reject settings the driver cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Err(LinkError::InvalidConfig(reason.to_string()));

        if self.heartbeat.interval.is_zero() {
            return invalid("heartbeat interval must be greater than zero");
        }
        if self.heartbeat.response_timeout == Some(Duration::ZERO) {
            return invalid("heartbeat response timeout must be greater than zero");
        }
        if self.subscriber_capacity == 0 {
            return invalid("subscriber capacity must be greater than zero");
        }
        if self.open_timeout.is_zero() || self.write_timeout.is_zero() {
            return invalid("open and write timeouts must be greater than zero");
        }
        if let Backoff::Exponential {
            initial,
            max,
            multiplier,
            ..
        } = self.reconnect.backoff
        {
            if !(multiplier.is_finite() && multiplier >= 1.0) {
                return invalid("backoff multiplier must be a finite number >= 1.0");
            }
            if max < initial {
                return invalid("backoff max delay must not be below the initial delay");
            }
        }
        Ok(())
    }
}

enum Command {
    Connect,
    Disconnect(oneshot::Sender<()>),
    Send(String, oneshot::Sender<Delivery>),
}

/// Cloneable handle on a running link.
///
/// Dropping the last handle shuts the driver down the same way `disconnect`
/// does.
#[derive(Clone)]
pub struct LinkHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    stats: watch::Receiver<LinkStats>,
    events: broadcast::Sender<LinkEvent>,
    dispatcher: EventDispatcher,
}

impl LinkHandle {
    /// Spawn a link driver on the current tokio runtime. The link starts
    /// `Disconnected`; call [`connect`](Self::connect) to open it.
    pub fn spawn<C: Connector>(connector: C, config: LinkConfig) -> Result<Self> {
        config.validate()?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (stats_tx, stats_rx) = watch::channel(LinkStats::default());
        let (events_tx, _) = broadcast::channel(LINK_EVENT_CAPACITY);
        let dispatcher = EventDispatcher::with_capacity(config.subscriber_capacity);

        let driver = LinkDriver {
            connector,
            policy: ReconnectPolicy::new(config.reconnect),
            heartbeat: HeartbeatMonitor::new(config.heartbeat),
            dispatcher: dispatcher.clone(),
            channel: None,
            pending_open: None,
            reconnect_timer: None,
            open_timeout: config.open_timeout,
            write_timeout: config.write_timeout,
            stopped: true,
            state: state_tx,
            stats: stats_tx,
            events: events_tx.clone(),
        };
        tokio::spawn(driver.run(commands_rx));

        Ok(Self {
            commands: commands_tx,
            state: state_rx,
            stats: stats_rx,
            events: events_tx,
            dispatcher,
        })
    }

    /// Request a connection. Returns immediately; watch the state for the
    /// outcome. No-op while connecting or connected.
    pub fn connect(&self) -> Result<()> {
        self.commands
            .send(Command::Connect)
            .map_err(|_| LinkError::Stopped)
    }

    /// Stop the link and suppress automatic reconnects. When this returns, the
    /// heartbeat and reconnect timers are cleared and the channel is released.
    pub async fn disconnect(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(Command::Disconnect(ack_tx))
            .map_err(|_| LinkError::Stopped)?;
        ack_rx.await.map_err(|_| LinkError::Stopped)
    }

    /// Encode and transmit `payload` as-is. Not connected yields
    /// `Delivery::Dropped`.
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Delivery> {
        let text = messages::encode(payload)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Send(text, reply_tx))
            .map_err(|_| LinkError::Stopped)?;
        reply_rx.await.map_err(|_| LinkError::Stopped)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the link reaches `target`
    pub async fn wait_for(&self, target: ConnectionState) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| LinkError::Stopped)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> LinkStats {
        *self.stats.borrow()
    }

    /// Typed subscriptions for inbound call-center events
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }
}

impl fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

struct LinkDriver<C> {
    connector: C,
    policy: ReconnectPolicy,
    heartbeat: HeartbeatMonitor,
    dispatcher: EventDispatcher,
    channel: Option<Channel>,
    pending_open: Option<BoxFuture<'static, transport::Result<Channel>>>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    open_timeout: Duration,
    write_timeout: Duration,
    /// Set by `disconnect`; suppresses automatic reconnects
    stopped: bool,
    state: watch::Sender<ConnectionState>,
    stats: watch::Sender<LinkStats>,
    events: broadcast::Sender<LinkEvent>,
}

impl<C: Connector> LinkDriver<C> {
    #[instrument(name = "call_center_link", skip_all)]
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!(target = %self.connector.target(), "Link driver started");

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All link handles dropped, shutting down");
                        self.teardown().await;
                        break;
                    }
                },
                opened = pending_open(&mut self.pending_open) => {
                    self.pending_open = None;
                    self.on_open_result(opened);
                }
                frame = next_frame(&mut self.channel) => self.on_frame(frame),
                beat = self.heartbeat.tick() => self.on_beat(beat).await,
                () = reconnect_due(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    self.begin_connect();
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.on_connect_requested(),
            Command::Disconnect(ack) => {
                self.teardown().await;
                let _ = ack.send(());
            }
            Command::Send(text, reply) => {
                let delivery = self.transmit(text).await;
                let _ = reply.send(delivery);
            }
        }
    }

    fn on_connect_requested(&mut self) {
        match self.current_state() {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!(state = %self.current_state(), "Connect ignored");
            }
            ConnectionState::Reconnecting => {
                debug!("Connect requested while waiting to retry, retrying now");
                self.reconnect_timer = None;
                self.begin_connect();
            }
            ConnectionState::Disconnected => {
                self.stopped = false;
                self.policy.reset();
                self.update_stats(|s| s.reconnect_attempts = 0);
                self.begin_connect();
            }
        }
    }

    fn begin_connect(&mut self) {
        self.set_state(ConnectionState::Connecting);
        info!(
            target = %self.connector.target(),
            attempt = self.policy.attempts(),
            "Opening call-center channel"
        );
        let open = self.connector.open();
        let limit = self.open_timeout;
        self.pending_open = Some(
            async move {
                match timeout(limit, open).await {
                    Ok(opened) => opened,
                    Err(_) => Err(TransportError::TimedOut {
                        operation: "open",
                        after: limit,
                    }),
                }
            }
            .boxed(),
        );
    }

    fn on_open_result(&mut self, result: transport::Result<Channel>) {
        match result {
            Ok(channel) => {
                self.channel = Some(channel);
                self.set_state(ConnectionState::Connected);
                self.policy.reset();
                self.heartbeat.start();
                self.update_stats(|s| {
                    s.connections_opened += 1;
                    s.reconnect_attempts = 0;
                });
                info!(target = %self.connector.target(), "Call-center channel connected");
            }
            Err(e) => {
                warn!(error = %e, attempt = self.policy.attempts(), "Failed to open channel");
                self.schedule_reconnect();
            }
        }
    }

    fn on_frame(&mut self, frame: Option<transport::Result<String>>) {
        match frame {
            Some(Ok(text)) => self.on_text(&text),
            Some(Err(e)) => {
                // The close that usually follows is what drives reconnection
                warn!(error = %e, "Transport error on call-center channel");
            }
            None => {
                info!("Call-center channel closed");
                self.on_channel_lost();
            }
        }
    }

    fn on_text(&mut self, text: &str) {
        self.update_stats(|s| s.frames_received += 1);

        let envelope = match messages::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, frame_len = text.len(), "Dropping malformed frame");
                self.update_stats(|s| s.malformed_frames += 1);
                return;
            }
        };

        if envelope.kind() == Some(EnvelopeKind::HeartbeatResponse) {
            self.heartbeat.response_received();
        }

        match self.dispatcher.dispatch(&envelope) {
            DispatchOutcome::Published(kind) => {
                trace!(kind = %kind, "Event dispatched");
                self.update_stats(|s| s.events_published += 1);
            }
            DispatchOutcome::Discarded(_) => {}
            DispatchOutcome::Unrouted(_) => self.update_stats(|s| s.unrouted_frames += 1),
        }
    }

    async fn on_beat(&mut self, beat: Beat) {
        match beat {
            Beat::Ping => {
                let heartbeat = Heartbeat::now();
                let text = match messages::encode(&heartbeat) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode heartbeat");
                        return;
                    }
                };
                match self.write_frame(text).await {
                    Ok(()) => {
                        trace!(timestamp = heartbeat.timestamp, "Heartbeat sent");
                        self.heartbeat.ping_sent();
                        self.update_stats(|s| s.heartbeats_sent += 1);
                        self.emit(LinkEvent::HeartbeatSent {
                            timestamp: heartbeat.timestamp,
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to send heartbeat"),
                }
            }
            Beat::Expired { unanswered_for } => {
                warn!(
                    unanswered_ms = unanswered_for.as_millis() as u64,
                    "Heartbeat unanswered, treating channel as dead"
                );
                self.emit(LinkEvent::HeartbeatTimedOut { unanswered_for });
                self.channel = None;
                self.on_channel_lost();
            }
        }
    }

    async fn transmit(&mut self, text: String) -> Delivery {
        let state = self.current_state();
        if state != ConnectionState::Connected {
            debug!(state = %state, "Not connected, dropping outbound message");
            self.update_stats(|s| s.messages_dropped += 1);
            return Delivery::Dropped;
        }

        match self.write_frame(text).await {
            Ok(()) => {
                self.update_stats(|s| s.messages_sent += 1);
                Delivery::Sent
            }
            Err(e) => {
                warn!(error = %e, "Failed to write outbound message");
                self.update_stats(|s| s.messages_dropped += 1);
                Delivery::Dropped
            }
        }
    }

    /// Write one frame within the write timeout. A write that stalls past it
    /// means the peer stopped reading, so the channel is dropped.
    async fn write_frame(&mut self, text: String) -> transport::Result<()> {
        let limit = self.write_timeout;
        let Some(channel) = self.channel.as_mut() else {
            return Err(TransportError::Closed);
        };

        let written = timeout(limit, channel.outbound.send(text)).await;
        match written {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_ms = limit.as_millis() as u64,
                    "Write stalled, treating channel as dead"
                );
                self.on_channel_lost();
                Err(TransportError::TimedOut {
                    operation: "write",
                    after: limit,
                })
            }
        }
    }

    /// Close or failed open: stop the heartbeat and consult the policy
    fn on_channel_lost(&mut self) {
        self.channel = None;
        self.heartbeat.stop();
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.stopped {
            self.set_state(ConnectionState::Disconnected);
            return;
        }

        match self.policy.schedule_retry() {
            Some((attempt, delay)) => {
                self.set_state(ConnectionState::Reconnecting);
                self.reconnect_timer = Some(Box::pin(sleep(delay)));
                info!(
                    attempt = attempt,
                    max_attempts = self.policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect scheduled"
                );
                self.update_stats(|s| {
                    s.reconnects_scheduled += 1;
                    s.reconnect_attempts = attempt;
                });
                self.emit(LinkEvent::ReconnectScheduled { attempt, delay });
            }
            None => {
                let attempts = self.policy.attempts();
                warn!(attempts = attempts, "Reconnect attempts exhausted, connection lost");
                self.set_state(ConnectionState::Disconnected);
                self.emit(LinkEvent::ConnectionLost { attempts });
            }
        }
    }

    /// Cancel everything this link owns and settle in `Disconnected`
    async fn teardown(&mut self) {
        self.stopped = true;
        self.heartbeat.stop();
        self.reconnect_timer = None;
        self.pending_open = None;
        let channel = self.channel.take();
        self.set_state(ConnectionState::Disconnected);

        if let Some(mut channel) = channel {
            match timeout(CLOSE_TIMEOUT, channel.outbound.close()).await {
                Ok(Ok(())) => debug!("Channel closed cleanly"),
                Ok(Err(e)) => debug!(error = %e, "Error while closing channel"),
                Err(_) => debug!("Close handshake timed out"),
            }
        }
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&mut self, to: ConnectionState) {
        let from = self.state.send_replace(to);
        if from != to {
            debug!(from = %from, to = %to, "Connection state changed");
            self.emit(LinkEvent::StateChanged { from, to });
        }
    }

    fn emit(&self, event: LinkEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn update_stats(&self, f: impl FnOnce(&mut LinkStats)) {
        self.stats.send_modify(f);
    }
}

async fn pending_open(
    pending: &mut Option<BoxFuture<'static, transport::Result<Channel>>>,
) -> transport::Result<Channel> {
    match pending.as_mut() {
        Some(open) => open.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(channel: &mut Option<Channel>) -> Option<transport::Result<String>> {
    match channel.as_mut() {
        Some(channel) => channel.inbound.next().await,
        None => std::future::pending().await,
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(delay) => delay.as_mut().await,
        None => std::future::pending().await,
    }
}
