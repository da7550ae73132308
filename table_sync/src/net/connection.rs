//! Connection lifecycle: backoff reconnects, heartbeats, and the outbound
//! queue.
//!
//! [`ConnectionManager`] performs no I/O. It consumes lifecycle inputs
//! (`on_open`, `on_closed`, `on_frame`, `on_timer`, ...) and emits
//! [`Command`]s for whoever owns the socket to execute. The async
//! [`ConnectionDriver`](super::driver::ConnectionDriver) is that owner in
//! production; tests drive the manager with plain millisecond timestamps.

use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt};

use super::{
    envelope::Envelope,
    errors::{CodecResult, ConnectionError, ConnectionResult},
    messages::{ClientMessage, ConnectionStatePayload, Heartbeat, MessageKind, ServerMessage},
    registry::{DispatchReport, EventRegistry, HandlerId},
};
use crate::{
    config::{ConnectionConfig, millis},
    scheduler::{Generation, Millis, Scheduler, TimerHandle},
};

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Retries are exhausted. Only an explicit `connect` leaves this state.
    PermanentlyDisconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::PermanentlyDisconnected => "permanently-disconnected",
        };
        write!(f, "{repr}")
    }
}

/// Work the socket owner must perform on behalf of the manager.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Open a new socket to the endpoint.
    Open { endpoint: String },
    /// Write one encoded frame to the open socket. If the write fails the
    /// frame must be handed back through
    /// [`ConnectionManager::on_transmit_failed`].
    Transmit(String),
    /// Close the current socket without reporting `on_closed`.
    Close,
}

/// What happened to a message passed to [`ConnectionManager::send`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    Sent,
    Queued,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ConnectionTimer {
    Reconnect { epoch: Generation },
    Heartbeat { epoch: Generation },
}

#[derive(Debug)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: ConnectionState,
    endpoint: Option<String>,
    attempt: u32,
    queue: VecDeque<String>,
    commands: VecDeque<Command>,
    registry: EventRegistry,
    timers: Scheduler<ConnectionTimer>,
    epoch: Generation,
    heartbeat: Option<TimerHandle>,
    ping_seq: u64,
    awaiting_pong: bool,
    missed_pongs: u32,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            endpoint: None,
            attempt: 0,
            queue: VecDeque::new(),
            commands: VecDeque::new(),
            registry: EventRegistry::new(),
            timers: Scheduler::new(),
            epoch: Generation::default(),
            heartbeat: None,
            ping_seq: 0,
            awaiting_pong: false,
            missed_pongs: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Reconnect attempts made in the current outage.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Number of frames waiting for a connection.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn on<F>(&mut self, kind: MessageKind, handler: F) -> HandlerId
    where
        F: FnMut(&Envelope<ServerMessage>) -> anyhow::Result<()> + Send + 'static,
    {
        self.registry.on(kind, handler)
    }

    pub fn off(&mut self, kind: MessageKind, handler: Option<HandlerId>) -> usize {
        self.registry.off(kind, handler)
    }

    /// Next command for the socket owner, if any.
    pub fn poll_command(&mut self) -> Option<Command> {
        self.commands.pop_front()
    }

    /// Earliest pending timer deadline.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    /// Start connecting to `endpoint`. A no-op while already connected or
    /// while a connection or reconnect attempt is in flight.
    pub fn connect(&mut self, endpoint: &str) {
        match self.state {
            ConnectionState::Connected
            | ConnectionState::Connecting
            | ConnectionState::Reconnecting => {
                debug!("connect({endpoint}) ignored while {}", self.state);
            }
            ConnectionState::Disconnected | ConnectionState::PermanentlyDisconnected => {
                self.endpoint = Some(endpoint.to_string());
                self.attempt = 0;
                self.reset_timers();
                self.transition(ConnectionState::Connecting);
                self.commands.push_back(Command::Open {
                    endpoint: endpoint.to_string(),
                });
            }
        }
    }

    /// The socket requested by the last [`Command::Open`] is open.
    pub fn on_open(&mut self, now: Millis) {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        ) {
            // Opened after an explicit disconnect; nobody wants it.
            debug!("Closing socket that opened while {}", self.state);
            self.commands.push_back(Command::Close);
            return;
        }

        self.attempt = 0;
        self.missed_pongs = 0;
        self.awaiting_pong = false;
        self.reset_timers();
        self.transition(ConnectionState::Connected);
        self.schedule_heartbeat(now);

        if !self.queue.is_empty() {
            info!("Flushing {} queued frames", self.queue.len());
        }
        while let Some(frame) = self.queue.pop_front() {
            self.commands.push_back(Command::Transmit(frame));
        }
    }

    /// The last [`Command::Open`] failed or timed out.
    pub fn on_open_failed(&mut self, now: Millis, reason: &str) {
        warn!("Connection attempt failed: {reason}");
        self.connection_lost(now);
    }

    /// The open socket closed without an explicit `disconnect`.
    pub fn on_closed(&mut self, now: Millis) {
        if self.state == ConnectionState::Connected {
            warn!("Connection closed unexpectedly");
        }
        self.connection_lost(now);
    }

    /// A [`Command::Transmit`] could not be written. The frame goes back to
    /// the front of the queue and the connection is treated as lost.
    pub fn on_transmit_failed(&mut self, now: Millis, frame: String) {
        self.queue.push_front(frame);
        if self.state == ConnectionState::Connected {
            self.connection_lost(now);
        }
    }

    /// Decode one inbound frame and dispatch it to registered handlers.
    /// Malformed frames are logged and dropped.
    pub fn on_frame(&mut self, frame: &str) -> CodecResult<DispatchReport> {
        let envelope = match Envelope::<ServerMessage>::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping inbound frame: {e}");
                return Err(e);
            }
        };

        if let ServerMessage::HeartbeatPong(pong) = envelope.message() {
            trace!("pong {}", pong.seq);
            self.awaiting_pong = false;
            self.missed_pongs = 0;
        }

        Ok(self.registry.dispatch(&envelope))
    }

    /// Send a message, or queue it until the next successful open.
    pub fn send(&mut self, message: ClientMessage) -> ConnectionResult<SendOutcome> {
        self.send_envelope(Envelope::new(message))
    }

    pub fn send_envelope(
        &mut self,
        envelope: Envelope<ClientMessage>,
    ) -> ConnectionResult<SendOutcome> {
        let frame = envelope.encode()?;

        if self.is_connected() {
            self.commands.push_back(Command::Transmit(frame));
            return Ok(SendOutcome::Sent);
        }

        if self.queue.len() >= self.config.outbound_queue_limit {
            return Err(ConnectionError::QueueFull {
                limit: self.config.outbound_queue_limit,
            });
        }

        debug!("Queueing {} while {}", envelope.kind(), self.state);
        self.queue.push_back(frame);
        Ok(SendOutcome::Queued)
    }

    /// Clean, caller-initiated close. Drops queued messages and pending
    /// timers; no reconnect follows.
    pub fn disconnect(&mut self) {
        let previous = self.state;
        self.reset_timers();
        self.attempt = 0;
        if !self.queue.is_empty() {
            info!("Discarding {} queued frames on disconnect", self.queue.len());
            self.queue.clear();
        }

        if matches!(
            previous,
            ConnectionState::Connected | ConnectionState::Connecting | ConnectionState::Reconnecting
        ) {
            self.commands.push_back(Command::Close);
        }
        if previous != ConnectionState::Disconnected {
            self.transition(ConnectionState::Disconnected);
        }
    }

    /// Fire every timer due at `now`.
    pub fn on_timer(&mut self, now: Millis) {
        while let Some((_, timer)) = self.timers.pop_due(now) {
            match timer {
                ConnectionTimer::Reconnect { epoch } => {
                    if epoch != self.epoch || self.state != ConnectionState::Reconnecting {
                        trace!("stale reconnect timer");
                        continue;
                    }
                    if let Some(endpoint) = self.endpoint.clone() {
                        info!("Reconnect attempt {} to {endpoint}", self.attempt);
                        self.commands.push_back(Command::Open { endpoint });
                    }
                }
                ConnectionTimer::Heartbeat { epoch } => {
                    if epoch != self.epoch || self.state != ConnectionState::Connected {
                        trace!("stale heartbeat timer");
                        continue;
                    }
                    self.heartbeat = None;
                    self.heartbeat_due(now);
                }
            }
        }
    }

    fn heartbeat_due(&mut self, now: Millis) {
        if self.awaiting_pong {
            self.missed_pongs += 1;
            debug!("Missed pong ({} in a row)", self.missed_pongs);
            if let Some(limit) = self.config.max_missed_pongs
                && self.missed_pongs >= limit
            {
                warn!("No pong for {} heartbeats, abandoning connection", self.missed_pongs);
                self.commands.push_back(Command::Close);
                self.connection_lost(now);
                return;
            }
        }

        self.ping_seq += 1;
        let ping = Envelope::new(ClientMessage::HeartbeatPing(Heartbeat { seq: self.ping_seq }));
        match ping.encode() {
            Ok(frame) => {
                self.commands.push_back(Command::Transmit(frame));
                self.awaiting_pong = true;
            }
            Err(e) => error!("Failed to encode heartbeat: {e}"),
        }
        self.schedule_heartbeat(now);
    }

    fn schedule_heartbeat(&mut self, now: Millis) {
        let delay = millis(self.config.heartbeat_interval);
        let handle = self.timers.schedule(
            now,
            delay,
            ConnectionTimer::Heartbeat { epoch: self.epoch },
        );
        self.heartbeat = Some(handle);
    }

    fn connection_lost(&mut self, now: Millis) {
        if matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::PermanentlyDisconnected
        ) {
            debug!("Ignoring connection loss while {}", self.state);
            return;
        }

        if let Some(handle) = self.heartbeat.take() {
            self.timers.cancel(handle);
        }
        self.reset_timers();
        self.reclaim_unsent();

        if self.attempt >= self.config.max_retries {
            error!(
                "Giving up after {} reconnect attempts ({} frames still queued)",
                self.attempt,
                self.queue.len()
            );
            self.transition(ConnectionState::PermanentlyDisconnected);
            return;
        }

        let delay = millis(self.config.backoff_delay(self.attempt));
        self.attempt += 1;
        info!("Reconnecting in {delay}ms (attempt {})", self.attempt);
        self.timers
            .schedule(now, delay, ConnectionTimer::Reconnect { epoch: self.epoch });
        self.transition(ConnectionState::Reconnecting);
    }

    /// Move transmits that never reached the socket back into the queue,
    /// behind any frame already handed back.
    fn reclaim_unsent(&mut self) {
        let pending = std::mem::take(&mut self.commands);
        let mut reclaimed = 0;
        for command in pending {
            match command {
                Command::Transmit(frame) => {
                    self.queue.push_back(frame);
                    reclaimed += 1;
                }
                other => self.commands.push_back(other),
            }
        }
        if reclaimed > 0 {
            debug!("Requeued {reclaimed} unsent frames");
        }
    }

    /// Invalidate every pending timer.
    fn reset_timers(&mut self) {
        self.epoch.bump();
        self.timers.clear();
        self.heartbeat = None;
    }

    fn transition(&mut self, state: ConnectionState) {
        if self.state != state {
            info!("Connection {} -> {}", self.state, state);
        }
        self.state = state;
        let event = Envelope::new(ServerMessage::ConnectionState(ConnectionStatePayload {
            state,
            attempt: self.attempt,
        }));
        self.registry.dispatch(&event);
    }
}
