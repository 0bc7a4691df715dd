//! Connection session - lifecycle, heartbeat, and inbound routing
//!
//! The session does no I/O. Outgoing text frames are queued and drained by
//! the driver with [`ConnectionSession::pop_outgoing`]; the driver reports
//! transport events back through `on_open`, `on_text`, `on_closed` and
//! `on_transport_error`.

use std::collections::VecDeque;
use std::time::Duration;

use scenesync_core::{SceneTime, SyncError, SyncResult};
use scenesync_wire::{ItemSnapshot, ItemUpdate, SyncMessage};

use crate::Heartbeat;

/// Session configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Ping period while open
    pub heartbeat_interval: Duration,
    /// Maximum queued outgoing frames
    pub max_outgoing_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            heartbeat_interval: Duration::from_secs(20),
            max_outgoing_buffer: 256,
        }
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
    /// Dropped by a transport error
    Disconnected,
}

/// What an inbound frame asks of the caller
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Authoritative snapshot to reconcile
    Reconcile(Vec<ItemUpdate>),
    /// Logged, nothing else to do
    Handled,
    /// Malformed or unknown; logged and dropped
    Dropped,
}

#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    pub opens: u64,
    pub frames_in: u64,
    pub frames_out: u64,
    pub pings_sent: u64,
    pub pongs_received: u64,
    pub dropped_inbound: u64,
    pub discarded_outbound: u64,
}

/// Connection session
pub struct ConnectionSession {
    state: SessionState,
    config: SessionConfig,
    heartbeat: Heartbeat,
    outgoing: VecDeque<String>,
    last_pong: Option<SceneTime>,
    stats: SessionStats,
}

impl ConnectionSession {
    pub fn new(config: SessionConfig) -> Self {
        ConnectionSession {
            state: SessionState::Closed,
            heartbeat: Heartbeat::new(config.heartbeat_interval),
            config,
            outgoing: VecDeque::new(),
            last_pong: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Scene time the last pong arrived. Liveness is not enforced from it.
    pub fn last_pong(&self) -> Option<SceneTime> {
        self.last_pong
    }

    pub fn heartbeat_armed(&self) -> bool {
        self.heartbeat.is_armed()
    }

    /// A connection attempt has started
    pub fn begin_connect(&mut self) {
        if self.state == SessionState::Open {
            tracing::warn!("connect requested while open, ignoring");
            return;
        }
        self.transition(SessionState::Connecting);
    }

    /// The transport is open: send the scene snapshot once and start the
    /// heartbeat.
    pub fn on_open(&mut self, snapshot: Vec<ItemSnapshot>, now: SceneTime) -> SyncResult<()> {
        if self.state == SessionState::Open {
            tracing::warn!("duplicate open event, snapshot already sent");
            return Ok(());
        }

        self.transition(SessionState::Open);
        self.stats.opens += 1;
        tracing::info!(items = snapshot.len(), "connected, sending client scene");

        self.send(&SyncMessage::ClientScene { items: snapshot })?;
        self.heartbeat.arm(now);
        Ok(())
    }

    /// Queue a message. Fails fast with [`SyncError::NotConnected`] unless
    /// the session is open.
    pub fn send(&mut self, message: &SyncMessage) -> SyncResult<()> {
        if !self.is_open() {
            return Err(SyncError::NotConnected);
        }
        if self.outgoing.len() >= self.config.max_outgoing_buffer {
            return Err(SyncError::TransportError("outgoing buffer full".into()));
        }

        let text = message.encode()?;
        self.outgoing.push_back(text);
        self.stats.frames_out += 1;
        Ok(())
    }

    /// Run the heartbeat up to `now`
    pub fn advance(&mut self, now: SceneTime) {
        if !self.is_open() || !self.heartbeat.poll(now) {
            return;
        }
        match self.send(&SyncMessage::Ping) {
            Ok(()) => self.stats.pings_sent += 1,
            Err(e) => tracing::warn!(error = %e, "failed to queue ping"),
        }
    }

    /// Decode and route one inbound text frame
    pub fn on_text(&mut self, text: &str, now: SceneTime) -> Dispatch {
        self.stats.frames_in += 1;

        let message = match SyncMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "dropping inbound frame");
                self.stats.dropped_inbound += 1;
                return Dispatch::Dropped;
            }
        };

        match message {
            SyncMessage::Pong => {
                tracing::debug!("pong received");
                self.last_pong = Some(now);
                self.stats.pongs_received += 1;
                Dispatch::Handled
            }
            SyncMessage::ObjAdded { name, .. } => {
                tracing::debug!(name = %name, "objAdded acknowledged");
                Dispatch::Handled
            }
            SyncMessage::UpdateScene { items } => Dispatch::Reconcile(items),
            SyncMessage::Unknown { kind } => {
                tracing::warn!(kind = %kind, "unknown message type");
                self.stats.dropped_inbound += 1;
                Dispatch::Dropped
            }
            other => {
                tracing::debug!(kind = other.kind(), "ignoring client-bound message");
                Dispatch::Handled
            }
        }
    }

    /// Local side asked to close
    pub fn begin_close(&mut self) {
        match self.state {
            SessionState::Open | SessionState::Connecting => {
                self.transition(SessionState::Closing);
            }
            _ => {}
        }
    }

    /// The transport finished closing
    pub fn on_closed(&mut self) {
        tracing::info!("connection closed");
        self.transition(SessionState::Closed);
    }

    /// The transport failed
    pub fn on_transport_error(&mut self, error: &SyncError) {
        tracing::warn!(error = %error, "transport error, disconnecting");
        self.transition(SessionState::Disconnected);
    }

    /// Next frame to write
    pub fn pop_outgoing(&mut self) -> Option<String> {
        self.outgoing.pop_front()
    }

    fn transition(&mut self, next: SessionState) {
        let was_open = self.state == SessionState::Open;
        self.state = next;
        if next == SessionState::Open {
            return;
        }

        self.heartbeat.disarm();
        if was_open {
            let discarded = self.outgoing.len();
            self.outgoing.clear();
            if discarded > 0 {
                tracing::debug!(discarded, "discarding undelivered frames");
                self.stats.discarded_outbound += discarded as u64;
            }
        }
    }
}

impl Default for ConnectionSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
