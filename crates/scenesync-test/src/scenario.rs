//! Scenario harness
//!
//! Runs several [`SceneContext`] clients against one [`RelayServer`] on a
//! shared logical clock. Frames are delivered synchronously: after every
//! step the harness pumps client outboxes into the relay and relay outboxes
//! back into the clients until nothing is left in flight.

use std::time::Duration;

use scenesync_core::{Pose, SyncError, SyncResult};
use scenesync_runtime::{ClientConfig, Placement, SceneContext};
use scenesync_state::{FadeNotice, LayoutEntry, ReconciliationResult};

use crate::{ClientId, RelayConfig, RelayServer};

/// Upper bound on pump rounds per step
const MAX_PUMP_ROUNDS: usize = 16;

/// One client under test
pub struct ScenarioClient {
    context: SceneContext,
    link: Option<ClientId>,
    notices: Vec<FadeNotice>,
    reconciled: Vec<ReconciliationResult>,
}

impl ScenarioClient {
    pub fn context(&self) -> &SceneContext {
        &self.context
    }

    pub fn is_linked(&self) -> bool {
        self.link.is_some()
    }

    /// Fade notices seen so far
    pub fn notices(&self) -> &[FadeNotice] {
        &self.notices
    }

    /// Tallies of every `updateScene` applied
    pub fn reconciled(&self) -> &[ReconciliationResult] {
        &self.reconciled
    }
}

/// Scenario harness
pub struct Scenario {
    relay: RelayServer,
    clients: Vec<ScenarioClient>,
    config: ClientConfig,
    tick: Duration,
    elapsed: Duration,
}

impl Scenario {
    pub fn new(relay: RelayConfig) -> Self {
        Self::with_client_config(relay, ClientConfig::default())
    }

    pub fn with_client_config(relay: RelayConfig, config: ClientConfig) -> Self {
        Scenario {
            relay: RelayServer::new(relay),
            clients: Vec::new(),
            tick: config.fade.tick,
            config,
            elapsed: Duration::ZERO,
        }
    }

    /// Add an unconnected client and return its index
    pub fn add_client(&mut self, layout: &[LayoutEntry]) -> SyncResult<usize> {
        let context = SceneContext::new(layout.iter().cloned(), &self.config)?;
        self.clients.push(ScenarioClient {
            context,
            link: None,
            notices: Vec::new(),
            reconciled: Vec::new(),
        });
        Ok(self.clients.len() - 1)
    }

    pub fn relay(&self) -> &RelayServer {
        &self.relay
    }

    pub fn client(&self, idx: usize) -> &ScenarioClient {
        &self.clients[idx]
    }

    pub fn context(&self, idx: usize) -> &SceneContext {
        &self.clients[idx].context
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Open a link for client `idx`
    pub fn connect(&mut self, idx: usize) -> SyncResult<()> {
        self.client_mut(idx)?;
        let id = self.relay.connect();
        let client = &mut self.clients[idx];
        client.context.begin_connect();
        client.context.on_open()?;
        client.link = Some(id);
        self.pump();
        Ok(())
    }

    /// Close client `idx` cleanly
    pub fn disconnect(&mut self, idx: usize) -> SyncResult<()> {
        let client = self.client_mut(idx)?;
        client.context.begin_close();
        client.context.on_closed();
        if let Some(id) = client.link.take() {
            self.relay.disconnect(id);
        }
        Ok(())
    }

    /// Drop client `idx`'s link as a transport failure
    pub fn drop_link(&mut self, idx: usize) -> SyncResult<()> {
        let client = self.client_mut(idx)?;
        client.context.on_transport_error(&SyncError::ConnectionLost);
        if let Some(id) = client.link.take() {
            self.relay.disconnect(id);
        }
        Ok(())
    }

    pub fn place(&mut self, idx: usize, pose: Pose) -> SyncResult<Placement> {
        let placement = self.client_mut(idx)?.context.place(pose)?;
        self.pump();
        Ok(placement)
    }

    pub fn place_named(&mut self, idx: usize, name: &str, pose: Pose) -> SyncResult<Placement> {
        let placement = self.client_mut(idx)?.context.place_named(name, pose)?;
        self.pump();
        Ok(placement)
    }

    /// Hand client `idx` a frame as if the relay had sent it
    pub fn deliver(&mut self, idx: usize, frame: &str) -> Option<ReconciliationResult> {
        let client = self.clients.get_mut(idx)?;
        let result = client.context.on_text(frame);
        if let Some(result) = &result {
            client.reconciled.push(result.clone());
        }
        self.pump();
        result
    }

    /// Advance every client by one tick and deliver traffic
    pub fn step(&mut self) {
        for client in &mut self.clients {
            let notices = client.context.advance(self.tick);
            client.notices.extend(notices);
        }
        self.elapsed += self.tick;
        self.pump();
    }

    /// Step until at least `duration` has passed
    pub fn run_for(&mut self, duration: Duration) {
        let target = self.elapsed + duration;
        while self.elapsed < target {
            self.step();
        }
    }

    /// Deliver frames until the link is quiet
    pub fn pump(&mut self) {
        for _ in 0..MAX_PUMP_ROUNDS {
            let mut moved = false;

            for client in &mut self.clients {
                let Some(id) = client.link else { continue };
                while let Some(frame) = client.context.pop_outgoing() {
                    moved = true;
                    if let Err(e) = self.relay.receive(id, &frame) {
                        tracing::warn!(client = id, error = %e, "relay rejected frame");
                    }
                }
            }

            for client in &mut self.clients {
                let Some(id) = client.link else { continue };
                for frame in self.relay.drain(id) {
                    moved = true;
                    if let Some(result) = client.context.on_text(&frame) {
                        client.reconciled.push(result);
                    }
                }
            }

            if !moved {
                return;
            }
        }
        tracing::warn!("traffic still in flight after pump limit");
    }

    fn client_mut(&mut self, idx: usize) -> SyncResult<&mut ScenarioClient> {
        self.clients
            .get_mut(idx)
            .ok_or_else(|| SyncError::InvalidConfig(format!("no client at index {idx}")))
    }
}
