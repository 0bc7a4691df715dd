//! In-memory relay server
//!
//! A minimal authoritative server for the sync protocol:
//! - `clientScene` merges unknown items into the shared scene
//! - `objAdded` places an item and rebroadcasts the shared scene
//! - `updateVisibility` is recorded without a broadcast
//! - `ping` is answered with `pong`
//!
//! Outbound frames can be dropped at a configured rate to exercise clients
//! against a lossy link.

use std::collections::{BTreeMap, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use scenesync_core::{SyncError, SyncResult};
use scenesync_wire::{ItemSnapshot, ItemUpdate, SyncMessage};

/// Relay-assigned connection id
pub type ClientId = u32;

/// Relay configuration
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Echo `objAdded` back to the sender before broadcasting
    pub echo_placements: bool,
    /// Outbound frame loss rate (0.0 - 1.0)
    pub loss_rate: f64,
    /// RNG seed for loss
    pub seed: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            echo_placements: true,
            loss_rate: 0.0,
            seed: 0x5eed,
        }
    }
}

impl RelayConfig {
    /// Drops roughly one outbound frame in `1 / loss_rate`
    pub fn lossy(loss_rate: f64, seed: u64) -> Self {
        RelayConfig {
            loss_rate,
            seed,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub frames_in: u64,
    pub frames_out: u64,
    pub frames_lost: u64,
    pub rejected: u64,
    pub pings: u64,
    pub client_scenes: u64,
    pub placements: u64,
}

/// Authoritative shared scene plus per-client outboxes
pub struct RelayServer {
    config: RelayConfig,
    scene: Vec<ItemSnapshot>,
    clients: BTreeMap<ClientId, VecDeque<String>>,
    next_id: ClientId,
    rng: StdRng,
    stats: RelayStats,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        RelayServer {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            scene: Vec::new(),
            clients: BTreeMap::new(),
            next_id: 1,
            stats: RelayStats::default(),
        }
    }

    /// Register a connection
    pub fn connect(&mut self) -> ClientId {
        let id = self.next_id;
        self.next_id += 1;
        self.clients.insert(id, VecDeque::new());
        tracing::debug!(client = id, "relay client joined");
        id
    }

    /// Forget a connection and its undelivered frames
    pub fn disconnect(&mut self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            tracing::debug!(client = id, "relay client left");
        }
    }

    pub fn is_connected(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn client_ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.clients.keys().copied()
    }

    pub fn shared_scene(&self) -> &[ItemSnapshot] {
        &self.scene
    }

    pub fn item(&self, name: &str) -> Option<&ItemSnapshot> {
        self.scene.iter().find(|item| item.name == name)
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Handle one frame from `from`
    pub fn receive(&mut self, from: ClientId, text: &str) -> SyncResult<()> {
        if !self.is_connected(from) {
            return Err(SyncError::NotConnected);
        }
        self.stats.frames_in += 1;

        let message = SyncMessage::decode(text).map_err(|e| {
            self.stats.rejected += 1;
            e
        })?;

        match message {
            SyncMessage::Ping => {
                self.stats.pings += 1;
                self.send_to(from, &SyncMessage::Pong)?;
            }
            SyncMessage::ClientScene { items } => {
                self.stats.client_scenes += 1;
                self.merge(items);
                let shared = self.shared_update();
                self.send_to(from, &shared)?;
            }
            SyncMessage::ObjAdded {
                name,
                pose,
                visible,
            } => {
                self.stats.placements += 1;
                match self.scene.iter_mut().find(|item| item.name == name) {
                    Some(item) => {
                        item.pose = pose;
                        item.visible = visible;
                    }
                    None => self.scene.push(ItemSnapshot::new(name.clone(), pose, visible)),
                }

                if self.config.echo_placements {
                    let echo = SyncMessage::ObjAdded {
                        name,
                        pose,
                        visible,
                    };
                    self.send_to(from, &echo)?;
                }
                let shared = self.shared_update();
                self.broadcast(&shared)?;
            }
            SyncMessage::UpdateVisibility { name, visible } => {
                match self.scene.iter_mut().find(|item| item.name == name) {
                    Some(item) => item.visible = visible,
                    None => tracing::debug!(name = %name, "visibility for unknown item"),
                }
            }
            other @ (SyncMessage::Pong | SyncMessage::UpdateScene { .. }) => {
                tracing::warn!(client = from, kind = other.kind(), "client sent client-bound message");
                self.stats.rejected += 1;
            }
            SyncMessage::Unknown { kind } => {
                tracing::warn!(client = from, kind = %kind, "unknown message type");
                self.stats.rejected += 1;
            }
        }
        Ok(())
    }

    /// Take the frames queued for `id`
    pub fn drain(&mut self, id: ClientId) -> Vec<String> {
        self.clients
            .get_mut(&id)
            .map(|outbox| outbox.drain(..).collect())
            .unwrap_or_default()
    }

    fn merge(&mut self, items: Vec<ItemSnapshot>) {
        for item in items {
            if self.item(&item.name).is_none() {
                self.scene.push(item);
            }
        }
    }

    fn shared_update(&self) -> SyncMessage {
        SyncMessage::UpdateScene {
            items: self.scene.iter().map(ItemUpdate::from).collect(),
        }
    }

    fn send_to(&mut self, id: ClientId, message: &SyncMessage) -> SyncResult<()> {
        let text = message.encode()?;
        self.push(id, text);
        Ok(())
    }

    fn broadcast(&mut self, message: &SyncMessage) -> SyncResult<()> {
        let text = message.encode()?;
        let ids: Vec<_> = self.clients.keys().copied().collect();
        for id in ids {
            self.push(id, text.clone());
        }
        Ok(())
    }

    fn push(&mut self, id: ClientId, text: String) {
        if self.config.loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.loss_rate {
            self.stats.frames_lost += 1;
            return;
        }
        if let Some(outbox) = self.clients.get_mut(&id) {
            outbox.push_back(text);
            self.stats.frames_out += 1;
        }
    }
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use scenesync_core::{Pose, Vec3};

    fn decode_all(frames: Vec<String>) -> Vec<SyncMessage> {
        frames
            .iter()
            .map(|text| SyncMessage::decode(text).unwrap())
            .collect()
    }

    fn client_scene(names: &[&str]) -> String {
        SyncMessage::ClientScene {
            items: names
                .iter()
                .map(|name| ItemSnapshot::new(*name, Pose::identity(), false))
                .collect(),
        }
        .encode()
        .unwrap()
    }

    #[test]
    fn test_client_scene_merges_and_replies() {
        let mut relay = RelayServer::default();
        let a = relay.connect();
        let b = relay.connect();

        relay.receive(a, &client_scene(&["chair", "lamp"])).unwrap();
        relay.receive(b, &client_scene(&["lamp", "sofa"])).unwrap();

        let names: Vec<_> = relay.shared_scene().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["chair", "lamp", "sofa"]);

        // each reply goes to the sender only
        assert_eq!(relay.drain(a).len(), 1);
        match decode_all(relay.drain(b)).as_slice() {
            [SyncMessage::UpdateScene { items }] => assert_eq!(items.len(), 3),
            other => panic!("unexpected frames: {other:?}"),
        }
    }

    #[test]
    fn test_placement_broadcasts() {
        let mut relay = RelayServer::default();
        let a = relay.connect();
        let b = relay.connect();
        relay.receive(a, &client_scene(&["chair"])).unwrap();
        relay.drain(a);

        let pose = Pose::at(Vec3::new(1.0, 0.0, 2.0));
        let placed = SyncMessage::ObjAdded {
            name: "chair".into(),
            pose,
            visible: true,
        };
        relay.receive(a, &placed.encode().unwrap()).unwrap();

        let to_a = decode_all(relay.drain(a));
        assert_eq!(to_a.len(), 2);
        assert_eq!(to_a[0], placed);

        match decode_all(relay.drain(b)).as_slice() {
            [SyncMessage::UpdateScene { items }] => {
                assert_eq!(items[0], ItemUpdate::named("chair").with_pose(pose).with_visible(true));
            }
            other => panic!("unexpected frames: {other:?}"),
        }
    }

    #[test]
    fn test_ping_pong_and_visibility() {
        let mut relay = RelayServer::default();
        let a = relay.connect();
        relay.receive(a, &client_scene(&["chair"])).unwrap();
        relay.drain(a);

        relay.receive(a, r#"{"type":"ping"}"#).unwrap();
        assert_eq!(decode_all(relay.drain(a)), vec![SyncMessage::Pong]);

        relay
            .receive(a, r#"{"type":"updateVisibility","name":"chair","visible":true}"#)
            .unwrap();
        assert!(relay.item("chair").unwrap().visible);
        assert!(relay.drain(a).is_empty());
    }

    #[test]
    fn test_rejects_bad_frames() {
        let mut relay = RelayServer::default();
        let a = relay.connect();

        assert!(relay.receive(a, "not json").is_err());
        relay.receive(a, r#"{"type":"teleport"}"#).unwrap();
        relay.receive(a, r#"{"type":"pong"}"#).unwrap();
        assert_eq!(relay.stats().rejected, 3);

        relay.disconnect(a);
        assert_eq!(relay.receive(a, r#"{"type":"ping"}"#), Err(SyncError::NotConnected));
    }

    #[test]
    fn test_loss_rate() {
        let mut relay = RelayServer::new(RelayConfig::lossy(0.5, 42));
        let a = relay.connect();
        for _ in 0..200 {
            relay.receive(a, r#"{"type":"ping"}"#).unwrap();
        }

        let stats = relay.stats().clone();
        assert_eq!(stats.frames_out + stats.frames_lost, 200);
        assert!(stats.frames_lost > 50 && stats.frames_lost < 150);
        assert_eq!(relay.drain(a).len() as u64, stats.frames_out);
    }

    proptest! {
        #[test]
        fn prop_receive_never_creates_clients(text in ".{0,128}") {
            let mut relay = RelayServer::default();
            let a = relay.connect();
            let _ = relay.receive(a, &text);
            prop_assert_eq!(relay.client_ids().count(), 1);
            prop_assert_eq!(relay.stats().frames_in, 1);
        }
    }
}
