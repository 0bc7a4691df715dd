//! Relay served over WebSockets
//!
//! A hub task owns the [`RelayServer`]; one task per connection forwards
//! inbound text frames to the hub and writes whatever the hub routes back.

use std::collections::HashMap;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use scenesync_core::{SyncError, SyncResult};
use scenesync_wire::ItemSnapshot;

use crate::{ClientId, RelayConfig, RelayServer};

enum HubEvent {
    Joined {
        outbox: mpsc::UnboundedSender<String>,
        reply: oneshot::Sender<ClientId>,
    },
    Frame(ClientId, String),
    Left(ClientId),
    Scene(oneshot::Sender<Vec<ItemSnapshot>>),
}

/// Handle to a served relay
pub struct RelayHandle {
    addr: SocketAddr,
    events: mpsc::UnboundedSender<HubEvent>,
    accept: JoinHandle<()>,
}

impl RelayHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Current shared scene
    pub async fn scene(&self) -> SyncResult<Vec<ItemSnapshot>> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(HubEvent::Scene(reply))
            .map_err(|_| SyncError::ConnectionLost)?;
        response.await.map_err(|_| SyncError::ConnectionLost)
    }

    /// Stop accepting connections
    pub fn shutdown(self) {
        self.accept.abort();
    }
}

/// Serve a relay on an ephemeral localhost port
pub async fn serve_relay(config: RelayConfig) -> SyncResult<RelayHandle> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| SyncError::TransportError(e.to_string()))?;
    let addr = listener
        .local_addr()
        .map_err(|e| SyncError::TransportError(e.to_string()))?;

    let (events, inbox) = mpsc::unbounded_channel();
    tokio::spawn(hub(RelayServer::new(config), inbox));
    let accept = tokio::spawn(accept_loop(listener, events.clone()));

    tracing::info!(%addr, "relay listening");
    Ok(RelayHandle {
        addr,
        events,
        accept,
    })
}

async fn hub(mut relay: RelayServer, mut inbox: mpsc::UnboundedReceiver<HubEvent>) {
    let mut outboxes: HashMap<ClientId, mpsc::UnboundedSender<String>> = HashMap::new();

    while let Some(event) = inbox.recv().await {
        match event {
            HubEvent::Joined { outbox, reply } => {
                let id = relay.connect();
                outboxes.insert(id, outbox);
                let _ = reply.send(id);
            }
            HubEvent::Frame(id, text) => {
                match relay.receive(id, &text) {
                    Ok(()) => {}
                    Err(e) if e.is_protocol() => {
                        tracing::warn!(client = id, error = %e, "relay rejected frame");
                    }
                    Err(e) => tracing::debug!(client = id, error = %e, "frame from departed client"),
                }
                for (&id, outbox) in &outboxes {
                    for frame in relay.drain(id) {
                        let _ = outbox.send(frame);
                    }
                }
            }
            HubEvent::Left(id) => {
                relay.disconnect(id);
                outboxes.remove(&id);
            }
            HubEvent::Scene(reply) => {
                let _ = reply.send(relay.shared_scene().to_vec());
            }
        }
    }
}

async fn accept_loop(listener: TcpListener, events: mpsc::UnboundedSender<HubEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "relay accepted connection");
                tokio::spawn(serve_connection(stream, events.clone()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "relay accept failed");
                return;
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, events: mpsc::UnboundedSender<HubEvent>) {
    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::warn!(error = %e, "websocket handshake failed");
            return;
        }
    };
    let (mut sink, mut source) = socket.split();

    let (outbox, mut routed) = mpsc::unbounded_channel();
    let (reply, joined) = oneshot::channel();
    if events.send(HubEvent::Joined { outbox, reply }).is_err() {
        return;
    }
    let Ok(id) = joined.await else { return };

    loop {
        tokio::select! {
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if events.send(HubEvent::Frame(id, text)).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(client = id, error = %e, "relay connection error");
                    break;
                }
            },
            Some(frame) = routed.recv() => {
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = events.send(HubEvent::Left(id));
}
