//! Async client driver
//!
//! One task owns the [`SceneContext`] and the WebSocket link. It advances
//! the context on a fixed tick, feeds it inbound frames, writes whatever the
//! context queues, and reconnects with backoff when the link drops.
//! Placements reach it over an mpsc channel; render state leaves it through
//! a watch channel.

use std::future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use scenesync_core::{Pose, SyncError, SyncResult};
use scenesync_state::LayoutEntry;
use scenesync_transport::{ws, Backoff, LinkEvent, WsSink, WsSource};

use crate::{ClientConfig, Placement, RenderItem, SceneContext};

const COMMAND_BUFFER: usize = 32;

enum Command {
    Place {
        target: Option<String>,
        pose: Pose,
        reply: oneshot::Sender<SyncResult<Placement>>,
    },
    Shutdown,
}

/// Handle to a running client
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<Command>,
    scene: watch::Receiver<Vec<RenderItem>>,
}

impl ClientHandle {
    /// Place the next free item
    pub async fn place(&self, pose: Pose) -> SyncResult<Placement> {
        self.request(None, pose).await
    }

    /// Place a specific item
    pub async fn place_named(&self, name: impl Into<String>, pose: Pose) -> SyncResult<Placement> {
        self.request(Some(name.into()), pose).await
    }

    /// Render state, republished after every tick
    pub fn subscribe(&self) -> watch::Receiver<Vec<RenderItem>> {
        self.scene.clone()
    }

    /// Close the link and stop the driver
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| SyncError::ConnectionLost)
    }

    async fn request(&self, target: Option<String>, pose: Pose) -> SyncResult<Placement> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Place {
                target,
                pose,
                reply,
            })
            .await
            .map_err(|_| SyncError::ConnectionLost)?;
        response.await.map_err(|_| SyncError::ConnectionLost)?
    }
}

/// Spawn the client driver on the current tokio runtime
pub fn run_client(
    config: ClientConfig,
    layout: Vec<LayoutEntry>,
) -> SyncResult<(ClientHandle, JoinHandle<SyncResult<()>>)> {
    config.validate()?;

    let context = SceneContext::new(layout, &config)?;
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (scene_tx, scene_rx) = watch::channel(context.render_items());

    let driver = Driver {
        ticker: ticker(config.tick_interval),
        last_tick: Instant::now(),
        backoff: Backoff::new(config.backoff.clone()),
        context,
        commands: commands_rx,
        scene: scene_tx,
        config,
    };

    let handle = ClientHandle {
        commands: commands_tx,
        scene: scene_rx,
    };
    Ok((handle, tokio::spawn(driver.run())))
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Why a connected or offline phase ended
enum Exit {
    Shutdown,
    Retry,
}

struct Driver {
    config: ClientConfig,
    context: SceneContext,
    commands: mpsc::Receiver<Command>,
    scene: watch::Sender<Vec<RenderItem>>,
    ticker: Interval,
    last_tick: Instant,
    backoff: Backoff,
}

impl Driver {
    async fn run(mut self) -> SyncResult<()> {
        tracing::info!(url = %self.config.server_url, "client starting");

        loop {
            match self.connect().await {
                Ok(Some((sink, source))) => {
                    if let Exit::Shutdown = self.connected(sink, source).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => self.context.on_transport_error(&e),
            }

            let wait = if self.config.reconnect {
                let delay = self.backoff.next_delay();
                tracing::info!(
                    attempt = self.backoff.attempt(),
                    delay = %humantime::format_duration(delay),
                    "reconnecting after delay"
                );
                Some(delay)
            } else {
                tracing::info!("reconnect disabled, continuing offline");
                None
            };

            if let Exit::Shutdown = self.offline(wait).await {
                break;
            }
        }

        tracing::info!("client stopped");
        Ok(())
    }

    /// Connect while still ticking and serving placements.
    /// `Ok(None)` means shutdown was requested.
    async fn connect(&mut self) -> SyncResult<Option<(WsSink, WsSource)>> {
        self.context.begin_connect();

        let url = self.config.server_url.clone();
        let connecting = ws::connect(&url);
        tokio::pin!(connecting);

        let (sink, source) = loop {
            tokio::select! {
                link = &mut connecting => break link?,
                _ = self.ticker.tick() => self.tick(),
                command = self.commands.recv() => {
                    if self.handle(command).is_break() {
                        return Ok(None);
                    }
                }
            }
        };

        self.context.on_open()?;
        self.backoff.reset();
        Ok(Some((sink, source)))
    }

    async fn connected(&mut self, mut sink: WsSink, mut source: WsSource) -> Exit {
        loop {
            if let Err(e) = self.flush(&mut sink).await {
                self.context.on_transport_error(&e);
                return Exit::Retry;
            }

            tokio::select! {
                event = source.next_event() => match event {
                    Ok(LinkEvent::Text(text)) => {
                        if self.context.on_text(&text).is_some() {
                            self.publish();
                        }
                    }
                    Ok(LinkEvent::Closed) => {
                        self.context.on_closed();
                        return Exit::Retry;
                    }
                    Err(e) => {
                        self.context.on_transport_error(&e);
                        return Exit::Retry;
                    }
                },
                _ = self.ticker.tick() => self.tick(),
                command = self.commands.recv() => {
                    if self.handle(command).is_break() {
                        self.context.begin_close();
                        if let Err(e) = sink.close().await {
                            tracing::debug!(error = %e, "close handshake failed");
                        }
                        self.context.on_closed();
                        return Exit::Shutdown;
                    }
                }
            }
        }
    }

    /// Run without a link until `wait` elapses, or until shutdown when
    /// `wait` is `None`
    async fn offline(&mut self, wait: Option<Duration>) -> Exit {
        let retry = async move {
            match wait {
                Some(delay) => time::sleep(delay).await,
                None => future::pending::<()>().await,
            }
        };
        tokio::pin!(retry);

        loop {
            tokio::select! {
                _ = &mut retry => return Exit::Retry,
                _ = self.ticker.tick() => self.tick(),
                command = self.commands.recv() => {
                    if self.handle(command).is_break() {
                        return Exit::Shutdown;
                    }
                }
            }
        }
    }

    async fn flush(&mut self, sink: &mut WsSink) -> SyncResult<()> {
        while let Some(frame) = self.context.pop_outgoing() {
            sink.send_text(frame).await?;
        }
        Ok(())
    }

    fn tick(&mut self) {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;

        self.context.advance(dt);
        self.publish();
    }

    fn handle(&mut self, command: Option<Command>) -> ControlFlow<()> {
        match command {
            Some(Command::Place {
                target,
                pose,
                reply,
            }) => {
                let placement = match target {
                    Some(name) => self.context.place_named(&name, pose),
                    None => self.context.place(pose),
                };
                if placement.is_ok() {
                    self.publish();
                }
                // the caller may have stopped waiting
                let _ = reply.send(placement);
                ControlFlow::Continue(())
            }
            Some(Command::Shutdown) | None => ControlFlow::Break(()),
        }
    }

    fn publish(&self) {
        self.scene.send_replace(self.context.render_items());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, Stream, StreamExt};
    use scenesync_core::Vec3;
    use scenesync_wire::{ItemUpdate, SyncMessage};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    fn layout() -> Vec<LayoutEntry> {
        vec![
            LayoutEntry::new("chair", Pose::identity()),
            LayoutEntry::new("lamp", Pose::identity()),
        ]
    }

    fn config(url: String) -> ClientConfig {
        ClientConfig {
            tick_interval: Duration::from_millis(10),
            ..ClientConfig::local(url)
        }
    }

    async fn next_message<S>(socket: &mut S) -> SyncMessage
    where
        S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return SyncMessage::decode(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {other:?}"),
            }
        }
    }

    async fn wait_for<F>(scene: &mut watch::Receiver<Vec<RenderItem>>, mut done: F)
    where
        F: FnMut(&[RenderItem]) -> bool,
    {
        time::timeout(Duration::from_secs(5), async {
            loop {
                if done(&scene.borrow_and_update()) {
                    return;
                }
                scene.changed().await.unwrap();
            }
        })
        .await
        .expect("render state never matched");
    }

    #[tokio::test]
    async fn test_client_scene_first_then_placement() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let (client, driver) = run_client(config(url), layout()).unwrap();

        let (stream, _) = listener.accept().await.unwrap();
        let mut server = tokio_tungstenite::accept_async(stream).await.unwrap();

        match next_message(&mut server).await {
            SyncMessage::ClientScene { items } => assert_eq!(items.len(), 2),
            other => panic!("expected clientScene first, got {other:?}"),
        }

        let pose = Pose::at(Vec3::new(0.0, 0.0, -1.5));
        let placement = client.place(pose).await.unwrap();
        assert_eq!(placement, Placement::Sent { name: "chair".into() });

        assert_eq!(
            next_message(&mut server).await,
            SyncMessage::ObjAdded {
                name: "chair".into(),
                pose,
                visible: true
            }
        );

        let echo = SyncMessage::UpdateScene {
            items: vec![ItemUpdate::named("chair").with_pose(pose).with_visible(true)],
        };
        server
            .send(Message::Text(echo.encode().unwrap()))
            .await
            .unwrap();

        let mut scene = client.subscribe();
        wait_for(&mut scene, |items| items[0].visible && items[0].pose == pose).await;

        client.shutdown().await.unwrap();
        driver.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_offline_placement_applies_locally() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let (client, driver) = run_client(config(url), layout()).unwrap();

        let placement = client.place_named("lamp", Pose::identity()).await.unwrap();
        assert!(matches!(placement, Placement::AppliedLocally { .. }));

        let mut scene = client.subscribe();
        wait_for(&mut scene, |items| items[1].visible && items[1].opacity < 1.0).await;
        assert!(!scene.borrow()[0].visible);

        client.shutdown().await.unwrap();
        driver.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = ClientConfig {
            tick_interval: Duration::ZERO,
            ..ClientConfig::default()
        };
        assert!(matches!(
            run_client(config, layout()),
            Err(SyncError::InvalidConfig(_))
        ));
    }
}
