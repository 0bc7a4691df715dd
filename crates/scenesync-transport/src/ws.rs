//! WebSocket link

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use scenesync_core::{SyncError, SyncResult};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event read from the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Text(String),
    Closed,
}

/// Write half
pub struct WsSink {
    inner: SplitSink<Socket, Message>,
}

/// Read half
pub struct WsSource {
    inner: SplitStream<Socket>,
}

/// Open a WebSocket connection to `url`
pub async fn connect(url: &str) -> SyncResult<(WsSink, WsSource)> {
    let (socket, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| SyncError::TransportError(e.to_string()))?;

    let (sink, source) = socket.split();
    Ok((WsSink { inner: sink }, WsSource { inner: source }))
}

impl WsSink {
    pub async fn send_text(&mut self, text: String) -> SyncResult<()> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| SyncError::TransportError(e.to_string()))
    }

    pub async fn close(&mut self) -> SyncResult<()> {
        self.inner
            .close()
            .await
            .map_err(|e| SyncError::TransportError(e.to_string()))
    }
}

impl WsSource {
    /// Next text frame or close. Control and binary frames are skipped.
    pub async fn next_event(&mut self) -> SyncResult<LinkEvent> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(LinkEvent::Text(text)),
                Some(Ok(Message::Close(_))) | None => return Ok(LinkEvent::Closed),
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(len = data.len(), "ignoring binary frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(SyncError::TransportError(e.to_string())),
            }
        }
    }
}
