//! SceneSync Transport Layer - connection lifecycle
//!
//! This crate provides:
//! - The connection session state machine (sans-IO)
//! - Heartbeat scheduling
//! - Reconnect backoff policy
//! - WebSocket link (tokio-tungstenite)

pub mod backoff;
pub mod heartbeat;
pub mod session;
pub mod ws;

pub use backoff::*;
pub use heartbeat::*;
pub use session::*;
pub use ws::{connect, LinkEvent, WsSink, WsSource};
