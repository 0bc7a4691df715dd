//! SceneSync Runtime - client orchestration
//!
//! This crate ties the store, the reconciliation engine and the connection
//! session together:
//! - [`SceneContext`]: the sans-IO client state, driven by a logical clock
//! - [`run_client`]: the tokio driver that owns the WebSocket link
//! - [`ClientConfig`] and [`init_logging`]: configuration and tracing setup

pub mod client;
pub mod config;
pub mod context;
pub mod logging;

pub use client::*;
pub use config::*;
pub use context::*;
pub use logging::*;
