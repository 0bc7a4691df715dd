//! SceneSync Test Harness
//!
//! This crate provides:
//! - An in-memory authoritative relay server
//! - The same relay served over WebSockets
//! - A scenario harness stepping clients on a shared logical clock
//! - End-to-end scenarios

pub mod relay;
pub mod scenario;
pub mod scenarios;
pub mod server;

pub use relay::*;
pub use scenario::*;
pub use scenarios::*;
pub use server::*;
