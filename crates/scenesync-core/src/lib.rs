//! SceneSync Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout the SceneSync engine:
//! - Pose primitives (Vec3, Quat, Pose)
//! - Scene time and the logical clock that drives timers
//! - Error types

pub mod error;
pub mod pose;
pub mod time;

pub use error::*;
pub use pose::*;
pub use time::*;
