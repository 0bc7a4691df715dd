//! SceneSync State Engine - local replica of the shared scene
//!
//! This crate implements:
//! - The scene item store (name → pose/visibility record)
//! - The per-item fade state machine
//! - Reconciliation of authoritative snapshots and offline placements

pub mod fade;
pub mod item;
pub mod reconcile;
pub mod store;

pub use fade::*;
pub use item::*;
pub use reconcile::*;
pub use store::*;
