//! SceneSync Wire Protocol - JSON text frames
//!
//! Every frame is a JSON object with a `type` discriminator:
//! - `clientScene`: initial snapshot, sent once per connection
//! - `ping` / `pong`: heartbeat pair
//! - `objAdded`: placement event (echoed back by the server)
//! - `updateScene`: authoritative snapshot broadcast by the server
//! - `updateVisibility`: a fade finished on this client
//!
//! Unknown `type` values decode to [`SyncMessage::Unknown`] instead of
//! failing.

pub mod message;
pub mod repr;

pub use message::*;
pub use repr::{WireQuat, WireVec3};
