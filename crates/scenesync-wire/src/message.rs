//! Sync messages and the text codec

use serde::Deserialize;

use scenesync_core::{Pose, Quat, SyncError, SyncResult, Vec3};

use crate::repr::{WireItem, WireItemUpdate, WireMessage, KNOWN_TYPES};

/// Largest text frame accepted by [`SyncMessage::decode`]
pub const MAX_MESSAGE_SIZE: usize = 1 << 20;

/// Complete record of one item, as carried by `clientScene`
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSnapshot {
    pub name: String,
    pub pose: Pose,
    pub visible: bool,
}

impl ItemSnapshot {
    pub fn new(name: impl Into<String>, pose: Pose, visible: bool) -> Self {
        Self {
            name: name.into(),
            pose,
            visible,
        }
    }
}

/// Partial record of one item, as carried by `updateScene`
///
/// Absent fields leave the local value untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemUpdate {
    pub name: String,
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub scale: Option<Vec3>,
    pub visible: Option<bool>,
}

impl ItemUpdate {
    /// Update carrying only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.position = Some(pose.position);
        self.rotation = Some(pose.rotation);
        self.scale = Some(pose.scale);
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }
}

impl From<&ItemSnapshot> for ItemUpdate {
    fn from(item: &ItemSnapshot) -> Self {
        ItemUpdate::named(item.name.clone())
            .with_pose(item.pose)
            .with_visible(item.visible)
    }
}

/// A message exchanged with the scene server
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    Ping,
    Pong,
    /// Full local scene, sent once when the connection opens
    ClientScene { items: Vec<ItemSnapshot> },
    /// Placement event; the server echoes it back
    ObjAdded {
        name: String,
        pose: Pose,
        visible: bool,
    },
    /// Authoritative snapshot from the server
    UpdateScene { items: Vec<ItemUpdate> },
    /// A fade on this client finished or was stopped
    UpdateVisibility { name: String, visible: bool },
    /// Frame with an unrecognized `type`; decode-only
    Unknown { kind: String },
}

impl SyncMessage {
    /// Wire tag of this message
    pub fn kind(&self) -> &str {
        match self {
            SyncMessage::Ping => "ping",
            SyncMessage::Pong => "pong",
            SyncMessage::ClientScene { .. } => "clientScene",
            SyncMessage::ObjAdded { .. } => "objAdded",
            SyncMessage::UpdateScene { .. } => "updateScene",
            SyncMessage::UpdateVisibility { .. } => "updateVisibility",
            SyncMessage::Unknown { kind } => kind,
        }
    }

    /// Encode to a JSON text frame
    pub fn encode(&self) -> SyncResult<String> {
        let wire = match self {
            SyncMessage::Ping => WireMessage::Ping,
            SyncMessage::Pong => WireMessage::Pong,
            SyncMessage::ClientScene { items } => WireMessage::ClientScene {
                client_scene: items.iter().map(snapshot_to_wire).collect(),
            },
            SyncMessage::ObjAdded {
                name,
                pose,
                visible,
            } => WireMessage::ObjAdded {
                name: name.clone(),
                visible: *visible,
                data: (*pose).into(),
            },
            SyncMessage::UpdateScene { items } => WireMessage::UpdateScene {
                shared_scene: items.iter().map(update_to_wire).collect(),
            },
            SyncMessage::UpdateVisibility { name, visible } => WireMessage::UpdateVisibility {
                name: name.clone(),
                visible: *visible,
            },
            SyncMessage::Unknown { kind } => {
                return Err(SyncError::Protocol(format!(
                    "cannot encode unknown message type {:?}",
                    kind
                )))
            }
        };

        serde_json::to_string(&wire).map_err(|e| SyncError::Protocol(e.to_string()))
    }

    /// Decode a JSON text frame
    ///
    /// An unrecognized `type` is not an error: it comes back as
    /// [`SyncMessage::Unknown`] so the caller can log and drop it.
    pub fn decode(text: &str) -> SyncResult<Self> {
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(SyncError::Protocol(format!(
                "Message too large: {} > {}",
                text.len(),
                MAX_MESSAGE_SIZE
            )));
        }

        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| SyncError::Protocol(e.to_string()))?;

        let kind = match value.get("type") {
            Some(serde_json::Value::String(kind)) => kind.clone(),
            Some(_) => return Err(SyncError::Protocol("`type` is not a string".into())),
            None => return Err(SyncError::Protocol("missing `type`".into())),
        };

        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Ok(SyncMessage::Unknown { kind });
        }

        let wire = WireMessage::deserialize(value).map_err(|e| SyncError::MalformedMessage {
            kind: kind.clone(),
            reason: e.to_string(),
        })?;

        let message = from_wire(wire);
        validate(&message)?;
        Ok(message)
    }
}

fn snapshot_to_wire(item: &ItemSnapshot) -> WireItem {
    WireItem {
        name: item.name.clone(),
        position: item.pose.position.into(),
        quaternion: item.pose.rotation.into(),
        scale: item.pose.scale.into(),
        visible: item.visible,
    }
}

fn update_to_wire(item: &ItemUpdate) -> WireItemUpdate {
    WireItemUpdate {
        name: item.name.clone(),
        position: item.position.map(Into::into),
        quaternion: item.rotation.map(Into::into),
        scale: item.scale.map(Into::into),
        visible: item.visible,
    }
}

fn from_wire(wire: WireMessage) -> SyncMessage {
    match wire {
        WireMessage::Ping => SyncMessage::Ping,
        WireMessage::Pong => SyncMessage::Pong,
        WireMessage::ClientScene { client_scene } => SyncMessage::ClientScene {
            items: client_scene
                .into_iter()
                .map(|item| ItemSnapshot {
                    name: item.name,
                    pose: Pose::new(
                        item.position.into(),
                        item.quaternion.into(),
                        item.scale.into(),
                    ),
                    visible: item.visible,
                })
                .collect(),
        },
        WireMessage::ObjAdded {
            name,
            visible,
            data,
        } => SyncMessage::ObjAdded {
            name,
            pose: data.into(),
            visible,
        },
        WireMessage::UpdateScene { shared_scene } => SyncMessage::UpdateScene {
            items: shared_scene
                .into_iter()
                .map(|item| ItemUpdate {
                    name: item.name,
                    position: item.position.map(Into::into),
                    rotation: item.quaternion.map(Into::into),
                    scale: item.scale.map(Into::into),
                    visible: item.visible,
                })
                .collect(),
        },
        WireMessage::UpdateVisibility { name, visible } => {
            SyncMessage::UpdateVisibility { name, visible }
        }
    }
}

/// Shape checks serde cannot express
fn validate(message: &SyncMessage) -> SyncResult<()> {
    let empty_name = match message {
        SyncMessage::ClientScene { items } => items.iter().any(|i| i.name.is_empty()),
        SyncMessage::UpdateScene { items } => items.iter().any(|i| i.name.is_empty()),
        SyncMessage::ObjAdded { name, .. } | SyncMessage::UpdateVisibility { name, .. } => {
            name.is_empty()
        }
        _ => false,
    };

    if empty_name {
        return Err(SyncError::MalformedMessage {
            kind: message.kind().to_string(),
            reason: "empty item name".into(),
        });
    }
    Ok(())
}
