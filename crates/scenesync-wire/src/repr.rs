//! Serde representations of the JSON frames
//!
//! These types mirror the wire shape exactly and are converted to and from
//! the domain types in [`crate::message`]. Poses are always written
//! positionally; named-field objects are accepted on read because older
//! servers echo vectors and quaternions in that form.

use serde::{Deserialize, Serialize};

use scenesync_core::{Pose, Quat, Vec3};

/// `[x, y, z]` or `{x, y, z}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireVec3 {
    Positional([f64; 3]),
    Named { x: f64, y: f64, z: f64 },
}

impl From<WireVec3> for Vec3 {
    fn from(v: WireVec3) -> Self {
        match v {
            WireVec3::Positional(a) => Vec3::from_array(a),
            WireVec3::Named { x, y, z } => Vec3::new(x, y, z),
        }
    }
}

impl From<Vec3> for WireVec3 {
    fn from(v: Vec3) -> Self {
        WireVec3::Positional(v.to_array())
    }
}

/// `[x, y, z, w]` or `{_x, _y, _z, _w}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireQuat {
    Positional([f64; 4]),
    Named {
        #[serde(rename = "_x")]
        x: f64,
        #[serde(rename = "_y")]
        y: f64,
        #[serde(rename = "_z")]
        z: f64,
        #[serde(rename = "_w")]
        w: f64,
    },
}

impl From<WireQuat> for Quat {
    fn from(q: WireQuat) -> Self {
        match q {
            WireQuat::Positional(a) => Quat::from_array(a),
            WireQuat::Named { x, y, z, w } => Quat::new(x, y, z, w),
        }
    }
}

impl From<Quat> for WireQuat {
    fn from(q: Quat) -> Self {
        WireQuat::Positional(q.to_array())
    }
}

/// Full item record (`clientScene` entries)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireItem {
    pub name: String,
    pub position: WireVec3,
    pub quaternion: WireQuat,
    pub scale: WireVec3,
    pub visible: bool,
}

/// Partial item record (`sharedScene` entries)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireItemUpdate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<WireVec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quaternion: Option<WireQuat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<WireVec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
}

/// `data` payload of `objAdded`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WirePose {
    pub position: WireVec3,
    pub quaternion: WireQuat,
    pub scale: WireVec3,
}

impl From<WirePose> for Pose {
    fn from(p: WirePose) -> Self {
        Pose::new(p.position.into(), p.quaternion.into(), p.scale.into())
    }
}

impl From<Pose> for WirePose {
    fn from(p: Pose) -> Self {
        WirePose {
            position: p.position.into(),
            quaternion: p.rotation.into(),
            scale: p.scale.into(),
        }
    }
}

/// Frame envelope, discriminated by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum WireMessage {
    Ping,
    Pong,
    ClientScene {
        #[serde(rename = "clientScene")]
        client_scene: Vec<WireItem>,
    },
    ObjAdded {
        name: String,
        visible: bool,
        data: WirePose,
    },
    UpdateScene {
        #[serde(rename = "sharedScene")]
        shared_scene: Vec<WireItemUpdate>,
    },
    UpdateVisibility {
        name: String,
        visible: bool,
    },
}

/// Tags [`WireMessage`] understands
pub(crate) const KNOWN_TYPES: &[&str] = &[
    "ping",
    "pong",
    "clientScene",
    "objAdded",
    "updateScene",
    "updateVisibility",
];
