//! Pose primitives - position, rotation and scale of a placed object
//!
//! A [`Pose`] is a plain value. It is `Copy`, so handing a pose to another
//! collaborator or onto the wire always copies it; the source and the
//! replica may diverge until reconciliation brings them back together.

/// Positions snapped to the floor plane when closer than this
pub const FLOOR_SNAP_EPSILON: f64 = 1e-5;

/// 3D vector, used for both position and scale
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub const fn one() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Rotation as a unit quaternion, stored in `x, y, z, w` order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quat {
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    pub const fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// From positional `[x, y, z, w]`
    pub fn from_array(q: [f64; 4]) -> Self {
        Self::new(q[0], q[1], q[2], q[3])
    }

    /// To positional `[x, y, z, w]`
    pub fn to_array(self) -> [f64; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

/// Position + rotation + scale
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Origin, no rotation, unit scale
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quat::identity(), Vec3::one())
    }

    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    /// Hit-test poses land a hair off the floor plane; pull them onto it.
    pub fn snapped_to_floor(mut self) -> Self {
        if self.position.y.abs() < FLOOR_SNAP_EPSILON {
            self.position.y = 0.0;
        }
        self
    }
}
