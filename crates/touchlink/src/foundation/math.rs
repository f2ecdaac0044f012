//! Math utilities and types
//!
//! Provides the small set of 3D types the tracking pipeline exchanges with
//! VR runtimes: vectors, raw quaternions and pose samples.

use serde::{Deserialize, Serialize};

pub use nalgebra::{Quaternion, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// Raw quaternion as reported by a runtime
///
/// Runtimes hand back zeroed orientations for devices that are not tracked,
/// so this is not a `Unit` quaternion.
pub type Quat = Quaternion<f32>;

/// Build a quaternion from runtime component order `(x, y, z, w)`
pub fn quat_xyzw(x: f32, y: f32, z: f32, w: f32) -> Quat {
    Quaternion::new(w, x, y, z)
}

/// Identity orientation
pub fn quat_identity() -> Quat {
    Quaternion::identity()
}

/// Position and orientation of a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position in meters relative to the tracking origin
    pub position: Vec3,

    /// Orientation quaternion
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Pose at the origin with identity orientation
    pub fn identity() -> Self {
        Self {
            position: Vec3::zeros(),
            orientation: quat_identity(),
        }
    }

    /// Create a pose from a position and orientation
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self { position, orientation }
    }

    /// Create a pose that only translates
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    /// True when the vector part of the orientation is exactly zero.
    ///
    /// Runtimes report `(0, 0, 0, w)` for devices they have no fix on. Only
    /// the fully zero vector part counts as blank: an orientation with a
    /// single zero axis such as `(0, 0.5, 0.2, 0.8)` or `(0.1, 0, 0.2, 0.97)`
    /// is a tracked rotation and is kept.
    pub fn has_blank_orientation(&self) -> bool {
        let q = &self.orientation;
        q.i == 0.0 && q.j == 0.0 && q.k == 0.0
    }
}

/// A pose together with its first and second derivatives
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseState {
    /// Sampled pose
    pub pose: Pose,

    /// Linear velocity in m/s
    pub linear_velocity: Vec3,

    /// Linear acceleration in m/s²
    pub linear_acceleration: Vec3,

    /// Angular velocity in rad/s
    pub angular_velocity: Vec3,

    /// Angular acceleration in rad/s²
    pub angular_acceleration: Vec3,

    /// Absolute runtime time the sample refers to, in seconds
    pub time_seconds: f64,
}

impl PoseState {
    /// A motionless pose state
    pub fn at_rest(pose: Pose) -> Self {
        Self {
            pose,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quat_xyzw_component_order() {
        let q = quat_xyzw(0.1, 0.2, 0.3, 0.9);
        assert_relative_eq!(q.i, 0.1);
        assert_relative_eq!(q.j, 0.2);
        assert_relative_eq!(q.k, 0.3);
        assert_relative_eq!(q.w, 0.9);
    }

    #[test]
    fn test_blank_orientation_detection() {
        assert!(Pose::identity().has_blank_orientation());
        assert!(Pose::new(Vec3::zeros(), quat_xyzw(0.0, 0.0, 0.0, 0.0)).has_blank_orientation());
        assert!(!Pose::new(Vec3::zeros(), quat_xyzw(0.0, 0.5, 0.2, 0.8)).has_blank_orientation());
        assert!(!Pose::new(Vec3::zeros(), quat_xyzw(0.1, 0.0, 0.2, 0.97)).has_blank_orientation());
        assert!(!Pose::new(Vec3::zeros(), quat_xyzw(0.0, 0.0, 0.3, 0.95)).has_blank_orientation());
    }

    #[test]
    fn test_pose_state_at_rest_has_no_motion() {
        let state = PoseState::at_rest(Pose::from_position(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(state.linear_velocity, Vec3::zeros());
        assert_eq!(state.angular_acceleration, Vec3::zeros());
        assert_relative_eq!(state.pose.position.y, 2.0);
    }
}
