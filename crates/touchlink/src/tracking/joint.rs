//! Tracked joints keyed by a stable identity

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::foundation::math::{Pose, PoseState, Quat, Vec3};

/// Stable identity of a tracked entity
///
/// Ordering follows the host-facing slot order: both hands, the headset,
/// then auxiliary objects by runtime slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JointId {
    /// Left hand controller
    LeftController,
    /// Right hand controller
    RightController,
    /// Headset, also carrying the first connected auxiliary object
    Headset,
    /// Additional auxiliary object by runtime slot
    Object(u8),
}

impl JointId {
    /// Joints present on every session
    pub const FIXED: [Self; 3] = [Self::LeftController, Self::RightController, Self::Headset];

    /// Display name shown by hosts
    pub fn name(self) -> String {
        match self {
            Self::LeftController => "Left Touch Controller".to_string(),
            Self::RightController => "Right Touch Controller".to_string(),
            Self::Headset => "Oculus VR Headset".to_string(),
            Self::Object(slot) => format!("VR Object {}", u32::from(slot) + 1),
        }
    }

    /// Position in the host-facing joint list
    pub fn slot(self) -> usize {
        match self {
            Self::LeftController => 0,
            Self::RightController => 1,
            Self::Headset => 2,
            Self::Object(slot) => 3 + usize::from(slot),
        }
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// One tracked entity and its latest pose sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedJoint {
    /// Identity
    pub id: JointId,
    /// Display name
    pub name: String,
    /// Latest sample
    pub state: PoseState,
}

impl TrackedJoint {
    /// Joint at rest at the origin
    pub fn new(id: JointId) -> Self {
        Self {
            id,
            name: id.name(),
            state: PoseState::default(),
        }
    }

    /// Latest position
    pub fn position(&self) -> Vec3 {
        self.state.pose.position
    }

    /// Latest orientation
    pub fn orientation(&self) -> Quat {
        self.state.pose.orientation
    }

    /// Latest pose
    pub fn pose(&self) -> Pose {
        self.state.pose
    }
}

/// Joints by identity, iterated in slot order
#[derive(Debug, Clone, PartialEq)]
pub struct JointMap {
    joints: BTreeMap<JointId, TrackedJoint>,
}

impl Default for JointMap {
    fn default() -> Self {
        Self::new()
    }
}

impl JointMap {
    /// Map holding the fixed joints
    pub fn new() -> Self {
        let joints = JointId::FIXED
            .into_iter()
            .map(|id| (id, TrackedJoint::new(id)))
            .collect();
        Self { joints }
    }

    /// Overwrite a joint's sample, adding the joint if it is new
    pub fn update(&mut self, id: JointId, state: PoseState) {
        self.joints
            .entry(id)
            .or_insert_with(|| TrackedJoint::new(id))
            .state = state;
    }

    /// Joint by identity
    pub fn get(&self, id: JointId) -> Option<&TrackedJoint> {
        self.joints.get(&id)
    }

    /// Number of joints
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// Always false; the fixed joints are never removed
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Joints in slot order
    pub fn iter(&self) -> impl Iterator<Item = &TrackedJoint> {
        self.joints.values()
    }

    /// Owned copy in slot order
    pub fn snapshot(&self) -> Vec<TrackedJoint> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::quat_xyzw;
    use approx::assert_relative_eq;

    #[test]
    fn test_fixed_joints_in_slot_order() {
        let map = JointMap::new();
        let names: Vec<_> = map.iter().map(|joint| joint.name.as_str()).collect();
        assert_eq!(
            names,
            ["Left Touch Controller", "Right Touch Controller", "Oculus VR Headset"]
        );
        assert_eq!(map.get(JointId::Headset).map(|j| j.id.slot()), Some(2));
    }

    #[test]
    fn test_objects_sort_after_fixed_joints() {
        let mut map = JointMap::new();
        let state = PoseState::at_rest(Pose::new(Vec3::new(0.5, 1.0, 0.0), quat_xyzw(0.0, 0.5, 0.2, 0.8)));
        map.update(JointId::Object(3), state);
        map.update(JointId::Object(1), state);

        let snapshot = map.snapshot();
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot[3].name, "VR Object 2");
        assert_eq!(snapshot[4].id, JointId::Object(3));
        assert_eq!(snapshot[4].id.slot(), 6);
        assert_relative_eq!(snapshot[3].position().x, 0.5);
        assert_relative_eq!(snapshot[3].orientation().k, 0.2);
    }

    #[test]
    fn test_update_overwrites_existing_joint() {
        let mut map = JointMap::new();
        let pose = Pose::from_position(Vec3::new(1.0, 2.0, 3.0));
        map.update(JointId::LeftController, PoseState::at_rest(pose));
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(JointId::LeftController).map(TrackedJoint::pose), Some(pose));
    }
}
