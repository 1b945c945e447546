//! Spatial transforms as a propagation kind
//!
//! [`LocalTransform`] is relative to the parent; [`GlobalTransform`] is the
//! world-space result cached by [`propagate`](crate::propagation::propagate).

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::propagation::{Dependent, Propagation};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl LocalTransform {
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    pub fn with_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    pub fn with_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::identity()
        }
    }

    pub fn with_scale(scale: Vec3) -> Self {
        Self {
            scale,
            ..Self::identity()
        }
    }
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl GlobalTransform {
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// Combine parent global + local child into global child
    pub fn from_local(parent: &GlobalTransform, child: &LocalTransform) -> Self {
        let position = parent.position + parent.rotation * (child.position * parent.scale);
        Self {
            position,
            rotation: parent.rotation * child.rotation,
            scale: parent.scale * child.scale,
        }
    }

    /// Express this transform relative to `parent`.
    pub fn to_local(&self, parent: &GlobalTransform) -> LocalTransform {
        let inv_rot = parent.rotation.inverse();
        LocalTransform {
            position: (inv_rot * (self.position - parent.position)) / parent.scale,
            rotation: inv_rot * self.rotation,
            scale: self.scale / parent.scale,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * (point * self.scale)
    }
}

impl Default for GlobalTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Local-to-world transform propagation.
pub struct TransformPropagation;

impl Propagation for TransformPropagation {
    type Local = LocalTransform;
    type Derived = GlobalTransform;

    fn identity() -> GlobalTransform {
        GlobalTransform::identity()
    }

    fn combine(parent: &GlobalTransform, local: &LocalTransform) -> GlobalTransform {
        GlobalTransform::from_local(parent, local)
    }
}

/// Transform component: local value with cached global.
pub type Transform = Dependent<TransformPropagation>;
