//! Joint transform split to TRS for blending and composition.

use serde::{Deserialize, Serialize};

use crate::interp::functions::{
    lerp_vec3, normalize4, quat_conjugate, quat_mul, quat_rotate, slerp_quat, QUAT_IDENTITY,
};

fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_rotation() -> [f32; 4] {
    QUAT_IDENTITY
}

/// Local or world transform of a joint. Rotation is a unit quaternion (x, y, z, w).
/// Missing fields deserialize to identity components.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default)]
    pub translation: [f32; 3],
    #[serde(default = "default_rotation")]
    pub rotation: [f32; 4],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: [0.0, 0.0, 0.0],
        rotation: QUAT_IDENTITY,
        scale: [1.0, 1.0, 1.0],
    };

    pub fn from_translation(translation: [f32; 3]) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn from_rotation(rotation: [f32; 4]) -> Self {
        Self {
            rotation: normalize4(rotation),
            ..Self::IDENTITY
        }
    }

    /// Two-way blend: translation/scale lerp, rotation slerp.
    pub fn lerp(&self, other: &Transform, t: f32) -> Transform {
        Transform {
            translation: lerp_vec3(self.translation, other.translation, t),
            rotation: slerp_quat(self.rotation, other.rotation, t),
            scale: lerp_vec3(self.scale, other.scale, t),
        }
    }

    /// Compose `self * child`: the child expressed in this transform's parent space.
    pub fn mul(&self, child: &Transform) -> Transform {
        let scaled = [
            child.translation[0] * self.scale[0],
            child.translation[1] * self.scale[1],
            child.translation[2] * self.scale[2],
        ];
        let rotated = quat_rotate(self.rotation, scaled);
        Transform {
            translation: [
                self.translation[0] + rotated[0],
                self.translation[1] + rotated[1],
                self.translation[2] + rotated[2],
            ],
            rotation: normalize4(quat_mul(self.rotation, child.rotation)),
            scale: [
                self.scale[0] * child.scale[0],
                self.scale[1] * child.scale[1],
                self.scale[2] * child.scale[2],
            ],
        }
    }

    /// Delta that takes `base` to `self`, used by additive layers.
    pub fn relative_to(&self, base: &Transform) -> Transform {
        let inv = quat_conjugate(base.rotation);
        Transform {
            translation: [
                self.translation[0] - base.translation[0],
                self.translation[1] - base.translation[1],
                self.translation[2] - base.translation[2],
            ],
            rotation: normalize4(quat_mul(inv, self.rotation)),
            scale: [
                safe_div(self.scale[0], base.scale[0]),
                safe_div(self.scale[1], base.scale[1]),
                safe_div(self.scale[2], base.scale[2]),
            ],
        }
    }

    /// Apply an additive `delta` (from [`Transform::relative_to`]) scaled by `weight`.
    pub fn add_delta(&self, delta: &Transform, weight: f32) -> Transform {
        let partial = Transform::IDENTITY.lerp(delta, weight);
        Transform {
            translation: [
                self.translation[0] + partial.translation[0],
                self.translation[1] + partial.translation[1],
                self.translation[2] + partial.translation[2],
            ],
            rotation: normalize4(quat_mul(self.rotation, partial.rotation)),
            scale: [
                self.scale[0] * partial.scale[0],
                self.scale[1] * partial.scale[1],
                self.scale[2] * partial.scale[2],
            ],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.translation.iter().all(|v| v.is_finite())
            && self.rotation.iter().all(|v| v.is_finite())
            && self.scale.iter().all(|v| v.is_finite())
    }
}

#[inline]
fn safe_div(a: f32, b: f32) -> f32 {
    if b.abs() > f32::EPSILON {
        a / b
    } else {
        1.0
    }
}
