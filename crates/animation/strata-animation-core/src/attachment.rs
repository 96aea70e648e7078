//! Named offsets bound to joints, resolved against the composited world pose.

use serde::{Deserialize, Serialize};

use crate::transform::Transform;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub joint: usize,
    pub joint_name: String,
    /// Local offset from the joint.
    pub offset: Transform,
    /// Host-side slot (e.g. which weapon mount); carried through untouched.
    pub offset_index: u32,
    pub extra: Option<serde_json::Value>,
}

impl Attachment {
    /// World transform given the skeleton's world pose; `None` if the joint is out of range.
    pub fn world_transform(&self, world: &[Transform]) -> Option<Transform> {
        world.get(self.joint).map(|j| j.mul(&self.offset))
    }
}
