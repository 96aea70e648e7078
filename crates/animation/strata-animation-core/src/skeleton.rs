//! Skeleton hierarchy, bind pose and world-transform propagation.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::transform::Transform;

/// One joint of a skeleton. `parent` must index an earlier joint, so a single
/// forward pass over the joint list visits parents before children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    #[serde(default)]
    pub parent: Option<usize>,
    /// Local bind transform; joints left out of every layer fall back to this.
    #[serde(default)]
    pub bind: Transform,
}

#[derive(Clone, Debug, Deserialize)]
struct RawSkeleton {
    joints: Vec<Joint>,
}

/// Immutable joint hierarchy shared by every layer of one manager.
#[derive(Clone, Debug)]
pub struct Skeleton {
    joints: Vec<Joint>,
    bind_pose: Vec<Transform>,
    by_name: HashMap<String, usize>,
}

impl Skeleton {
    pub fn new(joints: Vec<Joint>) -> Result<Self, ConfigurationError> {
        let mut by_name = HashMap::with_capacity(joints.len());
        for (index, joint) in joints.iter().enumerate() {
            if let Some(parent) = joint.parent {
                if parent >= index {
                    return Err(ConfigurationError::InvalidSkeleton {
                        reason: format!(
                            "joint '{}' (index {index}) has parent {parent}; parents must precede children",
                            joint.name
                        ),
                    });
                }
            }
            if !joint.bind.is_finite() {
                return Err(ConfigurationError::InvalidSkeleton {
                    reason: format!("joint '{}' has a non-finite bind transform", joint.name),
                });
            }
            if by_name.insert(joint.name.clone(), index).is_some() {
                return Err(ConfigurationError::DuplicateJoint {
                    joint: joint.name.clone(),
                });
            }
        }
        let bind_pose = joints.iter().map(|j| j.bind).collect();
        Ok(Self {
            joints,
            bind_pose,
            by_name,
        })
    }

    /// Parse `{ "joints": [...] }` JSON into a validated skeleton.
    pub fn from_json(s: &str) -> Result<Self, ConfigurationError> {
        let raw: RawSkeleton = serde_json::from_str(s)?;
        Self::new(raw.joints)
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    pub fn find_joint(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Like [`Skeleton::find_joint`], reporting unknown names as configuration errors.
    pub fn require_joint(&self, name: &str) -> Result<usize, ConfigurationError> {
        self.find_joint(name)
            .ok_or_else(|| ConfigurationError::UnknownJoint {
                joint: name.to_string(),
            })
    }

    pub fn check_index(&self, index: usize) -> Result<usize, ConfigurationError> {
        if index < self.joints.len() {
            Ok(index)
        } else {
            Err(ConfigurationError::JointIndexOutOfRange {
                index,
                joint_count: self.joints.len(),
            })
        }
    }

    pub fn bind_pose(&self) -> &[Transform] {
        &self.bind_pose
    }

    /// Propagate local transforms down the hierarchy into `world`.
    /// `locals` must hold one entry per joint; `world` is resized to match.
    pub fn compute_world(&self, locals: &[Transform], world: &mut Vec<Transform>) {
        world.clear();
        world.reserve(self.joints.len());
        for (index, joint) in self.joints.iter().enumerate() {
            let local = locals.get(index).copied().unwrap_or(joint.bind);
            let global = match joint.parent {
                Some(parent) => world[parent].mul(&local),
                None => local,
            };
            world.push(global);
        }
    }
}
