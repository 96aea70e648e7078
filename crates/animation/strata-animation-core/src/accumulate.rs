//! Accumulation of weighted child poses and normalization into a blended pose.
//!
//! Per joint we keep weighted TRS sums and the total weight of the children that
//! actually carried that joint, so a child missing a joint is excluded from that
//! joint's normalization instead of dragging it toward identity.

use hashbrown::HashMap;

use crate::interp::functions::{dot4, normalize4};
use crate::pose::PoseBuffer;
use crate::transform::Transform;

/// Accumulator entry storing weighted sums for one joint.
/// Quaternions are summed with sign alignment against the first contribution,
/// then normalized at finalize.
#[derive(Clone, Copy, Debug, Default)]
struct JointAccum {
    t_sum: [f32; 3],
    r_sum: [f32; 4],
    s_sum: [f32; 3],
    w: f32,
}

impl JointAccum {
    fn add(&mut self, t: &Transform, w: f32) {
        let mut r = t.rotation;
        if self.w > 0.0 && dot4(self.r_sum, r) < 0.0 {
            r = [-r[0], -r[1], -r[2], -r[3]];
        }
        for i in 0..3 {
            self.t_sum[i] += t.translation[i] * w;
            self.s_sum[i] += t.scale[i] * w;
        }
        for i in 0..4 {
            self.r_sum[i] += r[i] * w;
        }
        self.w += w;
    }

    fn finalize(&self) -> Option<Transform> {
        if self.w <= 0.0 {
            return None;
        }
        let inv = self.w.recip();
        Some(Transform {
            translation: [self.t_sum[0] * inv, self.t_sum[1] * inv, self.t_sum[2] * inv],
            rotation: normalize4(self.r_sum),
            scale: [self.s_sum[0] * inv, self.s_sum[1] * inv, self.s_sum[2] * inv],
        })
    }
}

/// Accumulates per-joint and per-channel contributions across child poses.
#[derive(Debug, Default)]
pub struct PoseAccumulator {
    joints: Vec<JointAccum>,
    channels: HashMap<String, (f32, f32)>,
}

impl PoseAccumulator {
    pub fn new(joint_count: usize) -> Self {
        Self {
            joints: vec![JointAccum::default(); joint_count],
            channels: HashMap::new(),
        }
    }

    /// Zero all sums, keeping allocations.
    pub fn reset(&mut self, joint_count: usize) {
        self.joints.clear();
        self.joints.resize(joint_count, JointAccum::default());
        self.channels.clear();
    }

    /// Add every present joint and channel of `pose` with `weight`.
    /// Non-positive or non-finite weights contribute nothing.
    pub fn add_pose(&mut self, pose: &PoseBuffer, weight: f32) {
        if weight <= 0.0 || !weight.is_finite() {
            return;
        }
        for (index, t) in pose.iter_joints() {
            if let Some(entry) = self.joints.get_mut(index) {
                entry.add(t, weight);
            }
        }
        for (name, value) in pose.channels() {
            if let Some((sum, w)) = self.channels.get_mut(name) {
                *sum += value * weight;
                *w += weight;
            } else {
                self.channels
                    .insert(name.to_string(), (value * weight, weight));
            }
        }
    }

    /// Write normalized results into `out` (which is cleared first).
    /// Returns whether anything was written.
    pub fn finalize_into(&self, out: &mut PoseBuffer) -> bool {
        out.clear();
        let mut wrote = false;
        for (index, entry) in self.joints.iter().enumerate() {
            if let Some(t) = entry.finalize() {
                out.set_joint(index, t);
                wrote = true;
            }
        }
        for (name, (sum, w)) in self.channels.iter() {
            if *w > 0.0 {
                out.set_channel(name, sum / w);
                wrote = true;
            }
        }
        wrote
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_joint_is_excluded_from_normalization() {
        let mut a = PoseBuffer::with_joint_count(2);
        a.set_joint(0, Transform::from_translation([2.0, 0.0, 0.0]));
        a.set_joint(1, Transform::from_translation([4.0, 0.0, 0.0]));

        let mut b = PoseBuffer::with_joint_count(2);
        b.set_joint(0, Transform::from_translation([0.0, 0.0, 0.0]));

        let mut acc = PoseAccumulator::new(2);
        acc.add_pose(&a, 0.25);
        acc.add_pose(&b, 0.75);

        let mut out = PoseBuffer::with_joint_count(2);
        assert!(acc.finalize_into(&mut out));
        // joint 0: (2 * 0.25 + 0 * 0.75) / 1.0
        assert!((out.joint(0).unwrap().translation[0] - 0.5).abs() < 1e-6);
        // joint 1: only `a` carried it, so it keeps a's value rather than being pulled to 0
        assert!((out.joint(1).unwrap().translation[0] - 4.0).abs() < 1e-6);
    }

    #[test]
    fn opposite_sign_quaternions_do_not_cancel() {
        let mut a = PoseBuffer::with_joint_count(1);
        a.set_joint(0, Transform::IDENTITY);
        let mut b = PoseBuffer::with_joint_count(1);
        b.set_joint(
            0,
            Transform {
                rotation: [0.0, 0.0, 0.0, -1.0],
                ..Transform::IDENTITY
            },
        );
        let mut acc = PoseAccumulator::new(1);
        acc.add_pose(&a, 0.5);
        acc.add_pose(&b, 0.5);
        let mut out = PoseBuffer::with_joint_count(1);
        acc.finalize_into(&mut out);
        let r = out.joint(0).unwrap().rotation;
        assert!((r[3].abs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_weight_contributes_nothing() {
        let mut a = PoseBuffer::with_joint_count(1);
        a.set_joint(0, Transform::IDENTITY);
        a.set_channel("c", 1.0);
        let mut acc = PoseAccumulator::new(1);
        acc.add_pose(&a, 0.0);
        acc.add_pose(&a, f32::NAN);
        let mut out = PoseBuffer::with_joint_count(1);
        assert!(!acc.finalize_into(&mut out));
        assert!(out.is_empty());
    }
}
