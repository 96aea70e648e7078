//! Compositing of layer poses into the final skeleton pose.
//!
//! The base layer's pose is the starting point; each additional layer is then
//! applied in insertion order, so later layers win on shared joints.

use hashbrown::HashMap;

use crate::interp::functions::lerp_f32;
use crate::layer::BlendMode;
use crate::outputs::{CoreEvent, Outputs};
use crate::pose::PoseBuffer;
use crate::transform::Transform;

/// Apply `layer` on top of `target` with the given mode and effective weight.
/// Joints absent from `target` are read from `bind` first.
pub fn apply_layer(
    target: &mut PoseBuffer,
    layer: &PoseBuffer,
    mode: BlendMode,
    weight: f32,
    bind: &[Transform],
) {
    if !weight.is_finite() || weight <= 0.0 {
        return;
    }
    let base_of = |target: &PoseBuffer, index: usize| {
        target
            .joint(index)
            .copied()
            .or_else(|| bind.get(index).copied())
            .unwrap_or(Transform::IDENTITY)
    };
    match mode {
        BlendMode::Lerp => {
            let w = weight.min(1.0);
            for (index, t) in layer.iter_joints() {
                let base = base_of(target, index);
                target.set_joint(index, base.lerp(t, w));
            }
            for (name, v) in layer.channels() {
                let base = target.channel(name).unwrap_or(0.0);
                target.set_channel(name, lerp_f32(base, v, w));
            }
        }
        BlendMode::Override if weight >= 1.0 => {
            for (index, t) in layer.iter_joints() {
                target.set_joint(index, *t);
            }
            for (name, v) in layer.channels() {
                target.set_channel(name, v);
            }
        }
        // Partial override eases from what is underneath toward the layer.
        BlendMode::Override => {
            for (index, t) in layer.iter_joints() {
                let base = base_of(target, index);
                target.set_joint(index, base.lerp(t, weight));
            }
            for (name, v) in layer.channels() {
                let base = target.channel(name).unwrap_or(0.0);
                target.set_channel(name, lerp_f32(base, v, weight));
            }
        }
        BlendMode::Additive => {
            for (index, t) in layer.iter_joints() {
                let reference = bind.get(index).copied().unwrap_or(Transform::IDENTITY);
                let delta = t.relative_to(&reference);
                let base = base_of(target, index);
                target.set_joint(index, base.add_delta(&delta, weight));
            }
            for (name, v) in layer.channels() {
                let base = target.channel(name).unwrap_or(0.0);
                target.set_channel(name, base + v * weight);
            }
        }
    }
}

/// Rising-edge detector for composited channels.
#[derive(Debug, Default)]
pub struct ChannelArms {
    armed: HashMap<String, bool>,
}

impl ChannelArms {
    /// Emit `ChannelArmed` for every channel that crossed `threshold` upwards
    /// since the previous call. Channels dropping below re-arm.
    pub fn update(&mut self, pose: &PoseBuffer, threshold: f32, out: &mut Outputs) {
        for (name, value) in pose.channels() {
            let above = value > threshold;
            let was_above = self.armed.get(name).copied().unwrap_or(false);
            if above && !was_above {
                out.push_event(CoreEvent::ChannelArmed {
                    channel: name.to_string(),
                    value,
                });
            }
            if let Some(flag) = self.armed.get_mut(name) {
                *flag = above;
            } else {
                self.armed.insert(name.to_string(), above);
            }
        }
        // Channels that vanished from the pose count as low.
        for (name, flag) in self.armed.iter_mut() {
            if pose.channel(name).is_none() {
                *flag = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose_with(index: usize, x: f32) -> PoseBuffer {
        let mut p = PoseBuffer::with_joint_count(3);
        p.set_joint(index, Transform::from_translation([x, 0.0, 0.0]));
        p
    }

    #[test]
    fn full_override_replaces_shared_joints_regardless_of_base() {
        let bind = vec![Transform::IDENTITY; 3];
        for base_x in [0.0, 10.0, -4.0] {
            for weight in [1.0, 2.5] {
                let mut target = pose_with(1, base_x);
                apply_layer(&mut target, &pose_with(1, 2.0), BlendMode::Override, weight, &bind);
                assert_eq!(target.joint(1).unwrap().translation[0], 2.0);
            }
        }
    }

    #[test]
    fn partial_override_scales_with_weight() {
        let bind = vec![Transform::IDENTITY; 3];
        let mut target = pose_with(1, 10.0);
        target.set_channel("punch_fire", 0.0);
        let mut layer = pose_with(1, 2.0);
        layer.set_channel("punch_fire", 1.0);
        apply_layer(&mut target, &layer, BlendMode::Override, 0.5, &bind);
        assert!((target.joint(1).unwrap().translation[0] - 6.0).abs() < 1e-6);
        assert!((target.channel("punch_fire").unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn lerp_uses_bind_for_missing_base_joints() {
        let bind = vec![Transform::from_translation([1.0, 0.0, 0.0]); 3];
        let mut target = PoseBuffer::with_joint_count(3);
        apply_layer(&mut target, &pose_with(2, 3.0), BlendMode::Lerp, 0.5, &bind);
        assert!((target.joint(2).unwrap().translation[0] - 2.0).abs() < 1e-6);
        assert!(!target.is_present(0));
    }

    #[test]
    fn additive_adds_delta_from_bind() {
        let bind = vec![Transform::from_translation([1.0, 0.0, 0.0]); 3];
        let mut target = pose_with(0, 5.0);
        apply_layer(&mut target, &pose_with(0, 3.0), BlendMode::Additive, 0.5, &bind);
        // delta = 3 - 1 = 2, half of it applied on top of 5
        assert!((target.joint(0).unwrap().translation[0] - 6.0).abs() < 1e-6);
    }

    #[test]
    fn zero_weight_leaves_target_untouched() {
        let bind = vec![Transform::IDENTITY; 3];
        let mut target = pose_with(0, 5.0);
        let before = target.clone();
        apply_layer(&mut target, &pose_with(0, 1.0), BlendMode::Override, 0.0, &bind);
        assert_eq!(target, before);
    }

    #[test]
    fn channels_arm_once_per_rising_edge() {
        let mut arms = ChannelArms::default();
        let mut out = Outputs::default();
        out.begin_tick(16);
        let mut pose = PoseBuffer::with_joint_count(1);
        for v in [0.0, 1.0, 1.0, 0.0, 1.0] {
            pose.set_channel("punch_fire", v);
            arms.update(&pose, 0.5, &mut out);
        }
        let armed = out
            .events
            .iter()
            .filter(|e| matches!(e, CoreEvent::ChannelArmed { .. }))
            .count();
        assert_eq!(armed, 2);
    }
}
