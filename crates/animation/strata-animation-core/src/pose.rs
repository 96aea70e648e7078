//! Pose buffers: per-joint local transforms plus named scalar channels.
//!
//! A buffer may be partial (joints absent), which is how inclusive leaves and
//! layers that only touch part of the skeleton express "leave this joint alone".

use hashbrown::HashMap;

use crate::transform::Transform;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoseBuffer {
    locals: Vec<Transform>,
    present: Vec<bool>,
    channels: HashMap<String, f32>,
}

impl PoseBuffer {
    /// Empty buffer sized for `joint_count` joints.
    pub fn with_joint_count(joint_count: usize) -> Self {
        Self {
            locals: vec![Transform::IDENTITY; joint_count],
            present: vec![false; joint_count],
            channels: HashMap::new(),
        }
    }

    /// Full buffer holding the given transforms (e.g. a bind pose).
    pub fn from_transforms(transforms: &[Transform]) -> Self {
        Self {
            locals: transforms.to_vec(),
            present: vec![true; transforms.len()],
            channels: HashMap::new(),
        }
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.locals.len()
    }

    /// Mark every joint and channel absent, keeping allocations.
    pub fn clear(&mut self) {
        self.present.iter_mut().for_each(|p| *p = false);
        self.channels.clear();
    }

    /// Clear and resize for a (possibly different) joint count.
    pub fn reset(&mut self, joint_count: usize) {
        self.locals.resize(joint_count, Transform::IDENTITY);
        self.present.resize(joint_count, false);
        self.clear();
    }

    #[inline]
    pub fn joint(&self, index: usize) -> Option<&Transform> {
        match self.present.get(index) {
            Some(true) => self.locals.get(index),
            _ => None,
        }
    }

    #[inline]
    pub fn is_present(&self, index: usize) -> bool {
        self.present.get(index).copied().unwrap_or(false)
    }

    /// Write a joint transform; out-of-range indices are ignored.
    #[inline]
    pub fn set_joint(&mut self, index: usize, transform: Transform) {
        if let (Some(slot), Some(flag)) = (self.locals.get_mut(index), self.present.get_mut(index))
        {
            *slot = transform;
            *flag = true;
        }
    }

    pub fn present_count(&self) -> usize {
        self.present.iter().filter(|p| **p).count()
    }

    /// Iterate `(joint_index, transform)` for present joints.
    pub fn iter_joints(&self) -> impl Iterator<Item = (usize, &Transform)> {
        self.locals
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.present[*i])
    }

    pub fn channel(&self, name: &str) -> Option<f32> {
        self.channels.get(name).copied()
    }

    pub fn set_channel(&mut self, name: &str, value: f32) {
        if let Some(slot) = self.channels.get_mut(name) {
            *slot = value;
        } else {
            self.channels.insert(name.to_string(), value);
        }
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, f32)> {
        self.channels.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && !self.present.iter().any(|p| *p)
    }

    /// Overwrite this buffer with `other` (joints, presence and channels).
    pub fn copy_from(&mut self, other: &PoseBuffer) {
        self.locals.clone_from(&other.locals);
        self.present.clone_from(&other.present);
        self.channels.clear();
        for (k, v) in other.channels.iter() {
            self.channels.insert(k.clone(), *v);
        }
    }

    /// Copy only the listed joints and channels present in `other`.
    pub fn copy_subset_from(&mut self, other: &PoseBuffer, joints: &[usize], channels: &[String]) {
        for &index in joints {
            if let Some(t) = other.joint(index) {
                self.set_joint(index, *t);
            }
        }
        for name in channels {
            if let Some(v) = other.channel(name) {
                self.set_channel(name, v);
            }
        }
    }

    /// Copy everything present in `other` except the listed joints and channels.
    pub fn copy_excluding_from(
        &mut self,
        other: &PoseBuffer,
        joints: &[usize],
        channels: &[String],
    ) {
        for (index, t) in other.iter_joints() {
            if !joints.contains(&index) {
                self.set_joint(index, *t);
            }
        }
        for (name, v) in other.channels() {
            if !channels.iter().any(|c| c == name) {
                self.set_channel(name, v);
            }
        }
    }

    /// Fill absent joints from `bind`, completing the pose.
    pub fn fill_missing(&mut self, bind: &[Transform]) {
        for (index, bind_t) in bind.iter().enumerate().take(self.locals.len()) {
            if !self.present[index] {
                self.locals[index] = *bind_t;
                self.present[index] = true;
            }
        }
    }

    /// Dense view of local transforms. Only meaningful once the pose is complete.
    pub fn locals(&self) -> &[Transform] {
        &self.locals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_keeps_capacity_but_drops_presence() {
        let mut pose = PoseBuffer::with_joint_count(4);
        pose.set_joint(2, Transform::from_translation([1.0, 0.0, 0.0]));
        pose.set_channel("punch_fire", 1.0);
        assert_eq!(pose.present_count(), 1);
        pose.clear();
        assert!(pose.is_empty());
        assert_eq!(pose.joint_count(), 4);
    }

    #[test]
    fn subset_copy_touches_only_listed_joints() {
        let mut src = PoseBuffer::with_joint_count(4);
        for i in 0..4 {
            src.set_joint(i, Transform::from_translation([i as f32, 0.0, 0.0]));
        }
        src.set_channel("punch_fire", 1.0);
        src.set_channel("other", 2.0);

        let mut dst = PoseBuffer::with_joint_count(4);
        dst.copy_subset_from(&src, &[1, 3], &["punch_fire".to_string()]);
        let present: Vec<usize> = dst.iter_joints().map(|(i, _)| i).collect();
        assert_eq!(present, vec![1, 3]);
        assert_eq!(dst.channel("punch_fire"), Some(1.0));
        assert_eq!(dst.channel("other"), None);
    }

    #[test]
    fn fill_missing_completes_from_bind() {
        let bind = vec![Transform::from_translation([9.0, 0.0, 0.0]); 3];
        let mut pose = PoseBuffer::with_joint_count(3);
        pose.set_joint(1, Transform::IDENTITY);
        pose.fill_missing(&bind);
        assert_eq!(pose.present_count(), 3);
        assert_eq!(pose.joint(0).unwrap().translation[0], 9.0);
        assert_eq!(pose.joint(1).unwrap().translation[0], 0.0);
    }

    #[test]
    fn out_of_range_writes_are_ignored() {
        let mut pose = PoseBuffer::with_joint_count(2);
        pose.set_joint(7, Transform::IDENTITY);
        assert_eq!(pose.present_count(), 0);
        assert!(pose.joint(7).is_none());
    }
}
