//! Scratch buffers and frame lifecycle.
//!
//! Blend-tree evaluation and layer fades need temporary poses; they borrow them
//! from this pool and hand them back, so steady-state frames allocate nothing.

use crate::accumulate::PoseAccumulator;
use crate::config::Config;
use crate::pose::PoseBuffer;

#[derive(Debug, Default)]
pub struct Scratch {
    joint_count: usize,
    poses: Vec<PoseBuffer>,
    accumulators: Vec<PoseAccumulator>,
}

impl Scratch {
    pub fn new(cfg: &Config, joint_count: usize) -> Self {
        let poses = (0..cfg.scratch_poses)
            .map(|_| PoseBuffer::with_joint_count(joint_count))
            .collect();
        Self {
            joint_count,
            poses,
            accumulators: Vec::new(),
        }
    }

    #[inline]
    pub fn begin_frame(&mut self) {
        // Buffers are cleared on acquire; nothing to reset between frames.
    }

    /// Borrow a cleared pose sized for the skeleton.
    pub fn acquire_pose(&mut self) -> PoseBuffer {
        match self.poses.pop() {
            Some(mut pose) => {
                pose.reset(self.joint_count);
                pose
            }
            None => PoseBuffer::with_joint_count(self.joint_count),
        }
    }

    pub fn release_pose(&mut self, pose: PoseBuffer) {
        self.poses.push(pose);
    }

    pub fn acquire_accumulator(&mut self) -> PoseAccumulator {
        match self.accumulators.pop() {
            Some(mut acc) => {
                acc.reset(self.joint_count);
                acc
            }
            None => PoseAccumulator::new(self.joint_count),
        }
    }

    pub fn release_accumulator(&mut self, acc: PoseAccumulator) {
        self.accumulators.push(acc);
    }

    /// Number of idle pooled poses (diagnostics/tests).
    pub fn pooled_poses(&self) -> usize {
        self.poses.len()
    }
}
