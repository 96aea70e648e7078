//! Blend-tree nodes and their evaluator.
//!
//! Leaves sample the clip source (whole clip, inclusive subset, exclusive
//! complement) or hold an externally driven pose; `WeightedBlend` nodes mix
//! their children with per-joint normalized weights. All clip and joint
//! references are resolved when the tree is built, so evaluation only fails if
//! the clip source itself fails.

use hashbrown::HashMap;

use crate::clip::ClipSource;
use crate::error::ClipSourceError;
use crate::pose::PoseBuffer;
use crate::sampling::clip_local_time;
use crate::scratch::Scratch;
use crate::transform::Transform;

/// Read-only inputs shared by every node during one evaluation.
pub struct EvalContext<'a> {
    pub source: &'a dyn ClipSource,
    pub blend_values: &'a HashMap<String, f32>,
    pub default_blend_value: f32,
}

impl EvalContext<'_> {
    /// Current value of a blend key; unkeyed weights and unset keys use the default.
    pub fn blend_value(&self, key: Option<&str>) -> f32 {
        match key {
            Some(k) => self
                .blend_values
                .get(k)
                .copied()
                .unwrap_or(self.default_blend_value),
            None => 1.0,
        }
    }
}

/// Plays one clip, optionally gated by `active`.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipLeaf {
    pub clip: String,
    pub duration: f32,
    pub looping: bool,
    pub time_scale: f32,
    pub active: bool,
}

impl ClipLeaf {
    fn local_time(&self, state_time: f32) -> f32 {
        clip_local_time(state_time * self.time_scale, self.duration, self.looping)
    }

    /// Time in state seconds for one pass through the clip.
    pub fn state_duration(&self) -> f32 {
        self.duration / self.time_scale.abs().max(f32::EPSILON)
    }
}

/// A clip restricted to (inclusive) or stripped of (exclusive) a joint/channel set.
#[derive(Clone, Debug, PartialEq)]
pub struct FilteredClipLeaf {
    pub leaf: ClipLeaf,
    pub joints: Vec<usize>,
    pub channels: Vec<String>,
}

/// Reference pose used to seed a managed leaf before any external write.
#[derive(Clone, Debug, PartialEq)]
pub struct ManagedInit {
    pub clip: String,
    pub joints: Vec<usize>,
}

/// Pose owned by an external driver (look-at, IK, procedural motion).
#[derive(Clone, Debug, PartialEq)]
pub struct ManagedLeaf {
    pose: PoseBuffer,
    init: Option<ManagedInit>,
    seeded: bool,
}

impl ManagedLeaf {
    pub fn new(joint_count: usize, init: Option<ManagedInit>) -> Self {
        Self {
            pose: PoseBuffer::with_joint_count(joint_count),
            seeded: init.is_none(),
            init,
        }
    }

    /// Fill joints not yet written externally from the init clip at time 0.
    pub fn seed(
        &mut self,
        source: &dyn ClipSource,
        tmp: &mut PoseBuffer,
    ) -> Result<(), ClipSourceError> {
        if self.seeded {
            return Ok(());
        }
        let Some(init) = &self.init else {
            self.seeded = true;
            return Ok(());
        };
        tmp.clear();
        source.sample(&init.clip, 0.0, tmp)?;
        for &index in &init.joints {
            if self.pose.is_present(index) {
                continue;
            }
            if let Some(t) = tmp.joint(index) {
                self.pose.set_joint(index, *t);
            }
        }
        self.seeded = true;
        Ok(())
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn set_joint(&mut self, index: usize, transform: Transform) {
        self.pose.set_joint(index, transform);
    }

    pub fn set_channel(&mut self, name: &str, value: f32) {
        self.pose.set_channel(name, value);
    }

    pub fn pose(&self) -> &PoseBuffer {
        &self.pose
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WeightedChild {
    pub weight: f32,
    /// Optional blend key multiplied into `weight` each frame.
    pub key: Option<String>,
    pub node: BlendNode,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BlendNode {
    Clip(ClipLeaf),
    InclusiveClip(FilteredClipLeaf),
    ExclusiveClip(FilteredClipLeaf),
    Managed(ManagedLeaf),
    WeightedBlend(Vec<WeightedChild>),
}

fn sample_filtered(
    ctx: &EvalContext<'_>,
    f: &FilteredClipLeaf,
    time: f32,
    inclusive: bool,
    out: &mut PoseBuffer,
    scratch: &mut Scratch,
) -> Result<bool, ClipSourceError> {
    if !f.leaf.active {
        return Ok(false);
    }
    let mut tmp = scratch.acquire_pose();
    let sampled = ctx
        .source
        .sample(&f.leaf.clip, f.leaf.local_time(time), &mut tmp);
    if sampled.is_ok() {
        if inclusive {
            out.copy_subset_from(&tmp, &f.joints, &f.channels);
        } else {
            out.copy_excluding_from(&tmp, &f.joints, &f.channels);
        }
    }
    scratch.release_pose(tmp);
    sampled?;
    Ok(!out.is_empty())
}

impl BlendNode {
    /// Evaluate at state-local `time` into `out` (cleared first).
    /// Returns whether the node contributed anything.
    pub fn evaluate(
        &mut self,
        ctx: &EvalContext<'_>,
        time: f32,
        out: &mut PoseBuffer,
        scratch: &mut Scratch,
    ) -> Result<bool, ClipSourceError> {
        out.clear();
        match self {
            BlendNode::Clip(leaf) => {
                if !leaf.active {
                    return Ok(false);
                }
                ctx.source.sample(&leaf.clip, leaf.local_time(time), out)?;
                Ok(true)
            }
            BlendNode::InclusiveClip(f) => sample_filtered(ctx, f, time, true, out, scratch),
            BlendNode::ExclusiveClip(f) => sample_filtered(ctx, f, time, false, out, scratch),
            BlendNode::Managed(m) => {
                if !m.is_seeded() {
                    let mut tmp = scratch.acquire_pose();
                    let seeded = m.seed(ctx.source, &mut tmp);
                    scratch.release_pose(tmp);
                    seeded?;
                }
                out.copy_from(&m.pose);
                Ok(!out.is_empty())
            }
            BlendNode::WeightedBlend(children) => {
                let mut acc = scratch.acquire_accumulator();
                let mut tmp = scratch.acquire_pose();
                let mut result = Ok(());
                for child in children.iter_mut() {
                    let weight = child.weight * ctx.blend_value(child.key.as_deref());
                    match child.node.evaluate(ctx, time, &mut tmp, scratch) {
                        Ok(true) => acc.add_pose(&tmp, weight),
                        Ok(false) => {}
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    }
                }
                let wrote = result.is_ok() && acc.finalize_into(out);
                scratch.release_pose(tmp);
                scratch.release_accumulator(acc);
                result?;
                Ok(wrote)
            }
        }
    }

    /// Longest single-pass duration (state seconds) over the tree's clip leaves.
    /// `None` for trees made only of managed leaves.
    pub fn duration(&self) -> Option<f32> {
        match self {
            BlendNode::Clip(leaf) => Some(leaf.state_duration()),
            BlendNode::InclusiveClip(f) | BlendNode::ExclusiveClip(f) => {
                Some(f.leaf.state_duration())
            }
            BlendNode::Managed(_) => None,
            BlendNode::WeightedBlend(children) => children
                .iter()
                .filter_map(|c| c.node.duration())
                .fold(None, |acc: Option<f32>, d| Some(acc.map_or(d, |a| a.max(d)))),
        }
    }

    /// Flip `active` on every clip leaf playing `clip`. Returns how many changed.
    pub fn set_clip_active(&mut self, clip: &str, active: bool) -> usize {
        match self {
            BlendNode::Clip(leaf) if leaf.clip == clip => {
                leaf.active = active;
                1
            }
            BlendNode::InclusiveClip(f) | BlendNode::ExclusiveClip(f) if f.leaf.clip == clip => {
                f.leaf.active = active;
                1
            }
            BlendNode::WeightedBlend(children) => children
                .iter_mut()
                .map(|c| c.node.set_clip_active(clip, active))
                .sum(),
            _ => 0,
        }
    }

    /// Flip `active` on every clip leaf in the tree.
    pub fn set_all_active(&mut self, active: bool) -> usize {
        match self {
            BlendNode::Clip(leaf) => {
                leaf.active = active;
                1
            }
            BlendNode::InclusiveClip(f) | BlendNode::ExclusiveClip(f) => {
                f.leaf.active = active;
                1
            }
            BlendNode::Managed(_) => 0,
            BlendNode::WeightedBlend(children) => children
                .iter_mut()
                .map(|c| c.node.set_all_active(active))
                .sum(),
        }
    }

    /// First managed leaf in depth-first order.
    pub fn managed_mut(&mut self) -> Option<&mut ManagedLeaf> {
        match self {
            BlendNode::Managed(m) => Some(m),
            BlendNode::WeightedBlend(children) => {
                children.iter_mut().find_map(|c| c.node.managed_mut())
            }
            _ => None,
        }
    }

    /// Seed every managed leaf that has not been seeded yet.
    pub fn seed_managed(
        &mut self,
        source: &dyn ClipSource,
        tmp: &mut PoseBuffer,
    ) -> Result<(), ClipSourceError> {
        match self {
            BlendNode::Managed(m) => m.seed(source, tmp),
            BlendNode::WeightedBlend(children) => children
                .iter_mut()
                .try_for_each(|c| c.node.seed_managed(source, tmp)),
            _ => Ok(()),
        }
    }

    /// Blend keys referenced by weighted children.
    pub fn blend_keys(&self, out: &mut Vec<String>) {
        if let BlendNode::WeightedBlend(children) = self {
            for child in children {
                if let Some(key) = &child.key {
                    out.push(key.clone());
                }
                child.node.blend_keys(out);
            }
        }
    }
}
