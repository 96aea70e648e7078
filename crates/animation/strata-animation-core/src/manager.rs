//! AnimationManager: owns one skeleton's layers and exposes the public API.
//!
//! Methods:
//! - setup: add_animation_layer, add_steady_state, add_attachment, apply_setup, validate, remove_layer
//! - driving: request_transition / trigger_transition, set_blend_weight, leaf toggles, managed writes
//! - update(dt): drain requests → advance layers → evaluate → composite → world pose
//! - queries: joint transforms, channel values, attachment transforms, layer state

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use indexmap::IndexMap;
use tracing::{debug, error, warn};

use crate::attachment::Attachment;
use crate::blend_tree::EvalContext;
use crate::clip::ClipSource;
use crate::composite::{apply_layer, ChannelArms};
use crate::config::Config;
use crate::error::ConfigurationError;
use crate::ids::{IdAllocator, LayerId, StateId};
use crate::inputs::{Inputs, LayerCommand};
use crate::layer::{AnimationLayer, LayerBlend};
use crate::outputs::{CoreEvent, Outputs};
use crate::pose::PoseBuffer;
use crate::scratch::Scratch;
use crate::setup::{build_tree, AnimationSetup, AttachmentConfig, LayerConfig, StateConfig};
use crate::skeleton::Skeleton;
use crate::state::SteadyState;
use crate::transform::Transform;
use crate::transition::TransitionRule;

/// Layer stack for one skeleton instance.
pub struct AnimationManager {
    cfg: Config,
    skeleton: Skeleton,
    source: Arc<dyn ClipSource + Send + Sync>,
    ids: IdAllocator,
    /// Base layer first, then additional layers in insertion (= compositing) order.
    layers: Vec<AnimationLayer>,
    /// Every blend key referenced by a layer or tree, with whether its "unset" warning was logged.
    known_keys: IndexMap<String, bool>,
    blend_values: HashMap<String, f32>,
    attachments: IndexMap<String, Attachment>,
    inputs: Inputs,
    /// Per-layer trigger buffers, parallel to `layers`, reused across ticks.
    requests: Vec<Vec<String>>,
    scratch: Scratch,
    pose: PoseBuffer,
    world: Vec<Transform>,
    arms: ChannelArms,
    outputs: Outputs,
}

impl fmt::Debug for AnimationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationManager")
            .field("cfg", &self.cfg)
            .field("joints", &self.skeleton.joint_count())
            .field(
                "layers",
                &self.layers.iter().map(|l| l.name()).collect::<Vec<_>>(),
            )
            .field("attachments", &self.attachments.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AnimationManager {
    /// Create a manager with its base layer (named `cfg.base_layer_name`).
    pub fn new(skeleton: Skeleton, source: Arc<dyn ClipSource + Send + Sync>, cfg: Config) -> Self {
        let joint_count = skeleton.joint_count();
        let mut ids = IdAllocator::new();
        let base = AnimationLayer::new(
            ids.alloc_layer(),
            cfg.base_layer_name.clone(),
            LayerBlend::default(),
            joint_count,
        );
        let pose = PoseBuffer::from_transforms(skeleton.bind_pose());
        let mut world = Vec::with_capacity(joint_count);
        skeleton.compute_world(pose.locals(), &mut world);
        Self {
            scratch: Scratch::new(&cfg, joint_count),
            cfg,
            skeleton,
            source,
            ids,
            layers: vec![base],
            known_keys: IndexMap::new(),
            blend_values: HashMap::new(),
            attachments: IndexMap::new(),
            inputs: Inputs::default(),
            requests: vec![Vec::new()],
            pose,
            world,
            arms: ChannelArms::default(),
            outputs: Outputs::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn base_layer(&self) -> LayerId {
        self.layers[0].id()
    }

    pub fn layer_id(&self, name: &str) -> Option<LayerId> {
        self.layers.iter().find(|l| l.name() == name).map(|l| l.id())
    }

    pub fn layer(&self, id: LayerId) -> Option<&AnimationLayer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn layers(&self) -> &[AnimationLayer] {
        &self.layers
    }

    fn layer_index(&self, id: LayerId) -> Result<usize, ConfigurationError> {
        self.layers
            .iter()
            .position(|l| l.id() == id)
            .ok_or_else(|| ConfigurationError::UnknownLayer {
                layer: format!("#{}", id.0),
            })
    }

    fn layer_by_name_mut(&mut self, name: &str) -> Option<&mut AnimationLayer> {
        self.layers.iter_mut().find(|l| l.name() == name)
    }

    fn register_key(&mut self, key: &str) {
        if !self.known_keys.contains_key(key) {
            self.known_keys.insert(key.to_string(), false);
        }
    }

    /// Append a layer on top of the existing ones. Names and layer blend keys must be unique.
    pub fn add_animation_layer(&mut self, cfg: LayerConfig) -> Result<LayerId, ConfigurationError> {
        if self.layers.iter().any(|l| l.name() == cfg.name) {
            return Err(ConfigurationError::DuplicateLayer { layer: cfg.name });
        }
        if let Some(key) = &cfg.blend_key {
            if self
                .layers
                .iter()
                .any(|l| l.blend().key.as_deref() == Some(key.as_str()))
            {
                return Err(ConfigurationError::DuplicateBlendKey { key: key.clone() });
            }
        }
        let blend = cfg.blend()?;
        let id = self.ids.alloc_layer();
        if let Some(key) = &blend.key {
            self.register_key(key);
        }
        debug!(layer = %cfg.name, mode = ?blend.mode, weight = blend.weight, "layer added");
        self.layers.push(AnimationLayer::new(
            id,
            cfg.name,
            blend,
            self.skeleton.joint_count(),
        ));
        Ok(id)
    }

    /// Build, validate and append a steady state to `layer`.
    pub fn add_steady_state(
        &mut self,
        layer: LayerId,
        cfg: StateConfig,
    ) -> Result<StateId, ConfigurationError> {
        let index = self.layer_index(layer)?;
        if self.layers[index].has_state(&cfg.name) {
            return Err(ConfigurationError::DuplicateState {
                layer: self.layers[index].name().to_string(),
                state: cfg.name,
            });
        }
        let tree = cfg.source()?;
        let mut node = build_tree(&tree, &self.skeleton, &*self.source)?;

        let mut tmp = self.scratch.acquire_pose();
        if let Err(e) = node.seed_managed(&*self.source, &mut tmp) {
            warn!(state = %cfg.name, error = %e, "managed leaf not seeded; retrying on first evaluation");
        }
        self.scratch.release_pose(tmp);

        let transitions = cfg
            .transitions
            .iter()
            .map(|(trigger, rule)| Ok((trigger.clone(), rule.to_rule()?)))
            .collect::<Result<IndexMap<_, _>, ConfigurationError>>()?;
        let end_transition = match &cfg.end_transition {
            Some(rule) => rule.to_rule()?,
            None => TransitionRule::immediate(cfg.name.clone()),
        };

        let mut keys = Vec::new();
        node.blend_keys(&mut keys);

        let target = &mut self.layers[index];
        let state = SteadyState::new(
            target.next_state_id(),
            cfg.name,
            node,
            transitions,
            end_transition,
        )?;
        debug!(layer = %target.name(), state = %state.name, duration = ?state.duration, "state added");
        let id = target.push_state(state, cfg.default)?;
        for key in keys {
            self.register_key(&key);
        }
        Ok(id)
    }

    pub fn add_attachment(&mut self, cfg: AttachmentConfig) -> Result<(), ConfigurationError> {
        if self.attachments.contains_key(&cfg.name) {
            return Err(ConfigurationError::DuplicateAttachment { name: cfg.name });
        }
        let joint = self.skeleton.require_joint(&cfg.joint)?;
        let offset = cfg.offset.unwrap_or(Transform::IDENTITY);
        if !offset.is_finite() {
            return Err(ConfigurationError::parse(format!(
                "attachment '{}' has a non-finite offset",
                cfg.name
            )));
        }
        self.attachments.insert(
            cfg.name.clone(),
            Attachment {
                name: cfg.name,
                joint,
                joint_name: cfg.joint,
                offset,
                offset_index: cfg.offset_index,
                extra: cfg.extra,
            },
        );
        Ok(())
    }

    /// Check that every transition target names a state in its layer.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.layers.iter().try_for_each(|l| l.validate_targets())
    }

    /// Apply a whole setup: base states, layers with their states, attachments.
    /// Stops at the first error; everything added before it stays in place.
    pub fn apply_setup(&mut self, setup: &AnimationSetup) -> Result<(), ConfigurationError> {
        let base = self.base_layer();
        for state in &setup.base_states {
            self.add_steady_state(base, state.clone())?;
        }
        for layer in &setup.layers {
            let id = self.add_animation_layer(layer.layer_config())?;
            for state in &layer.states {
                self.add_steady_state(id, state.clone())?;
            }
        }
        for attachment in &setup.attachments {
            self.add_attachment(attachment.clone())?;
        }
        self.validate()
    }

    /// Remove a layer and everything it owns. The base layer stays.
    pub fn remove_layer(&mut self, layer: LayerId) -> Result<(), ConfigurationError> {
        if layer == self.base_layer() {
            return Err(ConfigurationError::BaseLayerRemoval);
        }
        let index = self.layer_index(layer)?;
        let removed = self.layers.remove(index);
        if let Some(key) = &removed.blend().key {
            let still_used = self
                .layers
                .iter()
                .flat_map(|l| l.states())
                .any(|s| {
                    let mut keys = Vec::new();
                    s.source.blend_keys(&mut keys);
                    keys.iter().any(|k| k == key)
                });
            if !still_used {
                self.known_keys.shift_remove(key);
            }
        }
        debug!(layer = %removed.name(), "layer removed");
        Ok(())
    }

    /// Queue a trigger for `layer`; applied at the start of the next `update`.
    /// Unknown layers are logged and ignored.
    pub fn request_transition(&mut self, layer: &str, trigger: &str) {
        if !self.layers.iter().any(|l| l.name() == layer) {
            warn!(layer, trigger, "transition requested on unknown layer");
            return;
        }
        self.inputs.push(LayerCommand::RequestTransition {
            layer: layer.to_string(),
            trigger: trigger.to_string(),
        });
    }

    /// Same as [`AnimationManager::request_transition`].
    pub fn trigger_transition(&mut self, layer: &str, trigger: &str) {
        self.request_transition(layer, trigger);
    }

    /// Set a blend key's runtime value. Non-finite values are ignored.
    pub fn set_blend_weight(&mut self, key: &str, value: f32) {
        if !value.is_finite() {
            warn!(key, value, "ignoring non-finite blend weight");
            return;
        }
        if !self.known_keys.contains_key(key) {
            debug!(key, "blend weight set for a key no layer or tree uses");
        }
        if let Some(slot) = self.blend_values.get_mut(key) {
            *slot = value;
        } else {
            self.blend_values.insert(key.to_string(), value);
        }
    }

    pub fn blend_weight(&self, key: &str) -> Option<f32> {
        self.blend_values.get(key).copied()
    }

    /// Toggle every leaf playing `clip` in any state of `layer`. Returns whether any leaf matched.
    pub fn set_clip_active(&mut self, layer: &str, clip: &str, active: bool) -> bool {
        let Some(target) = self.layer_by_name_mut(layer) else {
            warn!(layer, clip, "set_clip_active on unknown layer");
            return false;
        };
        let changed: usize = target
            .states_mut()
            .map(|s| s.source.set_clip_active(clip, active))
            .sum();
        if changed == 0 {
            warn!(layer, clip, "no leaf plays this clip");
        }
        changed > 0
    }

    /// Toggle every clip leaf of one state.
    pub fn set_leaf_active(&mut self, layer: &str, state: &str, active: bool) -> bool {
        let Some(target) = self.layer_by_name_mut(layer) else {
            warn!(layer, state, "set_leaf_active on unknown layer");
            return false;
        };
        match target.state_mut_by_name(state) {
            Some(s) => s.source.set_all_active(active) > 0,
            None => {
                warn!(layer, state, "set_leaf_active on unknown state");
                false
            }
        }
    }

    /// Write a joint of the managed leaf in `layer`/`state`.
    pub fn set_managed_transform(
        &mut self,
        layer: &str,
        state: &str,
        joint: &str,
        transform: Transform,
    ) -> bool {
        let Some(index) = self.skeleton.find_joint(joint) else {
            warn!(joint, "managed write to unknown joint");
            return false;
        };
        if !transform.is_finite() {
            warn!(joint, "ignoring non-finite managed transform");
            return false;
        }
        let managed = self
            .layer_by_name_mut(layer)
            .and_then(|l| l.state_mut_by_name(state))
            .and_then(|s| s.source.managed_mut());
        match managed {
            Some(m) => {
                m.set_joint(index, transform);
                true
            }
            None => {
                warn!(layer, state, "no managed leaf to write");
                false
            }
        }
    }

    /// Step every layer by `dt` seconds and recomposite the skeleton pose.
    pub fn update(&mut self, dt: f32) -> &Outputs {
        self.scratch.begin_frame();
        self.outputs.begin_tick(self.cfg.max_events_per_tick);

        for (key, warned) in self.known_keys.iter_mut() {
            if !*warned && !self.blend_values.contains_key(key) {
                warn!(key = %key, default = self.cfg.default_blend_value, "blend key has no value; using default");
                *warned = true;
            }
        }

        // 1) Drain queued requests in call order and advance each layer.
        self.requests.resize_with(self.layers.len(), Vec::new);
        for command in self.inputs.drain() {
            match command {
                LayerCommand::RequestTransition { layer, trigger } => {
                    match self.layers.iter().position(|l| l.name() == layer) {
                        Some(index) => self.requests[index].push(trigger),
                        None => {
                            warn!(layer = %layer, trigger = %trigger, "layer removed before request was applied");
                        }
                    }
                }
            }
        }
        for (layer, requests) in self.layers.iter_mut().zip(self.requests.iter_mut()) {
            layer.advance(dt, requests, &self.cfg, &mut self.outputs);
            requests.clear();
        }

        // 2) Evaluate each layer; a failing clip source falls back to bind pose for that layer.
        let ctx = EvalContext {
            source: &*self.source,
            blend_values: &self.blend_values,
            default_blend_value: self.cfg.default_blend_value,
        };
        let bind = self.skeleton.bind_pose();
        for layer in self.layers.iter_mut() {
            if let Err(e) = layer.evaluate(&ctx, &mut self.scratch) {
                error!(layer = %layer.name(), error = %e, "clip source failed; using bind pose");
                self.outputs.push_event(CoreEvent::ClipSourceFallback {
                    layer: layer.id(),
                    message: e.to_string(),
                });
                let pose = layer.pose_mut();
                pose.clear();
                for (index, t) in bind.iter().enumerate() {
                    pose.set_joint(index, *t);
                }
            }
        }

        // 3) Composite in insertion order on top of the base layer.
        self.pose.copy_from(self.layers[0].pose());
        for layer in &self.layers[1..] {
            let blend = layer.blend();
            let key_value = match &blend.key {
                Some(k) => self
                    .blend_values
                    .get(k)
                    .copied()
                    .unwrap_or(self.cfg.default_blend_value),
                None => 1.0,
            };
            apply_layer(
                &mut self.pose,
                layer.pose(),
                blend.mode,
                blend.weight * key_value,
                bind,
            );
        }
        self.pose.fill_missing(bind);
        self.skeleton.compute_world(self.pose.locals(), &mut self.world);
        self.arms
            .update(&self.pose, self.cfg.channel_arm_threshold, &mut self.outputs);

        &self.outputs
    }

    /// Events from the last `update`.
    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    /// Final composited local pose (complete after the first update).
    pub fn pose(&self) -> &PoseBuffer {
        &self.pose
    }

    pub fn world_pose(&self) -> &[Transform] {
        &self.world
    }

    pub fn joint_world_transform(&self, joint: &str) -> Option<Transform> {
        let index = self.skeleton.find_joint(joint)?;
        self.world.get(index).copied()
    }

    pub fn joint_local_transform(&self, joint: &str) -> Option<Transform> {
        let index = self.skeleton.find_joint(joint)?;
        self.pose.joint(index).copied()
    }

    pub fn channel_value(&self, channel: &str) -> Option<f32> {
        self.pose.channel(channel)
    }

    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        self.attachments.get(name)
    }

    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.values()
    }

    pub fn attachment_world_transform(&self, name: &str) -> Option<Transform> {
        self.attachments.get(name)?.world_transform(&self.world)
    }

    /// Name of the layer's current state (the fade target while fading).
    pub fn current_state(&self, layer: &str) -> Option<&str> {
        self.layers
            .iter()
            .find(|l| l.name() == layer)?
            .current_state()
            .map(|s| s.name.as_str())
    }

    /// Weight toward the target state while `layer` is fading.
    pub fn transition_weight(&self, layer: &str) -> Option<f32> {
        self.layers
            .iter()
            .find(|l| l.name() == layer)?
            .transition_weight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{parse_clip_json, ClipLibrary};
    use crate::layer::BlendMode;
    use crate::skeleton::Joint;

    fn skeleton() -> Skeleton {
        Skeleton::new(vec![
            Joint {
                name: "root".into(),
                parent: None,
                bind: Transform::IDENTITY,
            },
            Joint {
                name: "hand".into(),
                parent: Some(0),
                bind: Transform::from_translation([0.0, 1.0, 0.0]),
            },
        ])
        .unwrap()
    }

    fn manager() -> AnimationManager {
        let skel = skeleton();
        let mut lib = ClipLibrary::new();
        let clip = parse_clip_json(
            r#"{ "name": "idle", "duration": 1.0, "looping": true,
                 "joints": [ { "joint": "root", "keys": [ { "time": 0.0, "translation": [1, 0, 0] } ] } ] }"#,
        )
        .unwrap();
        lib.insert(clip, &skel).unwrap();
        AnimationManager::new(skel, Arc::new(lib), Config::default())
    }

    #[test]
    fn base_layer_exists_and_cannot_be_removed() {
        let mut mgr = manager();
        assert_eq!(mgr.layers().len(), 1);
        assert_eq!(mgr.layers()[0].name(), "base");
        assert_eq!(
            mgr.remove_layer(mgr.base_layer()),
            Err(ConfigurationError::BaseLayerRemoval)
        );
    }

    #[test]
    fn duplicate_layers_and_blend_keys_are_rejected() {
        let mut mgr = manager();
        let mut cfg = LayerConfig::new("punch", BlendMode::Lerp);
        cfg.blend_key = Some("punch_blend".into());
        mgr.add_animation_layer(cfg.clone()).unwrap();
        assert!(matches!(
            mgr.add_animation_layer(cfg.clone()),
            Err(ConfigurationError::DuplicateLayer { .. })
        ));
        cfg.name = "kick".into();
        assert!(matches!(
            mgr.add_animation_layer(cfg),
            Err(ConfigurationError::DuplicateBlendKey { .. })
        ));
        assert!(matches!(
            mgr.add_animation_layer(LayerConfig::new("base", BlendMode::Override)),
            Err(ConfigurationError::DuplicateLayer { .. })
        ));
    }

    #[test]
    fn unknown_clip_fails_at_setup_and_leaves_manager_usable() {
        let mut mgr = manager();
        let base = mgr.base_layer();
        let err = mgr
            .add_steady_state(base, StateConfig::clip("walk", "nope"))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownClip { .. }));
        mgr.add_steady_state(base, StateConfig::clip("idle", "idle"))
            .unwrap();
        mgr.update(0.1);
        assert_eq!(mgr.current_state("base"), Some("idle"));
        let root = mgr.joint_local_transform("root").unwrap();
        assert_eq!(root.translation, [1.0, 0.0, 0.0]);
        // hand is untouched by the clip and falls back to bind pose
        assert_eq!(
            mgr.joint_world_transform("hand").unwrap().translation,
            [1.0, 1.0, 0.0]
        );
    }

    #[test]
    fn request_buffers_are_reused_across_ticks() {
        let mut mgr = manager();
        let base = mgr.base_layer();
        mgr.add_steady_state(base, StateConfig::clip("idle", "idle"))
            .unwrap();
        mgr.add_animation_layer(LayerConfig::new("upper", BlendMode::Lerp))
            .unwrap();
        mgr.request_transition("base", "wave");
        mgr.request_transition("upper", "nod");
        mgr.update(0.1);
        assert_eq!(mgr.requests.len(), 2);
        assert!(mgr.requests.iter().all(|r| r.is_empty()));
        let capacity = mgr.requests[0].capacity();
        assert!(capacity > 0);
        mgr.request_transition("base", "wave");
        mgr.update(0.1);
        assert_eq!(mgr.requests[0].capacity(), capacity);
        // Each trigger was routed to its own layer only.
        let ignored: Vec<_> = mgr
            .outputs()
            .events
            .iter()
            .filter_map(|e| match e {
                CoreEvent::TriggerIgnored { trigger, .. } => Some(trigger.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ignored, ["wave"]);
    }

    #[test]
    fn validate_reports_unknown_targets() {
        let mut mgr = manager();
        let base = mgr.base_layer();
        mgr.add_steady_state(
            base,
            StateConfig::clip("idle", "idle")
                .with_transition("go", crate::setup::TransitionRuleConfig::immediate("missing")),
        )
        .unwrap();
        assert!(matches!(
            mgr.validate(),
            Err(ConfigurationError::UnknownState { .. })
        ));
    }

    #[test]
    fn attachments_follow_their_joint() {
        let mut mgr = manager();
        let base = mgr.base_layer();
        mgr.add_steady_state(base, StateConfig::clip("idle", "idle"))
            .unwrap();
        mgr.add_attachment(AttachmentConfig {
            name: "weapon".into(),
            joint: "hand".into(),
            offset_index: 0,
            offset: Some(Transform::from_translation([0.0, 0.0, 0.5])),
            extra: None,
        })
        .unwrap();
        mgr.update(0.0);
        let t = mgr.attachment_world_transform("weapon").unwrap();
        assert_eq!(t.translation, [1.0, 1.0, 0.5]);
        assert!(matches!(
            mgr.add_attachment(AttachmentConfig {
                name: "other".into(),
                joint: "tail".into(),
                offset_index: 0,
                offset: None,
                extra: None,
            }),
            Err(ConfigurationError::UnknownJoint { .. })
        ));
    }
}
