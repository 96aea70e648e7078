mod common;

use std::sync::Arc;

use common::{approx3, chain, init_tracing, library, translation_clip};
use strata_animation_core::{
    parse_setup_json, AnimationManager, BlendMode, ClipInfo, ClipLibrary, ClipSource,
    ClipSourceError, Config, CoreEvent, LayerConfig, PoseBuffer, StateConfig,
};

fn clips() -> Vec<String> {
    vec![
        translation_clip("walk", 1.0, true, [0.0, 0.0, 0.0], [1.0, 0.0, 0.0]),
        translation_clip("still", 1.0, true, [5.0, 5.0, 5.0], [5.0, 5.0, 5.0]),
        translation_clip("lift", 1.0, true, [0.0, 7.0, 0.0], [0.0, 7.0, 0.0]),
        translation_clip("push", 1.0, true, [0.0, 0.0, 9.0], [0.0, 0.0, 9.0]),
        translation_clip("nudge", 1.0, true, [0.0, 2.0, 0.0], [0.0, 2.0, 0.0]),
        translation_clip("far", 1.0, true, [4.0, 0.0, 0.0], [4.0, 0.0, 0.0]),
    ]
}

fn manager(base_clip: &str) -> AnimationManager {
    let skeleton = chain(2);
    let lib = library(&skeleton, &clips());
    let mut mgr = AnimationManager::new(skeleton, Arc::new(lib), Config::default());
    let base = mgr.base_layer();
    mgr.add_steady_state(base, StateConfig::clip("base", base_clip))
        .unwrap();
    mgr
}

fn add_layer(mgr: &mut AnimationManager, name: &str, mode: BlendMode, weight: f32, clip: &str) {
    let mut cfg = LayerConfig::new(name, mode);
    cfg.blend_weight = weight;
    let id = mgr.add_animation_layer(cfg).unwrap();
    mgr.add_steady_state(id, StateConfig::clip(name, clip)).unwrap();
}

fn j0(mgr: &AnimationManager) -> [f32; 3] {
    mgr.joint_local_transform("j0").unwrap().translation
}

#[test]
fn override_ignores_whatever_is_underneath() {
    init_tracing();
    for base in ["walk", "still", "far"] {
        let mut mgr = manager(base);
        add_layer(&mut mgr, "over", BlendMode::Override, 1.0, "lift");
        mgr.update(0.4);
        assert_eq!(j0(&mgr), [0.0, 7.0, 0.0], "base clip {base}");
        // j1 is untouched by every clip and stays at bind.
        assert_eq!(
            mgr.joint_local_transform("j1").unwrap().translation,
            [0.0, 0.0, 0.0]
        );
    }
}

#[test]
fn override_follows_its_blend_key() {
    let mut mgr = manager("still");
    let mut cfg = LayerConfig::new("look", BlendMode::Override);
    cfg.blend_key = Some("look_blend".into());
    let id = mgr.add_animation_layer(cfg).unwrap();
    mgr.add_steady_state(id, StateConfig::clip("look", "lift")).unwrap();

    mgr.set_blend_weight("look_blend", 0.5);
    mgr.update(0.0);
    approx3(j0(&mgr), [2.5, 6.0, 2.5], 1e-5);

    mgr.set_blend_weight("look_blend", 1.0);
    mgr.update(0.0);
    assert_eq!(j0(&mgr), [0.0, 7.0, 0.0]);
}

#[test]
fn later_layers_win_on_shared_joints() {
    let mut mgr = manager("walk");
    add_layer(&mut mgr, "first", BlendMode::Override, 1.0, "lift");
    add_layer(&mut mgr, "second", BlendMode::Override, 1.0, "push");
    mgr.update(0.1);
    assert_eq!(j0(&mgr), [0.0, 0.0, 9.0]);
}

#[test]
fn lerp_layer_weight_scales_with_its_blend_key() {
    let mut mgr = manager("still");
    let mut cfg = LayerConfig::new("lean", BlendMode::Lerp);
    cfg.blend_key = Some("lean_blend".into());
    let id = mgr.add_animation_layer(cfg).unwrap();
    mgr.add_steady_state(id, StateConfig::clip("lean", "far")).unwrap();

    // Unset keys fall back to the configured default (1.0).
    mgr.update(0.0);
    approx3(j0(&mgr), [4.0, 0.0, 0.0], 1e-6);

    mgr.set_blend_weight("lean_blend", 0.25);
    mgr.update(0.0);
    approx3(j0(&mgr), [4.75, 3.75, 3.75], 1e-5);

    mgr.set_blend_weight("lean_blend", 0.0);
    mgr.update(0.0);
    approx3(j0(&mgr), [5.0, 5.0, 5.0], 1e-6);
    assert_eq!(mgr.blend_weight("lean_blend"), Some(0.0));
}

#[test]
fn additive_layer_adds_its_delta_from_bind() {
    let mut mgr = manager("still");
    add_layer(&mut mgr, "breath", BlendMode::Additive, 0.5, "nudge");
    mgr.update(0.0);
    approx3(j0(&mgr), [5.0, 6.0, 5.0], 1e-6);
}

#[test]
fn weighted_tree_normalizes_child_weights() {
    let skeleton = chain(2);
    let lib = library(&skeleton, &clips());
    let mut mgr = AnimationManager::new(skeleton, Arc::new(lib), Config::default());
    let setup = parse_setup_json(
        r#"{ "baseStates": [ { "name": "mix", "tree": { "weightedBlend": { "children": [
            { "blendKey": "a", "node": { "clip": { "name": "push" } } },
            { "blendKey": "b", "node": { "clip": { "name": "far" } } }
        ] } } } ] }"#,
    )
    .unwrap();
    mgr.apply_setup(&setup).unwrap();
    mgr.set_blend_weight("a", 1.0);
    mgr.set_blend_weight("b", 3.0);
    mgr.update(0.0);
    approx3(j0(&mgr), [3.0, 0.0, 2.25], 1e-5);
}

/// Library wrapper whose "broken" clip advertises itself but never samples.
struct Flaky {
    inner: ClipLibrary,
}

impl ClipSource for Flaky {
    fn clip_info(&self, clip: &str) -> Option<ClipInfo> {
        if clip == "broken" {
            return Some(ClipInfo {
                name: "broken".into(),
                duration: 1.0,
                looping: true,
                joints: vec!["j0".into()],
                channels: Vec::new(),
            });
        }
        self.inner.clip_info(clip)
    }

    fn sample(&self, clip: &str, time: f32, out: &mut PoseBuffer) -> Result<(), ClipSourceError> {
        if clip == "broken" {
            return Err(ClipSourceError::MissingSamples {
                clip: clip.to_string(),
                reason: "stream closed".into(),
            });
        }
        self.inner.sample(clip, time, out)
    }
}

#[test]
fn failing_clip_falls_back_to_bind_for_that_layer_only() {
    init_tracing();
    let skeleton = chain(2);
    let inner = library(&skeleton, &clips());
    let mut mgr = AnimationManager::new(skeleton, Arc::new(Flaky { inner }), Config::default());
    let base = mgr.base_layer();
    mgr.add_steady_state(base, StateConfig::clip("base", "walk"))
        .unwrap();
    add_layer(&mut mgr, "bad", BlendMode::Lerp, 1.0, "broken");
    let bad = mgr.layer_id("bad").unwrap();

    let out = mgr.update(0.5);
    assert!(out
        .events
        .iter()
        .any(|e| matches!(e, CoreEvent::ClipSourceFallback { layer, .. } if *layer == bad)));
    // The failing layer composites as bind pose on top of walk.
    assert_eq!(j0(&mgr), [0.0, 0.0, 0.0]);
    let base_pose = mgr.layer(mgr.base_layer()).unwrap().pose();
    approx3(base_pose.joint(0).unwrap().translation, [0.5, 0.0, 0.0], 1e-6);

    add_layer(&mut mgr, "good", BlendMode::Override, 1.0, "push");
    mgr.update(0.1);
    assert_eq!(j0(&mgr), [0.0, 0.0, 9.0]);
}
