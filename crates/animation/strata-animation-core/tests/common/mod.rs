#![allow(dead_code)]

use std::sync::Arc;

use strata_animation_core::{
    parse_clip_json, parse_setup_json, AnimationManager, ClipLibrary, Config, Skeleton, Transform,
};

pub fn init_tracing() {
    let default_filter = "strata_animation_core=debug";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

pub fn approx3(a: [f32; 3], b: [f32; 3], eps: f32) {
    for i in 0..3 {
        assert!((a[i] - b[i]).abs() <= eps, "left={a:?} right={b:?} eps={eps}");
    }
}

pub fn biped() -> Skeleton {
    let json = strata_test_fixtures::skeletons::json("biped").expect("biped fixture");
    Skeleton::from_json(&json).expect("biped skeleton")
}

pub fn biped_library(skeleton: &Skeleton) -> ClipLibrary {
    let mut lib = ClipLibrary::new();
    for name in strata_test_fixtures::clips::in_set("biped") {
        let json = strata_test_fixtures::clips::json(&name).expect("clip fixture");
        let clip = parse_clip_json(&json).expect("clip parses");
        lib.insert(clip, skeleton).expect("clip binds to biped");
    }
    lib
}

/// Manager for the biped with the demo setup (walk/run base, punch and head layers).
pub fn demo_manager(cfg: Config) -> AnimationManager {
    let skeleton = biped();
    let lib = biped_library(&skeleton);
    let mut mgr = AnimationManager::new(skeleton, Arc::new(lib), cfg);
    let setup_json = strata_test_fixtures::setups::json("demo").expect("demo setup fixture");
    let setup = parse_setup_json(&setup_json).expect("demo setup parses");
    mgr.apply_setup(&setup).expect("demo setup applies");
    mgr
}

/// Single-chain skeleton `root -> j1 -> ... ` with identity binds.
pub fn chain(joints: usize) -> Skeleton {
    let joints = (0..joints)
        .map(|i| strata_animation_core::Joint {
            name: format!("j{i}"),
            parent: if i == 0 { None } else { Some(i - 1) },
            bind: Transform::IDENTITY,
        })
        .collect();
    Skeleton::new(joints).expect("chain skeleton")
}

/// Clip moving joint `j0` linearly from `from` to `to` over `duration` seconds.
pub fn translation_clip(name: &str, duration: f32, looping: bool, from: [f32; 3], to: [f32; 3]) -> String {
    format!(
        r#"{{ "name": "{name}", "duration": {duration}, "looping": {looping},
            "joints": [ {{ "joint": "j0", "keys": [
                {{ "time": 0.0, "translation": [{}, {}, {}] }},
                {{ "time": {duration}, "translation": [{}, {}, {}] }}
            ] }} ] }}"#,
        from[0], from[1], from[2], to[0], to[1], to[2]
    )
}

pub fn library(skeleton: &Skeleton, clips: &[String]) -> ClipLibrary {
    let mut lib = ClipLibrary::new();
    for json in clips {
        lib.insert(parse_clip_json(json).expect("clip parses"), skeleton)
            .expect("clip binds");
    }
    lib
}
