use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_animation_core::{
    parse_clip_json, parse_setup_json, AnimationManager, ClipLibrary, Config, Skeleton,
};

fn demo_manager() -> AnimationManager {
    let skeleton = Skeleton::from_json(&strata_test_fixtures::skeletons::json("biped").unwrap())
        .unwrap();
    let mut lib = ClipLibrary::new();
    for name in strata_test_fixtures::clips::in_set("biped") {
        let clip = parse_clip_json(&strata_test_fixtures::clips::json(&name).unwrap()).unwrap();
        lib.insert(clip, &skeleton).unwrap();
    }
    let mut mgr = AnimationManager::new(skeleton, Arc::new(lib), Config::default());
    let setup = parse_setup_json(&strata_test_fixtures::setups::json("demo").unwrap()).unwrap();
    mgr.apply_setup(&setup).unwrap();
    mgr.set_blend_weight("punch_blend", 1.0);
    mgr.set_blend_weight("head_blend", 0.5);
    mgr
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");
    for punch in [false, true] {
        let mut mgr = demo_manager();
        mgr.set_clip_active("punch", "skeleton.punch", punch);
        group.bench_with_input(BenchmarkId::new("demo_60hz", punch), &punch, |b, _| {
            b.iter(|| {
                let out = mgr.update(black_box(1.0 / 60.0));
                black_box(out.events.len());
            })
        });
    }
    group.finish();
}

fn bench_fade(c: &mut Criterion) {
    c.bench_function("update/walk_run_fade", |b| {
        let mut mgr = demo_manager();
        let mut tick = 0u32;
        b.iter(|| {
            // Re-trigger each half second so most ticks run inside a fade.
            if tick % 30 == 0 {
                let trigger = if (tick / 30) % 2 == 0 { "run" } else { "walk" };
                mgr.request_transition("base", trigger);
            }
            tick = tick.wrapping_add(1);
            black_box(mgr.update(1.0 / 60.0).events.len());
        })
    });
}

criterion_group!(benches, bench_step, bench_fade);
criterion_main!(benches);
