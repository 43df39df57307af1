use std::sync::Arc;

use animator_core::{
    build_controller_blob_from_json, ClipTable, Config, ControllerInstance, Engine, Inputs,
    SharedClips,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn load(name: &str) -> (String, ClipTable) {
    let json = animator_test_fixtures::controllers::json(name).expect("load controller fixture");
    let clips = animator_test_fixtures::clips::load("humanoid").expect("load humanoid clips");
    (json, clips)
}

fn bench_instance_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("instance_step");
    for name in ["idle-run", "locomotion", "sync-layers", "nested"] {
        let (json, clips) = load(name);
        let blob = build_controller_blob_from_json(&json).expect("build blob");
        let mut inst = ControllerInstance::new(&blob, &Config::default());
        if let Some(speed) = blob.find_parameter_by_name("Speed") {
            inst.parameters_mut().set_float(speed, 0.75);
        }
        group.bench_with_input(BenchmarkId::from_parameter(name), &blob, |b, blob| {
            b.iter(|| {
                inst.update(blob, &clips, black_box(1.0 / 60.0));
                black_box(inst.outputs().requests.len())
            })
        });
    }
    group.finish();
}

fn bench_engine_step(c: &mut Criterion) {
    let (json, clips) = load("locomotion");
    let clips: SharedClips = Arc::new(clips);
    let mut group = c.benchmark_group("engine_step");
    for count in [16usize, 256] {
        let mut engine = Engine::new(Config::default());
        let id = engine.load_controller_json(&json, clips.clone()).expect("build blob");
        for _ in 0..count {
            engine.add_instance(id);
        }
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| engine.update(black_box(1.0 / 60.0), Inputs::default()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_instance_step, bench_engine_step);
criterion_main!(benches);
