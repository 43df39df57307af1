use animator_core::{
    build_controller_blob_from_json, ClipTable, Config, ControllerBlob, ControllerInstance,
    LayerBlendMode, MotionSampleRequest,
};

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

fn setup(name: &str) -> (ControllerBlob, ClipTable, ControllerInstance) {
    let json = animator_test_fixtures::controllers::json(name).expect("load controller fixture");
    let blob = build_controller_blob_from_json(&json).expect("build blob");
    let set = animator_test_fixtures::clips::path("humanoid").expect("clip set path");
    assert!(set.exists());
    let clips: ClipTable = animator_test_fixtures::clips::load("humanoid").expect("load humanoid clips");
    let inst = ControllerInstance::new(&blob, &Config::default());
    (blob, clips, inst)
}

fn request(requests: &[MotionSampleRequest], layer: u16, clip: u16) -> MotionSampleRequest {
    *requests
        .iter()
        .find(|r| r.layer == layer && r.clip == clip)
        .unwrap_or_else(|| panic!("no request for clip {clip} on layer {layer}"))
}

#[test]
fn one_d_and_directional_trees_split_weight() {
    let (blob, clips, mut inst) = setup("locomotion");
    let params = inst.parameters_mut();
    params.set_float(blob.find_parameter_by_name("Speed").unwrap(), 0.5);
    params.set_float(blob.find_parameter_by_name("AimX").unwrap(), 0.5);
    params.set_float(blob.find_parameter_by_name("AimY").unwrap(), 0.5);
    inst.update(&blob, &clips, 0.25);

    let out = inst.outputs();
    assert_eq!(out.requests.len(), 4);
    approx(out.layer_weight_sum(0), 1.0, 1e-5);
    approx(out.layer_weight_sum(1), 1.0, 1e-5);

    let idle = request(&out.requests, 0, 0);
    let walk = request(&out.requests, 0, 1);
    approx(idle.weight, 0.5, 1e-5);
    approx(walk.weight, 0.5, 1e-5);
    // Weighted tree duration is 1 s.
    approx(walk.normalized_time, 0.25, 1e-5);
    // Additive layers do not cover the base layer.
    approx(walk.effective_weight, 0.5, 1e-5);

    let right = request(&out.requests, 1, 7);
    let up = request(&out.requests, 1, 8);
    approx(right.weight, 0.5, 1e-4);
    approx(up.weight, 0.5, 1e-4);
    assert_eq!(right.blend, LayerBlendMode::Additive);
}

#[test]
fn blend_tree_clip_fires_authored_event() {
    let (blob, clips, mut inst) = setup("locomotion");
    let speed = blob.find_parameter_by_name("Speed").unwrap();
    inst.parameters_mut().set_float(speed, 1.0);

    inst.update(&blob, &clips, 0.25);
    assert!(inst.outputs().clip_events.is_empty());

    inst.update(&blob, &clips, 0.25);
    let events = &inst.outputs().clip_events;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].clip, 1);
    assert_eq!(events[0].name_hash, 1001);
    approx(events[0].weight, 1.0, 1e-5);

    inst.update(&blob, &clips, 0.25);
    assert!(inst.outputs().clip_events.is_empty());
}

#[test]
fn sync_layer_shares_state_and_blends_timing() {
    let (blob, clips, mut inst) = setup("sync-layers");
    inst.update(&blob, &clips, 0.25);

    let out = inst.outputs();
    assert_eq!(out.requests.len(), 2);
    // Idle 1 s lerped halfway toward Limp 1.5 s.
    let base = request(&out.requests, 0, 0);
    let hurt = request(&out.requests, 1, 5);
    approx(base.normalized_time, 0.2, 1e-5);
    approx(hurt.normalized_time, 0.2, 1e-5);
    approx(hurt.layer_weight, 0.5, 1e-6);
    approx(hurt.effective_weight, 0.5, 1e-6);
    // The unmasked override layer above covers half of the base layer.
    approx(base.effective_weight, 0.5, 1e-6);

    // Both layers follow the shared machine into Run.
    inst.parameters_mut()
        .set_float(blob.find_parameter_by_name("Speed").unwrap(), 1.0);
    inst.update(&blob, &clips, 0.25);
    let out = inst.outputs();
    request(&out.requests, 0, 2);
    request(&out.requests, 1, 6);
}

#[test]
fn sync_layer_weight_zero_restores_base_timing() {
    let (blob, clips, mut inst) = setup("sync-layers");
    inst.set_layer_weight(1, 0.0);
    inst.set_layer_weight(0, 0.25);
    assert_eq!(inst.layer_weight(0), 1.0);

    inst.update(&blob, &clips, 0.25);
    let out = inst.outputs();
    assert_eq!(out.requests.len(), 1);
    let base = request(&out.requests, 0, 0);
    approx(base.normalized_time, 0.25, 1e-5);
    approx(base.effective_weight, 1.0, 1e-6);
}

#[test]
fn controller_speed_scales_time() {
    let (blob, clips, mut inst) = setup("sync-layers");
    inst.set_layer_weight(1, 0.0);
    inst.set_speed(2.0);
    inst.update(&blob, &clips, 0.25);
    approx(inst.outputs().requests[0].normalized_time, 0.5, 1e-5);
}

#[test]
fn direct_tree_uses_raw_parameter_weights() {
    let json = r#"{
        "name": "Faces",
        "parameters": [
            { "name": "Smile", "type": "Float" },
            { "name": "Blink", "type": "Float" }
        ],
        "blend_trees": [{
            "name": "Face",
            "type": "Direct",
            "children": [
                { "motion": { "clip": 0 }, "parameter": "Smile" },
                { "motion": { "clip": 4 }, "parameter": "Blink" }
            ]
        }],
        "layers": [{
            "name": "Base",
            "state_machine": {
                "default_state": "Face",
                "states": [{ "name": "Face", "motion": { "blend_tree": "Face" } }]
            }
        }]
    }"#;
    let blob = build_controller_blob_from_json(json).expect("build direct blob");
    let clips: ClipTable = animator_test_fixtures::clips::load("humanoid").expect("load humanoid clips");
    let mut inst = ControllerInstance::new(&blob, &Config::default());
    inst.parameters_mut().set_float(0, 0.3);
    inst.parameters_mut().set_float(1, 0.9);
    inst.update(&blob, &clips, 0.1);

    let out = inst.outputs();
    approx(request(&out.requests, 0, 0).weight, 0.3, 1e-6);
    approx(request(&out.requests, 0, 4).weight, 0.9, 1e-6);

    // Changing one child leaves the other untouched.
    inst.parameters_mut().set_float(1, 0.1);
    inst.update(&blob, &clips, 0.1);
    let out = inst.outputs();
    approx(request(&out.requests, 0, 0).weight, 0.3, 1e-6);
    approx(request(&out.requests, 0, 4).weight, 0.1, 1e-6);
}
