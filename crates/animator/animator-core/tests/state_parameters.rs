use animator_core::{
    build_controller_blob_from_json, ClipTable, Config, ControllerBlob, ControllerInstance,
    MotionSampleRequest,
};

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

/// One looping 1 s clip played by a single state carrying `state_fields`.
fn single_state(state_fields: &str) -> (ControllerBlob, ClipTable, ControllerInstance) {
    let json = format!(
        r#"{{
            "name": "Pose",
            "parameters": [
                {{ "name": "SpeedMul", "type": "Float", "default": 1.0 }},
                {{ "name": "Offset", "type": "Float" }},
                {{ "name": "Time", "type": "Float" }},
                {{ "name": "Mirror", "type": "Bool" }}
            ],
            "layers": [{{
                "name": "Base",
                "state_machine": {{
                    "default_state": "Pose",
                    "states": [{{ "name": "Pose", "motion": {{ "clip": 0 }} {state_fields} }}]
                }}
            }}]
        }}"#
    );
    let blob = build_controller_blob_from_json(&json).expect("build single-state blob");
    let clips = ClipTable::from_durations(&[1.0]);
    let inst = ControllerInstance::new(&blob, &Config::default());
    (blob, clips, inst)
}

fn only_request(inst: &ControllerInstance) -> MotionSampleRequest {
    let requests = &inst.outputs().requests;
    assert_eq!(requests.len(), 1);
    requests[0]
}

#[test]
fn speed_parameter_scales_state_time() {
    let (blob, clips, mut inst) = single_state(r#", "speed": 0.5, "speed_parameter": "SpeedMul""#);
    inst.update(&blob, &clips, 0.5);
    approx(only_request(&inst).normalized_time, 0.25, 1e-6);

    inst.parameters_mut().set_float(0, 4.0);
    inst.update(&blob, &clips, 0.5);
    approx(only_request(&inst).normalized_time, 1.25, 1e-6);
    approx(inst.layer_state(&blob, 0).current.current, 1.25, 1e-6);
}

#[test]
fn cycle_offset_parameter_shifts_motion_but_not_state_time() {
    let (blob, clips, mut inst) = single_state(r#", "cycle_offset_parameter": "Offset""#);
    inst.parameters_mut().set_float(1, 0.25);
    inst.update(&blob, &clips, 0.25);
    let request = only_request(&inst);
    approx(request.previous_normalized_time, 0.25, 1e-6);
    approx(request.normalized_time, 0.5, 1e-6);
    approx(inst.layer_state(&blob, 0).current.current, 0.25, 1e-6);
}

#[test]
fn mirror_parameter_flips_requests() {
    let (blob, clips, mut inst) = single_state(r#", "mirror_parameter": "Mirror""#);
    inst.update(&blob, &clips, 0.1);
    assert!(!only_request(&inst).mirrored);
    inst.parameters_mut().set_bool(3, true);
    inst.update(&blob, &clips, 0.1);
    assert!(only_request(&inst).mirrored);

    let (blob, clips, mut inst) = single_state(r#", "mirror": true"#);
    inst.update(&blob, &clips, 0.1);
    assert!(only_request(&inst).mirrored);
}

#[test]
fn time_parameter_drives_motion_while_state_time_advances() {
    let (blob, clips, mut inst) = single_state(r#", "time_parameter": "Time""#);
    inst.parameters_mut().set_float(2, 0.75);
    for _ in 0..3 {
        inst.update(&blob, &clips, 0.25);
        let request = only_request(&inst);
        approx(request.normalized_time, 0.75, 1e-6);
        approx(request.previous_normalized_time, 0.75, 1e-6);
    }
    let clock = inst.layer_state(&blob, 0).current;
    approx(clock.current, 0.75, 1e-6);

    inst.parameters_mut().set_float(2, 0.1);
    inst.update(&blob, &clips, 0.25);
    approx(only_request(&inst).normalized_time, 0.1, 1e-6);
    approx(inst.layer_state(&blob, 0).current.current, 1.0, 1e-6);
}
