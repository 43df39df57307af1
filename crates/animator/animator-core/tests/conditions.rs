use animator_core::{
    build_controller_blob_from_json, ClipTable, Config, ControllerBlob, ControllerInstance,
};

fn two_states(transition: &str) -> ControllerBlob {
    let json = format!(
        r#"{{
            "name": "TwoStates",
            "parameters": [
                {{ "name": "Go", "type": "Bool" }},
                {{ "name": "Amount", "type": "Float" }},
                {{ "name": "Count", "type": "Int", "default": 3 }}
            ],
            "layers": [{{
                "name": "Base",
                "state_machine": {{
                    "default_state": "A",
                    "states": [
                        {{ "name": "A", "motion": {{ "clip": 0 }}, "transitions": [{transition}] }},
                        {{ "name": "B", "motion": {{ "clip": 1 }} }}
                    ]
                }}
            }}]
        }}"#
    );
    build_controller_blob_from_json(&json).expect("build two-state blob")
}

fn active(inst: &ControllerInstance, blob: &ControllerBlob) -> i16 {
    inst.layer_state(blob, 0).active_state()
}

#[test]
fn all_conditions_must_hold() {
    let blob = two_states(
        r#"{ "to": { "state": "B" }, "conditions": [
            { "parameter": "Go", "mode": "If" },
            { "parameter": "Amount", "mode": "Greater", "threshold": 0.5 },
            { "parameter": "Count", "mode": "NotEqual", "threshold": 0 }
        ] }"#,
    );
    let clips = ClipTable::from_durations(&[1.0, 1.0]);
    let mut inst = ControllerInstance::new(&blob, &Config::default());
    assert_eq!(inst.parameters().get_int(2), 3);

    inst.parameters_mut().set_bool(0, true);
    inst.update(&blob, &clips, 0.1);
    assert_eq!(active(&inst, &blob), 0);

    inst.parameters_mut().set_float(1, 0.5);
    inst.update(&blob, &clips, 0.1);
    assert_eq!(active(&inst, &blob), 0, "Greater is strict");

    inst.parameters_mut().set_float(1, 0.75);
    inst.update(&blob, &clips, 0.1);
    assert_eq!(active(&inst, &blob), 1);
}

#[test]
fn exit_time_below_one_rearms_every_loop() {
    let blob = two_states(
        r#"{ "to": { "state": "B" }, "exit_time": 0.5,
             "conditions": [{ "parameter": "Go", "mode": "If" }] }"#,
    );
    let clips = ClipTable::from_durations(&[1.0, 1.0]);
    let mut inst = ControllerInstance::new(&blob, &Config::default());

    // Crosses 0.5 with Go unset.
    inst.update(&blob, &clips, 0.25);
    inst.update(&blob, &clips, 0.25);
    inst.update(&blob, &clips, 0.25);
    inst.parameters_mut().set_bool(0, true);
    // 1.0, 1.25: conditions hold but the gate is closed.
    inst.update(&blob, &clips, 0.25);
    inst.update(&blob, &clips, 0.25);
    assert_eq!(active(&inst, &blob), 0);
    // 1.5: the next loop's crossing.
    inst.update(&blob, &clips, 0.25);
    assert_eq!(active(&inst, &blob), 1);
}

#[test]
fn exit_time_above_one_fires_once() {
    let blob = two_states(r#"{ "to": { "state": "B" }, "exit_time": 1.5 }"#);
    let clips = ClipTable::from_durations(&[1.0, 1.0]);
    let mut inst = ControllerInstance::new(&blob, &Config::default());
    for _ in 0..5 {
        inst.update(&blob, &clips, 0.25);
        assert_eq!(active(&inst, &blob), 0);
    }
    inst.update(&blob, &clips, 0.25);
    assert_eq!(active(&inst, &blob), 1);
}

#[test]
fn fractional_duration_scales_with_source_cycle() {
    let blob = two_states(
        r#"{ "to": { "state": "B" }, "duration": 0.5,
             "conditions": [{ "parameter": "Go", "mode": "If" }] }"#,
    );
    // Source cycle is 2 s, so the cross-fade lasts 1 s.
    let clips = ClipTable::from_durations(&[2.0, 1.0]);
    let mut inst = ControllerInstance::new(&blob, &Config::default());
    inst.parameters_mut().set_bool(0, true);
    inst.update(&blob, &clips, 0.25);
    inst.update(&blob, &clips, 0.25);
    let out = inst.outputs();
    assert_eq!(out.requests.len(), 2);
    assert!((out.requests[1].weight - 0.25).abs() < 1e-5);
}

#[test]
fn running_bool_cross_fade_completes_after_fraction_of_source_cycle() {
    let blob = two_states(
        r#"{ "to": { "state": "B" }, "duration": 0.2,
             "conditions": [{ "parameter": "Go", "mode": "If" }] }"#,
    );
    let clips = ClipTable::from_durations(&[1.0, 1.0]);
    let mut inst = ControllerInstance::new(&blob, &Config::default());

    inst.parameters_mut().set_bool(0, true);
    inst.update(&blob, &clips, 0.1);
    assert_eq!(inst.outputs().transition_events.len(), 1);
    assert_eq!(active(&inst, &blob), 1);

    inst.update(&blob, &clips, 0.1);
    let weights: Vec<f32> = inst.outputs().requests.iter().map(|r| r.weight).collect();
    assert_eq!(weights.len(), 2);
    assert!((weights[0] - 0.5).abs() < 1e-5 && (weights[1] - 0.5).abs() < 1e-5);

    inst.update(&blob, &clips, 0.1);
    let out = inst.outputs();
    assert_eq!(out.requests.len(), 1);
    assert_eq!(out.requests[0].clip, 1);
    assert_eq!(out.requests[0].weight, 1.0);
    assert!(inst.layer_state(&blob, 0).transition.is_none());
}
