//! Per-instance controller runtime and layer composition.
//!
//! An instance owns everything mutable about one animated character: parameter
//! values, layer weights, one [`StateMachineState`] per state machine of the blob
//! (sync layers share the record of the machine they reuse), its outputs and its
//! scratch buffers. The blob and the clip source are borrowed for each update.

use crate::blend_tree::{motion_duration, resolve_motion, BlendContext};
use crate::blob::{ControllerBlob, Layer, StateMachine};
use crate::clips::{for_each_crossed_event, ClipSource};
use crate::config::Config;
use crate::outputs::{ClipEvent, LayerBlendMode, MotionSampleRequest, Outputs};
use crate::params::ParameterTable;
use crate::scratch::Scratch;
use crate::state_machine::{is_mirrored, motion_times, StateMachineState};

#[derive(Clone, Debug)]
pub struct ControllerInstance {
    params: ParameterTable,
    layer_weights: Vec<f32>,
    machines: Vec<StateMachineState>,
    /// Non-sync layer whose motions time each state machine.
    machine_owners: Vec<Option<u16>>,
    speed: f32,
    max_events: usize,
    clip_event_threshold: f32,
    outputs: Outputs,
    scratch: Scratch,
}

fn default_layer_weights(blob: &ControllerBlob) -> Vec<f32> {
    blob.layers
        .iter()
        .enumerate()
        .map(|(i, l)| if i == 0 { 1.0 } else { l.weight })
        .collect()
}

fn machine_owners(blob: &ControllerBlob) -> Vec<Option<u16>> {
    (0..blob.state_machines.len())
        .map(|sm| {
            let uses = |l: &Layer| l.state_machine_index as usize == sm;
            blob.layers
                .iter()
                .position(|l| uses(l) && !l.is_sync_layer())
                .or_else(|| blob.layers.iter().position(uses))
                .map(|i| i as u16)
        })
        .collect()
}

/// Cycle length in seconds of `state`, as timed by the owning layer's motion and
/// blended toward each influencing sync layer's motion by that layer's weight.
fn state_cycle_length(
    ctx: BlendContext<'_>,
    layer_weights: &[f32],
    owner: Option<u16>,
    sm: &StateMachine,
    state: i16,
    stack: &mut Vec<f32>,
) -> f32 {
    let Some(owner) = owner else {
        return 0.0;
    };
    let blob = ctx.blob;
    let st = &blob.states(sm)[state as usize];
    let mut length = motion_duration(ctx, blob.state_motion(&blob.layers[owner as usize], st), stack);
    for &sync in blob.influencing_sync_layers(sm) {
        let layer = &blob.layers[sync as usize];
        if !layer.sync_layer_uses_blended_timings() {
            continue;
        }
        let w = layer_weights[sync as usize].clamp(0.0, 1.0);
        let sync_length = motion_duration(ctx, blob.state_motion(layer, st), stack);
        length += (sync_length - length) * w;
    }
    length
}

impl ControllerInstance {
    pub fn new(blob: &ControllerBlob, cfg: &Config) -> Self {
        let params = ParameterTable::from_blob(blob);
        let machines = (0..blob.state_machines.len())
            .map(|sm| StateMachineState::new(blob, sm, &params))
            .collect();
        ControllerInstance {
            layer_weights: default_layer_weights(blob),
            machine_owners: machine_owners(blob),
            machines,
            params,
            speed: 1.0,
            max_events: cfg.max_events_per_tick,
            clip_event_threshold: cfg.clip_event_weight_threshold,
            outputs: Outputs::with_capacity(cfg.request_capacity, cfg.event_capacity),
            scratch: Scratch::new(cfg),
        }
    }

    /// Back to default parameters, default layer weights and entry states.
    pub fn reset(&mut self, blob: &ControllerBlob) {
        self.params.reset_to_defaults(blob);
        self.layer_weights = default_layer_weights(blob);
        for (sm, machine) in self.machines.iter_mut().enumerate() {
            *machine = StateMachineState::new(blob, sm, &self.params);
        }
        self.outputs.clear();
    }

    #[inline]
    pub fn parameters(&self) -> &ParameterTable {
        &self.params
    }

    #[inline]
    pub fn parameters_mut(&mut self) -> &mut ParameterTable {
        &mut self.params
    }

    #[inline]
    pub fn layer_weight(&self, layer: usize) -> f32 {
        self.layer_weights[layer]
    }

    /// Set a layer's weight. The base layer always evaluates at full weight, so
    /// writes to layer 0 are ignored.
    pub fn set_layer_weight(&mut self, layer: usize, weight: f32) {
        if layer > 0 {
            self.layer_weights[layer] = weight;
        }
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    #[inline]
    pub fn state_machine(&self, sm: usize) -> &StateMachineState {
        &self.machines[sm]
    }

    /// Runtime record driving `layer`.
    pub fn layer_state(&self, blob: &ControllerBlob, layer: usize) -> &StateMachineState {
        &self.machines[blob.layers[layer].state_machine_index as usize]
    }

    #[inline]
    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    /// Advance by `dt` seconds and rebuild the outputs.
    pub fn update(&mut self, blob: &ControllerBlob, clips: &dyn ClipSource, dt: f32) {
        self.outputs.clear();
        self.scratch.begin_frame();
        let dt = dt * self.speed;
        let cap = self.max_events;

        let layer_weights = &self.layer_weights;
        let stack = &mut self.scratch.weights;
        let outputs = &mut self.outputs;
        for (i, machine) in self.machines.iter_mut().enumerate() {
            let sm = &blob.state_machines[i];
            let owner = self.machine_owners[i];
            machine.update(
                blob,
                i as u16,
                &mut self.params,
                dt,
                &mut |params: &ParameterTable, state: i16| {
                    let ctx = BlendContext {
                        blob,
                        params,
                        clips,
                    };
                    state_cycle_length(ctx, layer_weights, owner, sm, state, stack)
                },
                &mut |event| outputs.push_transition_event(event, cap),
            );
        }

        self.compose(blob, clips);
        self.fire_clip_events(clips);
        self.params.clear_triggers();
    }

    fn compose(&mut self, blob: &ControllerBlob, clips: &dyn ClipSource) {
        let count = blob.layers.len();
        let attenuation = &mut self.scratch.layer_attenuation;
        attenuation.resize(count, 1.0);
        for i in (0..count.saturating_sub(1)).rev() {
            let next = &blob.layers[i + 1];
            let cover = if !next.use_additive_blending() && next.bone_mask_index < 0 {
                self.layer_weights[i + 1].clamp(0.0, 1.0)
            } else {
                0.0
            };
            attenuation[i] = attenuation[i + 1] * (1.0 - cover);
        }
        let attenuation = &self.scratch.layer_attenuation;

        let ctx = BlendContext {
            blob,
            params: &self.params,
            clips,
        };
        for (li, layer) in blob.layers.iter().enumerate() {
            let layer_weight = self.layer_weights[li];
            if layer_weight <= 0.0 {
                continue;
            }
            let blend = if layer.use_additive_blending() {
                LayerBlendMode::Additive
            } else {
                LayerBlendMode::Override
            };
            let sm = &blob.state_machines[layer.state_machine_index as usize];
            let states = blob.states(sm);
            let machine = &self.machines[layer.state_machine_index as usize];
            for (clock, weight) in machine.contributions() {
                if weight <= 0.0 || clock.state < 0 {
                    continue;
                }
                let state = &states[clock.state as usize];
                let (previous, current) = motion_times(state, clock, &self.params);
                let outputs = &mut self.outputs;
                resolve_motion(
                    ctx,
                    blob.state_motion(layer, state),
                    weight,
                    previous,
                    current,
                    is_mirrored(state, &self.params),
                    &mut self.scratch.weights,
                    &mut |leaf| {
                        outputs.push_request(MotionSampleRequest {
                            clip: leaf.clip,
                            layer: li as u16,
                            weight: leaf.weight,
                            layer_weight,
                            effective_weight: leaf.weight * layer_weight * attenuation[li],
                            normalized_time: leaf.time,
                            previous_normalized_time: leaf.previous_time,
                            blend,
                            bone_mask_index: layer.bone_mask_index,
                            perform_ik_pass: layer.perform_ik_pass(),
                            foot_ik: state.use_foot_ik(),
                            mirrored: leaf.mirrored,
                        })
                    },
                );
            }
        }
    }

    fn fire_clip_events(&mut self, clips: &dyn ClipSource) {
        let cap = self.max_events;
        for i in 0..self.outputs.requests.len() {
            let r = self.outputs.requests[i];
            if r.effective_weight <= self.clip_event_threshold {
                continue;
            }
            let outputs = &mut self.outputs;
            for_each_crossed_event(
                clips.clip_events(r.clip),
                r.previous_normalized_time,
                r.normalized_time,
                clips.clip_is_looping(r.clip),
                |m| {
                    outputs.push_clip_event(
                        ClipEvent {
                            layer: r.layer,
                            clip: r.clip,
                            name_hash: m.name_hash,
                            parameter: m.parameter,
                            weight: r.effective_weight,
                        },
                        cap,
                    )
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{
        pack_parameter_type, packed_types_array_length, Condition, ConditionMode, MotionIndex,
        ParameterType, Span, State, Transition,
    };
    use crate::clips::{ClipEventMarker, ClipInfo, ClipTable};
    use crate::fixed_string::FixedString128;
    use crate::params::ParameterValue;

    /// Idle/Run machine on layer 0 (clips 0, 1) and a sync layer reusing it with
    /// clips 2, 3. Parameter 0 is `Running` (bool), 1 is `Wave` (trigger).
    fn synced_blob(sync_weight: f32) -> ControllerBlob {
        let mut blob = ControllerBlob::default();
        let mut packed = vec![0; packed_types_array_length(2)];
        pack_parameter_type(&mut packed, 0, ParameterType::Bool);
        pack_parameter_type(&mut packed, 1, ParameterType::Trigger);
        blob.parameter_types = packed;
        blob.parameter_name_hashes = vec![10, 11];
        blob.parameter_editor_name_hashes = vec![10, 11];
        blob.parameter_names = vec![Default::default(); 2];
        blob.parameter_defaults = vec![ParameterValue::default(); 2];

        blob.conditions = vec![Condition::new(0, ConditionMode::If, ParameterValue::default())];
        let mut run = Transition::new(1);
        run.conditions = Span::new(0, 1);
        blob.transitions = vec![Transition::new(0), run];
        let mut idle = State::new(0);
        idle.transitions = Span::new(1, 1);
        blob.states = vec![idle, State::new(1)];
        blob.state_machines = vec![StateMachine {
            states: Span::new(0, 2),
            initialization_entry_state_transitions: Span::new(0, 1),
            ..Default::default()
        }];
        blob.motion_indices = vec![
            MotionIndex::clip(0),
            MotionIndex::clip(1),
            MotionIndex::clip(2),
            MotionIndex::clip(3),
        ];
        let mut base = Layer::new(FixedString128::default(), 1.0, 0);
        base.motion_indices = Span::new(0, 2);
        let mut sync = Layer::new(FixedString128::default(), sync_weight, 0);
        sync.motion_indices = Span::new(2, 2);
        sync.sync_layer_index = 0;
        sync.set_is_sync_layer(true);
        blob.layers = vec![base, sync];
        blob
    }

    fn clips() -> ClipTable {
        ClipTable::from_durations(&[1.0, 1.0, 1.0, 1.0])
    }

    #[test]
    fn sync_layer_substitutes_motions() {
        let blob = synced_blob(0.5);
        let clips = clips();
        let mut inst = ControllerInstance::new(&blob, &Config::default());
        inst.update(&blob, &clips, 0.1);
        let reqs = &inst.outputs().requests;
        assert_eq!(reqs.len(), 2);
        assert_eq!((reqs[0].layer, reqs[0].clip), (0, 0));
        assert_eq!((reqs[1].layer, reqs[1].clip), (1, 2));

        inst.parameters_mut().set_bool(0, true);
        inst.update(&blob, &clips, 0.1);
        inst.update(&blob, &clips, 0.1);
        let reqs = &inst.outputs().requests;
        assert!(reqs.iter().any(|r| r.layer == 0 && r.clip == 1));
        assert!(reqs.iter().any(|r| r.layer == 1 && r.clip == 3));
    }

    #[test]
    fn later_override_layer_attenuates_earlier_layers() {
        let blob = synced_blob(0.25);
        let mut inst = ControllerInstance::new(&blob, &Config::default());
        inst.update(&blob, &clips(), 0.1);
        let reqs = &inst.outputs().requests;
        assert_eq!(reqs[0].effective_weight, 0.75);
        assert_eq!(reqs[1].effective_weight, 0.25);
        assert_eq!(reqs[1].layer_weight, 0.25);
        assert_eq!(reqs[1].weight, 1.0);
    }

    #[test]
    fn base_layer_weight_is_pinned() {
        let blob = synced_blob(0.5);
        let mut inst = ControllerInstance::new(&blob, &Config::default());
        inst.set_layer_weight(0, 0.1);
        inst.set_layer_weight(1, 0.0);
        assert_eq!(inst.layer_weight(0), 1.0);
        inst.update(&blob, &clips(), 0.1);
        assert!(inst.outputs().requests.iter().all(|r| r.layer == 0));
    }

    #[test]
    fn unconsumed_triggers_clear_after_update() {
        let blob = synced_blob(0.5);
        let mut inst = ControllerInstance::new(&blob, &Config::default());
        inst.parameters_mut().set_trigger(1);
        inst.update(&blob, &clips(), 0.1);
        assert!(!inst.parameters().get_bool(1));
    }

    #[test]
    fn controller_speed_scales_time() {
        let blob = synced_blob(0.5);
        let mut inst = ControllerInstance::new(&blob, &Config::default());
        inst.set_speed(2.0);
        inst.update(&blob, &clips(), 0.125);
        assert_eq!(inst.outputs().requests[0].normalized_time, 0.25);
    }

    #[test]
    fn clip_events_fire_when_crossed() {
        let blob = synced_blob(0.5);
        let mut table = clips();
        table.clips[0] = ClipInfo {
            name: "Idle".into(),
            duration: 1.0,
            looping: true,
            events: vec![ClipEventMarker {
                normalized_time: 0.25,
                name_hash: 77,
                parameter: 3,
            }],
        };
        let mut inst = ControllerInstance::new(&blob, &Config::default());
        inst.update(&blob, &table, 0.125);
        assert!(inst.outputs().clip_events.is_empty());
        inst.update(&blob, &table, 0.25);
        let events = &inst.outputs().clip_events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name_hash, 77);
        assert_eq!(events[0].parameter, 3);
        assert_eq!(events[0].weight, 0.5);
    }
}
