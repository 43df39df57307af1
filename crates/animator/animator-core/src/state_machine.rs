//! Per-instance runtime of one flattened state machine.
//!
//! A machine is either resident in one state or cross-fading from a source state
//! (`current`) to a destination. Both clocks advance in normalized state time; the
//! cross-fade itself advances in seconds.

use log::trace;

use crate::blob::{ControllerBlob, State, TransitionIndex};
use crate::condition::consume_triggers;
use crate::outputs::{StateTransitionEvent, TransitionPhase};
use crate::params::ParameterTable;
use crate::transition::{
    resolve, resolve_entry, resolve_interruption, transition_at, InProgress, InterruptionSide,
    ResolvedTransition, StateClock,
};

const MIN_CYCLE_LENGTH: f32 = 1e-4;

/// A cross-fade in progress.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveTransition {
    pub index: TransitionIndex,
    pub destination: StateClock,
    /// Seconds since the cross-fade started.
    pub elapsed: f32,
    /// Cross-fade length in seconds.
    pub duration: f32,
}

impl ActiveTransition {
    /// Weight of the destination state, `0..=1`.
    #[inline]
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateMachineState {
    /// Resident state, or the source of the cross-fade in progress. `state` is
    /// `-1` for a machine without states.
    pub current: StateClock,
    pub transition: Option<ActiveTransition>,
}

/// Cycle length used for time normalization; motions without a length run on a
/// one second cycle.
#[inline]
fn cycle_length(seconds: f32) -> f32 {
    if seconds > MIN_CYCLE_LENGTH {
        seconds
    } else {
        1.0
    }
}

#[inline]
fn advance(clock: &mut StateClock, delta: f32) {
    clock.previous = clock.current;
    clock.current += delta;
}

/// Effective speed multiplier of a state.
pub fn state_speed(state: &State, params: &ParameterTable) -> f32 {
    let mut speed = state.base_state_speed;
    if state.state_speed_multiplier_parameter_index >= 0 {
        speed *= params.get_numeric(state.state_speed_multiplier_parameter_index as usize);
    }
    speed
}

/// Motion time over the frame, `(previous, current)`. An override parameter
/// replaces state time outright; the cycle offset applies either way.
pub fn motion_times(state: &State, clock: StateClock, params: &ParameterTable) -> (f32, f32) {
    let offset = if state.motion_cycle_offset_parameter_index >= 0 {
        params.get_numeric(state.motion_cycle_offset_parameter_index as usize)
    } else {
        state.motion_cycle_offset
    };
    if state.motion_time_override_parameter_index >= 0 {
        let t = params.get_numeric(state.motion_time_override_parameter_index as usize) + offset;
        (t, t)
    } else {
        (clock.previous + offset, clock.current + offset)
    }
}

pub fn is_mirrored(state: &State, params: &ParameterTable) -> bool {
    if state.mirror_parameter_index >= 0 {
        params.get_bool(state.mirror_parameter_index as usize)
    } else {
        state.use_mirror()
    }
}

impl StateMachineState {
    /// Runtime record starting in the state chosen by the entry transitions.
    pub fn new(blob: &ControllerBlob, sm_index: usize, params: &ParameterTable) -> Self {
        let sm = &blob.state_machines[sm_index];
        let state = if sm.states.is_empty() {
            -1
        } else {
            resolve_entry(blob, sm, params)
        };
        StateMachineState {
            current: StateClock {
                state,
                previous: 0.0,
                current: 0.0,
            },
            transition: None,
        }
    }

    /// The state a host sees as active: the destination once a cross-fade started.
    pub fn active_state(&self) -> i16 {
        self.transition
            .map_or(self.current.state, |t| t.destination.state)
    }

    /// Contributing states with their cross-fade weights.
    pub fn contributions(&self) -> impl Iterator<Item = (StateClock, f32)> {
        let w = self.transition.map_or(0.0, |t| t.progress());
        std::iter::once((self.current, 1.0 - w))
            .chain(self.transition.map(|t| (t.destination, w)))
    }

    /// Advance one frame. `dt` is already scaled by the controller speed;
    /// `durations` reports a state's cycle length in seconds at the current
    /// parameters.
    pub fn update(
        &mut self,
        blob: &ControllerBlob,
        sm_index: u16,
        params: &mut ParameterTable,
        dt: f32,
        durations: &mut dyn FnMut(&ParameterTable, i16) -> f32,
        events: &mut dyn FnMut(StateTransitionEvent),
    ) {
        if self.current.state < 0 {
            return;
        }
        let sm = &blob.state_machines[sm_index as usize];
        let states = blob.states(sm);

        let length = cycle_length(durations(&*params, self.current.state));
        let speed = state_speed(&states[self.current.state as usize], params);
        advance(&mut self.current, dt * speed / length);
        if let Some(t) = &mut self.transition {
            let length = cycle_length(durations(&*params, t.destination.state));
            let speed = state_speed(&states[t.destination.state as usize], params);
            advance(&mut t.destination, dt * speed / length);
            t.elapsed += dt;
        }
        self.complete_if_done(sm_index, events);

        match self.transition {
            None => {
                let Some(r) = resolve(blob, sm, params, self.current) else {
                    return;
                };
                let fired = transition_at(blob, sm, r.owner_state, r.transition);
                consume_triggers(blob.conditions(fired), params);
                let from = cycle_length(durations(&*params, self.current.state));
                self.begin(r, from, sm_index, events);
            }
            Some(active) => {
                let in_progress = InProgress {
                    transition: active.index,
                    source: self.current,
                    destination: active.destination,
                };
                let Some((r, side)) = resolve_interruption(blob, sm, params, &in_progress) else {
                    return;
                };
                let fired = transition_at(blob, sm, r.owner_state, r.transition);
                consume_triggers(blob.conditions(fired), params);
                events(StateTransitionEvent {
                    state_machine: sm_index,
                    transition: active.index,
                    source_state: self.current.state,
                    destination_state: active.destination.state,
                    phase: TransitionPhase::Interrupted,
                });
                trace!(
                    "state machine {sm_index}: {:?} interrupted by {:?} from {side:?}",
                    active.index,
                    r.transition
                );
                if side == InterruptionSide::Destination {
                    self.current = active.destination;
                }
                self.transition = None;
                let from = cycle_length(durations(&*params, self.current.state));
                self.begin(r, from, sm_index, events);
            }
        }
        self.complete_if_done(sm_index, events);
    }

    fn begin(
        &mut self,
        r: ResolvedTransition,
        from_cycle_length: f32,
        sm_index: u16,
        events: &mut dyn FnMut(StateTransitionEvent),
    ) {
        let duration = if r.duration_is_realtime {
            r.duration
        } else {
            r.duration * from_cycle_length
        };
        trace!(
            "state machine {sm_index}: {:?} {} -> {} over {duration}s",
            r.transition,
            self.current.state,
            r.destination_state_index
        );
        events(StateTransitionEvent {
            state_machine: sm_index,
            transition: r.transition,
            source_state: self.current.state,
            destination_state: r.destination_state_index,
            phase: TransitionPhase::Started,
        });
        self.transition = Some(ActiveTransition {
            index: r.transition,
            destination: StateClock {
                state: r.destination_state_index,
                previous: r.destination_normalized_offset,
                current: r.destination_normalized_offset,
            },
            elapsed: 0.0,
            duration: duration.max(0.0),
        });
    }

    fn complete_if_done(&mut self, sm_index: u16, events: &mut dyn FnMut(StateTransitionEvent)) {
        let Some(t) = self.transition else {
            return;
        };
        if t.elapsed < t.duration {
            return;
        }
        events(StateTransitionEvent {
            state_machine: sm_index,
            transition: t.index,
            source_state: self.current.state,
            destination_state: t.destination.state,
            phase: TransitionPhase::Completed,
        });
        trace!("state machine {sm_index}: now in state {}", t.destination.state);
        self.current = t.destination;
        self.transition = None;
    }
}
