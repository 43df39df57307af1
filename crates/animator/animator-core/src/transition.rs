//! Transition resolution for one state machine.
//!
//! Any-state transitions are checked before the active state's own list, each list
//! in array order, and the first candidate whose exit-time gate and conditions both
//! hold wins. While a cross-fade is in progress, the active transition's
//! interruption source decides which lists may cut it short.

use crate::blob::{
    ControllerBlob, InterruptionSource, StateMachine, Transition, TransitionIndex,
};
use crate::condition::evaluate_all;
use crate::params::ParameterTable;

/// Normalized state time of one state over the current frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateClock {
    pub state: i16,
    /// Cumulative normalized time before this frame's advance.
    pub previous: f32,
    /// Cumulative normalized time after this frame's advance.
    pub current: f32,
}

/// The transition selected by the resolver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedTransition {
    pub transition: TransitionIndex,
    /// State owning the transition list, `-1` for any-state transitions.
    pub owner_state: i16,
    pub destination_state_index: i16,
    pub duration: f32,
    pub duration_is_realtime: bool,
    pub destination_normalized_offset: f32,
}

/// A cross-fade in progress, as seen by the interruption check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InProgress {
    pub transition: TransitionIndex,
    pub source: StateClock,
    pub destination: StateClock,
}

/// Whether cumulative time moving from `previous` to `current` crosses `exit_time`.
///
/// Below 1 the threshold repeats every cycle (`k + exit_time` for every whole `k`);
/// at or above 1 it is a single absolute threshold that never re-arms.
#[inline]
pub fn exit_time_crossed(exit_time: f32, previous: f32, current: f32) -> bool {
    let (lo, hi) = if previous <= current {
        (previous, current)
    } else {
        (current, previous)
    };
    if exit_time < 1.0 {
        (hi - exit_time).floor() > (lo - exit_time).floor()
    } else {
        lo < exit_time && exit_time <= hi
    }
}

#[inline]
fn gate_open(t: &Transition, clock: StateClock) -> bool {
    !t.has_exit_time() || exit_time_crossed(t.normalized_exit_time, clock.previous, clock.current)
}

/// First transition in `list[..limit]` that may fire. Any-state candidates
/// targeting `skip_destination` are rejected unless they allow self transitions;
/// local candidates targeting it are rejected when `skip_local` is set.
#[allow(clippy::too_many_arguments)]
fn scan(
    blob: &ControllerBlob,
    params: &ParameterTable,
    list: &[Transition],
    limit: usize,
    clock: StateClock,
    skip_destination: i16,
    any_state: bool,
    skip_local: bool,
) -> Option<usize> {
    list.iter().take(limit).position(|t| {
        if t.destination_state_index == skip_destination {
            if any_state && !t.can_transition_to_self() {
                return false;
            }
            if !any_state && skip_local {
                return false;
            }
        }
        gate_open(t, clock) && evaluate_all(blob.conditions(t), params)
    })
}

fn resolved(t: &Transition, index: TransitionIndex, owner_state: i16) -> ResolvedTransition {
    ResolvedTransition {
        transition: index,
        owner_state,
        destination_state_index: t.destination_state_index,
        duration: t.duration,
        duration_is_realtime: t.uses_realtime_duration(),
        destination_normalized_offset: t.normalized_offset,
    }
}

/// Look up the transition record a [`TransitionIndex`] refers to.
pub fn transition_at<'a>(
    blob: &'a ControllerBlob,
    sm: &StateMachine,
    owner_state: i16,
    index: TransitionIndex,
) -> &'a Transition {
    if index.is_any_state_transition() {
        &blob.any_state_transitions(sm)[index.index() as usize]
    } else {
        let state = &blob.states(sm)[owner_state as usize];
        &blob.state_transitions(state)[index.index() as usize]
    }
}

/// Select at most one transition out of the state described by `clock`.
pub fn resolve(
    blob: &ControllerBlob,
    sm: &StateMachine,
    params: &ParameterTable,
    clock: StateClock,
) -> Option<ResolvedTransition> {
    let any = blob.any_state_transitions(sm);
    if let Some(i) = scan(blob, params, any, any.len(), clock, clock.state, true, false) {
        return Some(resolved(&any[i], TransitionIndex::any_state(i as u16), -1));
    }

    let state = &blob.states(sm)[clock.state as usize];
    let local = blob.state_transitions(state);
    scan(blob, params, local, local.len(), clock, clock.state, false, false)
        .map(|i| resolved(&local[i], TransitionIndex::local(i as u16), clock.state))
}

/// Which end of an in-progress cross-fade an interrupting transition leaves from.
/// Any-state interruptions count as leaving the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptionSide {
    Source,
    Destination,
}

/// Select a transition that interrupts the cross-fade described by `in_progress`.
///
/// Any-state transitions are checked first, then the sides named by the active
/// transition's interruption source, in that order. With ordered interruptions
/// the source side only offers the transitions listed before the active one in
/// the source state's list; the destination side is never limited.
pub fn resolve_interruption(
    blob: &ControllerBlob,
    sm: &StateMachine,
    params: &ParameterTable,
    in_progress: &InProgress,
) -> Option<(ResolvedTransition, InterruptionSide)> {
    use InterruptionSide::{Destination, Source};
    let active = transition_at(blob, sm, in_progress.source.state, in_progress.transition);
    let order: &[InterruptionSide] = match active.interruption_source() {
        InterruptionSource::None => return None,
        InterruptionSource::Source => &[Source],
        InterruptionSource::Destination => &[Destination],
        InterruptionSource::SourceThenDestination => &[Source, Destination],
        InterruptionSource::DestinationThenSource => &[Destination, Source],
    };
    let heading_to = in_progress.destination.state;

    let any = blob.any_state_transitions(sm);
    if let Some(i) = scan(blob, params, any, any.len(), in_progress.destination, heading_to, true, true) {
        return Some((
            resolved(&any[i], TransitionIndex::any_state(i as u16), -1),
            Destination,
        ));
    }

    let states = blob.states(sm);
    for side in order {
        let (clock, ordered_limit) = match side {
            Source => {
                let limit = if active.uses_ordered_interruptions()
                    && !in_progress.transition.is_any_state_transition()
                {
                    Some(in_progress.transition.index() as usize)
                } else {
                    None
                };
                (in_progress.source, limit)
            }
            Destination => (in_progress.destination, None),
        };
        let list = blob.state_transitions(&states[clock.state as usize]);
        let limit = ordered_limit.unwrap_or(list.len());
        if let Some(i) = scan(blob, params, list, limit, clock, heading_to, false, true) {
            return Some((
                resolved(&list[i], TransitionIndex::local(i as u16), clock.state),
                *side,
            ));
        }
    }
    None
}

/// Initial state of a machine: the first conditional entry transition (index 1
/// onward) whose conditions hold, falling back to the default at index 0.
pub fn resolve_entry(blob: &ControllerBlob, sm: &StateMachine, params: &ParameterTable) -> i16 {
    let entries = blob.entry_transitions(sm);
    entries
        .iter()
        .skip(1)
        .find(|t| evaluate_all(blob.conditions(t), params))
        .or_else(|| entries.first())
        .map(|t| t.destination_state_index)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{
        pack_parameter_type, packed_types_array_length, Condition, ConditionMode,
        ParameterType, Span, State,
    };
    use crate::params::ParameterValue;

    #[test]
    fn exit_time_below_one_rearms_every_loop() {
        assert!(exit_time_crossed(0.5, 0.4, 0.6));
        assert!(!exit_time_crossed(0.5, 0.6, 0.9));
        assert!(exit_time_crossed(0.5, 1.45, 1.55));
        assert!(exit_time_crossed(0.5, 2.9, 3.5));
        assert!(!exit_time_crossed(0.5, 0.5, 0.7));
        assert!(exit_time_crossed(0.5, 0.3, 0.5));
    }

    #[test]
    fn exit_time_above_one_fires_once() {
        assert!(!exit_time_crossed(1.5, 0.4, 0.6));
        assert!(exit_time_crossed(1.5, 1.4, 1.5));
        assert!(!exit_time_crossed(1.5, 2.4, 2.6));
        assert!(!exit_time_crossed(1.5, 1.5, 1.6));
    }

    /// Two states, one bool parameter. State 0 has a local transition to 1 gated on
    /// the bool; an any-state transition to 0 fires on a trigger.
    fn two_state_blob() -> (ControllerBlob, StateMachine) {
        let mut blob = ControllerBlob::default();
        let mut packed = vec![0; packed_types_array_length(2)];
        pack_parameter_type(&mut packed, 0, ParameterType::Bool);
        pack_parameter_type(&mut packed, 1, ParameterType::Trigger);
        blob.parameter_types = packed;
        blob.parameter_name_hashes = vec![1, 2];
        blob.parameter_editor_name_hashes = vec![1, 2];
        blob.parameter_names = vec![Default::default(); 2];
        blob.parameter_defaults = vec![ParameterValue::default(); 2];

        blob.conditions = vec![
            Condition::new(0, ConditionMode::If, ParameterValue::default()),
            Condition::new(1, ConditionMode::If, ParameterValue::default()),
        ];
        let mut to_run = Transition::new(1);
        to_run.conditions = Span::new(0, 1);
        let mut any_to_idle = Transition::new(0);
        any_to_idle.conditions = Span::new(1, 1);
        blob.transitions = vec![to_run, any_to_idle];

        let mut idle = State::new(0);
        idle.transitions = Span::new(0, 1);
        let run = State::new(1);
        blob.states = vec![idle, run];

        let sm = StateMachine {
            states: Span::new(0, 2),
            any_state_transitions: Span::new(1, 1),
            ..Default::default()
        };
        blob.state_machines = vec![sm];
        (blob, sm)
    }

    #[test]
    fn local_transition_follows_condition() {
        let (blob, sm) = two_state_blob();
        let mut params = ParameterTable::from_blob(&blob);
        let clock = StateClock {
            state: 0,
            previous: 0.0,
            current: 0.1,
        };
        assert_eq!(resolve(&blob, &sm, &params, clock), None);
        params.set_bool(0, true);
        let r = resolve(&blob, &sm, &params, clock).unwrap();
        assert_eq!(r.destination_state_index, 1);
        assert_eq!(r.transition, TransitionIndex::local(0));
        assert_eq!(r.owner_state, 0);
        // Deterministic re-evaluation.
        assert_eq!(resolve(&blob, &sm, &params, clock), Some(r));
    }

    #[test]
    fn any_state_wins_but_not_into_self() {
        let (blob, sm) = two_state_blob();
        let mut params = ParameterTable::from_blob(&blob);
        params.set_bool(0, true);
        params.set_trigger(1);
        let from_idle = StateClock {
            state: 0,
            previous: 0.0,
            current: 0.1,
        };
        // Any-state targets the current state without can_transition_to_self.
        let r = resolve(&blob, &sm, &params, from_idle).unwrap();
        assert_eq!(r.transition, TransitionIndex::local(0));

        let from_run = StateClock {
            state: 1,
            ..from_idle
        };
        let r = resolve(&blob, &sm, &params, from_run).unwrap();
        assert!(r.transition.is_any_state_transition());
        assert_eq!(r.destination_state_index, 0);
        assert_eq!(r.owner_state, -1);
    }

    #[test]
    fn none_interruption_blocks_everything() {
        let (blob, sm) = two_state_blob();
        let mut params = ParameterTable::from_blob(&blob);
        params.set_trigger(1);
        let in_progress = InProgress {
            transition: TransitionIndex::local(0),
            source: StateClock {
                state: 0,
                previous: 0.2,
                current: 0.3,
            },
            destination: StateClock {
                state: 1,
                previous: 0.0,
                current: 0.1,
            },
        };
        assert_eq!(resolve_interruption(&blob, &sm, &params, &in_progress), None);
    }

    #[test]
    fn entry_falls_back_to_default() {
        let (mut blob, mut sm) = two_state_blob();
        let first = blob.transitions.len();
        let mut conditional = Transition::new(1);
        conditional.conditions = Span::new(0, 1);
        blob.transitions.push(Transition::new(0));
        blob.transitions.push(conditional);
        sm.initialization_entry_state_transitions = Span::new(first, 2);
        let mut params = ParameterTable::from_blob(&blob);
        assert_eq!(resolve_entry(&blob, &sm, &params), 0);
        params.set_bool(0, true);
        assert_eq!(resolve_entry(&blob, &sm, &params), 1);
    }
}
