//! Output contracts of a controller update.
//!
//! Outputs carry the motion sample requests for the external pose sampler and
//! the discrete events fired this frame. Buffers are cleared at the start of
//! every update and keep their capacity between frames.

use serde::{Deserialize, Serialize};

use crate::blob::TransitionIndex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerBlendMode {
    Override,
    Additive,
}

/// One leaf clip to sample this frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionSampleRequest {
    pub clip: u16,
    pub layer: u16,
    /// State cross-fade weight times blend-tree weight, within the layer.
    pub weight: f32,
    pub layer_weight: f32,
    /// `weight × layer_weight`, attenuated by every later unmasked override layer.
    pub effective_weight: f32,
    /// Cumulative normalized time of the clip; wrap it for looping clips.
    pub normalized_time: f32,
    /// `normalized_time` before this frame's advance.
    pub previous_normalized_time: f32,
    pub blend: LayerBlendMode,
    /// Bone mask resolved by the skeleton system, `-1` when unmasked.
    pub bone_mask_index: i16,
    pub perform_ik_pass: bool,
    pub foot_ik: bool,
    pub mirrored: bool,
}

/// An event authored on a clip that was crossed this frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipEvent {
    pub layer: u16,
    pub clip: u16,
    pub name_hash: i32,
    pub parameter: i32,
    /// Weight of the contributing request when the event fired.
    pub weight: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionPhase {
    Started,
    Completed,
    /// Cut short by another transition; a `Started` event for the new one follows.
    Interrupted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransitionEvent {
    pub state_machine: u16,
    pub transition: TransitionIndex,
    pub source_state: i16,
    pub destination_state: i16,
    pub phase: TransitionPhase,
}

/// Everything one controller instance produced during its last update.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default)]
    pub requests: Vec<MotionSampleRequest>,
    #[serde(default)]
    pub clip_events: Vec<ClipEvent>,
    #[serde(default)]
    pub transition_events: Vec<StateTransitionEvent>,
    /// Events dropped this frame because of `Config::max_events_per_tick`.
    #[serde(default)]
    pub dropped_events: u32,
}

impl Outputs {
    pub fn with_capacity(requests: usize, events: usize) -> Self {
        Outputs {
            requests: Vec::with_capacity(requests),
            clip_events: Vec::with_capacity(events),
            transition_events: Vec::with_capacity(events),
            dropped_events: 0,
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.requests.clear();
        self.clip_events.clear();
        self.transition_events.clear();
        self.dropped_events = 0;
    }

    #[inline]
    pub fn push_request(&mut self, request: MotionSampleRequest) {
        self.requests.push(request);
    }

    #[inline]
    pub fn event_count(&self) -> usize {
        self.clip_events.len() + self.transition_events.len()
    }

    #[inline]
    pub fn push_clip_event(&mut self, event: ClipEvent, cap: usize) {
        if self.event_count() < cap {
            self.clip_events.push(event);
        } else {
            self.dropped_events += 1;
        }
    }

    #[inline]
    pub fn push_transition_event(&mut self, event: StateTransitionEvent, cap: usize) {
        if self.event_count() < cap {
            self.transition_events.push(event);
        } else {
            self.dropped_events += 1;
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.clip_events.is_empty() && self.transition_events.is_empty()
    }

    /// Sum of the in-layer weights of the requests on `layer`.
    pub fn layer_weight_sum(&self, layer: u16) -> f32 {
        self.requests
            .iter()
            .filter(|r| r.layer == layer)
            .map(|r| r.weight)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_cap_counts_drops() {
        let mut out = Outputs::default();
        let ev = ClipEvent {
            layer: 0,
            clip: 0,
            name_hash: 1,
            parameter: 0,
            weight: 1.0,
        };
        out.push_clip_event(ev, 1);
        out.push_clip_event(ev, 1);
        assert_eq!(out.clip_events.len(), 1);
        assert_eq!(out.dropped_events, 1);
        out.clear();
        assert!(out.is_empty());
        assert_eq!(out.dropped_events, 0);
    }
}
