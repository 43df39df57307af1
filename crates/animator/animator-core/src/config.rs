#![allow(dead_code)]
//! Core configuration for animator-core.

use serde::{Deserialize, Serialize};

/// Configuration for instance sizing, event budgets and feature flags.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial capacity hints for per-instance output buffers.
    pub request_capacity: usize,
    pub event_capacity: usize,
    /// Initial capacity of the blend-tree weight stack.
    pub scratch_weights: usize,

    /// Maximum clip + transition events retained per instance per tick. Extra
    /// events are counted in `Outputs::dropped_events`.
    pub max_events_per_tick: usize,

    /// Leaves whose effective weight is at or below this fire no clip events.
    pub clip_event_weight_threshold: f32,

    pub features: Features,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Minimum instance count before `Engine::update` fans out over the rayon
    /// pool. Only honoured with the `parallel` feature.
    pub parallel_min_instances: usize,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            parallel_min_instances: 64,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_capacity: 32,
            event_capacity: 16,
            scratch_weights: 64,
            max_events_per_tick: 1024,
            clip_event_weight_threshold: 0.0,
            features: Features::default(),
        }
    }
}
