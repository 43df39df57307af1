//! Scratch buffers and frame lifecycle.
//!
//! Each controller instance owns one `Scratch`; buffers keep their capacity
//! between frames so steady-state updates do not allocate.

use crate::config::Config;

#[derive(Debug, Default, Clone)]
pub struct Scratch {
    /// Stack of blend-tree child weights, pushed and truncated per tree.
    pub weights: Vec<f32>,
    /// Per-layer product of `1 - w` over later unmasked override layers.
    pub layer_attenuation: Vec<f32>,
}

impl Scratch {
    pub fn new(cfg: &Config) -> Self {
        Self {
            weights: Vec::with_capacity(cfg.scratch_weights),
            layer_attenuation: Vec::new(),
        }
    }

    #[inline]
    pub fn begin_frame(&mut self) {
        self.weights.clear();
        self.layer_attenuation.clear();
    }
}
