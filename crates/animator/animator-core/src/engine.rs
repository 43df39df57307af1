//! Engine: owns shared controller blobs and the instances evaluated against them.
//!
//! Methods:
//! - new, load_controller (blob / JSON / bytes), add_instance, remove_instance
//! - update (apply inputs → step every instance), outputs per instance
//!
//! Blobs are immutable once loaded and shared by `Arc`; each instance owns its
//! runtime state, so instances step independently (in parallel with the
//! `parallel` feature).

use std::sync::Arc;

use log::warn;
use thiserror::Error;

use crate::blob::{ControllerBlob, LayoutError};
use crate::builder::{build_controller_blob_from_json, BuildError};
use crate::clips::ClipSource;
use crate::config::Config;
use crate::controller::ControllerInstance;
use crate::ids::{ControllerId, IdAllocator, InstId};
use crate::inputs::{InstanceCommand, Inputs, ParameterKey};
use crate::outputs::Outputs;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("controller `{controller}` refers to {required} clips but the clip source has {available}")]
    MissingClips {
        controller: String,
        required: usize,
        available: usize,
    },
}

/// Clip metadata shared between the engine and the host's sampler.
pub type SharedClips = Arc<dyn ClipSource + Send + Sync>;

/// A loaded controller and the clips its motions index into.
pub struct Controller {
    pub id: ControllerId,
    pub blob: Arc<ControllerBlob>,
    pub clips: SharedClips,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.id)
            .field("name", &self.blob.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Instance {
    id: InstId,
    controller: ControllerId,
    runtime: ControllerInstance,
}

#[derive(Debug)]
pub struct Engine {
    cfg: Config,
    ids: IdAllocator,
    controllers: Vec<Controller>,
    instances: Vec<Instance>,
}

fn resolve_parameter(blob: &ControllerBlob, key: &ParameterKey) -> Option<usize> {
    match key {
        ParameterKey::Index(i) => (*i < blob.parameter_count()).then_some(*i),
        ParameterKey::Name(name) => blob.find_parameter_by_name(name),
        ParameterKey::Hash(hash) => blob.find_parameter(*hash),
    }
}

impl Engine {
    /// Create a new engine with the given config.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            ids: IdAllocator::new(),
            controllers: Vec::new(),
            instances: Vec::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Register a built blob. It is read-only from here on. Fails when the blob
    /// refers to clips the clip source does not have.
    pub fn load_controller(
        &mut self,
        blob: impl Into<Arc<ControllerBlob>>,
        clips: SharedClips,
    ) -> Result<ControllerId, EngineError> {
        let blob = blob.into();
        let required = blob.required_clip_count();
        if required > clips.clip_count() {
            return Err(EngineError::MissingClips {
                controller: blob.name.as_str().to_owned(),
                required,
                available: clips.clip_count(),
            });
        }
        let id = self.ids.alloc_controller();
        self.controllers.push(Controller { id, blob, clips });
        Ok(id)
    }

    /// Build a blob from a JSON description and register it.
    pub fn load_controller_json(&mut self, json: &str, clips: SharedClips) -> Result<ControllerId, EngineError> {
        let blob = build_controller_blob_from_json(json)?;
        self.load_controller(blob, clips)
    }

    /// Decode a serialized blob and register it.
    pub fn load_controller_bytes(&mut self, bytes: &[u8], clips: SharedClips) -> Result<ControllerId, EngineError> {
        let blob = ControllerBlob::from_bytes(bytes)?;
        self.load_controller(blob, clips)
    }

    pub fn controller(&self, id: ControllerId) -> Option<&Controller> {
        self.controllers.iter().find(|c| c.id == id)
    }

    /// New instance of a loaded controller, starting from its defaults.
    pub fn add_instance(&mut self, controller: ControllerId) -> Option<InstId> {
        let blob = &self.controller(controller)?.blob;
        let runtime = ControllerInstance::new(blob, &self.cfg);
        let id = self.ids.alloc_inst();
        self.instances.push(Instance {
            id,
            controller,
            runtime,
        });
        Some(id)
    }

    pub fn remove_instance(&mut self, inst: InstId) -> bool {
        let before = self.instances.len();
        self.instances.retain(|i| i.id != inst);
        self.instances.len() != before
    }

    #[inline]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instance(&self, inst: InstId) -> Option<&ControllerInstance> {
        self.instances.iter().find(|i| i.id == inst).map(|i| &i.runtime)
    }

    pub fn instance_mut(&mut self, inst: InstId) -> Option<&mut ControllerInstance> {
        self.instances.iter_mut().find(|i| i.id == inst).map(|i| &mut i.runtime)
    }

    /// Outputs of an instance's last update.
    pub fn outputs(&self, inst: InstId) -> Option<&Outputs> {
        self.instance(inst).map(ControllerInstance::outputs)
    }

    /// Apply parameter writes and instance commands. Unknown targets are skipped.
    fn apply_inputs(&mut self, inputs: Inputs) {
        for w in inputs.parameter_writes {
            let Some(inst) = self.instances.iter_mut().find(|i| i.id == w.inst) else {
                warn!("parameter write for unknown instance {:?}", w.inst);
                continue;
            };
            let Some(c) = self.controllers.iter().find(|c| c.id == inst.controller) else {
                continue;
            };
            let Some(index) = resolve_parameter(&c.blob, &w.parameter) else {
                warn!("unknown parameter {:?} on instance {:?}", w.parameter, w.inst);
                continue;
            };
            if !inst.runtime.parameters_mut().set_typed(index, w.value) {
                warn!(
                    "type mismatch writing {:?} to parameter {:?} on instance {:?}",
                    w.value, w.parameter, w.inst
                );
            }
        }

        for cmd in inputs.instance_cmds {
            let target = match &cmd {
                InstanceCommand::SetLayerWeight { inst, .. }
                | InstanceCommand::SetSpeed { inst, .. }
                | InstanceCommand::Reset { inst } => *inst,
            };
            let Some(inst) = self.instances.iter_mut().find(|i| i.id == target) else {
                warn!("command for unknown instance {:?}", target);
                continue;
            };
            let Some(c) = self.controllers.iter().find(|c| c.id == inst.controller) else {
                continue;
            };
            match cmd {
                InstanceCommand::SetLayerWeight { layer, weight, .. } => {
                    if layer < c.blob.layers.len() {
                        inst.runtime.set_layer_weight(layer, weight);
                    } else {
                        warn!("layer {layer} out of range on instance {:?}", target);
                    }
                }
                InstanceCommand::SetSpeed { speed, .. } => inst.runtime.set_speed(speed),
                InstanceCommand::Reset { .. } => inst.runtime.reset(&c.blob),
            }
        }
    }

    /// Step every instance by `dt` seconds after applying `inputs`.
    pub fn update(&mut self, dt: f32, inputs: Inputs) {
        self.apply_inputs(inputs);

        let controllers = &self.controllers;
        let step = |inst: &mut Instance| {
            if let Some(c) = controllers.iter().find(|c| c.id == inst.controller) {
                inst.runtime.update(&c.blob, c.clips.as_ref(), dt);
            }
        };

        #[cfg(feature = "parallel")]
        if self.instances.len() >= self.cfg.features.parallel_min_instances {
            use rayon::prelude::*;
            self.instances.par_iter_mut().for_each(step);
            return;
        }

        self.instances.iter_mut().for_each(step);
    }
}
