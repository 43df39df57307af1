#![allow(dead_code)]
//! Animator Core (engine-agnostic)
//!
//! Layered animation-controller evaluation over a flat, immutable controller blob.
//! The crate builds blobs from JSON descriptions (or decodes them from bytes),
//! runs one state-machine runtime per instance, evaluates blend trees and emits
//! weighted clip sample requests plus clip and transition events. Pose sampling
//! and bone masks stay with the host.

pub mod authoring;
pub mod bits;
pub mod blend_tree;
pub mod blob;
pub mod builder;
pub mod clips;
pub mod condition;
pub mod config;
pub mod controller;
pub mod engine;
pub mod fixed_string;
pub mod hash;
pub mod ids;
pub mod inputs;
pub mod outputs;
pub mod params;
pub mod scratch;
pub mod state_machine;
pub mod transition;

// Re-exports for consumers (adapters)
pub use authoring::{parse_controller_json, ControllerDesc};
pub use blob::{
    BlendTreeType, ConditionMode, ControllerBlob, InterruptionSource, LayoutError, Motion,
    MotionIndex, ParameterType, TransitionIndex,
};
pub use builder::{build_controller_blob, build_controller_blob_from_json, BuildError};
pub use clips::{ClipEventMarker, ClipInfo, ClipSource, ClipTable};
pub use config::Config;
pub use controller::ControllerInstance;
pub use engine::{Controller, Engine, EngineError, SharedClips};
pub use hash::name_hash;
pub use ids::{ControllerId, InstId};
pub use inputs::{InstanceCommand, Inputs, ParameterKey, ParameterWrite};
pub use outputs::{
    ClipEvent, LayerBlendMode, MotionSampleRequest, Outputs, StateTransitionEvent,
    TransitionPhase,
};
pub use params::{ParameterTable, ParameterValue, TypedValue};
pub use scratch::Scratch;
pub use state_machine::StateMachineState;
