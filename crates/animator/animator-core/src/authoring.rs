//! Authoring-side controller description.
//!
//! This is the hierarchical form a controller is written in (by hand, or exported
//! from an editor): nested sub-state machines, named targets, exit transitions.
//! [`crate::builder::build_controller_blob`] flattens it into a [`crate::ControllerBlob`].
//!
//! Names inside a state machine are resolved relative to that machine first and as
//! full dotted paths (`"Base Layer.Air.Jump"`) second.

use serde::{Deserialize, Serialize};

use crate::blob::{BlendTreeType, ConditionMode, InterruptionSource, ParameterType};
use crate::builder::BuildError;

fn one() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

/// A literal from JSON: booleans for Bool/Trigger parameters, numbers otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralDesc {
    Bool(bool),
    Number(f64),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControllerDesc {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDesc>,
    pub layers: Vec<LayerDesc>,
    #[serde(default)]
    pub blend_trees: Vec<BlendTreeDesc>,
    /// When set, clip indices are checked against it at build time. Otherwise
    /// `Engine::load_controller` checks them against the clip source.
    #[serde(default)]
    pub clip_count: Option<u16>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterDesc {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(default)]
    pub default: Option<LiteralDesc>,
    /// Editor-facing name; defaults to `name`.
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerDesc {
    pub name: String,
    #[serde(default = "one")]
    pub weight: f32,
    #[serde(default)]
    pub additive: bool,
    #[serde(default)]
    pub ik_pass: bool,
    #[serde(default)]
    pub bone_mask: Option<i16>,
    /// Owned graph of a regular layer.
    #[serde(default)]
    pub state_machine: Option<StateMachineDesc>,
    /// Set on sync layers instead of `state_machine`.
    #[serde(default)]
    pub sync: Option<SyncDesc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncDesc {
    /// Name of the layer whose state machine is reused.
    pub layer: String,
    #[serde(default)]
    pub blended_timings: bool,
    /// Per-state motions; states not listed play nothing on this layer.
    #[serde(default)]
    pub motions: Vec<MotionOverrideDesc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionOverrideDesc {
    /// Full path or short name of a state of the synced machine.
    pub state: String,
    pub motion: MotionDesc,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionDesc {
    #[default]
    None,
    Clip(u16),
    BlendTree(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMachineDesc {
    /// Path segment of a sub-machine; the root takes the layer name.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub states: Vec<StateDesc>,
    #[serde(default)]
    pub state_machines: Vec<StateMachineDesc>,
    /// State or sub-machine entered when no entry transition holds.
    pub default_state: String,
    #[serde(default)]
    pub entry_transitions: Vec<EntryTransitionDesc>,
    #[serde(default)]
    pub any_state_transitions: Vec<TransitionDesc>,
    /// Taken when a state inside this sub-machine exits; targets resolve in the
    /// parent machine. Falls back to the parent's entry.
    #[serde(default)]
    pub exit_transitions: Vec<EntryTransitionDesc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateDesc {
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub motion: MotionDesc,
    #[serde(default = "one")]
    pub speed: f32,
    #[serde(default)]
    pub speed_parameter: Option<String>,
    #[serde(default)]
    pub cycle_offset: f32,
    #[serde(default)]
    pub cycle_offset_parameter: Option<String>,
    #[serde(default)]
    pub mirror: bool,
    #[serde(default)]
    pub mirror_parameter: Option<String>,
    /// Drives motion time directly instead of state time.
    #[serde(default)]
    pub time_parameter: Option<String>,
    #[serde(default)]
    pub foot_ik: bool,
    #[serde(default)]
    pub transitions: Vec<TransitionDesc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetDesc {
    State(String),
    StateMachine(String),
    Exit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionDesc {
    pub parameter: String,
    pub mode: ConditionMode,
    #[serde(default)]
    pub threshold: Option<LiteralDesc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionDesc {
    pub to: TargetDesc,
    #[serde(default)]
    pub conditions: Vec<ConditionDesc>,
    #[serde(default)]
    pub duration: f32,
    /// `duration` is in seconds rather than a fraction of the source cycle.
    #[serde(default)]
    pub fixed_duration: bool,
    #[serde(default)]
    pub offset: f32,
    #[serde(default)]
    pub exit_time: Option<f32>,
    #[serde(default)]
    pub interruption: InterruptionSource,
    #[serde(default = "default_true")]
    pub ordered_interruption: bool,
    #[serde(default)]
    pub can_transition_to_self: bool,
}

/// Entry and exit transitions only route; they carry no timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryTransitionDesc {
    pub to: TargetDesc,
    #[serde(default)]
    pub conditions: Vec<ConditionDesc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendTreeDesc {
    pub name: String,
    #[serde(rename = "type")]
    pub blend_type: BlendTreeType,
    /// One name for 1D trees, two for 2D trees. Direct trees use each child's `parameter`.
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Direct trees only.
    #[serde(default)]
    pub normalize: bool,
    pub children: Vec<ChildDesc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChildDesc {
    pub motion: MotionDesc,
    #[serde(default)]
    pub threshold: f32,
    #[serde(default)]
    pub position: [f32; 2],
    #[serde(default = "one")]
    pub time_scale: f32,
    #[serde(default)]
    pub cycle_offset: f32,
    #[serde(default)]
    pub mirror: bool,
    #[serde(default = "default_true")]
    pub looping: bool,
    /// Weight parameter of a Direct tree child.
    #[serde(default)]
    pub parameter: Option<String>,
}

/// Parse a JSON controller description.
pub fn parse_controller_json(s: &str) -> Result<ControllerDesc, BuildError> {
    Ok(serde_json::from_str(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let desc = parse_controller_json(
            r#"{
                "name": "Mini",
                "parameters": [{ "name": "Speed", "type": "Float", "default": 0.5 }],
                "layers": [{
                    "name": "Base",
                    "state_machine": {
                        "default_state": "Idle",
                        "states": [{
                            "name": "Idle",
                            "motion": { "clip": 0 },
                            "transitions": [{ "to": "exit", "exit_time": 0.9 }]
                        }]
                    }
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(desc.parameters[0].default, Some(LiteralDesc::Number(0.5)));
        let layer = &desc.layers[0];
        assert_eq!(layer.weight, 1.0);
        let state = &layer.state_machine.as_ref().unwrap().states[0];
        assert_eq!(state.motion, MotionDesc::Clip(0));
        assert_eq!(state.speed, 1.0);
        let t = &state.transitions[0];
        assert_eq!(t.to, TargetDesc::Exit);
        assert_eq!(t.exit_time, Some(0.9));
        assert!(t.ordered_interruption);
        assert_eq!(t.interruption, InterruptionSource::None);
    }

    #[test]
    fn malformed_json_is_a_build_error() {
        let err = parse_controller_json("{ \"name\": 3 }").unwrap_err();
        assert!(matches!(err, BuildError::Json(_)));
    }
}
