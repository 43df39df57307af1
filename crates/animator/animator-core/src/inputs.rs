#![allow(dead_code)]
//! Input contracts for the engine.
//!
//! Hosts build these each tick and pass them into `Engine::update()`. Writes that
//! name an unknown instance, parameter or layer are skipped.

use serde::{Deserialize, Serialize};

use crate::ids::InstId;
use crate::params::TypedValue;

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Inputs {
    /// Parameter writes applied before stepping, in order.
    #[serde(default)]
    pub parameter_writes: Vec<ParameterWrite>,
    /// Instance-level commands applied after the parameter writes.
    #[serde(default)]
    pub instance_cmds: Vec<InstanceCommand>,
}

/// How a host addresses a parameter.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKey {
    Index(usize),
    Name(String),
    /// Name hash or editor name hash.
    Hash(i32),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterWrite {
    pub inst: InstId,
    pub parameter: ParameterKey,
    /// Must match the parameter's declared type.
    pub value: TypedValue,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum InstanceCommand {
    SetLayerWeight { inst: InstId, layer: usize, weight: f32 },
    SetSpeed { inst: InstId, speed: f32 },
    /// Defaults, default layer weights, entry states.
    Reset { inst: InstId },
}
