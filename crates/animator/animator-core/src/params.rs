//! Parameter values and the per-instance parameter table.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::blob::{ControllerBlob, ParameterType};

/// Untyped 32-bit parameter payload. The declared [`ParameterType`] decides
/// whether the bits are read as `f32`, `i32` or `bool`.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct ParameterValue {
    bits: u32,
}

impl ParameterValue {
    #[inline]
    pub fn from_float(v: f32) -> Self {
        ParameterValue { bits: v.to_bits() }
    }

    #[inline]
    pub fn from_int(v: i32) -> Self {
        ParameterValue { bits: v as u32 }
    }

    #[inline]
    pub fn from_bool(v: bool) -> Self {
        ParameterValue { bits: v as u32 }
    }

    #[inline]
    pub fn float(self) -> f32 {
        f32::from_bits(self.bits)
    }

    #[inline]
    pub fn int(self) -> i32 {
        self.bits as i32
    }

    #[inline]
    pub fn bool(self) -> bool {
        self.bits != 0
    }

    pub fn bits(self) -> u32 {
        self.bits
    }
}

impl std::fmt::Debug for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ParameterValue({:#010x})", self.bits)
    }
}

/// Typed parameter literal as it appears in authoring data and host inputs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TypedValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Trigger(bool),
}

impl TypedValue {
    pub fn parameter_type(&self) -> ParameterType {
        match self {
            TypedValue::Float(_) => ParameterType::Float,
            TypedValue::Int(_) => ParameterType::Int,
            TypedValue::Bool(_) => ParameterType::Bool,
            TypedValue::Trigger(_) => ParameterType::Trigger,
        }
    }

    pub fn to_value(self) -> ParameterValue {
        match self {
            TypedValue::Float(v) => ParameterValue::from_float(v),
            TypedValue::Int(v) => ParameterValue::from_int(v),
            TypedValue::Bool(v) | TypedValue::Trigger(v) => ParameterValue::from_bool(v),
        }
    }
}

/// Current parameter values of one controller instance.
///
/// Reads and writes are typed; using the wrong accessor for a parameter's declared
/// type is a caller defect and only checked in debug builds.
#[derive(Clone, Debug, Default)]
pub struct ParameterTable {
    values: Vec<ParameterValue>,
    types: Vec<ParameterType>,
}

impl ParameterTable {
    /// Table seeded with the blob's default values.
    pub fn from_blob(blob: &ControllerBlob) -> Self {
        let count = blob.parameter_count();
        let types = (0..count).map(|i| blob.parameter_type(i)).collect();
        let mut values = blob.parameter_defaults.clone();
        values.resize(count, ParameterValue::default());
        ParameterTable { values, types }
    }

    pub fn reset_to_defaults(&mut self, blob: &ControllerBlob) {
        for (i, v) in self.values.iter_mut().enumerate() {
            *v = blob
                .parameter_defaults
                .get(i)
                .copied()
                .unwrap_or_default();
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn parameter_type(&self, index: usize) -> ParameterType {
        self.types[index]
    }

    #[inline]
    pub fn raw(&self, index: usize) -> ParameterValue {
        self.values[index]
    }

    #[inline]
    pub fn set_raw(&mut self, index: usize, value: ParameterValue) {
        self.values[index] = value;
    }

    #[inline]
    pub fn get_float(&self, index: usize) -> f32 {
        debug_assert_eq!(self.types[index], ParameterType::Float);
        self.values[index].float()
    }

    #[inline]
    pub fn get_int(&self, index: usize) -> i32 {
        debug_assert_eq!(self.types[index], ParameterType::Int);
        self.values[index].int()
    }

    /// Read a Bool or Trigger parameter without consuming it.
    #[inline]
    pub fn get_bool(&self, index: usize) -> bool {
        debug_assert!(self.types[index].is_boolean());
        self.values[index].bool()
    }

    /// Numeric read that accepts Float or Int parameters, used by blend trees
    /// and speed multipliers.
    #[inline]
    pub fn get_numeric(&self, index: usize) -> f32 {
        match self.types[index] {
            ParameterType::Int => self.values[index].int() as f32,
            ParameterType::Float => self.values[index].float(),
            _ => {
                debug_assert!(false, "parameter {index} is not numeric");
                0.0
            }
        }
    }

    #[inline]
    pub fn set_float(&mut self, index: usize, v: f32) {
        debug_assert_eq!(self.types[index], ParameterType::Float);
        self.values[index] = ParameterValue::from_float(v);
    }

    #[inline]
    pub fn set_int(&mut self, index: usize, v: i32) {
        debug_assert_eq!(self.types[index], ParameterType::Int);
        self.values[index] = ParameterValue::from_int(v);
    }

    #[inline]
    pub fn set_bool(&mut self, index: usize, v: bool) {
        debug_assert!(self.types[index].is_boolean());
        self.values[index] = ParameterValue::from_bool(v);
    }

    /// Fire a trigger. It stays visible until a transition consumes it or the
    /// end of the next controller update.
    #[inline]
    pub fn set_trigger(&mut self, index: usize) {
        debug_assert_eq!(self.types[index], ParameterType::Trigger);
        self.values[index] = ParameterValue::from_bool(true);
    }

    #[inline]
    pub fn reset_trigger(&mut self, index: usize) {
        debug_assert_eq!(self.types[index], ParameterType::Trigger);
        self.values[index] = ParameterValue::from_bool(false);
    }

    /// Read a trigger and reset it.
    #[inline]
    pub fn consume_trigger(&mut self, index: usize) -> bool {
        debug_assert_eq!(self.types[index], ParameterType::Trigger);
        let fired = self.values[index].bool();
        self.values[index] = ParameterValue::from_bool(false);
        fired
    }

    /// Reset every trigger; called once the layers of an update have been evaluated.
    pub fn clear_triggers(&mut self) {
        for (v, ty) in self.values.iter_mut().zip(self.types.iter()) {
            if *ty == ParameterType::Trigger {
                *v = ParameterValue::from_bool(false);
            }
        }
    }

    /// Write a typed value, rejecting a type that does not match the declaration.
    pub fn set_typed(&mut self, index: usize, value: TypedValue) -> bool {
        if index >= self.values.len() || self.types[index] != value.parameter_type() {
            return false;
        }
        self.values[index] = value.to_value();
        true
    }
}
