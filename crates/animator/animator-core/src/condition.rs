//! Condition evaluation.
//!
//! Equality comparisons are bit-exact on the typed value (no epsilon). Mode/type
//! combinations are validated when the blob is built, so an illegal pairing here
//! simply evaluates to `false` in release builds.

use crate::blob::{Condition, ConditionMode, ParameterType};
use crate::params::{ParameterTable, ParameterValue};

/// Evaluate one condition against the current value of its parameter.
#[inline]
pub fn evaluate(condition: &Condition, ty: ParameterType, value: ParameterValue) -> bool {
    let Some(mode) = condition.mode() else {
        debug_assert!(false, "invalid condition mode {}", condition.raw_mode());
        return false;
    };
    debug_assert!(mode.accepts(ty), "condition {mode:?} on {ty:?} parameter");
    let literal = condition.compare_value;
    match (mode, ty) {
        (ConditionMode::If, ParameterType::Bool | ParameterType::Trigger) => value.bool(),
        (ConditionMode::IfNot, ParameterType::Bool | ParameterType::Trigger) => !value.bool(),
        (ConditionMode::Greater, ParameterType::Float) => value.float() > literal.float(),
        (ConditionMode::Less, ParameterType::Float) => value.float() < literal.float(),
        (ConditionMode::Equals, ParameterType::Float) => value.float() == literal.float(),
        (ConditionMode::NotEqual, ParameterType::Float) => value.float() != literal.float(),
        (ConditionMode::Greater, ParameterType::Int) => value.int() > literal.int(),
        (ConditionMode::Less, ParameterType::Int) => value.int() < literal.int(),
        (ConditionMode::Equals, ParameterType::Int) => value.int() == literal.int(),
        (ConditionMode::NotEqual, ParameterType::Int) => value.int() != literal.int(),
        _ => false,
    }
}

/// Logical AND over a transition's conditions. An empty list holds.
#[inline]
pub fn evaluate_all(conditions: &[Condition], params: &ParameterTable) -> bool {
    conditions.iter().all(|c| {
        let index = c.parameter_index as usize;
        evaluate(c, params.parameter_type(index), params.raw(index))
    })
}

/// Consume every trigger referenced by a transition that just fired.
pub fn consume_triggers(conditions: &[Condition], params: &mut ParameterTable) {
    for c in conditions {
        let index = c.parameter_index as usize;
        if params.parameter_type(index) == ParameterType::Trigger {
            params.consume_trigger(index);
        }
    }
}
