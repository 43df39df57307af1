//! Controller blob: the immutable, flattened description of an animation controller.
//!
//! Every record is `#[repr(C)]` Pod data and every variable-length array is a
//! [`Span`] (offset + length) into one of the blob's shared pools, so the whole
//! blob is pointer-free and relocatable. Sub-state machines are already inlined,
//! entry/exit chains are collapsed into direct state-to-state transitions and all
//! indices were validated when the blob was built or decoded.
//!
//! Index fields use `-1` as the "absent" sentinel unless documented otherwise.

pub mod layout;

use bytemuck::{Pod, Zeroable};
use std::ops::Range;

use crate::bits::{get_bit, get_bits, set_bit, set_bits};
use crate::fixed_string::{FixedString128, FixedString64};
use crate::params::ParameterValue;

pub use layout::{LayoutError, BLOB_MAGIC, BLOB_VERSION};

/// Offset + length of a run of records inside one of the blob pools.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Span {
    pub offset: u32,
    pub len: u32,
}

impl Span {
    pub const EMPTY: Span = Span { offset: 0, len: 0 };

    pub fn new(offset: usize, len: usize) -> Self {
        Span {
            offset: offset as u32,
            len: len as u32,
        }
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.len as usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[inline]
fn slice<T>(pool: &[T], span: Span) -> &[T] {
    &pool[span.range()]
}

/// Declared type of a controller parameter. Stored as 2 bits per parameter.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ParameterType {
    Float = 0,
    Int = 1,
    Bool = 2,
    Trigger = 3,
}

impl ParameterType {
    #[inline]
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => ParameterType::Float,
            1 => ParameterType::Int,
            2 => ParameterType::Bool,
            _ => ParameterType::Trigger,
        }
    }

    #[inline]
    pub fn is_boolean(self) -> bool {
        matches!(self, ParameterType::Bool | ParameterType::Trigger)
    }
}

/// Number of `u32` words needed to pack `parameter_count` 2-bit type tags.
#[inline]
pub fn packed_types_array_length(parameter_count: usize) -> usize {
    (parameter_count + 15) >> 4
}

/// Pack `ty` into its 2-bit slot of a packed type array.
#[inline]
pub fn pack_parameter_type(packed: &mut [u32], index: usize, ty: ParameterType) {
    set_bits(&mut packed[index >> 4], ((index & 0xf) << 1) as u32, 2, ty as u32);
}

/// Read the 2-bit type tag of parameter `index`.
#[inline]
pub fn unpack_parameter_type(packed: &[u32], index: usize) -> ParameterType {
    ParameterType::from_bits(get_bits(packed[index >> 4], ((index & 0xf) << 1) as u32, 2))
}

const INVALID_PACKED_INDEX: u16 = 0x7fff;

/// What a [`MotionIndex`] points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Motion {
    /// Leaf clip, resolved by the external clip source.
    Clip(u16),
    /// Index into [`ControllerBlob::blend_trees`].
    BlendTree(u16),
    None,
}

/// 16-bit tagged motion reference: 15-bit index plus a blend-tree discriminant bit.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct MotionIndex {
    packed: u16,
}

impl MotionIndex {
    pub const INVALID: MotionIndex = MotionIndex {
        packed: INVALID_PACKED_INDEX,
    };

    /// Largest index a motion reference can address.
    pub const MAX_INDEX: u16 = INVALID_PACKED_INDEX - 1;

    pub fn clip(index: u16) -> Self {
        let mut m = MotionIndex { packed: 0 };
        m.set_index(index);
        m
    }

    pub fn blend_tree(index: u16) -> Self {
        let mut m = MotionIndex::clip(index);
        set_bit(&mut m.packed, 15, true);
        m
    }

    #[inline]
    pub fn index(self) -> u16 {
        get_bits(self.packed, 0, 15)
    }

    fn set_index(&mut self, index: u16) {
        debug_assert!(index <= INVALID_PACKED_INDEX);
        set_bits(&mut self.packed, 0, 15, index);
    }

    #[inline]
    pub fn is_blend_tree(self) -> bool {
        get_bit(self.packed, 15)
    }

    #[inline]
    pub fn is_invalid(self) -> bool {
        self.index() == INVALID_PACKED_INDEX
    }

    #[inline]
    pub fn motion(self) -> Motion {
        if self.is_invalid() {
            Motion::None
        } else if self.is_blend_tree() {
            Motion::BlendTree(self.index())
        } else {
            Motion::Clip(self.index())
        }
    }
}

impl std::fmt::Debug for MotionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MotionIndex({:?})", self.motion())
    }
}

/// Packed reference to a transition as seen by event consumers: 15-bit index
/// plus a high bit set for any-state transitions.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable, serde::Serialize, serde::Deserialize)]
pub struct TransitionIndex {
    pub packed: u16,
}

impl TransitionIndex {
    pub const INVALID: TransitionIndex = TransitionIndex {
        packed: INVALID_PACKED_INDEX,
    };

    pub fn local(index: u16) -> Self {
        let mut t = TransitionIndex { packed: 0 };
        set_bits(&mut t.packed, 0, 15, index);
        t
    }

    pub fn any_state(index: u16) -> Self {
        let mut t = TransitionIndex::local(index);
        set_bit(&mut t.packed, 15, true);
        t
    }

    #[inline]
    pub fn index(self) -> u16 {
        get_bits(self.packed, 0, 15)
    }

    #[inline]
    pub fn is_any_state_transition(self) -> bool {
        get_bit(self.packed, 15)
    }

    #[inline]
    pub fn is_invalid(self) -> bool {
        self.index() == INVALID_PACKED_INDEX
    }
}

impl std::fmt::Debug for TransitionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_invalid() {
            f.write_str("TransitionIndex(invalid)")
        } else if self.is_any_state_transition() {
            write!(f, "TransitionIndex(any:{})", self.index())
        } else {
            write!(f, "TransitionIndex({})", self.index())
        }
    }
}

/// One animation layer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Layer {
    /// Default weight; layer 0 always evaluates at full weight.
    pub weight: f32,
    /// Layer this one syncs with, `-1` when not a sync layer.
    pub sync_layer_index: i16,
    pub state_machine_index: i16,
    /// Index into the external bone-mask set, `-1` when unmasked.
    pub bone_mask_index: i16,
    packed_flags: u16,
    /// One motion per state of the layer's state machine, indexed by
    /// `State::state_index_in_state_machine`. Pool: [`ControllerBlob::motion_indices`].
    pub motion_indices: Span,
    pub name: FixedString128,
}

impl Layer {
    pub fn new(name: FixedString128, weight: f32, state_machine_index: i16) -> Self {
        Layer {
            weight,
            sync_layer_index: -1,
            state_machine_index,
            bone_mask_index: -1,
            packed_flags: 0,
            motion_indices: Span::EMPTY,
            name,
        }
    }

    pub fn perform_ik_pass(&self) -> bool {
        get_bit(self.packed_flags, 0)
    }
    pub fn set_perform_ik_pass(&mut self, v: bool) {
        set_bit(&mut self.packed_flags, 0, v)
    }
    pub fn is_sync_layer(&self) -> bool {
        get_bit(self.packed_flags, 1)
    }
    pub fn set_is_sync_layer(&mut self, v: bool) {
        set_bit(&mut self.packed_flags, 1, v)
    }
    pub fn sync_layer_uses_blended_timings(&self) -> bool {
        get_bit(self.packed_flags, 2)
    }
    pub fn set_sync_layer_uses_blended_timings(&mut self, v: bool) {
        set_bit(&mut self.packed_flags, 2, v)
    }
    /// Additive when set, override otherwise.
    pub fn use_additive_blending(&self) -> bool {
        get_bit(self.packed_flags, 3)
    }
    pub fn set_use_additive_blending(&mut self, v: bool) {
        set_bit(&mut self.packed_flags, 3, v)
    }
}

/// Comparison applied by a [`Condition`].
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ConditionMode {
    If = 1,
    IfNot = 2,
    Greater = 3,
    Less = 4,
    Equals = 6,
    NotEqual = 7,
}

impl ConditionMode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(ConditionMode::If),
            2 => Some(ConditionMode::IfNot),
            3 => Some(ConditionMode::Greater),
            4 => Some(ConditionMode::Less),
            6 => Some(ConditionMode::Equals),
            7 => Some(ConditionMode::NotEqual),
            _ => None,
        }
    }

    /// Whether this mode is legal for a parameter of type `ty`.
    pub fn accepts(self, ty: ParameterType) -> bool {
        match self {
            ConditionMode::If | ConditionMode::IfNot => ty.is_boolean(),
            _ => !ty.is_boolean(),
        }
    }
}

/// A single comparison of a parameter against a literal.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Condition {
    /// Literal, typed per the parameter's declared type.
    pub compare_value: ParameterValue,
    pub parameter_index: i16,
    mode: u8,
    _pad: u8,
}

impl Condition {
    pub fn new(parameter_index: i16, mode: ConditionMode, compare_value: ParameterValue) -> Self {
        Condition {
            compare_value,
            parameter_index,
            mode: mode as u8,
            _pad: 0,
        }
    }

    #[inline]
    pub fn mode(&self) -> Option<ConditionMode> {
        ConditionMode::from_raw(self.mode)
    }

    pub(crate) fn raw_mode(&self) -> u8 {
        self.mode
    }
}

/// Which states' transitions may interrupt an in-progress transition.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum InterruptionSource {
    #[default]
    None = 0,
    Source = 1,
    Destination = 2,
    SourceThenDestination = 3,
    DestinationThenSource = 4,
}

impl InterruptionSource {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(InterruptionSource::None),
            1 => Some(InterruptionSource::Source),
            2 => Some(InterruptionSource::Destination),
            3 => Some(InterruptionSource::SourceThenDestination),
            4 => Some(InterruptionSource::DestinationThenSource),
            _ => None,
        }
    }
}

/// A timed, conditioned edge between two states (or from any state).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Transition {
    /// All must hold. Pool: [`ControllerBlob::conditions`].
    pub conditions: Span,
    /// Seconds when `uses_realtime_duration`, otherwise a fraction of the source state's cycle.
    pub duration: f32,
    /// Normalized time the destination state starts from.
    pub normalized_offset: f32,
    /// Exact crossover threshold. Below 1 it re-arms every loop, at or above 1 it fires once.
    pub normalized_exit_time: f32,
    pub destination_state_index: i16,
    interruption_source: u8,
    packed_flags: u8,
}

impl Transition {
    pub fn new(destination_state_index: i16) -> Self {
        Transition {
            conditions: Span::EMPTY,
            duration: 0.0,
            normalized_offset: 0.0,
            normalized_exit_time: 0.0,
            destination_state_index,
            interruption_source: InterruptionSource::None as u8,
            packed_flags: 0,
        }
    }

    #[inline]
    pub fn interruption_source(&self) -> InterruptionSource {
        InterruptionSource::from_raw(self.interruption_source).unwrap_or_default()
    }
    pub fn set_interruption_source(&mut self, v: InterruptionSource) {
        self.interruption_source = v as u8;
    }
    pub(crate) fn raw_interruption_source(&self) -> u8 {
        self.interruption_source
    }

    #[inline]
    pub fn has_exit_time(&self) -> bool {
        get_bit(self.packed_flags, 0)
    }
    pub fn set_has_exit_time(&mut self, v: bool) {
        set_bit(&mut self.packed_flags, 0, v)
    }
    #[inline]
    pub fn uses_realtime_duration(&self) -> bool {
        get_bit(self.packed_flags, 1)
    }
    pub fn set_uses_realtime_duration(&mut self, v: bool) {
        set_bit(&mut self.packed_flags, 1, v)
    }
    #[inline]
    pub fn uses_ordered_interruptions(&self) -> bool {
        get_bit(self.packed_flags, 2)
    }
    pub fn set_uses_ordered_interruptions(&mut self, v: bool) {
        set_bit(&mut self.packed_flags, 2, v)
    }
    /// Only meaningful for any-state transitions.
    #[inline]
    pub fn can_transition_to_self(&self) -> bool {
        get_bit(self.packed_flags, 3)
    }
    pub fn set_can_transition_to_self(&mut self, v: bool) {
        set_bit(&mut self.packed_flags, 3, v)
    }
}

/// A node of a flattened state machine.
///
/// State time drives transitions. Motion time samples the motion; it defaults to
/// state time but may be overridden by a parameter, which never writes back.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct State {
    /// Ordered by priority. Pool: [`ControllerBlob::transitions`].
    pub transitions: Span,
    pub base_state_speed: f32,
    /// Added to motion time, not state time.
    pub motion_cycle_offset: f32,
    pub state_speed_multiplier_parameter_index: i16,
    pub motion_cycle_offset_parameter_index: i16,
    pub mirror_parameter_index: i16,
    pub motion_time_override_parameter_index: i16,
    /// Index into `Layer::motion_indices` for every layer using this state machine.
    pub state_index_in_state_machine: i16,
    packed_flags: u16,
}

impl State {
    pub fn new(state_index_in_state_machine: i16) -> Self {
        State {
            transitions: Span::EMPTY,
            base_state_speed: 1.0,
            motion_cycle_offset: 0.0,
            state_speed_multiplier_parameter_index: -1,
            motion_cycle_offset_parameter_index: -1,
            mirror_parameter_index: -1,
            motion_time_override_parameter_index: -1,
            state_index_in_state_machine,
            packed_flags: 0,
        }
    }

    pub fn use_foot_ik(&self) -> bool {
        get_bit(self.packed_flags, 0)
    }
    pub fn set_use_foot_ik(&mut self, v: bool) {
        set_bit(&mut self.packed_flags, 0, v)
    }
    pub fn use_mirror(&self) -> bool {
        get_bit(self.packed_flags, 1)
    }
    pub fn set_use_mirror(&mut self, v: bool) {
        set_bit(&mut self.packed_flags, 1, v)
    }
}

/// One flattened state graph, shared by every layer that references it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct StateMachine {
    /// Sync layers whose weights blend this machine's timings. Pool: `indices`.
    pub influencing_sync_layers: Span,
    /// Pool: `states`.
    pub states: Span,
    /// Evaluated before local transitions. Pool: `transitions`.
    pub any_state_transitions: Span,
    /// Index 0 is the unconditional default. Only destinations and conditions matter.
    pub initialization_entry_state_transitions: Span,
    /// Short-name hashes. Pool: `hashes`.
    pub state_name_hashes: Span,
    /// Full-path hashes. Pool: `hashes`.
    pub state_editor_name_hashes: Span,
    /// Pool: `labels`.
    pub state_names: Span,
    /// Pool: `labels`.
    pub state_tags: Span,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BlendTreeType {
    Simple1D = 0,
    SimpleDirectional2D = 1,
    FreeformDirectional2D = 2,
    FreeformCartesian2D = 3,
    Direct = 4,
}

impl BlendTreeType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(BlendTreeType::Simple1D),
            1 => Some(BlendTreeType::SimpleDirectional2D),
            2 => Some(BlendTreeType::FreeformDirectional2D),
            3 => Some(BlendTreeType::FreeformCartesian2D),
            4 => Some(BlendTreeType::Direct),
            _ => None,
        }
    }

    pub fn is_2d(self) -> bool {
        matches!(
            self,
            BlendTreeType::SimpleDirectional2D
                | BlendTreeType::FreeformDirectional2D
                | BlendTreeType::FreeformCartesian2D
        )
    }
}

/// A parameter-driven weighted combination of child motions.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct BlendTree {
    /// Pool: `blend_tree_children`. 1D children are sorted by threshold.
    pub children: Span,
    /// One index for 1D, two for 2D, one per child for Direct. Pool: `indices`.
    pub parameter_indices: Span,
    blend_tree_type: u8,
    packed_flags: u8,
    _pad: [u8; 2],
}

impl BlendTree {
    pub fn new(ty: BlendTreeType) -> Self {
        BlendTree {
            children: Span::EMPTY,
            parameter_indices: Span::EMPTY,
            blend_tree_type: ty as u8,
            packed_flags: 0,
            _pad: [0; 2],
        }
    }

    #[inline]
    pub fn blend_tree_type(&self) -> BlendTreeType {
        BlendTreeType::from_raw(self.blend_tree_type).unwrap_or(BlendTreeType::Simple1D)
    }
    pub(crate) fn raw_blend_tree_type(&self) -> u8 {
        self.blend_tree_type
    }

    /// Direct trees only: rescale child weights to sum to 1.
    #[inline]
    pub fn normalize_blend_values(&self) -> bool {
        get_bit(self.packed_flags, 0)
    }
    pub fn set_normalize_blend_values(&mut self, v: bool) {
        set_bit(&mut self.packed_flags, 0, v)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct BlendTreeChild {
    pub position: [f32; 2],
    pub cycle_offset: f32,
    pub time_scale: f32,
    /// 1D trees only.
    pub threshold: f32,
    pub motion_index: MotionIndex,
    packed_flags: u16,
}

impl BlendTreeChild {
    pub fn new(motion_index: MotionIndex) -> Self {
        BlendTreeChild {
            position: [0.0; 2],
            cycle_offset: 0.0,
            time_scale: 1.0,
            threshold: 0.0,
            motion_index,
            packed_flags: 0,
        }
    }

    pub fn is_looping(&self) -> bool {
        get_bit(self.packed_flags, 0)
    }
    pub fn set_is_looping(&mut self, v: bool) {
        set_bit(&mut self.packed_flags, 0, v)
    }
    pub fn mirrored(&self) -> bool {
        get_bit(self.packed_flags, 1)
    }
    pub fn set_mirrored(&mut self, v: bool) {
        set_bit(&mut self.packed_flags, 1, v)
    }
}

/// Root aggregate. Built once, then shared read-only (typically behind `Arc`)
/// by every controller instance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControllerBlob {
    pub name: FixedString128,

    /// 2 bits per parameter, 16 parameters per word.
    pub parameter_types: Vec<u32>,
    pub parameter_name_hashes: Vec<i32>,
    pub parameter_editor_name_hashes: Vec<i32>,
    pub parameter_names: Vec<FixedString64>,
    pub parameter_defaults: Vec<ParameterValue>,

    /// Evaluation order; layer 0 is the full-weight base layer.
    pub layers: Vec<Layer>,
    pub state_machines: Vec<StateMachine>,
    pub blend_trees: Vec<BlendTree>,

    // Pools addressed by `Span`.
    pub motion_indices: Vec<MotionIndex>,
    pub states: Vec<State>,
    pub transitions: Vec<Transition>,
    pub conditions: Vec<Condition>,
    pub blend_tree_children: Vec<BlendTreeChild>,
    pub indices: Vec<i16>,
    pub hashes: Vec<i32>,
    pub labels: Vec<FixedString128>,
}

impl ControllerBlob {
    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.parameter_name_hashes.len()
    }

    #[inline]
    pub fn parameter_type(&self, index: usize) -> ParameterType {
        unpack_parameter_type(&self.parameter_types, index)
    }

    /// Find a parameter by its name hash (or editor name hash).
    pub fn find_parameter(&self, hash: i32) -> Option<usize> {
        self.parameter_name_hashes
            .iter()
            .position(|h| *h == hash)
            .or_else(|| {
                self.parameter_editor_name_hashes
                    .iter()
                    .position(|h| *h == hash)
            })
    }

    pub fn find_parameter_by_name(&self, name: &str) -> Option<usize> {
        self.find_parameter(crate::hash::name_hash(name))
    }

    /// One past the highest clip index any layer or blend tree child refers to,
    /// so a clip source must hold at least this many clips.
    pub fn required_clip_count(&self) -> usize {
        self.motion_indices
            .iter()
            .chain(self.blend_tree_children.iter().map(|c| &c.motion_index))
            .filter_map(|m| match m.motion() {
                Motion::Clip(clip) => Some(clip as usize + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    #[inline]
    pub fn layer_motions(&self, layer: &Layer) -> &[MotionIndex] {
        slice(&self.motion_indices, layer.motion_indices)
    }

    #[inline]
    pub fn states(&self, sm: &StateMachine) -> &[State] {
        slice(&self.states, sm.states)
    }

    #[inline]
    pub fn state_transitions(&self, state: &State) -> &[Transition] {
        slice(&self.transitions, state.transitions)
    }

    #[inline]
    pub fn any_state_transitions(&self, sm: &StateMachine) -> &[Transition] {
        slice(&self.transitions, sm.any_state_transitions)
    }

    #[inline]
    pub fn entry_transitions(&self, sm: &StateMachine) -> &[Transition] {
        slice(&self.transitions, sm.initialization_entry_state_transitions)
    }

    #[inline]
    pub fn conditions(&self, transition: &Transition) -> &[Condition] {
        slice(&self.conditions, transition.conditions)
    }

    #[inline]
    pub fn influencing_sync_layers(&self, sm: &StateMachine) -> &[i16] {
        slice(&self.indices, sm.influencing_sync_layers)
    }

    #[inline]
    pub fn children(&self, tree: &BlendTree) -> &[BlendTreeChild] {
        slice(&self.blend_tree_children, tree.children)
    }

    #[inline]
    pub fn blend_parameters(&self, tree: &BlendTree) -> &[i16] {
        slice(&self.indices, tree.parameter_indices)
    }

    pub fn state_name(&self, sm: &StateMachine, state: usize) -> &str {
        slice(&self.labels, sm.state_names)[state].as_str()
    }

    pub fn state_tag(&self, sm: &StateMachine, state: usize) -> &str {
        slice(&self.labels, sm.state_tags)[state].as_str()
    }

    /// Find a state by short-name hash or full-path hash.
    pub fn find_state(&self, sm: &StateMachine, hash: i32) -> Option<usize> {
        slice(&self.hashes, sm.state_name_hashes)
            .iter()
            .position(|h| *h == hash)
            .or_else(|| {
                slice(&self.hashes, sm.state_editor_name_hashes)
                    .iter()
                    .position(|h| *h == hash)
            })
    }

    /// Motion a layer plays for `state`.
    #[inline]
    pub fn state_motion(&self, layer: &Layer, state: &State) -> MotionIndex {
        self.layer_motions(layer)[state.state_index_in_state_machine as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_match_layout() {
        use std::mem::size_of;
        assert_eq!(size_of::<Span>(), 8);
        assert_eq!(size_of::<MotionIndex>(), 2);
        assert_eq!(size_of::<Layer>(), 148);
        assert_eq!(size_of::<Condition>(), 8);
        assert_eq!(size_of::<Transition>(), 24);
        assert_eq!(size_of::<State>(), 28);
        assert_eq!(size_of::<StateMachine>(), 64);
        assert_eq!(size_of::<BlendTree>(), 20);
        assert_eq!(size_of::<BlendTreeChild>(), 24);
    }

    #[test]
    fn packed_types_length_is_ceil_div_16() {
        for p in 0..200usize {
            assert_eq!(packed_types_array_length(p), (p + 15) / 16);
        }
    }

    #[test]
    fn parameter_types_round_trip() {
        let types = [
            ParameterType::Float,
            ParameterType::Int,
            ParameterType::Bool,
            ParameterType::Trigger,
        ];
        for count in [1usize, 15, 16, 17, 33, 64] {
            let mut packed = vec![0u32; packed_types_array_length(count)];
            for i in 0..count {
                pack_parameter_type(&mut packed, i, types[(i * 7 + 3) % 4]);
            }
            for i in 0..count {
                assert_eq!(unpack_parameter_type(&packed, i), types[(i * 7 + 3) % 4]);
            }
        }
    }

    #[test]
    fn motion_index_tagging() {
        assert_eq!(MotionIndex::clip(5).motion(), Motion::Clip(5));
        assert_eq!(MotionIndex::blend_tree(3).motion(), Motion::BlendTree(3));
        assert!(MotionIndex::INVALID.is_invalid());
        assert_eq!(MotionIndex::INVALID.motion(), Motion::None);
        assert!(!MotionIndex::blend_tree(MotionIndex::MAX_INDEX).is_invalid());
    }

    #[test]
    fn required_clip_count_covers_layers_and_children() {
        let mut blob = ControllerBlob::default();
        assert_eq!(blob.required_clip_count(), 0);
        blob.motion_indices = vec![MotionIndex::clip(2), MotionIndex::blend_tree(0), MotionIndex::INVALID];
        assert_eq!(blob.required_clip_count(), 3);
        blob.blend_tree_children = vec![BlendTreeChild::new(MotionIndex::clip(7))];
        assert_eq!(blob.required_clip_count(), 8);
    }

    #[test]
    fn transition_index_high_bit_marks_any_state() {
        let local = TransitionIndex::local(9);
        let any = TransitionIndex::any_state(9);
        assert!(!local.is_any_state_transition());
        assert!(any.is_any_state_transition());
        assert_eq!(local.index(), any.index());
        assert_eq!(any.packed, 0x8009);
        assert!(TransitionIndex::INVALID.is_invalid());
    }

    #[test]
    fn transition_flags_are_independent() {
        let mut t = Transition::new(1);
        t.set_has_exit_time(true);
        t.set_can_transition_to_self(true);
        assert!(t.has_exit_time());
        assert!(!t.uses_realtime_duration());
        assert!(!t.uses_ordered_interruptions());
        assert!(t.can_transition_to_self());
        t.set_interruption_source(InterruptionSource::DestinationThenSource);
        assert_eq!(
            t.interruption_source(),
            InterruptionSource::DestinationThenSource
        );
        assert!(t.has_exit_time());
    }

    #[test]
    fn condition_modes_match_parameter_types() {
        assert!(ConditionMode::If.accepts(ParameterType::Trigger));
        assert!(ConditionMode::IfNot.accepts(ParameterType::Bool));
        assert!(!ConditionMode::If.accepts(ParameterType::Float));
        assert!(ConditionMode::Equals.accepts(ParameterType::Int));
        assert!(!ConditionMode::Greater.accepts(ParameterType::Bool));
        assert_eq!(ConditionMode::from_raw(5), None);
    }
}
