//! Flat binary form of a [`ControllerBlob`].
//!
//! Layout: a fixed header, a table of `(offset, count)` entries (one per pool, in
//! declaration order) and the pools themselves as native-endian Pod bytes,
//! each section 4-byte aligned. The byte order marker in the header rejects blobs
//! written on a machine of the other endianness instead of misreading them.

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use log::debug;
use thiserror::Error;

use super::{
    packed_types_array_length, unpack_parameter_type, BlendTreeType, ConditionMode,
    ControllerBlob, InterruptionSource, Motion, MotionIndex, ParameterType, Span,
};
use crate::fixed_string::FixedString128;

pub const BLOB_MAGIC: [u8; 4] = *b"ACTB";
pub const BLOB_VERSION: u32 = 1;
const BYTE_ORDER_MARKER: u32 = 0x0102_0304;
const SECTION_COUNT: usize = 16;
const SECTION_NAMES: [&str; SECTION_COUNT] = [
    "parameter_types",
    "parameter_name_hashes",
    "parameter_editor_name_hashes",
    "parameter_names",
    "parameter_defaults",
    "layers",
    "state_machines",
    "blend_trees",
    "motion_indices",
    "states",
    "transitions",
    "conditions",
    "blend_tree_children",
    "indices",
    "hashes",
    "labels",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("blob truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("not a controller blob (bad magic)")]
    BadMagic,
    #[error("controller blob was written with a different byte order")]
    ByteOrder,
    #[error("unsupported controller blob version {0}")]
    UnsupportedVersion(u32),
    #[error("unexpected section count {0}")]
    SectionCount(u32),
    #[error("section `{0}` lies outside the blob")]
    SectionOutOfBounds(&'static str),
    #[error("{what} {index}: span out of range")]
    SpanOutOfRange { what: &'static str, index: usize },
    #[error("{what} {index}: index {value} out of range")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        value: i64,
    },
    #[error("{what} {index}: invalid value {value}")]
    InvalidValue {
        what: &'static str,
        index: usize,
        value: u32,
    },
    #[error("inconsistent blob: {0}")]
    Mismatch(String),
    #[error("blend tree {0} contains itself")]
    CyclicBlendTree(usize),
    #[error("the base layer cannot be a sync layer")]
    BaseSyncLayer,
    #[error("layer {layer} syncs with layer {target}, which is itself a sync layer")]
    SyncTargetIsSync { layer: usize, target: i16 },
    #[error("layer {layer} syncs with layer {target} but uses a different state machine")]
    SyncMachineMismatch { layer: usize, target: i16 },
    #[error("state machine {state_machine}: layer {layer} is not a blended-timing sync layer of it")]
    InfluencingSyncLayer { state_machine: usize, layer: i16 },
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Header {
    magic: [u8; 4],
    version: u32,
    byte_order: u32,
    section_count: u32,
    name: FixedString128,
}

#[repr(C)]
#[derive(Clone, Copy, Default, Pod, Zeroable)]
struct SectionEntry {
    offset: u32,
    count: u32,
}

fn write_section<T: Pod>(out: &mut Vec<u8>, items: &[T]) -> SectionEntry {
    while out.len() % 4 != 0 {
        out.push(0);
    }
    let offset = out.len() as u32;
    out.extend_from_slice(bytemuck::cast_slice(items));
    SectionEntry {
        offset,
        count: items.len() as u32,
    }
}

fn read_section<T: Pod>(
    bytes: &[u8],
    entry: SectionEntry,
    name: &'static str,
) -> Result<Vec<T>, LayoutError> {
    let size = size_of::<T>();
    let start = entry.offset as usize;
    let end = (entry.count as usize)
        .checked_mul(size)
        .and_then(|len| start.checked_add(len))
        .filter(|end| *end <= bytes.len())
        .ok_or(LayoutError::SectionOutOfBounds(name))?;
    Ok(bytes[start..end]
        .chunks_exact(size)
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

fn check_span(span: Span, pool_len: usize, what: &'static str, index: usize) -> Result<(), LayoutError> {
    let end = span.offset as u64 + span.len as u64;
    if end > pool_len as u64 {
        return Err(LayoutError::SpanOutOfRange { what, index });
    }
    Ok(())
}

fn check_index(value: i16, len: usize, what: &'static str, index: usize) -> Result<(), LayoutError> {
    if value < 0 || value as usize >= len {
        return Err(LayoutError::IndexOutOfRange {
            what,
            index,
            value: value as i64,
        });
    }
    Ok(())
}

fn check_optional_index(value: i16, len: usize, what: &'static str, index: usize) -> Result<(), LayoutError> {
    if value == -1 {
        return Ok(());
    }
    check_index(value, len, what, index)
}

impl ControllerBlob {
    /// Serialize into the flat binary layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = Header {
            magic: BLOB_MAGIC,
            version: BLOB_VERSION,
            byte_order: BYTE_ORDER_MARKER,
            section_count: SECTION_COUNT as u32,
            name: self.name,
        };
        let mut out = Vec::new();
        out.extend_from_slice(bytemuck::bytes_of(&header));
        let table_at = out.len();
        out.resize(table_at + SECTION_COUNT * size_of::<SectionEntry>(), 0);

        let table: [SectionEntry; SECTION_COUNT] = [
            write_section(&mut out, &self.parameter_types),
            write_section(&mut out, &self.parameter_name_hashes),
            write_section(&mut out, &self.parameter_editor_name_hashes),
            write_section(&mut out, &self.parameter_names),
            write_section(&mut out, &self.parameter_defaults),
            write_section(&mut out, &self.layers),
            write_section(&mut out, &self.state_machines),
            write_section(&mut out, &self.blend_trees),
            write_section(&mut out, &self.motion_indices),
            write_section(&mut out, &self.states),
            write_section(&mut out, &self.transitions),
            write_section(&mut out, &self.conditions),
            write_section(&mut out, &self.blend_tree_children),
            write_section(&mut out, &self.indices),
            write_section(&mut out, &self.hashes),
            write_section(&mut out, &self.labels),
        ];
        out[table_at..table_at + size_of::<[SectionEntry; SECTION_COUNT]>()]
            .copy_from_slice(bytemuck::cast_slice(&table));
        while out.len() % 4 != 0 {
            out.push(0);
        }
        debug!("encoded controller `{}` into {} bytes", self.name.as_str(), out.len());
        out
    }

    /// Decode and validate a blob produced by [`ControllerBlob::to_bytes`].
    ///
    /// Every pool is copied into an owned `Vec`; the result does not borrow
    /// `bytes`, and `bytes` need not be aligned.
    pub fn from_bytes(bytes: &[u8]) -> Result<ControllerBlob, LayoutError> {
        let header_len = size_of::<Header>();
        let table_len = SECTION_COUNT * size_of::<SectionEntry>();
        if bytes.len() < header_len + table_len {
            return Err(LayoutError::Truncated {
                needed: header_len + table_len,
                actual: bytes.len(),
            });
        }
        let header: Header = bytemuck::pod_read_unaligned(&bytes[..header_len]);
        if header.magic != BLOB_MAGIC {
            return Err(LayoutError::BadMagic);
        }
        if header.byte_order != BYTE_ORDER_MARKER {
            return Err(LayoutError::ByteOrder);
        }
        if header.version != BLOB_VERSION {
            return Err(LayoutError::UnsupportedVersion(header.version));
        }
        if header.section_count as usize != SECTION_COUNT {
            return Err(LayoutError::SectionCount(header.section_count));
        }
        let table: Vec<SectionEntry> = bytes[header_len..header_len + table_len]
            .chunks_exact(size_of::<SectionEntry>())
            .map(bytemuck::pod_read_unaligned)
            .collect();
        macro_rules! section {
            ($i:expr) => {
                read_section(bytes, table[$i], SECTION_NAMES[$i])?
            };
        }

        let blob = ControllerBlob {
            name: header.name,
            parameter_types: section!(0),
            parameter_name_hashes: section!(1),
            parameter_editor_name_hashes: section!(2),
            parameter_names: section!(3),
            parameter_defaults: section!(4),
            layers: section!(5),
            state_machines: section!(6),
            blend_trees: section!(7),
            motion_indices: section!(8),
            states: section!(9),
            transitions: section!(10),
            conditions: section!(11),
            blend_tree_children: section!(12),
            indices: section!(13),
            hashes: section!(14),
            labels: section!(15),
        };
        blob.validate()?;
        debug!("decoded controller `{}` from {} bytes", blob.name.as_str(), bytes.len());
        Ok(blob)
    }

    /// Check every span, index and enum tag so evaluation can index without
    /// bounds surprises.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let params = self.parameter_count();
        if self.parameter_editor_name_hashes.len() != params
            || self.parameter_names.len() != params
            || self.parameter_defaults.len() != params
        {
            return Err(LayoutError::Mismatch(format!(
                "parameter arrays disagree on length ({params} hashes)"
            )));
        }
        if self.parameter_types.len() != packed_types_array_length(params) {
            return Err(LayoutError::Mismatch(format!(
                "{} packed type words for {params} parameters",
                self.parameter_types.len()
            )));
        }
        let ty = |i: i16| unpack_parameter_type(&self.parameter_types, i as usize);

        for (i, c) in self.conditions.iter().enumerate() {
            check_index(c.parameter_index, params, "condition", i)?;
            let mode = ConditionMode::from_raw(c.raw_mode()).ok_or(LayoutError::InvalidValue {
                what: "condition mode",
                index: i,
                value: c.raw_mode() as u32,
            })?;
            if !mode.accepts(ty(c.parameter_index)) {
                return Err(LayoutError::InvalidValue {
                    what: "condition mode for parameter type",
                    index: i,
                    value: mode as u32,
                });
            }
        }

        for (i, t) in self.transitions.iter().enumerate() {
            check_span(t.conditions, self.conditions.len(), "transition", i)?;
            if InterruptionSource::from_raw(t.raw_interruption_source()).is_none() {
                return Err(LayoutError::InvalidValue {
                    what: "interruption source",
                    index: i,
                    value: t.raw_interruption_source() as u32,
                });
            }
        }

        for (i, s) in self.states.iter().enumerate() {
            check_span(s.transitions, self.transitions.len(), "state", i)?;
            for p in [
                s.state_speed_multiplier_parameter_index,
                s.motion_cycle_offset_parameter_index,
                s.motion_time_override_parameter_index,
            ] {
                check_optional_index(p, params, "state parameter", i)?;
                if p >= 0 && ty(p).is_boolean() {
                    return Err(LayoutError::InvalidValue {
                        what: "state numeric parameter type",
                        index: i,
                        value: ty(p) as u32,
                    });
                }
            }
            check_optional_index(s.mirror_parameter_index, params, "state mirror parameter", i)?;
            if s.mirror_parameter_index >= 0 && ty(s.mirror_parameter_index) != ParameterType::Bool {
                return Err(LayoutError::InvalidValue {
                    what: "state mirror parameter type",
                    index: i,
                    value: ty(s.mirror_parameter_index) as u32,
                });
            }
        }

        for (i, sm) in self.state_machines.iter().enumerate() {
            check_span(sm.states, self.states.len(), "state machine states", i)?;
            for span in [
                sm.any_state_transitions,
                sm.initialization_entry_state_transitions,
            ] {
                check_span(span, self.transitions.len(), "state machine transitions", i)?;
            }
            for span in [sm.state_name_hashes, sm.state_editor_name_hashes] {
                check_span(span, self.hashes.len(), "state machine hashes", i)?;
            }
            for span in [sm.state_names, sm.state_tags] {
                check_span(span, self.labels.len(), "state machine labels", i)?;
            }
            check_span(sm.influencing_sync_layers, self.indices.len(), "state machine sync layers", i)?;

            let state_count = sm.states.len();
            for span in [
                sm.state_name_hashes,
                sm.state_editor_name_hashes,
                sm.state_names,
                sm.state_tags,
            ] {
                if span.len() != state_count {
                    return Err(LayoutError::Mismatch(format!(
                        "state machine {i}: {} metadata entries for {state_count} states",
                        span.len()
                    )));
                }
            }
            if sm.initialization_entry_state_transitions.is_empty() && state_count > 0 {
                return Err(LayoutError::Mismatch(format!(
                    "state machine {i} has no default entry transition"
                )));
            }
            for l in self.influencing_sync_layers(sm) {
                check_index(*l, self.layers.len(), "influencing sync layer", i)?;
            }
            for (s, state) in self.states(sm).iter().enumerate() {
                check_index(state.state_index_in_state_machine, state_count, "state index", s)?;
                for t in self.state_transitions(state) {
                    check_index(t.destination_state_index, state_count, "transition destination", s)?;
                }
            }
            for t in self
                .any_state_transitions(sm)
                .iter()
                .chain(self.entry_transitions(sm))
            {
                check_index(t.destination_state_index, state_count, "transition destination", i)?;
            }
        }

        for (i, child) in self.blend_tree_children.iter().enumerate() {
            self.check_motion(child.motion_index, "blend tree child", i)?;
        }
        for (i, tree) in self.blend_trees.iter().enumerate() {
            check_span(tree.children, self.blend_tree_children.len(), "blend tree children", i)?;
            check_span(tree.parameter_indices, self.indices.len(), "blend tree parameters", i)?;
            let kind = BlendTreeType::from_raw(tree.raw_blend_tree_type()).ok_or(
                LayoutError::InvalidValue {
                    what: "blend tree type",
                    index: i,
                    value: tree.raw_blend_tree_type() as u32,
                },
            )?;
            let expected = match kind {
                BlendTreeType::Simple1D => 1,
                BlendTreeType::Direct => tree.children.len(),
                _ => 2,
            };
            if tree.parameter_indices.len() != expected {
                return Err(LayoutError::Mismatch(format!(
                    "blend tree {i} ({kind:?}) has {} parameters, expected {expected}",
                    tree.parameter_indices.len()
                )));
            }
            for p in self.blend_parameters(tree) {
                check_index(*p, params, "blend tree parameter", i)?;
                if ty(*p).is_boolean() {
                    return Err(LayoutError::InvalidValue {
                        what: "blend tree parameter type",
                        index: i,
                        value: ty(*p) as u32,
                    });
                }
            }
        }
        self.check_blend_tree_cycles()?;

        for (i, layer) in self.layers.iter().enumerate() {
            check_index(layer.state_machine_index, self.state_machines.len(), "layer state machine", i)?;
            check_optional_index(layer.sync_layer_index, self.layers.len(), "layer sync source", i)?;
            if layer.is_sync_layer() != (layer.sync_layer_index >= 0) {
                return Err(LayoutError::Mismatch(format!(
                    "layer {i}: sync flag disagrees with sync layer index"
                )));
            }
            if layer.is_sync_layer() {
                if i == 0 {
                    return Err(LayoutError::BaseSyncLayer);
                }
                let target = layer.sync_layer_index;
                let source = &self.layers[target as usize];
                if source.is_sync_layer() {
                    return Err(LayoutError::SyncTargetIsSync { layer: i, target });
                }
                if source.state_machine_index != layer.state_machine_index {
                    return Err(LayoutError::SyncMachineMismatch { layer: i, target });
                }
            }
            check_span(layer.motion_indices, self.motion_indices.len(), "layer motions", i)?;
            let sm = &self.state_machines[layer.state_machine_index as usize];
            if layer.motion_indices.len() != sm.states.len() {
                return Err(LayoutError::Mismatch(format!(
                    "layer {i}: {} motions for {} states",
                    layer.motion_indices.len(),
                    sm.states.len()
                )));
            }
            for m in self.layer_motions(layer) {
                self.check_motion(*m, "layer motion", i)?;
            }
        }

        for (i, sm) in self.state_machines.iter().enumerate() {
            for &l in self.influencing_sync_layers(sm) {
                let layer = &self.layers[l as usize];
                if !layer.is_sync_layer()
                    || !layer.sync_layer_uses_blended_timings()
                    || layer.state_machine_index as usize != i
                {
                    return Err(LayoutError::InfluencingSyncLayer {
                        state_machine: i,
                        layer: l,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_motion(&self, motion: MotionIndex, what: &'static str, index: usize) -> Result<(), LayoutError> {
        if let Motion::BlendTree(tree) = motion.motion() {
            if tree as usize >= self.blend_trees.len() {
                return Err(LayoutError::IndexOutOfRange {
                    what,
                    index,
                    value: tree as i64,
                });
            }
        }
        Ok(())
    }

    fn check_blend_tree_cycles(&self) -> Result<(), LayoutError> {
        // 0 = unvisited, 1 = on the current path, 2 = done.
        let mut marks = vec![0u8; self.blend_trees.len()];
        let mut stack: Vec<(usize, usize)> = Vec::new();
        for root in 0..self.blend_trees.len() {
            if marks[root] != 0 {
                continue;
            }
            marks[root] = 1;
            stack.push((root, 0));
            while let Some((tree, next)) = stack.pop() {
                let children = self.children(&self.blend_trees[tree]);
                if next >= children.len() {
                    marks[tree] = 2;
                    continue;
                }
                stack.push((tree, next + 1));
                if let Motion::BlendTree(child) = children[next].motion_index.motion() {
                    match marks[child as usize] {
                        1 => return Err(LayoutError::CyclicBlendTree(child as usize)),
                        0 => {
                            marks[child as usize] = 1;
                            stack.push((child as usize, 0));
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }
}
