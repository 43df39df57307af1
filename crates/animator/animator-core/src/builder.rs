//! Blob builder: flattens a [`ControllerDesc`] into a [`ControllerBlob`].
//!
//! - Parameters get contiguous indices and 2-bit packed types.
//! - Sub-state machines are inlined depth-first; a state's full path
//!   (`layer.sub.state`) identifies it.
//! - Transitions into sub-machines, into `Exit` and through entry nodes are
//!   collapsed into direct state-to-state transitions, one per route, with the
//!   conditions met along the route appended in order.
//! - The unconditional default entry lands at index 0 of each machine's
//!   initialization entry transitions.
//! - Sync layers reuse the state machine of the layer they sync with and only
//!   contribute their own per-state motions.
//!
//! Any inconsistency aborts the build with a [`BuildError`].

use hashbrown::HashMap;
use log::debug;
use thiserror::Error;

use crate::authoring::{
    parse_controller_json, BlendTreeDesc, ConditionDesc, ControllerDesc, LiteralDesc,
    MotionDesc, StateDesc, StateMachineDesc, TargetDesc, TransitionDesc,
};
use crate::blob::{
    pack_parameter_type, packed_types_array_length, BlendTree, BlendTreeChild, BlendTreeType,
    Condition, ConditionMode, ControllerBlob, Layer, LayoutError, MotionIndex, ParameterType, Span,
    State, StateMachine, Transition,
};
use crate::fixed_string::{FixedString128, FixedString64};
use crate::hash::name_hash;
use crate::params::ParameterValue;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate {kind} name `{name}`")]
    DuplicateName { kind: &'static str, name: String },
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    #[error("condition {mode:?} cannot test {ty:?} parameter `{parameter}`")]
    ModeTypeMismatch {
        parameter: String,
        mode: ConditionMode,
        ty: ParameterType,
    },
    #[error("literal for parameter `{0}` does not match its type")]
    LiteralType(String),
    #[error("parameter `{parameter}` must be {expected}")]
    ParameterKind {
        parameter: String,
        expected: &'static str,
    },
    #[error("unknown blend tree `{0}`")]
    DanglingBlendTree(String),
    #[error("clip index {index} out of range ({count} clips)")]
    DanglingClip { index: u16, count: u16 },
    #[error("blend tree `{0}` contains itself")]
    CyclicBlendTree(String),
    #[error("blend tree `{tree}` expects {expected} parameters, got {actual}")]
    BlendParameters {
        tree: String,
        expected: usize,
        actual: usize,
    },
    #[error("unknown state `{0}`")]
    UnknownState(String),
    #[error("unknown state machine `{0}`")]
    UnknownStateMachine(String),
    #[error("entry chain of `{0}` does not resolve to a state")]
    UnresolvableEntry(String),
    #[error("layer `{layer}` cannot sync with `{target}`")]
    InvalidSyncLayer { layer: String, target: String },
    #[error("layer `{0}` has neither a state machine nor a sync source")]
    MissingStateMachine(String),
    #[error("name `{name}` exceeds {capacity} bytes")]
    NameTooLong { name: String, capacity: usize },
    #[error("{what} count {count} exceeds the packed index range")]
    IndexOverflow { what: &'static str, count: usize },
    #[error("built blob failed validation: {0}")]
    Layout(#[from] LayoutError),
}

fn fixed128(name: &str) -> Result<FixedString128, BuildError> {
    FixedString128::try_from_str(name).ok_or_else(|| BuildError::NameTooLong {
        name: name.to_string(),
        capacity: FixedString128::CAPACITY,
    })
}

fn check_count(what: &'static str, count: usize, max: usize) -> Result<(), BuildError> {
    if count > max {
        return Err(BuildError::IndexOverflow { what, count });
    }
    Ok(())
}

fn literal(parameter: &str, ty: ParameterType, lit: Option<LiteralDesc>) -> Result<ParameterValue, BuildError> {
    match (ty, lit) {
        (_, None) => Ok(ParameterValue::default()),
        (ParameterType::Float, Some(LiteralDesc::Number(n))) => Ok(ParameterValue::from_float(n as f32)),
        (ParameterType::Int, Some(LiteralDesc::Number(n))) if n.fract() == 0.0 => {
            Ok(ParameterValue::from_int(n as i32))
        }
        (ParameterType::Bool | ParameterType::Trigger, Some(LiteralDesc::Bool(b))) => {
            Ok(ParameterValue::from_bool(b))
        }
        _ => Err(BuildError::LiteralType(parameter.to_string())),
    }
}

struct Params<'a> {
    lookup: HashMap<&'a str, usize>,
    types: Vec<ParameterType>,
}

impl Params<'_> {
    fn index(&self, name: &str) -> Result<usize, BuildError> {
        self.lookup
            .get(name)
            .copied()
            .ok_or_else(|| BuildError::UnknownParameter(name.to_string()))
    }

    fn numeric(&self, name: &str) -> Result<i16, BuildError> {
        let i = self.index(name)?;
        if self.types[i].is_boolean() {
            return Err(BuildError::ParameterKind {
                parameter: name.to_string(),
                expected: "Float or Int",
            });
        }
        Ok(i as i16)
    }

    fn optional_numeric(&self, name: Option<&String>) -> Result<i16, BuildError> {
        name.map_or(Ok(-1), |n| self.numeric(n))
    }

    fn condition(&self, c: &ConditionDesc) -> Result<Condition, BuildError> {
        let index = self.index(&c.parameter)?;
        let ty = self.types[index];
        if !c.mode.accepts(ty) {
            return Err(BuildError::ModeTypeMismatch {
                parameter: c.parameter.clone(),
                mode: c.mode,
                ty,
            });
        }
        let value = if ty.is_boolean() {
            ParameterValue::default()
        } else {
            literal(&c.parameter, ty, c.threshold)?
        };
        Ok(Condition::new(index as i16, c.mode, value))
    }
}

/// Destination reached by one route through entry/exit nodes, with every
/// condition met on the way.
type Route<'a> = (Vec<&'a ConditionDesc>, i16);

struct FlatMachine<'a> {
    desc: &'a StateMachineDesc,
    path: String,
    parent: Option<usize>,
}

struct FlatState<'a> {
    desc: &'a StateDesc,
    path: String,
    machine: usize,
}

/// One layer's state machine hierarchy, inlined depth-first.
struct Flattened<'a> {
    machines: Vec<FlatMachine<'a>>,
    states: Vec<FlatState<'a>>,
    state_lookup: HashMap<String, i16>,
    machine_lookup: HashMap<String, usize>,
}

impl<'a> Flattened<'a> {
    fn new(root: &'a StateMachineDesc, layer_name: &str) -> Result<Self, BuildError> {
        let mut flat = Flattened {
            machines: Vec::new(),
            states: Vec::new(),
            state_lookup: HashMap::new(),
            machine_lookup: HashMap::new(),
        };
        flat.collect(root, layer_name.to_string(), None)?;
        Ok(flat)
    }

    fn collect(&mut self, desc: &'a StateMachineDesc, path: String, parent: Option<usize>) -> Result<(), BuildError> {
        let m = self.machines.len();
        if self.machine_lookup.insert(path.clone(), m).is_some() {
            return Err(BuildError::DuplicateName {
                kind: "state machine",
                name: path,
            });
        }
        self.machines.push(FlatMachine {
            desc,
            path: path.clone(),
            parent,
        });
        for s in &desc.states {
            let full = format!("{path}.{}", s.name);
            check_count("state", self.states.len() + 1, i16::MAX as usize)?;
            let index = self.states.len() as i16;
            if self.state_lookup.insert(full.clone(), index).is_some() {
                return Err(BuildError::DuplicateName {
                    kind: "state",
                    name: full,
                });
            }
            self.states.push(FlatState {
                desc: s,
                path: full,
                machine: m,
            });
        }
        for sub in &desc.state_machines {
            self.collect(sub, format!("{path}.{}", sub.name), Some(m))?;
        }
        Ok(())
    }

    fn find_state(&self, scope: usize, name: &str) -> Option<i16> {
        let scoped = format!("{}.{name}", self.machines[scope].path);
        self.state_lookup
            .get(&scoped)
            .or_else(|| self.state_lookup.get(name))
            .copied()
    }

    fn find_machine(&self, scope: usize, name: &str) -> Option<usize> {
        let scoped = format!("{}.{name}", self.machines[scope].path);
        self.machine_lookup
            .get(&scoped)
            .or_else(|| self.machine_lookup.get(name))
            .copied()
    }

    /// Longest acyclic chain of entry/exit hops.
    fn hop_limit(&self) -> usize {
        2 * self.machines.len() + 2
    }

    fn route(
        &self,
        scope: usize,
        to: &TargetDesc,
        prefix: &[&'a ConditionDesc],
        depth: usize,
        out: &mut Vec<Route<'a>>,
    ) -> Result<(), BuildError> {
        if depth > self.hop_limit() {
            return Err(BuildError::UnresolvableEntry(self.machines[scope].path.clone()));
        }
        match to {
            TargetDesc::State(name) => {
                let s = self
                    .find_state(scope, name)
                    .ok_or_else(|| BuildError::UnknownState(name.clone()))?;
                out.push((prefix.to_vec(), s));
                Ok(())
            }
            TargetDesc::StateMachine(name) => {
                let m = self
                    .find_machine(scope, name)
                    .ok_or_else(|| BuildError::UnknownStateMachine(name.clone()))?;
                self.entry(m, prefix, depth + 1, out)
            }
            TargetDesc::Exit => self.exit(scope, prefix, depth + 1, out),
        }
    }

    /// Routes through machine `m`'s entry node: conditional entries in order,
    /// then the default.
    fn entry(
        &self,
        m: usize,
        prefix: &[&'a ConditionDesc],
        depth: usize,
        out: &mut Vec<Route<'a>>,
    ) -> Result<(), BuildError> {
        let desc = self.machines[m].desc;
        for e in &desc.entry_transitions {
            let conds: Vec<_> = prefix.iter().copied().chain(e.conditions.iter()).collect();
            self.route(m, &e.to, &conds, depth, out)?;
        }
        let name = &desc.default_state;
        let default = if self.find_state(m, name).is_some() {
            TargetDesc::State(name.clone())
        } else if self.find_machine(m, name).is_some() {
            TargetDesc::StateMachine(name.clone())
        } else {
            return Err(BuildError::UnresolvableEntry(self.machines[m].path.clone()));
        };
        self.route(m, &default, prefix, depth, out)
    }

    /// Routes out of machine `m`: its exit transitions into the parent, then the
    /// parent's entry. Exiting the root re-enters it.
    fn exit(
        &self,
        m: usize,
        prefix: &[&'a ConditionDesc],
        depth: usize,
        out: &mut Vec<Route<'a>>,
    ) -> Result<(), BuildError> {
        let Some(parent) = self.machines[m].parent else {
            return self.entry(m, prefix, depth, out);
        };
        let desc = self.machines[m].desc;
        for x in &desc.exit_transitions {
            let conds: Vec<_> = prefix.iter().copied().chain(x.conditions.iter()).collect();
            self.route(parent, &x.to, &conds, depth, out)?;
        }
        self.entry(parent, prefix, depth, out)
    }

    /// Initialization entries of the root: default first, conditional after.
    fn initialization_routes(&self) -> Result<Vec<Route<'a>>, BuildError> {
        let mut routes = Vec::new();
        self.entry(0, &[], 0, &mut routes)?;
        let default = routes
            .pop()
            .ok_or_else(|| BuildError::UnresolvableEntry(self.machines[0].path.clone()))?;
        routes.insert(0, default);
        Ok(routes)
    }
}

struct Builder<'a> {
    desc: &'a ControllerDesc,
    blob: ControllerBlob,
    params: Params<'a>,
    trees: HashMap<&'a str, u16>,
}

impl<'a> Builder<'a> {
    fn new(desc: &'a ControllerDesc) -> Result<Self, BuildError> {
        let mut b = Builder {
            desc,
            blob: ControllerBlob {
                name: fixed128(&desc.name)?,
                ..Default::default()
            },
            params: Params {
                lookup: HashMap::new(),
                types: Vec::new(),
            },
            trees: HashMap::new(),
        };
        b.parameters()?;
        b.blend_trees()?;
        Ok(b)
    }

    fn parameters(&mut self) -> Result<(), BuildError> {
        let desc = self.desc;
        let params = &desc.parameters;
        check_count("parameter", params.len(), i16::MAX as usize)?;
        self.blob.parameter_types = vec![0; packed_types_array_length(params.len())];
        for (i, p) in params.iter().enumerate() {
            if self.params.lookup.insert(p.name.as_str(), i).is_some() {
                return Err(BuildError::DuplicateName {
                    kind: "parameter",
                    name: p.name.clone(),
                });
            }
            self.params.types.push(p.kind);
            pack_parameter_type(&mut self.blob.parameter_types, i, p.kind);
            self.blob.parameter_name_hashes.push(name_hash(&p.name));
            let display = p.display_name.as_deref().unwrap_or(&p.name);
            self.blob.parameter_editor_name_hashes.push(name_hash(display));
            self.blob.parameter_names.push(FixedString64::try_from_str(&p.name).ok_or_else(|| {
                BuildError::NameTooLong {
                    name: p.name.clone(),
                    capacity: FixedString64::CAPACITY,
                }
            })?);
            self.blob.parameter_defaults.push(literal(&p.name, p.kind, p.default)?);
        }
        Ok(())
    }

    fn motion(&self, motion: &MotionDesc) -> Result<MotionIndex, BuildError> {
        match motion {
            MotionDesc::None => Ok(MotionIndex::INVALID),
            MotionDesc::Clip(index) => {
                if let Some(count) = self.desc.clip_count {
                    if *index >= count {
                        return Err(BuildError::DanglingClip {
                            index: *index,
                            count,
                        });
                    }
                }
                check_count("clip", *index as usize, MotionIndex::MAX_INDEX as usize)?;
                Ok(MotionIndex::clip(*index))
            }
            MotionDesc::BlendTree(name) => self
                .trees
                .get(name.as_str())
                .map(|i| MotionIndex::blend_tree(*i))
                .ok_or_else(|| BuildError::DanglingBlendTree(name.clone())),
        }
    }

    fn blend_trees(&mut self) -> Result<(), BuildError> {
        let desc = self.desc;
        let trees = &desc.blend_trees;
        check_count("blend tree", trees.len(), MotionIndex::MAX_INDEX as usize + 1)?;
        for (i, t) in trees.iter().enumerate() {
            if self.trees.insert(t.name.as_str(), i as u16).is_some() {
                return Err(BuildError::DuplicateName {
                    kind: "blend tree",
                    name: t.name.clone(),
                });
            }
        }
        self.check_tree_cycles()?;
        for t in trees {
            self.blend_tree(t)?;
        }
        Ok(())
    }

    fn check_tree_cycles(&self) -> Result<(), BuildError> {
        fn visit(b: &Builder<'_>, i: usize, marks: &mut [u8]) -> Result<(), BuildError> {
            marks[i] = 1;
            for child in &b.desc.blend_trees[i].children {
                let MotionDesc::BlendTree(name) = &child.motion else {
                    continue;
                };
                let j = *b
                    .trees
                    .get(name.as_str())
                    .ok_or_else(|| BuildError::DanglingBlendTree(name.clone()))? as usize;
                match marks[j] {
                    1 => return Err(BuildError::CyclicBlendTree(name.clone())),
                    0 => visit(b, j, marks)?,
                    _ => {}
                }
            }
            marks[i] = 2;
            Ok(())
        }
        let mut marks = vec![0u8; self.desc.blend_trees.len()];
        for i in 0..marks.len() {
            if marks[i] == 0 {
                visit(self, i, &mut marks)?;
            }
        }
        Ok(())
    }

    fn blend_tree(&mut self, t: &BlendTreeDesc) -> Result<(), BuildError> {
        let mut children: Vec<_> = t.children.iter().collect();
        if t.blend_type == BlendTreeType::Simple1D {
            children.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
        }
        let names: Vec<&str> = match t.blend_type {
            BlendTreeType::Direct => children.iter().filter_map(|c| c.parameter.as_deref()).collect(),
            _ => t.parameters.iter().map(String::as_str).collect(),
        };
        let expected = match t.blend_type {
            BlendTreeType::Simple1D => 1,
            BlendTreeType::Direct => children.len(),
            _ => 2,
        };
        if names.len() != expected {
            return Err(BuildError::BlendParameters {
                tree: t.name.clone(),
                expected,
                actual: names.len(),
            });
        }

        let mut tree = BlendTree::new(t.blend_type);
        tree.set_normalize_blend_values(t.normalize);
        tree.parameter_indices = Span::new(self.blob.indices.len(), names.len());
        for name in names {
            let index = self.params.numeric(name)?;
            self.blob.indices.push(index);
        }
        tree.children = Span::new(self.blob.blend_tree_children.len(), children.len());
        for c in children {
            let mut child = BlendTreeChild::new(self.motion(&c.motion)?);
            child.position = c.position;
            child.cycle_offset = c.cycle_offset;
            child.time_scale = c.time_scale;
            child.threshold = c.threshold;
            child.set_is_looping(c.looping);
            child.set_mirrored(c.mirror);
            self.blob.blend_tree_children.push(child);
        }
        self.blob.blend_trees.push(tree);
        Ok(())
    }

    fn push_conditions(&mut self, conditions: &[&ConditionDesc]) -> Result<Span, BuildError> {
        let span = Span::new(self.blob.conditions.len(), conditions.len());
        for c in conditions {
            let condition = self.params.condition(c)?;
            self.blob.conditions.push(condition);
        }
        Ok(span)
    }

    fn push_routed(&mut self, t: &TransitionDesc, routes: Vec<Route<'_>>) -> Result<(), BuildError> {
        for (conditions, destination) in routes {
            let mut out = Transition::new(destination);
            out.conditions = self.push_conditions(&conditions)?;
            out.duration = t.duration;
            out.normalized_offset = t.offset;
            if let Some(exit) = t.exit_time {
                out.set_has_exit_time(true);
                out.normalized_exit_time = exit;
            }
            out.set_uses_realtime_duration(t.fixed_duration);
            out.set_interruption_source(t.interruption);
            out.set_uses_ordered_interruptions(t.ordered_interruption);
            out.set_can_transition_to_self(t.can_transition_to_self);
            self.blob.transitions.push(out);
        }
        Ok(())
    }

    fn push_entries(&mut self, routes: Vec<Route<'_>>) -> Result<Span, BuildError> {
        let span = Span::new(self.blob.transitions.len(), routes.len());
        for (conditions, destination) in routes {
            let mut out = Transition::new(destination);
            out.conditions = self.push_conditions(&conditions)?;
            self.blob.transitions.push(out);
        }
        Ok(span)
    }

    fn state(&self, s: &StateDesc, index: i16) -> Result<State, BuildError> {
        let mut state = State::new(index);
        state.base_state_speed = s.speed;
        state.motion_cycle_offset = s.cycle_offset;
        state.state_speed_multiplier_parameter_index =
            self.params.optional_numeric(s.speed_parameter.as_ref())?;
        state.motion_cycle_offset_parameter_index =
            self.params.optional_numeric(s.cycle_offset_parameter.as_ref())?;
        state.motion_time_override_parameter_index =
            self.params.optional_numeric(s.time_parameter.as_ref())?;
        if let Some(name) = &s.mirror_parameter {
            let i = self.params.index(name)?;
            if self.params.types[i] != ParameterType::Bool {
                return Err(BuildError::ParameterKind {
                    parameter: name.clone(),
                    expected: "Bool",
                });
            }
            state.mirror_parameter_index = i as i16;
        }
        state.set_use_mirror(s.mirror);
        state.set_use_foot_ik(s.foot_ik);
        Ok(state)
    }

    /// Emit one flattened state machine and return its index.
    fn state_machine(&mut self, flat: &Flattened<'_>) -> Result<usize, BuildError> {
        let mut sm = StateMachine {
            initialization_entry_state_transitions: self.push_entries(flat.initialization_routes()?)?,
            ..Default::default()
        };

        let any_start = self.blob.transitions.len();
        for (m, machine) in flat.machines.iter().enumerate() {
            for t in &machine.desc.any_state_transitions {
                let mut routes = Vec::new();
                let conds: Vec<_> = t.conditions.iter().collect();
                flat.route(m, &t.to, &conds, 0, &mut routes)?;
                self.push_routed(t, routes)?;
            }
        }
        sm.any_state_transitions = Span::new(any_start, self.blob.transitions.len() - any_start);
        check_count("any-state transition", sm.any_state_transitions.len(), MotionIndex::MAX_INDEX as usize)?;

        let mut states = Vec::with_capacity(flat.states.len());
        for (i, fs) in flat.states.iter().enumerate() {
            let mut state = self.state(fs.desc, i as i16)?;
            let start = self.blob.transitions.len();
            for t in &fs.desc.transitions {
                let mut routes = Vec::new();
                let conds: Vec<_> = t.conditions.iter().collect();
                flat.route(fs.machine, &t.to, &conds, 0, &mut routes)?;
                self.push_routed(t, routes)?;
            }
            state.transitions = Span::new(start, self.blob.transitions.len() - start);
            check_count("transition", state.transitions.len(), MotionIndex::MAX_INDEX as usize)?;
            states.push(state);
        }
        sm.states = Span::new(self.blob.states.len(), states.len());
        self.blob.states.extend(states);

        let count = flat.states.len();
        sm.state_name_hashes = Span::new(self.blob.hashes.len(), count);
        for fs in &flat.states {
            self.blob.hashes.push(name_hash(&fs.desc.name));
        }
        sm.state_editor_name_hashes = Span::new(self.blob.hashes.len(), count);
        for fs in &flat.states {
            self.blob.hashes.push(name_hash(&fs.path));
        }
        sm.state_names = Span::new(self.blob.labels.len(), count);
        for fs in &flat.states {
            self.blob.labels.push(fixed128(&fs.desc.name)?);
        }
        sm.state_tags = Span::new(self.blob.labels.len(), count);
        for fs in &flat.states {
            self.blob.labels.push(fixed128(&fs.desc.tag)?);
        }

        self.blob.state_machines.push(sm);
        Ok(self.blob.state_machines.len() - 1)
    }

    fn layers(&mut self) -> Result<(), BuildError> {
        let controller = self.desc;
        let layers = &controller.layers;
        check_count("layer", layers.len(), i16::MAX as usize)?;
        let by_name: HashMap<&str, usize> = layers
            .iter()
            .enumerate()
            .map(|(i, l)| (l.name.as_str(), i))
            .collect();

        // Regular layers own a machine; sync layers borrow their source's.
        let mut flats: Vec<Option<(Flattened<'a>, usize)>> = Vec::with_capacity(layers.len());
        for layer in layers {
            match (&layer.state_machine, &layer.sync) {
                (_, Some(_)) => flats.push(None),
                (Some(root), None) => {
                    let flat = Flattened::new(root, &layer.name)?;
                    let sm = self.state_machine(&flat)?;
                    flats.push(Some((flat, sm)));
                }
                (None, None) => return Err(BuildError::MissingStateMachine(layer.name.clone())),
            }
        }

        for (i, desc) in layers.iter().enumerate() {
            let mut layer = Layer::new(fixed128(&desc.name)?, desc.weight, 0);
            layer.bone_mask_index = desc.bone_mask.unwrap_or(-1);
            layer.set_perform_ik_pass(desc.ik_pass);
            layer.set_use_additive_blending(desc.additive);
            let start = self.blob.motion_indices.len();
            match (&desc.sync, &flats[i]) {
                (None, Some((flat, sm))) => {
                    layer.state_machine_index = *sm as i16;
                    for fs in &flat.states {
                        let m = self.motion(&fs.desc.motion)?;
                        self.blob.motion_indices.push(m);
                    }
                }
                (Some(sync), _) => {
                    let invalid = || BuildError::InvalidSyncLayer {
                        layer: desc.name.clone(),
                        target: sync.layer.clone(),
                    };
                    let source = *by_name.get(sync.layer.as_str()).ok_or_else(invalid)?;
                    if i == 0 || source == i {
                        return Err(invalid());
                    }
                    let Some((flat, sm)) = &flats[source] else {
                        return Err(invalid());
                    };
                    layer.state_machine_index = *sm as i16;
                    layer.sync_layer_index = source as i16;
                    layer.set_is_sync_layer(true);
                    layer.set_sync_layer_uses_blended_timings(sync.blended_timings);
                    let mut motions = vec![MotionIndex::INVALID; flat.states.len()];
                    for o in &sync.motions {
                        let s = flat
                            .find_state(0, &o.state)
                            .ok_or_else(|| BuildError::UnknownState(o.state.clone()))?;
                        motions[s as usize] = self.motion(&o.motion)?;
                    }
                    self.blob.motion_indices.extend(motions);
                }
                (None, None) => return Err(BuildError::MissingStateMachine(desc.name.clone())),
            }
            layer.motion_indices = Span::new(start, self.blob.motion_indices.len() - start);
            self.blob.layers.push(layer);
        }

        self.influencing_sync_layers();
        Ok(())
    }

    fn influencing_sync_layers(&mut self) {
        for sm in 0..self.blob.state_machines.len() {
            let start = self.blob.indices.len();
            for (i, layer) in self.blob.layers.iter().enumerate() {
                if layer.is_sync_layer()
                    && layer.sync_layer_uses_blended_timings()
                    && layer.state_machine_index as usize == sm
                {
                    self.blob.indices.push(i as i16);
                }
            }
            self.blob.state_machines[sm].influencing_sync_layers =
                Span::new(start, self.blob.indices.len() - start);
        }
    }
}

/// Flatten and validate a controller description into a blob.
pub fn build_controller_blob(desc: &ControllerDesc) -> Result<ControllerBlob, BuildError> {
    let mut builder = Builder::new(desc)?;
    builder.layers()?;
    let blob = builder.blob;
    blob.validate()?;
    debug!(
        "built controller `{}`: {} parameters, {} layers, {} state machines, {} states, {} transitions, {} blend trees",
        desc.name,
        blob.parameter_count(),
        blob.layers.len(),
        blob.state_machines.len(),
        blob.states.len(),
        blob.transitions.len(),
        blob.blend_trees.len()
    );
    Ok(blob)
}

/// Parse a JSON controller description and build it.
pub fn build_controller_blob_from_json(json: &str) -> Result<ControllerBlob, BuildError> {
    build_controller_blob(&parse_controller_json(json)?)
}
