//! Blend-tree weighting and resolution into leaf clip requests.
//!
//! Child weights are non-negative and sum to 1 for every tree type except a
//! Direct tree without `normalize_blend_values`, where each child weight is its
//! parameter value verbatim. Weights are pushed onto a caller-owned scratch stack
//! so nested trees resolve without allocating once the stack has grown.

use crate::blob::{BlendTree, BlendTreeChild, BlendTreeType, ControllerBlob, Motion, MotionIndex};
use crate::clips::ClipSource;
use crate::params::ParameterTable;

/// Angular term scale of the polar gradient bands.
const DIRECTIONAL_INFLUENCE: f32 = 2.0;
const EPS: f32 = 1e-5;

/// Read-only inputs shared by every blend-tree evaluation of a frame.
#[derive(Clone, Copy)]
pub struct BlendContext<'a> {
    pub blob: &'a ControllerBlob,
    pub params: &'a ParameterTable,
    pub clips: &'a dyn ClipSource,
}

/// A leaf clip reached while resolving a motion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Leaf {
    pub clip: u16,
    pub weight: f32,
    /// Local normalized time before this frame's advance.
    pub previous_time: f32,
    pub time: f32,
    pub mirrored: bool,
}

#[inline]
fn dot(a: [f32; 2], b: [f32; 2]) -> f32 {
    a[0] * b[0] + a[1] * b[1]
}

#[inline]
fn sub(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

#[inline]
fn length(a: [f32; 2]) -> f32 {
    dot(a, a).sqrt()
}

#[inline]
fn cross(a: [f32; 2], b: [f32; 2]) -> f32 {
    a[0] * b[1] - a[1] * b[0]
}

/// Signed angle from `a` to `b` in `(-π, π]`.
#[inline]
fn signed_angle(a: [f32; 2], b: [f32; 2]) -> f32 {
    cross(a, b).atan2(dot(a, b))
}

/// Rescale `w` to sum to 1. Returns `false` when every weight is zero.
fn normalize(w: &mut [f32]) -> bool {
    let sum: f32 = w.iter().sum();
    if sum <= EPS {
        return false;
    }
    for x in w.iter_mut() {
        *x /= sum;
    }
    true
}

fn nearest_child(positions: &[[f32; 2]], sample: [f32; 2], out: &mut [f32]) {
    let mut best = 0;
    let mut best_d = f32::INFINITY;
    for (i, p) in positions.iter().enumerate() {
        let d = dot(sub(sample, *p), sub(sample, *p));
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    out.iter_mut().for_each(|x| *x = 0.0);
    if !out.is_empty() {
        out[best] = 1.0;
    }
}

/// Piecewise-linear weights between the two thresholds bracketing `sample`,
/// clamped to the first/last child outside the range. Thresholds must be sorted.
pub fn weights_1d(thresholds: &[f32], sample: f32, out: &mut [f32]) {
    out.iter_mut().for_each(|x| *x = 0.0);
    let n = thresholds.len();
    if n == 0 {
        return;
    }
    if sample <= thresholds[0] {
        out[0] = 1.0;
        return;
    }
    if sample >= thresholds[n - 1] {
        out[n - 1] = 1.0;
        return;
    }
    for i in 0..n - 1 {
        let (a, b) = (thresholds[i], thresholds[i + 1]);
        if sample >= a && sample < b {
            let t = (sample - a) / (b - a);
            out[i] = 1.0 - t;
            out[i + 1] = t;
            return;
        }
    }
}

/// Gradient-band weights. Cartesian bands measure raw offsets; polar bands
/// measure magnitude differences and angles, so children in the same direction
/// at different speeds blend along the radius.
pub fn weights_gradient_band(positions: &[[f32; 2]], sample: [f32; 2], polar: bool, out: &mut [f32]) {
    let n = positions.len();
    let sample_mag = length(sample);
    for i in 0..n {
        let pi = positions[i];
        let mag_i = length(pi);
        let mut h = 1.0f32;
        for (j, pj) in positions.iter().enumerate() {
            if i == j {
                continue;
            }
            let band = if polar {
                let mag_j = length(*pj);
                let avg = (mag_i + mag_j) * 0.5;
                if avg <= EPS {
                    continue;
                }
                let angle_ij = if mag_i > EPS && mag_j > EPS {
                    signed_angle(pi, *pj)
                } else {
                    0.0
                };
                let angle_ip = if mag_i > EPS && sample_mag > EPS {
                    signed_angle(pi, sample)
                } else {
                    0.0
                };
                let v_ij = [(mag_j - mag_i) / avg, angle_ij * DIRECTIONAL_INFLUENCE];
                let v_ip = [(sample_mag - mag_i) / avg, angle_ip * DIRECTIONAL_INFLUENCE];
                let len2 = dot(v_ij, v_ij);
                if len2 <= EPS {
                    continue;
                }
                1.0 - dot(v_ip, v_ij) / len2
            } else {
                let v_ij = sub(*pj, pi);
                let len2 = dot(v_ij, v_ij);
                if len2 <= EPS {
                    continue;
                }
                1.0 - dot(sub(sample, pi), v_ij) / len2
            };
            h = h.min(band);
        }
        out[i] = h.max(0.0);
    }
    if !normalize(out) {
        nearest_child(positions, sample, out);
    }
}

/// Simple directional weights: the two children angularly bracketing the sample
/// are solved as barycentric weights, with the remainder going to a centre child
/// at the origin when one exists.
pub fn weights_simple_directional(positions: &[[f32; 2]], sample: [f32; 2], out: &mut [f32]) {
    out.iter_mut().for_each(|x| *x = 0.0);
    if positions.is_empty() {
        return;
    }
    let centre = positions.iter().position(|p| length(*p) <= EPS);
    if length(sample) <= EPS {
        match centre {
            Some(c) => out[c] = 1.0,
            None => {
                out.iter_mut().for_each(|x| *x = 1.0);
                normalize(out);
            }
        }
        return;
    }

    // Counter-clockwise angular distance from the sample to each outer child.
    let tau = std::f32::consts::TAU;
    let mut ccw: Option<(usize, f32)> = None;
    let mut cw: Option<(usize, f32)> = None;
    for (i, p) in positions.iter().enumerate() {
        if Some(i) == centre {
            continue;
        }
        let mut d = signed_angle(sample, *p);
        if d < 0.0 {
            d += tau;
        }
        if ccw.map_or(true, |(_, best)| d < best) {
            ccw = Some((i, d));
        }
        if cw.map_or(true, |(_, best)| d > best) {
            cw = Some((i, d));
        }
    }
    let (Some((b, _)), Some((a, _))) = (ccw, cw) else {
        if let Some(c) = centre {
            out[c] = 1.0;
        }
        return;
    };

    if a == b {
        let p = positions[a];
        let w = (dot(sample, p) / dot(p, p)).clamp(0.0, 1.0);
        out[a] = w;
        match centre {
            Some(c) => out[c] = 1.0 - w,
            None => out[a] = 1.0,
        }
        return;
    }

    let (pa, pb) = (positions[a], positions[b]);
    let det = cross(pa, pb);
    if det.abs() <= EPS {
        weights_gradient_band(positions, sample, false, out);
        return;
    }
    let wa = cross(sample, pb) / det;
    let wb = cross(pa, sample) / det;
    if wa < 0.0 || wb < 0.0 {
        weights_gradient_band(positions, sample, false, out);
        return;
    }
    let sum = wa + wb;
    match centre {
        Some(c) if sum < 1.0 => {
            out[a] = wa;
            out[b] = wb;
            out[c] = 1.0 - sum;
        }
        _ => {
            out[a] = wa / sum;
            out[b] = wb / sum;
        }
    }
}

/// Push one weight per child of `tree` onto `out`.
pub fn compute_weights(
    blob: &ControllerBlob,
    tree: &BlendTree,
    params: &ParameterTable,
    out: &mut Vec<f32>,
) {
    let children = blob.children(tree);
    let parameters = blob.blend_parameters(tree);
    let start = out.len();
    out.resize(start + children.len(), 0.0);
    let weights = &mut out[start..];

    match tree.blend_tree_type() {
        BlendTreeType::Simple1D => {
            let sample = params.get_numeric(parameters[0] as usize);
            // Thresholds are sorted at build time; at most a handful of children.
            let mut thresholds = [0.0f32; 64];
            if children.len() <= thresholds.len() {
                for (t, c) in thresholds.iter_mut().zip(children) {
                    *t = c.threshold;
                }
                weights_1d(&thresholds[..children.len()], sample, weights);
            } else {
                let thresholds: Vec<f32> = children.iter().map(|c| c.threshold).collect();
                weights_1d(&thresholds, sample, weights);
            }
        }
        BlendTreeType::SimpleDirectional2D
        | BlendTreeType::FreeformDirectional2D
        | BlendTreeType::FreeformCartesian2D => {
            let sample = [
                params.get_numeric(parameters[0] as usize),
                params.get_numeric(parameters[1] as usize),
            ];
            with_positions(children, |positions| match tree.blend_tree_type() {
                BlendTreeType::SimpleDirectional2D => {
                    weights_simple_directional(positions, sample, weights)
                }
                BlendTreeType::FreeformDirectional2D => {
                    weights_gradient_band(positions, sample, true, weights)
                }
                _ => weights_gradient_band(positions, sample, false, weights),
            });
        }
        BlendTreeType::Direct => {
            for (w, p) in weights.iter_mut().zip(parameters) {
                *w = params.get_numeric(*p as usize);
            }
            if tree.normalize_blend_values() {
                for w in weights.iter_mut() {
                    *w = w.max(0.0);
                }
                normalize(weights);
            }
        }
    }
}

fn with_positions<R>(children: &[BlendTreeChild], f: impl FnOnce(&[[f32; 2]]) -> R) -> R {
    let mut fixed = [[0.0f32; 2]; 64];
    if children.len() <= fixed.len() {
        for (p, c) in fixed.iter_mut().zip(children) {
            *p = c.position;
        }
        f(&fixed[..children.len()])
    } else {
        let positions: Vec<[f32; 2]> = children.iter().map(|c| c.position).collect();
        f(&positions)
    }
}

/// Cycle length in seconds of a motion at the current parameters. Blend trees
/// average their children's lengths (scaled by `1 / |time_scale|`) by weight.
/// Returns 0 for an invalid motion or a clip the source does not know.
pub fn motion_duration(ctx: BlendContext<'_>, motion: MotionIndex, stack: &mut Vec<f32>) -> f32 {
    match motion.motion() {
        Motion::None => 0.0,
        Motion::Clip(clip) => ctx.clips.clip_duration(clip).unwrap_or(0.0),
        Motion::BlendTree(index) => {
            let tree = &ctx.blob.blend_trees[index as usize];
            let children = ctx.blob.children(tree);
            let start = stack.len();
            compute_weights(ctx.blob, tree, ctx.params, stack);
            let mut total = 0.0;
            let mut weight_sum = 0.0;
            for (i, child) in children.iter().enumerate() {
                let w = stack[start + i];
                if w <= 0.0 || child.time_scale.abs() <= EPS {
                    continue;
                }
                let d = motion_duration(ctx, child.motion_index, stack);
                total += w * d / child.time_scale.abs();
                weight_sum += w;
            }
            stack.truncate(start);
            if weight_sum > 0.0 {
                total / weight_sum
            } else {
                0.0
            }
        }
    }
}

/// Resolve `motion` into weighted leaf clips. Each child's time is
/// `parent_time × time_scale + cycle_offset`.
#[allow(clippy::too_many_arguments)]
pub fn resolve_motion(
    ctx: BlendContext<'_>,
    motion: MotionIndex,
    weight: f32,
    previous_time: f32,
    time: f32,
    mirrored: bool,
    stack: &mut Vec<f32>,
    emit: &mut dyn FnMut(Leaf),
) {
    if weight <= 0.0 {
        return;
    }
    match motion.motion() {
        Motion::None => {}
        Motion::Clip(clip) => emit(Leaf {
            clip,
            weight,
            previous_time,
            time,
            mirrored,
        }),
        Motion::BlendTree(index) => {
            let tree = &ctx.blob.blend_trees[index as usize];
            let children = ctx.blob.children(tree);
            let start = stack.len();
            compute_weights(ctx.blob, tree, ctx.params, stack);
            for (i, child) in children.iter().enumerate() {
                let w = stack[start + i];
                if w == 0.0 {
                    continue;
                }
                resolve_motion(
                    ctx,
                    child.motion_index,
                    weight * w,
                    previous_time * child.time_scale + child.cycle_offset,
                    time * child.time_scale + child.cycle_offset,
                    mirrored ^ child.mirrored(),
                    stack,
                    emit,
                );
            }
            stack.truncate(start);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-4, "left={a} right={b}");
    }

    fn sum(w: &[f32]) -> f32 {
        w.iter().sum()
    }

    #[test]
    fn one_d_interpolates_and_clamps() {
        let mut w = [0.0; 2];
        weights_1d(&[0.0, 1.0], 0.25, &mut w);
        approx(w[0], 0.75);
        approx(w[1], 0.25);
        weights_1d(&[0.0, 1.0], -3.0, &mut w);
        assert_eq!(w, [1.0, 0.0]);
        weights_1d(&[0.0, 1.0], 7.0, &mut w);
        assert_eq!(w, [0.0, 1.0]);
    }

    #[test]
    fn one_d_picks_bracketing_pair() {
        let mut w = [0.0; 3];
        weights_1d(&[0.0, 1.0, 3.0], 2.0, &mut w);
        approx(w[0], 0.0);
        approx(w[1], 0.5);
        approx(w[2], 0.5);
    }

    #[test]
    fn cartesian_band_is_exact_on_children() {
        let positions = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let mut w = [0.0; 3];
        weights_gradient_band(&positions, [1.0, 0.0], false, &mut w);
        approx(w[1], 1.0);
        approx(sum(&w), 1.0);
        weights_gradient_band(&positions, [0.3, 0.3], false, &mut w);
        approx(sum(&w), 1.0);
        assert!(w.iter().all(|x| *x >= 0.0));
        assert!(w[0] > 0.0 && w[1] > 0.0 && w[2] > 0.0);
    }

    #[test]
    fn polar_band_prefers_closer_direction() {
        let positions = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, -1.0], [-1.0, 0.0]];
        let mut w = [0.0; 5];
        weights_gradient_band(&positions, [0.2, 0.9], true, &mut w);
        approx(sum(&w), 1.0);
        assert!(w.iter().all(|x| *x >= 0.0));
        assert!(w[1] > w[2], "forward should dominate right: {w:?}");
        assert!(w[1] > w[3]);
        weights_gradient_band(&positions, [0.0, 0.0], true, &mut w);
        approx(w[0], 1.0);
    }

    #[test]
    fn simple_directional_splits_between_neighbours() {
        let positions = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [-1.0, 0.0], [0.0, -1.0]];
        let mut w = [0.0; 5];
        weights_simple_directional(&positions, [0.5, 0.5], &mut w);
        approx(w[1], 0.5);
        approx(w[2], 0.5);
        approx(w[0], 0.0);
        weights_simple_directional(&positions, [0.25, 0.25], &mut w);
        approx(w[1], 0.25);
        approx(w[2], 0.25);
        approx(w[0], 0.5);
        weights_simple_directional(&positions, [0.0, 0.0], &mut w);
        approx(w[0], 1.0);
        weights_simple_directional(&positions, [3.0, 3.0], &mut w);
        approx(w[1], 0.5);
        approx(w[2], 0.5);
    }

    #[test]
    fn simple_directional_without_centre_normalizes() {
        let positions = [[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0], [0.0, -1.0]];
        let mut w = [0.0; 4];
        weights_simple_directional(&positions, [0.1, 0.3], &mut w);
        approx(sum(&w), 1.0);
        approx(w[0], 0.25);
        approx(w[1], 0.75);
    }
}
