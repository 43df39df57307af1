//! Leaf motion metadata supplied by the external clip sampler.
//!
//! The evaluator never samples poses. It only needs each clip's length (to turn
//! seconds into normalized time), whether it loops, and the events authored on it.

use serde::{Deserialize, Serialize};

/// An event authored on a clip at a normalized time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipEventMarker {
    /// Position in the clip, `0..=1`.
    pub normalized_time: f32,
    pub name_hash: i32,
    #[serde(default)]
    pub parameter: i32,
}

/// Implemented by hosts (or the skeletal clip set) to describe leaf motions.
pub trait ClipSource {
    /// Number of clips; valid clip indices are `0..clip_count()`.
    fn clip_count(&self) -> usize;

    /// Clip length in seconds, `None` for an unknown clip.
    fn clip_duration(&self, clip: u16) -> Option<f32>;

    fn clip_is_looping(&self, _clip: u16) -> bool {
        true
    }

    fn clip_events(&self, _clip: u16) -> &[ClipEventMarker] {
        &[]
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipInfo {
    #[serde(default)]
    pub name: String,
    pub duration: f32,
    #[serde(default = "default_true")]
    pub looping: bool,
    #[serde(default)]
    pub events: Vec<ClipEventMarker>,
}

fn default_true() -> bool {
    true
}

/// Plain in-memory clip source.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipTable {
    pub clips: Vec<ClipInfo>,
}

impl ClipTable {
    pub fn new(clips: Vec<ClipInfo>) -> Self {
        ClipTable { clips }
    }

    /// Looping clips of the given durations, without events.
    pub fn from_durations(durations: &[f32]) -> Self {
        ClipTable {
            clips: durations
                .iter()
                .map(|d| ClipInfo {
                    name: String::new(),
                    duration: *d,
                    looping: true,
                    events: Vec::new(),
                })
                .collect(),
        }
    }
}

impl ClipSource for ClipTable {
    fn clip_count(&self) -> usize {
        self.clips.len()
    }

    fn clip_duration(&self, clip: u16) -> Option<f32> {
        self.clips.get(clip as usize).map(|c| c.duration)
    }

    fn clip_is_looping(&self, clip: u16) -> bool {
        self.clips.get(clip as usize).map_or(true, |c| c.looping)
    }

    fn clip_events(&self, clip: u16) -> &[ClipEventMarker] {
        self.clips.get(clip as usize).map_or(&[], |c| &c.events)
    }
}

/// Call `f` for every marker crossed while a clip's local time moved from
/// `previous` to `current` (both cumulative normalized time). Looping clips
/// repeat their markers every cycle; one-shot clips clamp to `0..=1`.
pub fn for_each_crossed_event(
    markers: &[ClipEventMarker],
    previous: f32,
    current: f32,
    looping: bool,
    mut f: impl FnMut(&ClipEventMarker),
) {
    if markers.is_empty() || previous == current {
        return;
    }
    let (lo, hi) = if previous < current {
        (previous, current)
    } else {
        (current, previous)
    };
    for m in markers {
        let crossed = if looping {
            (hi - m.normalized_time).floor() > (lo - m.normalized_time).floor()
        } else {
            let (lo, hi) = (lo.clamp(0.0, 1.0), hi.clamp(0.0, 1.0));
            lo < m.normalized_time && m.normalized_time <= hi
        };
        if crossed {
            f(m);
        }
    }
}
