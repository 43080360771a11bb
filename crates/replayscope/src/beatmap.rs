//! Hit-object geometry consumed from an external beatmap provider.
//!
//! Beatmap files are never parsed here. A [`BeatmapProvider`] hands back
//! the difficulty values and hit objects the investigations need.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mods::{Mod, ModCombination};

/// Playfield size in osu!pixels
pub const PLAYFIELD_WIDTH: f64 = 512.0;
pub const PLAYFIELD_HEIGHT: f64 = 384.0;

/// Presses earlier than this before an object cannot interact with it (ms)
pub const HITWINDOW_MISS: f64 = 400.0;

/// Timing windows for one OD value, in ms either side of the object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitWindows {
    pub hit50: f64,
    pub hit100: f64,
    pub hit300: f64,
}

pub fn hitwindows(od: f64) -> HitWindows {
    HitWindows {
        hit50: 200.0 - 10.0 * od,
        hit100: 140.0 - 8.0 * od,
        hit300: 80.0 - 6.0 * od,
    }
}

/// Circle radius in osu!pixels for a CS value
pub fn hitradius(cs: f64) -> f64 {
    54.4 - 4.48 * cs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitObjectKind {
    Circle,
    Slider { end_time: i64 },
    Spinner { end_time: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitObject {
    pub kind: HitObjectKind,
    /// Start time in ms
    pub time: i64,
    pub x: f64,
    pub y: f64,
}

impl HitObject {
    pub fn circle(time: i64, x: f64, y: f64) -> Self {
        Self {
            kind: HitObjectKind::Circle,
            time,
            x,
            y,
        }
    }

    pub fn slider(time: i64, end_time: i64, x: f64, y: f64) -> Self {
        Self {
            kind: HitObjectKind::Slider { end_time },
            time,
            x,
            y,
        }
    }

    pub fn spinner(time: i64, end_time: i64) -> Self {
        Self {
            kind: HitObjectKind::Spinner { end_time },
            time,
            x: PLAYFIELD_WIDTH / 2.0,
            y: PLAYFIELD_HEIGHT / 2.0,
        }
    }

    pub fn is_spinner(&self) -> bool {
        matches!(self.kind, HitObjectKind::Spinner { .. })
    }

    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

/// Difficulty settings and hit objects of one beatmap, before mods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beatmap {
    pub overall_difficulty: f64,
    pub circle_size: f64,
    /// Sorted by start time
    pub hit_objects: Vec<HitObject>,
}

impl Beatmap {
    pub fn new(overall_difficulty: f64, circle_size: f64, mut hit_objects: Vec<HitObject>) -> Self {
        hit_objects.sort_by_key(|h| h.time);
        Self {
            overall_difficulty,
            circle_size,
            hit_objects,
        }
    }

    pub fn od_for(&self, mods: ModCombination) -> f64 {
        adjust_difficulty(self.overall_difficulty, mods, 1.4)
    }

    pub fn cs_for(&self, mods: ModCombination) -> f64 {
        adjust_difficulty(self.circle_size, mods, 1.3)
    }

    /// Hit objects as placed under `mods` (HR mirrors them vertically)
    pub fn hit_objects_for(&self, mods: ModCombination) -> Vec<HitObject> {
        if !mods.has(Mod::HardRock) {
            return self.hit_objects.clone();
        }
        self.hit_objects
            .iter()
            .map(|h| HitObject {
                y: PLAYFIELD_HEIGHT - h.y,
                ..*h
            })
            .collect()
    }

    /// Hit object whose start time is nearest to `t`; ties go to the earlier one
    pub fn closest_hit_object(&self, t: i64, mods: ModCombination) -> Option<HitObject> {
        let idx = self.hit_objects.partition_point(|h| h.time < t);
        let before = idx.checked_sub(1).and_then(|i| self.hit_objects.get(i));
        let after = self.hit_objects.get(idx);
        let closest = match (before, after) {
            (Some(b), Some(a)) => {
                if (t - b.time) <= (a.time - t) {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };
        let mut closest = *closest;
        if mods.has(Mod::HardRock) {
            closest.y = PLAYFIELD_HEIGHT - closest.y;
        }
        Some(closest)
    }
}

fn adjust_difficulty(value: f64, mods: ModCombination, hard_rock_factor: f64) -> f64 {
    if mods.has(Mod::Easy) {
        value / 2.0
    } else if mods.has(Mod::HardRock) {
        (value * hard_rock_factor).min(10.0)
    } else {
        value
    }
}

/// How a beatmap is identified to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BeatmapRef {
    Id(u32),
    Hash(String),
}

/// External source of beatmap geometry.
///
/// `Ok(None)` means the provider has no such beatmap.
pub trait BeatmapProvider {
    fn beatmap(&self, beatmap: &BeatmapRef) -> Result<Option<Beatmap>>;
}

/// Provider backed by beatmaps registered up front.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBeatmaps {
    beatmaps: HashMap<BeatmapRef, Beatmap>,
}

impl InMemoryBeatmaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, beatmap_ref: BeatmapRef, beatmap: Beatmap) {
        self.beatmaps.insert(beatmap_ref, beatmap);
    }
}

impl BeatmapProvider for InMemoryBeatmaps {
    fn beatmap(&self, beatmap: &BeatmapRef) -> Result<Option<Beatmap>> {
        Ok(self.beatmaps.get(beatmap).cloned())
    }
}
