//! Hit judgments of a replay played against a beatmap.
//!
//! Keydowns and hit objects are walked together once, applying the client's
//! notelock rules: an object stays "locked" until its notelock end, and
//! presses before that either hit it, miss it, or are ignored.

use std::iter::Peekable;

use serde::Serialize;
use strum::{Display, IntoStaticStr};

use crate::beatmap::{Beatmap, HITWINDOW_MISS, HitObject, HitObjectKind, HitWindows, hitradius, hitwindows};
use crate::events::{Frame, Keys, ReplayEvents};
use crate::game_version::GameVersion;
use crate::mods::ModCombination;

/// First stable client version with the sliderbug fix
pub const SLIDERBUG_FIXED_STABLE: u32 = 20190207;
/// First cutting-edge client version with the sliderbug fix
pub const SLIDERBUG_FIXED_CUTTING_EDGE: u32 = 20190111;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, IntoStaticStr, Display)]
pub enum JudgmentKind {
    #[strum(serialize = "300")]
    Hit300,
    #[strum(serialize = "100")]
    Hit100,
    #[strum(serialize = "50")]
    Hit50,
    #[strum(serialize = "miss")]
    Miss,
}

/// Where and when a hit object was clicked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HitPoint {
    pub t: i64,
    pub x: f64,
    pub y: f64,
}

/// Outcome for one hit object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Judgment {
    pub kind: JudgmentKind,
    /// As placed under the replay's mods
    pub object: HitObject,
    /// Absent for misses
    pub hit: Option<HitPoint>,
}

impl Judgment {
    pub fn is_hit(&self) -> bool {
        self.hit.is_some()
    }

    /// Signed timing error in ms; negative when early
    pub fn error(&self) -> Option<f64> {
        self.hit.map(|h| (h.t - self.object.time) as f64)
    }
}

/// Whether notelock ends at the object's end, per client version. Unknown
/// versions are assumed recent.
fn sliderbug_fixed(version: Option<GameVersion>) -> bool {
    match version {
        None => true,
        // estimated versions assume the stable release channel
        Some(GameVersion::Estimated(v)) => v >= SLIDERBUG_FIXED_STABLE,
        Some(GameVersion::Concrete(v)) => v >= SLIDERBUG_FIXED_CUTTING_EDGE,
    }
}

/// Frames where a click key went down. A frame pressing both buttons at
/// once counts twice.
struct Keydowns<'a> {
    frames: std::slice::Iter<'a, Frame>,
    previous: Keys,
    repeat: Option<HitPoint>,
}

impl Iterator for Keydowns<'_> {
    type Item = HitPoint;

    fn next(&mut self) -> Option<HitPoint> {
        if let Some(point) = self.repeat.take() {
            return Some(point);
        }
        for frame in self.frames.by_ref() {
            let pressed = frame.keys & Keys::CLICK_MASK;
            let down = pressed & !self.previous;
            self.previous = pressed;
            if down.is_empty() {
                continue;
            }
            let (x, y) = frame.xy();
            let point = HitPoint { t: frame.t, x, y };
            if down == Keys::CLICK_MASK {
                self.repeat = Some(point);
            }
            return Some(point);
        }
        None
    }
}

enum Resolution {
    Hit(JudgmentKind, HitPoint),
    Missed,
}

/// Lazy, single-pass judgments in hit-object order. Spinners are walked but
/// never judged.
pub struct Judgments<'a> {
    objects: Vec<HitObject>,
    keydowns: Peekable<Keydowns<'a>>,
    windows: HitWindows,
    radius: f64,
    sliderbug_fixed: bool,
    object_i: usize,
}

impl<'a> Judgments<'a> {
    pub fn new(
        events: &'a ReplayEvents,
        mods: ModCombination,
        version: Option<GameVersion>,
        beatmap: &Beatmap,
    ) -> Self {
        let keydowns = Keydowns {
            frames: events.frames().iter(),
            previous: Keys::NONE,
            repeat: None,
        };
        Self {
            objects: beatmap.hit_objects_for(mods),
            keydowns: keydowns.peekable(),
            windows: hitwindows(beatmap.od_for(mods)),
            radius: hitradius(beatmap.cs_for(mods)),
            sliderbug_fixed: sliderbug_fixed(version),
            object_i: 0,
        }
    }

    /// Only the hits
    pub fn hits(self) -> impl Iterator<Item = Judgment> + 'a {
        self.filter(Judgment::is_hit)
    }

    fn notelock_end(&self, object: &HitObject) -> f64 {
        let t = object.time as f64;
        let hw50 = self.windows.hit50;
        match (object.kind, self.sliderbug_fixed) {
            (HitObjectKind::Circle, false) => t + hw50,
            (HitObjectKind::Slider { end_time } | HitObjectKind::Spinner { end_time }, false) => {
                (t + hw50).min(end_time as f64)
            }
            // circles stay locked one ms past their 50 window
            (HitObjectKind::Circle, true) => t + hw50 + 1.0,
            (HitObjectKind::Slider { end_time } | HitObjectKind::Spinner { end_time }, true) => {
                end_time as f64
            }
        }
    }

    /// Consume the current keydown. A slider stays on screen after being
    /// clicked once the sliderbug is fixed, so later presses until its
    /// notelock end are swallowed too.
    fn consume_keydown(&mut self, object: &HitObject, notelock_end: f64) {
        if matches!(object.kind, HitObjectKind::Slider { .. }) && self.sliderbug_fixed {
            while self
                .keydowns
                .next_if(|k| (k.t as f64) < notelock_end)
                .is_some()
            {}
        } else {
            self.keydowns.next();
        }
    }

    /// One step of the walk. `None` when only the keydown advanced.
    fn step(&mut self, object: &HitObject, keydown: HitPoint) -> Option<Resolution> {
        let t = object.time as f64;
        let kt = keydown.t as f64;
        let notelock_end = self.notelock_end(object);
        let on_object =
            !object.is_spinner() && object.distance_to(keydown.x, keydown.y) <= self.radius;

        if kt < t - HITWINDOW_MISS {
            self.keydowns.next();
            return None;
        }

        if kt <= t - self.windows.hit50 {
            if on_object {
                self.consume_keydown(object, notelock_end);
                return Some(Resolution::Missed);
            }
            self.keydowns.next();
            return None;
        }

        if kt >= notelock_end {
            return Some(Resolution::Missed);
        }

        if kt < t + self.windows.hit50 && on_object {
            let error = (kt - t).abs();
            let kind = if matches!(object.kind, HitObjectKind::Slider { .. }) {
                // slider heads are always 300s
                JudgmentKind::Hit300
            } else if error < self.windows.hit300 {
                JudgmentKind::Hit300
            } else if error < self.windows.hit100 {
                JudgmentKind::Hit100
            } else {
                JudgmentKind::Hit50
            };
            self.consume_keydown(object, notelock_end);
            return Some(Resolution::Hit(kind, keydown));
        }

        self.keydowns.next();
        None
    }
}

impl Iterator for Judgments<'_> {
    type Item = Judgment;

    fn next(&mut self) -> Option<Judgment> {
        while let Some(object) = self.objects.get(self.object_i).copied() {
            let resolution = match self.keydowns.peek().copied() {
                Some(keydown) => match self.step(&object, keydown) {
                    Some(resolution) => resolution,
                    None => continue,
                },
                None => Resolution::Missed,
            };
            self.object_i += 1;

            if object.is_spinner() {
                continue;
            }
            return Some(match resolution {
                Resolution::Hit(kind, point) => Judgment {
                    kind,
                    object,
                    hit: Some(point),
                },
                Resolution::Missed => Judgment {
                    kind: JudgmentKind::Miss,
                    object,
                    hit: None,
                },
            });
        }
        None
    }
}

/// Judgments of `events` against `beatmap`, played with `mods` on client
/// `version`.
pub fn judgments<'a>(
    events: &'a ReplayEvents,
    mods: ModCombination,
    version: Option<GameVersion>,
    beatmap: &Beatmap,
) -> Judgments<'a> {
    Judgments::new(events, mods, version, beatmap)
}
