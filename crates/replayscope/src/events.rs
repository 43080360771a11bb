//! Normalized input-event stream of a replay.
//!
//! Decoders yield [`RawFrame`]s carrying the time since the previous frame.
//! [`ReplayEvents::from_raw`] turns them into absolute-time [`Frame`]s the
//! way the game client plays them back:
//! - a leading zero-delta frame is dropped
//! - the first remaining frame only seeds the running time
//! - frames inside a negative-time section are skipped, and the frame that
//!   leaves the section inserts an interpolated frame at the section start
//! - the result is stably sorted by time

use std::ops::{BitAnd, BitOr, Not};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bitmask of pressed inputs in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keys(u32);

impl Keys {
    pub const NONE: Self = Self(0);
    pub const M1: Self = Self(1);
    pub const M2: Self = Self(2);
    pub const K1: Self = Self(4);
    pub const K2: Self = Self(8);
    pub const SMOKE: Self = Self(16);
    /// Keyboard presses always set the matching mouse bit too
    pub const CLICK_MASK: Self = Self(Self::M1.0 | Self::M2.0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Keys) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Keys {
    type Output = Keys;

    fn bitor(self, rhs: Self) -> Self::Output {
        Keys(self.0 | rhs.0)
    }
}

impl BitAnd for Keys {
    type Output = Keys;

    fn bitand(self, rhs: Self) -> Self::Output {
        Keys(self.0 & rhs.0)
    }
}

impl Not for Keys {
    type Output = Keys;

    fn not(self) -> Self::Output {
        Keys(!self.0)
    }
}

/// A frame as stored in a replay: time relative to the previous frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub time_delta: i64,
    pub x: f32,
    pub y: f32,
    pub keys: Keys,
}

impl RawFrame {
    pub fn new(time_delta: i64, x: f32, y: f32, keys: Keys) -> Self {
        Self {
            time_delta,
            x,
            y,
            keys,
        }
    }
}

/// A frame at an absolute time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub t: i64,
    pub x: f32,
    pub y: f32,
    pub keys: Keys,
}

impl Frame {
    pub fn new(t: i64, x: f32, y: f32, keys: Keys) -> Self {
        Self { t, x, y, keys }
    }

    pub fn xy(&self) -> (f64, f64) {
        (self.x as f64, self.y as f64)
    }
}

/// Immutable, non-empty, time-sorted frames of one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEvents {
    frames: Vec<Frame>,
}

/// Frame position linearly interpolated at `t` between `(t0, a)` and `(t1, b)`
fn lerp_at(t: i64, t0: i64, t1: i64, a: f32, b: f32) -> f32 {
    if t1 == t0 {
        return b;
    }
    let r = ((t - t0) as f64 / (t1 - t0) as f64).clamp(0.0, 1.0);
    (a as f64 + (b as f64 - a as f64) * r) as f32
}

impl ReplayEvents {
    /// Build from decoder output, replaying the client's playback rules.
    pub fn from_raw(raw: Vec<RawFrame>) -> Result<Self> {
        let mut raw = raw.into_iter().peekable();
        if raw.peek().is_some_and(|f| f.time_delta == 0) {
            raw.next();
        }
        let Some(first) = raw.next() else {
            return Err(Error::EmptyReplayData);
        };

        let mut frames = Vec::new();
        let mut running_t = first.time_delta;
        let mut highest_t = i64::MIN;
        // last frame before a negative section and the running time there
        let mut last_positive: Option<(RawFrame, i64)> = None;
        let mut previous: Option<RawFrame> = None;

        for frame in raw {
            let was_negative = running_t < highest_t;
            running_t += frame.time_delta;
            highest_t = highest_t.max(running_t);

            if running_t < highest_t {
                if !was_negative {
                    last_positive = previous.map(|p| (p, running_t - frame.time_delta));
                }
                previous = Some(frame);
                continue;
            }

            if was_negative {
                if let (Some((positive, positive_t)), Some(prev)) = (last_positive, previous) {
                    let t0 = running_t - frame.time_delta;
                    frames.push(Frame {
                        t: positive_t,
                        x: lerp_at(positive_t, t0, running_t, prev.x, frame.x),
                        y: lerp_at(positive_t, t0, running_t, prev.y, frame.y),
                        keys: positive.keys,
                    });
                }
            }

            frames.push(Frame::new(running_t, frame.x, frame.y, frame.keys));
            previous = Some(frame);
        }

        Self::from_frames(frames)
    }

    /// Build from absolute-time frames. Sorts stably by time.
    pub fn from_frames(mut frames: Vec<Frame>) -> Result<Self> {
        if frames.is_empty() {
            return Err(Error::EmptyReplayData);
        }
        frames.sort_by_key(|f| f.t);
        Ok(Self { frames })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn start(&self) -> i64 {
        self.frames[0].t
    }

    pub fn end(&self) -> i64 {
        self.frames[self.frames.len() - 1].t
    }

    pub fn times(&self) -> impl Iterator<Item = i64> + '_ {
        self.frames.iter().map(|f| f.t)
    }

    /// Click keys pressed in each frame that were not pressed in the previous one
    pub fn keydowns(&self) -> Vec<Keys> {
        let mut previous = Keys::NONE;
        self.frames
            .iter()
            .map(|f| {
                let pressed = f.keys & Keys::CLICK_MASK;
                let down = pressed & !previous;
                previous = pressed;
                down
            })
            .collect()
    }

    /// Frames with unique timestamps, keeping the first frame at each time
    pub fn dedup_times(&self) -> Vec<Frame> {
        let mut frames = self.frames.clone();
        frames.dedup_by_key(|f| f.t);
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(dt: i64, x: f32, y: f32, k: u32) -> RawFrame {
        RawFrame::new(dt, x, y, Keys::from_bits(k))
    }

    #[test]
    fn test_from_raw_basic() {
        // zero frame dropped, -1 seed frame consumed
        let events = ReplayEvents::from_raw(vec![
            raw(0, 256.0, -500.0, 0),
            raw(-1, 256.0, -500.0, 0),
            raw(10, 1.0, 1.0, 0),
            raw(16, 2.0, 2.0, 1),
            raw(17, 3.0, 3.0, 0),
        ])
        .unwrap();

        let times: Vec<i64> = events.times().collect();
        assert_eq!(times, vec![9, 25, 42]);
        assert_eq!(events.frames()[1].keys, Keys::M1);
    }

    #[test]
    fn test_from_raw_empty() {
        assert!(matches!(
            ReplayEvents::from_raw(vec![]),
            Err(Error::EmptyReplayData)
        ));
        assert!(matches!(
            ReplayEvents::from_raw(vec![raw(0, 0.0, 0.0, 0), raw(-1, 0.0, 0.0, 0)]),
            Err(Error::EmptyReplayData)
        ));
    }

    #[test]
    fn test_negative_time_section() {
        let events = ReplayEvents::from_raw(vec![
            raw(0, 0.0, 0.0, 0),
            raw(0, 0.0, 0.0, 0),
            raw(100, 10.0, 10.0, 1), // t=100, last positive frame
            raw(-30, 20.0, 20.0, 0), // t=70, negative section
            raw(10, 30.0, 30.0, 0),  // t=80, still negative
            raw(40, 60.0, 60.0, 0),  // t=120, leaves the section
        ])
        .unwrap();

        let frames = events.frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].t, 100);
        // inserted frame at t=100, interpolated between t=80 and t=120
        assert_eq!(frames[1].t, 100);
        assert!((frames[1].x - 45.0).abs() < 1e-4);
        assert!((frames[1].y - 45.0).abs() < 1e-4);
        assert_eq!(frames[1].keys, Keys::M1);
        assert_eq!(frames[2].t, 120);
    }

    #[test]
    fn test_keydowns() {
        let frames = vec![
            Frame::new(0, 0.0, 0.0, Keys::NONE),
            Frame::new(10, 0.0, 0.0, Keys::M1 | Keys::K1),
            Frame::new(20, 0.0, 0.0, Keys::M1 | Keys::M2 | Keys::K1 | Keys::K2),
            Frame::new(30, 0.0, 0.0, Keys::M2 | Keys::K2),
            Frame::new(40, 0.0, 0.0, Keys::M1 | Keys::M2),
        ];
        let events = ReplayEvents::from_frames(frames).unwrap();
        assert_eq!(
            events.keydowns(),
            vec![Keys::NONE, Keys::M1, Keys::M2, Keys::NONE, Keys::M1]
        );
    }

    #[test]
    fn test_dedup_times_keeps_first() {
        let frames = vec![
            Frame::new(0, 1.0, 1.0, Keys::NONE),
            Frame::new(500, 2.0, 2.0, Keys::NONE),
            Frame::new(500, 3.0, 3.0, Keys::NONE),
            Frame::new(516, 4.0, 4.0, Keys::NONE),
        ];
        let events = ReplayEvents::from_frames(frames).unwrap();
        let unique = events.dedup_times();
        assert_eq!(unique.len(), 3);
        assert_eq!(unique[1].x, 2.0);
    }

    #[test]
    fn test_from_frames_sorts_stably() {
        let frames = vec![
            Frame::new(20, 2.0, 0.0, Keys::NONE),
            Frame::new(10, 1.0, 0.0, Keys::NONE),
            Frame::new(20, 3.0, 0.0, Keys::NONE),
        ];
        let events = ReplayEvents::from_frames(frames).unwrap();
        let xs: Vec<f32> = events.frames().iter().map(|f| f.x).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);
        assert_eq!(events.start(), 10);
        assert_eq!(events.end(), 20);
    }
}
