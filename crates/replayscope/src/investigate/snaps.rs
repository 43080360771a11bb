//! Sharp cursor reversals, the trace aim correction leaves behind.
//!
//! For every three consecutive cursor positions `a b c` the angle at `b`
//! is solved with the law of cosines. A snap is a point where that angle is
//! acute enough and both legs are long enough.

use serde::Serialize;

use crate::beatmap::{Beatmap, hitradius, hitwindows};
use crate::events::ReplayEvents;
use crate::mods::ModCombination;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snap {
    /// Time of the middle point
    pub time: i64,
    /// Degrees
    pub angle: f64,
    /// Shorter of the two legs, osu!pixels
    pub distance: f64,
}

fn distance(p: (f64, f64), q: (f64, f64)) -> f64 {
    ((p.0 - q.0).powi(2) + (p.1 - q.1).powi(2)).sqrt()
}

/// Snaps with an angle below `max_angle` and both legs longer than
/// `min_distance`.
///
/// With a beatmap (and the mods it was played with) only snaps landing on a
/// hit object inside its 50 window are kept, and none on spinners.
pub fn snaps(
    events: &ReplayEvents,
    max_angle: f64,
    min_distance: f64,
    beatmap: Option<(&Beatmap, ModCombination)>,
) -> Vec<Snap> {
    // repeated timestamps read as false corrections
    let frames = events.dedup_times();
    let mut found = Vec::new();

    for w in frames.windows(3) {
        let (a, b, c) = (w[0].xy(), w[1].xy(), w[2].xy());
        let ab = distance(a, b);
        let bc = distance(b, c);
        let ac = distance(a, c);

        let denom = 2.0 * ab * bc;
        if denom == 0.0 {
            continue;
        }
        let cos_beta = ((ab.powi(2) + bc.powi(2) - ac.powi(2)) / denom).clamp(-1.0, 1.0);
        let angle = cos_beta.acos().to_degrees();
        let leg = ab.min(bc);

        if !(angle < max_angle && leg > min_distance) {
            continue;
        }

        let t = w[1].t;
        if let Some((beatmap, mods)) = beatmap {
            let Some(object) = beatmap.closest_hit_object(t, mods) else {
                continue;
            };
            if object.is_spinner() {
                continue;
            }
            let radius = hitradius(beatmap.cs_for(mods));
            let window = hitwindows(beatmap.od_for(mods)).hit50;
            let on_object = object.distance_to(b.0, b.1) <= radius;
            let in_window =
                (object.time as f64 - window) < t as f64 && (t as f64) < object.time as f64 + window;
            if !(on_object && in_window) {
                continue;
            }
        }

        found.push(Snap {
            time: t,
            angle,
            distance: leg,
        });
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beatmap::HitObject;
    use crate::events::{Frame, Keys};

    fn events(points: &[(i64, f32, f32)]) -> ReplayEvents {
        ReplayEvents::from_frames(
            points
                .iter()
                .map(|&(t, x, y)| Frame::new(t, x, y, Keys::NONE))
                .collect(),
        )
        .unwrap()
    }

    // out to (200, 100) and straight back
    fn reversal() -> ReplayEvents {
        events(&[(0, 100.0, 100.0), (16, 200.0, 100.0), (33, 110.0, 101.0)])
    }

    #[test]
    fn test_detects_reversal() {
        let found = snaps(&reversal(), 10.0, 8.0, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].time, 16);
        assert!(found[0].angle < 1.0);
        assert!((found[0].distance - 90.0055).abs() < 1e-3);
    }

    #[test]
    fn test_straight_and_short_paths_ignored() {
        let straight = events(&[(0, 0.0, 0.0), (16, 50.0, 0.0), (33, 100.0, 0.0)]);
        assert!(snaps(&straight, 10.0, 8.0, None).is_empty());

        let short = events(&[(0, 100.0, 100.0), (16, 105.0, 100.0), (33, 100.0, 100.0)]);
        assert!(snaps(&short, 10.0, 8.0, None).is_empty());
    }

    #[test]
    fn test_stationary_point_never_flagged() {
        let still = events(&[(0, 100.0, 100.0), (16, 100.0, 100.0), (33, 100.0, 100.0)]);
        assert!(snaps(&still, 180.0, -1.0, None).is_empty());
    }

    #[test]
    fn test_duplicate_times_removed() {
        let replay = events(&[
            (0, 100.0, 100.0),
            (16, 200.0, 100.0),
            (16, 150.0, 300.0),
            (33, 110.0, 101.0),
        ]);
        assert_eq!(snaps(&replay, 10.0, 8.0, None).len(), 1);
    }

    #[test]
    fn test_beatmap_filters_by_object() {
        let nm = ModCombination::NM;
        let on_circle = Beatmap::new(5.0, 4.0, vec![HitObject::circle(20, 200.0, 100.0)]);
        assert_eq!(snaps(&reversal(), 10.0, 8.0, Some((&on_circle, nm))).len(), 1);

        let elsewhere = Beatmap::new(5.0, 4.0, vec![HitObject::circle(20, 400.0, 300.0)]);
        assert!(snaps(&reversal(), 10.0, 8.0, Some((&elsewhere, nm))).is_empty());

        let too_late = Beatmap::new(5.0, 4.0, vec![HitObject::circle(500, 200.0, 100.0)]);
        assert!(snaps(&reversal(), 10.0, 8.0, Some((&too_late, nm))).is_empty());

        let spinner = Beatmap::new(5.0, 4.0, vec![HitObject::spinner(0, 100)]);
        assert!(snaps(&reversal(), 10.0, 8.0, Some((&spinner, nm))).is_empty());
    }
}
