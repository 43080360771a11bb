//! Cursor-path similarity between two replays.
//!
//! Both streams are resampled onto the union of their timestamps inside the
//! common time range, then compared point by point. Lower is more similar;
//! a stolen replay typically scores in the single digits.

use crate::beatmap::{PLAYFIELD_HEIGHT, PLAYFIELD_WIDTH};
use crate::error::{Error, Result};
use crate::events::{Frame, ReplayEvents};
use crate::loadable::Replay;
use crate::mods::Mod;

use super::result::{StealResult, Subject};

/// Mean distance in osu!pixels between the cursor paths of two loaded
/// replays.
///
/// HR mirrors the playfield, so when exactly one replay has HR the first
/// path is flipped before comparing. When either replay's mods are unknown
/// both orientations are tried and the closer one wins.
pub fn similarity(a: &Replay, b: &Replay) -> Result<f64> {
    let (events_a, events_b) = (a.events()?, b.events()?);

    match (a.mods(), b.mods()) {
        (Some(mods_a), Some(mods_b)) => {
            let flip = mods_a.has(Mod::HardRock) != mods_b.has(Mod::HardRock);
            mean_distance(events_a, events_b, flip)
        }
        _ => {
            let straight = mean_distance(events_a, events_b, false)?;
            let flipped = mean_distance(events_a, events_b, true)?;
            Ok(straight.min(flipped))
        }
    }
}

/// Compare every pair of replays with data: each pair within `replays`, or
/// each replay in `replays` against each in `others`.
pub fn similarity_pairs(
    replays: &[Replay],
    others: Option<&[Replay]>,
    max_sim: f64,
) -> Result<Vec<StealResult>> {
    let mut results = Vec::new();

    let mut compare = |i: usize, a: &Replay, j: usize, b: &Replay| -> Result<()> {
        if !a.has_data() || !b.has_data() {
            return Ok(());
        }
        let sim = similarity(a, b)?;
        let (first, second) = (Subject::new(i, a), Subject::new(j, b));
        let (earlier, later) = match (a.timestamp(), b.timestamp()) {
            (Some(ta), Some(tb)) if tb < ta => (second, first),
            _ => (first, second),
        };
        results.push(StealResult {
            earlier,
            later,
            similarity: sim,
            flagged: sim < max_sim,
        });
        Ok(())
    };

    match others {
        Some(others) => {
            for (i, a) in replays.iter().enumerate() {
                for (j, b) in others.iter().enumerate() {
                    compare(i, a, j, b)?;
                }
            }
        }
        None => {
            for (i, a) in replays.iter().enumerate() {
                for (j, b) in replays.iter().enumerate().skip(i + 1) {
                    compare(i, a, j, b)?;
                }
            }
        }
    }

    Ok(results)
}

/// Mean Euclidean distance between two streams resampled at the union of
/// their timestamps, optionally mirroring the first one vertically.
pub fn mean_distance(a: &ReplayEvents, b: &ReplayEvents, flip_first: bool) -> Result<f64> {
    let a = a.dedup_times();
    let b = b.dedup_times();

    let start = a[0].t.max(b[0].t);
    let end = a[a.len() - 1].t.min(b[b.len() - 1].t);

    let mut times: Vec<i64> = a
        .iter()
        .chain(b.iter())
        .map(|f| f.t)
        .filter(|t| (start..=end).contains(t))
        .collect();
    times.sort_unstable();
    times.dedup();

    if times.len() < 2 {
        return Err(Error::InsufficientData(format!(
            "{} overlapping timestamps",
            times.len()
        )));
    }

    let path_a = interpolate(&a, &times);
    let path_b = interpolate(&b, &times);

    let mut total = 0.0;
    let mut count = 0usize;
    for ((ax, ay), (bx, by)) in path_a.into_iter().zip(path_b) {
        let ay = if flip_first { PLAYFIELD_HEIGHT - ay } else { ay };
        if !on_playfield(ax, ay) || !on_playfield(bx, by) {
            continue;
        }
        total += ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
        count += 1;
    }

    if count == 0 {
        return Err(Error::InsufficientData(
            "no overlapping points on the playfield".to_string(),
        ));
    }
    Ok(total / count as f64)
}

fn on_playfield(x: f64, y: f64) -> bool {
    (0.0..=PLAYFIELD_WIDTH).contains(&x) && (0.0..=PLAYFIELD_HEIGHT).contains(&y)
}

/// Linear interpolation of `frames` (unique, sorted times) at sorted `times`.
/// Times outside the stream clamp to its ends.
fn interpolate(frames: &[Frame], times: &[i64]) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(times.len());
    let mut i = 0;

    for &t in times {
        while i + 1 < frames.len() && frames[i + 1].t <= t {
            i += 1;
        }
        let (x0, y0) = frames[i].xy();
        if i + 1 == frames.len() || frames[i].t >= t {
            out.push((x0, y0));
            continue;
        }
        let (x1, y1) = frames[i + 1].xy();
        let r = (t - frames[i].t) as f64 / (frames[i + 1].t - frames[i].t) as f64;
        out.push((x0 + (x1 - x0) * r, y0 + (y1 - y0) * r));
    }

    out
}
