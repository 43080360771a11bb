//! Timing statistics: unstable rate and frametime.

use serde::Serialize;

use crate::beatmap::Beatmap;
use crate::error::{Error, Result};
use crate::events::ReplayEvents;
use crate::loadable::Replay;
use crate::mods::{Conversion, ModCombination, convert_statistic};

use super::judgment::judgments;

/// Unstable rate in both time bases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UnstableRate {
    /// In game time, as the replay records it
    pub unconverted: f64,
    /// Normalized to real time by the speed mods
    pub converted: f64,
}

/// Ten times the population standard deviation of the hit errors.
///
/// With `adjusted`, errors outside 1.5 IQR of the quartiles are dropped
/// first. Requires known mods; a replay with no hits is an error.
pub fn unstable_rate(replay: &Replay, beatmap: &Beatmap, adjusted: bool) -> Result<UnstableRate> {
    let mods = replay.mods().ok_or_else(|| {
        Error::Unsupported(format!("unstable rate of {} needs its mods", replay))
    })?;
    let events = replay.events()?;
    let version = replay.meta().and_then(|m| m.game_version);

    let mut errors: Vec<f64> = judgments(events, mods, version, beatmap)
        .filter_map(|j| j.error())
        .collect();
    if adjusted {
        errors = filter_outliers(&errors);
    }
    if errors.is_empty() {
        return Err(Error::InsufficientData(format!("no hits in {}", replay)));
    }

    let unconverted = std_dev(&errors) * 10.0;
    Ok(UnstableRate {
        unconverted,
        converted: convert_statistic(unconverted, mods, Conversion::Converted),
    })
}

fn std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Linearly interpolated percentile of sorted values, `q` in `0..=100`
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

/// Values within 1.5 IQR of the first and third quartile, in input order
pub fn filter_outliers(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let q1 = percentile(&sorted, 25.0);
    let q3 = percentile(&sorted, 75.0);
    let iqr = q3 - q1;
    let (low, high) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

    values
        .iter()
        .copied()
        .filter(|v| (low..=high).contains(v))
        .collect()
}

/// Gaps between consecutive unique frame times
pub fn frametimes(events: &ReplayEvents) -> Vec<i64> {
    events
        .dedup_times()
        .windows(2)
        .map(|w| w[1].t - w[0].t)
        .collect()
}

/// Frame pacing of a replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frametime {
    pub frametimes: Vec<i64>,
    /// Median gap in game time
    pub unconverted: f64,
    pub mods: Option<ModCombination>,
}

impl Frametime {
    pub fn of(replay: &Replay) -> Result<Self> {
        let frametimes = frametimes(replay.events()?);
        if frametimes.is_empty() {
            return Err(Error::InsufficientData(format!(
                "{} has fewer than two unique frame times",
                replay
            )));
        }
        Ok(Self {
            unconverted: median(&frametimes),
            frametimes,
            mods: replay.mods(),
        })
    }

    /// Median gap in real time
    pub fn converted(&self) -> Result<f64> {
        let mods = self
            .mods
            .ok_or_else(|| Error::Unsupported("converted frametime needs mods".to_string()))?;
        Ok(convert_statistic(self.unconverted, mods, Conversion::Converted))
    }
}

fn median(values: &[i64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    } else {
        sorted[mid] as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beatmap::HitObject;
    use crate::events::{Frame, Keys};
    use crate::loadable::{LoadedReplay, ReplayData, ReplayMeta, ReplayState};

    fn loaded(frames: Vec<Frame>, mods: Option<ModCombination>) -> Replay {
        let mut replay = Replay::file("test.osr");
        replay.state = ReplayState::Loaded(LoadedReplay {
            meta: ReplayMeta {
                mods,
                ..Default::default()
            },
            data: ReplayData::Events(ReplayEvents::from_frames(frames).unwrap()),
        });
        replay
    }

    fn tapping(offsets: &[i64]) -> (Beatmap, Vec<Frame>) {
        let mut objects = Vec::new();
        let mut frames = vec![Frame::new(0, 0.0, 0.0, Keys::NONE)];
        for (i, offset) in offsets.iter().enumerate() {
            let t = 1000 * (i as i64 + 1);
            objects.push(HitObject::circle(t, 256.0, 192.0));
            frames.push(Frame::new(t + offset, 256.0, 192.0, Keys::M1));
            frames.push(Frame::new(t + offset + 50, 256.0, 192.0, Keys::NONE));
        }
        (Beatmap::new(5.0, 4.0, objects), frames)
    }

    #[test]
    fn test_unstable_rate() {
        let (map, frames) = tapping(&[-10, 10, -10, 10]);
        let replay = loaded(frames, Some("DT".parse().unwrap()));

        let ur = unstable_rate(&replay, &map, false).unwrap();
        assert!((ur.unconverted - 100.0).abs() < 1e-9);
        assert!((ur.converted - 100.0 / 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_adjusted_drops_outliers() {
        let (map, frames) = tapping(&[0, 1, -1, 0, 2, -2, 0, 90]);
        let replay = loaded(frames, Some(ModCombination::NM));

        let raw = unstable_rate(&replay, &map, false).unwrap();
        let adjusted = unstable_rate(&replay, &map, true).unwrap();
        assert!(adjusted.unconverted < raw.unconverted);
        assert!(adjusted.unconverted < 20.0);
    }

    #[test]
    fn test_unstable_rate_needs_mods_and_hits() {
        let (map, frames) = tapping(&[0, 0]);
        let unknown = loaded(frames.clone(), None);
        assert!(matches!(
            unstable_rate(&unknown, &map, false),
            Err(Error::Unsupported(_))
        ));

        let empty_map = Beatmap::new(5.0, 4.0, vec![]);
        let replay = loaded(frames, Some(ModCombination::NM));
        assert!(matches!(
            unstable_rate(&replay, &empty_map, false),
            Err(Error::InsufficientData(_))
        ));
    }

    #[test]
    fn test_filter_outliers() {
        let values = [1.0, 2.0, 3.0, 4.0, 100.0];
        assert_eq!(filter_outliers(&values), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(filter_outliers(&[]).is_empty());
    }

    #[test]
    fn test_frametime_over_unique_times() {
        let frames = vec![
            Frame::new(0, 0.0, 0.0, Keys::NONE),
            Frame::new(16, 0.0, 0.0, Keys::NONE),
            Frame::new(16, 1.0, 0.0, Keys::NONE),
            Frame::new(33, 0.0, 0.0, Keys::NONE),
            Frame::new(50, 0.0, 0.0, Keys::NONE),
        ];
        let replay = loaded(frames, Some("HT".parse().unwrap()));
        let frametime = Frametime::of(&replay).unwrap();
        assert_eq!(frametime.frametimes, vec![16, 17, 17]);
        assert_eq!(frametime.unconverted, 17.0);
        assert!((frametime.converted().unwrap() - 17.0 / 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_frametime_edge_cases() {
        let single = loaded(vec![Frame::new(0, 0.0, 0.0, Keys::NONE)], None);
        assert!(matches!(
            Frametime::of(&single),
            Err(Error::InsufficientData(_))
        ));

        let unknown = loaded(
            vec![
                Frame::new(0, 0.0, 0.0, Keys::NONE),
                Frame::new(16, 0.0, 0.0, Keys::NONE),
            ],
            None,
        );
        let frametime = Frametime::of(&unknown).unwrap();
        assert_eq!(frametime.unconverted, 16.0);
        assert!(matches!(frametime.converted(), Err(Error::Unsupported(_))));
    }
}
