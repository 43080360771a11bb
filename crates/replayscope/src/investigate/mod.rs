//! Comparison and cheat investigations over loaded replays.
//!
//! - [`similarity`]: cursor-path distance between two replays
//! - [`judgments`]: hit judgments against a beatmap, and from them the
//!   [`unstable_rate`]
//! - [`Frametime`]: frame pacing
//! - [`snaps`]: sharp cursor reversals
//!
//! The free functions work on replays that are already loaded. An
//! [`Investigator`] loads what it needs through a [`Loader`] and resolves
//! beatmaps through a [`BeatmapProvider`].

mod detect;
mod judgment;
mod result;
mod similarity;
mod snaps;
mod stats;

pub use detect::{
    CorrectionParams, Detect, DetectRequest, RelaxParams, StealParams, TimewarpParams,
};
pub use judgment::{HitPoint, Judgment, JudgmentKind, Judgments, judgments};
pub use result::{
    CorrectionResult, InvestigationResult, RelaxResult, StealResult, Subject, TimewarpResult,
};
pub use similarity::{mean_distance, similarity, similarity_pairs};
pub use snaps::{Snap, snaps};
pub use stats::{Frametime, UnstableRate, filter_outliers, frametimes, unstable_rate};

use tracing::{debug, info};

use crate::beatmap::{Beatmap, BeatmapProvider, BeatmapRef};
use crate::error::{Error, Result};
use crate::loadable::{Loader, Replay};

/// Loads replays on demand and runs investigations on them.
pub struct Investigator<'a> {
    loader: &'a Loader,
    beatmaps: Option<&'a dyn BeatmapProvider>,
}

/// What an operation needs to know about a replay beyond its frames
#[derive(Debug, Clone, Copy)]
struct Needs {
    map: bool,
    mods: bool,
}

impl Needs {
    const NOTHING: Self = Self {
        map: false,
        mods: false,
    };
    const MODS: Self = Self {
        map: false,
        mods: true,
    };
    const MAP_AND_MODS: Self = Self {
        map: true,
        mods: true,
    };
}

/// Reject `replay` for `what` when its source can never provide `needs`.
/// Runs before any loading.
fn require(replay: &Replay, needs: Needs, what: &str) -> Result<()> {
    let capabilities = replay.capabilities();
    if needs.map && !capabilities.map_context {
        return Err(Error::Unsupported(format!(
            "{} needs the beatmap, which a {} cannot provide",
            what,
            replay.source().kind()
        )));
    }
    if needs.mods && !capabilities.mod_context {
        return Err(Error::Unsupported(format!(
            "{} needs the mods, which a {} cannot provide",
            what,
            replay.source().kind()
        )));
    }
    Ok(())
}

impl<'a> Investigator<'a> {
    pub fn new(loader: &'a Loader) -> Self {
        Self {
            loader,
            beatmaps: None,
        }
    }

    pub fn with_beatmaps(mut self, beatmaps: &'a dyn BeatmapProvider) -> Self {
        self.beatmaps = Some(beatmaps);
        self
    }

    fn provider(&self) -> Result<&'a dyn BeatmapProvider> {
        self.beatmaps
            .ok_or_else(|| Error::Unsupported("no beatmap provider configured".to_string()))
    }

    /// Beatmap a loaded replay was played on
    pub fn beatmap_for(&self, replay: &Replay) -> Result<Beatmap> {
        let provider = self.provider()?;

        let beatmap_ref = match (replay.map_id(), replay.meta().and_then(|m| m.beatmap_hash.clone())) {
            (Some(map_id), _) => BeatmapRef::Id(map_id),
            (None, Some(hash)) => BeatmapRef::Hash(hash),
            (None, None) => {
                return Err(Error::NoInfoAvailable(format!(
                    "beatmap of {} is unknown",
                    replay
                )));
            }
        };

        provider.beatmap(&beatmap_ref)?.ok_or_else(|| {
            Error::NoInfoAvailable(format!("no beatmap for {:?}", beatmap_ref))
        })
    }

    pub fn similarity(&self, a: &mut Replay, b: &mut Replay) -> Result<f64> {
        self.loader.ensure_loaded(a)?;
        self.loader.ensure_loaded(b)?;
        similarity(a, b)
    }

    /// Similarity of every pair within `replays`, or of `replays` against
    /// `others`
    pub fn steal(
        &self,
        replays: &mut [Replay],
        others: Option<&mut [Replay]>,
        max_sim: f64,
    ) -> Result<Vec<StealResult>> {
        for replay in replays.iter_mut() {
            self.loader.ensure_loaded(replay)?;
        }
        match others {
            Some(others) => {
                for replay in others.iter_mut() {
                    self.loader.ensure_loaded(replay)?;
                }
                similarity_pairs(replays, Some(&*others), max_sim)
            }
            None => similarity_pairs(replays, None, max_sim),
        }
    }

    pub fn unstable_rate(&self, replay: &mut Replay, adjusted: bool) -> Result<UnstableRate> {
        require(replay, Needs::MAP_AND_MODS, "unstable rate")?;
        self.provider()?;
        self.loader.ensure_loaded(replay)?;
        let beatmap = self.beatmap_for(replay)?;
        unstable_rate(replay, &beatmap, adjusted)
    }

    pub fn judgments<'r>(&self, replay: &'r mut Replay) -> Result<Judgments<'r>> {
        require(replay, Needs::MAP_AND_MODS, "judgments")?;
        self.provider()?;
        self.loader.ensure_loaded(replay)?;
        let replay: &'r Replay = replay;

        let beatmap = self.beatmap_for(replay)?;
        let mods = replay
            .mods()
            .ok_or_else(|| Error::Unsupported(format!("mods of {} are unknown", replay)))?;
        let version = replay.meta().and_then(|m| m.game_version);
        Ok(judgments(replay.events()?, mods, version, &beatmap))
    }

    pub fn hits(&self, replay: &mut Replay) -> Result<Vec<Judgment>> {
        Ok(self.judgments(replay)?.hits().collect())
    }

    pub fn frametime(&self, replay: &mut Replay) -> Result<Frametime> {
        self.loader.ensure_loaded(replay)?;
        Frametime::of(replay)
    }

    /// Snaps with the configured thresholds unless `params` overrides them.
    ///
    /// With `only_on_objects` snaps away from hit objects are dropped, which
    /// needs the beatmap and mods.
    pub fn snaps(
        &self,
        replay: &mut Replay,
        params: Option<CorrectionParams>,
        only_on_objects: bool,
    ) -> Result<Vec<Snap>> {
        if only_on_objects {
            require(replay, Needs::MAP_AND_MODS, "snaps on hit objects")?;
            self.provider()?;
        }
        self.loader.ensure_loaded(replay)?;

        let params = params.unwrap_or(CorrectionParams {
            max_angle: self.loader.config().snaps.max_angle,
            min_distance: self.loader.config().snaps.min_distance,
        });
        let beatmap = if only_on_objects {
            let mods = replay
                .mods()
                .ok_or_else(|| Error::Unsupported(format!("mods of {} are unknown", replay)))?;
            Some((self.beatmap_for(replay)?, mods))
        } else {
            None
        };

        Ok(snaps(
            replay.events()?,
            params.max_angle,
            params.min_distance,
            beatmap.as_ref().map(|(b, mods)| (b, *mods)),
        ))
    }

    /// Run every requested detection over `replays`.
    ///
    /// Capabilities are checked for every replay before anything is loaded.
    /// Replays that load without data, or with too little of it for a
    /// statistic, are skipped. Aim correction is limited to hit objects
    /// whenever the beatmap can be resolved.
    pub fn run(
        &self,
        replays: &mut [Replay],
        request: &DetectRequest,
    ) -> Result<Vec<InvestigationResult>> {
        let needs = if request.relax.is_some() {
            Needs::MAP_AND_MODS
        } else if request.timewarp.is_some() {
            Needs::MODS
        } else {
            Needs::NOTHING
        };
        for replay in replays.iter() {
            require(replay, needs, "the requested detection")?;
        }
        if request.relax.is_some() {
            self.provider()?;
        }

        info!("Investigating {} replays", replays.len());
        for replay in replays.iter_mut() {
            self.loader.ensure_loaded(replay)?;
        }

        let mut results = Vec::new();

        if let Some(steal) = request.steal {
            let pairs = similarity_pairs(replays, None, steal.max_sim)?;
            debug!("Compared {} pairs", pairs.len());
            results.extend(pairs.into_iter().map(InvestigationResult::Steal));
        }

        for (index, replay) in replays.iter().enumerate() {
            if !replay.has_data() {
                debug!("{} has no replay data, skipping", replay);
                continue;
            }

            if let Some(relax) = request.relax {
                let beatmap = self.beatmap_for(replay)?;
                match unstable_rate(replay, &beatmap, false) {
                    Ok(ur) => results.push(InvestigationResult::Relax(RelaxResult {
                        subject: Subject::new(index, replay),
                        flagged: ur.converted < relax.max_ur,
                        ur,
                    })),
                    Err(Error::InsufficientData(reason)) => {
                        debug!("No unstable rate for {}: {}", replay, reason);
                    }
                    Err(e) => return Err(e),
                }
            }

            if let Some(correction) = request.correction {
                let beatmap = match (replay.mods(), replay.capabilities().map_context) {
                    (Some(mods), true) if self.beatmaps.is_some() => {
                        Some((self.beatmap_for(replay)?, mods))
                    }
                    _ => None,
                };
                let found = snaps(
                    replay.events()?,
                    correction.max_angle,
                    correction.min_distance,
                    beatmap.as_ref().map(|(b, mods)| (b, *mods)),
                );
                results.push(InvestigationResult::Correction(CorrectionResult {
                    subject: Subject::new(index, replay),
                    flagged: !found.is_empty(),
                    snaps: found,
                }));
            }

            if let Some(timewarp) = request.timewarp {
                let measured = Frametime::of(replay)
                    .and_then(|frametime| Ok((frametime.converted()?, frametime)));
                match measured {
                    Ok((converted, frametime)) => {
                        results.push(InvestigationResult::Timewarp(TimewarpResult {
                            subject: Subject::new(index, replay),
                            frametime: converted,
                            flagged: converted < timewarp.max_frametime,
                            frametimes: frametime.frametimes,
                        }))
                    }
                    Err(Error::InsufficientData(reason)) => {
                        debug!("No frametime for {}: {}", replay, reason);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let flagged = results.iter().filter(|r| r.is_flagged()).count();
        info!("{} results, {} flagged", results.len(), flagged);
        Ok(results)
    }
}
