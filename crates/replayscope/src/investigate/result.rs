use serde::Serialize;

use crate::loadable::{Replay, ReplayMeta};

use super::snaps::Snap;
use super::stats::UnstableRate;

/// The replay a result is about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subject {
    /// Position in the slice the investigation ran over
    pub index: usize,
    pub label: String,
    pub meta: ReplayMeta,
}

impl Subject {
    pub fn new(index: usize, replay: &Replay) -> Self {
        Self {
            index,
            label: replay.to_string(),
            meta: replay.meta().cloned().unwrap_or_default(),
        }
    }
}

/// Two replays compared for cursor-path similarity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StealResult {
    /// Submitted first, when timestamps are known
    pub earlier: Subject,
    pub later: Subject,
    pub similarity: f64,
    pub flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelaxResult {
    pub subject: Subject,
    pub ur: UnstableRate,
    pub flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionResult {
    pub subject: Subject,
    pub snaps: Vec<Snap>,
    pub flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimewarpResult {
    pub subject: Subject,
    /// Median frametime in game time
    pub frametime: f64,
    pub frametimes: Vec<i64>,
    pub flagged: bool,
}

/// One finding of an investigation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvestigationResult {
    Steal(StealResult),
    Relax(RelaxResult),
    Correction(CorrectionResult),
    Timewarp(TimewarpResult),
}

impl InvestigationResult {
    pub fn is_flagged(&self) -> bool {
        match self {
            Self::Steal(r) => r.flagged,
            Self::Relax(r) => r.flagged,
            Self::Correction(r) => r.flagged,
            Self::Timewarp(r) => r.flagged,
        }
    }
}
