//! Which cheats an investigation run looks for, and with what thresholds.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bitset of detection categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Detect(u8);

impl Detect {
    pub const NONE: Self = Self(0);
    /// Replay stealing, by cursor similarity
    pub const STEAL_SIM: Self = Self(1);
    /// Relax, by unstable rate
    pub const RELAX: Self = Self(2);
    /// Aim correction, by snaps
    pub const CORRECTION: Self = Self(4);
    /// Timewarp, by frametime
    pub const TIMEWARP: Self = Self(8);
    pub const ALL: Self = Self(15);

    pub fn contains(self, other: Detect) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Detect {
    type Output = Detect;

    fn bitor(self, rhs: Self) -> Self::Output {
        Detect(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StealParams {
    /// Pairs below this similarity are flagged
    pub max_sim: f64,
}

impl Default for StealParams {
    fn default() -> Self {
        Self { max_sim: 18.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxParams {
    /// Converted unstable rates below this are flagged
    pub max_ur: f64,
}

impl Default for RelaxParams {
    fn default() -> Self {
        Self { max_ur: 50.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionParams {
    pub max_angle: f64,
    pub min_distance: f64,
}

impl Default for CorrectionParams {
    fn default() -> Self {
        Self {
            max_angle: 10.0,
            min_distance: 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimewarpParams {
    /// Converted median frametimes below this are flagged
    pub max_frametime: f64,
}

impl Default for TimewarpParams {
    fn default() -> Self {
        Self { max_frametime: 13.0 }
    }
}

/// Detection categories with their thresholds. A category runs when its
/// parameters are set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectRequest {
    pub steal: Option<StealParams>,
    pub relax: Option<RelaxParams>,
    pub correction: Option<CorrectionParams>,
    pub timewarp: Option<TimewarpParams>,
}

impl DetectRequest {
    pub fn steal(max_sim: f64) -> Self {
        Self {
            steal: Some(StealParams { max_sim }),
            ..Default::default()
        }
    }

    pub fn relax(max_ur: f64) -> Self {
        Self {
            relax: Some(RelaxParams { max_ur }),
            ..Default::default()
        }
    }

    pub fn correction(max_angle: f64, min_distance: f64) -> Self {
        Self {
            correction: Some(CorrectionParams {
                max_angle,
                min_distance,
            }),
            ..Default::default()
        }
    }

    pub fn timewarp(max_frametime: f64) -> Self {
        Self {
            timewarp: Some(TimewarpParams { max_frametime }),
            ..Default::default()
        }
    }

    pub fn detect(&self) -> Detect {
        let mut detect = Detect::NONE;
        if self.steal.is_some() {
            detect = detect | Detect::STEAL_SIM;
        }
        if self.relax.is_some() {
            detect = detect | Detect::RELAX;
        }
        if self.correction.is_some() {
            detect = detect | Detect::CORRECTION;
        }
        if self.timewarp.is_some() {
            detect = detect | Detect::TIMEWARP;
        }
        detect
    }

    /// Union of two requests. The same category with different thresholds
    /// is rejected rather than silently picking one.
    pub fn combine(self, other: DetectRequest) -> Result<Self> {
        Ok(Self {
            steal: merge("steal", self.steal, other.steal)?,
            relax: merge("relax", self.relax, other.relax)?,
            correction: merge("correction", self.correction, other.correction)?,
            timewarp: merge("timewarp", self.timewarp, other.timewarp)?,
        })
    }
}

fn merge<T: PartialEq + fmt::Debug>(
    category: &'static str,
    first: Option<T>,
    second: Option<T>,
) -> Result<Option<T>> {
    match (first, second) {
        (Some(a), Some(b)) if a != b => Err(Error::ConflictingDetectors {
            category,
            first: format!("{:?}", a),
            second: format!("{:?}", b),
        }),
        (Some(a), _) => Ok(Some(a)),
        (None, b) => Ok(b),
    }
}

impl From<Detect> for DetectRequest {
    /// Default thresholds for every requested category
    fn from(detect: Detect) -> Self {
        Self {
            steal: detect.contains(Detect::STEAL_SIM).then(StealParams::default),
            relax: detect.contains(Detect::RELAX).then(RelaxParams::default),
            correction: detect
                .contains(Detect::CORRECTION)
                .then(CorrectionParams::default),
            timewarp: detect.contains(Detect::TIMEWARP).then(TimewarpParams::default),
        }
    }
}
