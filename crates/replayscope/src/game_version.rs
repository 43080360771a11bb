//! Game client version a replay was played on.
//!
//! Versions are calendar dates (`YYYYMMDD`). A version read from a replay
//! header is concrete; one derived from the score's submission date is only
//! an estimate.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameVersion {
    /// Read from the replay itself
    Concrete(u32),
    /// Guessed from the play date
    Estimated(u32),
}

impl GameVersion {
    /// Estimate from a submission timestamp
    pub fn from_datetime(timestamp: DateTime<Utc>) -> Self {
        GameVersion::Estimated(date_number(timestamp))
    }

    pub fn version(self) -> u32 {
        match self {
            Self::Concrete(v) | Self::Estimated(v) => v,
        }
    }

    pub fn is_concrete(self) -> bool {
        matches!(self, Self::Concrete(_))
    }
}

fn date_number(timestamp: DateTime<Utc>) -> u32 {
    timestamp.year() as u32 * 10_000 + timestamp.month() * 100 + timestamp.day()
}
