//! Game modifiers and their combinations.
//!
//! Mods are stored exactly as the scoring service reports them: a `u32`
//! bitmask. Nightcore and Perfect are reported together with the mod they
//! imply (DT and SD respectively), so parsing `"NC"` yields both bits.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr, IntoEnumIterator, IntoStaticStr};

use crate::error::{Error, Result};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    FromRepr,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Display,
)]
#[repr(u32)]
pub enum Mod {
    #[strum(serialize = "NF")]
    NoFail = 1 << 0,
    #[strum(serialize = "EZ")]
    Easy = 1 << 1,
    #[strum(serialize = "TD")]
    TouchDevice = 1 << 2,
    #[strum(serialize = "HD")]
    Hidden = 1 << 3,
    #[strum(serialize = "HR")]
    HardRock = 1 << 4,
    #[strum(serialize = "SD")]
    SuddenDeath = 1 << 5,
    #[strum(serialize = "DT")]
    DoubleTime = 1 << 6,
    #[strum(serialize = "RX")]
    Relax = 1 << 7,
    #[strum(serialize = "HT")]
    HalfTime = 1 << 8,
    #[strum(serialize = "NC")]
    Nightcore = 1 << 9,
    #[strum(serialize = "FL")]
    Flashlight = 1 << 10,
    #[strum(serialize = "AT")]
    Autoplay = 1 << 11,
    #[strum(serialize = "SO")]
    SpunOut = 1 << 12,
    #[strum(serialize = "AP")]
    Autopilot = 1 << 13,
    #[strum(serialize = "PF")]
    Perfect = 1 << 14,
    #[strum(serialize = "FI")]
    FadeIn = 1 << 20,
    #[strum(serialize = "RD")]
    Random = 1 << 21,
    #[strum(serialize = "CN")]
    Cinema = 1 << 22,
    #[strum(serialize = "TP")]
    Target = 1 << 23,
    #[strum(serialize = "V2")]
    ScoreV2 = 1 << 29,
    #[strum(serialize = "MR")]
    Mirror = 1 << 30,
}

impl Mod {
    pub fn bits(self) -> u32 {
        self as u32
    }

    pub fn acronym(self) -> &'static str {
        self.into()
    }

    /// The mod this one is always reported together with, if any
    pub fn implies(self) -> Option<Mod> {
        match self {
            Self::Nightcore => Some(Self::DoubleTime),
            Self::Perfect => Some(Self::SuddenDeath),
            _ => None,
        }
    }
}

/// Zero or more simultaneously active mods.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ModCombination(u32);

impl ModCombination {
    pub const NM: Self = Self(0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn is_nomod(self) -> bool {
        self.0 == 0
    }

    /// Whether the bit of `m` is set, ignoring the mods it implies
    pub fn has(self, m: Mod) -> bool {
        self.0 & m.bits() != 0
    }

    /// Whether every mod of `other` is also active here
    pub fn contains(self, other: impl Into<ModCombination>) -> bool {
        let other = other.into();
        self.0 & other.0 == other.0
    }

    /// Individual mods in bit order
    pub fn mods(self) -> impl Iterator<Item = Mod> {
        Mod::iter().filter(move |m| self.has(*m))
    }

    /// Game speed relative to nomod
    pub fn speed_multiplier(self) -> f64 {
        if self.has(Mod::DoubleTime) || self.has(Mod::Nightcore) {
            1.5
        } else if self.has(Mod::HalfTime) {
            0.75
        } else {
            1.0
        }
    }

    /// Every combination of `required` plus a subset of the mods in `optional`.
    ///
    /// Yields `2^k` combinations for `k` optional mods, starting with
    /// `required` alone. Optional mods already in `required` add nothing.
    pub fn fuzzy(required: ModCombination, optional: ModCombination) -> Vec<ModCombination> {
        let extras: Vec<u32> = optional
            .mods()
            .filter(|m| !required.has(*m))
            .map(|m| {
                let implied = m.implies().map(Mod::bits).unwrap_or(0);
                m.bits() | implied
            })
            .collect();

        let mut combinations = Vec::with_capacity(1 << extras.len());
        for subset in 0u32..(1 << extras.len()) {
            let mut bits = required.0;
            for (i, extra) in extras.iter().enumerate() {
                if subset & (1 << i) != 0 {
                    bits |= extra;
                }
            }
            combinations.push(ModCombination(bits));
        }
        // supersets of `required` sort after it
        combinations.sort_unstable();
        combinations.dedup();
        combinations
    }
}

impl From<Mod> for ModCombination {
    fn from(m: Mod) -> Self {
        let implied = m.implies().map(Mod::bits).unwrap_or(0);
        ModCombination(m.bits() | implied)
    }
}

impl BitOr for ModCombination {
    type Output = ModCombination;

    fn bitor(self, rhs: Self) -> Self::Output {
        ModCombination(self.0 | rhs.0)
    }
}

impl BitOr<Mod> for ModCombination {
    type Output = ModCombination;

    fn bitor(self, rhs: Mod) -> Self::Output {
        self | ModCombination::from(rhs)
    }
}

impl BitOr for Mod {
    type Output = ModCombination;

    fn bitor(self, rhs: Self) -> Self::Output {
        ModCombination::from(self) | rhs
    }
}

impl FromStr for ModCombination {
    type Err = Error;

    /// Parse concatenated acronyms such as `"HDHR"`. `""` and `"NM"` are nomod.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_uppercase();
        if s.is_empty() || s == "NM" {
            return Ok(ModCombination::NM);
        }
        if s.len() % 2 != 0 || !s.is_ascii() {
            return Err(Error::InvalidMods(s));
        }

        let mut combination = ModCombination::NM;
        for i in (0..s.len()).step_by(2) {
            let acronym = &s[i..i + 2];
            let m = Mod::from_str(acronym)
                .map_err(|_| Error::InvalidMods(format!("unknown mod '{}' in '{}'", acronym, s)))?;
            combination = combination | m;
        }
        Ok(combination)
    }
}

impl fmt::Display for ModCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nomod() {
            return write!(f, "NM");
        }
        for m in self.mods() {
            // implied bits are printed through the mod implying them
            let hidden = match m {
                Mod::DoubleTime => self.has(Mod::Nightcore),
                Mod::SuddenDeath => self.has(Mod::Perfect),
                _ => false,
            };
            if !hidden {
                write!(f, "{}", m.acronym())?;
            }
        }
        Ok(())
    }
}

/// Direction of a speed normalization applied to a timing statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Normalize a value measured in game time to real time
    Converted,
    /// Inverse of `Converted`
    Unconverted,
}

/// Scale a timing statistic by the speed factor of `mods`.
///
/// DT/NC values shrink by 1.5 when converted, HT values grow by 1/0.75.
pub fn convert_statistic(value: f64, mods: ModCombination, direction: Conversion) -> f64 {
    let factor = 1.0 / mods.speed_multiplier();
    match direction {
        Conversion::Converted => value * factor,
        Conversion::Unconverted => value / factor,
    }
}
