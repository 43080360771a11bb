use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::{HitCounts, RatelimitWeight, ScoreInfo};
use crate::decoder::ReplayHeader;
use crate::error::{Error, Result};
use crate::events::ReplayEvents;
use crate::game_version::GameVersion;
use crate::mods::ModCombination;

/// Where a replay's data comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaySource {
    /// A score submitted online, identified by map, user and optionally mods.
    /// Without mods the user's best score on the map is meant.
    Map {
        map_id: u32,
        user_id: u32,
        mods: Option<ModCombination>,
        /// Listing entry this replay was created from, saving a lookup
        info: Option<ScoreInfo>,
    },
    /// A replay file on disk
    File { path: PathBuf },
    /// Replay file contents held in memory
    Bytes { data: Arc<[u8]> },
    /// A score known only by its id; the service returns its frames and
    /// nothing else
    Id { replay_id: u64 },
}

/// What a replay source can ever provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The beatmap played is known or resolvable
    pub map_context: bool,
    /// The mods played are known
    pub mod_context: bool,
    /// Loads may be written to and served from the cache
    pub cacheable: bool,
}

impl ReplaySource {
    pub fn weight(&self) -> RatelimitWeight {
        match self {
            Self::Map { .. } | Self::Id { .. } => RatelimitWeight::Heavy,
            Self::File { .. } | Self::Bytes { .. } => RatelimitWeight::Light,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::Map { .. } => Capabilities {
                map_context: true,
                mod_context: true,
                cacheable: true,
            },
            Self::File { .. } | Self::Bytes { .. } => Capabilities {
                map_context: true,
                mod_context: true,
                cacheable: false,
            },
            Self::Id { .. } => Capabilities {
                map_context: false,
                mod_context: false,
                cacheable: true,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Map { .. } => "map replay",
            Self::File { .. } => "file replay",
            Self::Bytes { .. } => "in-memory replay",
            Self::Id { .. } => "replay id",
        }
    }
}

/// Descriptive fields of a loaded replay. Which are filled depends on the
/// source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplayMeta {
    pub map_id: Option<u32>,
    pub user_id: Option<u32>,
    pub username: Option<String>,
    pub mods: Option<ModCombination>,
    pub replay_id: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub beatmap_hash: Option<String>,
    pub game_version: Option<GameVersion>,
    pub counts: Option<HitCounts>,
    pub score: Option<u64>,
    pub max_combo: Option<u32>,
    pub perfect: Option<bool>,
    pub pp: Option<f64>,
}

impl ReplayMeta {
    pub fn from_score(info: &ScoreInfo) -> Self {
        Self {
            map_id: info.map_id,
            user_id: Some(info.user_id),
            username: info.username.clone(),
            mods: Some(info.mods),
            replay_id: Some(info.replay_id),
            timestamp: Some(info.timestamp),
            beatmap_hash: None,
            // players are assumed to keep their client up to date
            game_version: Some(GameVersion::from_datetime(info.timestamp)),
            counts: Some(info.counts),
            score: Some(info.score),
            max_combo: Some(info.max_combo),
            perfect: Some(info.perfect),
            pp: info.pp,
        }
    }

    pub fn from_header(header: &ReplayHeader) -> Self {
        Self {
            username: header.username.clone(),
            mods: header.mods,
            replay_id: header.replay_id.filter(|id| *id != 0),
            timestamp: header.timestamp,
            beatmap_hash: header.beatmap_hash.clone(),
            game_version: header.game_version.map(GameVersion::Concrete),
            counts: header.counts,
            ..Default::default()
        }
    }
}

/// Frames of a loaded replay, or the knowledge that there are none to get.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayData {
    Events(ReplayEvents),
    /// The source had no usable frames for this replay
    NoData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedReplay {
    pub meta: ReplayMeta,
    pub data: ReplayData,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ReplayState {
    #[default]
    Unloaded,
    Loaded(LoadedReplay),
}

/// One replay, created cheaply from its identity and loaded at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    pub(crate) source: ReplaySource,
    pub(crate) cache: Option<bool>,
    pub(crate) state: ReplayState,
}

impl Replay {
    fn with_source(source: ReplaySource) -> Self {
        Self {
            source,
            cache: None,
            state: ReplayState::Unloaded,
        }
    }

    pub fn map(map_id: u32, user_id: u32, mods: Option<ModCombination>) -> Self {
        Self::with_source(ReplaySource::Map {
            map_id,
            user_id,
            mods,
            info: None,
        })
    }

    /// Replay of a listing entry. Fails if the entry has no beatmap id.
    pub fn from_score(info: ScoreInfo) -> Result<Self> {
        let map_id = info.map_id.ok_or_else(|| {
            Error::InvalidArgument(format!("score {} has no beatmap id", info.replay_id))
        })?;
        Ok(Self::with_source(ReplaySource::Map {
            map_id,
            user_id: info.user_id,
            mods: Some(info.mods),
            info: Some(info),
        }))
    }

    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_source(ReplaySource::File { path: path.into() })
    }

    pub fn bytes<B: Into<Arc<[u8]>>>(data: B) -> Self {
        Self::with_source(ReplaySource::Bytes { data: data.into() })
    }

    pub fn id(replay_id: u64) -> Self {
        Self::with_source(ReplaySource::Id { replay_id })
    }

    /// Override the cascaded caching setting for this replay
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn source(&self) -> &ReplaySource {
        &self.source
    }

    pub fn cache(&self) -> Option<bool> {
        self.cache
    }

    pub fn state(&self) -> &ReplayState {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ReplayState::Loaded(_))
    }

    /// Loaded and holding frames
    pub fn has_data(&self) -> bool {
        matches!(
            self.state,
            ReplayState::Loaded(LoadedReplay {
                data: ReplayData::Events(_),
                ..
            })
        )
    }

    pub fn meta(&self) -> Option<&ReplayMeta> {
        match &self.state {
            ReplayState::Loaded(loaded) => Some(&loaded.meta),
            ReplayState::Unloaded => None,
        }
    }

    pub fn events(&self) -> Result<&ReplayEvents> {
        match &self.state {
            ReplayState::Loaded(LoadedReplay {
                data: ReplayData::Events(events),
                ..
            }) => Ok(events),
            ReplayState::Loaded(_) => Err(Error::ReplayUnavailable(format!(
                "{} has no replay data",
                self
            ))),
            ReplayState::Unloaded => Err(Error::NotLoaded(self.to_string())),
        }
    }

    /// Mods the replay was played with, if known at this stage
    pub fn mods(&self) -> Option<ModCombination> {
        if let Some(mods) = self.meta().and_then(|m| m.mods) {
            return Some(mods);
        }
        match &self.source {
            ReplaySource::Map { mods, .. } => *mods,
            _ => None,
        }
    }

    pub fn map_id(&self) -> Option<u32> {
        if let Some(map_id) = self.meta().and_then(|m| m.map_id) {
            return Some(map_id);
        }
        match &self.source {
            ReplaySource::Map { map_id, .. } => Some(*map_id),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.meta().and_then(|m| m.timestamp)
    }

    /// Budget a load of this replay would consume; nothing once loaded
    pub fn weight(&self) -> RatelimitWeight {
        if self.is_loaded() {
            RatelimitWeight::None
        } else {
            self.source.weight()
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.source.capabilities()
    }
}

impl fmt::Display for Replay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_loaded() { "loaded" } else { "unloaded" };
        match &self.source {
            ReplaySource::Map {
                map_id,
                user_id,
                mods,
                ..
            } => match mods {
                Some(mods) => write!(
                    f,
                    "{} map replay by {} on {} +{}",
                    state, user_id, map_id, mods
                ),
                None => write!(f, "{} map replay by {} on {}", state, user_id, map_id),
            },
            ReplaySource::File { path } => write!(f, "{} replay file {}", state, path.display()),
            ReplaySource::Bytes { data } => {
                write!(f, "{} in-memory replay ({} bytes)", state, data.len())
            }
            ReplaySource::Id { replay_id } => write!(f, "{} replay {}", state, replay_id),
        }
    }
}
