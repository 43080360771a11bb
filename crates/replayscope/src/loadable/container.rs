use std::fmt;
use std::path::PathBuf;

use crate::api::RatelimitWeight;
use crate::mods::ModCombination;
use crate::span::Span;

use super::replay::Replay;

/// What a container selects its replays from.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerKind {
    /// Top scores on a map
    MapLeaderboard {
        map_id: u32,
        span: Span,
        mods: Option<ModCombination>,
    },
    /// A user's best scores across all maps
    UserTopPlays {
        user_id: u32,
        span: Span,
        mods: Option<ModCombination>,
        available_only: bool,
    },
    /// Every score a user set on one map, not only the best
    UserMapHistory {
        map_id: u32,
        user_id: u32,
        span: Span,
        available_only: bool,
    },
    /// Every `.osr` file in a directory
    Directory { path: PathBuf },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ContainerState {
    #[default]
    Unloaded,
    /// Members known but not loaded
    InfoLoaded(Vec<Replay>),
    /// Every member loaded
    Loaded(Vec<Replay>),
}

/// A selection of replays, resolved lazily into its members.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayContainer {
    pub(crate) kind: ContainerKind,
    pub(crate) cache: Option<bool>,
    pub(crate) state: ContainerState,
}

impl ReplayContainer {
    pub fn new(kind: ContainerKind) -> Self {
        Self {
            kind,
            cache: None,
            state: ContainerState::Unloaded,
        }
    }

    pub fn map_leaderboard(map_id: u32, span: Span, mods: Option<ModCombination>) -> Self {
        Self::new(ContainerKind::MapLeaderboard { map_id, span, mods })
    }

    pub fn user_top_plays(user_id: u32, span: Span, mods: Option<ModCombination>) -> Self {
        Self::new(ContainerKind::UserTopPlays {
            user_id,
            span,
            mods,
            available_only: true,
        })
    }

    pub fn user_map_history(map_id: u32, user_id: u32, span: Span) -> Self {
        Self::new(ContainerKind::UserMapHistory {
            map_id,
            user_id,
            span,
            available_only: true,
        })
    }

    pub fn directory<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(ContainerKind::Directory { path: path.into() })
    }

    /// Keep members whose replay the service reports as unavailable
    pub fn including_unavailable(mut self) -> Self {
        match &mut self.kind {
            ContainerKind::UserTopPlays { available_only, .. }
            | ContainerKind::UserMapHistory { available_only, .. } => *available_only = false,
            ContainerKind::MapLeaderboard { .. } | ContainerKind::Directory { .. } => {}
        }
        self
    }

    /// Caching default for members that do not set their own
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn kind(&self) -> &ContainerKind {
        &self.kind
    }

    pub fn cache(&self) -> Option<bool> {
        self.cache
    }

    pub fn state(&self) -> &ContainerState {
        &self.state
    }

    pub fn is_info_loaded(&self) -> bool {
        !matches!(self.state, ContainerState::Unloaded)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ContainerState::Loaded(_))
    }

    /// Members; empty until info-loaded
    pub fn replays(&self) -> &[Replay] {
        match &self.state {
            ContainerState::Unloaded => &[],
            ContainerState::InfoLoaded(replays) | ContainerState::Loaded(replays) => replays,
        }
    }

    pub fn replays_mut(&mut self) -> &mut [Replay] {
        match &mut self.state {
            ContainerState::Unloaded => &mut [],
            ContainerState::InfoLoaded(replays) | ContainerState::Loaded(replays) => replays,
        }
    }

    pub fn len(&self) -> usize {
        self.replays().len()
    }

    pub fn is_empty(&self) -> bool {
        self.replays().is_empty()
    }

    /// Heaviest load among the members, or of the info query when unresolved
    pub fn weight(&self) -> RatelimitWeight {
        match &self.state {
            ContainerState::Unloaded => match self.kind {
                ContainerKind::Directory { .. } => RatelimitWeight::Light,
                _ => RatelimitWeight::Heavy,
            },
            ContainerState::InfoLoaded(replays) | ContainerState::Loaded(replays) => replays
                .iter()
                .map(Replay::weight)
                .max()
                .unwrap_or_default(),
        }
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.state = match std::mem::take(&mut self.state) {
            ContainerState::InfoLoaded(replays) => ContainerState::Loaded(replays),
            other => other,
        };
    }
}

impl fmt::Display for ReplayContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ContainerKind::MapLeaderboard { map_id, span, mods } => match mods {
                Some(mods) => write!(f, "leaderboard of {} +{} ({})", map_id, mods, span),
                None => write!(f, "leaderboard of {} ({})", map_id, span),
            },
            ContainerKind::UserTopPlays { user_id, span, .. } => {
                write!(f, "top plays of {} ({})", user_id, span)
            }
            ContainerKind::UserMapHistory {
                map_id,
                user_id,
                span,
                ..
            } => write!(f, "scores of {} on {} ({})", user_id, map_id, span),
            ContainerKind::Directory { path } => write!(f, "replays in {}", path.display()),
        }
    }
}
