//! Staged loading of replays and replay collections.
//!
//! - [`Replay`]: `Unloaded -> Loaded`, loaded at most once
//! - [`ReplayContainer`]: `Unloaded -> InfoLoaded -> Loaded`; info-loading
//!   resolves the members, loading loads each of them in rank order
//! - [`Loader`]: performs the transitions through the fetch client, the
//!   cache and the replay decoder
//!
//! Caching is decided per load with [`resolve_cache`](crate::config::resolve_cache):
//! the replay's own setting, else its container's, else the global default.

mod container;
mod loader;
mod replay;

pub use container::{ContainerKind, ContainerState, ReplayContainer};
pub use loader::Loader;
pub use replay::{
    Capabilities, LoadedReplay, Replay, ReplayData, ReplayMeta, ReplaySource, ReplayState,
};

use crate::api::RatelimitWeight;

/// Either kind of loadable.
#[derive(Debug, Clone, PartialEq)]
pub enum Loadable {
    Replay(Replay),
    Container(ReplayContainer),
}

impl Loadable {
    pub fn is_loaded(&self) -> bool {
        match self {
            Self::Replay(replay) => replay.is_loaded(),
            Self::Container(container) => container.is_loaded(),
        }
    }

    pub fn weight(&self) -> RatelimitWeight {
        match self {
            Self::Replay(replay) => replay.weight(),
            Self::Container(container) => container.weight(),
        }
    }
}

impl From<Replay> for Loadable {
    fn from(replay: Replay) -> Self {
        Self::Replay(replay)
    }
}

impl From<ReplayContainer> for Loadable {
    fn from(container: ReplayContainer) -> Self {
        Self::Container(container)
    }
}

/// An ad-hoc mix of replays and containers loaded together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadableSet {
    pub(crate) loadables: Vec<Loadable>,
    pub(crate) cache: Option<bool>,
}

impl LoadableSet {
    pub fn new<I, L>(loadables: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Loadable>,
    {
        Self {
            loadables: loadables.into_iter().map(Into::into).collect(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn push<L: Into<Loadable>>(&mut self, loadable: L) {
        self.loadables.push(loadable.into());
    }

    pub fn loadables(&self) -> &[Loadable] {
        &self.loadables
    }

    pub fn len(&self) -> usize {
        self.loadables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loadables.is_empty()
    }

    /// Every replay in the set, container members included. Members of
    /// containers that are not info-loaded yet are missing.
    pub fn all_replays(&self) -> Vec<&Replay> {
        let mut replays = Vec::new();
        for loadable in &self.loadables {
            match loadable {
                Loadable::Replay(replay) => replays.push(replay),
                Loadable::Container(container) => replays.extend(container.replays()),
            }
        }
        replays
    }

    pub fn all_replays_mut(&mut self) -> Vec<&mut Replay> {
        let mut replays = Vec::new();
        for loadable in &mut self.loadables {
            match loadable {
                Loadable::Replay(replay) => replays.push(replay),
                Loadable::Container(container) => replays.extend(container.replays_mut()),
            }
        }
        replays
    }
}
