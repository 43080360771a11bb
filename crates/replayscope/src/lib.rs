//! # replayscope
//!
//! Replay analysis for osu!standard: load replays from the scoring service,
//! from disk or from memory, and investigate them for stolen replays, relax,
//! aim correction and timewarp.
//!
//! This crate provides:
//! - Staged loading of replays and replay collections ([`Loader`])
//! - A rate-limited, retrying client for the scoring service ([`ApiClient`])
//! - A lossy-compressed SQLite replay cache ([`CacheStore`])
//! - Similarity, hit judgments, unstable rate, frametime and snap
//!   investigations ([`Investigator`])
//!
//! Decompressing replay files and parsing beatmaps are left to the caller,
//! through [`ReplayDecoder`] and [`BeatmapProvider`].
//!
//! ## Feature Flags
//!
//! - `http` (default): the `ureq` transport used by [`ApiClient::new`].

pub mod api;
pub mod beatmap;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
pub mod game_version;
pub mod investigate;
pub mod loadable;
pub mod mods;
pub mod span;

pub use api::{ApiClient, RateLimiter, RatelimitWeight, ScoreInfo, Transport};
pub use beatmap::{Beatmap, BeatmapProvider, BeatmapRef, HitObject, InMemoryBeatmaps};
pub use cache::{CacheKey, CacheStore};
pub use config::{GuardConfig, GuardConfigBuilder};
pub use decoder::{DecodedReplay, ReplayDecoder, ReplayHeader, parse_frame_text};
pub use error::{Error, Result};
pub use events::{Frame, Keys, RawFrame, ReplayEvents};
pub use game_version::GameVersion;
pub use investigate::{Detect, DetectRequest, InvestigationResult, Investigator};
pub use loadable::{Loadable, LoadableSet, Loader, Replay, ReplayContainer};
pub use mods::{Mod, ModCombination};
pub use span::Span;
