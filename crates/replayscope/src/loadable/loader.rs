use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{ApiClient, ScoreInfo};
use crate::cache::{CacheIdentity, CacheKey, CacheRecord, CacheStore};
use crate::config::{GuardConfig, resolve_cache};
use crate::decoder::ReplayDecoder;
use crate::error::{Error, Result};
use crate::events::ReplayEvents;
use crate::mods::ModCombination;
use crate::span::{MAX_RANK, Span};

use super::container::{ContainerKind, ContainerState, ReplayContainer};
use super::replay::{LoadedReplay, Replay, ReplayData, ReplayMeta, ReplaySource, ReplayState};
use super::{Loadable, LoadableSet};

/// Moves loadables through their lifecycle.
///
/// Holds the optional collaborators a load may need: the fetch client, the
/// cache and the replay decoder. A load that needs a missing collaborator
/// fails with `Error::Unsupported` before touching the network.
pub struct Loader {
    config: GuardConfig,
    client: Option<ApiClient>,
    cache: Option<CacheStore>,
    decoder: Option<Arc<dyn ReplayDecoder>>,
}

impl Loader {
    /// Loader wired from `config`: a fetch client when an API key is set and
    /// a cache when a cache path is set.
    pub fn new(config: GuardConfig) -> Result<Self> {
        let cache = match &config.cache_path {
            Some(path) => Some(CacheStore::open(path)?),
            None => None,
        };

        #[cfg(feature = "http")]
        let client = if config.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
            Some(ApiClient::new(&config)?)
        } else {
            None
        };
        #[cfg(not(feature = "http"))]
        let client = None;

        info!(
            "Loader ready (api: {}, cache: {})",
            client.is_some(),
            cache.as_ref().map(|c| c.path().display().to_string()).unwrap_or_else(|| "none".to_string())
        );

        Ok(Self {
            config,
            client,
            cache,
            decoder: None,
        })
    }

    /// Loader with no collaborators; attach them with the `with_*` methods
    pub fn offline(config: GuardConfig) -> Self {
        Self {
            config,
            client: None,
            cache: None,
            decoder: None,
        }
    }

    pub fn with_client(mut self, client: ApiClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ReplayDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn client(&self) -> Option<&ApiClient> {
        self.client.as_ref()
    }

    pub fn cache(&self) -> Option<&CacheStore> {
        self.cache.as_ref()
    }

    fn require_client(&self, what: &str) -> Result<&ApiClient> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::Unsupported(format!("{} requires API access", what)))
    }

    fn require_decoder(&self, what: &str) -> Result<&dyn ReplayDecoder> {
        self.decoder
            .as_deref()
            .ok_or_else(|| Error::Unsupported(format!("{} requires a replay decoder", what)))
    }

    /// Load any loadable, inheriting the global caching setting
    pub fn load(&self, loadable: &mut Loadable) -> Result<()> {
        match loadable {
            Loadable::Replay(replay) => self.load_replay(replay, None),
            Loadable::Container(container) => self.load_container(container, None),
        }
    }

    /// Info-load every container in the set
    pub fn load_set_info(&self, set: &mut LoadableSet) -> Result<()> {
        for loadable in set.loadables.iter_mut() {
            if let Loadable::Container(container) = loadable {
                self.load_info(container)?;
            }
        }
        Ok(())
    }

    /// Load every member of the set in order, stopping at the first failure
    pub fn load_set(&self, set: &mut LoadableSet) -> Result<()> {
        let inherited = set.cache;
        for loadable in set.loadables.iter_mut() {
            match loadable {
                Loadable::Replay(replay) => self.load_replay(replay, inherited)?,
                Loadable::Container(container) => self.load_container(container, inherited)?,
            }
        }
        Ok(())
    }

    /// Load a replay unless it already is
    pub fn ensure_loaded(&self, replay: &mut Replay) -> Result<()> {
        self.load_replay(replay, None)
    }

    /// Load `replay`, with `inherited` the caching setting of whatever
    /// contains it.
    ///
    /// A replay that is already loaded is left untouched. On failure the
    /// replay stays unloaded.
    pub fn load_replay(&self, replay: &mut Replay, inherited: Option<bool>) -> Result<()> {
        if replay.is_loaded() {
            debug!("{} already loaded, not loading", replay);
            return Ok(());
        }
        let cache = resolve_cache(self.config.cache, inherited, replay.cache);
        debug!("Loading {} (cache: {})", replay, cache);

        let loaded = match &replay.source {
            ReplaySource::Map {
                map_id,
                user_id,
                mods,
                info,
            } => self.load_map_replay(*map_id, *user_id, *mods, info.as_ref(), cache)?,
            ReplaySource::Id { replay_id } => self.load_id_replay(*replay_id, cache)?,
            ReplaySource::File { path } => {
                let decoder = self.require_decoder("a file replay")?;
                let bytes = fs::read(path)?;
                self.load_replay_file(decoder, &bytes)?
            }
            ReplaySource::Bytes { data } => {
                let decoder = self.require_decoder("an in-memory replay")?;
                self.load_replay_file(decoder, data)?
            }
        };

        replay.state = ReplayState::Loaded(loaded);
        debug!("Finished loading {}", replay);
        Ok(())
    }

    fn cached(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        match &self.cache {
            Some(store) => store.lookup(key),
            None => Ok(None),
        }
    }

    /// A failed cache write never fails the load that produced the events.
    fn store(&self, cache: bool, identity: &CacheIdentity, events: &ReplayEvents) {
        if let Some(store) = self.cache.as_ref().filter(|_| cache) {
            if let Err(e) = store.store(identity, events) {
                warn!("Could not cache {:?}: {}", identity, e);
            }
        }
    }

    fn load_map_replay(
        &self,
        map_id: u32,
        user_id: u32,
        mods: Option<ModCombination>,
        info: Option<&ScoreInfo>,
        cache: bool,
    ) -> Result<LoadedReplay> {
        let known_mods = info.map(|i| i.mods).or(mods);
        if let Some(mods) = known_mods {
            if let Some(loaded) = self.cached_map_replay(map_id, user_id, mods, info)? {
                return Ok(loaded);
            }
        }

        let client = self.require_client("a map replay")?;
        let decoder = self.require_decoder("a map replay")?;

        let info = match info {
            Some(info) => info.clone(),
            None => {
                let info = client
                    .scores(map_id, Some(user_id), mods, 1)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        Error::NoInfoAvailable(format!("no score by {} on {}", user_id, map_id))
                    })?;
                // the listing told us the mods, so the cache may have it after all
                if known_mods.is_none() {
                    if let Some(loaded) =
                        self.cached_map_replay(map_id, user_id, info.mods, Some(&info))?
                    {
                        return Ok(loaded);
                    }
                }
                info
            }
        };

        let mut meta = ReplayMeta::from_score(&info);
        meta.map_id.get_or_insert(map_id);

        if !info.replay_available {
            debug!(
                "Replay data by {} on {} with mods {} not available",
                user_id, map_id, info.mods
            );
            return Ok(LoadedReplay {
                meta,
                data: ReplayData::NoData,
            });
        }

        let bytes = client.replay_data(map_id, user_id, Some(info.mods))?;
        let Some(events) = decode_service_replay(decoder, &bytes, || {
            format!("{} on {}", user_id, map_id)
        })?
        else {
            return Ok(LoadedReplay {
                meta,
                data: ReplayData::NoData,
            });
        };

        let identity = CacheIdentity {
            map_id: Some(map_id),
            user_id: Some(user_id),
            mods: Some(info.mods),
            replay_id: Some(info.replay_id),
        };
        self.store(cache, &identity, &events);

        Ok(LoadedReplay {
            meta,
            data: ReplayData::Events(events),
        })
    }

    fn cached_map_replay(
        &self,
        map_id: u32,
        user_id: u32,
        mods: ModCombination,
        info: Option<&ScoreInfo>,
    ) -> Result<Option<LoadedReplay>> {
        let key = CacheKey::MapUserMods {
            map_id,
            user_id,
            mods,
        };
        let Some(record) = self.cached(&key)? else {
            return Ok(None);
        };

        let mut meta = info.map(ReplayMeta::from_score).unwrap_or_default();
        meta.map_id = Some(map_id);
        meta.user_id = Some(user_id);
        meta.mods = Some(mods);
        if meta.replay_id.is_none() {
            meta.replay_id = record.identity.replay_id;
        }
        Ok(Some(LoadedReplay {
            meta,
            data: ReplayData::Events(record.events),
        }))
    }

    fn load_id_replay(&self, replay_id: u64, cache: bool) -> Result<LoadedReplay> {
        let meta = ReplayMeta {
            replay_id: Some(replay_id),
            ..Default::default()
        };

        if let Some(record) = self.cached(&CacheKey::ReplayId(replay_id))? {
            return Ok(LoadedReplay {
                meta,
                data: ReplayData::Events(record.events),
            });
        }

        let client = self.require_client("a replay id")?;
        let decoder = self.require_decoder("a replay id")?;

        let bytes = client.replay_data_by_id(replay_id)?;
        let Some(events) =
            decode_service_replay(decoder, &bytes, || format!("replay {}", replay_id))?
        else {
            return Ok(LoadedReplay {
                meta,
                data: ReplayData::NoData,
            });
        };

        let identity = CacheIdentity {
            replay_id: Some(replay_id),
            ..Default::default()
        };
        self.store(cache, &identity, &events);

        Ok(LoadedReplay {
            meta,
            data: ReplayData::Events(events),
        })
    }

    fn load_replay_file(&self, decoder: &dyn ReplayDecoder, bytes: &[u8]) -> Result<LoadedReplay> {
        let decoded = decoder.decode(bytes)?;
        let mut meta = ReplayMeta::from_header(&decoded.header);
        let events = ReplayEvents::from_raw(decoded.frames)?;

        if self.config.resolve_file_ids {
            if let Some(client) = &self.client {
                if let Some(hash) = &meta.beatmap_hash {
                    meta.map_id = Some(client.beatmap_id(hash)?).filter(|id| *id != 0);
                }
                if let Some(username) = &meta.username {
                    meta.user_id = Some(client.user_id(username)?).filter(|id| *id != 0);
                }
            }
        }

        Ok(LoadedReplay {
            meta,
            data: ReplayData::Events(events),
        })
    }

    /// Resolve a container's members without loading them.
    ///
    /// A container that is already info-loaded is left untouched.
    pub fn load_info(&self, container: &mut ReplayContainer) -> Result<()> {
        if container.is_info_loaded() {
            debug!("{} already info-loaded", container);
            return Ok(());
        }
        debug!("Loading info of {}", container);

        let replays = match &container.kind {
            ContainerKind::MapLeaderboard { map_id, span, mods } => {
                let client = self.require_client("a map leaderboard")?;
                let scores = client.scores(*map_id, None, *mods, span.max())?;
                select_scores(scores, span, *mods, false)
                    .into_iter()
                    .map(Replay::from_score)
                    .collect::<Result<Vec<_>>>()?
            }
            ContainerKind::UserTopPlays {
                user_id,
                span,
                mods,
                available_only,
            } => {
                let client = self.require_client("a user's top plays")?;
                // top-play listings carry no username
                let username = Some(client.username(*user_id)?).filter(|name| !name.is_empty());
                // a mod filter thins the listing, so fetch all of it
                let limit = if mods.is_some() { MAX_RANK } else { span.max() };
                let scores = client.user_best(*user_id, limit)?;
                select_scores(scores, span, *mods, *available_only)
                    .into_iter()
                    .map(|mut score| {
                        if score.username.is_none() {
                            score.username = username.clone();
                        }
                        Replay::from_score(score)
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            ContainerKind::UserMapHistory {
                map_id,
                user_id,
                span,
                available_only,
            } => {
                let client = self.require_client("a user's map history")?;
                let scores = client.scores(*map_id, Some(*user_id), None, MAX_RANK)?;
                select_scores(scores, span, None, *available_only)
                    .into_iter()
                    .map(Replay::from_score)
                    .collect::<Result<Vec<_>>>()?
            }
            ContainerKind::Directory { path } => directory_replays(path)?,
        };

        info!("{} resolved to {} replays", container, replays.len());
        container.state = ContainerState::InfoLoaded(replays);
        Ok(())
    }

    /// Info-load if needed, then load every member in rank order.
    ///
    /// The first member failure aborts and is returned; the container is only
    /// marked loaded once every member is.
    pub fn load_container(
        &self,
        container: &mut ReplayContainer,
        inherited: Option<bool>,
    ) -> Result<()> {
        if container.is_loaded() {
            debug!("{} already loaded, not loading", container);
            return Ok(());
        }
        self.load_info(container)?;

        let cascade = container.cache.or(inherited);
        for replay in container.replays_mut() {
            self.load_replay(replay, cascade)?;
        }
        container.mark_loaded();
        Ok(())
    }
}

/// Apply the exact mod filter and drop repeated identities, then take the
/// span's ranks and apply availability. Ranks count distinct replays.
fn select_scores(
    scores: Vec<ScoreInfo>,
    span: &Span,
    mods: Option<ModCombination>,
    available_only: bool,
) -> Vec<ScoreInfo> {
    let mut seen = HashSet::new();
    let filtered: Vec<ScoreInfo> = scores
        .into_iter()
        .filter(|s| mods.is_none_or(|mods| s.mods == mods))
        .filter(|s| seen.insert((s.map_id, s.user_id, s.mods)))
        .collect();

    span.select(&filtered)
        .into_iter()
        .filter(|s| !available_only || s.replay_available)
        .collect()
}

/// Decode frames the service returned; corrupt or empty data is `None`.
fn decode_service_replay(
    decoder: &dyn ReplayDecoder,
    bytes: &[u8],
    what: impl FnOnce() -> String,
) -> Result<Option<ReplayEvents>> {
    match decoder.decode_frames(bytes).and_then(ReplayEvents::from_raw) {
        Ok(events) => Ok(Some(events)),
        Err(Error::Decode(reason)) => {
            warn!("Service returned a corrupt replay for {}: {}", what(), reason);
            Ok(None)
        }
        Err(Error::EmptyReplayData) => {
            warn!("Service returned an empty replay for {}", what());
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn directory_replays(dir: &Path) -> Result<Vec<Replay>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_osr = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("osr"));
        if is_osr && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths.into_iter().map(Replay::file).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::api::RateLimiter;
    use crate::api::ratelimit::testing::ManualClock;
    use crate::api::testing::ScriptedTransport;
    use crate::decoder::{DecodedReplay, ReplayHeader, parse_frame_text};
    use crate::events::RawFrame;

    /// Decoder whose "compressed" streams are plain frame text
    struct TextDecoder;

    impl ReplayDecoder for TextDecoder {
        fn decode(&self, bytes: &[u8]) -> Result<DecodedReplay> {
            let text = std::str::from_utf8(bytes).map_err(|e| Error::Decode(e.to_string()))?;
            let (header, frames) = text
                .split_once('\n')
                .ok_or_else(|| Error::Decode("missing header line".to_string()))?;
            let mut fields = header.split(';');
            let header = ReplayHeader {
                beatmap_hash: fields.next().map(str::to_string),
                username: fields.next().map(str::to_string),
                mods: fields.next().and_then(|m| m.parse().ok()),
                game_version: Some(20200101),
                ..Default::default()
            };
            Ok(DecodedReplay {
                header,
                frames: parse_frame_text(frames)?,
            })
        }

        fn decode_frames(&self, bytes: &[u8]) -> Result<Vec<RawFrame>> {
            let text = std::str::from_utf8(bytes).map_err(|e| Error::Decode(e.to_string()))?;
            parse_frame_text(text)
        }
    }

    const FRAMES: &str = "0|0|0|0,-1|256|-500|0,10|100|100|0,16|110|100|1,16|120|100|0";

    fn score_json(replay_id: u64, user_id: u32, mods: u32, available: bool) -> String {
        format!(
            r#"{{"score_id":"{}","score":"1000","username":"u{}","count300":"10","count100":"0",
            "count50":"0","countmiss":"0","maxcombo":"10","countkatu":"0","countgeki":"0",
            "perfect":"0","enabled_mods":"{}","user_id":"{}","date":"2020-01-01 00:00:00",
            "rank":"S","pp":"100","replay_available":"{}"}}"#,
            replay_id,
            user_id,
            mods,
            user_id,
            if available { 1 } else { 0 }
        )
    }

    fn replay_json() -> String {
        replay_json_of(FRAMES)
    }

    fn replay_json_of(frames: &str) -> String {
        use base64::Engine;
        let content = base64::engine::general_purpose::STANDARD.encode(frames);
        format!(r#"{{"content":"{}","encoding":"base64"}}"#, content)
    }

    fn replay_ids(container: &ReplayContainer) -> Vec<u64> {
        container
            .replays()
            .iter()
            .map(|r| match r.source() {
                ReplaySource::Map { info, .. } => info.as_ref().unwrap().replay_id,
                _ => unreachable!(),
            })
            .collect()
    }

    fn client(transport: &ScriptedTransport) -> ApiClient {
        let limiter = Arc::new(RateLimiter::with_clock(
            Duration::from_secs(60),
            10,
            Arc::new(ManualClock::new()),
        ));
        let config = GuardConfig::builder().api_key("key").build();
        ApiClient::with_transport(&config, Box::new(transport.clone()), limiter).unwrap()
    }

    fn loader(transport: &ScriptedTransport, config: GuardConfig) -> Loader {
        Loader::offline(config)
            .with_client(client(transport))
            .with_decoder(Arc::new(TextDecoder))
    }

    #[test]
    fn test_map_replay_loads_once() {
        let transport = ScriptedTransport::new();
        transport.push_json(&format!("[{}]", score_json(11, 2, 8, true)));
        transport.push_json(&replay_json());
        let loader = loader(&transport, GuardConfig::default());

        let mut replay = Replay::map(1, 2, None);
        loader.load_replay(&mut replay, None).unwrap();
        let first = replay.clone();
        loader.load_replay(&mut replay, None).unwrap();

        assert_eq!(replay, first);
        assert_eq!(transport.count("get_replay"), 1);
        assert_eq!(transport.count("get_scores"), 1);

        let meta = replay.meta().unwrap();
        assert_eq!(meta.map_id, Some(1));
        assert_eq!(meta.username.as_deref(), Some("u2"));
        assert_eq!(meta.mods, Some(ModCombination::from_bits(8)));
        assert_eq!(replay.events().unwrap().len(), 3);
    }

    #[test]
    fn test_unavailable_replay_loads_as_no_data() {
        let transport = ScriptedTransport::new();
        transport.push_json(&format!("[{}]", score_json(11, 2, 0, false)));
        let loader = loader(&transport, GuardConfig::default());

        let mut replay = Replay::map(1, 2, Some(ModCombination::NM));
        loader.load_replay(&mut replay, None).unwrap();

        assert!(replay.is_loaded());
        assert!(!replay.has_data());
        assert_eq!(transport.count("get_replay"), 0);
    }

    #[test]
    fn test_corrupt_service_replay_loads_as_no_data() {
        let transport = ScriptedTransport::new();
        transport.push_json(&replay_json_of("1|2|3"));
        transport.push_json(&format!("[{}]", score_json(11, 2, 0, true)));
        transport.push_json(&replay_json_of("1|2|3"));
        let loader = loader(&transport, GuardConfig::default());

        let mut by_id = Replay::id(5);
        loader.load_replay(&mut by_id, None).unwrap();
        assert!(by_id.is_loaded());
        assert!(!by_id.has_data());
        assert_eq!(by_id.meta().unwrap().replay_id, Some(5));

        let mut by_map = Replay::map(1, 2, None);
        loader.load_replay(&mut by_map, None).unwrap();
        assert!(by_map.is_loaded());
        assert!(!by_map.has_data());
    }

    #[test]
    fn test_empty_service_replay_loads_as_no_data() {
        let transport = ScriptedTransport::new();
        transport.push_json(&replay_json_of("0|0|0|0,"));
        transport.push_json(&format!("[{}]", score_json(11, 2, 0, true)));
        transport.push_json(&replay_json_of("0|0|0|0,-12345|0|0|0"));
        let loader = loader(&transport, GuardConfig::default());

        let mut by_id = Replay::id(5);
        loader.load_replay(&mut by_id, None).unwrap();
        assert!(by_id.is_loaded());
        assert!(!by_id.has_data());

        let mut by_map = Replay::map(1, 2, Some(ModCombination::NM));
        loader.load_replay(&mut by_map, None).unwrap();
        assert!(by_map.is_loaded());
        assert!(!by_map.has_data());
    }

    #[test]
    fn test_cache_write_failure_keeps_fetched_replay() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new();
        transport.push_json(&replay_json());
        transport.push_json(&format!("[{}]", score_json(11, 2, 0, true)));
        transport.push_json(&replay_json());
        let store = CacheStore::open(dir.path().join("cache.db")).unwrap();
        store.reject_writes();
        let loader = loader(&transport, GuardConfig::builder().cache(true).build()).with_cache(store);

        let mut by_id = Replay::id(5);
        loader.load_replay(&mut by_id, None).unwrap();
        assert_eq!(by_id.events().unwrap().len(), 3);

        let mut by_map = Replay::map(1, 2, None);
        loader.load_replay(&mut by_map, None).unwrap();
        assert_eq!(by_map.events().unwrap().len(), 3);

        assert_eq!(loader.cache().unwrap().len().unwrap(), 0);
    }

    #[test]
    fn test_failed_load_leaves_replay_unloaded() {
        let transport = ScriptedTransport::new();
        transport.push_json(&format!("[{}]", score_json(11, 2, 0, true)));
        transport.push_json(r#"{"error": "Replay retrieval failed."}"#);
        let loader = loader(&transport, GuardConfig::default());

        let mut replay = Replay::map(1, 2, None);
        let err = loader.load_replay(&mut replay, None).unwrap_err();
        assert!(matches!(err, Error::ReplayUnavailable(_)));
        assert!(!replay.is_loaded());
        assert!(replay.meta().is_none());
    }

    #[test]
    fn test_missing_collaborators_are_unsupported() {
        let loader = Loader::offline(GuardConfig::default());

        let mut replay = Replay::id(5);
        assert!(matches!(
            loader.load_replay(&mut replay, None),
            Err(Error::Unsupported(_))
        ));
        let mut file = Replay::bytes(b"x".to_vec());
        assert!(matches!(
            loader.load_replay(&mut file, None),
            Err(Error::Unsupported(_))
        ));
        let mut container = ReplayContainer::map_leaderboard(1, Span::full(), None);
        assert!(matches!(
            loader.load_info(&mut container),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_cache_round_trip_without_network() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("cache.db");

        let transport = ScriptedTransport::new();
        transport.push_json(&replay_json());
        let online = loader(&transport, GuardConfig::builder().cache(true).build())
            .with_cache(CacheStore::open(&cache_path).unwrap());
        let mut replay = Replay::id(77);
        online.load_replay(&mut replay, None).unwrap();
        drop(online);

        // no client at all: a network attempt would be Unsupported
        let offline = Loader::offline(GuardConfig::default())
            .with_cache(CacheStore::open(&cache_path).unwrap());
        let mut again = Replay::id(77);
        offline.load_replay(&mut again, None).unwrap();

        let a = replay.events().unwrap().frames();
        let b = again.events().unwrap().frames();
        assert_eq!(a.len(), b.len());
        for (fa, fb) in a.iter().zip(b) {
            assert_eq!(fa.t, fb.t);
            assert!((fa.x - fb.x).abs() <= crate::cache::codec::MAX_COORDINATE_ERROR);
        }
    }

    #[test]
    fn test_cache_flag_cascade() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new();
        transport.push_json(&replay_json());
        transport.push_json(&replay_json());
        let loader = loader(&transport, GuardConfig::builder().cache(true).build())
            .with_cache(CacheStore::open(dir.path().join("cache.db")).unwrap());

        // the replay's own setting beats the global default
        let mut skipped = Replay::id(1).with_cache(false);
        loader.load_replay(&mut skipped, None).unwrap();
        // the inherited setting beats the global default
        let mut inherited = Replay::id(2);
        loader.load_replay(&mut inherited, Some(false)).unwrap();

        assert_eq!(loader.cache().unwrap().len().unwrap(), 0);
    }

    #[test]
    fn test_leaderboard_span_and_exact_mods() {
        let transport = ScriptedTransport::new();
        let scores: Vec<String> = (1..=8)
            .map(|rank| score_json(rank, rank as u32, if rank == 2 { 24 } else { 8 }, true))
            .collect();
        transport.push_json(&format!("[{}]", scores.join(",")));
        let loader = loader(&transport, GuardConfig::default());

        let mut container =
            ReplayContainer::map_leaderboard(1, "1, 4-6".parse().unwrap(), Some("HD".parse().unwrap()));
        loader.load_info(&mut container).unwrap();

        // HDHR at rank 2 is dropped before the span is applied
        assert_eq!(replay_ids(&container), vec![1, 5, 6, 7]);
        assert!(container.replays().iter().all(|r| !r.is_loaded()));

        // info-loading again is a no-op
        loader.load_info(&mut container).unwrap();
        assert_eq!(transport.count("get_scores"), 1);
    }

    #[test]
    fn test_leaderboard_span_without_mod_filter() {
        let transport = ScriptedTransport::new();
        let scores: Vec<String> = (1..=8)
            .map(|rank| score_json(rank, rank as u32, 0, true))
            .collect();
        transport.push_json(&format!("[{}]", scores.join(",")));
        let loader = loader(&transport, GuardConfig::default());

        let mut container = ReplayContainer::map_leaderboard(1, "1, 4-6".parse().unwrap(), None);
        loader.load_info(&mut container).unwrap();

        assert_eq!(replay_ids(&container), vec![1, 4, 5, 6]);
    }

    #[test]
    fn test_repeated_scores_do_not_take_a_rank() {
        let transport = ScriptedTransport::new();
        let scores = [
            score_json(1, 1, 0, true),
            score_json(2, 1, 0, true),
            score_json(3, 3, 0, true),
            score_json(4, 4, 0, true),
        ];
        transport.push_json(&format!("[{}]", scores.join(",")));
        let loader = loader(&transport, GuardConfig::default());

        let mut container = ReplayContainer::map_leaderboard(1, "1-3".parse().unwrap(), None);
        loader.load_info(&mut container).unwrap();

        assert_eq!(replay_ids(&container), vec![1, 3, 4]);
    }

    #[test]
    fn test_top_plays_of_unknown_user_have_no_username() {
        let transport = ScriptedTransport::new();
        transport.push_json("[]");
        let score = score_json(1, 2, 0, true)
            .replace(r#""score_id""#, r#""beatmap_id":"100","score_id""#)
            .replace(r#""username":"u2","#, "");
        transport.push_json(&format!("[{}]", score));
        let loader = loader(&transport, GuardConfig::default());

        let mut container = ReplayContainer::user_top_plays(2, "1".parse().unwrap(), None);
        loader.load_info(&mut container).unwrap();

        assert_eq!(container.len(), 1);
        match container.replays()[0].source() {
            ReplaySource::Map { info, .. } => assert_eq!(info.as_ref().unwrap().username, None),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_top_plays_fill_username_and_skip_unavailable() {
        let transport = ScriptedTransport::new();
        transport.push_json(r#"[{"user_id": "2", "username": "alice"}]"#);
        let scores = [
            score_json(1, 2, 0, true).replace(r#""score_id""#, r#""beatmap_id":"100","score_id""#),
            score_json(2, 2, 0, false).replace(r#""score_id""#, r#""beatmap_id":"101","score_id""#),
            score_json(3, 2, 0, true).replace(r#""score_id""#, r#""beatmap_id":"102","score_id""#),
        ];
        transport.push_json(&format!("[{}]", scores.join(",")).replace(r#""username":"u2","#, ""));
        let loader = loader(&transport, GuardConfig::default());

        let mut container = ReplayContainer::user_top_plays(2, "1-3".parse().unwrap(), None);
        loader.load_info(&mut container).unwrap();

        assert_eq!(container.len(), 2);
        let replay = &container.replays()[1];
        assert_eq!(replay.map_id(), Some(102));
        match replay.source() {
            ReplaySource::Map { info, .. } => {
                assert_eq!(info.as_ref().unwrap().username.as_deref(), Some("alice"))
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_container_load_stops_at_first_failure() {
        let transport = ScriptedTransport::new();
        let scores = [score_json(1, 1, 0, true), score_json(2, 2, 0, true)];
        transport.push_json(&format!("[{}]", scores.join(",")));
        transport.push_json(&replay_json());
        transport.push_json(r#"{"error": "Replay not available."}"#);
        let loader = loader(&transport, GuardConfig::default());

        let mut container = ReplayContainer::map_leaderboard(1, Span::full(), None);
        let err = loader.load_container(&mut container, None).unwrap_err();

        assert!(matches!(err, Error::ReplayUnavailable(_)));
        assert!(container.is_info_loaded());
        assert!(!container.is_loaded());
        assert!(container.replays()[0].is_loaded());
        assert!(!container.replays()[1].is_loaded());
    }

    #[test]
    fn test_directory_container() {
        let dir = TempDir::new().unwrap();
        let body = format!("abc123;alice;HD\n{}", FRAMES);
        fs::write(dir.path().join("b.osr"), &body).unwrap();
        fs::write(dir.path().join("a.OSR"), &body).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loader = Loader::offline(GuardConfig::default()).with_decoder(Arc::new(TextDecoder));
        let mut container = ReplayContainer::directory(dir.path());
        loader.load_container(&mut container, None).unwrap();

        assert!(container.is_loaded());
        assert_eq!(container.len(), 2);
        assert!(container.replays()[0].to_string().ends_with("a.OSR"));
        let meta = container.replays()[1].meta().unwrap();
        assert_eq!(meta.beatmap_hash.as_deref(), Some("abc123"));
        assert_eq!(meta.mods, Some("HD".parse().unwrap()));
        assert_eq!(meta.map_id, None);
    }

    #[test]
    fn test_file_ids_resolved_when_enabled() {
        let transport = ScriptedTransport::new();
        transport.push_json(r#"[{"beatmap_id": "4242"}]"#);
        transport.push_json(r#"[{"user_id": "7", "username": "alice"}]"#);
        let loader = loader(
            &transport,
            GuardConfig::builder().resolve_file_ids(true).build(),
        );

        let mut replay = Replay::bytes(format!("abc123;alice;NM\n{}", FRAMES).into_bytes());
        loader.load_replay(&mut replay, None).unwrap();

        let meta = replay.meta().unwrap();
        assert_eq!(meta.map_id, Some(4242));
        assert_eq!(meta.user_id, Some(7));
        assert_eq!(replay.map_id(), Some(4242));
    }
}
