use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::models::{BeatmapRecord, ReplayPayload, ScoreInfo, UserRecord};
use super::ratelimit::{Clock, RateLimiter};
use super::transport::{Transport, TransportResponse};
use super::RatelimitWeight;
use crate::config::{GuardConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::mods::ModCombination;

const ERROR_INVALID_KEY: &str = "Please provide a valid API key.";
const ERROR_REPLAY_NOT_AVAILABLE: &str = "Replay not available.";
const ERROR_REPLAY_RETRIEVAL_FAILED: &str = "Replay retrieval failed.";
const ERROR_TOO_FAST: &str = "Requesting too fast";

/// Standard game mode; the only one analysed
const MODE_STD: &str = "0";

/// Retry state for one logical request
struct RetryState {
    attempt: u32,
    backoff_ms: u64,
    max_attempts: u32,
    max_backoff_ms: u64,
}

impl RetryState {
    fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            backoff_ms: config.initial_backoff_ms,
            max_attempts: config.max_attempts.max(1),
            max_backoff_ms: config.max_backoff_ms,
        }
    }

    fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts - 1
    }

    fn increment(&mut self) {
        self.attempt += 1;
        self.backoff_ms = (self.backoff_ms * 2).min(self.max_backoff_ms);
    }
}

/// What one exchange with the service amounted to
enum Reply<T> {
    Data(T),
    RateLimited,
}

/// Map a raw response onto data or a typed failure.
fn parse_reply<T: DeserializeOwned>(response: TransportResponse) -> Result<Reply<T>> {
    if response.status == 429 {
        return Ok(Reply::RateLimited);
    }
    if response.status == 401 || response.status == 403 {
        return Err(Error::InvalidKey);
    }
    if response.status >= 500 {
        return Err(Error::Transport(format!("server error {}", response.status)));
    }

    let value: Value = match serde_json::from_str(&response.body) {
        Ok(value) => value,
        Err(e) if response.status >= 400 => {
            return Err(Error::MalformedResponse(format!(
                "status {} with unreadable body: {}",
                response.status, e
            )));
        }
        Err(e) => return Err(Error::MalformedResponse(e.to_string())),
    };

    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return match message {
            ERROR_INVALID_KEY => Err(Error::InvalidKey),
            ERROR_REPLAY_NOT_AVAILABLE | ERROR_REPLAY_RETRIEVAL_FAILED => {
                Err(Error::ReplayUnavailable(message.to_string()))
            }
            m if m.starts_with(ERROR_TOO_FAST) => Ok(Reply::RateLimited),
            m => Err(Error::MalformedResponse(format!("service error: {}", m))),
        };
    }

    let empty = match &value {
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Null => true,
        _ => false,
    };
    if empty {
        return Err(Error::NoInfoAvailable(
            "the service returned an empty result".to_string(),
        ));
    }

    serde_json::from_value(value)
        .map(Reply::Data)
        .map_err(|e| Error::MalformedResponse(e.to_string()))
}

/// Rate-limited client for the scoring service.
///
/// Every call passes through [`RateLimiter::acquire`] with the call's weight.
/// Transport failures and malformed payloads are retried with exponential
/// backoff; invalid keys and empty results fail immediately.
pub struct ApiClient {
    transport: Box<dyn Transport>,
    api_key: String,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
    beatmap_ids: Mutex<HashMap<String, u32>>,
    user_ids: Mutex<HashMap<String, u32>>,
    usernames: Mutex<HashMap<u32, String>>,
}

impl ApiClient {
    /// Client over the default HTTP transport
    #[cfg(feature = "http")]
    pub fn new(config: &GuardConfig) -> Result<Self> {
        let transport = super::transport::UreqTransport::new(
            config.api_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        );
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_secs(config.ratelimit.window_secs),
            config.ratelimit.heavy_budget,
        ));
        Self::with_transport(config, Box::new(transport), limiter)
    }

    /// Client over a caller-supplied transport, sharing `limiter` with any
    /// other client built from the same `Arc`.
    pub fn with_transport(
        config: &GuardConfig,
        transport: Box<dyn Transport>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(Error::InvalidKey)?;

        Ok(Self {
            transport,
            api_key,
            limiter,
            retry: config.retry.clone(),
            beatmap_ids: Mutex::new(HashMap::new()),
            user_ids: Mutex::new(HashMap::new()),
            usernames: Mutex::new(HashMap::new()),
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn clock(&self) -> &Arc<dyn Clock> {
        self.limiter.clock()
    }

    /// Execute a request with rate limiting and retry logic
    fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        weight: RatelimitWeight,
    ) -> Result<T> {
        let mut query: Vec<(&str, String)> = Vec::with_capacity(params.len() + 1);
        query.push(("k", self.api_key.clone()));
        query.extend(params.iter().cloned());

        let mut state = RetryState::new(&self.retry);

        loop {
            self.limiter.acquire(weight);
            debug!("Requesting {} (weight: {})", endpoint, weight);

            let error = match self.transport.get(endpoint, &query).and_then(parse_reply::<T>) {
                Ok(Reply::Data(data)) => return Ok(data),
                Ok(Reply::RateLimited) => {
                    warn!("Service rate limit hit on {}, waiting for reset", endpoint);
                    self.limiter.wait_for_reset();
                    continue;
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            if !state.can_retry() {
                return Err(Error::Unavailable {
                    attempts: state.attempt + 1,
                    last: error.to_string(),
                });
            }

            warn!(
                "{} failed (attempt {}/{}): {}, retrying in {}ms",
                endpoint,
                state.attempt + 1,
                state.max_attempts,
                error,
                state.backoff_ms
            );
            self.clock().sleep(Duration::from_millis(state.backoff_ms));
            state.increment();
        }
    }

    /// Leaderboard of `map_id`, or one user's scores on it when `user_id` is set.
    ///
    /// Without `mods` the service returns each user's best score only.
    pub fn scores(
        &self,
        map_id: u32,
        user_id: Option<u32>,
        mods: Option<ModCombination>,
        limit: u32,
    ) -> Result<Vec<ScoreInfo>> {
        let mut params = vec![
            ("b", map_id.to_string()),
            ("m", MODE_STD.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(user_id) = user_id {
            params.push(("u", user_id.to_string()));
            params.push(("type", "id".to_string()));
        }
        if let Some(mods) = mods {
            params.push(("mods", mods.bits().to_string()));
        }

        let mut scores: Vec<ScoreInfo> = self.request("get_scores", &params, RatelimitWeight::Light)?;
        for score in &mut scores {
            score.map_id.get_or_insert(map_id);
        }
        debug!("Fetched {} scores on map {}", scores.len(), map_id);
        Ok(scores)
    }

    /// Top plays of `user_id`, best first
    pub fn user_best(&self, user_id: u32, limit: u32) -> Result<Vec<ScoreInfo>> {
        let params = [
            ("u", user_id.to_string()),
            ("type", "id".to_string()),
            ("m", MODE_STD.to_string()),
            ("limit", limit.to_string()),
        ];
        let scores: Vec<ScoreInfo> = self.request("get_user_best", &params, RatelimitWeight::Light)?;
        debug!("Fetched {} top plays of user {}", scores.len(), user_id);
        Ok(scores)
    }

    /// Compressed frame stream of a user's score on a map
    pub fn replay_data(
        &self,
        map_id: u32,
        user_id: u32,
        mods: Option<ModCombination>,
    ) -> Result<Vec<u8>> {
        let mut params = vec![
            ("b", map_id.to_string()),
            ("u", user_id.to_string()),
            ("type", "id".to_string()),
            ("m", MODE_STD.to_string()),
        ];
        if let Some(mods) = mods {
            params.push(("mods", mods.bits().to_string()));
        }
        let payload: ReplayPayload = self.request("get_replay", &params, RatelimitWeight::Heavy)?;
        decode_payload(payload)
    }

    /// Compressed frame stream of a score by its id
    pub fn replay_data_by_id(&self, replay_id: u64) -> Result<Vec<u8>> {
        let params = [("s", replay_id.to_string()), ("m", MODE_STD.to_string())];
        let payload: ReplayPayload = self.request("get_replay", &params, RatelimitWeight::Heavy)?;
        decode_payload(payload)
    }

    /// Beatmap id for an md5 hash, `0` when the service knows no such map
    pub fn beatmap_id(&self, beatmap_hash: &str) -> Result<u32> {
        if let Some(id) = lock(&self.beatmap_ids).get(beatmap_hash) {
            return Ok(*id);
        }
        let params = [("h", beatmap_hash.to_string())];
        let id = match self.request::<Vec<BeatmapRecord>>("get_beatmaps", &params, RatelimitWeight::Light) {
            Ok(records) => records.first().map(|r| r.beatmap_id).unwrap_or(0),
            Err(Error::NoInfoAvailable(_)) => 0,
            Err(e) => return Err(e),
        };
        lock(&self.beatmap_ids).insert(beatmap_hash.to_string(), id);
        Ok(id)
    }

    /// User id for a username, `0` when no such user exists
    pub fn user_id(&self, username: &str) -> Result<u32> {
        if let Some(id) = lock(&self.user_ids).get(username) {
            return Ok(*id);
        }
        let id = self.user(username, "string")?.map(|u| u.user_id).unwrap_or(0);
        lock(&self.user_ids).insert(username.to_string(), id);
        Ok(id)
    }

    /// Username for a user id, empty when no such user exists
    pub fn username(&self, user_id: u32) -> Result<String> {
        if let Some(name) = lock(&self.usernames).get(&user_id) {
            return Ok(name.clone());
        }
        let name = self
            .user(&user_id.to_string(), "id")?
            .map(|u| u.username)
            .unwrap_or_default();
        lock(&self.usernames).insert(user_id, name.clone());
        Ok(name)
    }

    fn user(&self, user: &str, kind: &str) -> Result<Option<UserRecord>> {
        let params = [
            ("u", user.to_string()),
            ("type", kind.to_string()),
            ("m", MODE_STD.to_string()),
        ];
        match self.request::<Vec<UserRecord>>("get_user", &params, RatelimitWeight::Light) {
            Ok(records) => Ok(records.into_iter().next()),
            Err(Error::NoInfoAvailable(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn decode_payload(payload: ReplayPayload) -> Result<Vec<u8>> {
    if let Some(encoding) = payload.encoding.as_deref() {
        if encoding != "base64" {
            return Err(Error::MalformedResponse(format!(
                "unsupported replay encoding '{}'",
                encoding
            )));
        }
    }
    let bytes = STANDARD
        .decode(payload.content.trim())
        .map_err(|e| Error::MalformedResponse(format!("invalid base64 replay content: {}", e)))?;
    if bytes.is_empty() {
        return Err(Error::ReplayUnavailable("replay content was empty".to_string()));
    }
    Ok(bytes)
}
