//! SQLite-backed replay cache.
//!
//! One table holds compressed frames plus the identity columns they can be
//! looked up by. Rows are only ever inserted or read. WAL journaling lets any
//! number of processes read while one appends.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::codec;
use crate::error::{Error, Result};
use crate::events::ReplayEvents;
use crate::mods::ModCombination;

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

const REPLAYS_COLUMNS: [&str; 6] = ["id", "map_id", "user_id", "mods", "replay_id", "replay_data"];

/// Identity a cached replay can be found by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    MapUserMods {
        map_id: u32,
        user_id: u32,
        mods: ModCombination,
    },
    ReplayId(u64),
}

/// Identity columns stored alongside a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheIdentity {
    pub map_id: Option<u32>,
    pub user_id: Option<u32>,
    pub mods: Option<ModCombination>,
    pub replay_id: Option<u64>,
}

impl CacheIdentity {
    /// Keys this identity can be looked up by, most specific first
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys = Vec::with_capacity(2);
        if let (Some(map_id), Some(user_id), Some(mods)) = (self.map_id, self.user_id, self.mods) {
            keys.push(CacheKey::MapUserMods {
                map_id,
                user_id,
                mods,
            });
        }
        if let Some(replay_id) = self.replay_id {
            keys.push(CacheKey::ReplayId(replay_id));
        }
        keys
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub identity: CacheIdentity,
    pub events: ReplayEvents,
}

type RecordRow = (Option<i64>, Option<i64>, Option<i64>, Option<i64>, Vec<u8>);

/// Blocking handle on a cache database.
///
/// Runs its queries on a private single-threaded runtime, so it must not be
/// used from inside another async runtime.
pub struct CacheStore {
    runtime: Runtime,
    pool: SqlitePool,
    path: PathBuf,
}

impl CacheStore {
    /// Open the cache at `path`, creating it if absent.
    ///
    /// Fails with `Error::CacheConflict` if the file exists but is not a
    /// replay cache.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let newly_created = !path.exists();

        if !newly_created && !looks_like_sqlite(&path)? {
            return Err(conflict(&path, "not an SQLite database"));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = runtime.block_on(
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options),
        )?;

        let store = Self {
            runtime,
            pool,
            path,
        };
        store.init_schema()?;

        if newly_created {
            info!("Initialized new replay cache: {}", store.path.display());
        } else {
            info!("Opened existing replay cache: {}", store.path.display());
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&self) -> Result<()> {
        let pool = &self.pool;
        let path = &self.path;

        self.runtime.block_on(async {
            let tables: Vec<(String,)> = sqlx::query_as(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            )
            .fetch_all(pool)
            .await
            .map_err(|e| conflict(path, &e.to_string()))?;

            if tables.iter().any(|(name,)| name == "replays") {
                let columns: Vec<String> = sqlx::query_scalar(
                    "SELECT name FROM pragma_table_info('replays') ORDER BY cid",
                )
                .fetch_all(pool)
                .await?;
                let names: Vec<&str> = columns.iter().map(String::as_str).collect();
                if names != REPLAYS_COLUMNS {
                    return Err(conflict(
                        path,
                        &format!("unexpected replays columns {:?}", names),
                    ));
                }
            } else if !tables.is_empty() {
                return Err(conflict(path, "database holds foreign tables"));
            }

            sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
            sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS replays (
                    id INTEGER PRIMARY KEY,
                    map_id INTEGER,
                    user_id INTEGER,
                    mods INTEGER,
                    replay_id INTEGER,
                    replay_data BLOB NOT NULL
                )
                "#,
            )
            .execute(pool)
            .await?;
            sqlx::query(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_replays_identity ON replays(map_id, user_id, mods)",
            )
            .execute(pool)
            .await?;
            sqlx::query(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_replays_replay_id ON replays(replay_id)",
            )
            .execute(pool)
            .await?;

            Ok(())
        })
    }

    pub fn lookup(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        let row: Option<RecordRow> = self.runtime.block_on(async {
            match *key {
                CacheKey::MapUserMods {
                    map_id,
                    user_id,
                    mods,
                } => {
                    sqlx::query_as(
                        "SELECT map_id, user_id, mods, replay_id, replay_data FROM replays
                         WHERE map_id = ? AND user_id = ? AND mods = ?",
                    )
                    .bind(map_id as i64)
                    .bind(user_id as i64)
                    .bind(mods.bits() as i64)
                    .fetch_optional(&self.pool)
                    .await
                }
                CacheKey::ReplayId(replay_id) => {
                    sqlx::query_as(
                        "SELECT map_id, user_id, mods, replay_id, replay_data FROM replays
                         WHERE replay_id = ?",
                    )
                    .bind(replay_id as i64)
                    .fetch_optional(&self.pool)
                    .await
                }
            }
        })?;

        let Some((map_id, user_id, mods, replay_id, data)) = row else {
            debug!("Cache miss for {:?}", key);
            return Ok(None);
        };
        debug!("Cache hit for {:?}", key);

        Ok(Some(CacheRecord {
            identity: CacheIdentity {
                map_id: map_id.map(|v| v as u32),
                user_id: user_id.map(|v| v as u32),
                mods: mods.map(|v| ModCombination::from_bits(v as u32)),
                replay_id: replay_id.map(|v| v as u64),
            },
            events: codec::decode(&data)?,
        }))
    }

    /// Insert a record. Returns `false` if one with the same identity already
    /// exists; existing rows are never replaced.
    pub fn store(&self, identity: &CacheIdentity, events: &ReplayEvents) -> Result<bool> {
        if identity.keys().is_empty() {
            return Err(Error::InvalidArgument(
                "a cache record needs (map, user, mods) or a replay id".to_string(),
            ));
        }
        let data = codec::encode(events)?;

        let result = self.runtime.block_on(
            sqlx::query(
                "INSERT OR IGNORE INTO replays (map_id, user_id, mods, replay_id, replay_data)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(identity.map_id.map(|v| v as i64))
            .bind(identity.user_id.map(|v| v as i64))
            .bind(identity.mods.map(|m| m.bits() as i64))
            .bind(identity.replay_id.map(|v| v as i64))
            .bind(data)
            .execute(&self.pool),
        )?;

        let inserted = result.rows_affected() > 0;
        debug!(
            "Cache store for {:?}: {}",
            identity,
            if inserted { "inserted" } else { "already present" }
        );
        Ok(inserted)
    }

    /// Number of cached replays
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .runtime
            .block_on(sqlx::query_scalar("SELECT COUNT(*) FROM replays").fetch_one(&self.pool))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Distinct beatmaps with at least one cached replay
    pub fn map_ids(&self) -> Result<Vec<u32>> {
        let ids: Vec<i64> = self.runtime.block_on(
            sqlx::query_scalar(
                "SELECT DISTINCT map_id FROM replays WHERE map_id IS NOT NULL ORDER BY map_id",
            )
            .fetch_all(&self.pool),
        )?;
        Ok(ids.into_iter().map(|id| id as u32).collect())
    }
}

#[cfg(test)]
impl CacheStore {
    /// Make every later insert fail
    pub(crate) fn reject_writes(&self) {
        self.runtime
            .block_on(
                sqlx::query(
                    "CREATE TRIGGER reject_writes BEFORE INSERT ON replays
                     BEGIN SELECT RAISE(ABORT, 'cache is read-only'); END",
                )
                .execute(&self.pool),
            )
            .unwrap();
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        self.runtime.block_on(self.pool.close());
    }
}

fn conflict(path: &Path, reason: &str) -> Error {
    Error::CacheConflict {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Empty files count as SQLite; the engine initializes them in place.
fn looks_like_sqlite(path: &Path) -> Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    let mut header = Vec::with_capacity(SQLITE_HEADER.len());
    File::open(path)?
        .take(SQLITE_HEADER.len() as u64)
        .read_to_end(&mut header)?;
    Ok(header.is_empty() || header.as_slice() == SQLITE_HEADER)
}
