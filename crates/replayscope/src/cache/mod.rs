//! Persistent replay cache.
//!
//! - [`codec`]: lossy frame compression
//! - [`CacheStore`]: the SQLite table the compressed frames live in

pub mod codec;
mod store;

pub use store::{CacheIdentity, CacheKey, CacheRecord, CacheStore};
