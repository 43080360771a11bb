//! Remote fetch client for the scoring service.
//!
//! - [`ApiClient`]: typed calls, error mapping, retry with backoff
//! - [`RateLimiter`]: process-shareable budget for heavy calls
//! - [`Transport`]: the HTTP seam, with a `ureq` implementation behind the
//!   `http` feature

mod client;
mod models;
pub mod ratelimit;
mod transport;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

pub use client::ApiClient;
pub use models::{DATE_FORMAT, HitCounts, ScoreInfo};
pub use ratelimit::{Clock, RateLimitState, RateLimiter, SystemClock};
#[cfg(feature = "http")]
pub use transport::UreqTransport;
pub use transport::{Transport, TransportResponse};

#[cfg(test)]
pub(crate) use client::testing;

/// How much of the shared rate-limit budget a call consumes.
///
/// Only `Heavy` calls are counted against the budget.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum RatelimitWeight {
    #[default]
    None,
    Light,
    Heavy,
}
