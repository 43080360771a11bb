//! HTTP transport behind the fetch client.

use crate::error::Result;

/// Status code and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn ok<S: Into<String>>(body: S) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// Issues GET requests against the scoring service.
///
/// Connection failures and timeouts must surface as `Error::Transport` so
/// the client can retry them. Non-2xx statuses are returned, not raised.
pub trait Transport: Send + Sync {
    fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<TransportResponse>;
}

#[cfg(feature = "http")]
pub use self::ureq_transport::UreqTransport;

#[cfg(feature = "http")]
mod ureq_transport {
    use std::time::Duration;

    use tracing::trace;

    use super::{Transport, TransportResponse};
    use crate::error::{Error, Result};

    /// Blocking transport on a shared `ureq` agent.
    pub struct UreqTransport {
        agent: ureq::Agent,
        base_url: String,
        user_agent: String,
    }

    impl UreqTransport {
        pub fn new<S: Into<String>>(base_url: S, timeout: Duration) -> Self {
            let config = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .http_status_as_error(false)
                .build();
            let agent: ureq::Agent = config.into();
            let user_agent = format!(
                "replayscope/{} ({})",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS
            );

            Self {
                agent,
                base_url: base_url.into(),
                user_agent,
            }
        }
    }

    impl Transport for UreqTransport {
        fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<TransportResponse> {
            let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);
            trace!("GET {}", url);

            let mut request = self.agent.get(&url).header("User-Agent", &self.user_agent);
            for (key, value) in query {
                request = request.query(*key, value);
            }

            let mut response = request
                .call()
                .map_err(|e| Error::Transport(format!("GET {} failed: {}", endpoint, e)))?;
            let status = response.status().as_u16();
            let body = response
                .body_mut()
                .read_to_string()
                .map_err(|e| Error::Transport(format!("reading {} body failed: {}", endpoint, e)))?;

            Ok(TransportResponse { status, body })
        }
    }
}
