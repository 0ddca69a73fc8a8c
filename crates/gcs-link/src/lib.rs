pub mod doctor;
pub mod http;
pub mod oplog;
pub mod remote_id;
pub mod session;
pub mod station;

use reqwest::Url;

pub use http::{CommandClient, CommandError};
pub use oplog::{OperatorLog, OperatorLogEntry};
pub use remote_id::{RemoteIdBroadcaster, ReportSink};
pub use session::{ConnectionState, Connector, SessionConfig, SessionEvent, TelemetrySession, TransportError, WsConnector};
pub use station::{GroundStation, StationConfig, StationError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("host is empty")]
    Empty,
    #[error("invalid host `{raw}`: {reason}")]
    Invalid { raw: String, reason: String },
}

/// Base address of the vehicle service, e.g. `http://drone.local:8000`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
}

impl Endpoint {
    /// Accepts `host[:port]` or a full `http(s)://` URL; anything after the
    /// authority is dropped.
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(EndpointError::Empty);
        }
        let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else {
            format!("http://{}", raw)
        };
        let invalid = |reason: String| EndpointError::Invalid { raw: raw.to_string(), reason };

        let mut base = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
        if base.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(invalid("missing host".into()));
        }
        base.set_path("");
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self { base })
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("{}/{}", self, path.trim_start_matches('/'))
    }

    /// Streaming channel: same authority, `ws`/`wss` scheme, `/ws` path.
    pub fn stream_url(&self) -> Url {
        let mut url = self.base.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // http->ws and https->wss are both special-scheme swaps, which `Url` permits
        let _ = url.set_scheme(scheme);
        url.set_path("/ws");
        url
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.base.as_str().trim_end_matches('/'))
    }
}

impl std::str::FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}
