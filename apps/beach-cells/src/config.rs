use std::time::Duration;

use url::Url;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
pub const SOCKET_PATH: &str = "/ws";

/// Client configuration. The binary fills it from CLI flags and
/// `BEACH_CELLS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Page or server URL the socket address is derived from.
    pub server: Url,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub cell_width: u16,
    pub cell_height: u16,
    pub overscan_rows: u16,
    pub frame_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid server url {input:?}: {reason}")]
    InvalidServer { input: String, reason: String },
    #[error("unsupported server scheme {0:?} (expected http, https, ws or wss)")]
    UnsupportedScheme(String),
}

impl ClientConfig {
    pub fn new(server: Url) -> Self {
        Self {
            server,
            max_retries: 15,
            retry_delay: Duration::from_millis(300),
            cell_width: 4,
            cell_height: 1,
            overscan_rows: 0,
            frame_interval: Duration::from_millis(16),
        }
    }

    pub fn with_server(server: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_server(server)?))
    }

    /// `http → ws`, `https → wss`, `ws`/`wss` kept; the path is always `/ws`.
    pub fn socket_url(&self) -> Result<Url, ConfigError> {
        let scheme = match self.server.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_owned())),
        };
        let mut url = self.server.clone();
        url.set_scheme(scheme)
            .map_err(|()| ConfigError::UnsupportedScheme(self.server.scheme().to_owned()))?;
        url.set_path(SOCKET_PATH);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}

/// Accepts full URLs and bare `host:port`, normalizing `localhost` to IPv4.
pub fn parse_server(input: &str) -> Result<Url, ConfigError> {
    let trimmed = input.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("http://{trimmed}")
    };
    let mut url = Url::parse(&candidate).map_err(|err| ConfigError::InvalidServer {
        input: input.to_owned(),
        reason: err.to_string(),
    })?;
    if url.host_str() == Some("localhost") {
        let _ = url.set_host(Some("127.0.0.1"));
    }
    Ok(url)
}
