//! Client configuration types.
//!
//! [`ClientConfig`] is the single source of truth for every runtime setting
//! of a device connection.  It can be built in code, read from a TOML file
//! (see `infrastructure::storage::config`), or assembled from CLI arguments
//! by the demo binary.
//!
//! # Example TOML
//!
//! ```toml
//! token = "YOUR_TOKEN"
//! server = "dashboard.local"
//! port = 8000
//! secure = false
//! reconnect_delay_ms = 5000
//!
//! [capabilities]
//! properties = true
//! notifications = false
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Fixed pause between a lost connection and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Optional protocol operations enabled for this client.
///
/// Property access and server-relayed notifications are off unless the
/// dashboard account supports them; calling a disabled operation is refused
/// locally and nothing is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Enables `get_property` / `set_property`.
    #[serde(default)]
    pub properties: bool,
    /// Enables `send_sms` / `send_email`.
    #[serde(default)]
    pub notifications: bool,
}

impl Capabilities {
    /// Every optional operation enabled.
    pub fn all() -> Self {
        Self {
            properties: true,
            notifications: true,
        }
    }
}

/// All runtime configuration for one dashboard connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Device auth token, sent as the `token` query parameter.
    pub token: String,

    /// Dashboard host name or IP address.
    #[serde(default = "default_server")]
    pub server: String,

    /// Dashboard port.  `None` uses the scheme's default port.
    #[serde(default = "default_port")]
    pub port: Option<u16>,

    /// Use `wss://` instead of `ws://`.
    #[serde(default)]
    pub secure: bool,

    /// WebSocket endpoint path on the dashboard server.
    #[serde(default = "default_path")]
    pub path: String,

    /// Pause before each reconnect attempt, in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// How long `read` / `get_property` wait for an answer, in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// `tracing` filter used by the binary when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub capabilities: Capabilities,
}

fn default_server() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> Option<u16> {
    Some(8000)
}
fn default_path() -> String {
    "/ws/".to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY.as_millis() as u64
}
fn default_read_timeout_ms() -> u64 {
    5_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl ClientConfig {
    /// Creates a configuration for `token` with every other field defaulted.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            server: default_server(),
            port: default_port(),
            secure: false,
            path: default_path(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            log_level: default_log_level(),
            capabilities: Capabilities::default(),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Builds the full connection URI including the token query parameter.
    ///
    /// # Errors
    ///
    /// Returns [`url::ParseError`] if `server`/`port` do not form a valid
    /// host.
    pub fn uri(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.endpoint())?;
        url.query_pairs_mut().append_pair("token", &self.token);
        Ok(url)
    }

    /// The connection URI without the token, safe to write to logs.
    pub fn endpoint(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        match self.port {
            Some(port) => format!("{scheme}://{}:{port}{path}", self.server),
            None => format!("{scheme}://{}{path}", self.server),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uri_matches_dashboard_layout() {
        // Arrange
        let cfg = ClientConfig::new("abc");

        // Act
        let uri = cfg.uri().unwrap();

        // Assert
        assert_eq!(uri.as_str(), "ws://127.0.0.1:8000/ws/?token=abc");
    }

    #[test]
    fn test_uri_encodes_token() {
        let cfg = ClientConfig::new("a b&c");
        assert_eq!(
            cfg.uri().unwrap().as_str(),
            "ws://127.0.0.1:8000/ws/?token=a+b%26c"
        );
    }

    #[test]
    fn test_secure_uri_without_port() {
        let cfg = ClientConfig {
            server: "dash.example.com".to_string(),
            port: None,
            secure: true,
            ..ClientConfig::new("t")
        };
        assert_eq!(
            cfg.uri().unwrap().as_str(),
            "wss://dash.example.com/ws/?token=t"
        );
    }

    #[test]
    fn test_endpoint_never_contains_token() {
        let cfg = ClientConfig::new("secret-token");
        assert!(!cfg.endpoint().contains("secret-token"));
    }

    #[test]
    fn test_default_reconnect_delay_is_five_seconds() {
        let cfg = ClientConfig::new("t");
        assert_eq!(cfg.reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_capabilities_default_to_disabled() {
        let cfg = ClientConfig::new("t");
        assert!(!cfg.capabilities.properties);
        assert!(!cfg.capabilities.notifications);
    }

    #[test]
    fn test_minimal_toml_fills_defaults() {
        let cfg: ClientConfig = toml::from_str(r#"token = "abc""#).unwrap();
        assert_eq!(cfg, ClientConfig::new("abc"));
    }
}
