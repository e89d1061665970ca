//! Structured view of the HAProxy configuration.
//!
//! Only the parts of the file carrying sentinel tags (plus `default_backend`
//! inside frontends) are modelled. Everything else stays in the text.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lb_config::error::ModelError;

/// Backend whose server block the agent manages.
pub const MANAGED_BACKEND: &str = "bck_http_plain";

/// Frontend whose `monitor-uri` answers liveness checks.
pub const MONITORED_FRONTEND: &str = "front_http_plain";

/// Placeholder values for a freshly added server.
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 17010;
pub const DEFAULT_SERVER_EXTRA: &str = "check inter 2s rise 2 fall 2";

/// Separator between access type and server name in HAProxy server ids.
pub const SERVER_ID_DELIMITER: &str = "--";

/// Servers of one backend, keyed by server name.
pub type Backend = BTreeMap<String, ServerSpec>;

/// The HAProxy configuration as understood by the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "global_")]
    pub global: GlobalSection,

    /// `defaults` directives keyed by directive name (e.g. `timeout connect`).
    pub defaults: BTreeMap<String, String>,

    pub backend: BTreeMap<String, Backend>,

    pub frontend: BTreeMap<String, Frontend>,
}

impl Config {
    /// Path of HAProxy's control socket, if configured.
    pub fn stats_socket_path(&self) -> Option<&str> {
        self.global
            .stats_socket
            .as_deref()
            .and_then(|s| s.split_whitespace().next())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSection {
    pub log: Option<LogTarget>,

    /// Everything after `stats socket`; the first token is the socket path.
    pub stats_socket: Option<String>,

    /// Other tagged global directives.
    pub directives: BTreeMap<String, String>,
}

/// `log <address> <facility> [<level>]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogTarget {
    pub address: String,
    pub facility: String,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Frontend {
    pub bind: Option<BindAddress>,
    pub maxconn: Option<u32>,
    pub monitor_uri: Option<String>,
    pub log_http_requests: Option<bool>,

    /// Read from the untagged `default_backend` line; never rewritten.
    pub default_backend: Option<String>,

    pub directives: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindAddress {
    pub address: String,
    pub port: u16,
    /// Bind options following the address, e.g. `ssl crt ...`.
    #[serde(default)]
    pub extra: String,
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// One `server` line of a managed backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    pub address: String,
    pub port: u16,
    /// Free-form suffix, typically health-check parameters.
    #[serde(default)]
    pub extra: String,
}

impl ServerSpec {
    /// Spec used when a server is added without further details.
    pub fn placeholder() -> Self {
        Self {
            address: DEFAULT_SERVER_ADDRESS.to_string(),
            port: DEFAULT_SERVER_PORT,
            extra: DEFAULT_SERVER_EXTRA.to_string(),
        }
    }

    /// `address:port` as written in the config.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Access type served by a backend: its name without the `bck_` prefix.
pub fn access_type(backend: &str) -> &str {
    backend.strip_prefix("bck_").unwrap_or(backend)
}

/// Split `host:port`, accepting bracketed IPv6 hosts.
pub(crate) fn split_endpoint(value: &str, line: usize) -> Result<(String, u16), ModelError> {
    let (host, port) = value.rsplit_once(':').ok_or_else(|| ModelError::InvalidDirective {
        line,
        reason: format!("expected address:port, got [{}]", value),
    })?;
    let port = port.parse::<u16>().map_err(|e| ModelError::InvalidDirective {
        line,
        reason: format!("invalid port [{}]: {}", port, e),
    })?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_type_strips_backend_prefix() {
        assert_eq!(access_type("bck_http_plain"), "http_plain");
        assert_eq!(access_type("custom"), "custom");
    }

    #[test]
    fn stats_socket_path_ignores_options() {
        let mut config = Config::default();
        config.global.stats_socket = Some("/tmp/haproxy.sock level admin".into());
        assert_eq!(config.stats_socket_path(), Some("/tmp/haproxy.sock"));
    }

    #[test]
    fn split_endpoint_handles_ipv6() {
        assert_eq!(split_endpoint("[::1]:8080", 1).unwrap(), ("[::1]".to_string(), 8080));
        assert!(split_endpoint("127.0.0.1", 1).is_err());
        assert!(split_endpoint("127.0.0.1:123456", 1).is_err());
    }

    #[test]
    fn global_section_serializes_with_trailing_underscore() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json.get("global_").is_some());
        assert!(json.get("global").is_none());
    }
}
