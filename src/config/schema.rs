//! Agent configuration schema.
//!
//! Mirrors the `lb-agent.conf` JSON document kept in the agent's repo
//! directory. Paths are stored as written; [`crate::config::loader`]
//! resolves them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// File name of the agent's own config inside the repo directory.
pub const AGENT_CONFIG_FILE: &str = "lb-agent.conf";

/// File name of the HAProxy config inside the repo directory.
pub const HAPROXY_CONFIG_FILE: &str = "zato.config";

/// Root configuration of the agent process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// HAProxy executable, looked up in `PATH` unless absolute.
    pub haproxy_command: String,

    /// Address the RPC endpoint binds to.
    pub host: String,
    pub port: u16,

    /// TLS private key (PEM).
    pub keyfile: PathBuf,
    /// TLS certificate chain (PEM).
    pub certfile: PathBuf,
    /// CA bundle client certificates must chain to (PEM).
    pub ca_certs: PathBuf,

    /// Scratch directory for candidate configs.
    pub work_dir: PathBuf,

    /// Client certificate subject fields that must match, e.g. `{"CN": "zato-web-admin"}`.
    #[serde(default)]
    pub verify_fields: BTreeMap<String, String>,

    /// File holding a log filter directive.
    #[serde(default)]
    pub log_config: Option<PathBuf>,

    /// HAProxy pid file.
    pub pid_file: PathBuf,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Prometheus exporter address; no exporter when unset.
    #[serde(default)]
    pub metrics_address: Option<String>,

    /// Directory the config was loaded from.
    #[serde(skip)]
    pub repo_dir: PathBuf,
}

impl AgentConfig {
    pub fn haproxy_config_path(&self) -> PathBuf {
        self.repo_dir.join(HAPROXY_CONFIG_FILE)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }
}

/// Bounds on external interactions, in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default wait for a stats socket response.
    pub stats_ms: u64,

    /// HAProxy start/restart bound.
    pub start_ms: u64,

    /// HAProxy check mode bound.
    pub validate_ms: u64,

    /// Monitor URI request.
    pub monitor_ms: u64,

    /// Per RPC request.
    pub request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stats_ms: 1_000,
            start_ms: 5_000,
            validate_ms: 300,
            monitor_ms: 5_000,
            request_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn stats(&self) -> Duration {
        Duration::from_millis(self.stats_ms)
    }

    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }

    pub fn validate(&self) -> Duration {
        Duration::from_millis(self.validate_ms)
    }

    pub fn monitor(&self) -> Duration {
        Duration::from_millis(self.monitor_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

/// The subset of [`AgentConfig`] reported by `get_work_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkConfig {
    pub work_dir: PathBuf,
    pub haproxy_command: String,
    pub keyfile: PathBuf,
    pub certfile: PathBuf,
    pub ca_certs: PathBuf,
    pub verify_fields: BTreeMap<String, String>,
}

impl From<&AgentConfig> for WorkConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            haproxy_command: config.haproxy_command.clone(),
            keyfile: config.keyfile.clone(),
            certfile: config.certfile.clone(),
            ca_certs: config.ca_certs.clone(),
            verify_fields: config.verify_fields.clone(),
        }
    }
}
