//! The agent's operations.
//!
//! # Responsibilities
//! - Read accessors over the published config snapshot and agent settings
//! - Server state queries through the stats socket
//! - Validate → save → restart cycle for every config change
//!
//! # Design Decisions
//! - Readers load the current `Arc<Config>` without blocking
//! - One async mutex serializes the whole read → mutate → validate → write
//!   → re-read → restart section, so concurrent saves never interleave
//! - A failed validation returns before anything is written
//! - The file on disk is the template for every change; the snapshot is
//!   re-read from it after each save

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use url::Url;

use crate::agent::edit::{self, ServerAction};
use crate::agent::errors::AgentError;
use crate::config::{AgentConfig, WorkConfig};
use crate::haproxy::commands::describe_commands;
use crate::haproxy::stat::{parse_show_stat, parse_version};
use crate::haproxy::supervisor::SupervisorConfig;
use crate::haproxy::{
    CommandCatalog, KnownCommand, ProcessSupervisor, ServerRow, ServerState, StatsSocketClient,
    StatsSocketError, SupervisorState, DESCRIBE_COMMANDS,
};
use crate::lb_config::model::{access_type, MANAGED_BACKEND, MONITORED_FRONTEND};
use crate::lb_config::{parse, serialize, Config};
use crate::observability::metrics;

/// Returned by operations that succeed without a payload.
pub const ZATO_OK: &str = "ZATO_OK";

/// state → access type → server names
pub type ServersState = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Live state of one server joined with its config entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerData {
    pub access_type: String,
    pub state: ServerState,
    /// `address:port` from the config; `None` if the server is not in it.
    pub address: Option<String>,
}

/// The load balancer agent.
pub struct LoadBalancerAgent {
    settings: AgentConfig,
    config_path: PathBuf,
    supervisor: ProcessSupervisor,
    snapshot: ArcSwap<Config>,
    write_lock: Mutex<()>,
    catalog: CommandCatalog,
    started_at: DateTime<Utc>,
    http: reqwest::Client,
}

impl LoadBalancerAgent {
    /// Read and parse the HAProxy config. Does not start HAProxy.
    pub async fn new(settings: AgentConfig) -> Result<Self, AgentError> {
        let config_path = settings.haproxy_config_path();
        let text = read_text(&config_path).await?;
        let config = parse(&text)?;

        let supervisor = ProcessSupervisor::new(SupervisorConfig {
            haproxy_command: settings.haproxy_command.clone(),
            config_path: config_path.clone(),
            pid_path: settings.pid_file.clone(),
            work_dir: settings.work_dir.clone(),
            start_timeout: settings.timeouts.start(),
            validate_timeout: settings.timeouts.validate(),
        });

        let http = reqwest::Client::builder()
            .timeout(settings.timeouts.monitor())
            .build()
            .map_err(|e| AgentError::MonitorUnavailable(format!("could not build HTTP client: {}", e)))?;

        tracing::info!(
            config = %config_path.display(),
            backends = config.backend.len(),
            frontends = config.frontend.len(),
            "HAProxy config loaded"
        );

        Ok(Self {
            settings,
            config_path,
            supervisor,
            snapshot: ArcSwap::from_pointee(config),
            write_lock: Mutex::new(()),
            catalog: CommandCatalog::builtin(),
            started_at: Utc::now(),
            http,
        })
    }

    pub fn settings(&self) -> &AgentConfig {
        &self.settings
    }

    pub fn supervisor_state(&self) -> SupervisorState {
        self.supervisor.state()
    }

    /// Start HAProxy against the current config file.
    pub async fn start_haproxy(&self) -> Result<(), AgentError> {
        self.supervisor.start().await?;
        Ok(())
    }

    pub fn ping(&self) -> &'static str {
        ZATO_OK
    }

    /// Fetch the monitored frontend's `monitor-uri`.
    ///
    /// Anything other than HTTP 200 is an error.
    pub async fn is_haproxy_alive(&self) -> Result<&'static str, AgentError> {
        let url = self.monitor_url()?;
        let response = self.http.get(url.clone()).send().await.map_err(|e| {
            tracing::error!(url = %url, error = %e, "Could not open monitor URL");
            AgentError::MonitorUnavailable(format!("Could not open URL [{}], e:[{}]", url, e))
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            Ok(ZATO_OK)
        } else {
            tracing::error!(url = %url, code = status.as_u16(), "Monitor URL returned an error");
            Err(AgentError::MonitorUnavailable(format!(
                "Could not open URL [{}], HTTP code:[{}]",
                url,
                status.as_u16()
            )))
        }
    }

    fn monitor_url(&self) -> Result<Url, AgentError> {
        let config = self.snapshot.load();
        let frontend = config.frontend.get(MONITORED_FRONTEND).ok_or_else(|| {
            AgentError::MonitorUnavailable(format!("no frontend [{}] in the config", MONITORED_FRONTEND))
        })?;
        let bind = frontend.bind.as_ref().ok_or_else(|| {
            AgentError::MonitorUnavailable(format!("frontend [{}] has no bind address", MONITORED_FRONTEND))
        })?;
        let path = frontend.monitor_uri.as_deref().ok_or_else(|| {
            AgentError::MonitorUnavailable(format!("frontend [{}] has no monitor-uri", MONITORED_FRONTEND))
        })?;

        let host = match bind.address.as_str() {
            "" | "*" | "0.0.0.0" => "127.0.0.1",
            "::" | "[::]" => "[::1]",
            other => other,
        };
        let base = format!("http://{}:{}", host, bind.port);
        Url::parse(&base)
            .and_then(|url| url.join(path))
            .map_err(|e| AgentError::MonitorUnavailable(format!("invalid monitor URL [{}{}]: {}", base, path, e)))
    }

    /// The parts of the HAProxy config the agent understands.
    pub fn get_config(&self) -> Arc<Config> {
        self.snapshot.load_full()
    }

    pub async fn get_config_source_code(&self) -> Result<String, AgentError> {
        read_text(&self.config_path).await
    }

    /// When the agent (not HAProxy) was started, RFC 3339 UTC.
    pub fn get_uptime_info(&self) -> String {
        self.started_at.to_rfc3339_opts(SecondsFormat::Micros, false)
    }

    pub fn get_work_config(&self) -> WorkConfig {
        WorkConfig::from(&self.settings)
    }

    pub fn get_known_commands(&self) -> Vec<KnownCommand> {
        self.catalog.all().into_iter().cloned().collect()
    }

    fn stats_client(&self) -> Result<StatsSocketClient, AgentError> {
        let config = self.snapshot.load();
        let path = config.stats_socket_path().ok_or(StatsSocketError::NotConfigured)?;
        Ok(StatsSocketClient::new(path))
    }

    async fn show_stat(&self) -> Result<Vec<ServerRow>, AgentError> {
        let stat = self
            .stats_client()?
            .execute("show stat", "", self.settings.timeouts.stats())
            .await?;
        Ok(parse_show_stat(&stat)?)
    }

    /// Servers bucketed by state and access type, as seen by HAProxy.
    ///
    /// UP, DOWN and MAINT are always present, each with an `http_plain`
    /// list even when empty. Any other access type shows up only under the
    /// states it has servers in. States other than UP, DOWN and MAINT are
    /// logged and left out.
    pub async fn get_servers_state(&self) -> Result<ServersState, AgentError> {
        let mut result = empty_servers_state();

        for row in self.show_stat().await? {
            if !row.state.is_known() {
                tracing::warn!(
                    state = %row.state.as_str(),
                    server = %row.server_name,
                    recognized = ?ServerState::KNOWN.iter().map(ServerState::as_str).collect::<Vec<_>>(),
                    "Encountered unknown server state"
                );
                continue;
            }
            result
                .entry(row.state.as_str().to_string())
                .or_default()
                .entry(row.access_type)
                .or_default()
                .push(row.server_name);
        }

        Ok(result)
    }

    /// Live state of every server (or just `name`) with its configured address.
    ///
    /// Keyed by bare server name. Only `bck_http_plain` is managed, so names
    /// are unique in practice; should two backends share a name, the row
    /// listed last by `show stat` wins.
    pub async fn get_server_data_dict(
        &self,
        name: Option<&str>,
    ) -> Result<BTreeMap<String, ServerData>, AgentError> {
        let rows = self.show_stat().await?;
        let config = self.snapshot.load();

        let servers = rows
            .into_iter()
            .filter(|row| name.map_or(true, |n| n == row.server_name))
            .map(|row| {
                let address = config
                    .backend
                    .get(&row.proxy)
                    .and_then(|servers| servers.get(&row.server_name))
                    .map(|spec| spec.endpoint());
                (
                    row.server_name,
                    ServerData {
                        access_type: row.access_type,
                        state: row.state,
                        address,
                    },
                )
            })
            .collect();
        Ok(servers)
    }

    /// Validate structured config, and save + restart if `save` is set.
    pub async fn validate_save(&self, config: &Config, save: bool) -> Result<bool, AgentError> {
        let _guard = self.write_lock.lock().await;
        let template = read_text(&self.config_path).await?;
        let text = serialize(config, &template)?;
        self.commit(&text, save).await
    }

    /// Validate config text, and save + restart if `save` is set.
    pub async fn validate_save_source_code(&self, source: &str, save: bool) -> Result<bool, AgentError> {
        let _guard = self.write_lock.lock().await;
        self.commit(source, save).await
    }

    pub async fn rename_server(&self, old_name: &str, new_name: &str) -> Result<bool, AgentError> {
        if old_name == new_name {
            tracing::warn!(old_name, new_name, "Skipped renaming, old and new names are the same");
            return Ok(true);
        }

        let _guard = self.write_lock.lock().await;
        let template = read_text(&self.config_path).await?;
        let text = edit::rename_server(&template, MANAGED_BACKEND, old_name, new_name)?;
        self.commit(&text, true).await?;

        tracing::info!(old_name, new_name, "Server renamed");
        Ok(true)
    }

    pub async fn add_remove_server(&self, action: &str, server_name: &str) -> Result<bool, AgentError> {
        let action: ServerAction = action.parse()?;

        let _guard = self.write_lock.lock().await;
        let template = read_text(&self.config_path).await?;
        let mut config = parse(&template)?;
        edit::apply_server_action(&mut config, MANAGED_BACKEND, action, server_name)?;
        let text = serialize(&config, &template)?;
        self.commit(&text, true).await?;

        tracing::info!(action = ?action, server = server_name, "Managed servers updated");
        Ok(true)
    }

    /// Run a catalogued stats socket command by index.
    pub async fn execute_command(
        &self,
        index: u32,
        timeout: Option<Duration>,
        extra: &str,
    ) -> Result<String, AgentError> {
        let command = self
            .catalog
            .resolve(index)
            .ok_or(AgentError::UnknownCommand(index))?;
        let timeout = timeout.unwrap_or_else(|| self.settings.timeouts.stats());

        let response = self
            .stats_client()?
            .execute(command.command, extra, timeout)
            .await?;

        if command.command == DESCRIBE_COMMANDS {
            Ok(describe_commands(&response))
        } else {
            Ok(response)
        }
    }

    /// `(major, minor, patch)` of the running HAProxy.
    pub async fn haproxy_version_info(&self) -> Result<(String, String, String), AgentError> {
        let info = self
            .stats_client()?
            .execute("show info", "", self.settings.timeouts.stats())
            .await?;
        Ok(parse_version(&info)?)
    }

    /// Validate `text`; if `save`, write it, publish it and restart HAProxy.
    ///
    /// Callers hold the write lock.
    async fn commit(&self, text: &str, save: bool) -> Result<bool, AgentError> {
        let validated = self.supervisor.validate(text).await;
        metrics::record_validation(validated.is_ok());
        validated?;

        if !save {
            return Ok(true);
        }

        // Model structure is checked before anything reaches the disk.
        parse(text)?;
        write_atomically(&self.config_path, text).await?;

        let saved = read_text(&self.config_path).await?;
        self.snapshot.store(Arc::new(parse(&saved)?));
        tracing::info!(config = %self.config_path.display(), "Config saved");

        let restarted = self.supervisor.restart().await;
        metrics::record_restart(restarted.is_ok());
        restarted?;

        Ok(true)
    }
}

/// The result skeleton: every known state with an empty managed access type.
fn empty_servers_state() -> ServersState {
    ServerState::KNOWN
        .iter()
        .map(|state| {
            let mut by_access_type = BTreeMap::new();
            by_access_type.insert(access_type(MANAGED_BACKEND).to_string(), Vec::new());
            (state.as_str().to_string(), by_access_type)
        })
        .collect()
}

async fn read_text(path: &Path) -> Result<String, AgentError> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Could not read HAProxy config");
        AgentError::io(format!("could not read [{}]", path.display()), e)
    })
}

/// Replace `path` with `text` via a temp file in the same directory.
async fn write_atomically(path: &Path, text: &str) -> Result<(), AgentError> {
    let path = path.to_path_buf();
    let text = text.to_string();
    let context = format!("could not write [{}]", path.display());

    let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(text.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)
    .and_then(|inner| inner);

    result.map_err(|e| {
        tracing::error!(error = %e, "{}", context);
        AgentError::io(context, e)
    })
}
