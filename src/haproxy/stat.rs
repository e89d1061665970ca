//! Parsing of `show stat` and `show info` responses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lb_config::model::SERVER_ID_DELIMITER;

/// Column holding a row's status in `show stat` CSV output.
pub const STATUS_COLUMN: usize = 17;

/// Proxy names of managed backends start with this.
pub const BACKEND_ROW_PREFIX: &str = "bck";

/// `svname` of a backend's aggregate row.
pub const BACKEND_AGGREGATE_ROW: &str = "BACKEND";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatParseError {
    #[error("show stat line {line}: expected more than 17 columns, got {found}")]
    TooFewColumns { line: usize, found: usize },

    #[error("show stat line {line}: server id [{id}] has no `--` delimiter")]
    MissingDelimiter { line: usize, id: String },

    #[error("show info has no `Version:` line")]
    MissingVersion,

    #[error("unexpected HAProxy version format [{0}]")]
    MalformedVersion(String),
}

/// Server state as reported by HAProxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServerState {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN")]
    Down,
    #[serde(rename = "MAINT")]
    Maint,
    /// Anything else, e.g. transitional `UP 1/3` or `no check`.
    #[serde(untagged)]
    Unrecognized(String),
}

impl ServerState {
    /// States reported in aggregated results.
    pub const KNOWN: [ServerState; 3] = [ServerState::Up, ServerState::Down, ServerState::Maint];

    pub fn parse(value: &str) -> Self {
        match value {
            "UP" => ServerState::Up,
            "DOWN" => ServerState::Down,
            "MAINT" => ServerState::Maint,
            other => ServerState::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ServerState::Up => "UP",
            ServerState::Down => "DOWN",
            ServerState::Maint => "MAINT",
            ServerState::Unrecognized(other) => other,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ServerState::Unrecognized(_))
    }
}

/// One server row of `show stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRow {
    /// Backend (proxy) the server belongs to.
    pub proxy: String,
    pub access_type: String,
    pub server_name: String,
    pub state: ServerState,
}

/// Extract the server rows of managed backends from `show stat` output.
pub fn parse_show_stat(text: &str) -> Result<Vec<ServerRow>, StatParseError> {
    let mut rows = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.split(',').collect();
        let proxy = columns[0];
        let id = columns.get(1).copied().unwrap_or_default();

        if !proxy.starts_with(BACKEND_ROW_PREFIX) || id == BACKEND_AGGREGATE_ROW {
            continue;
        }
        if columns.len() <= STATUS_COLUMN {
            return Err(StatParseError::TooFewColumns { line: idx + 1, found: columns.len() });
        }
        let (access_type, server_name) = id.split_once(SERVER_ID_DELIMITER).ok_or_else(|| {
            StatParseError::MissingDelimiter { line: idx + 1, id: id.to_string() }
        })?;

        rows.push(ServerRow {
            proxy: proxy.to_string(),
            access_type: access_type.to_string(),
            server_name: server_name.to_string(),
            state: ServerState::parse(columns[STATUS_COLUMN]),
        });
    }

    Ok(rows)
}

/// `(major, minor, patch)` from the `Version:` line of `show info`.
///
/// Development builds such as `1.5-dev19` have no patch component; `"0"`
/// is reported for it.
pub fn parse_version(info: &str) -> Result<(String, String, String), StatParseError> {
    let version = info
        .lines()
        .find_map(|line| line.strip_prefix("Version:"))
        .map(str::trim)
        .ok_or(StatParseError::MissingVersion)?;

    let mut parts = version.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(major), Some(minor), patch) if !major.is_empty() && !minor.is_empty() => Ok((
            major.to_string(),
            minor.to_string(),
            patch.unwrap_or("0").to_string(),
        )),
        _ => Err(StatParseError::MalformedVersion(version.to_string())),
    }
}
