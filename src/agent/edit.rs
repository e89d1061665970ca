//! Pure edits applied to the config before it is validated and saved.

use std::str::FromStr;

use crate::agent::errors::AgentError;
use crate::lb_config::model::{Config, ServerSpec, SERVER_ID_DELIMITER};
use crate::lb_config::tags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerAction {
    Add,
    Remove,
}

impl FromStr for ServerAction {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(ServerAction::Add),
            "remove" => Ok(ServerAction::Remove),
            other => Err(AgentError::UnrecognizedAction(other.to_string())),
        }
    }
}

/// Add or remove `server` in `backend`.
///
/// New servers get placeholder address, port and health-check values.
pub fn apply_server_action(
    config: &mut Config,
    backend: &str,
    action: ServerAction,
    server: &str,
) -> Result<(), AgentError> {
    let servers = config.backend.entry(backend.to_string()).or_default();
    match action {
        ServerAction::Add => {
            if servers.contains_key(server) {
                return Err(AgentError::Conflict(server.to_string()));
            }
            servers.insert(server.to_string(), ServerSpec::placeholder());
        }
        ServerAction::Remove => {
            if servers.remove(server).is_none() {
                return Err(AgentError::NotFound(server.to_string()));
            }
        }
    }
    Ok(())
}

/// Rename a server in `backend` by rewriting the lines tagged with its
/// marker.
///
/// Only lines whose sentinel comment names `old` are touched; on those every
/// `--<old>` becomes `--<new>`, which covers both the HAProxy server id and
/// the marker itself.
pub fn rename_server(text: &str, backend: &str, old: &str, new: &str) -> Result<String, AgentError> {
    let old_marker = tags::server_comment(backend, old);
    let new_marker = tags::server_comment(backend, new);

    let is_tagged = |line: &str, marker: &str| line.trim_end().ends_with(marker);

    if !text.lines().any(|line| is_tagged(line, &old_marker)) {
        return Err(AgentError::NotFound(old.to_string()));
    }
    if text.lines().any(|line| is_tagged(line, &new_marker)) {
        return Err(AgentError::Conflict(new.to_string()));
    }

    let from = format!("{}{}", SERVER_ID_DELIMITER, old);
    let to = format!("{}{}", SERVER_ID_DELIMITER, new);

    let renamed = text
        .split_inclusive('\n')
        .map(|line| {
            if is_tagged(line, &old_marker) {
                line.replace(&from, &to)
            } else {
                line.to_string()
            }
        })
        .collect();
    Ok(renamed)
}
