//! Failure taxonomy of agent operations.

use std::io;

use thiserror::Error;

use crate::haproxy::{StatParseError, StatsSocketError, SupervisorError};
use crate::lb_config::ModelError;

#[derive(Debug, Error)]
pub enum AgentError {
    /// HAProxy's check mode rejected the candidate config.
    #[error(transparent)]
    ConfigValidation(SupervisorError),

    #[error(transparent)]
    ProcessTimeout(SupervisorError),

    /// HAProxy could not be launched or exited non-zero.
    #[error(transparent)]
    ProcessExit(SupervisorError),

    #[error("server [{0}] does not exist")]
    NotFound(String),

    #[error("server [{0}] already exists")]
    Conflict(String),

    #[error(transparent)]
    Transport(#[from] StatsSocketError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("malformed HAProxy response: {0}")]
    MalformedResponse(#[from] StatParseError),

    #[error("unrecognized action [{0}], expected `add` or `remove`")]
    UnrecognizedAction(String),

    #[error("unknown command index [{0}]")]
    UnknownCommand(u32),

    #[error("{0}")]
    MonitorUnavailable(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl AgentError {
    /// Stable class name reported to RPC callers.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::ConfigValidation(_) => "config_validation",
            AgentError::ProcessTimeout(_) => "process_timeout",
            AgentError::ProcessExit(_) => "process_exit",
            AgentError::NotFound(_) => "not_found",
            AgentError::Conflict(_) => "conflict",
            AgentError::Transport(_) => "transport",
            AgentError::Model(_) => "model",
            AgentError::MalformedResponse(_) => "malformed_response",
            AgentError::UnrecognizedAction(_) => "unrecognized_action",
            AgentError::UnknownCommand(_) => "unknown_command",
            AgentError::MonitorUnavailable(_) => "monitor_unavailable",
            AgentError::Io { .. } => "io",
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        AgentError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<SupervisorError> for AgentError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::CheckFailed(_) => AgentError::ConfigValidation(err),
            SupervisorError::Timeout { .. } => AgentError::ProcessTimeout(err),
            SupervisorError::CandidateFile { dir, source } => {
                AgentError::io(format!("could not write the candidate config to [{}]", dir), source)
            }
            SupervisorError::PidFile { path, source } => {
                AgentError::io(format!("could not read pid file [{}]", path), source)
            }
            SupervisorError::Spawn { .. } | SupervisorError::Exit { .. } => AgentError::ProcessExit(err),
        }
    }
}
