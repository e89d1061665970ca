//! HAProxy process supervision.
//!
//! # Responsibilities
//! - Launch HAProxy in daemon mode and hot-restart it with `-sf <pid>`
//! - Validate candidate config text with HAProxy's check mode (`-c`)
//! - Capture command line, return code, stdout and stderr of every failure
//!
//! # Design Decisions
//! - Every invocation is bounded: the child is polled with `try_wait` until
//!   it exits or the bound elapses
//! - A start/restart whose process is still running at the bound counts as
//!   started; there is no positive liveness check
//! - A check-mode process still running at the bound is killed and reported
//!   as a timeout
//! - stdout and stderr are drained while the child runs, including a daemon
//!   left running past the bound
//! - Validation never touches the live config file

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

/// How often a running child is polled for its exit status.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long to wait for stdout/stderr once the child has exited.
const OUTPUT_GRACE: Duration = Duration::from_secs(1);

pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_VALIDATE_TIMEOUT: Duration = Duration::from_millis(300);

/// Lifecycle of the supervised HAProxy process.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupervisorState {
    NotStarted = 0,
    Starting = 1,
    Running = 2,
    Validating = 3,
}

impl From<u8> for SupervisorState {
    fn from(val: u8) -> Self {
        match val {
            1 => SupervisorState::Starting,
            2 => SupervisorState::Running,
            3 => SupervisorState::Validating,
            _ => SupervisorState::NotStarted,
        }
    }
}

/// Diagnostics of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub command: String,
    /// `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for ProcessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self.code {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        };
        write!(
            f,
            "command:[{}], return code:[{}], stdout:[{}], stderr:[{}]",
            self.command, code, self.stdout, self.stderr
        )
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("could not launch [{command}]: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("HAProxy didn't respond in [{timeout:?}], command:[{command}]")]
    Timeout { command: String, timeout: Duration },

    #[error("Failed to validate the config file using HAProxy. {0}")]
    CheckFailed(ProcessReport),

    #[error("Failed to {action} HAProxy. {report}")]
    Exit {
        action: &'static str,
        report: ProcessReport,
    },

    #[error("could not read pid file [{path}]: {source}")]
    PidFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("could not write the candidate config to [{dir}]: {source}")]
    CandidateFile {
        dir: String,
        #[source]
        source: io::Error,
    },
}

enum Outcome {
    Exited(ProcessReport),
    StillRunning { command: String, child: Child },
}

/// Paths and bounds the supervisor works with.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub haproxy_command: String,
    pub config_path: PathBuf,
    pub pid_path: PathBuf,
    pub work_dir: PathBuf,
    pub start_timeout: Duration,
    pub validate_timeout: Duration,
}

/// Runs the external HAProxy binary.
#[derive(Debug)]
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    state: AtomicU8,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(SupervisorState::NotStarted as u8),
        }
    }

    pub fn state(&self) -> SupervisorState {
        SupervisorState::from(self.state.load(Ordering::Relaxed))
    }

    pub fn config_path(&self) -> &Path {
        &self.config.config_path
    }

    fn set_state(&self, state: SupervisorState) -> SupervisorState {
        SupervisorState::from(self.state.swap(state as u8, Ordering::Relaxed))
    }

    /// Start HAProxy in the background.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        self.launch("start", Vec::new()).await
    }

    /// Restart HAProxy, letting the new process take over the old one's
    /// listeners.
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        let old_pid = tokio::fs::read_to_string(&self.config.pid_path)
            .await
            .map_err(|source| {
                tracing::error!(path = %self.config.pid_path.display(), error = %source, "Could not read HAProxy pid file");
                SupervisorError::PidFile {
                    path: self.config.pid_path.display().to_string(),
                    source,
                }
            })?;
        let old_pid = old_pid.trim().to_string();
        self.launch("restart", vec!["-sf".to_string(), old_pid]).await
    }

    async fn launch(&self, action: &'static str, extra_args: Vec<String>) -> Result<(), SupervisorError> {
        let mut args = vec![
            "-D".to_string(),
            "-f".to_string(),
            self.config.config_path.display().to_string(),
            "-p".to_string(),
            self.config.pid_path.display().to_string(),
        ];
        args.extend(extra_args);

        let previous = self.set_state(SupervisorState::Starting);
        let outcome = run_bounded(&self.config.haproxy_command, &args, self.config.start_timeout).await;

        match outcome {
            Ok(Outcome::Exited(report)) if report.code == Some(0) => {
                tracing::info!(action, command = %report.command, "HAProxy launched");
                self.set_state(SupervisorState::Running);
                Ok(())
            }
            Ok(Outcome::Exited(report)) => {
                tracing::error!(
                    action,
                    command = %report.command,
                    code = ?report.code,
                    stdout = %report.stdout,
                    stderr = %report.stderr,
                    "HAProxy exited with an error"
                );
                self.set_state(previous);
                Err(SupervisorError::Exit { action, report })
            }
            Ok(Outcome::StillRunning { command, child: _ }) => {
                tracing::warn!(
                    action,
                    command = %command,
                    bound = ?self.config.start_timeout,
                    "HAProxy did not exit within the bound, assuming it started"
                );
                self.set_state(SupervisorState::Running);
                Ok(())
            }
            Err(e) => {
                self.set_state(previous);
                Err(e)
            }
        }
    }

    /// Check `candidate` with HAProxy's check mode.
    ///
    /// The text is written to a temporary file in the work directory which
    /// is removed when this returns.
    pub async fn validate(&self, candidate: &str) -> Result<(), SupervisorError> {
        let candidate_file = write_candidate(&self.config.work_dir, candidate)?;
        let path = candidate_file.path().display().to_string();
        let args = vec!["-c".to_string(), "-f".to_string(), path];

        let previous = self.set_state(SupervisorState::Validating);
        let outcome = run_bounded(&self.config.haproxy_command, &args, self.config.validate_timeout).await;
        self.set_state(previous);

        match outcome? {
            Outcome::Exited(report) if report.code == Some(0) => {
                tracing::debug!(command = %report.command, "Config validated");
                Ok(())
            }
            Outcome::Exited(report) => {
                tracing::error!(
                    command = %report.command,
                    code = ?report.code,
                    stdout = %report.stdout,
                    stderr = %report.stderr,
                    config = %candidate,
                    "HAProxy rejected the config"
                );
                Err(SupervisorError::CheckFailed(report))
            }
            Outcome::StillRunning { command, mut child } => {
                if let Err(e) = child.start_kill() {
                    tracing::warn!(command = %command, error = %e, "Could not kill HAProxy check process");
                }
                tracing::error!(
                    command = %command,
                    bound = ?self.config.validate_timeout,
                    "HAProxy check did not finish in time"
                );
                Err(SupervisorError::Timeout {
                    command,
                    timeout: self.config.validate_timeout,
                })
            }
        }
    }
}

fn write_candidate(dir: &Path, candidate: &str) -> Result<tempfile::NamedTempFile, SupervisorError> {
    let to_error = |source: io::Error| {
        tracing::error!(dir = %dir.display(), error = %source, "Could not write candidate config");
        SupervisorError::CandidateFile {
            dir: dir.display().to_string(),
            source,
        }
    };
    let mut file = tempfile::Builder::new()
        .prefix("lb-agent-check-")
        .suffix(".cfg")
        .tempfile_in(dir)
        .map_err(to_error)?;
    file.write_all(candidate.as_bytes()).map_err(to_error)?;
    file.flush().map_err(to_error)?;
    Ok(file)
}

fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `program` and poll it until it exits or `bound` elapses.
///
/// Both pipes are drained in their own tasks from the moment the child is
/// spawned, so a chatty child never blocks on a full pipe. The tasks
/// outlive a child still running at the bound.
async fn run_bounded(program: &str, args: &[String], bound: Duration) -> Result<Outcome, SupervisorError> {
    let command = render_command(program, args);
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| {
            tracing::error!(command = %command, error = %source, "Could not launch HAProxy");
            SupervisorError::Spawn {
                command: command.clone(),
                source,
            }
        })?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + bound;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Outcome::Exited(collect(command, status, stdout, stderr).await)),
            Ok(None) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(Outcome::StillRunning { command, child });
                }
                sleep(POLL_INTERVAL.min(deadline - now)).await;
            }
            Err(source) => {
                tracing::error!(command = %command, error = %source, "Could not poll HAProxy");
                return Err(SupervisorError::Spawn { command, source });
            }
        }
    }
}

/// Read `pipe` to its end in a background task.
fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            // A read error only truncates the diagnostics.
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn collect(
    command: String,
    status: ExitStatus,
    stdout: JoinHandle<Vec<u8>>,
    stderr: JoinHandle<Vec<u8>>,
) -> ProcessReport {
    // Grandchildren may inherit the pipes and keep them open.
    let (stdout, stderr) = match timeout(OUTPUT_GRACE, async { tokio::join!(stdout, stderr) }).await {
        Ok((Ok(stdout), Ok(stderr))) => (
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        ),
        _ => (String::new(), String::new()),
    };
    ProcessReport {
        command,
        code: status.code(),
        stdout,
        stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            SupervisorState::NotStarted,
            SupervisorState::Starting,
            SupervisorState::Running,
            SupervisorState::Validating,
        ] {
            assert_eq!(SupervisorState::from(state as u8), state);
        }
    }

    #[test]
    fn report_includes_all_diagnostics() {
        let report = ProcessReport {
            command: "haproxy -c -f /tmp/x".into(),
            code: Some(1),
            stdout: "".into(),
            stderr: "[ALERT] parsing".into(),
        };
        let msg = SupervisorError::CheckFailed(report).to_string();
        assert!(msg.contains("command:[haproxy -c -f /tmp/x]"));
        assert!(msg.contains("return code:[1]"));
        assert!(msg.contains("stderr:[[ALERT] parsing]"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(SupervisorConfig {
            haproxy_command: "/nonexistent/haproxy".into(),
            config_path: dir.path().join("zato.config"),
            pid_path: dir.path().join("haproxy.pid"),
            work_dir: dir.path().to_path_buf(),
            start_timeout: DEFAULT_START_TIMEOUT,
            validate_timeout: DEFAULT_VALIDATE_TIMEOUT,
        });
        assert!(matches!(supervisor.validate("global\n").await, Err(SupervisorError::Spawn { .. })));
        assert!(matches!(supervisor.start().await, Err(SupervisorError::Spawn { .. })));
        assert_eq!(supervisor.state(), SupervisorState::NotStarted);
    }
}
