//! Configuration loading from disk.

use std::fs;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{AgentConfig, AGENT_CONFIG_FILE};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading [{path}]: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, resolve and validate `lb-agent.conf` from `repo_dir`.
pub fn load_config(repo_dir: &Path) -> Result<AgentConfig, ConfigError> {
    let repo_dir = absolute(repo_dir).map_err(|source| ConfigError::Io {
        path: repo_dir.display().to_string(),
        source,
    })?;
    let path = repo_dir.join(AGENT_CONFIG_FILE);
    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut config: AgentConfig = serde_json::from_str(&content)?;

    resolve_paths(&mut config, &repo_dir);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Make every path in `config` absolute.
///
/// Paths are relative to the repo directory, except the pid file which is
/// relative to the load balancer's base directory two levels up.
pub fn resolve_paths(config: &mut AgentConfig, repo_dir: &Path) {
    config.keyfile = normalize(&repo_dir.join(&config.keyfile));
    config.certfile = normalize(&repo_dir.join(&config.certfile));
    config.ca_certs = normalize(&repo_dir.join(&config.ca_certs));
    config.work_dir = normalize(&repo_dir.join(&config.work_dir));
    config.log_config = config
        .log_config
        .as_ref()
        .map(|path| normalize(&repo_dir.join(path)));
    config.pid_file = normalize(&repo_dir.join("..").join("..").join(&config.pid_file));
    config.repo_dir = repo_dir.to_path_buf();
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(path)))
    }
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_repo(dir: &Path, work_dir: &str) {
        for name in ["zato-lba-priv-key.pem", "zato-lba-cert.pem", "zato-lba-ca-certs.pem"] {
            fs::write(dir.join(name), "").unwrap();
        }
        let conf = serde_json::json!({
            "haproxy_command": "haproxy",
            "host": "localhost",
            "port": 20151,
            "keyfile": "./zato-lba-priv-key.pem",
            "certfile": "./zato-lba-cert.pem",
            "ca_certs": "./zato-lba-ca-certs.pem",
            "work_dir": work_dir,
            "verify_fields": {"CN": "web-admin"},
            "pid_file": "zato-lb-agent.pid"
        });
        fs::write(dir.join(AGENT_CONFIG_FILE), conf.to_string()).unwrap();
    }

    #[test]
    fn resolves_paths_against_repo_dir() {
        let base = tempfile::tempdir().unwrap();
        let repo = base.path().join("lb").join("config").join("repo");
        fs::create_dir_all(&repo).unwrap();
        write_repo(&repo, "../");

        let config = load_config(&repo).unwrap();
        assert_eq!(config.keyfile, repo.join("zato-lba-priv-key.pem"));
        assert_eq!(config.work_dir, base.path().join("lb").join("config"));
        assert_eq!(config.pid_file, base.path().join("lb").join("zato-lb-agent.pid"));
        assert_eq!(config.haproxy_config_path(), repo.join("zato.config"));
        assert_eq!(config.verify_fields["CN"], "web-admin");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_config(dir.path()), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(AGENT_CONFIG_FILE), "{ not json").unwrap();
        assert!(matches!(load_config(dir.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn semantic_problems_are_collected() {
        let dir = tempfile::tempdir().unwrap();
        write_repo(dir.path(), "./missing-work-dir");
        match load_config(dir.path()) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "work_dir");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn normalize_collapses_parent_components() {
        assert_eq!(normalize(Path::new("/a/b/./c/../../d")), PathBuf::from("/a/d"));
    }
}
