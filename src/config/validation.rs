//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that referenced files and directories exist
//! - Validate value ranges (timeouts > 0, port != 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Runs on the resolved config, after paths are made absolute

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AgentConfig;
use crate::net::tls::SUBJECT_FIELDS;

/// A single semantic problem with the agent config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.haproxy_command.trim().is_empty() {
        errors.push(ValidationError::new("haproxy_command", "must not be empty"));
    }
    if config.host.trim().is_empty() {
        errors.push(ValidationError::new("host", "must not be empty"));
    }
    if config.port == 0 {
        errors.push(ValidationError::new("port", "must not be 0"));
    }

    for (field, path) in [
        ("keyfile", &config.keyfile),
        ("certfile", &config.certfile),
        ("ca_certs", &config.ca_certs),
    ] {
        if !path.is_file() {
            errors.push(ValidationError::new(field, format!("file not found [{}]", path.display())));
        }
    }

    if !config.work_dir.is_dir() {
        errors.push(ValidationError::new(
            "work_dir",
            format!("directory not found [{}]", config.work_dir.display()),
        ));
    }

    if let Some(log_config) = &config.log_config {
        if !log_config.is_file() {
            errors.push(ValidationError::new(
                "log_config",
                format!("file not found [{}]", log_config.display()),
            ));
        }
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.stats_ms", timeouts.stats_ms),
        ("timeouts.start_ms", timeouts.start_ms),
        ("timeouts.validate_ms", timeouts.validate_ms),
        ("timeouts.monitor_ms", timeouts.monitor_ms),
        ("timeouts.request_ms", timeouts.request_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if let Some(addr) = &config.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "metrics_address",
                format!("not a socket address [{}]", addr),
            ));
        }
    }

    for field in config.verify_fields.keys() {
        if !SUBJECT_FIELDS.contains(&field.as_str()) {
            errors.push(ValidationError::new(
                "verify_fields",
                format!("unsupported subject field [{}]", field),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;
    use crate::config::schema::TimeoutConfig;

    fn config_in(dir: &std::path::Path) -> AgentConfig {
        for name in ["key.pem", "cert.pem", "ca.pem"] {
            std::fs::write(dir.join(name), "").unwrap();
        }
        AgentConfig {
            haproxy_command: "haproxy".into(),
            host: "localhost".into(),
            port: 20151,
            keyfile: dir.join("key.pem"),
            certfile: dir.join("cert.pem"),
            ca_certs: dir.join("ca.pem"),
            work_dir: dir.to_path_buf(),
            verify_fields: BTreeMap::new(),
            log_config: None,
            pid_file: dir.join("haproxy.pid"),
            timeouts: TimeoutConfig::default(),
            metrics_address: None,
            repo_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn accepts_complete_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_config(&config_in(dir.path())).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.haproxy_command = "".into();
        config.port = 0;
        config.certfile = PathBuf::from("/nonexistent/cert.pem");
        config.timeouts.validate_ms = 0;
        config.verify_fields.insert("serialNumber".into(), "1".into());

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["haproxy_command", "port", "certfile", "timeouts.validate_ms", "verify_fields"]
        );
    }

    #[test]
    fn rejects_bad_metrics_address() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.metrics_address = Some("not-an-address".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "metrics_address");
    }
}
