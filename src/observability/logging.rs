//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Filter precedence: `RUST_LOG`, then the directive in the agent's
//!   `log_config` file, then `info`

use std::fs;
use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_DIRECTIVE: &str = "info";

/// Read a filter directive from `path`.
///
/// Blank lines and `#` comments are skipped; the remaining lines are joined
/// with commas, so one directive per line works too.
pub fn read_directive(path: &Path) -> std::io::Result<Option<String>> {
    let content = fs::read_to_string(path)?;
    let directives: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    if directives.is_empty() {
        Ok(None)
    } else {
        Ok(Some(directives.join(",")))
    }
}

/// Build the filter from the environment or the `log_config` file.
pub fn build_filter(log_config: Option<&Path>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directive = log_config
        .and_then(|path| read_directive(path).ok().flatten())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string());
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(log_config: Option<&Path>) {
    let _ = tracing_subscriber::registry()
        .with(build_filter(log_config))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
