//! Agent configuration.
//!
//! # Data Flow
//! ```text
//! <repo_dir>/lb-agent.conf (JSON)
//!     → loader.rs (deserialize, resolve relative paths)
//!     → validation.rs (semantic checks)
//!     → AgentConfig (validated, immutable)
//!     → shared by the agent, the TLS layer and the RPC server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a process restart
//! - Optional settings have defaults so the stock document still loads
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{AgentConfig, TimeoutConfig, WorkConfig};
pub use validation::ValidationError;
