//! Everything that talks to HAProxy itself.
//!
//! # Data Flow
//! ```text
//! agent ──→ stats_socket.rs ──→ UNIX socket ──→ HAProxy
//!              ↓
//!           stat.rs (CSV / show info parsing)
//!
//! agent ──→ supervisor.rs ──→ haproxy -D / -sf / -c
//! ```

pub mod commands;
pub mod stat;
pub mod stats_socket;
pub mod supervisor;

pub use commands::{CommandCatalog, HaproxyVersion, KnownCommand, DESCRIBE_COMMANDS};
pub use stat::{ServerRow, ServerState, StatParseError};
pub use stats_socket::{StatsSocketClient, StatsSocketError};
pub use supervisor::{ProcessReport, ProcessSupervisor, SupervisorConfig, SupervisorError, SupervisorState};
