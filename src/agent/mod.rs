//! The agent: one operation per public RPC method.
//!
//! # Data Flow
//! ```text
//! RPC handler
//!     → service.rs (LoadBalancerAgent)
//!         reads:   ArcSwap<Config> snapshot, stats socket (show stat / show info)
//!         writes:  write lock
//!                  → edit.rs (rename / add / remove) or serialize
//!                  → supervisor.validate (haproxy -c)
//!                  → atomic write, re-read, publish snapshot
//!                  → supervisor.restart (haproxy -sf)
//! ```

pub mod edit;
pub mod errors;
pub mod service;

pub use edit::ServerAction;
pub use errors::AgentError;
pub use service::{LoadBalancerAgent, ServerData, ServersState, ZATO_OK};
