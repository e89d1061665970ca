//! Load-balancer agent library.

// Core subsystems
pub mod agent;
pub mod haproxy;
pub mod lb_config;
pub mod rpc;

// Outer surfaces
pub mod client;
pub mod net;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use agent::{AgentError, LoadBalancerAgent};
pub use client::AgentClient;
pub use config::AgentConfig;
pub use lifecycle::Shutdown;
