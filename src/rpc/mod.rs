//! Remote procedure interface.
//!
//! # Data Flow
//! ```text
//! HTTPS POST / (client certificate verified by net::tls)
//!     → server.rs (axum router, body limit, timeout, trace)
//!     → protocol.rs (JSON-RPC 2.0 envelope)
//!     → handlers.rs (METHODS table: public name → handler)
//!     → agent::LoadBalancerAgent
//! ```
//!
//! # Design Decisions
//! - Methods are declared statically; unknown names are `-32601`
//! - Agent failures are `-32000` with `data.kind` naming the failure class

pub mod handlers;
pub mod protocol;
pub mod server;

pub use handlers::{dispatch, lookup, Handler, METHODS};
pub use protocol::{RpcError, RpcRequest, RpcResponse};
pub use server::{build_router, serve};
