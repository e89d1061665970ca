//! Network security for the RPC endpoint.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection (axum-server)
//!     → tls.rs (handshake, client certificate required)
//!         → WebPKI chain verification against ca_certs
//!         → subject checked against verify_fields
//!     → Hand off to the RPC router
//! ```

pub mod tls;

pub use tls::{load_tls_config, TlsError};
