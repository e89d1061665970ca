//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate the agent config
//! - Initialize logging and metrics
//! - Load the HAProxy config and start HAProxy
//! - Bind the TLS RPC endpoint and serve until a signal arrives
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - HAProxy is started before the endpoint accepts calls

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::agent::{AgentError, LoadBalancerAgent};
use crate::config::{load_config, AgentConfig, ConfigError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::watch_signals;
use crate::net::{load_tls_config, TlsError};
use crate::observability::{init_logging, metrics};
use crate::rpc;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("could not resolve bind address [{address}]: {reason}")]
    Bind { address: String, reason: String },

    #[error("metrics exporter: {0}")]
    Metrics(String),

    #[error("RPC endpoint failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// Run the agent for the repo directory `repo_dir` until shutdown.
pub async fn run(repo_dir: &Path) -> Result<(), StartupError> {
    let config = match load_config(repo_dir) {
        Ok(config) => config,
        Err(e) => {
            init_logging(None);
            tracing::error!(repo_dir = %repo_dir.display(), error = %e, "Could not load agent config");
            return Err(e.into());
        }
    };
    init_logging(config.log_config.as_deref());

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        repo_dir = %config.repo_dir.display(),
        "lb-agent starting"
    );

    if let Some(address) = &config.metrics_address {
        let addr: SocketAddr = address.parse().map_err(|e: std::net::AddrParseError| StartupError::Bind {
            address: address.clone(),
            reason: e.to_string(),
        })?;
        metrics::init_metrics(addr).map_err(|e| StartupError::Metrics(e.to_string()))?;
    }

    let addr = resolve_bind_address(&config).await?;
    let tls = load_tls_config(&config.certfile, &config.keyfile, &config.ca_certs, &config.verify_fields)?;
    let request_timeout = config.timeouts.request();

    let agent = Arc::new(LoadBalancerAgent::new(config).await?);
    agent.start_haproxy().await?;

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    let mut server = tokio::spawn(rpc::serve(agent, addr, tls, request_timeout, signal));

    // The endpoint may stop on its own, e.g. when the port is taken.
    let finished = tokio::select! {
        _ = watch_signals(&shutdown) => None,
        joined = &mut server => Some(joined),
    };
    let joined = match finished {
        Some(joined) => joined,
        None => server.await,
    };

    match joined {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "RPC endpoint task failed"),
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn resolve_bind_address(config: &AgentConfig) -> Result<SocketAddr, StartupError> {
    let address = config.bind_address();
    let mut addrs = tokio::net::lookup_host(address.clone()).await.map_err(|e| StartupError::Bind {
        address: address.clone(),
        reason: e.to_string(),
    })?;
    addrs.next().ok_or_else(|| StartupError::Bind {
        address,
        reason: "no addresses found".to_string(),
    })
}
