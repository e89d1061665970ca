//! Load-balancer agent.
//!
//! Supervises one HAProxy instance and exposes its config and live state
//! over a mutually authenticated JSON-RPC endpoint.
//!
//! # Architecture Overview
//!
//! ```text
//!     RPC client (mTLS)
//!     ─────────────────▶ rpc::server ──▶ rpc::handlers ──▶ agent::LoadBalancerAgent
//!                                                            │        │        │
//!                                               lb_config ◀──┘        │        └──▶ haproxy::stats_socket
//!                                           (parse/serialize)         ▼                 (UNIX socket)
//!                                                          haproxy::supervisor
//!                                                         (validate/start/restart)
//!
//!     Cross-cutting: config (lb-agent.conf), observability (tracing, metrics),
//!                    lifecycle (startup, signals, shutdown), net::tls (mTLS)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

#[derive(Parser)]
#[command(name = "lb-agent")]
#[command(about = "Control agent for an HAProxy load balancer", long_about = None)]
struct Cli {
    /// Directory holding lb-agent.conf and the HAProxy config.
    repo_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match lb_agent::lifecycle::run(&cli.repo_dir).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "lb-agent stopped with an error");
            eprintln!("lb-agent: {}", e);
            ExitCode::FAILURE
        }
    }
}
